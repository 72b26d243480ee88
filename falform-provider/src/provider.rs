//! fal Provider implementation
//!
//! Maps the create/read/update/delete lifecycle of `app` resources onto
//! [`DeployClient`] calls. Every operation that touches the fal CLI opens
//! its own session and closes it before returning.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use falform_core::provider::{ProviderError, ProviderResult};
use falform_core::resource::{Resource, ResourceId, State, Value};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::app::{AppArgs, AppState};
use crate::client::{DeployClient, DeployOptions};
use crate::config::FalConfig;
use crate::error::FalError;
use crate::process::{CommandRunner, ProcessRunner};
use crate::session::Session;

/// Revision recorded for dry-run creates
pub const PREVIEW_REVISION: &str = "preview";

/// fal Provider
pub struct FalProvider {
    config: FalConfig,
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
    scratch_root: Option<PathBuf>,
}

fn wrap(id: &ResourceId, context: &str) -> impl FnOnce(FalError) -> ProviderError {
    let id = id.clone();
    let context = context.to_string();
    move |e| ProviderError::new(context).for_resource(id).with_cause(e)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn state_name<'a>(id: &ResourceId, from: &'a State) -> ProviderResult<&'a str> {
    from.attributes
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::new("state has no application name").for_resource(id.clone())
        })
}

impl FalProvider {
    /// Create a provider that runs real `git` and `fal` processes
    pub fn new(config: FalConfig) -> Self {
        Self {
            config,
            runner: Arc::new(ProcessRunner),
            cancel: CancellationToken::new(),
            scratch_root: None,
        }
    }

    /// Replace the command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Tie every operation to `cancel`; cancelling it stops running commands
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Place session scratch directories under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &FalConfig {
        &self.config
    }

    fn open_client(&self, id: &ResourceId) -> ProviderResult<DeployClient> {
        let key = self.config.resolve_key();
        if key.is_empty() {
            return Err(
                ProviderError::new(FalError::MissingKey.to_string()).for_resource(id.clone())
            );
        }

        let session = Session::open_in(&key, self.scratch_root.as_deref())
            .map_err(wrap(id, "failed to create fal client"))?;
        Ok(DeployClient::new(
            session,
            self.runner.clone(),
            &self.config,
            self.cancel.child_token(),
        ))
    }

    /// Create an app, or simulate it when `dry_run` is set
    pub async fn create_resource(
        &self,
        resource: &Resource,
        dry_run: bool,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let args = AppArgs::from_attributes(&resource.attributes)
            .map_err(wrap(id, "invalid app configuration"))?;

        let state = if dry_run {
            let now = now();
            AppState {
                args,
                revision_id: PREVIEW_REVISION.to_string(),
                created_at: now.clone(),
                updated_at: now,
            }
        } else {
            self.deploy_app(id, args).await?
        };

        Ok(State::existing(id.clone(), state.to_attributes()).with_identifier(&id.name))
    }

    async fn deploy_app(&self, id: &ResourceId, args: AppArgs) -> ProviderResult<AppState> {
        let opts = DeployOptions {
            entrypoint: args.entrypoint.clone(),
            strategy: Some(args.strategy.unwrap_or_default()),
            auth_mode: Some(args.auth_mode.unwrap_or_default()),
        };
        let git_url = args.git.as_ref().map(|g| g.url.as_str()).unwrap_or_default();
        let auth = args.git.as_ref().map(|g| &g.auth);

        let client = self.open_client(id)?;
        let result = client.deploy(git_url, auth, &opts).await;
        client.close();
        let result = result.map_err(wrap(id, "failed to deploy app"))?;

        info!("deployed {} at revision {}", args.name, result.revision_id);
        Ok(AppState {
            args,
            revision_id: result.revision_id,
            created_at: result.created_at,
            updated_at: result.updated_at,
        })
    }

    /// Refresh revision and update time from the remote listing
    pub async fn read_resource(&self, id: &ResourceId, from: &State) -> ProviderResult<State> {
        let name = state_name(id, from)?;

        let client = self.open_client(id)?;
        let app = client.get_app(name).await;
        client.close();

        let Some(app) = app.map_err(wrap(id, "failed to get app"))? else {
            info!("{} no longer exists", name);
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = from.attributes.clone();
        attributes.insert("revisionId".to_string(), Value::String(app.revision));
        attributes.insert("updatedAt".to_string(), Value::String(app.updated_at));

        let identifier = from.identifier.clone().unwrap_or_else(|| id.name.clone());
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Redeploy with the new inputs, keeping the original creation time
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let desired = Resource {
            id: id.clone(),
            attributes: to.attributes.clone(),
        };
        let mut state = self.create_resource(&desired, false).await?;

        if let Some(created_at) = from.attributes.get("createdAt") {
            state
                .attributes
                .insert("createdAt".to_string(), created_at.clone());
        }
        Ok(state.with_identifier(identifier))
    }

    /// Delete the app named in `from`, falling back to the identifier
    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let name = state_name(id, from).unwrap_or(identifier);

        let client = self.open_client(id)?;
        let result = client.delete(name).await;
        client.close();
        result.map_err(wrap(id, "failed to delete app"))
    }
}
