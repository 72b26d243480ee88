//! Line-delimited JSON request loop
//!
//! Each input line is a request `{"id", "method", "params"}`; each output
//! line is `{"id", "result"}` or `{"id", "error"}`. Methods: `configure`,
//! `create`, `read`, `update`, `delete`.

use std::collections::HashMap;
use std::sync::Arc;

use falform_core::provider::Provider;
use falform_core::resource::{
    Resource, ResourceId, State, Value, attributes_from_json, attributes_to_json,
};
use falform_provider::process::CommandRunner;
use falform_provider::{FalConfig, FalProvider};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: serde_json::Value,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Parameters shared by the resource methods
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceParams {
    #[serde(rename = "type")]
    resource_type: Option<String>,
    name: String,
    identifier: Option<String>,
    #[serde(default)]
    inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    state: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    dry_run: bool,
}

impl ResourceParams {
    fn id(&self) -> ResourceId {
        ResourceId::new(
            self.resource_type.as_deref().unwrap_or(falform_provider::app::APP_RESOURCE_TYPE),
            &self.name,
        )
    }

    fn identifier(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| self.name.clone())
    }

    fn resource(&self) -> Resource {
        Resource {
            id: self.id(),
            attributes: attributes_from_json(&self.inputs),
        }
    }

    fn prior_state(&self) -> State {
        State::existing(self.id(), attributes_from_json(&self.state))
            .with_identifier(self.identifier())
    }
}

fn state_to_json(state: &State) -> serde_json::Value {
    json!({
        "identifier": state.identifier,
        "exists": state.exists,
        "state": attributes_to_json(&state.attributes),
    })
}

/// Request dispatcher holding the current provider configuration
pub struct Server {
    base: FalConfig,
    provider: FalProvider,
    cancel: CancellationToken,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl Server {
    pub fn new(base: FalConfig, cancel: CancellationToken) -> Self {
        let provider = FalProvider::new(base.clone()).with_cancellation(cancel.clone());
        Self {
            base,
            provider,
            cancel,
            runner: None,
        }
    }

    /// Use `runner` for every provider built by this server
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.provider = self.build(self.base.clone(), Some(runner.clone()));
        self.runner = Some(runner);
        self
    }

    fn build(&self, config: FalConfig, runner: Option<Arc<dyn CommandRunner>>) -> FalProvider {
        let provider = FalProvider::new(config).with_cancellation(self.cancel.clone());
        match runner {
            Some(runner) => provider.with_runner(runner),
            None => provider,
        }
    }

    fn validate_type(&self, id: &ResourceId) -> Result<(), String> {
        if self
            .provider
            .resource_types()
            .iter()
            .any(|t| t.name() == id.resource_type)
        {
            Ok(())
        } else {
            Err(format!("Unknown resource type: {}", id.resource_type))
        }
    }

    /// Handle one request line, producing one response line
    pub async fn handle_line(&mut self, line: &str) -> serde_json::Value {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("malformed request: {}", e);
                return json!({ "id": null, "error": format!("malformed request: {}", e) });
            }
        };

        debug!("handling {} request", request.method);
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => json!({ "id": request.id, "result": result }),
            Err(error) => json!({ "id": request.id, "error": error }),
        }
    }

    async fn dispatch(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        if method == "configure" {
            return self.configure(params);
        }

        let params: ResourceParams =
            serde_json::from_value(params).map_err(|e| format!("invalid params: {}", e))?;
        let id = params.id();
        self.validate_type(&id)?;

        let provider: &dyn Provider = &self.provider;
        let result = match method {
            "create" => provider
                .create(&params.resource(), params.dry_run)
                .await
                .map(|state| state_to_json(&state)),
            "read" => provider
                .read(&id, &params.prior_state())
                .await
                .map(|state| state_to_json(&state)),
            "update" => provider
                .update(&id, &params.identifier(), &params.prior_state(), &params.resource())
                .await
                .map(|state| state_to_json(&state)),
            "delete" => provider
                .delete(&id, &params.identifier(), &params.prior_state())
                .await
                .map(|()| json!({})),
            other => return Err(format!("unknown method: {}", other)),
        };
        result.map_err(|e| e.to_string())
    }

    fn configure(&mut self, params: serde_json::Value) -> Result<serde_json::Value, String> {
        let attributes: HashMap<String, Value> = match &params {
            serde_json::Value::Object(map) => attributes_from_json(map),
            serde_json::Value::Null => HashMap::new(),
            _ => return Err("invalid params: configure expects an object".to_string()),
        };

        let given = FalConfig::from_attributes(&attributes);
        let config = FalConfig {
            fal_key: given.fal_key.or_else(|| self.base.fal_key.clone()),
            fal_bin: if attributes.contains_key("falBin") {
                given.fal_bin
            } else {
                self.base.fal_bin.clone()
            },
            git_bin: if attributes.contains_key("gitBin") {
                given.git_bin
            } else {
                self.base.git_bin.clone()
            },
        };

        info!("configured provider: {:?}", config);
        self.provider = self.build(config, self.runner.clone());
        Ok(json!({}))
    }
}

/// Serve requests from `reader` until EOF or cancellation
pub async fn serve<R, W>(server: &mut Server, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let cancel = server.cancel.clone();
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => {
                info!("shutting down");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = server.handle_line(&line).await;
        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
