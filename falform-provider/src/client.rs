//! Deploy client
//!
//! Drives `git` and the `fal` CLI inside a [`Session`]: clone, set the
//! profile key, then run `deploy`, `apps list` or `apps delete`, and turn
//! the text output into structured results.

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

use crate::app::{AuthMode, DeployStrategy};
use crate::config::FalConfig;
use crate::error::{FalError, FalResult};
use crate::git::{GitAuth, clone_invocation};
use crate::process::{CommandRunner, Invocation};
use crate::session::Session;

/// Revision reported when the deploy output names none
pub const UNKNOWN_REVISION: &str = "unknown";

/// Subdirectory of the session where the repository is cloned
const REPO_DIR: &str = "repo";

/// Options for `fal deploy`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    pub entrypoint: String,
    pub strategy: Option<DeployStrategy>,
    pub auth_mode: Option<AuthMode>,
}

/// Outcome of a successful deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub revision_id: String,
    /// RFC 3339
    pub created_at: String,
    /// RFC 3339
    pub updated_at: String,
}

/// One entry of `fal apps list --json`. Fields other than `alias` may be
/// missing or null and read as empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteApp {
    pub alias: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub revision: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub auth_mode: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub updated_at: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Client bound to a single session
pub struct DeployClient {
    session: Session,
    runner: Arc<dyn CommandRunner>,
    fal_bin: String,
    git_bin: String,
    cancel: CancellationToken,
}

impl DeployClient {
    pub fn new(
        session: Session,
        runner: Arc<dyn CommandRunner>,
        config: &FalConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            runner,
            fal_bin: config.fal_bin.clone(),
            git_bin: config.git_bin.clone(),
            cancel,
        }
    }

    /// Scratch directory of the underlying session
    pub fn dir(&self) -> &Path {
        self.session.dir()
    }

    /// Release the session, removing its scratch directory
    pub fn close(self) {
        self.session.close();
    }

    /// Clone `git_url` and deploy it
    pub async fn deploy(
        &self,
        git_url: &str,
        auth: Option<&GitAuth>,
        opts: &DeployOptions,
    ) -> FalResult<DeployResult> {
        if git_url.trim().is_empty() {
            return Err(FalError::invalid_input("git URL is required"));
        }

        let repo_dir = self.session.dir().join(REPO_DIR);

        info!("cloning {}", git_url);
        let clone = clone_invocation(&self.git_bin, git_url, auth, &repo_dir);
        self.runner
            .run(&clone, &self.cancel)
            .await
            .map_err(|e| FalError::Clone(Box::new(e)))?;

        info!("deploying {}", display_entrypoint(&opts.entrypoint));
        let output = self.run_fal(&repo_dir, deploy_args(opts)).await?;

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(DeployResult {
            revision_id: extract_revision(&output),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look up a deployed application by alias. `None` when absent.
    pub async fn get_app(&self, name: &str) -> FalResult<Option<RemoteApp>> {
        let output = self
            .run_fal(self.session.dir(), ["apps", "list", "--json"])
            .await
            .map_err(|e| FalError::ListApps(Box::new(e)))?;

        let apps: Vec<RemoteApp> = serde_json::from_str(&output)?;
        debug!("apps list returned {} entries", apps.len());
        Ok(apps.into_iter().find(|app| app.alias == name))
    }

    /// Delete a deployed application by alias
    pub async fn delete(&self, name: &str) -> FalResult<()> {
        info!("deleting {}", name);
        self.run_fal(self.session.dir(), ["apps", "delete", name])
            .await
            .map(|_| ())
    }

    /// Set the profile key, then run `fal <args>` in `work_dir`
    async fn run_fal<I, S>(&self, work_dir: &Path, args: I) -> FalResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set_key = Invocation::new(&self.fal_bin)
            .args(["profile", "key", "set", self.session.key()])
            .current_dir(work_dir)
            .secret(self.session.key());
        self.runner
            .run(&set_key, &self.cancel)
            .await
            .map_err(|e| FalError::SetKey(Box::new(e)))?;

        let invocation = Invocation::new(&self.fal_bin)
            .args(args)
            .current_dir(work_dir)
            .secret(self.session.key());
        self.runner.run(&invocation, &self.cancel).await
    }
}

fn display_entrypoint(entrypoint: &str) -> &str {
    if entrypoint.is_empty() {
        "<default entrypoint>"
    } else {
        entrypoint
    }
}

/// Arguments for `fal deploy`. Unset options and an empty entrypoint are omitted.
pub fn deploy_args(opts: &DeployOptions) -> Vec<String> {
    let mut args = vec!["deploy".to_string()];
    if let Some(strategy) = opts.strategy {
        args.extend(["--strategy".to_string(), strategy.as_str().to_string()]);
    }
    if let Some(auth_mode) = opts.auth_mode {
        args.extend(["--auth".to_string(), auth_mode.as_str().to_string()]);
    }
    if !opts.entrypoint.is_empty() {
        args.push(opts.entrypoint.clone());
    }
    args
}

/// Last token of the first line mentioning "revision" (any case) that has
/// more than one token, or [`UNKNOWN_REVISION`].
pub fn extract_revision(output: &str) -> String {
    output
        .lines()
        .filter(|line| line.to_lowercase().contains("revision"))
        .find_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [_, .., last] => Some(last.to_string()),
                _ => None,
            }
        })
        .unwrap_or_else(|| UNKNOWN_REVISION.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use falform_core::provider::BoxFuture;

    /// Runner that records invocations and replays scripted results.
    /// Unscripted calls succeed with empty output.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        pub calls: Mutex<Vec<Invocation>>,
        script: Mutex<VecDeque<(String, FalResult<String>)>>,
    }

    impl ScriptedRunner {
        /// Reply to the next invocation whose command line contains `needle`
        pub fn on(self, needle: &str, result: FalResult<String>) -> Self {
            self.script
                .lock()
                .unwrap()
                .push_back((needle.to_string(), result));
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::redacted).collect()
        }
    }

    pub(crate) fn failed(output: &str) -> FalResult<String> {
        Err(FalError::CommandFailed {
            command: "scripted".to_string(),
            status: "exit status: 1".to_string(),
            output: output.to_string(),
        })
    }

    impl CommandRunner for ScriptedRunner {
        fn run<'a>(
            &'a self,
            invocation: &'a Invocation,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, FalResult<String>> {
            self.calls.lock().unwrap().push(invocation.clone());
            let line = std::iter::once(invocation.program.as_str())
                .chain(invocation.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");

            let mut script = self.script.lock().unwrap();
            let result = script
                .iter()
                .position(|(needle, _)| line.contains(needle.as_str()))
                .and_then(|pos| script.remove(pos))
                .map_or(Ok(String::new()), |(_, r)| r);
            Box::pin(async move { result })
        }
    }

    fn client(runner: Arc<ScriptedRunner>) -> DeployClient {
        let session = Session::open("sk-test").unwrap();
        DeployClient::new(
            session,
            runner,
            &FalConfig::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn deploy_args_with_everything() {
        let opts = DeployOptions {
            entrypoint: "app.py::MyApp".to_string(),
            strategy: Some(DeployStrategy::Rolling),
            auth_mode: Some(AuthMode::Shared),
        };
        assert_eq!(
            deploy_args(&opts),
            vec!["deploy", "--strategy", "rolling", "--auth", "shared", "app.py::MyApp"]
        );
    }

    #[test]
    fn deploy_args_omit_unset_flags_and_empty_entrypoint() {
        assert_eq!(deploy_args(&DeployOptions::default()), vec!["deploy"]);

        let opts = DeployOptions {
            auth_mode: Some(AuthMode::Private),
            ..DeployOptions::default()
        };
        assert_eq!(deploy_args(&opts), vec!["deploy", "--auth", "private"]);
    }

    #[test]
    fn extract_revision_from_indented_line() {
        let output = "Registered app\n  Revision: abc123\nDone\n";
        assert_eq!(extract_revision(output), "abc123");
    }

    #[test]
    fn extract_revision_is_case_insensitive_and_first_match_wins() {
        let output = "REVISION id-1\nrevision id-2\n";
        assert_eq!(extract_revision(output), "id-1");
    }

    #[test]
    fn extract_revision_skips_bare_keyword_lines() {
        let output = "revision\nnew revision: r-42\n";
        assert_eq!(extract_revision(output), "r-42");
    }

    #[test]
    fn extract_revision_defaults_to_unknown() {
        assert_eq!(extract_revision("Deployed!\nURL: https://fal.run/x\n"), "unknown");
        assert_eq!(extract_revision(""), "unknown");
    }

    #[tokio::test]
    async fn deploy_clones_sets_key_then_deploys_in_repo() {
        let runner = Arc::new(
            ScriptedRunner::default().on("fal deploy", Ok("Revision: 7f3a\n".to_string())),
        );
        let client = client(runner.clone());
        let repo_dir = client.dir().join("repo");

        let opts = DeployOptions {
            entrypoint: "app.py".to_string(),
            strategy: Some(DeployStrategy::Recreate),
            auth_mode: None,
        };
        let result = client
            .deploy("https://github.com/org/repo.git", None, &opts)
            .await
            .unwrap();

        assert_eq!(result.revision_id, "7f3a");
        assert_eq!(result.created_at, result.updated_at);
        assert!(chrono::DateTime::parse_from_rfc3339(&result.created_at).is_ok());

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].args,
            vec![
                "clone".to_string(),
                "https://github.com/org/repo.git".to_string(),
                repo_dir.to_string_lossy().into_owned(),
            ]
        );
        assert_eq!(calls[1].args, vec!["profile", "key", "set", "sk-test"]);
        assert_eq!(calls[1].cwd.as_deref(), Some(repo_dir.as_path()));
        assert_eq!(
            calls[2].args,
            vec!["deploy", "--strategy", "recreate", "app.py"]
        );
        assert_eq!(calls[2].cwd, Some(PathBuf::from(&repo_dir)));
        client.close();
    }

    #[tokio::test]
    async fn deploy_requires_git_url() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(runner.clone());
        let err = client
            .deploy("", None, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FalError::InvalidInput(ref m) if m == "git URL is required"));
        assert!(runner.calls().is_empty());
        client.close();
    }

    #[tokio::test]
    async fn deploy_surfaces_clone_failure() {
        let runner = Arc::new(
            ScriptedRunner::default().on("git clone", failed("repository not found")),
        );
        let client = client(runner.clone());
        let err = client
            .deploy("https://github.com/org/missing.git", None, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FalError::Clone(_)));
        assert!(err.to_string().contains("repository not found"));
        assert_eq!(runner.calls().len(), 1);
        client.close();
    }

    #[tokio::test]
    async fn deploy_failure_keeps_tool_output() {
        let runner = Arc::new(
            ScriptedRunner::default().on("fal deploy", failed("ModuleNotFoundError: torch")),
        );
        let client = client(runner.clone());
        let err = client
            .deploy("https://github.com/org/repo.git", None, &DeployOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ModuleNotFoundError: torch"));
        client.close();
    }

    #[tokio::test]
    async fn set_key_failure_aborts_before_subcommand() {
        let runner =
            Arc::new(ScriptedRunner::default().on("profile key set", failed("invalid key")));
        let client = client(runner.clone());
        let err = client.delete("sana-app").await.unwrap_err();

        assert!(matches!(err, FalError::SetKey(_)));
        assert_eq!(runner.commands(), vec!["fal profile key set ****"]);
        client.close();
    }

    #[tokio::test]
    async fn get_app_finds_first_matching_alias() {
        let listing = r#"[
            {"alias": "other", "revision": "r0", "auth_mode": "public", "updated_at": "t0"},
            {"alias": "sana-app", "revision": "r1", "auth_mode": "private", "updated_at": "t1"},
            {"alias": "sana-app", "revision": "r2", "auth_mode": "private", "updated_at": "t2"}
        ]"#;
        let runner = Arc::new(ScriptedRunner::default().on("apps list", Ok(listing.to_string())));
        let client = client(runner.clone());

        let app = client.get_app("sana-app").await.unwrap().unwrap();
        assert_eq!(app.revision, "r1");
        assert_eq!(app.updated_at, "t1");

        let calls = runner.calls();
        assert_eq!(calls[1].args, vec!["apps", "list", "--json"]);
        assert_eq!(calls[1].cwd.as_deref(), Some(client.dir()));
        client.close();
    }

    #[tokio::test]
    async fn get_app_returns_none_when_absent() {
        let runner = Arc::new(ScriptedRunner::default().on("apps list", Ok("[]".to_string())));
        let client = client(runner);
        assert!(client.get_app("sana-app").await.unwrap().is_none());
        client.close();
    }

    #[tokio::test]
    async fn get_app_rejects_malformed_listing() {
        let runner = Arc::new(
            ScriptedRunner::default().on("apps list", Ok("[{\"revision\": \"r\"}]".to_string())),
        );
        let client = client(runner);
        let err = client.get_app("x").await.unwrap_err();
        assert!(matches!(err, FalError::Parse(_)));
        client.close();
    }

    #[tokio::test]
    async fn get_app_reads_null_and_missing_fields_as_empty() {
        let listing = r#"[{"alias": "sana-app", "revision": null, "auth_mode": "public"}]"#;
        let runner = Arc::new(ScriptedRunner::default().on("apps list", Ok(listing.to_string())));
        let client = client(runner);

        let app = client.get_app("sana-app").await.unwrap().unwrap();
        assert_eq!(app.revision, "");
        assert_eq!(app.updated_at, "");
        assert_eq!(app.auth_mode, "public");
        client.close();
    }

    #[tokio::test]
    async fn get_app_failure_names_the_listing() {
        let runner = Arc::new(ScriptedRunner::default().on("apps list", failed("401")));
        let client = client(runner);

        let err = client.get_app("sana-app").await.unwrap_err();
        assert!(matches!(err, FalError::ListApps(_)));
        assert!(err.to_string().starts_with("failed to list apps: "));
        assert!(err.to_string().contains("401"));
        client.close();
    }

    #[tokio::test]
    async fn delete_runs_apps_delete() {
        let runner = Arc::new(ScriptedRunner::default());
        let client = client(runner.clone());
        client.delete("sana-app").await.unwrap();
        assert_eq!(
            runner.commands(),
            vec!["fal profile key set ****", "fal apps delete sana-app"]
        );
        client.close();
    }
}
