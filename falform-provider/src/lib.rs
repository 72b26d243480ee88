//! Falform fal Provider
//!
//! Manages fal applications deployed from git repositories by driving the
//! `git` and `fal` command-line tools.
//!
//! ## Module Structure
//!
//! - `app` - The `app` resource: typed inputs, state and schema
//! - `client` - Deploy client wrapping the fal CLI
//! - `config` - Provider configuration and API key resolution
//! - `git` - Clone command construction with credentials
//! - `process` - External command execution with cancellation
//! - `provider` - FalProvider lifecycle implementation
//! - `session` - Per-operation scratch directories

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod git;
pub mod process;
pub mod provider;
pub mod session;

// Re-export main types
pub use config::FalConfig;
pub use error::{FalError, FalResult};
pub use provider::FalProvider;

use falform_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use falform_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for FalProvider {
    fn name(&self) -> &'static str {
        "fal"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        app::resource_types()
    }

    fn read(&self, id: &ResourceId, from: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let from = from.clone();
        Box::pin(async move { self.read_resource(&id, &from).await })
    }

    fn create(&self, resource: &Resource, dry_run: bool) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource, dry_run).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &from).await })
    }
}
