//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific backend (fal, etc.).
//! It is responsible for turning desired state into actual side effects
//! and reporting observed state back.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(ref cause) = self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "app")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// Each backend implements this trait. All operations are async and
/// involve side effects, except `create` with `dry_run` set.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "fal")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Refresh the state of a resource
    ///
    /// `from` is the last recorded state. Returns `State::not_found()` if the
    /// resource no longer exists, so the caller can drop it from its records.
    fn read(&self, id: &ResourceId, from: &State) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// With `dry_run` set, returns a simulated state without touching the
    /// backend. The returned state's identifier is the resource name.
    fn create(&self, resource: &Resource, dry_run: bool) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>>;
}
