//! The `app` resource: a fal application deployed from a git repository
//!
//! This module defines:
//! - The closed enums for deploy strategy and auth mode
//! - Typed inputs (`AppArgs`) and state (`AppState`)
//! - Conversion to and from the framework attribute map
//! - The resource schema

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use falform_core::provider::ResourceType;
use falform_core::resource::Value;
use falform_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::error::{FalError, FalResult};
use crate::git::GitAuth;

pub const APP_RESOURCE_TYPE: &str = "app";

/// How a new revision replaces the running one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployStrategy {
    #[default]
    Recreate,
    Rolling,
}

impl DeployStrategy {
    pub const ALL: [DeployStrategy; 2] = [DeployStrategy::Recreate, DeployStrategy::Rolling];

    /// Value passed to `fal deploy --strategy`
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStrategy::Recreate => "recreate",
            DeployStrategy::Rolling => "rolling",
        }
    }
}

/// Who may call the deployed application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    Public,
    #[default]
    Private,
    Shared,
}

impl AuthMode {
    pub const ALL: [AuthMode; 3] = [AuthMode::Public, AuthMode::Private, AuthMode::Shared];

    /// Value passed to `fal deploy --auth`
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Public => "public",
            AuthMode::Private => "private",
            AuthMode::Shared => "shared",
        }
    }
}

macro_rules! impl_flag_enum {
    ($ty:ident, $what:expr) => {
        impl FromStr for $ty {
            type Err = FalError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        FalError::invalid_input(format!(
                            "unknown {} '{}', expected one of: {}",
                            $what,
                            s,
                            variants(&$ty::ALL.map(|v| v.as_str())).join(", ")
                        ))
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_flag_enum!(DeployStrategy, "deploy strategy");
impl_flag_enum!(AuthMode, "auth mode");

fn variants(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Where the application source lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    pub url: String,
    pub auth: GitAuth,
}

/// Declared inputs of an `app`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppArgs {
    pub name: String,
    pub entrypoint: String,
    pub strategy: Option<DeployStrategy>,
    pub auth_mode: Option<AuthMode>,
    pub git: Option<GitSource>,
}

/// Inputs plus the outputs recorded after a deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub args: AppArgs,
    pub revision_id: String,
    pub created_at: String,
    pub updated_at: String,
}

fn get_str(attributes: &HashMap<String, Value>, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn insert_str(attributes: &mut HashMap<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), Value::String(value.to_string()));
    }
}

impl AppArgs {
    /// Validate against the `app` schema and build the typed inputs
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> FalResult<Self> {
        app_schema().validate(attributes).map_err(|errors| {
            FalError::invalid_input(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let strategy = get_str(attributes, "strategy")
            .map(|s| s.parse::<DeployStrategy>())
            .transpose()?;
        let auth_mode = get_str(attributes, "authMode")
            .map(|s| s.parse::<AuthMode>())
            .transpose()?;

        let git = attributes
            .get("git")
            .and_then(Value::as_map)
            .map(|block| GitSource {
                url: get_str(block, "url").unwrap_or_default(),
                auth: GitAuth {
                    username: get_str(block, "username"),
                    password: get_str(block, "password"),
                    private_key: get_str(block, "privateKey"),
                    insecure_http_allowed: block
                        .get("insecureHttpAllowed")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                },
            });

        Ok(Self {
            name: get_str(attributes, "name").unwrap_or_default(),
            entrypoint: get_str(attributes, "entrypoint").unwrap_or_default(),
            strategy,
            auth_mode,
            git,
        })
    }

    pub fn to_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        insert_str(&mut attributes, "name", Some(&self.name));
        insert_str(&mut attributes, "entrypoint", Some(&self.entrypoint));
        insert_str(&mut attributes, "strategy", self.strategy.map(|s| s.as_str()));
        insert_str(&mut attributes, "authMode", self.auth_mode.map(|m| m.as_str()));

        if let Some(git) = &self.git {
            let mut block = HashMap::new();
            insert_str(&mut block, "url", Some(&git.url));
            insert_str(&mut block, "username", git.auth.username.as_deref());
            insert_str(&mut block, "password", git.auth.password.as_deref());
            insert_str(&mut block, "privateKey", git.auth.private_key.as_deref());
            if git.auth.insecure_http_allowed {
                block.insert(
                    "insecureHttpAllowed".to_string(),
                    Value::Bool(git.auth.insecure_http_allowed),
                );
            }
            attributes.insert("git".to_string(), Value::Map(block));
        }
        attributes
    }
}

impl AppState {
    pub fn to_attributes(&self) -> HashMap<String, Value> {
        let mut attributes = self.args.to_attributes();
        insert_str(&mut attributes, "revisionId", Some(&self.revision_id));
        insert_str(&mut attributes, "createdAt", Some(&self.created_at));
        insert_str(&mut attributes, "updatedAt", Some(&self.updated_at));
        attributes
    }
}

/// Schema of the `app` resource, inputs and outputs
pub fn app_schema() -> ResourceSchema {
    let git = AttributeType::Struct(vec![
        AttributeSchema::new("url", types::non_empty_string())
            .required()
            .with_description("URL of the git repository"),
        AttributeSchema::new("username", AttributeType::String)
            .with_description("Username for HTTP(S) authentication"),
        AttributeSchema::new("password", AttributeType::String)
            .sensitive()
            .with_description("Password or token for HTTP(S) authentication"),
        AttributeSchema::new("privateKey", AttributeType::String)
            .sensitive()
            .with_description("SSH private key (accepted, not yet used for cloning)"),
        AttributeSchema::new("insecureHttpAllowed", AttributeType::Bool)
            .with_description("Allow plain HTTP remotes (accepted, not yet used for cloning)"),
    ]);

    ResourceSchema::new(APP_RESOURCE_TYPE)
        .with_description("A fal application deployed from a git repository")
        .attribute(
            AttributeSchema::new("name", types::non_empty_string())
                .required()
                .with_description("The name of the application"),
        )
        .attribute(
            AttributeSchema::new("entrypoint", AttributeType::String)
                .required()
                .with_description("The entrypoint for the application"),
        )
        .attribute(
            AttributeSchema::new(
                "strategy",
                AttributeType::Enum(variants(&DeployStrategy::ALL.map(|s| s.as_str()))),
            )
            .with_default(Value::String(DeployStrategy::default().as_str().to_string()))
            .with_description("Deployment strategy (recreate or rolling)"),
        )
        .attribute(
            AttributeSchema::new(
                "authMode",
                AttributeType::Enum(variants(&AuthMode::ALL.map(|m| m.as_str()))),
            )
            .with_default(Value::String(AuthMode::default().as_str().to_string()))
            .with_description("Authentication mode (public, private, or shared)"),
        )
        .attribute(
            AttributeSchema::new("git", git).with_description("Git repository configuration"),
        )
        .attribute(
            AttributeSchema::new("revisionId", AttributeType::String)
                .with_description("The revision ID of the deployed application"),
        )
        .attribute(
            AttributeSchema::new("createdAt", AttributeType::String)
                .with_description("When the application was created"),
        )
        .attribute(
            AttributeSchema::new("updatedAt", AttributeType::String)
                .with_description("When the application was last updated"),
        )
}

pub struct AppType;

impl ResourceType for AppType {
    fn name(&self) -> &'static str {
        APP_RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        app_schema()
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(AppType)]
}
