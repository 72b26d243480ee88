//! Clone command construction
//!
//! Username and password are embedded into the URL authority. The private
//! key and insecure-HTTP flag are accepted and carried along but are not
//! applied to the clone.

use std::path::Path;

use crate::process::Invocation;

/// Credentials for cloning a git repository
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accepted but not used by the clone
    pub private_key: Option<String>,
    /// Accepted but not used by the clone
    pub insecure_http_allowed: bool,
}

impl std::fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("private_key", &self.private_key.as_ref().map(|_| "****"))
            .field("insecure_http_allowed", &self.insecure_http_allowed)
            .finish()
    }
}

impl GitAuth {
    /// Username and password, only when both are present and non-empty
    fn basic(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// URL to clone from, with `user:pass@` inserted after the first `://`
/// when both credentials are present. Otherwise the URL is returned as is.
pub fn clone_url(url: &str, auth: Option<&GitAuth>) -> String {
    match auth.and_then(GitAuth::basic) {
        Some((user, pass)) => url.replacen("://", &format!("://{}:{}@", user, pass), 1),
        None => url.to_string(),
    }
}

/// `git clone <url> <dest>` with credentials applied and masked
pub fn clone_invocation(
    git_bin: &str,
    url: &str,
    auth: Option<&GitAuth>,
    dest: &Path,
) -> Invocation {
    let mut invocation = Invocation::new(git_bin)
        .arg("clone")
        .arg(clone_url(url, auth))
        .arg(dest.to_string_lossy());

    if let Some((_, pass)) = auth.and_then(GitAuth::basic) {
        invocation = invocation.secret(pass);
    }
    invocation
}
