//! Per-operation client session
//!
//! A session pairs the API key with a private scratch directory. The
//! directory is removed when the session is closed or dropped, so every
//! exit path of an operation (including `?` and cancellation) cleans up.

use std::fmt;
use std::path::Path;

use log::{debug, warn};
use tempfile::TempDir;

use crate::error::{FalError, FalResult};

const SCRATCH_PREFIX: &str = "falform-";

pub struct Session {
    key: String,
    dir: TempDir,
}

impl Session {
    /// Open a session with a fresh scratch directory under the system temp dir
    pub fn open(key: &str) -> FalResult<Self> {
        Self::open_in(key, None)
    }

    /// Open a session, placing the scratch directory under `root` if given
    pub fn open_in(key: &str, root: Option<&Path>) -> FalResult<Self> {
        if key.is_empty() {
            return Err(FalError::MissingKey);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(FalError::Session)?;

        debug!("opened session in {}", dir.path().display());
        Ok(Self {
            key: key.to_string(),
            dir,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Scratch directory owned by this session
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the scratch directory. Failures are logged, never returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("removed {}", path.display()),
            Err(e) => warn!("failed to remove scratch directory {}: {}", path.display(), e),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}
