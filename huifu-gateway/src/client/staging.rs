//! Scoped on-disk staging of provider credentials.
//!
//! Some provider session setups read credentials from a file. Staging writes
//! that document to an owner-only temporary file (mode `0600` on Unix) whose
//! lifetime is tied to [`StagedCredentials`]: the file is removed by
//! [`release`](StagedCredentials::release), or on drop if construction fails
//! halfway or the owner is dropped without release.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{GatewayError, Result};

/// Credential document in the layout the provider SDK expects.
#[derive(Serialize)]
pub(crate) struct CredentialDocument<'a> {
    pub(crate) sys_id: &'a str,
    pub(crate) product_id: &'a str,
    /// Bare base64 key body, no armor.
    pub(crate) rsa_merch_private_key: &'a str,
    pub(crate) rsa_huifu_public_key: &'a str,
}

/// A staged credential file, removed when released or dropped.
#[derive(Debug)]
pub(crate) struct StagedCredentials {
    path: TempPath,
}

impl StagedCredentials {
    /// Writes `document` to a new temporary file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the file cannot be created or written;
    /// a partially written file is removed before returning.
    pub(crate) fn stage(dir: &Path, document: &CredentialDocument<'_>) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("huifu-credentials-")
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(|e| staging_error(dir, &e))?;

        let mut buf = serde_json::to_vec_pretty(document).map_err(|e| {
            GatewayError::Transport(format!("cannot encode credential document: {e}"))
        })?;
        let written = write_all(&mut file, &buf);
        buf.zeroize();
        written.map_err(|e| staging_error(dir, &e))?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), "credentials staged");
        Ok(Self { path })
    }

    /// Location of the staged document.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the staged file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Cleanup`] if the file could not be deleted.
    pub(crate) fn release(self) -> Result<()> {
        let staged_path: PathBuf = self.path.to_path_buf();
        self.path.close().map_err(|e| {
            GatewayError::Cleanup(format!(
                "cannot remove staged credentials {}: {e}",
                staged_path.display()
            ))
        })?;
        debug!(path = %staged_path.display(), "staged credentials removed");
        Ok(())
    }
}

fn write_all(file: &mut NamedTempFile, buf: &[u8]) -> std::io::Result<()> {
    file.write_all(buf)?;
    file.as_file().sync_all()
}

fn staging_error(dir: &Path, err: &std::io::Error) -> GatewayError {
    GatewayError::Transport(format!("cannot stage credentials in {}: {err}", dir.display()))
}
