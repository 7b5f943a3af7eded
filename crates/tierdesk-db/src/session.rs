// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::info;

use crate::format_timestamp;

const SESSION_FILE: &str = "session";

/// The locally persisted "signed in" flag. There is no server-side session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_authenticated(&self) -> bool {
        self.path.is_file()
    }

    pub fn mark_authenticated(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create session directory {}", parent.display()))?;
        }
        let stamp = format_timestamp(OffsetDateTime::now_utc())?;
        fs::write(&self.path, format!("authenticated_at = {stamp:?}\n"))
            .with_context(|| format!("write session flag {}", self.path.display()))?;
        set_private_permissions(&self.path)?;
        info!(path = %self.path.display(), "session started");
        Ok(())
    }

    /// Removing a flag that is already gone is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error)
                .with_context(|| format!("remove session flag {}", self.path.display())),
        }
    }

    /// Compares against a lowercase hex SHA-256 digest.
    pub fn verify_passphrase(expected_sha256: &str, passphrase: &str) -> bool {
        passphrase_digest(passphrase).eq_ignore_ascii_case(expected_sha256.trim())
    }
}

pub fn passphrase_digest(passphrase: &str) -> String {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{SessionStore, passphrase_digest};
    use anyhow::Result;

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        assert_eq!(
            passphrase_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verify_passphrase_ignores_digest_case() {
        let expected = passphrase_digest("open sesame").to_uppercase();
        assert!(SessionStore::verify_passphrase(&expected, "open sesame"));
        assert!(!SessionStore::verify_passphrase(&expected, "open sesame "));
    }

    #[test]
    fn flag_lifecycle() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let session = SessionStore::in_dir(&temp.path().join("nested"));
        assert!(!session.is_authenticated());

        session.mark_authenticated()?;
        assert!(session.is_authenticated());

        session.clear()?;
        assert!(!session.is_authenticated());
        session.clear()?;
        Ok(())
    }
}
