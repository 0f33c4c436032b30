//! Persistent wallet key storage for SmellyCoin.
//!
//! The chain and UTXO set are in-memory only — a restart rebuilds from
//! genesis. The one thing that must survive a restart is the node's own
//! private key, so it keeps mining to (and spending from) the same address.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use smellycoin_crypto::generate_private_key;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Loads the private key at `path`, creating a fresh one (mode 0644) if the
/// file is genuinely absent. An existing file, however short or malformed,
/// is never overwritten.
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        KeyStore { path: path.into() }
    }

    pub fn load_or_create(&self) -> Result<String, StorageError> {
        if self.path.exists() {
            let contents = fs::read_to_string(&self.path)?;
            return Ok(contents.trim().to_string());
        }

        let private_key = generate_private_key();
        self.write_new(&private_key)?;
        info!("generated a new private key at {}", self.path.display());
        Ok(private_key)
    }

    fn write_new(&self, private_key_hex: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, private_key_hex)?;
        set_owner_read_write(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_read_write(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o644);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_read_write(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_key_file_when_absent() {
        let dir = std::env::temp_dir().join(format!("smellycoin-keystore-test-{}", std::process::id()));
        let path = dir.join("private_key");
        let store = KeyStore::new(&path);

        let key = store.load_or_create().unwrap();
        assert_eq!(key.len(), 64);

        let reloaded = store.load_or_create().unwrap();
        assert_eq!(key, reloaded);

        let _ = fs::remove_dir_all(&dir);
    }
}
