// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable storage for the device key pair.
//!
//! The persisted layout is two string entries, mirroring the origin-scoped storage of
//! the chat client: the private key as a random 256-bit value in lowercase hex and the
//! public key as the SHA2-256 digest of that hex form.
//!
//! Applications bring their own storage by implementing [`KeyStore`]. A failing store
//! never blocks a session, the identity then only lives in memory and a fresh one is
//! generated on the next session (see [`crate::DeviceSession::initialize`]).
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Well-known name of the persisted private-key entry.
pub const PRIVATE_KEY_ENTRY: &str = "device_private_key";

/// Well-known name of the persisted public-key entry.
pub const PUBLIC_KEY_ENTRY: &str = "device_public_key";

/// The two string entries making up a persisted device key pair.
///
/// Both values are lowercase hex. The private entry is zeroised on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct StoredKeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not reveal the private key when printing debug info.
        f.debug_struct("StoredKeyPair")
            .field("private_key", &"***")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Storage backend for the device key pair.
pub trait KeyStore {
    /// Reads the persisted key pair.
    ///
    /// Returns `None` when no identity has been persisted yet.
    fn load(&self) -> Result<Option<StoredKeyPair>, StoreError>;

    /// Writes both entries, replacing any previously persisted pair.
    fn persist(&mut self, keypair: &StoredKeyPair) -> Result<(), StoreError>;

    /// Removes both entries. Clearing an empty store is not an error.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// In-process key store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keypair: Option<StoredKeyPair>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<StoredKeyPair>, StoreError> {
        Ok(self.keypair.clone())
    }

    fn persist(&mut self, keypair: &StoredKeyPair) -> Result<(), StoreError> {
        self.keypair = Some(keypair.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.keypair = None;
        Ok(())
    }
}

/// Filesystem-backed key store.
///
/// Persists the two entries as files named [`PRIVATE_KEY_ENTRY`] and [`PUBLIC_KEY_ENTRY`]
/// inside an application-chosen directory (typically the per-user data directory of the
/// chat client). The directory is created on first persist.
#[derive(Debug)]
pub struct FsKeyStore {
    directory: PathBuf,
}

impl FsKeyStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn read_entry(&self, name: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.directory.join(name)) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_entry(&self, name: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.directory.join(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl KeyStore for FsKeyStore {
    fn load(&self) -> Result<Option<StoredKeyPair>, StoreError> {
        let private_key = self.read_entry(PRIVATE_KEY_ENTRY)?;
        let public_key = self.read_entry(PUBLIC_KEY_ENTRY)?;
        match (private_key, public_key) {
            (Some(private_key), Some(public_key)) => Ok(Some(StoredKeyPair {
                private_key,
                public_key,
            })),
            (None, None) => Ok(None),
            // A half-written pair is unusable, treat it as absent.
            _ => {
                warn!(directory = %self.directory.display(), "found incomplete key pair in store");
                Ok(None)
            }
        }
    }

    fn persist(&mut self, keypair: &StoredKeyPair) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.directory)?;
        std::fs::write(
            self.directory.join(PRIVATE_KEY_ENTRY),
            &keypair.private_key,
        )?;
        std::fs::write(self.directory.join(PUBLIC_KEY_ENTRY), &keypair.public_key)?;
        debug!(directory = %self.directory.display(), "persisted device key pair");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.remove_entry(PRIVATE_KEY_ENTRY)?;
        self.remove_entry(PUBLIC_KEY_ENTRY)?;
        debug!(directory = %self.directory.display(), "removed device key pair from store");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::{FsKeyStore, KeyStore, MemoryKeyStore, PUBLIC_KEY_ENTRY, StoredKeyPair};

    fn sample_keypair() -> StoredKeyPair {
        StoredKeyPair {
            private_key: "aa".repeat(32),
            public_key: "bb".repeat(32),
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryKeyStore::new();
        assert!(store.load().unwrap().is_none());

        store.persist(&sample_keypair()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.private_key, "aa".repeat(32));
        assert_eq!(loaded.public_key, "bb".repeat(32));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn fs_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FsKeyStore::new(tmp.path().join("keys"));
        assert!(store.load().unwrap().is_none());

        store.persist(&sample_keypair()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.private_key, "aa".repeat(32));
        assert_eq!(loaded.public_key, "bb".repeat(32));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());

        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn fs_store_half_written_pair_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FsKeyStore::new(tmp.path());
        store.persist(&sample_keypair()).unwrap();

        std::fs::remove_file(tmp.path().join(PUBLIC_KEY_ENTRY)).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn fs_store_trims_whitespace() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsKeyStore::new(tmp.path());
        std::fs::write(tmp.path().join("device_private_key"), "abcd\n").unwrap();
        std::fs::write(tmp.path().join("device_public_key"), "ef01\n").unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.private_key, "abcd");
        assert_eq!(loaded.public_key, "ef01");
    }
}
