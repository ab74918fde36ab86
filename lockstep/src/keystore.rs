//! Keystore loading boundary.
//!
//! The keystore binary layout is opaque to lockstep. A loader returns the raw
//! keystore together with the two facts the workflows need: a fingerprint
//! (digest of the contents) and the number of stored keys.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::digest::{to_hex, Digest, Sha256Digest};

/// Size of one key record.
pub const KEY_RECORD_LEN: usize = 32;

/// Errors from loading a keystore.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("keystore not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("keystore {} is corrupted: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("failed to read keystore {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opaque keystore contents.
#[derive(Clone)]
pub struct Keystore {
    bytes: Arc<[u8]>,
}

impl Keystore {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Keystore").field("len", &self.bytes.len()).finish()
    }
}

/// Result of a successful load.
#[derive(Clone, Debug)]
pub struct LoadedKeystore {
    pub path: PathBuf,
    pub keystore: Keystore,
    pub fingerprint: Vec<u8>,
    pub key_count: u64,
}

impl LoadedKeystore {
    pub fn fingerprint_hex(&self) -> String {
        to_hex(&self.fingerprint)
    }
}

/// Loads keystores.
pub trait KeystoreLoader: Send + Sync + 'static {
    fn load(&self, path: &Path) -> impl Future<Output = Result<LoadedKeystore, KeystoreError>> + Send;
}

/// Loader for keystores stored as a flat file of fixed-size key records.
pub struct FileKeystoreLoader {
    digest: Arc<dyn Digest>,
}

impl FileKeystoreLoader {
    pub fn new(digest: Arc<dyn Digest>) -> Self {
        Self { digest }
    }
}

impl Default for FileKeystoreLoader {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Digest))
    }
}

impl KeystoreLoader for FileKeystoreLoader {
    async fn load(&self, path: &Path) -> Result<LoadedKeystore, KeystoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                KeystoreError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                KeystoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let key_count = validate_layout(path, &bytes)?;
        let fingerprint = self.digest.digest(&bytes);
        debug!(path = %path.display(), key_count, "Keystore loaded");

        Ok(LoadedKeystore {
            path: path.to_path_buf(),
            keystore: Keystore {
                bytes: bytes.into(),
            },
            fingerprint,
            key_count,
        })
    }
}

fn validate_layout(path: &Path, bytes: &[u8]) -> Result<u64, KeystoreError> {
    if bytes.is_empty() {
        return Err(KeystoreError::Corrupted {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    if bytes.len() % KEY_RECORD_LEN != 0 {
        return Err(KeystoreError::Corrupted {
            path: path.to_path_buf(),
            reason: format!(
                "length {} is not a multiple of the {}-byte key record",
                bytes.len(),
                KEY_RECORD_LEN
            ),
        });
    }
    Ok((bytes.len() / KEY_RECORD_LEN) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_counts_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keys.bin");
        std::fs::write(&path, vec![7u8; KEY_RECORD_LEN * 3]).unwrap();

        let loaded = FileKeystoreLoader::default().load(&path).await.unwrap();
        assert_eq!(loaded.key_count, 3);
        assert_eq!(loaded.keystore.len(), KEY_RECORD_LEN * 3);
        assert_eq!(loaded.fingerprint.len(), 32);
        assert_eq!(loaded.fingerprint_hex().len(), 64);
    }

    #[tokio::test]
    async fn test_empty_file_is_corrupted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let err = FileKeystoreLoader::default().load(&path).await.unwrap_err();
        assert!(matches!(err, KeystoreError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn test_misaligned_file_is_corrupted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short.bin");
        std::fs::write(&path, vec![1u8; KEY_RECORD_LEN + 5]).unwrap();

        let err = FileKeystoreLoader::default().load(&path).await.unwrap_err();
        assert!(err.to_string().contains("not a multiple"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = FileKeystoreLoader::default()
            .load(&temp.path().join("nope.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeystoreError::NotFound { .. }));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let keystore = Keystore {
            bytes: vec![0xAB; 4].into(),
        };
        assert_eq!(format!("{:?}", keystore), "Keystore { len: 4 }");
    }
}
