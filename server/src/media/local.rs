//! Filesystem-backed object store.
//!
//! Objects are content-addressed by SHA-256: `{data_dir}/media/{hex}.{ext}`,
//! served back at `/media/{hex}.{ext}`. Identical uploads share one file.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{ImageType, ObjectStore, ObjectStoreError, StoredObject};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            root: Path::new(data_dir).join("media"),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

/// Split and validate a key of the form `<64 hex>.<ext>`.
fn parse_key(key: &str) -> Result<ImageType, ObjectStoreError> {
    let invalid = || ObjectStoreError::InvalidKey(key.to_string());
    let (hash, ext) = key.split_once('.').ok_or_else(invalid)?;
    if hash.len() != 64 || hex::decode(hash).is_err() {
        return Err(invalid());
    }
    ImageType::from_extension(ext).ok_or_else(invalid)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: Vec<u8>, image_type: ImageType) -> Result<String, ObjectStoreError> {
        let hash = hex::encode(Sha256::digest(&bytes));
        let key = format!("{}.{}", hash, image_type.extension());
        let path = self.path_for(&key);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(key = %key, "Object already stored");
        } else {
            tokio::fs::create_dir_all(&self.root).await?;
            // Write to a temp name first so a concurrent reader never sees a partial file.
            let tmp = self.root.join(format!("{}.tmp-{}", key, uuid::Uuid::now_v7()));
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await?;
        }

        Ok(format!("/media/{}", key))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, ObjectStoreError> {
        let image_type = parse_key(key)?;
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(StoredObject { bytes, image_type })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
