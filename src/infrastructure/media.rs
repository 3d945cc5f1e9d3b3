//! Filesystem-backed media store.
//!
//! Blobs live under `{media_root}/{audio|images}/` and are referenced by their
//! path relative to the root, e.g. `images/12_3f0c9b1e.jpg`. The same root is
//! served read-only under `/media`.

use crate::infrastructure::entities::MediaKind;
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{MediaStore, StorageError};
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::debug;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub struct LocalMediaStore {
    root: PathBuf,
}

#[injectable(MediaStore)]
impl LocalMediaStore {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> LocalMediaStore {
        LocalMediaStore::new(settings.media_root.clone())
    }

    pub fn new(root: impl Into<PathBuf>) -> LocalMediaStore {
        LocalMediaStore { root: root.into() }
    }

    /// Resolves a key below the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if is_plain {
            Ok(self.root.join(relative))
        } else {
            Err(StorageError::InvalidKey(key.to_owned()))
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(
        &self,
        kind: MediaKind,
        history_id: i64,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        let key = format!(
            "{}/{}_{}.{}",
            kind.directory(),
            history_id,
            Uuid::new_v4().simple(),
            kind.extension()
        );
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("stored {key}");

        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed {key}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
