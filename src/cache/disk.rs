use crate::cache::{Cache, CacheError, CacheKey};
use crate::transform::params::ImageRequest;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Filesystem-backed variant cache.
///
/// Variants live at the path their [`CacheKey`] names. There is no index,
/// no eviction and no locking: concurrent writers of one key race to
/// rename identical bytes into place, which is harmless.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Where the variant for `request` lives under this cache's root.
    pub fn key_for(&self, request: &ImageRequest) -> CacheKey {
        CacheKey::derive(
            &self.root,
            &request.bucket,
            &request.path,
            request.width,
            request.quality,
            request.format,
        )
    }

    /// Sibling temp file for `file`, unique across writers and processes.
    fn temp_path_for(file: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(file.file_name().unwrap_or_default());
        name.push(format!(".tmp.{}", Uuid::new_v4()));
        file.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl Cache for DiskCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::metadata(&key.file).await {
            Ok(meta) => {
                if meta.is_file() {
                    match fs::read(&key.file).await {
                        Ok(bytes) => Ok(Some(bytes)),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                        Err(e) => Err(CacheError::Read { path: key.file.clone(), source: e }),
                    }
                } else {
                    Ok(None)
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(CacheError::Read { path: key.file.clone(), source: e })
                }
            }
        }
    }

    async fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&key.dir)
            .await
            .map_err(|e| CacheError::CreateDir { path: key.dir.clone(), source: e })?;

        // Readers must never see a half-written variant.
        let tmp = Self::temp_path_for(&key.file);
        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::Write { path: key.file.clone(), source: e });
        }
        if let Err(e) = fs::rename(&tmp, &key.file).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::Write { path: key.file.clone(), source: e });
        }
        Ok(())
    }
}
