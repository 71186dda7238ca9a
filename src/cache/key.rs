use std::path::{Path, PathBuf};

use crate::config::ImageFormat;

/// Location of one variant inside the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Directory holding the variant, created on store.
    pub dir: PathBuf,
    /// Full path of the variant file.
    pub file: PathBuf,
}

impl CacheKey {
    /// Derives `root/bucket/dirname(path)/basename(path)_w{width}_q{quality}{ext}`.
    ///
    /// Pure and deterministic. `path` is expected to be a validated object
    /// path (non-empty `/`-separated segments), so every field of the tuple
    /// appears verbatim in the result and distinct tuples never share a file.
    pub fn derive(
        root: &Path,
        bucket: &str,
        path: &str,
        width: u32,
        quality: u8,
        format: ImageFormat,
    ) -> Self {
        let (parent, base) = match path.rsplit_once('/') {
            Some((parent, base)) => (Some(parent), base),
            None => (None, path),
        };

        let mut dir = root.join(bucket);
        if let Some(parent) = parent {
            for segment in parent.split('/').filter(|s| !s.is_empty()) {
                dir.push(segment);
            }
        }

        let file = dir.join(format!(
            "{}_w{}_q{}{}",
            base,
            width,
            quality,
            format.extension()
        ));
        Self { dir, file }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file.display())
    }
}
