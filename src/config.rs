use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Output formats the server can negotiate, in server preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Webp,
    Png,
    Jpeg,
}

impl ImageFormat {
    pub const SUPPORTED: [ImageFormat; 3] = [ImageFormat::Webp, ImageFormat::Png, ImageFormat::Jpeg];

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Canonical file extension, leading dot included.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Webp => ".webp",
            ImageFormat::Png => ".png",
            ImageFormat::Jpeg => ".jpg",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.content_type())
    }
}

pub const DEFAULT_QUALITY: u8 = 80;
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";
pub const DEFAULT_PORT: u16 = 4050;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// S3-compatible endpoint, `host[:port]` without scheme.
    pub s3_endpoint: String,
    pub s3_secure: bool,
    /// Root of the on-disk variant cache.
    pub cache_dir: PathBuf,
    pub port: u16,
    pub max_input_size: usize, // bytes
    pub max_width: u32,
    pub transform_workers: usize,
    pub cache_write_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            s3_endpoint: String::new(),
            s3_secure: false,
            cache_dir: PathBuf::from("./cache"),
            port: DEFAULT_PORT,
            max_input_size: 32 * 1024 * 1024,
            max_width: 8192,
            transform_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            cache_write_queue: 256,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("BACKEND_S3 must be set to the storage endpoint")] MissingEndpoint,
    #[error("Max input size must be > 0")] InvalidMaxInput,
    #[error("Max width must be > 0")] InvalidMaxWidth,
    #[error("Transform workers must be > 0")] InvalidWorkers,
    #[error("Cache write queue must be > 0")] InvalidQueue,
    #[error("{name} has an invalid value `{value}`")] InvalidValue { name: &'static str, value: String },
}

impl ServerConfig {
    /// Reads the configuration from the process environment, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let cfg = Self {
            s3_endpoint: lookup("BACKEND_S3").unwrap_or_default(),
            s3_secure: lookup("BACKEND_S3_SECURE").as_deref() == Some("true"),
            cache_dir: lookup("BACKEND_STORAGE_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            max_input_size: parse_var(&lookup, "MAX_INPUT_SIZE", defaults.max_input_size)?,
            max_width: parse_var(&lookup, "MAX_WIDTH", defaults.max_width)?,
            transform_workers: parse_var(&lookup, "TRANSFORM_WORKERS", defaults.transform_workers)?,
            cache_write_queue: parse_var(&lookup, "CACHE_WRITE_QUEUE", defaults.cache_write_queue)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_endpoint.trim().is_empty() { return Err(ConfigError::MissingEndpoint); }
        if self.max_input_size == 0 { return Err(ConfigError::InvalidMaxInput); }
        if self.max_width == 0 { return Err(ConfigError::InvalidMaxWidth); }
        if self.transform_workers == 0 { return Err(ConfigError::InvalidWorkers); }
        if self.cache_write_queue == 0 { return Err(ConfigError::InvalidQueue); }
        Ok(())
    }

    /// Base URL of the object storage endpoint.
    pub fn s3_base_url(&self) -> String {
        let scheme = if self.s3_secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.s3_endpoint.trim_end_matches('/'))
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            let parsed = value.trim().parse().ok();
            parsed.ok_or(ConfigError::InvalidValue { name, value })
        }
        _ => Ok(default),
    }
}
