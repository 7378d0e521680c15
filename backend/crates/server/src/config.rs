//! Server configuration
//!
//! Everything is read from environment variables (optionally seeded from a `.env` file by
//! `main`). Unset variables fall back to defaults suited for local development.
use axum::http::HeaderValue;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DATABASE_PATH_VAR: &str = "DATABASE_PATH";
pub const BACKEND_URL_VAR: &str = "BACKEND_URL";
pub const CORS_ORIGIN_VAR: &str = "CORS_ORIGIN";
pub const IMAGE_DIR_VAR: &str = "IMAGE_DIR";
pub const BIND_ADDR_VAR: &str = "BIND_ADDR";
pub const MAX_UPLOAD_BYTES_VAR: &str = "MAX_UPLOAD_BYTES";

const DEFAULT_DATABASE_PATH: &str = "readinglife.db";
const DEFAULT_IMAGE_DIR: &str = "./src/imgs";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const ANY_ORIGIN: &str = "*";

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite database file, created on first start
    pub database_path: PathBuf,
    /// Public base URL prepended to image links, e.g. `https://api.example.com`
    pub backend_url: String,
    /// The single origin allowed to call the API from a browser. `None` (or `*` in the
    /// environment) allows any origin.
    pub cors_origin: Option<HeaderValue>,
    /// Directory holding uploaded images
    pub image_dir: PathBuf,
    pub bind_addr: SocketAddr,
    /// Upper bound for request bodies, which bounds the size of uploaded images
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            backend_url: String::new(),
            cors_origin: None,
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    /// # Errors
    /// Fails if a variable is set to a value that cannot be parsed.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values count as unset.
    /// # Errors
    /// Fails if a variable is set to a value that cannot be parsed.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = get(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidValue {
                key: BIND_ADDR_VAR,
                value: bind_addr.clone(),
                reason: err.to_string(),
            })?;

        let cors_origin = get(CORS_ORIGIN_VAR)
            .filter(|origin| origin.trim() != ANY_ORIGIN)
            .map(|origin| {
                HeaderValue::from_str(origin.trim_end_matches('/')).map_err(|err| {
                    ConfigError::InvalidValue {
                        key: CORS_ORIGIN_VAR,
                        value: origin.clone(),
                        reason: err.to_string(),
                    }
                })
            })
            .transpose()?;

        let max_upload_bytes = get(MAX_UPLOAD_BYTES_VAR)
            .map(|limit| {
                limit
                    .parse::<usize>()
                    .map_err(|err| ConfigError::InvalidValue {
                        key: MAX_UPLOAD_BYTES_VAR,
                        value: limit.clone(),
                        reason: err.to_string(),
                    })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Self {
            database_path: get(DATABASE_PATH_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from),
            backend_url: get(BACKEND_URL_VAR).unwrap_or_default(),
            cors_origin,
            image_dir: get(IMAGE_DIR_VAR).map_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR), PathBuf::from),
            bind_addr,
            max_upload_bytes,
        })
    }

    #[must_use]
    #[inline]
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    #[must_use]
    #[inline]
    pub fn with_backend_url(mut self, backend_url: &str) -> Self {
        backend_url.clone_into(&mut self.backend_url);
        self
    }

    #[must_use]
    #[inline]
    pub fn with_storage(mut self, database_path: PathBuf, image_dir: PathBuf) -> Self {
        self.database_path = database_path;
        self.image_dir = image_dir;
        self
    }

    /// Allow browsers from `origin` only.
    #[must_use]
    #[inline]
    pub fn with_cors_origin(mut self, origin: HeaderValue) -> Self {
        self.cors_origin = Some(origin);
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}
