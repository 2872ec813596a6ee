#![forbid(unsafe_code)]

mod cache_policy;
mod error;
mod persistence;
mod pool;

pub use cache_policy::CachePolicy;
pub use error::Error;
pub use persistence::Persistence;
pub use pool::WorkerPool;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variables with this prefix override file values. Nested keys
/// are separated by `__`, e.g. `DNS_PREFETCH_POOL__MAX_WORKERS=16`.
pub const ENV_PREFIX: &str = "DNS_PREFETCH_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cache: CachePolicy,
    pub pool: WorkerPool,
    pub persistence: Persistence,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the config file at `path`, layered over the defaults and under
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_owned()));
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config.sanitized())
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        self.pool = self.pool.clamp();
        self
    }
}
