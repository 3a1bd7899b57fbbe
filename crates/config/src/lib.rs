//! Engine configuration.
//!
//! Values are layered with [`figment`], later layers overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. an optional config file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed with `PAGETURN_`, using `__` to nest
//!    (`PAGETURN_CACHE__CAPACITY=20` sets `cache.capacity`).
//!
//! ```toml
//! [preload]
//! radius = 2
//! expanded_radius = 4
//!
//! [flip]
//! cooldown_ms = 300
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "PAGETURN_";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Background chapter prefetch around the reading position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Chapters kept loaded on each side of the current chapter.
    pub radius: usize,
    /// Radius used after the host signals an expansion (fast flipping).
    pub expanded_radius: usize,
    /// Chapters fetched concurrently during one preload pass.
    pub concurrency: usize,
}
impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            expanded_radius: 4,
            concurrency: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum chapters resident outside the protected preload window.
    pub capacity: usize,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 12 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualPageConfig {
    /// Chapters on each side of the current one that contribute pages to the
    /// flat virtual page list.
    pub radius: usize,
}
impl Default for VirtualPageConfig {
    fn default() -> Self {
        Self { radius: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    /// Minimum time between two accepted flips.
    pub cooldown_ms: u64,
}
impl Default for FlipConfig {
    fn default() -> Self {
        Self { cooldown_ms: 300 }
    }
}
impl FlipConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Content source timeouts and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}
impl Default for IoConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retries: 1,
            retry_delay_ms: 200,
        }
    }
}
impl IoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Chapters fetched and split concurrently while building the whole-book
    /// page index.
    pub concurrency: usize,
}
impl Default for PaginationConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preload: PreloadConfig,
    pub cache: CacheConfig,
    pub virtual_pages: VirtualPageConfig,
    pub flip: FlipConfig,
    pub io: IoConfig,
    pub pagination: PaginationConfig,
}

impl EngineConfig {
    /// Load configuration from defaults, `path` (if given) and the
    /// environment.
    ///
    /// An explicit `path` must exist. Without one, the platform config file
    /// from [`default_path()`] is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|path| path.exists()),
        };
        Self::from_figment(Self::figment(path.as_deref())?)
    }

    /// The layered provider without extracting it, for hosts that want to
    /// merge in their own providers.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading engine configuration file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            exn::bail!(ErrorKind::OutOfRange("cache.capacity must be at least 1"));
        }
        if self.preload.concurrency == 0 {
            exn::bail!(ErrorKind::OutOfRange("preload.concurrency must be at least 1"));
        }
        if self.pagination.concurrency == 0 {
            exn::bail!(ErrorKind::OutOfRange("pagination.concurrency must be at least 1"));
        }
        if self.preload.expanded_radius < self.preload.radius {
            exn::bail!(ErrorKind::OutOfRange("preload.expanded_radius must not be smaller than preload.radius"));
        }
        if self.io.timeout_ms == 0 {
            exn::bail!(ErrorKind::OutOfRange("io.timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Platform config file location, e.g. `~/.config/pageturn/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pageturn").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flip.cooldown(), Duration::from_millis(300));
        assert_eq!(config.io.timeout(), Duration::from_secs(10));
        assert_eq!(config.io.retry_delay(), Duration::from_millis(200));
        assert_eq!(config.cache.capacity, 12);
        assert_eq!(config.virtual_pages.radius, 3);
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("pageturn.toml", "[cache]\ncapacity = 20\n\n[preload]\nradius = 1\n")?;
            jail.set_env("PAGETURN_CACHE__CAPACITY", "30");
            let config = EngineConfig::load(Some(Path::new("pageturn.toml"))).unwrap();
            assert_eq!(config.cache.capacity, 30);
            assert_eq!(config.preload.radius, 1);
            assert_eq!(config.preload.expanded_radius, 4);
            Ok(())
        });
    }

    #[test]
    fn yaml_and_json_by_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("engine.yaml", "flip:\n  cooldown_ms: 150\n")?;
            jail.create_file("engine.json", r#"{"pagination": {"concurrency": 8}}"#)?;
            let yaml = EngineConfig::load(Some(Path::new("engine.yaml"))).unwrap();
            let json = EngineConfig::load(Some(Path::new("engine.json"))).unwrap();
            assert_eq!(yaml.flip.cooldown_ms, 150);
            assert_eq!(json.pagination.concurrency, 8);
            Ok(())
        });
    }

    #[test]
    fn missing_or_unsupported_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = EngineConfig::load(Some(&missing)).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(missing));

        let ini = dir.path().join("engine.ini");
        std::fs::write(&ini, "capacity=1").unwrap();
        let err = EngineConfig::load(Some(&ini)).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(ini));
    }

    #[rstest]
    #[case("[cache]\ncapacity = 0\n")]
    #[case("[preload]\nconcurrency = 0\n")]
    #[case("[pagination]\nconcurrency = 0\n")]
    #[case("[preload]\nradius = 5\nexpanded_radius = 4\n")]
    fn test_out_of_range(#[case] toml: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", toml)?;
            let err = EngineConfig::load(Some(Path::new("bad.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::OutOfRange(_)));
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_invalid() {
        Jail::expect_with(|jail| {
            jail.create_file("broken.toml", "[cache]\ncapacity = \"lots\"\n")?;
            let err = EngineConfig::load(Some(Path::new("broken.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::Invalid);
            Ok(())
        });
    }
}
