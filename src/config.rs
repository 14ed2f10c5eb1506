use anyhow::{Context, Result, anyhow, bail};
use std::{
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/video-catalog-env";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_DATABASE_PATH: &str = "videos.db";
pub const DEFAULT_POOL_MAX_SIZE: u32 = 25;
pub const DEFAULT_POOL_MIN_IDLE: u32 = 5;
pub const DEFAULT_POOL_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which [`VideoRepository`](crate::repository::VideoRepository) backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store kind {other:?} (expected sqlite or memory)"),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        })
    }
}

/// Raw settings from one source. `None` means the source did not set it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub database_path: Option<PathBuf>,
    pub store: Option<StoreKind>,
    pub pool_max_size: Option<u32>,
    pub pool_min_idle: Option<u32>,
    pub pool_max_lifetime_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl EnvConfig {
    /// Picks the known keys out of `pairs`; unknown keys and empty values
    /// are skipped. `origin` names the source in error messages.
    pub fn from_pairs<I, K, V>(pairs: I, origin: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            cfg.set(key.as_ref(), value, origin)?;
        }
        Ok(cfg)
    }

    fn set(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        match key {
            "PORT" => self.port = Some(parse_value(key, value, origin)?),
            "VIDEOS_HOST" => self.host = Some(value.to_string()),
            "VIDEOS_DB_PATH" => self.database_path = Some(PathBuf::from(value)),
            "VIDEOS_STORE" => self.store = Some(parse_value(key, value, origin)?),
            "VIDEOS_POOL_MAX_SIZE" => self.pool_max_size = Some(parse_value(key, value, origin)?),
            "VIDEOS_POOL_MIN_IDLE" => self.pool_min_idle = Some(parse_value(key, value, origin)?),
            "VIDEOS_POOL_MAX_LIFETIME_SECS" => {
                self.pool_max_lifetime_secs = Some(parse_value(key, value, origin)?)
            }
            "VIDEOS_REQUEST_TIMEOUT_SECS" => {
                self.request_timeout_secs = Some(parse_value(key, value, origin)?)
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns `self` with every value `other` sets replaced by `other`'s.
    pub fn overlay(self, other: EnvConfig) -> EnvConfig {
        EnvConfig {
            port: other.port.or(self.port),
            host: other.host.or(self.host),
            database_path: other.database_path.or(self.database_path),
            store: other.store.or(self.store),
            pool_max_size: other.pool_max_size.or(self.pool_max_size),
            pool_min_idle: other.pool_min_idle.or(self.pool_min_idle),
            pool_max_lifetime_secs: other.pool_max_lifetime_secs.or(self.pool_max_lifetime_secs),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

fn parse_value<T>(key: &str, value: &str, origin: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|err| anyhow!("Parsing {key}={value:?} from {origin}: {err}"))
}

/// Reads a `KEY=VALUE` file. Returns `Ok(None)` when the file is absent.
pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let pairs = content.lines().filter_map(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        trimmed
            .split_once('=')
            .map(|(key, value)| (key.trim(), value))
    });
    EnvConfig::from_pairs(pairs, &path.display().to_string()).map(Some)
}

pub fn read_process_env() -> Result<EnvConfig> {
    EnvConfig::from_pairs(utf8_pairs(std::env::vars_os()), "environment")
}

/// Drops variables whose name or value is not valid UTF-8; none of ours are.
fn utf8_pairs<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

/// r2d2 pool bounds for the SQLite store.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    pub max_lifetime: Duration,
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            min_idle: DEFAULT_POOL_MIN_IDLE,
            max_lifetime: DEFAULT_POOL_MAX_LIFETIME,
            connection_timeout: DEFAULT_POOL_CONNECTION_TIMEOUT,
        }
    }
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub store: StoreKind,
    pub pool: PoolConfig,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            store: StoreKind::default(),
            pool: PoolConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    /// Fills every unset value with its default and checks the bounds.
    pub fn from_env_config(cfg: EnvConfig) -> Result<Self> {
        let defaults = Self::default();
        let pool = PoolConfig {
            max_size: cfg.pool_max_size.unwrap_or(defaults.pool.max_size),
            min_idle: cfg.pool_min_idle.unwrap_or(defaults.pool.min_idle),
            max_lifetime: cfg
                .pool_max_lifetime_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool.max_lifetime),
            connection_timeout: defaults.pool.connection_timeout,
        };
        if pool.max_size == 0 {
            bail!("VIDEOS_POOL_MAX_SIZE must be at least 1");
        }
        if pool.max_lifetime.is_zero() {
            bail!("VIDEOS_POOL_MAX_LIFETIME_SECS must be at least 1");
        }

        let request_timeout = cfg
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            bail!("VIDEOS_REQUEST_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            host: cfg.host.unwrap_or(defaults.host),
            port: cfg.port.unwrap_or(defaults.port),
            database_path: cfg.database_path.unwrap_or(defaults.database_path),
            store: cfg.store.unwrap_or(defaults.store),
            pool,
            request_timeout,
        })
    }
}

/// Loads settings from defaults, then `config_file`, then the process
/// environment. An explicitly given file must exist; without one the
/// default path is read if present.
pub fn load_service_config(config_file: Option<&Path>) -> Result<ServiceConfig> {
    load_service_config_from(config_file, read_process_env()?)
}

pub fn load_service_config_from(
    config_file: Option<&Path>,
    process_env: EnvConfig,
) -> Result<ServiceConfig> {
    let from_file = match config_file {
        Some(path) => read_env_config(path)?
            .ok_or_else(|| anyhow!("Missing config file at {}", path.display()))?,
        None => read_env_config(Path::new(DEFAULT_CONFIG_PATH))?.unwrap_or_default(),
    };
    ServiceConfig::from_env_config(from_file.overlay(process_env))
}
