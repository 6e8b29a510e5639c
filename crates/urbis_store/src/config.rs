use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use urbis_core::{UrbisError, UrbisResult};

const DEFAULT_CONFIG_NAME: &str = "urbis.json";
const DEFAULT_DB_NAME: &str = "urbis.sqlite";

pub const MAX_INSERT_BATCH: usize = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_insert_batch: Option<usize>,
    pub max_in_params: Option<usize>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_insert_batch: Some(MAX_INSERT_BATCH),
            max_in_params: Some(900),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub meters_per_unit: Option<f64>,
    pub context_buffer_meters: Option<f64>,
    pub crop_min_share: Option<f64>,
    pub region_level: Option<i32>,
}

impl GeometryConfig {
    pub fn with_defaults() -> Self {
        Self {
            meters_per_unit: Some(111_320.0),
            context_buffer_meters: Some(3_000.0),
            crop_min_share: Some(0.1),
            region_level: Some(2),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UrbisConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    pub geometry: Option<GeometryConfig>,
    pub failpoints: Option<Vec<String>>,
}

impl UrbisConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            geometry: Some(GeometryConfig::with_defaults()),
            failpoints: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> UrbisResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| UrbisError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| UrbisError::storage(format!("read config: {err}")))?;
            let config: UrbisConfig =
                serde_json::from_str(&raw).map_err(|err| UrbisError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = UrbisConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| UrbisError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| UrbisError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> UrbisResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            DatabaseConfig::Postgres { .. } => {
                Err(UrbisError::invalid("config is not sqlite backend"))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } => Some(url.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_default_config_once() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("custom.sqlite");
        let config = UrbisConfig::load_or_init(dir.path(), &db).expect("init");
        assert_eq!(config.backend_name(), "sqlite");
        assert!(dir.path().join(DEFAULT_CONFIG_NAME).exists());
        let again = UrbisConfig::load_or_init(dir.path(), Path::new("/elsewhere.sqlite"))
            .expect("reload");
        assert_eq!(again.sqlite_path(dir.path()).expect("path"), db);
    }

    #[test]
    fn parses_postgres_backend() {
        let raw = r#"{"database":{"backend":"postgres","url":"postgres://localhost/urbis"},
            "pool":{"max_connections":4,"min_connections":null,"connect_timeout_ms":null,
            "acquire_timeout_ms":null,"idle_timeout_ms":null},
            "limits":null,"geometry":null,"failpoints":null}"#;
        let config: UrbisConfig = serde_json::from_str(raw).expect("parse");
        assert_eq!(config.backend_name(), "postgres");
        assert_eq!(config.connection_url(), Some("postgres://localhost/urbis"));
        assert!(config.sqlite_path(Path::new("/tmp")).is_err());
    }

    #[test]
    fn relative_sqlite_path_joins_base_dir() {
        let config = UrbisConfig::default_sqlite("data.sqlite");
        let path = config.sqlite_path(Path::new("/srv/urbis")).expect("path");
        assert_eq!(path, PathBuf::from("/srv/urbis/data.sqlite"));
    }
}
