//! Configuration for the extraction side of readmit.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `readmit.toml` -> `READMIT_` environment -> explicit overrides.
//! The loader is generic so the CLI can layer its combined settings struct
//! through the same chain.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

/// File name of the workspace-level configuration.
pub const WORKSPACE_CONFIG_FILE: &str = "readmit.toml";

/// Prefix for environment overrides (`READMIT_EXTRACTION__SCHEMA`, ...).
pub const ENV_PREFIX: &str = "READMIT_";

/// Settings consumed by the Databuilder and the bundled extractors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// SQLite database holding the curated encounter tables.
    pub database: Option<PathBuf>,
    /// Schema name substituted for `{schema}` in extractor queries.
    pub schema: String,
    /// Durable cache blob.
    pub cache_path: PathBuf,
    /// Output feature matrix.
    pub dataset_path: PathBuf,
    /// Optional debug matrix.
    pub debug_path: Option<PathBuf>,
    /// Read the cache blob at construction. When false every extractor runs.
    pub load_cache: bool,
    /// Emit only the first N columns of every table (testing mode).
    pub test_column_subset: Option<usize>,
    /// Row-key column header written to the matrix file.
    pub index_name: String,
    /// Declarative SQL feature groups.
    pub extractors: Vec<SqlExtractorDef>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            database: None,
            schema: "features".to_string(),
            cache_path: PathBuf::from("databuilder-cache.json"),
            dataset_path: PathBuf::from("features.csv"),
            debug_path: None,
            load_cache: true,
            test_column_subset: None,
            index_name: "hsp_acct_study_id".to_string(),
            extractors: Vec::new(),
        }
    }
}

impl ExtractionConfig {
    /// Reject settings the Databuilder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "index_name must not be empty".into(),
            });
        }
        if self.test_column_subset == Some(0) {
            return Err(ConfigError::Invalid {
                message: "test_column_subset must be at least 1".into(),
            });
        }
        let mut names = std::collections::BTreeSet::new();
        for def in &self.extractors {
            if !names.insert(def.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("extractor '{}' is defined twice", def.name),
                });
            }
        }
        Ok(())
    }
}

/// A feature group defined entirely by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlExtractorDef {
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Query template; `{schema}` is replaced with the configured schema.
    pub query: String,
    #[serde(default = "default_index_column")]
    pub index_column: String,
}

fn default_version() -> u32 {
    1
}

fn default_index_column() -> String {
    "hsp_acct_study_id".to_string()
}

/// Load configuration of type `T` from all layers.
pub fn load_config<T>(workspace: Option<&Path>, overrides: Option<&T>) -> Result<T, ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "readmit", "readmit") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::from(Box::new(e)))
}

/// Load an explicit TOML file on top of the defaults, without other layers.
pub fn load_config_file<T>(path: &Path) -> Result<T, ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::from(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ExtractionConfig::default();
        assert_eq!(config.schema, "features");
        assert_eq!(config.cache_path, PathBuf::from("databuilder-cache.json"));
        assert_eq!(config.index_name, "hsp_acct_study_id");
        assert!(config.load_cache);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file_with_extractors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("extraction.toml");
        std::fs::write(
            &path,
            r#"
schema = "curated"
test_column_subset = 2

[[extractors]]
name = "LabsExtractor"
query = "SELECT * FROM {schema}.labs"
"#,
        )
        .unwrap();

        let config: ExtractionConfig = load_config_file(&path).unwrap();
        assert_eq!(config.schema, "curated");
        assert_eq!(config.test_column_subset, Some(2));
        assert_eq!(config.extractors.len(), 1);
        assert_eq!(config.extractors[0].version, 1);
        assert_eq!(config.extractors[0].index_column, "hsp_acct_study_id");
        assert!(config.load_cache);
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file::<ExtractionConfig>(Path::new("/nonexistent/readmit.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_duplicate_extractor_names_rejected() {
        let def = SqlExtractorDef {
            name: "A".into(),
            prefix: None,
            version: 1,
            query: "SELECT 1".into(),
            index_column: "id".into(),
        };
        let config = ExtractionConfig {
            extractors: vec![def.clone(), def],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
