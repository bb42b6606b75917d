//! The combined configuration file layout.

use readmit_core::ExtractionConfig;
use readmit_ml::EvaluationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `readmit.toml`: an `[extraction]` and an `[evaluation]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extraction: ExtractionConfig,
    pub evaluation: EvaluationConfig,
}

fn anchor(workspace: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = workspace.join(&*path);
    }
}

impl Settings {
    /// Make every relative path relative to the workspace directory.
    pub fn resolve_paths(mut self, workspace: &Path) -> Self {
        let extraction = &mut self.extraction;
        anchor(workspace, &mut extraction.cache_path);
        anchor(workspace, &mut extraction.dataset_path);
        if let Some(path) = extraction.debug_path.as_mut() {
            anchor(workspace, path);
        }
        if let Some(path) = extraction.database.as_mut() {
            anchor(workspace, path);
        }
        anchor(workspace, &mut self.evaluation.dataset_path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_roundtrip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_workspace_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("readmit.toml"),
            r#"
[extraction]
schema = "clinical"

[[extraction.extractors]]
name = "PayerExtractor"
query = "SELECT hsp_acct_study_id, payer FROM {schema}.payers"

[evaluation]
horizon_days = 14
health_conditions = ["chf"]

[evaluation.splitter]
kind = "k_fold"
n_folds = 5
"#,
        )
        .unwrap();

        let settings: Settings = readmit_core::load_config(Some(dir.path()), None).unwrap();
        assert_eq!(settings.extraction.schema, "clinical");
        assert_eq!(settings.extraction.extractors[0].version, 1);
        assert_eq!(settings.evaluation.horizon_days, 14);
        assert_eq!(
            settings.evaluation.splitter,
            readmit_ml::SplitterConfig::KFold { n_folds: 5 }
        );
        assert!(settings.extraction.load_cache);
    }

    #[test]
    fn test_relative_paths_are_anchored() {
        let settings = Settings::default().resolve_paths(Path::new("/data/run"));
        assert_eq!(
            settings.extraction.cache_path,
            PathBuf::from("/data/run/databuilder-cache.json")
        );
        assert_eq!(
            settings.evaluation.dataset_path,
            PathBuf::from("/data/run/features.csv")
        );
    }
}
