use folio_core::{FolioError, Result, StoreLayout};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_NAME: &str = "folio";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Recorded on versions when a command does not name an editor.
    #[serde(default = "default_editor")]
    pub default_editor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Overrides `<data_dir>/metadata.db`.
    #[serde(default)]
    pub metadata_file: Option<PathBuf>,
    /// Overrides `<data_dir>/blobs`.
    #[serde(default)]
    pub blobs_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            metadata_file: None,
            blobs_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn layout(&self) -> StoreLayout {
        let defaults = StoreLayout::in_dir(&self.data_dir);
        StoreLayout {
            metadata_path: self
                .metadata_file
                .clone()
                .unwrap_or(defaults.metadata_path),
            blobs_dir: self.blobs_dir.clone().unwrap_or(defaults.blobs_dir),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "folio=info".to_string()
}

fn default_editor() -> String {
    "Anonymous".to_string()
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("FOLIO")
        .prefix_separator("_")
        .separator("__")
}

impl Config {
    /// Load `path`, or an optional `folio.{yaml,toml,json}` in the working
    /// directory when no path is given. `FOLIO_` environment variables win
    /// over file values; nested keys use `__` (`FOLIO_STORAGE__DATA_DIR`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&str>, env: ::config::Environment) -> Result<Self> {
        let file = match path {
            Some(path) => ::config::File::with_name(path),
            None => ::config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .map_err(|e| FolioError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| FolioError::Config(e.to_string()))?;

        if config.default_editor.trim().is_empty() {
            return Err(FolioError::Config(
                "default_editor cannot be empty".to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("folio.yaml");
        std::fs::write(
            &path,
            "storage:\n  data_dir: /var/lib/folio\n  blobs_dir: /mnt/blobs\ndefault_editor: Editor\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.default_editor, "Editor");
        assert_eq!(config.log_level, "folio=info");

        let layout = config.storage.layout();
        assert_eq!(layout.metadata_path, PathBuf::from("/var/lib/folio/metadata.db"));
        assert_eq!(layout.blobs_dir, PathBuf::from("/mnt/blobs"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("folio.yaml");
        std::fs::write(&path, "default_editor: Editor\nlog_level: folio=debug\n").unwrap();

        let vars = ::config::Map::from([
            ("FOLIO_DEFAULT_EDITOR".to_string(), "FromEnv".to_string()),
            ("FOLIO_STORAGE__DATA_DIR".to_string(), "/srv/folio".to_string()),
            ("OTHER_LOG_LEVEL".to_string(), "ignored".to_string()),
        ]);
        let config = Config::load_with_env(path.to_str(), environment().source(Some(vars))).unwrap();

        assert_eq!(config.default_editor, "FromEnv");
        assert_eq!(config.log_level, "folio=debug");
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/folio"));
        assert_eq!(
            config.storage.layout().metadata_path,
            PathBuf::from("/srv/folio/metadata.db")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        let err = Config::load(path.to_str()).unwrap_err();
        assert!(matches!(err, FolioError::Config(_)));
    }

    #[test]
    fn test_blank_editor_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("folio.toml");
        std::fs::write(&path, "default_editor = \"  \"\n").unwrap();

        let err = Config::load(path.to_str()).unwrap_err();
        assert!(matches!(err, FolioError::Config(_)));
    }
}
