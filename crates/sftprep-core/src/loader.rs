//! Loading data config documents from disk.

use crate::config::DataConfig;
use crate::error::Result;
use crate::validate::validate_data_config;
use std::path::Path;

/// Read a YAML or JSON document into a raw value tree.
///
/// Files with a `.json` extension are parsed as JSON, anything else as YAML.
pub fn load_yaml_or_json(path: impl AsRef<Path>) -> Result<serde_yaml::Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Load a data config file and validate it.
pub fn load_and_validate_data_config(path: impl AsRef<Path>) -> Result<DataConfig> {
    let path = path.as_ref();
    tracing::debug!("Loading data config from {}", path.display());
    let raw = load_yaml_or_json(path)?;
    validate_data_config(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "dataprocessor:\n  seed: 11\ndatasets:\n  - name: tweets\n    data_paths: [/data/tweets.jsonl]"
        )
        .unwrap();

        let config = load_and_validate_data_config(file.path()).unwrap();
        assert_eq!(config.dataprocessor.seed, 11);
        assert_eq!(config.datasets[0].name, "tweets");
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"datasets": [{{"data_paths": ["/data/a.jsonl"], "sampling": 1.0}}]}}"#
        )
        .unwrap();

        let config = load_and_validate_data_config(file.path()).unwrap();
        assert_eq!(config.datasets[0].sampling, Some(1.0));
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, "datasets: [").unwrap();
        assert!(matches!(
            load_and_validate_data_config(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_and_validate_data_config("/nonexistent/data_config.yaml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    #[serial]
    fn test_relative_path_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train.jsonl"), "{}\n").unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = DataConfig::from_yaml_str(
            "datasets:\n  - data_paths: [train.jsonl, missing.jsonl]\n",
        );
        std::env::set_current_dir(previous).unwrap();

        let config = result.unwrap();
        let paths = &config.datasets[0].data_paths;
        assert!(Path::new(&paths[0]).is_absolute());
        assert!(paths[0].ends_with("train.jsonl"));
        assert_eq!(paths[1], "missing.jsonl");
    }
}
