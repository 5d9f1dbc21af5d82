use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "ksh2vox.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvertConfig {
    /// Written to `#FORMAT VERSION`
    pub format_version: u32,
    /// Stamp the conversion time in the VOX header
    pub include_timestamp: bool,
    pub write_scripts: bool,
    /// Fail the conversion when the reader reports any warning
    pub strict: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            format_version: 12,
            include_timestamp: true,
            write_scripts: true,
            strict: false,
        }
    }
}

impl ConvertConfig {
    /// Loads config from the default config file.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads config from a specified path.
    /// Returns default config if file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = ConvertConfig::default();
        assert_eq!(config.format_version, 12);
        assert!(config.include_timestamp);
        assert!(config.write_scripts);
        assert!(!config.strict);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ConvertConfig = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert!(config.strict);
        assert_eq!(config.format_version, 12);
    }

    #[test]
    fn test_file_io() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("convert.json");

        let config = ConvertConfig {
            format_version: 10,
            include_timestamp: false,
            write_scripts: false,
            strict: true,
        };

        config.save_to(&file_path).unwrap();
        let loaded = ConvertConfig::load_from(&file_path).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_default_file() {
        assert!(!Path::new(CONFIG_FILE).exists());
        assert_eq!(ConvertConfig::load().unwrap(), ConvertConfig::default());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = ConvertConfig::load_from(dir.path().join("nonexistent.json")).unwrap();
        assert_eq!(config, ConvertConfig::default());
    }
}
