use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The file is parsed as TOML and validated; unknown keys are rejected.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect configuration changes between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.service.workers, 8);
        assert_eq!(config.service.per_crawl_concurrency, 20);
        assert_eq!(config.limits.max_attempts, 3);
        assert_eq!(config.robots.cache_ttl_secs, 3_600);
    }

    #[test]
    fn test_kebab_case_keys() {
        let file = write_config(
            r#"
[service]
workers = 4
per-crawl-concurrency = 5

[fetch]
user-agent = "TestBot/1.0"
headless-endpoint = "http://localhost:3000"

[normalize]
param-sensitive-hosts = ["picky.example"]
"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.service.workers, 4);
        assert_eq!(config.service.per_crawl_concurrency, 5);
        assert_eq!(config.fetch.user_agent, "TestBot/1.0");
        assert_eq!(config.fetch.headless_endpoint, "http://localhost:3000");
        assert_eq!(config.normalize.param_sensitive_hosts, vec!["picky.example"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = write_config("[service]\nworkres = 4\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[service]\nworkers = 0\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let first = write_config("[service]\nworkers = 4\n");
        let second = write_config("[service]\nworkers = 5\n");

        let hash_a = compute_config_hash(first.path()).unwrap();
        let hash_b = compute_config_hash(second.path()).unwrap();
        assert_ne!(hash_a, hash_b);

        let (config, hash) = load_config_with_hash(first.path()).unwrap();
        assert_eq!(config.service.workers, 4);
        assert_eq!(hash, hash_a);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/dredge.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
