use crate::config::{env_u64, env_usize};

pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS: usize = 1000;
pub const DEFAULT_LOG_EVERY: usize = 100;

/// Limits and header allow-list for contact imports.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub max_file_bytes: u64,
    pub max_rows: usize,
    /// Emit a progress log event every `log_every` rows.
    pub log_every: usize,
    pub required_headers: Vec<String>,
    pub optional_headers: Vec<String>,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            max_file_bytes: env_u64(&lookup, "CAMPAIGN_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
            max_rows: env_usize(&lookup, "CAMPAIGN_MAX_ROWS", DEFAULT_MAX_ROWS),
            log_every: env_usize(&lookup, "CAMPAIGN_LOG_EVERY", DEFAULT_LOG_EVERY).max(1),
            ..Self::default()
        }
    }

    pub fn is_known_header(&self, header: &str) -> bool {
        self.required_headers.iter().any(|h| h == header)
            || self.optional_headers.iter().any(|h| h == header)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            log_every: DEFAULT_LOG_EVERY,
            required_headers: vec!["name".to_string(), "email".to_string()],
            optional_headers: vec!["company".to_string(), "role".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_overrides_limits() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("CAMPAIGN_MAX_ROWS", "50"), ("CAMPAIGN_LOG_EVERY", "0")]);
        let config = IngestConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_rows, 50);
        assert_eq!(config.log_every, 1);
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        assert!(config.is_known_header("company"));
        assert!(!config.is_known_header("phone"));
    }
}
