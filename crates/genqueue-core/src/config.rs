//! Config - queue の設定
//!
//! 全フィールドにデフォルトがあるので、空ファイル（またはファイルなし）でも動く。
//! 優先度の低い順:
//! 1. 組み込みデフォルト
//! 2. TOML ファイル（`QueueConfig::load`）
//! 3. `GENQUEUE_*` 環境変数（`apply_env_overrides`）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::CircuitBreakerConfig;

pub const ENV_FAILURE_THRESHOLD: &str = "GENQUEUE_FAILURE_THRESHOLD";
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "GENQUEUE_DEFAULT_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub breaker: CircuitBreakerConfig,

    /// timeout 指定のない task に適用する budget。
    /// `None` なら無期限に走れる。
    pub default_timeout_ms: Option<u64>,

    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// 終了済み task の record を snapshot に何件残すか
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_terminal_records: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_terminal_records: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` の directive。`RUST_LOG` があればそちらが優先
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<QueueConfig>(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// `apply_env_overrides` と同じだが、変数を `lookup` 経由で読む。
    /// 空白だけの値は無視する。
    pub fn apply_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_FAILURE_THRESHOLD) {
            self.breaker.failure_threshold = v.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_FAILURE_THRESHOLD}={v} is not a number"))
            })?;
        }
        if let Some(v) = get(ENV_DEFAULT_TIMEOUT_MS) {
            let ms: u64 = v.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_DEFAULT_TIMEOUT_MS}={v} is not a number"))
            })?;
            self.default_timeout_ms = Some(ms);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.default_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = QueueConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, QueueConfig::default());
        assert_eq!(cfg.breaker.failure_threshold, 3);
        assert_eq!(cfg.retention.max_terminal_records, 100);
        assert_eq!(cfg.default_timeout(), None);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = QueueConfig::from_toml_str(
            r#"
            default_timeout_ms = 90000

            [breaker]
            failure_threshold = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.breaker.failure_threshold, 5);
        assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = QueueConfig::from_toml_str("[breaker]\nfailure_threshold = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_FAILURE_THRESHOLD, "7"),
            (ENV_DEFAULT_TIMEOUT_MS, " 2500 "),
        ]);
        let cfg = QueueConfig::default()
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(cfg.breaker.failure_threshold, 7);
        assert_eq!(cfg.default_timeout_ms, Some(2500));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let cfg = QueueConfig::default()
            .apply_overrides_from(|_| Some("   ".to_string()))
            .unwrap();
        assert_eq!(cfg, QueueConfig::default());
    }

    #[test]
    fn non_numeric_env_value_is_invalid() {
        let err = QueueConfig::default()
            .apply_overrides_from(|k| (k == ENV_FAILURE_THRESHOLD).then(|| "three".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_zero_threshold_and_zero_timeout() {
        let mut cfg = QueueConfig::default();
        cfg.breaker.failure_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = QueueConfig::default();
        cfg.default_timeout_ms = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = QueueConfig::load("/definitely/not/here/genqueue.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
