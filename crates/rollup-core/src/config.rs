//! Engine tuning knobs
//!
//! Loaded from a TOML file by the CLI or from the `profiles` table by the
//! store. Every field has a default so partial documents are accepted.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RollupError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bulk runs touching more calculation items than this go async
    pub sync_threshold: usize,
    /// Maximum parent ids per asynchronous chunk
    pub chunk_size: usize,
    /// Maximum parent updates per host write call
    pub write_batch_size: usize,
    pub max_definitions_per_request: usize,
    /// Reject FIRST/LAST/MOST/LEAST without order-bys instead of using fetch order
    pub require_explicit_order_by: bool,
    /// Deployment namespace prefix for custom field identifiers
    pub namespace: String,
    pub poll: PollConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_threshold: 2000,
            chunk_size: 500,
            write_batch_size: 200,
            max_definitions_per_request: 200,
            require_explicit_order_by: false,
            namespace: String::new(),
            poll: PollConfig::default(),
        }
    }
}

/// Job status polling backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 3000,
            max_interval_ms: 10_000,
            max_attempts: 360,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document and validate it
    ///
    /// # Errors
    ///
    /// Returns `RollupError::Serialization` for malformed TOML and
    /// `RollupError::InvalidDefinition` for out-of-range values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| RollupError::Serialization {
            message: format!("invalid engine config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| RollupError::Serialization {
            message: e.to_string(),
        })
    }

    /// Zero sizes would make chunking and batching loop forever
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("chunk_size", self.chunk_size),
            ("write_batch_size", self.write_batch_size),
            ("max_definitions_per_request", self.max_definitions_per_request),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);
        if let Some((name, _)) = zero {
            return Err(RollupError::InvalidDefinition {
                reason: format!("engine config '{}' must be greater than zero", name),
            });
        }
        if self.poll.initial_interval_ms > self.poll.max_interval_ms {
            return Err(RollupError::InvalidDefinition {
                reason: "poll.initial_interval_ms exceeds poll.max_interval_ms".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.sync_threshold, 2000);
        assert_eq!(c.poll.initial_interval_ms, 3000);
        assert_eq!(c.poll.max_interval_ms, 10_000);
        assert!(!c.require_explicit_order_by);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = EngineConfig::from_toml_str(
            r#"
            chunk_size = 50
            namespace = "acme__"

            [poll]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.chunk_size, 50);
        assert_eq!(c.namespace, "acme__");
        assert_eq!(c.poll.max_attempts, 5);
        assert_eq!(c.poll.initial_interval_ms, 3000);
        assert_eq!(c.write_batch_size, 200);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = EngineConfig::from_toml_str("chunk_size = 0").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let c = EngineConfig {
            sync_threshold: 10,
            ..EngineConfig::default()
        };
        let s = c.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&s).unwrap(), c);
    }
}
