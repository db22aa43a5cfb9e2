//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds applied to every program run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum wall-clock time for one interpreter call (milliseconds).
    pub step_timeout_ms: u64,
    /// Maximum number of effects one program may yield.
    pub max_steps: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 5_000,
            max_steps: 256,
        }
    }
}

impl RunnerConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_config_default() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.step_timeout_ms, 5_000);
        assert_eq!(cfg.max_steps, 256);
        assert_eq!(cfg.step_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_runner_config_partial_json_fills_defaults() {
        let cfg: RunnerConfig = serde_json::from_str(r#"{"step_timeout_ms": 250}"#).unwrap();
        assert_eq!(cfg.step_timeout_ms, 250);
        assert_eq!(cfg.max_steps, 256);
    }
}
