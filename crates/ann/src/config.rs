use crate::error::{AnnError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderRuntimeConfig {
    /// Reorder backends by observed health before each query
    pub adaptive: bool,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// How long a successful preflight is trusted
    pub preflight_ttl_ms: u64,
    pub failure_penalty_weight: f64,
    pub preflight_penalty_weight: f64,
    /// Smoothing factor of the latency moving average, in (0, 1]
    pub latency_alpha: f64,
}

impl Default for ProviderRuntimeConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            preflight_ttl_ms: 300_000,
            failure_penalty_weight: 1.0,
            preflight_penalty_weight: 3.0,
            latency_alpha: 0.3,
        }
    }
}

impl ProviderRuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.latency_alpha > 0.0 && self.latency_alpha <= 1.0) {
            return Err(AnnError::Other(format!(
                "providers.latency_alpha must be in (0, 1], got {}",
                self.latency_alpha
            )));
        }
        for (name, value) in [
            ("failure_penalty_weight", self.failure_penalty_weight),
            ("preflight_penalty_weight", self.preflight_penalty_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnnError::Other(format!(
                    "providers.{name} must be a finite non-negative number"
                )));
            }
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(AnnError::Other(format!(
                "providers.base_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// `min(max_backoff, base * 2^(failures - 1))`
    #[must_use]
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let base = Duration::from_millis(self.base_backoff_ms);
        base.saturating_mul(1u32 << exponent)
            .min(Duration::from_millis(self.max_backoff_ms))
    }

    #[must_use]
    pub const fn preflight_ttl(&self) -> Duration {
        Duration::from_millis(self.preflight_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let cfg = ProviderRuntimeConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 500,
            ..Default::default()
        };
        assert_eq!(cfg.backoff_for(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_for(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_for(3), Duration::from_millis(400));
        assert_eq!(cfg.backoff_for(4), Duration::from_millis(500));
        assert_eq!(cfg.backoff_for(200), Duration::from_millis(500));
    }

    #[test]
    fn validate_catches_bad_alpha_and_backoff() {
        let mut cfg = ProviderRuntimeConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.latency_alpha = 0.0;
        assert!(cfg.validate().is_err());
        cfg.latency_alpha = 0.5;
        cfg.base_backoff_ms = 10_000;
        cfg.max_backoff_ms = 1_000;
        assert!(cfg.validate().is_err());
    }
}
