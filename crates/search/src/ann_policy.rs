use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RESTRICTED_CANDIDATES: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnCandidatePolicyConfig {
    /// Largest allow-list passed to the ANN backend as a restriction
    pub max_restricted: usize,
}

impl Default for AnnCandidatePolicyConfig {
    fn default() -> Self {
        Self {
            max_restricted: DEFAULT_MAX_RESTRICTED_CANDIDATES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnCandidateStrategy {
    /// Search the whole index.
    Full,
    /// Search only the allow-listed items.
    Restricted,
    /// Do not query ANN at all.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnPolicyReason {
    NoFilter,
    EmptyAllowlist,
    WithinLimit,
    AllowlistTooLarge,
}

/// How the ANN query is scoped relative to an optional allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnCandidatePolicy {
    pub strategy: AnnCandidateStrategy,
    pub reason: AnnPolicyReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<usize>,
    pub max_restricted: usize,
}

impl AnnCandidatePolicy {
    #[must_use]
    pub const fn skips_ann(&self) -> bool {
        matches!(self.strategy, AnnCandidateStrategy::Skip)
    }

    /// Whether ANN hits must be filtered against the allow-list afterwards.
    #[must_use]
    pub const fn needs_post_filter(&self) -> bool {
        matches!(self.reason, AnnPolicyReason::AllowlistTooLarge)
    }

    #[must_use]
    pub const fn is_restricted(&self) -> bool {
        matches!(self.strategy, AnnCandidateStrategy::Restricted)
    }
}

#[must_use]
pub fn select_ann_candidate_policy(
    allowlist_len: Option<usize>,
    config: &AnnCandidatePolicyConfig,
) -> AnnCandidatePolicy {
    let (strategy, reason) = match allowlist_len {
        None => (AnnCandidateStrategy::Full, AnnPolicyReason::NoFilter),
        Some(0) => (AnnCandidateStrategy::Skip, AnnPolicyReason::EmptyAllowlist),
        Some(len) if len <= config.max_restricted => {
            (AnnCandidateStrategy::Restricted, AnnPolicyReason::WithinLimit)
        }
        Some(_) => (AnnCandidateStrategy::Full, AnnPolicyReason::AllowlistTooLarge),
    };
    AnnCandidatePolicy {
        strategy,
        reason,
        candidate_count: allowlist_len,
        max_restricted: config.max_restricted,
    }
}
