use std::path::Path;

use anyhow::{anyhow, Context, Result};
use context_ann::ProviderRuntimeConfig;
use context_graph::GraphRankingConfig;
use context_protocol::ExplainLimits;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ann_policy::AnnCandidatePolicyConfig;
use crate::error::SearchError;
use crate::fusion::{FusionConfig, FusionMode};
use crate::phrase::PhraseConfig;
use crate::relation_boost::RelationBoostConfig;
use crate::symbol::SymbolConfig;

const BUILTIN_GENERAL: &str = include_str!("../../../profiles/general.json");
const BUILTIN_GRAPH: &str = include_str!("../../../profiles/graph.json");
const BUILTIN_FAST: &str = include_str!("../../../profiles/fast.toml");

pub const ENV_PREFIX: &str = "CONTEXT_RANK_";

/// Every tunable of one ranking pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankProfile {
    pub top_n: usize,
    /// Extra room in the top-K buffer before it is compacted
    pub top_k_slack: usize,
    pub case_sensitive: bool,
    pub fusion: FusionConfig,
    pub phrase: PhraseConfig,
    pub symbol: SymbolConfig,
    pub relation: RelationBoostConfig,
    pub graph: GraphRankingConfig,
    pub explain: ExplainLimits,
    pub ann_policy: AnnCandidatePolicyConfig,
    pub providers: ProviderRuntimeConfig,
}

impl Default for RankProfile {
    fn default() -> Self {
        Self {
            top_n: 10,
            top_k_slack: 32,
            case_sensitive: false,
            fusion: FusionConfig::default(),
            phrase: PhraseConfig::default(),
            symbol: SymbolConfig::default(),
            relation: RelationBoostConfig::default(),
            graph: GraphRankingConfig::default(),
            explain: ExplainLimits::default(),
            ann_policy: AnnCandidatePolicyConfig::default(),
            providers: ProviderRuntimeConfig::default(),
        }
    }
}

impl RankProfile {
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "general" => Self::from_bytes("general", BUILTIN_GENERAL.as_bytes(), None).ok(),
            "graph" => Self::from_bytes("graph", BUILTIN_GRAPH.as_bytes(), Some("general")).ok(),
            "fast" => Self::from_bytes("fast", BUILTIN_FAST.as_bytes(), Some("general")).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn builtin_names() -> &'static [&'static str] {
        &["general", "graph", "fast"]
    }

    /// Reads a JSON or TOML profile layered over the `general` builtin.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read profile file {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom");
        Self::from_bytes(name, &bytes, Some("general"))
    }

    pub fn from_bytes(profile_name: &str, bytes: &[u8], base: Option<&str>) -> Result<Self> {
        let overlay = parse_value(bytes).with_context(|| {
            format!("Profile '{profile_name}' is not valid JSON/TOML configuration")
        })?;
        let merged = match base {
            Some(base_name) => {
                let base = Self::builtin(base_name)
                    .ok_or_else(|| anyhow!("Unknown base profile '{base_name}'"))?;
                let mut value = serde_json::to_value(base)?;
                merge_values(&mut value, overlay);
                value
            }
            None => overlay,
        };
        let profile: Self = serde_json::from_value(merged)
            .map_err(|err| anyhow!("Profile '{profile_name}' parse error: {err}"))?;
        profile
            .validate()
            .with_context(|| format!("Profile '{profile_name}' failed validation"))?;
        Ok(profile)
    }

    /// Applies `CONTEXT_RANK_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<Vec<String>> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup` and returns the variables that
    /// were set. Blank values are ignored.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<String>> {
        let mut applied = Vec::new();
        let mut read = |suffix: &str| -> Option<(String, String)> {
            let key = format!("{ENV_PREFIX}{suffix}");
            let value = lookup(&key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())?;
            applied.push(key.clone());
            Some((key, value))
        };

        if let Some((key, raw)) = read("TOP_N") {
            self.top_n = parse_env(&key, &raw)?;
        }
        if let Some((key, raw)) = read("TOP_K_SLACK") {
            self.top_k_slack = parse_env(&key, &raw)?;
        }
        if let Some((key, raw)) = read("CASE_SENSITIVE") {
            self.case_sensitive = parse_bool(&key, &raw)?;
        }
        if let Some((key, raw)) = read("FUSION") {
            self.fusion.mode = match raw.to_ascii_lowercase().as_str() {
                "rrf" => FusionMode::Rrf,
                "blend" => FusionMode::Blend,
                other => return Err(anyhow!("{key}: unknown fusion mode '{other}'")),
            };
        }
        if let Some((key, raw)) = read("GRAPH") {
            self.graph.enabled = parse_bool(&key, &raw)?;
        }
        if let Some((key, raw)) = read("GRAPH_MAX_WORK_UNITS") {
            self.graph.max_work_units = Some(parse_env(&key, &raw)?);
        }
        if let Some((key, raw)) = read("GRAPH_MAX_WALL_CLOCK_MS") {
            self.graph.max_wall_clock_ms = Some(parse_env(&key, &raw)?);
        }
        if let Some((key, raw)) = read("EXPLAIN_MAX_BYTES") {
            self.explain.max_bytes = parse_env(&key, &raw)?;
        }
        if let Some((key, raw)) = read("ADAPTIVE") {
            self.providers.adaptive = parse_bool(&key, &raw)?;
        }
        if let Some((key, raw)) = read("PREFLIGHT_TTL_MS") {
            self.providers.preflight_ttl_ms = parse_env(&key, &raw)?;
        }
        drop(read);

        self.validate()
            .context("Environment overrides produced an invalid profile")?;
        Ok(applied)
    }

    pub fn validate(&self) -> std::result::Result<(), SearchError> {
        let invalid = SearchError::InvalidProfile;
        if self.top_n == 0 {
            return Err(invalid("top_n must be > 0".to_string()));
        }
        self.fusion.validate().map_err(invalid)?;
        self.phrase.validate().map_err(invalid)?;
        self.symbol.validate().map_err(invalid)?;
        self.relation.validate().map_err(invalid)?;
        self.graph
            .validate()
            .map_err(|err| invalid(err.to_string()))?;
        self.providers
            .validate()
            .map_err(|err| invalid(err.to_string()))?;
        if self.explain.max_bytes == 0 {
            return Err(invalid("explain.max_bytes must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| anyhow!("{key}={raw} is invalid: {err}"))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{key}={raw} is not a boolean")),
    }
}

fn parse_value(bytes: &[u8]) -> Result<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                anyhow!("Profile is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}")
            })?;
            serde_json::to_value(toml_value)
                .map_err(|err| anyhow!("Failed to convert TOML profile to JSON: {err}"))
        }
    }
}

/// Deep-merges `overlay` into `base`; objects merge key by key, everything
/// else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
