use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EXPLAIN_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_EXPLAIN_MAX_BYTES: usize = 16 * 1024;
pub const DEFAULT_EXPLAIN_MAX_FIELDS: usize = 64;
pub const DEFAULT_EXPLAIN_MAX_ITEMS: usize = 64;

/// Why a bounded traversal or scan stopped early.
///
/// Budget exhaustion is never an error: callers surface it as a truncation
/// record next to whatever partial result they produced.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    MaxWorkUnits,
    MaxWallClockMs,
    MaxWidthPerNode,
    MaxDepth,
    MaxVisitedNodes,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxWorkUnits => "maxWorkUnits",
            Self::MaxWallClockMs => "maxWallClockMs",
            Self::MaxWidthPerNode => "maxWidthPerNode",
            Self::MaxDepth => "maxDepth",
            Self::MaxVisitedNodes => "maxVisitedNodes",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied context for a truncation record.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct TruncationDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    pub scope: String,
    pub reason: StopReason,
    pub limit: u64,
    pub used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omitted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
}

/// Index partition a query runs against.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    Code,
    Prose,
    ExtractedProse,
    Records,
}

impl SearchMode {
    pub const ALL: [Self; 4] = [Self::Code, Self::Prose, Self::ExtractedProse, Self::Records];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Prose => "prose",
            Self::ExtractedProse => "extracted-prose",
            Self::Records => "records",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "code" => Some(Self::Code),
            "prose" => Some(Self::Prose),
            "extracted-prose" | "extracted_prose" | "extractedprose" => Some(Self::ExtractedProse),
            "records" => Some(Self::Records),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size ceilings for a per-hit explain payload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ExplainLimits {
    pub max_bytes: usize,
    pub max_fields: usize,
    pub max_explain_items: usize,
}

impl Default for ExplainLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_EXPLAIN_MAX_BYTES,
            max_fields: DEFAULT_EXPLAIN_MAX_FIELDS,
            max_explain_items: DEFAULT_EXPLAIN_MAX_ITEMS,
        }
    }
}

pub fn serialized_len<T: Serialize>(value: &T) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

/// Repeatedly shrinks `value` until its compact JSON encoding fits in
/// `max_bytes`. Returns the final size, or `None` when `shrink` gives up
/// before the value fits.
pub fn enforce_max_bytes<T: Serialize>(
    value: &mut T,
    max_bytes: usize,
    mut shrink: impl FnMut(&mut T) -> bool,
) -> Result<Option<usize>> {
    loop {
        let used = serialized_len(value)?;
        if used <= max_bytes {
            return Ok(Some(used));
        }
        if !shrink(value) {
            return Ok(None);
        }
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
