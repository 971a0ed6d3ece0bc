use crate::candidate::{ChunkMeta, FileRelations};
use serde::{Deserialize, Serialize};

/// Chunk kinds that define a symbol rather than merely use one.
pub const DEFINITION_KINDS: &[&str] = &[
    "function",
    "method",
    "class",
    "struct",
    "enum",
    "trait",
    "interface",
    "type",
    "module",
    "const",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SymbolConfig {
    pub enabled: bool,
    pub definition_factor: f64,
    pub export_factor: f64,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            definition_factor: 1.2,
            export_factor: 1.1,
        }
    }
}

impl SymbolConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, factor) in [
            ("definition_factor", self.definition_factor),
            ("export_factor", self.export_factor),
        ] {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(format!("symbol.{name} must be a finite positive number"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBoost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub definition: bool,
    pub exported: bool,
    pub factor: f64,
}

#[must_use]
pub fn is_definition_kind(kind: &str) -> bool {
    DEFINITION_KINDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(kind))
}

/// Multiplicative factor for definitions and exported symbols. `None` when the
/// chunk earns no symbol boost.
#[must_use]
pub fn symbol_boost(
    chunk: &ChunkMeta,
    file_relations: Option<&FileRelations>,
    case_sensitive: bool,
    config: &SymbolConfig,
) -> Option<SymbolBoost> {
    if !config.enabled {
        return None;
    }
    let definition = chunk.kind.as_deref().is_some_and(is_definition_kind);
    let exported = chunk.name.as_deref().is_some_and(|name| {
        let same = |export: &String| {
            if case_sensitive {
                export == name
            } else {
                export.eq_ignore_ascii_case(name)
            }
        };
        chunk.exports.iter().any(same)
            || file_relations.is_some_and(|rel| rel.exports.iter().any(same))
    });
    if !definition && !exported {
        return None;
    }

    let mut factor = 1.0;
    if definition {
        factor *= config.definition_factor;
    }
    if exported {
        factor *= config.export_factor;
    }
    Some(SymbolBoost {
        kind: chunk.kind.clone(),
        definition,
        exported,
        factor,
    })
}
