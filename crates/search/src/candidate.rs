use serde::{Deserialize, Serialize};

/// Which signal produced a candidate's fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    Sparse,
    Ann,
    Rrf,
    Blend,
}

impl ScoreType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sparse => "sparse",
            Self::Ann => "ann",
            Self::Rrf => "rrf",
            Self::Blend => "blend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RrfInfo {
    pub k: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_rank: Option<usize>,
    pub sparse_contribution: f64,
    pub ann_contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendInfo {
    pub sparse_weight: f64,
    pub ann_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_normalized: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ann_normalized: Option<f64>,
}

/// One fused sparse+ANN candidate entering the rank stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntry {
    pub idx: usize,
    pub score: f64,
    pub score_type: ScoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ann_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ann_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf: Option<RrfInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_info: Option<BlendInfo>,
}

impl CandidateEntry {
    #[must_use]
    pub fn sparse(idx: usize, score: f64) -> Self {
        Self {
            idx,
            score,
            score_type: ScoreType::Sparse,
            sparse_score: Some(score),
            sparse_type: None,
            ann_score: None,
            ann_source: None,
            rrf: None,
            blend_info: None,
        }
    }

    #[must_use]
    pub fn ann(idx: usize, score: f64, source: Option<&str>) -> Self {
        Self {
            idx,
            score,
            score_type: ScoreType::Ann,
            sparse_score: None,
            sparse_type: None,
            ann_score: Some(score),
            ann_source: source.map(str::to_string),
            rrf: None,
            blend_info: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallDetail {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeRelations {
    pub calls: Vec<String>,
    pub call_details: Vec<CallDetail>,
    pub usages: Vec<String>,
}

impl CodeRelations {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.call_details.is_empty() && self.usages.is_empty()
    }
}

/// Corpus metadata for one chunk, as consulted by the boosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkMeta {
    /// Graph node id; content-addressed chunk identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
    #[serde(skip_serializing_if = "CodeRelations::is_empty")]
    pub code_relations: CodeRelations,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

impl ChunkMeta {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn calls<I, S>(mut self, calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.code_relations.calls = calls.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn usages<I, S>(mut self, usages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.code_relations.usages = usages.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn exports<I, S>(mut self, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports = exports.into_iter().map(Into::into).collect();
        self
    }

    /// Language from metadata, falling back to the file extension.
    #[must_use]
    pub fn language_hint(&self) -> Option<&str> {
        self.language.as_deref().or_else(|| {
            std::path::Path::new(&self.file)
                .extension()
                .and_then(|ext| ext.to_str())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportLink {
    pub from: String,
    pub to: String,
}

/// File-level relations resolved once per file path and query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileRelations {
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub usages: Vec<String>,
    pub import_links: Vec<ImportLink>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunk_meta_reads_camel_case_with_missing_fields() {
        let meta: ChunkMeta = serde_json::from_str(
            r#"{"file":"src/lib.rs","kind":"function","codeRelations":{"calls":["a::b"]}}"#,
        )
        .unwrap();
        assert_eq!(meta.code_relations.calls, vec!["a::b".to_string()]);
        assert!(meta.tokens.is_empty());
        assert_eq!(meta.language_hint(), Some("rs"));
    }

    #[test]
    fn explicit_language_wins_over_extension() {
        let meta = ChunkMeta::new("build.gradle").language("java");
        assert_eq!(meta.language_hint(), Some("java"));
    }
}
