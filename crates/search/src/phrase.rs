use crate::tokens::fold;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhraseConfig {
    pub enabled: bool,
    pub min_ngram: usize,
    pub max_ngram: usize,
    pub per_match: f64,
    /// Upper bound of the multiplicative factor
    pub cap: f64,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ngram: 2,
            max_ngram: 3,
            per_match: 0.1,
            cap: 0.5,
        }
    }
}

impl PhraseConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_ngram < 2 || self.min_ngram > self.max_ngram {
            return Err(format!(
                "phrase n-gram range {}..={} is invalid (min must be >= 2 and <= max)",
                self.min_ngram, self.max_ngram
            ));
        }
        if !(self.per_match.is_finite() && self.per_match >= 0.0) {
            return Err("phrase.per_match must be a finite non-negative number".to_string());
        }
        if !(self.cap.is_finite() && self.cap >= 0.0) {
            return Err("phrase.cap must be a finite non-negative number".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhraseBoost {
    pub matches: usize,
    pub factor: f64,
    pub matched: Vec<String>,
}

/// Distinct n-grams of `words` for every n in the configured range, in
/// first-occurrence order.
#[must_use]
pub fn query_ngrams(words: &[String], config: &PhraseConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for n in config.min_ngram..=config.max_ngram {
        for window in words.windows(n) {
            let gram = window.join(" ");
            if seen.insert(gram.clone()) {
                out.push(gram);
            }
        }
    }
    out
}

/// Multiplicative boost for query phrases that also occur in the chunk's
/// token stream. `None` when nothing matched.
#[must_use]
pub fn phrase_boost(
    query_ngrams: &[String],
    chunk_tokens: &[String],
    case_sensitive: bool,
    config: &PhraseConfig,
) -> Option<PhraseBoost> {
    if !config.enabled || query_ngrams.is_empty() || chunk_tokens.len() < config.min_ngram {
        return None;
    }
    let tokens: Vec<String> = chunk_tokens
        .iter()
        .map(|t| fold(t, case_sensitive))
        .collect();
    let mut chunk_grams = HashSet::new();
    for n in config.min_ngram..=config.max_ngram {
        for window in tokens.windows(n) {
            chunk_grams.insert(window.join(" "));
        }
    }

    let matched: Vec<String> = query_ngrams
        .iter()
        .filter(|gram| chunk_grams.contains(gram.as_str()))
        .cloned()
        .collect();
    if matched.is_empty() {
        return None;
    }
    let factor = (matched.len() as f64 * config.per_match).min(config.cap);
    Some(PhraseBoost {
        matches: matched.len(),
        factor,
        matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn ngrams_cover_configured_range() {
        let grams = query_ngrams(&words("read config file"), &PhraseConfig::default());
        assert_eq!(grams, vec!["read config", "config file", "read config file"]);
    }

    #[test]
    fn boost_scales_with_matches_and_caps() {
        let cfg = PhraseConfig::default();
        let grams = query_ngrams(&words("read config file"), &cfg);
        let boost = phrase_boost(&grams, &words("fn Read config file now"), false, &cfg).unwrap();
        assert_eq!(boost.matches, 3);
        assert!((boost.factor - 0.3).abs() < 1e-12);

        let capped = PhraseConfig {
            per_match: 0.4,
            ..PhraseConfig::default()
        };
        let boost = phrase_boost(&grams, &words("read config file"), false, &capped).unwrap();
        assert_eq!(boost.factor, 0.5);
    }

    #[test]
    fn no_match_yields_none() {
        let cfg = PhraseConfig::default();
        let grams = query_ngrams(&words("read config"), &cfg);
        assert_eq!(phrase_boost(&grams, &words("config read"), false, &cfg), None);
        assert_eq!(phrase_boost(&grams, &words("Read Config"), true, &cfg), None);
    }
}
