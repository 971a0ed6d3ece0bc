use crate::candidate::{BlendInfo, CandidateEntry, RrfInfo, ScoreType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    #[default]
    Rrf,
    Blend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    pub mode: FusionMode,
    /// RRF constant k (typically 60)
    pub k: f64,
    pub sparse_weight: f64,
    pub ann_weight: f64,
    /// Label recorded as `sparseType` on every entry with a sparse score
    pub sparse_type: String,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            mode: FusionMode::Rrf,
            k: 60.0,
            sparse_weight: 1.0,
            ann_weight: 1.0,
            sparse_type: "bm25".to_string(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.k.is_finite() || self.k < 0.0 {
            return Err("fusion.k must be a finite non-negative number".to_string());
        }
        for (name, weight) in [
            ("sparse_weight", self.sparse_weight),
            ("ann_weight", self.ann_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("fusion.{name} must be a finite non-negative number"));
            }
        }
        Ok(())
    }
}

/// Fuses a sparse and an ANN result list into rank-stage candidates.
///
/// Lists need not be sorted; each is ranked by score descending (index
/// ascending on ties) and duplicate indices keep their best score. When only
/// one list has entries the raw scores pass through with `sparse`/`ann` as the
/// score type.
///
/// RRF formula: score(d) = Σ weight_i / (k + rank_i(d) + 1)
///
/// Returns candidates sorted by score descending, index ascending.
pub fn fuse_candidates(
    sparse: &[(usize, f64)],
    ann: &[(usize, f64)],
    ann_source: Option<&str>,
    config: &FusionConfig,
) -> Vec<CandidateEntry> {
    let sparse = ranked_list(sparse);
    let ann = ranked_list(ann);

    let mut fused: Vec<CandidateEntry> = match (sparse.is_empty(), ann.is_empty()) {
        (true, true) => return Vec::new(),
        (false, true) => sparse
            .iter()
            .map(|&(idx, score)| CandidateEntry::sparse(idx, score))
            .collect(),
        (true, false) => ann
            .iter()
            .map(|&(idx, score)| CandidateEntry::ann(idx, score, ann_source))
            .collect(),
        (false, false) => match config.mode {
            FusionMode::Rrf => fuse_rrf(&sparse, &ann, ann_source, config),
            FusionMode::Blend => fuse_blend(&sparse, &ann, ann_source, config),
        },
    };

    for entry in &mut fused {
        if entry.sparse_score.is_some() {
            entry.sparse_type = Some(config.sparse_type.clone());
        }
    }
    fused.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.idx.cmp(&b.idx)));

    log::debug!(
        "Fused {} sparse + {} ann results into {} candidates ({:?})",
        sparse.len(),
        ann.len(),
        fused.len(),
        config.mode
    );
    fused
}

fn ranked_list(results: &[(usize, f64)]) -> Vec<(usize, f64)> {
    let mut best: HashMap<usize, f64> = HashMap::with_capacity(results.len());
    for &(idx, score) in results {
        let score = if score.is_finite() { score } else { 0.0 };
        best.entry(idx)
            .and_modify(|s| *s = s.max(score))
            .or_insert(score);
    }
    let mut ranked: Vec<(usize, f64)> = best.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

#[derive(Default)]
struct Slot {
    sparse: Option<(usize, f64)>,
    ann: Option<(usize, f64)>,
}

fn collect_slots(sparse: &[(usize, f64)], ann: &[(usize, f64)]) -> BTreeMap<usize, Slot> {
    let mut slots: BTreeMap<usize, Slot> = BTreeMap::new();
    for (rank, &(idx, score)) in sparse.iter().enumerate() {
        slots.entry(idx).or_default().sparse = Some((rank, score));
    }
    for (rank, &(idx, score)) in ann.iter().enumerate() {
        slots.entry(idx).or_default().ann = Some((rank, score));
    }
    slots
}

fn fuse_rrf(
    sparse: &[(usize, f64)],
    ann: &[(usize, f64)],
    ann_source: Option<&str>,
    config: &FusionConfig,
) -> Vec<CandidateEntry> {
    let contribution = |weight: f64, rank: usize| weight / (config.k + rank as f64 + 1.0);
    collect_slots(sparse, ann)
        .into_iter()
        .map(|(idx, slot)| {
            let sparse_contribution = slot
                .sparse
                .map_or(0.0, |(rank, _)| contribution(config.sparse_weight, rank));
            let ann_contribution = slot
                .ann
                .map_or(0.0, |(rank, _)| contribution(config.ann_weight, rank));
            CandidateEntry {
                idx,
                score: sparse_contribution + ann_contribution,
                score_type: ScoreType::Rrf,
                sparse_score: slot.sparse.map(|(_, s)| s),
                sparse_type: None,
                ann_score: slot.ann.map(|(_, s)| s),
                ann_source: slot.ann.and(ann_source.map(str::to_string)),
                rrf: Some(RrfInfo {
                    k: config.k,
                    sparse_rank: slot.sparse.map(|(rank, _)| rank),
                    ann_rank: slot.ann.map(|(rank, _)| rank),
                    sparse_contribution,
                    ann_contribution,
                }),
                blend_info: None,
            }
        })
        .collect()
}

/// Min-max normalization to [0, 1]; a flat list maps to 1.0.
fn normalizer(list: &[(usize, f64)]) -> impl Fn(f64) -> f64 {
    let (min, max) = list.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, s)| {
        (lo.min(s), hi.max(s))
    });
    move |score| {
        let span = max - min;
        if span > f64::EPSILON {
            (score - min) / span
        } else {
            1.0
        }
    }
}

fn fuse_blend(
    sparse: &[(usize, f64)],
    ann: &[(usize, f64)],
    ann_source: Option<&str>,
    config: &FusionConfig,
) -> Vec<CandidateEntry> {
    let norm_sparse = normalizer(sparse);
    let norm_ann = normalizer(ann);
    collect_slots(sparse, ann)
        .into_iter()
        .map(|(idx, slot)| {
            let sparse_normalized = slot.sparse.map(|(_, s)| norm_sparse(s));
            let ann_normalized = slot.ann.map(|(_, s)| norm_ann(s));
            let score = config.sparse_weight * sparse_normalized.unwrap_or(0.0)
                + config.ann_weight * ann_normalized.unwrap_or(0.0);
            CandidateEntry {
                idx,
                score,
                score_type: ScoreType::Blend,
                sparse_score: slot.sparse.map(|(_, s)| s),
                sparse_type: None,
                ann_score: slot.ann.map(|(_, s)| s),
                ann_source: slot.ann.and(ann_source.map(str::to_string)),
                rrf: None,
                blend_info: Some(BlendInfo {
                    sparse_weight: config.sparse_weight,
                    ann_weight: config.ann_weight,
                    sparse_normalized,
                    ann_normalized,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rrf_fusion_rewards_agreement() {
        let sparse = vec![(0, 9.0), (1, 8.0), (2, 7.0)];
        let ann = vec![(2, 0.95), (0, 0.85), (3, 0.75)];

        let fused = fuse_candidates(&sparse, &ann, Some("hnsw"), &FusionConfig::default());
        let order: Vec<usize> = fused.iter().map(|c| c.idx).collect();

        // 0 is rank 0 + rank 1, 2 is rank 2 + rank 0.
        assert_eq!(order, vec![0, 2, 1, 3]);
        let top = &fused[0];
        assert_eq!(top.score_type, ScoreType::Rrf);
        assert_eq!(top.sparse_type.as_deref(), Some("bm25"));
        assert_eq!(top.ann_source.as_deref(), Some("hnsw"));
        let rrf = top.rrf.as_ref().unwrap();
        assert_eq!(rrf.sparse_rank, Some(0));
        assert_eq!(rrf.ann_rank, Some(1));
        assert!((top.score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);

        let sparse_only = fused.iter().find(|c| c.idx == 1).unwrap();
        assert_eq!(sparse_only.ann_source, None);
    }

    #[test]
    fn test_rrf_weights() {
        let config = FusionConfig {
            sparse_weight: 0.1,
            ann_weight: 0.9,
            ..Default::default()
        };
        let fused = fuse_candidates(&[(0, 1.0)], &[(1, 1.0)], None, &config);
        assert_eq!(fused[0].idx, 1);
    }

    #[test]
    fn single_source_keeps_raw_scores() {
        let fused = fuse_candidates(&[(3, 2.5), (1, f64::NAN)], &[], None, &FusionConfig::default());
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].idx, 3);
        assert_eq!(fused[0].score_type, ScoreType::Sparse);
        assert_eq!(fused[0].score, 2.5);
        assert_eq!(fused[1].score, 0.0);

        let fused = fuse_candidates(&[], &[(5, 0.4)], Some("flat"), &FusionConfig::default());
        assert_eq!(fused[0].score_type, ScoreType::Ann);
        assert_eq!(fused[0].ann_source.as_deref(), Some("flat"));
    }

    #[test]
    fn blend_normalizes_each_source() {
        let config = FusionConfig {
            mode: FusionMode::Blend,
            sparse_weight: 0.5,
            ann_weight: 0.5,
            ..Default::default()
        };
        let sparse = vec![(0, 10.0), (1, 0.0)];
        let ann = vec![(1, 0.9), (2, 0.1)];
        let fused = fuse_candidates(&sparse, &ann, None, &config);

        let by_idx = |idx: usize| fused.iter().find(|c| c.idx == idx).unwrap();
        assert!((by_idx(0).score - 0.5).abs() < 1e-12);
        assert!((by_idx(1).score - 0.5).abs() < 1e-12);
        assert!(by_idx(2).score.abs() < 1e-12);
        // Ties break on index.
        assert_eq!(fused[0].idx, 0);
        assert_eq!(fused[1].idx, 1);
        let blend = by_idx(1).blend_info.as_ref().unwrap();
        assert_eq!(blend.sparse_normalized, Some(0.0));
        assert_eq!(blend.ann_normalized, Some(1.0));
    }

    #[test]
    fn duplicate_indices_keep_best_score() {
        let fused = fuse_candidates(&[(1, 0.2), (1, 0.9)], &[], None, &FusionConfig::default());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].score, 0.9);
    }
}
