use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Similarity function used by a search. Every metric yields a score where
/// higher means more similar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `dot(a, b) / (|a| * |b|)`, in `[-1, 1]`.
    #[default]
    Cosine,
    /// `1 / (1 + |a - b|)`, in `(0, 1]`.
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
            Self::DotProduct => dot(a, b),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "dot_product" | "dot" => Ok(Self::DotProduct),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Zero vectors have similarity 0 with everything.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Descending score, then ascending id.
pub(crate) fn rank(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

/// Keep the `k` best `(score, id)` pairs, sorted best first. Non-finite
/// scores never rank.
#[must_use]
pub fn top_k(mut scored: Vec<(f32, String)>, k: usize) -> Vec<(f32, String)> {
    if k == 0 {
        return Vec::new();
    }
    scored.retain(|(score, _)| score.is_finite());
    let cmp = |a: &(f32, String), b: &(f32, String)| rank(a.0, &a.1, b.0, &b.1);
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, cmp);
        scored.truncate(k);
    }
    scored.sort_unstable_by(cmp);
    scored
}
