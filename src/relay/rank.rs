use crate::relay::result::{RankedDocument, ScoredIndex};

/// Cosine similarity over the common prefix of `a` and `b`.
///
/// Zero-norm vectors score 0.0, and so do vectors holding NaN or infinite
/// components. Each vector is scaled by its largest component first, so very
/// large magnitudes do not overflow the norms.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);
    let (scale_a, scale_b) = (max_abs(a), max_abs(b));
    if scale_a == 0.0 || scale_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x / scale_a) * (y / scale_b))
        .sum();
    let norm_a = a.iter().map(|x| (x / scale_a).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|y| (y / scale_b).powi(2)).sum::<f64>().sqrt();
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() { similarity } else { 0.0 }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |max: f64, value| max.max(value.abs()))
}

/// Total order key: NaN ranks below every number and `-0.0` ties with `0.0`.
fn sort_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// Post-sort filters. `threshold` applies first, then `top_k`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankOptions {
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    options: RankOptions,
}

impl Ranker {
    pub fn new(options: RankOptions) -> Self {
        Self { options }
    }

    /// Scores every candidate, sorts descending with ties in input order, then filters.
    pub fn rank<C, F>(&self, candidates: &[C], mut score: F) -> Vec<RankedDocument>
    where
        C: AsRef<str>,
        F: FnMut(usize, &C) -> f64,
    {
        let scored = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| RankedDocument {
                text: candidate.as_ref().to_string(),
                score: score(index, candidate),
                index,
            })
            .collect();
        self.finish(scored)
    }

    /// Ranks documents by cosine similarity of their vectors to `query`.
    pub fn by_embedding<C: AsRef<str>>(
        &self,
        query: &[f64],
        candidates: &[C],
        vectors: &[Vec<f64>],
    ) -> Vec<RankedDocument> {
        self.rank(candidates, |index, _| {
            vectors.get(index).map_or(0.0, |vector| cosine(query, vector))
        })
    }

    /// Ranks documents by provider relevance scores, unchanged. Documents the
    /// provider did not score, and scores pointing past the input, are dropped.
    pub fn by_relevance<C: AsRef<str>>(
        &self,
        documents: &[C],
        scores: &[ScoredIndex],
    ) -> Vec<RankedDocument> {
        let scored = scores
            .iter()
            .filter_map(|scored| {
                documents.get(scored.index).map(|document| RankedDocument {
                    text: document.as_ref().to_string(),
                    score: scored.score,
                    index: scored.index,
                })
            })
            .collect();
        self.finish(scored)
    }

    fn finish(&self, mut documents: Vec<RankedDocument>) -> Vec<RankedDocument> {
        documents.sort_by(|a, b| {
            sort_key(b.score)
                .total_cmp(&sort_key(a.score))
                .then(a.index.cmp(&b.index))
        });
        if let Some(threshold) = self.options.threshold {
            documents.retain(|document| document.score >= threshold);
        }
        if let Some(top_k) = self.options.top_k {
            documents.truncate(top_k);
        }
        documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let ranked = Ranker::default().rank(&["a", "b", "c", "d"], |_, _| 0.5);
        let order: Vec<usize> = ranked.iter().map(|doc| doc.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn threshold_applies_before_top_k() {
        let ranker = Ranker::new(RankOptions {
            top_k: Some(2),
            threshold: Some(0.4),
        });
        let scores = [0.1, 0.9, 0.5, 0.3];
        let ranked = ranker.rank(&["a", "b", "c", "d"], |index, _| scores[index]);
        let texts: Vec<&str> = ranked.iter().map(|doc| doc.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);

        let strict = Ranker::new(RankOptions {
            top_k: Some(3),
            threshold: Some(0.95),
        });
        assert!(strict.rank(&["a", "b"], |index, _| scores[index]).is_empty());
    }

    #[test]
    fn embedding_ranking_prefers_aligned_vectors() {
        let ranked = Ranker::default().by_embedding(
            &[1.0, 0.0],
            &["orthogonal", "aligned", "diagonal"],
            &[vec![0.0, 1.0], vec![2.0, 0.0], vec![1.0, 1.0]],
        );
        let texts: Vec<&str> = ranked.iter().map(|doc| doc.text.as_str()).collect();
        assert_eq!(texts, vec!["aligned", "diagonal", "orthogonal"]);
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn relevance_scores_are_used_verbatim() {
        let ranked = Ranker::default().by_relevance(
            &["first", "second"],
            &[
                ScoredIndex { index: 0, score: 0.2 },
                ScoredIndex { index: 1, score: 0.7 },
                ScoredIndex { index: 5, score: 0.99 },
            ],
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "second");
        assert_eq!(ranked[0].score, 0.7);
        assert_eq!(ranked[1].index, 0);
    }

    #[test]
    fn cosine_survives_huge_and_mismatched_vectors() {
        assert_eq!(cosine(&[1e200, 0.0], &[1e200, 0.0]), 1.0);
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0, 5.0]), 1.0);
        assert_eq!(cosine(&[f64::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine(&[f64::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn nan_scores_sort_last_without_panicking() {
        let candidates: Vec<String> = (0..64).map(|n| format!("doc {n}")).collect();
        let ranked = Ranker::default().rank(&candidates, |index, _| {
            if index % 3 == 0 { f64::NAN } else { index as f64 }
        });

        assert_eq!(ranked.len(), 64);
        assert_eq!(ranked[0].index, 62);
        let first_nan = ranked
            .iter()
            .position(|doc| doc.score.is_nan())
            .expect("NaN scores are kept");
        assert!(ranked[first_nan..].iter().all(|doc| doc.score.is_nan()));
        let nan_order: Vec<usize> = ranked[first_nan..].iter().map(|doc| doc.index).collect();
        assert!(nan_order.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
