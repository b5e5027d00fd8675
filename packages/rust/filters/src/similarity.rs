//! Near-identical headline detection.
//!
//! Two titles are "similar" when their leading characters differ in only a
//! handful of positions: typical of the same wire story re-published with a
//! tweaked word or punctuation. No semantic matching is attempted.

use newswatch_shared::{SimilarityConfig, Titled};

use crate::title::TitleNormalizer;

/// Number of positions at which two equal-length strings differ, by
/// character. `None` if the lengths differ.
pub fn hamming(a: &str, b: &str) -> Option<usize> {
    if a.chars().count() != b.chars().count() {
        return None;
    }
    Some(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count())
}

/// Thresholds for the fixed-window Hamming comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityRule {
    pub max_length_diff: usize,
    pub min_length: usize,
    pub window: usize,
    pub max_distance: usize,
}

impl Default for SimilarityRule {
    fn default() -> Self {
        Self::from_config(&SimilarityConfig::default())
    }
}

impl SimilarityRule {
    pub fn from_config(config: &SimilarityConfig) -> Self {
        Self {
            max_length_diff: config.max_length_diff,
            min_length: config.min_length,
            window: config.window,
            max_distance: config.max_distance,
        }
    }

    /// Symmetric. Lengths are counted in characters.
    pub fn is_similar(&self, a: &str, b: &str) -> bool {
        let len_a = a.chars().count();
        let len_b = b.chars().count();
        if len_a.abs_diff(len_b) > self.max_length_diff {
            return false;
        }
        let shortest = len_a.min(len_b);
        if shortest <= self.min_length {
            return false;
        }

        let take = self.window.min(shortest);
        let head_a: String = a.chars().take(take).collect();
        let head_b: String = b.chars().take(take).collect();
        hamming(&head_a, &head_b).is_some_and(|d| d <= self.max_distance)
    }
}

/// Drop items whose cleaned title is similar to the previous kept item's.
///
/// Single pass over an already ordered list; nothing is remembered beyond the
/// last kept title. Returns `(kept, skipped)`, both in input order.
pub fn skip_adjacent_similar<T: Titled>(
    items: Vec<T>,
    rule: &SimilarityRule,
    normalizer: &TitleNormalizer,
) -> (Vec<T>, Vec<T>) {
    let mut kept = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    let mut last: Option<String> = None;

    for item in items {
        let cleaned = normalizer.normalize(item.title());
        if last.as_deref().is_some_and(|prev| rule.is_similar(prev, &cleaned)) {
            skipped.push(item);
            continue;
        }
        last = Some(cleaned);
        kept.push(item);
    }
    (kept, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use newswatch_shared::CandidateArticle;

    #[test]
    fn hamming_basics() {
        assert_eq!(hamming("karolin", "kathrin"), Some(3));
        assert_eq!(hamming("same", "same"), Some(0));
        assert_eq!(hamming("", ""), Some(0));
        assert_eq!(hamming("short", "longer"), None);
        assert_eq!(hamming("ü", "u"), Some(1));
    }

    #[test]
    fn similar_titles() {
        let rule = SimilarityRule::default();
        let a = "Earthquake strikes off the coast of northern Japan";
        let b = "Earthquake strikes off the coast of north Japan";
        assert!(rule.is_similar(a, b));
        assert!(rule.is_similar(b, a));
    }

    #[test]
    fn short_titles_never_match() {
        let rule = SimilarityRule::default();
        // 20 characters: not strictly longer than min_length.
        let a = "Markets fall sharply";
        assert_eq!(a.chars().count(), 20);
        assert!(!rule.is_similar(a, a));
    }

    #[test]
    fn length_gap_blocks_match() {
        let rule = SimilarityRule::default();
        let a = "Earthquake strikes off the coast of Japan";
        let b = "Earthquake strikes off the coast of Japan, killing dozens overnight";
        assert!(!rule.is_similar(a, b));
    }

    #[test]
    fn distance_threshold() {
        let rule = SimilarityRule::default();
        let a = "Heatwave grips southern Europe as temperatures soar";
        let b = "Heatwave grips western Africa as temperatures soar";
        assert!(!rule.is_similar(a, b));
    }

    #[test]
    fn similarity_is_symmetric() {
        let rule = SimilarityRule::default();
        let titles = [
            "Earthquake strikes off the coast of northern Japan",
            "Earthquake strikes off the coast of north Japan",
            "Heatwave grips southern Europe as temperatures soar",
            "Tiny",
        ];
        for a in titles {
            for b in titles {
                assert_eq!(rule.is_similar(a, b), rule.is_similar(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn adjacent_sweep_compares_with_last_kept() {
        let items = vec![
            CandidateArticle::new("Earthquake strikes off the coast of northern Japan", "1"),
            CandidateArticle::new("Earthquake strikes off the coast of north Japan", "2"),
            CandidateArticle::new("Earthquake strikes off the coast of nrth Japan", "3"),
            CandidateArticle::new("Heatwave grips southern Europe as temperatures soar", "4"),
        ];
        let (kept, skipped) =
            skip_adjacent_similar(items, &SimilarityRule::default(), &TitleNormalizer::default());
        let kept: Vec<&str> = kept.iter().map(|c| c.link.as_str()).collect();
        let skipped: Vec<&str> = skipped.iter().map(|c| c.link.as_str()).collect();
        assert_eq!(kept, vec!["1", "4"]);
        assert_eq!(skipped, vec!["2", "3"]);
    }
}
