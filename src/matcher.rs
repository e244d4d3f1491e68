use crate::features::FeatureSet;

/// Score and verdict of one comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub score: u32,
    pub matched: bool,
}

/// Compares a captured feature set against an enrolled one.
pub trait MatchEngine: Send + Sync {
    /// Similarity score, higher is more similar.
    fn score(&self, captured: &FeatureSet, enrolled: &FeatureSet) -> u32;

    fn compare(&self, captured: &FeatureSet, enrolled: &FeatureSet, threshold: u32) -> MatchResult {
        let score = self.score(captured, enrolled);
        MatchResult { score, matched: score >= threshold }
    }
}

/// Counts distinct tokens present in both sets.
///
/// Exact token equality only; a stand-in until a tolerant minutiae comparer
/// (rotation and translation aware) is plugged in.
#[derive(Clone, Copy, Debug, Default)]
pub struct SetIntersectionMatcher;

impl MatchEngine for SetIntersectionMatcher {
    fn score(&self, captured: &FeatureSet, enrolled: &FeatureSet) -> u32 {
        let enrolled = enrolled.unique();
        let common = captured.unique().intersection(&enrolled).count();
        u32::try_from(common).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tokens: &[&str]) -> FeatureSet {
        tokens.iter().copied().collect()
    }

    #[test]
    fn multiplicity_is_ignored() {
        let captured = set(&["a", "a", "a", "b"]);
        let enrolled = set(&["a", "b", "b", "c"]);
        assert_eq!(SetIntersectionMatcher.score(&captured, &enrolled), 2);
    }

    #[test]
    fn order_is_ignored() {
        let forward = set(&["a", "b", "c"]);
        let backward = set(&["c", "b", "a"]);
        assert_eq!(
            SetIntersectionMatcher.compare(&forward, &backward, 3),
            MatchResult { score: 3, matched: true }
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let captured = set(&["a", "b", "x"]);
        let enrolled = set(&["a", "b", "y"]);
        assert!(SetIntersectionMatcher.compare(&captured, &enrolled, 2).matched);
        assert!(!SetIntersectionMatcher.compare(&captured, &enrolled, 3).matched);
    }
}
