use crate::scanner::RawSample;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Ordered sequence of opaque feature tokens extracted from one sample.
///
/// Comparison treats it as a set; order and repetitions are kept only so that
/// a stored template round-trips unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FeatureSet {
    tokens: Vec<String>,
}

impl FeatureSet {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Distinct tokens.
    pub fn unique(&self) -> HashSet<&str> {
        self.tokens.iter().map(String::as_str).collect()
    }

    /// Short SHA-256 digest identifying the set in logs without exposing it.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for token in &self.tokens {
            hasher.update((token.len() as u64).to_be_bytes());
            hasher.update(token.as_bytes());
        }
        hasher.finalize().iter().take(6).map(|byte| format!("{byte:02x}")).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { tokens: iter.into_iter().map(Into::into).collect() }
    }
}

/// Deterministic transform from a raw capture to comparable features.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, sample: &RawSample) -> FeatureSet;
}

/// Placeholder tokenizer: whitespace-separated words of the sample.
///
/// Not a minutiae extractor. Real deployments plug in an extractor that finds
/// ridge endings and bifurcations.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceExtractor;

impl FeatureExtractor for WhitespaceExtractor {
    fn extract(&self, sample: &RawSample) -> FeatureSet {
        String::from_utf8_lossy(&sample.data).split_whitespace().collect()
    }
}
