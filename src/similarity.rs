//! Whole-image similarity between pickup and return photos.
//!
//! The embedding model is external. This module only owns the scoring
//! contract, cosine scoring over embeddings and a keyed cache of loaded
//! scorers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::error::InspectError;
use crate::frame::DecodedImage;

/// Scores how alike two images are.
///
/// Nominally in `[0, 1]` for natural photo pairs; bounded by `[-1, 1]`.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &DecodedImage, b: &DecodedImage) -> Result<f64>;
}

/// External image embedding model.
pub trait ImageEmbedder: Send + Sync {
    fn embed(&self, image: &DecodedImage) -> Result<Vec<f32>>;
}

/// Cosine similarity of two embeddings.
///
/// Errors on mismatched lengths or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(anyhow!(
            "embedding length mismatch: {} vs {}",
            a.len(),
            b.len()
        ));
    }
    let norm_a = a.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(anyhow!("cannot compare a zero-norm embedding"));
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Scorer that embeds both images and compares them by cosine similarity.
pub struct EmbeddingScorer<E> {
    embedder: E,
}

impl<E: ImageEmbedder> EmbeddingScorer<E> {
    pub fn new(embedder: E) -> Self {
        Self { embedder }
    }
}

impl<E: ImageEmbedder> SimilarityScorer for EmbeddingScorer<E> {
    fn score(&self, a: &DecodedImage, b: &DecodedImage) -> Result<f64> {
        let emb_a = self.embedder.embed(a)?;
        let emb_b = self.embedder.embed(b)?;
        cosine_similarity(&emb_a, &emb_b)
    }
}

/// Full configuration identity of a loaded embedding model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScorerKey {
    pub model_name: String,
    pub checkpoint: String,
    pub device: String,
}

impl Default for ScorerKey {
    fn default() -> Self {
        Self {
            model_name: "ViT-B-32".to_string(),
            checkpoint: "laion2b_s34b_b79k".to_string(),
            device: "cpu".to_string(),
        }
    }
}

impl std::fmt::Display for ScorerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.model_name, self.checkpoint, self.device)
    }
}

/// Loaded scorers keyed by their full configuration.
///
/// Different keys coexist; a request for one configuration never receives a
/// scorer loaded for another.
#[derive(Default)]
pub struct ScorerCache {
    entries: Mutex<HashMap<ScorerKey, Arc<dyn SimilarityScorer>>>,
}

impl ScorerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached scorer for `key`, loading it on first use.
    ///
    /// The lock is held across `load`, so concurrent first requests for the
    /// same key load once.
    pub fn get_or_load<F>(
        &self,
        key: &ScorerKey,
        load: F,
    ) -> Result<Arc<dyn SimilarityScorer>, InspectError>
    where
        F: FnOnce(&ScorerKey) -> Result<Arc<dyn SimilarityScorer>>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| InspectError::inference("scorer cache lock poisoned"))?;
        if let Some(scorer) = entries.get(key) {
            return Ok(scorer.clone());
        }

        log::info!("loading similarity scorer {}", key);
        let scorer = load(key).map_err(|e| {
            InspectError::inference(format!("failed to load scorer {}: {:#}", key, e))
        })?;
        entries.insert(key.clone(), scorer.clone());
        Ok(scorer)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// Embeds an image as its mean colour.
    struct MeanColour;

    impl ImageEmbedder for MeanColour {
        fn embed(&self, image: &DecodedImage) -> Result<Vec<f32>> {
            let mut sums = [0f32; 3];
            for pixel in image.pixels().pixels() {
                for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                    *sum += channel as f32;
                }
            }
            Ok(sums.to_vec())
        }
    }

    fn solid(rgb: [u8; 3]) -> DecodedImage {
        DecodedImage::from_rgb(RgbImage::from_pixel(4, 4, image::Rgb(rgb))).unwrap()
    }

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).unwrap(), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn embedding_scorer_compares_images() {
        let scorer = EmbeddingScorer::new(MeanColour);
        let red = solid([200, 0, 0]);
        let dark_red = solid([90, 0, 0]);
        let blue = solid([0, 0, 200]);

        assert!((scorer.score(&red, &dark_red).unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(scorer.score(&red, &blue).unwrap(), 0.0);
    }

    #[test]
    fn cache_keeps_one_entry_per_configuration() {
        let cache = ScorerCache::new();
        let cpu = ScorerKey::default();
        let gpu = ScorerKey {
            device: "cuda:0".to_string(),
            ..ScorerKey::default()
        };

        let mut loads = 0;
        let mut load = |_: &ScorerKey| -> Result<Arc<dyn SimilarityScorer>> {
            loads += 1;
            Ok(Arc::new(EmbeddingScorer::new(MeanColour)))
        };

        let first = cache.get_or_load(&cpu, &mut load).unwrap();
        let again = cache.get_or_load(&cpu, &mut load).unwrap();
        let other = cache.get_or_load(&gpu, &mut load).unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
        assert_eq!(loads, 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cache = ScorerCache::new();
        let key = ScorerKey::default();

        let err = cache
            .get_or_load(&key, |_| Err(anyhow!("checkpoint download refused")))
            .err()
            .unwrap();
        assert!(matches!(err, InspectError::InferenceFailure(_)));
        assert!(cache.is_empty());
    }
}
