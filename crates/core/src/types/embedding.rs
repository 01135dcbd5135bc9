//! `Embedding` — the output of the Vectorizer (C1), carried on every
//! embedded record so a mixed-model search can be rejected rather than
//! silently compared against incompatible dimensions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub model_id: String,
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(model_id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            model_id: model_id.into(),
            values,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Cosine similarity. Returns 0.0 for a zero-norm vector rather
    /// than NaN, matching the clustering algorithm's degenerate-case
    /// handling (§4.5).
    pub fn cosine(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b = other.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    pub fn mean(embeddings: &[&Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let dim = first.dim();
        let model_id = first.model_id.clone();
        let mut sum = vec![0.0f32; dim];
        for e in embeddings {
            if e.dim() != dim {
                continue;
            }
            for (s, v) in sum.iter_mut().zip(e.values.iter()) {
                *s += v;
            }
        }
        let n = embeddings.len() as f32;
        for s in sum.iter_mut() {
            *s /= n;
        }
        Some(Embedding::new(model_id, sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = Embedding::new("m1", vec![1.0, 0.0, 0.0]);
        let b = Embedding::new("m1", vec![1.0, 0.0, 0.0]);
        assert!((a.cosine(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = Embedding::new("m1", vec![1.0, 0.0]);
        let b = Embedding::new("m1", vec![0.0, 1.0]);
        assert!(a.cosine(&b).abs() < 1e-6);
    }

    #[test]
    fn mean_of_two_vectors() {
        let a = Embedding::new("m1", vec![1.0, 1.0]);
        let b = Embedding::new("m1", vec![3.0, 3.0]);
        let mean = Embedding::mean(&[&a, &b]).unwrap();
        assert_eq!(mean.values, vec![2.0, 2.0]);
    }
}
