//! Embedding vectors

use serde::{Deserialize, Serialize};

/// A text embedding produced by an [`EmbeddingProvider`](crate::providers::EmbeddingProvider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

impl Embedding {
    /// Build an embedding, deriving `dimensions` from the vector length.
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        let dimensions = values.len();
        Self {
            values,
            model: model.into(),
            dimensions,
        }
    }
}
