//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Trait for generating text embeddings
///
/// Implementations:
/// - `HashEmbedder`: local feature hashing, no external service
/// - `OllamaEmbedder`: local Ollama server
///
/// Embedding must be deterministic, and `embed_batch` must return exactly
/// what `embed` returns for each text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Identifies the embedding space; ingestion and queries must agree
    fn model_id(&self) -> String;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Embed one text under a deadline, checking the dimension
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    limit: Duration,
) -> Result<Vec<f32>> {
    let vector = match tokio::time::timeout(limit, provider.embed(text)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Timeout {
                operation: "embedding",
                secs: limit.as_secs(),
            })
        }
    };
    check_dimensions(provider.dimensions(), &vector)?;
    Ok(vector)
}

/// Embed a batch under a deadline, checking count and dimension
pub async fn embed_batch_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    limit: Duration,
) -> Result<Vec<Vec<f32>>> {
    let vectors = match tokio::time::timeout(limit, provider.embed_batch(texts)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Timeout {
                operation: "embedding",
                secs: limit.as_secs(),
            })
        }
    };
    if vectors.len() != texts.len() {
        return Err(Error::embedding(format!(
            "{} returned {} vectors for {} texts",
            provider.name(),
            vectors.len(),
            texts.len()
        )));
    }
    for vector in &vectors {
        check_dimensions(provider.dimensions(), vector)?;
    }
    Ok(vectors)
}

fn check_dimensions(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::embedding(format!(
            "expected {} dimensions, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Encode a vector as little-endian f32 bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
