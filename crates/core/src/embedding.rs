/// Settings for the offline hashing embedder. Two embedders with the same
/// dimensions and seed always produce identical vectors for identical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 256,
            seed: 1337,
        }
    }
}

/// Bag-of-words embedder used when no embedding endpoint is configured.
///
/// Tokens are lowercased alphanumeric runs; each token and each adjacent
/// token pair is hashed into a bucket and the result is L2-normalised.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn model_name(&self) -> String {
        format!("hash-{}-{}", self.dimensions(), self.config.seed)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions();
        let mut vector = vec![0f32; dims];
        let tokens = tokenize(text);
        for token in &tokens {
            vector[self.bucket_for(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            vector[self.bucket_for(&bigram)] += 0.5;
        }
        normalize(&mut vector);
        vector
    }

    /// Bucket assignment must not change between builds: indexed passages
    /// keep the vectors it produced.
    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.config.seed.to_le_bytes());
        hasher.update(token.as_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.dimensions() as u64) as usize
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn embeddings_are_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        let a = embedder.embed_text("Septic shock with lactate above 4 mmol/L");
        let b = embedder.embed_text("Septic shock with lactate above 4 mmol/L");
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn casing_and_punctuation_do_not_matter() {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        let a = embedder.embed_text("Norepinephrine, first-line vasopressor");
        let b = embedder.embed_text("norepinephrine first line VASOPRESSOR");
        assert_eq!(a, b);
    }

    #[test]
    fn related_text_scores_higher_than_unrelated() {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        let query = embedder.embed_text("antibiotics for community acquired pneumonia");
        let related = embedder.embed_text("community acquired pneumonia antibiotics ceftriaxone");
        let unrelated = embedder.embed_text("fluid resuscitation with balanced crystalloids");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn buckets_are_pinned() {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        assert_eq!(embedder.bucket_for("sepsis"), 10);
        assert_eq!(embedder.bucket_for("lactate"), 32);
        assert_eq!(embedder.bucket_for("septic shock"), 3);

        let small = HashEmbedder::new(HashEmbedderConfig {
            dimensions: 8,
            seed: 7,
        });
        let mut expected = vec![0.0; 8];
        expected[4] = 1.0;
        assert_eq!(small.embed_text("Sepsis"), expected);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashEmbedder::new(HashEmbedderConfig {
            dimensions: 8,
            seed: 7,
        });
        assert_eq!(embedder.embed_text("  ;; "), vec![0.0; 8]);
        assert_eq!(embedder.model_name(), "hash-8-7");
    }
}
