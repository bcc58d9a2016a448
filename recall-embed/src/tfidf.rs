//! Local TF-IDF embeddings.
//!
//! The provider learns a vocabulary from a training corpus: the `max_vocab`
//! tokens with the highest document frequency, each weighted by
//! `ln(N / df)`. A text is embedded as its term-frequency × IDF vector over
//! that vocabulary, L2-normalized.
//!
//! An untrained provider trains itself on the first batch it is asked to
//! embed. That batch may be tiny (a single query), so callers that care about
//! quality should call [`TfIdfProvider::train`] with a representative corpus
//! first.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// A trained TF-IDF vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Term → position in the embedding vector
    pub index: HashMap<String, usize>,
    /// IDF weight per position
    pub idf: Vec<f32>,
    /// Number of documents the vocabulary was trained on
    pub documents: usize,
}

impl Vocabulary {
    /// Build a vocabulary of at most `max_vocab` terms from `corpus`.
    ///
    /// Terms are ranked by document frequency; equal frequencies are ordered
    /// alphabetically so training is deterministic.
    pub fn train(corpus: &[String], max_vocab: usize) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for text in corpus {
            let unique: HashSet<String> = tokenize(text).collect();
            for token in unique {
                *doc_freq.entry(token).or_default() += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = doc_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_vocab);

        let n = corpus.len() as f64;
        let mut index = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (position, (term, df)) in ranked.into_iter().enumerate() {
            idf.push((n / df as f64).ln() as f32);
            index.insert(term, position);
        }

        Self {
            index,
            idf,
            documents: corpus.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    /// Embed one text into a vector of `dimension` slots.
    fn embed(&self, text: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; dimension];
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1;
            total += 1;
        }
        if total == 0 {
            return vector;
        }

        for (token, count) in counts {
            if let Some(&position) = self.index.get(&token) {
                if position < dimension {
                    let tf = count as f32 / total as f32;
                    vector[position] = tf * self.idf[position];
                }
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// Lowercase alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Scale `vector` to unit length; zero vectors are left untouched.
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Self-training TF-IDF embedding provider.
///
/// The embedding dimension is always `max_vocab`; slots beyond the trained
/// vocabulary stay zero.
#[derive(Debug)]
pub struct TfIdfProvider {
    max_vocab: usize,
    vocabulary: RwLock<Option<Vocabulary>>,
}

impl TfIdfProvider {
    pub fn new(max_vocab: usize) -> Self {
        Self {
            max_vocab: max_vocab.max(1),
            vocabulary: RwLock::new(None),
        }
    }

    /// Create a provider from a previously trained vocabulary.
    pub fn with_vocabulary(max_vocab: usize, vocabulary: Vocabulary) -> Self {
        Self {
            max_vocab: max_vocab.max(1),
            vocabulary: RwLock::new(Some(vocabulary)),
        }
    }

    /// Train (or retrain) the vocabulary on `corpus`.
    pub async fn train(&self, corpus: &[String]) {
        let vocabulary = Vocabulary::train(corpus, self.max_vocab);
        tracing::debug!(
            "Trained TF-IDF vocabulary: {} terms from {} documents",
            vocabulary.len(),
            vocabulary.documents
        );
        *self.vocabulary.write().await = Some(vocabulary);
    }

    pub async fn is_trained(&self) -> bool {
        self.vocabulary.read().await.is_some()
    }

    /// A copy of the current vocabulary, if trained.
    pub async fn vocabulary(&self) -> Option<Vocabulary> {
        self.vocabulary.read().await.clone()
    }
}

#[async_trait]
impl EmbeddingProvider for TfIdfProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        {
            let mut guard = self.vocabulary.write().await;
            if guard.is_none() {
                tracing::debug!("TF-IDF provider untrained, training on {} texts", texts.len());
                *guard = Some(Vocabulary::train(texts, self.max_vocab));
            }
        }

        let guard = self.vocabulary.read().await;
        let embeddings = match guard.as_ref() {
            Some(vocabulary) => texts
                .iter()
                .map(|text| vocabulary.embed(text, self.max_vocab))
                .collect(),
            None => vec![vec![0.0; self.max_vocab]; texts.len()],
        };

        Ok(EmbeddingResult {
            embeddings,
            dimension: self.max_vocab,
        })
    }

    /// Trains on `corpus` unless a vocabulary already exists.
    async fn fit(&self, corpus: &[String]) -> Result<()> {
        if corpus.is_empty() {
            return Ok(());
        }
        let mut guard = self.vocabulary.write().await;
        if guard.is_none() {
            let vocabulary = Vocabulary::train(corpus, self.max_vocab);
            tracing::debug!(
                "Fitted TF-IDF vocabulary: {} terms from {} documents",
                vocabulary.len(),
                vocabulary.documents
            );
            *guard = Some(vocabulary);
        }
        Ok(())
    }

    async fn export_state(&self) -> Result<Option<Vec<u8>>> {
        match self.vocabulary.read().await.as_ref() {
            Some(vocabulary) => Ok(Some(serde_json::to_vec(vocabulary)?)),
            None => Ok(None),
        }
    }

    async fn import_state(&self, state: &[u8]) -> Result<()> {
        let vocabulary: Vocabulary = serde_json::from_slice(state)?;
        if vocabulary.idf.len() > self.max_vocab {
            return Err(EmbedError::invalid_config(format!(
                "stored vocabulary has {} terms but max_vocab is {}",
                vocabulary.idf.len(),
                self.max_vocab
            )));
        }
        if vocabulary.index.values().any(|&i| i >= vocabulary.idf.len()) {
            return Err(EmbedError::invalid_response(
                "stored vocabulary references a missing IDF weight",
            ));
        }
        *self.vocabulary.write().await = Some(vocabulary);
        Ok(())
    }

    fn embedding_dimension(&self) -> usize {
        self.max_vocab
    }

    fn provider_name(&self) -> &str {
        "tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Hello, World! it's 2024-ready").collect();
        assert_eq!(tokens, vec!["hello", "world", "it", "s", "2024", "ready"]);
    }

    #[test]
    fn test_train_keeps_most_frequent_terms() {
        let docs = corpus(&["apple banana", "apple cherry", "apple banana date"]);
        let vocab = Vocabulary::train(&docs, 2);

        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.index["apple"], 0);
        assert_eq!(vocab.index["banana"], 1);
        assert!(!vocab.index.contains_key("cherry"));
        // apple occurs in every document
        assert_eq!(vocab.idf[0], 0.0);
        assert!((vocab.idf[1] - (3.0f32 / 2.0).ln()).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embeddings_are_normalized() {
        let provider = TfIdfProvider::new(16);
        provider
            .train(&corpus(&["rust is fast", "python is slow", "go is simple"]))
            .await;

        let result = provider
            .embed_texts(&corpus(&["rust fast", "unknown words only"]))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 16);
        assert!((norm(&result.embeddings[0]) - 1.0).abs() < 1e-5);
        // Out-of-vocabulary text stays a zero vector
        assert_eq!(norm(&result.embeddings[1]), 0.0);
    }

    #[tokio::test]
    async fn test_auto_trains_on_first_call() {
        let provider = TfIdfProvider::new(8);
        assert!(!provider.is_trained().await);

        let result = provider
            .embed_texts(&corpus(&["alpha beta", "gamma delta"]))
            .await
            .unwrap();
        assert!(provider.is_trained().await);
        assert_eq!(result.embeddings.len(), 2);

        let vocab = provider.vocabulary().await.unwrap();
        assert_eq!(vocab.documents, 2);
        assert_eq!(vocab.len(), 4);
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let provider = TfIdfProvider::new(64);
        provider
            .train(&corpus(&[
                "the quick brown fox",
                "a cat sat on a mat",
                "dogs chase cats",
            ]))
            .await;

        let result = provider
            .embed_texts(&corpus(&["fox", "the quick brown fox", "a cat sat on a mat"]))
            .await
            .unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();

        let query = &result.embeddings[0];
        assert!(dot(query, &result.embeddings[1]) > dot(query, &result.embeddings[2]));
    }

    #[tokio::test]
    async fn test_fit_does_not_retrain() {
        let provider = TfIdfProvider::new(8);
        provider.fit(&corpus(&["alpha beta", "beta gamma"])).await.unwrap();
        provider.fit(&corpus(&["delta epsilon"])).await.unwrap();

        let vocab = provider.vocabulary().await.unwrap();
        assert!(vocab.index.contains_key("alpha"));
        assert!(!vocab.index.contains_key("delta"));
    }

    #[tokio::test]
    async fn test_state_export_import() {
        let trained = TfIdfProvider::new(16);
        trained.train(&corpus(&["red green", "green blue", "blue red yellow"])).await;
        let state = trained.export_state().await.unwrap().unwrap();

        let restored = TfIdfProvider::new(16);
        assert!(restored.export_state().await.unwrap().is_none());
        restored.import_state(&state).await.unwrap();

        let texts = corpus(&["yellow green"]);
        assert_eq!(
            trained.embed_texts(&texts).await.unwrap(),
            restored.embed_texts(&texts).await.unwrap()
        );

        let too_small = TfIdfProvider::new(2);
        assert!(too_small.import_state(&state).await.is_err());
        assert!(restored.import_state(b"not json").await.is_err());
    }

    #[tokio::test]
    async fn test_with_vocabulary_reuses_training() {
        let vocab = Vocabulary::train(&corpus(&["one two", "two three"]), 4);
        let provider = TfIdfProvider::with_vocabulary(4, vocab.clone());
        assert_eq!(provider.vocabulary().await, Some(vocab));
    }
}
