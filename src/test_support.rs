// Deterministic provider fakes shared by unit tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::{RagError, Result};

pub(crate) const FAKE_DIMENSION: usize = 32;

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    pub fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn failing() -> Self {
        let embedder = Self::default();
        embedder.fail.store(true, Ordering::SeqCst);
        embedder
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; FAKE_DIMENSION];
        // keeps every vector away from zero so cosine distance is defined
        vector[FAKE_DIMENSION - 1] = 0.01;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) % (FAKE_DIMENSION as u64 - 1);
            vector[bucket as usize] += 1.0;
        }
        vector
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Embedding("embedding service unreachable".to_string()));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Generator that records prompts and answers with a canned reply
#[derive(Debug, Default)]
pub(crate) struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail_next: AtomicBool,
}

impl RecordingGenerator {
    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompt log poisoned").len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("prompt log poisoned").last().cloned()
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().expect("prompt log poisoned");
        prompts.push(prompt.to_string());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RagError::Generation("generation timed out".to_string()));
        }
        Ok(format!("answer #{}", prompts.len()))
    }
}
