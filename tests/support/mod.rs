//! Deterministic stand-ins for the model and embedding services.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use codepilot::config::Config;
use codepilot::context::AppContext;
use codepilot::embedding::EmbeddingProvider;
use codepilot::llm::{GenerationRequest, TextGenerator};

/// Answers each prompt with the response of the first rule whose needle
/// occurs in it, and records every request.
#[derive(Default)]
pub struct ScriptedGenerator {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn otherwise(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn temperatures(&self) -> Vec<Option<f32>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        for (needle, response) in &self.rules {
            if request.prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => bail!("no scripted response for prompt"),
        }
    }
}

/// Hashes lowercase alphanumeric words into a fixed number of buckets.
pub struct BagOfWords {
    name: String,
    dims: usize,
}

impl BagOfWords {
    pub fn new() -> Self {
        Self::named("bag-of-words")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dims: 64,
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Defaults with the index placed under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::minimal();
    config.index.path = dir.join("vectorstores").join("codebase.sqlite");
    config
}

pub fn context(
    config: Config,
    generator: Arc<ScriptedGenerator>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> AppContext {
    AppContext::new(config, generator, embedder)
}
