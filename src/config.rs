use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunks fetched per query.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum relevance for a hit to be returned at all.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Documents processed concurrently per batch window.
    #[serde(default = "default_batch_window")]
    pub batch_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: default_threshold(),
            batch_window: default_batch_window(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_threshold() -> f64 {
    0.0
}
fn default_batch_window() -> usize {
    3
}

/// Thresholds for the retrieval confidence evaluator.
///
/// Policy constants, not tuned values — see DESIGN.md.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ConfidenceConfig {
    /// Hits below this score do not count as matched chunks.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
    /// Top score at or above this maps to `medium` (sufficient).
    #[serde(default = "default_medium")]
    pub medium: f64,
    /// Top score at or above this maps to `high`.
    #[serde(default = "default_high")]
    pub high: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            relevance_floor: default_relevance_floor(),
            medium: default_medium(),
            high: default_high(),
        }
    }
}

fn default_relevance_floor() -> f64 {
    0.25
}
fn default_medium() -> f64 {
    0.5
}
fn default_high() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_turns: default_history_turns(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.7
}
fn default_history_turns() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    if config.retrieval.limit == 0 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }
    if config.retrieval.batch_window == 0 {
        anyhow::bail!("retrieval.batch_window must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [0.0, 1.0]");
    }

    let c = &config.confidence;
    for (name, v) in [
        ("confidence.relevance_floor", c.relevance_floor),
        ("confidence.medium", c.medium),
        ("confidence.high", c.high),
    ] {
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if !(c.relevance_floor <= c.medium && c.medium <= c.high) {
        anyhow::bail!("confidence thresholds must satisfy relevance_floor <= medium <= high");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(config)
}
