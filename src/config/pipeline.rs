// src/config/pipeline.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

fn default_window_secs() -> u64 {
    3600
}
fn default_max_concurrency() -> usize {
    10
}
fn default_timeout_ms() -> u64 {
    8_000
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_max_attempts() -> u32 {
    2
}
fn default_threshold() -> f32 {
    0.85
}
fn default_lsh_bits() -> usize {
    20
}
fn default_lsh_seed() -> u64 {
    48
}
fn default_embedding_dim() -> usize {
    768
}
fn default_max_text_len() -> usize {
    1900
}
fn default_summary_cap() -> usize {
    1500
}
fn default_embed_batch_size() -> usize {
    16
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Fetch stage knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Total attempts per feed, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Dedup stage knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_lsh_bits")]
    pub lsh_bits: usize,
    #[serde(default = "default_lsh_seed")]
    pub lsh_seed: u64,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
    #[serde(default = "default_summary_cap")]
    pub summary_cap: usize,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    /// Continue with undeduplicated items when the embedding stage fails.
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            lsh_bits: default_lsh_bits(),
            lsh_seed: default_lsh_seed(),
            embedding_dim: default_embedding_dim(),
            max_text_len: default_max_text_len(),
            summary_cap: default_summary_cap(),
            embed_batch_size: default_embed_batch_size(),
            fail_open: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            fetch: FetchSettings::default(),
            dedup: DedupSettings::default(),
            results_dir: default_results_dir(),
        }
    }
}

impl PipelineSettings {
    pub fn window(&self) -> chrono::Duration {
        // Capped well inside chrono's range.
        chrono::Duration::seconds(self.window_secs.min(u64::from(u32::MAX)) as i64)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline settings from {}", path.display()))?;
        let mut cfg: PipelineSettings = toml::from_str(&data)
            .with_context(|| format!("parsing pipeline settings in {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Settings file (if any) with env overrides applied on top:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = match env::var(ENV_PIPELINE_CONFIG_PATH) {
            Ok(p) => Self::load_from_file(PathBuf::from(p))?,
            Err(_) => {
                let p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
                if p.exists() {
                    Self::load_from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u64>("NEWS_WINDOW_SECS") {
            self.window_secs = v;
        }
        if let Some(v) = env_parse::<usize>("FETCH_MAX_CONCURRENCY") {
            self.fetch.max_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("FETCH_TIMEOUT_MS") {
            self.fetch.timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("FETCH_RETRY_DELAY_MS") {
            self.fetch.retry_delay_ms = v;
        }
        if let Some(v) = parse_threshold_env(env::var("DEDUP_THRESHOLD").ok()) {
            self.dedup.threshold = v;
        }
        if let Ok(v) = env::var("DEDUP_FAIL_OPEN") {
            self.dedup.fail_open = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("RESULTS_DIR") {
            if !v.trim().is_empty() {
                self.results_dir = PathBuf::from(v.trim());
            }
        }
    }

    fn sanitize(&mut self) {
        if !(0.0..=1.0).contains(&self.dedup.threshold) {
            self.dedup.threshold = default_threshold();
        }
        self.fetch.max_concurrency = self.fetch.max_concurrency.max(1);
        self.fetch.max_attempts = self.fetch.max_attempts.max(1);
        self.dedup.embed_batch_size = self.dedup.embed_batch_size.max(1);
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}
