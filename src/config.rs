//! Process-wide constants, loaded from a TOML config file instead of read
//! as a module global (see `SPEC_FULL.md` §4.0 / §9).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct DigitsConfig {
    pub article_digits: u32,
    pub file_digits: u32,
    pub annot_digits: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeqFilterConfig {
    pub min_seq_len: usize,
    pub max_seq_len: usize,
    pub min_prot_seq_len: usize,
    pub short_seq_cutoff: usize,
    pub max_short_bytes: u64,
    pub max_long_bytes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default)]
    pub max_dist: HashMap<String, u64>,
    pub min_chain_coverage: u64,
    pub max_chain_length: u64,
    pub max_features: usize,
    pub max_db_match_count: usize,
    pub chunk_article_count: u64,
    pub chunk_divider: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DbConfig {
    #[serde(default)]
    pub default_genomes: Vec<String>,
    #[serde(default)]
    pub always_use_genomes: Vec<String>,
    #[serde(default)]
    pub align_genome_order: Vec<String>,
    #[serde(default)]
    pub species_names: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnnotIdOffsets {
    pub dna_search: u64,
    pub prot_search: u64,
    pub marker_search: u64,
    #[serde(default)]
    pub per_dataset: HashMap<String, u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub digits: DigitsConfig,
    pub seq_filter: SeqFilterConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub dbs: DbConfig,
    #[serde(default)]
    pub annot_id_offsets: AnnotIdOffsets,
    #[serde(default)]
    pub word_count_base: Option<String>,
}

impl PipelineConfig {
    /// Load and validate a config file. Fails fast (`PipelineError::Config`)
    /// before any stage runs, per the error handling design.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let cfg: PipelineConfig = toml::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("malformed config {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let total = self.digits.article_digits + self.digits.file_digits + self.digits.annot_digits;
        if total > 18 {
            return Err(PipelineError::Config(format!(
                "articleDigits+fileDigits+annotDigits = {total} exceeds 18, annotId would not fit in u64"
            )));
        }
        if !self.chain.max_dist.contains_key("default") {
            return Err(PipelineError::Config(
                "chain.max_dist must define a \"default\" entry".to_string(),
            ));
        }
        if self.seq_filter.min_seq_len > self.seq_filter.max_seq_len {
            return Err(PipelineError::Config(
                "seq_filter.min_seq_len must be <= max_seq_len".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_dist_for(&self, db: &str) -> u64 {
        self.chain
            .max_dist
            .get(db)
            .copied()
            .unwrap_or_else(|| self.chain.max_dist["default"])
    }

    pub fn annot_id_offset(&self, dataset: &str) -> u64 {
        self.annot_id_offsets
            .per_dataset
            .get(dataset)
            .copied()
            .unwrap_or(0)
    }
}
