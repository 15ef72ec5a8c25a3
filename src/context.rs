//! `PipelineContext` replaces the original's module-global `dataset`/`baseDir`
//! pair with an explicit value threaded through every component call.

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub dataset: String,
    pub out_dir: PathBuf,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig, dataset: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        PipelineContext {
            config,
            dataset: dataset.into(),
            out_dir: out_dir.into(),
        }
    }

    /// `<outDir>/<dataset>`
    pub fn dataset_dir(&self) -> PathBuf {
        self.out_dir.join(&self.dataset)
    }

    /// `<outDir>/<dataset>/batches`
    pub fn batches_dir(&self) -> PathBuf {
        self.dataset_dir().join("batches")
    }

    pub fn batch_dir(&self, batch_id: u32) -> PathBuf {
        self.batches_dir().join(batch_id.to_string())
    }

    pub fn text_dir(&self, text_base_dir: &Path) -> PathBuf {
        text_base_dir.join(&self.dataset)
    }
}
