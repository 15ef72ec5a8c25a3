//! Annotator driver: runs the text-mining annotators over a batch's text
//! chunks, assigning each annotator a disjoint `annotId` offset range so
//! two annotators (DNA search, protein search, marker search, ...) never
//! collide on the same id space.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::AnnotIdOffsets;
use crate::error::Result;
use crate::runner::ChunkRunner;

/// One annotator's job: a name (used to pick its offset and its job
/// script) plus which text chunks it still needs to process.
#[derive(Debug, Clone)]
pub struct AnnotatorJob {
    pub name: String,
    pub annot_id_offset: u64,
}

impl AnnotIdOffsets {
    /// Resolve the configured offset for a named annotator.
    pub fn offset_for(&self, annotator: &str) -> u64 {
        match annotator {
            "dna" => self.dna_search,
            "prot" => self.prot_search,
            "marker" => self.marker_search,
            _ => 0,
        }
    }
}

/// If the per-dataset uppercase word-count file is missing, submit a
/// map-reduce-shaped job through the runner to build it; otherwise reuse
/// the existing one. Returns the file's path either way.
pub fn ensure_word_count_file(
    runner: &mut dyn ChunkRunner,
    base_dir: &Path,
    word_count_base: &str,
    text_dir: &Path,
    update_ids: &[String],
) -> Result<PathBuf> {
    let word_file = base_dir.join(word_count_base);
    if word_file.is_file() {
        debug!("not counting words, file {} found", word_file.display());
        return Ok(word_file);
    }
    info!("counting upcase words for protein search to {}", word_file.display());
    let update_arg = update_ids.join(",");
    runner.submit(format!(
        "protSearch.py UpcaseCounter {} {} --updateIds {}",
        text_dir.display(),
        word_file.display(),
        update_arg
    ));
    runner.finish(true)?;
    Ok(word_file)
}

/// Submit one annotation job per (annotator, text chunk), tagging each
/// with the annotator's configured `annotId` offset so downstream
/// `annotId`s never collide across annotators.
pub fn dispatch_annotators(
    runner: &mut dyn ChunkRunner,
    annotators: &[AnnotatorJob],
    chunk_names: &[String],
    text_dir: &Path,
    out_dir: &Path,
) -> Result<usize> {
    let mut submitted = 0usize;
    for annotator in annotators {
        for chunk in chunk_names {
            let in_file = text_dir.join(chunk);
            let out_file = out_dir.join(&annotator.name).join(chunk);
            runner.submit(format!(
                "pubAlg {} {} {} --annotIdOffset {}",
                annotator.name,
                in_file.display(),
                out_file.display(),
                annotator.annot_id_offset
            ));
            submitted += 1;
        }
    }
    Ok(submitted)
}
