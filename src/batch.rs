//! PathModel / BatchState: filesystem layout, batch discovery, and the
//! durable step-completion flags that make the pipeline resumable.
//!
//! Flag-file progress is the cross-process state mechanism and is kept as
//! plain files on disk rather than any in-memory object graph (see
//! `SPEC_FULL.md` §9): a crashed or restarted process re-derives exactly
//! where it left off by statting `progress/<step>`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};

/// Steps that carry a durable, monotonic per-batch flag. `load`, `dropAll`
/// and `switchOver` act across batches and have no per-batch flag.
pub const STEP_ORDER: &[&str] = &[
    "annot",
    "filter",
    "blat",
    "sort",
    "chain",
    "identifiers",
    "tables",
];

#[derive(Debug, Clone)]
pub struct Batch {
    pub dataset: String,
    pub batch_id: u32,
    pub dir: PathBuf,
}

impl Batch {
    pub fn progress_dir(&self) -> PathBuf {
        self.dir.join("progress")
    }

    pub fn update_ids_file(&self) -> PathBuf {
        self.dir.join("updateIds.txt")
    }

    pub fn chunk_names_file(&self) -> PathBuf {
        self.dir.join("annotatedTextChunks.tab")
    }

    pub fn annot_dir(&self, kind: &str) -> PathBuf {
        self.dir.join("annots").join(kind)
    }

    pub fn filter_dir(&self, kind: &str) -> PathBuf {
        self.dir.join("filter").join(kind)
    }

    pub fn blat_dir(&self, group: &str) -> PathBuf {
        self.dir.join("blat").join(group)
    }

    pub fn sort_dir(&self, group: &str) -> PathBuf {
        self.dir.join("sort").join(group)
    }

    pub fn chain_dir(&self, group: &str) -> PathBuf {
        self.dir.join("chain").join(group)
    }

    pub fn bed_dir(&self) -> PathBuf {
        self.dir.join("bed")
    }

    pub fn table_dir(&self) -> PathBuf {
        self.dir.join("tables")
    }

    pub fn files_tab(&self) -> PathBuf {
        self.dir.join("files.tab")
    }

    pub fn articles_tab(&self) -> PathBuf {
        self.dir.join("articles.tab")
    }

    pub fn marker_articles_tab(&self) -> PathBuf {
        self.dir.join("markerArticles.tab")
    }

    pub fn marker_counts_tab(&self) -> PathBuf {
        self.dir.join("markerCounts.tab")
    }

    pub fn marker_beds_dir(&self) -> PathBuf {
        self.dir.join("markerBeds")
    }

    pub fn read_update_ids(&self) -> Result<Vec<String>> {
        read_list(&self.update_ids_file())
    }

    pub fn write_update_ids(&self, ids: &[String]) -> Result<()> {
        write_list(&self.update_ids_file(), ids)
    }

    pub fn read_chunk_names(&self) -> Result<Vec<String>> {
        read_list(&self.chunk_names_file())
    }

    pub fn write_chunk_names(&self, names: &[String]) -> Result<()> {
        write_list(&self.chunk_names_file(), names)
    }
}

fn read_list(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

fn write_list(path: &Path, items: &[String]) -> Result<()> {
    debug!("writing {} entries to {}", items.len(), path.display());
    let body = items.join("\n") + if items.is_empty() { "" } else { "\n" };
    fs::write(path, body)?;
    Ok(())
}

fn batches_dir(ctx: &PipelineContext) -> PathBuf {
    ctx.batches_dir()
}

/// All batch ids present on disk, sorted ascending.
pub fn batch_ids(ctx: &PipelineContext) -> Result<Vec<u32>> {
    let dir = batches_dir(ctx);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(id) = name.parse::<u32>() {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

pub fn batch_at(ctx: &PipelineContext, batch_id: u32) -> Batch {
    Batch {
        dataset: ctx.dataset.clone(),
        batch_id,
        dir: ctx.batch_dir(batch_id),
    }
}

/// Test for flag file existence: `progress/<step>` within the batch dir.
pub fn is_past(batch: &Batch, step: &str) -> bool {
    batch.progress_dir().join(step).is_file()
}

/// Atomically create `progress/<step>`. Idempotent.
pub fn flag(batch: &Batch, step: &str) -> Result<()> {
    let dir = batch.progress_dir();
    if !dir.is_dir() {
        fs::create_dir_all(&dir)?;
    }
    let path = dir.join(step);
    if !path.is_file() {
        fs::write(&path, b"")?;
    }
    debug!("flagged step {} as done for batch {}", step, batch.batch_id);
    Ok(())
}

/// Sorted ascending list of batch ids that have completed `step`.
pub fn batches_at_step(ctx: &PipelineContext, step: &str) -> Result<Vec<u32>> {
    let mut result = Vec::new();
    for id in batch_ids(ctx)? {
        let batch = batch_at(ctx, id);
        if is_past(&batch, step) {
            result.push(id);
        }
    }
    Ok(result)
}

/// The highest-numbered batch not yet past `tables`; `None` if no batch
/// exists or the highest one has already completed `tables`.
pub fn current_batch(ctx: &PipelineContext) -> Result<Option<Batch>> {
    let ids = batch_ids(ctx)?;
    match ids.last() {
        None => Ok(None),
        Some(&id) => {
            let batch = batch_at(ctx, id);
            if is_past(&batch, "tables") {
                Ok(None)
            } else {
                Ok(Some(batch))
            }
        }
    }
}

/// Create the next batch. Fails with `InProgress` if the latest existing
/// batch is past `annot` but not past `tables` (a previous run may have
/// crashed); fails with `InUse` if the new batch's directory already
/// exists and is non-empty.
pub fn new_batch(ctx: &PipelineContext) -> Result<Batch> {
    let ids = batch_ids(ctx)?;
    if let Some(&last_id) = ids.last() {
        let last = batch_at(ctx, last_id);
        if is_past(&last, "annot") && !is_past(&last, "tables") {
            return Err(PipelineError::InProgress {
                batch_id: last_id,
                hint: format!(
                    "delete or complete batch {} at {} to restart it",
                    last_id,
                    last.dir.display()
                ),
            });
        }
    }
    let next_id = ids.last().map(|id| id + 1).unwrap_or(0);
    let batch = batch_at(ctx, next_id);
    if batch.dir.is_dir() {
        let non_empty = fs::read_dir(&batch.dir)?.next().is_some();
        if non_empty {
            return Err(PipelineError::InUse(batch.dir.clone()));
        }
    } else {
        fs::create_dir_all(&batch.dir)?;
    }
    info!("created new batch {} at {}", next_id, batch.dir.display());
    Ok(batch)
}

/// `(all updateIds in the text dir) \ (union of updateIds recorded in
/// batches past 'annot')`.
pub fn unannotated_update_ids(ctx: &PipelineContext, all_update_ids: &[String]) -> Result<Vec<String>> {
    let mut done = std::collections::HashSet::new();
    for id in batches_at_step(ctx, "annot")? {
        let batch = batch_at(ctx, id);
        for u in batch.read_update_ids()? {
            done.insert(u);
        }
    }
    let remaining: Vec<String> = all_update_ids
        .iter()
        .filter(|u| !done.contains(*u))
        .cloned()
        .collect();
    info!(
        "text updates: {}, already annotated: {}, remaining: {}",
        all_update_ids.len(),
        done.len(),
        remaining.len()
    );
    Ok(remaining)
}
