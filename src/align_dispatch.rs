//! AlignDispatcher: turns the FASTA shards written by `seq_filter` into a
//! batch of alignment job command lines and hands them to a
//! [`ChunkRunner`]. The aligner itself is an external collaborator; this
//! module only ever builds command lines for it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::runner::ChunkRunner;

/// db -> fasta shard files under one seqType directory.
pub type DbFiles = HashMap<String, Vec<PathBuf>>;

/// `faDir/<seqType>/<db>.NN.fa` -> seqType -> db -> shard file list.
/// Empty shard files are skipped so no zero-length alignment job is ever
/// submitted.
pub fn index_files_by_type_db(fa_dir: &Path, seq_types: &[String]) -> Result<HashMap<String, DbFiles>> {
    let mut by_type: HashMap<String, DbFiles> = HashMap::new();
    let mut total = 0usize;
    for seq_type in seq_types {
        let dir = fa_dir.join(seq_type);
        let mut by_db: DbFiles = HashMap::new();
        if !dir.is_dir() {
            by_type.insert(seq_type.clone(), by_db);
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("fa") {
                continue;
            }
            if entry.metadata()?.len() == 0 {
                continue;
            }
            let stem = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let db = stem.split('.').next().unwrap_or(stem).to_string();
            by_db.entry(db).or_default().push(path);
            total += 1;
        }
        debug!("{} fa files found in {}", by_db.values().map(|v| v.len()).sum::<usize>(), dir.display());
        by_type.insert(seq_type.clone(), by_db);
    }
    if total == 0 {
        return Err(PipelineError::data("align_dispatch::index_files_by_type_db", format!("no fa files found under {}", fa_dir.display())));
    }
    Ok(by_type)
}

/// One alignment job: a single db/seqType/query-shard triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlatJob {
    pub seq_type: String,
    pub db: String,
    pub query: PathBuf,
    pub psl_out: PathBuf,
}

impl BlatJob {
    /// Render as the opaque command line handed to `ChunkRunner`.
    pub fn cmdline(&self, blat_binary: &str, blat_options: &str) -> String {
        format!(
            "{blat_binary} {} {} {} {blat_options}",
            self.db,
            self.query.display(),
            self.psl_out.display(),
        )
    }
}

/// Build and submit one blat job per (seqType, db, shard file), skipping
/// dbs not named in `only_dbs` when it is non-empty.
pub fn dispatch_blat_jobs(
    runner: &mut dyn ChunkRunner,
    fa_dir: &Path,
    psl_dir: &Path,
    only_dbs: &[String],
    seq_types: &[String],
    blat_binary: &str,
    blat_options: &str,
) -> Result<usize> {
    let by_type = index_files_by_type_db(fa_dir, seq_types)?;
    let mut submitted = 0usize;
    for (seq_type, by_db) in by_type {
        for (db, fa_files) in by_db {
            if !only_dbs.is_empty() && !only_dbs.contains(&db) {
                continue;
            }
            let out_dir = psl_dir.join(&db).join(&seq_type);
            fs::create_dir_all(&out_dir)?;
            info!("scheduling {} blat jobs: db {db}, seqType {seq_type}", fa_files.len());
            for (i, query) in fa_files.into_iter().enumerate() {
                let psl_out = out_dir.join(format!("{i}.psl"));
                let job = BlatJob {
                    seq_type: seq_type.clone(),
                    db: db.clone(),
                    query,
                    psl_out,
                };
                runner.submit(job.cmdline(blat_binary, blat_options));
                submitted += 1;
            }
        }
    }
    if submitted == 0 {
        warn!("no blat jobs were schedulable for {}", fa_dir.display());
    }
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::DryRunRunner;

    fn write_fa(dir: &Path, seq_type: &str, db: &str, shard: u32, content: &str) {
        let type_dir = dir.join(seq_type);
        fs::create_dir_all(&type_dir).unwrap();
        fs::write(type_dir.join(format!("{db}.{shard:02}.fa")), content).unwrap();
    }

    #[test]
    fn index_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fa(dir.path(), "genome", "hg19", 0, ">1\nACGT\n");
        write_fa(dir.path(), "genome", "hg19", 1, "");
        let seq_types = vec!["genome".to_string()];
        let indexed = index_files_by_type_db(dir.path(), &seq_types).unwrap();
        assert_eq!(indexed["genome"]["hg19"].len(), 1);
    }

    #[test]
    fn index_errors_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let seq_types = vec!["genome".to_string()];
        let err = index_files_by_type_db(dir.path(), &seq_types).unwrap_err();
        assert!(matches!(err, PipelineError::Data { .. }));
    }

    #[test]
    fn dispatch_submits_one_job_per_shard_and_respects_only_dbs() {
        let fa_dir = tempfile::tempdir().unwrap();
        let psl_dir = tempfile::tempdir().unwrap();
        write_fa(fa_dir.path(), "genome", "hg19", 0, ">1\nACGT\n");
        write_fa(fa_dir.path(), "genome", "mm9", 0, ">2\nACGT\n");
        let mut runner = DryRunRunner::new();
        let seq_types = vec!["genome".to_string()];
        let only_dbs = vec!["hg19".to_string()];
        let count = dispatch_blat_jobs(
            &mut runner,
            fa_dir.path(),
            psl_dir.path(),
            &only_dbs,
            &seq_types,
            "blat",
            "-minScore=30",
        )
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(runner.submitted.len(), 1);
        assert!(runner.submitted[0].contains("hg19"));
    }
}
