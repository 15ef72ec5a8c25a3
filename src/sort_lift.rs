//! SortLift: per-db sort of the raw alignment PSLs, plus the optional
//! cDNA/protein coordinate lift back onto genome coordinates. Lifting is
//! tolerant of missing mapping files — a db without a cDNA mapping psl is
//! skipped rather than failing the whole step, since not every db in a
//! dataset necessarily has cDNA sequences configured.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::Result;
use crate::runner::ChunkRunner;

/// Submit one sort job per db: `sortScript inDir/<db> outDir/<db>.psl <db> <seqType>`.
/// For cdna/prot seqTypes the job is also told where to find the cDNA
/// coordinate space it needs to sort within.
pub fn dispatch_sort_jobs(
    runner: &mut dyn ChunkRunner,
    seq_type: &str,
    in_dir: &Path,
    out_dir: &Path,
    dbs: &[String],
    sort_script: &str,
    cdna_dir: Option<&Path>,
) -> Result<usize> {
    fs::create_dir_all(out_dir)?;
    info!("sorting psls for seqType {seq_type}, mapping to genome coord system");
    let mut submitted = 0usize;
    for db in dbs {
        let db_in_dir = in_dir.join(db);
        let db_out_file = out_dir.join(format!("{db}.psl"));
        let mut cmd = format!(
            "{sort_script} {} {} {db} {seq_type}",
            db_in_dir.display(),
            db_out_file.display()
        );
        if matches!(seq_type, "c" | "p") {
            if let Some(dir) = cdna_dir {
                cmd.push_str(&format!(" --cdnaDir {}", dir.display()));
            }
        }
        runner.submit(cmd);
        submitted += 1;
    }
    Ok(submitted)
}

/// Finds the single `*.psl` coordinate-mapping file for a db under its
/// cDNA directory. More than one match is a configuration error the
/// original tooling also refused to guess through.
fn find_cdna_map(cdna_dir: &Path, db: &str) -> Result<Option<PathBuf>> {
    let dir = cdna_dir.join(db);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut matches: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("psl"))
        .collect();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        n => Err(crate::error::PipelineError::data(
            "sort_lift::find_cdna_map",
            format!("expected at most one mapping psl for db {db}, found {n}"),
        )),
    }
}

/// Submit one `pslMap` lift job per db that has both a sorted psl and a
/// cDNA mapping file. Returns the dbs that were skipped (and why), for
/// the caller to log or surface to an operator.
pub fn lift_cdna_jobs(
    runner: &mut dyn ChunkRunner,
    sorted_dir: &Path,
    cdna_map_dir: &Path,
    out_dir: &Path,
    dbs: &[String],
    pslmap_binary: &str,
) -> Result<Vec<(String, String)>> {
    fs::create_dir_all(out_dir)?;
    let mut skipped = Vec::new();
    for db in dbs {
        let psl_file = sorted_dir.join(format!("{db}.psl"));
        let map_psl = match find_cdna_map(cdna_map_dir, db)? {
            Some(p) => p,
            None => {
                warn!("no cDNA mapping psl for db {db}, skipping lift");
                skipped.push((db.clone(), "no cDNA mapping psl found".to_string()));
                continue;
            }
        };
        if !psl_file.is_file() {
            warn!("sorted psl {} missing, skipping lift for db {db}", psl_file.display());
            skipped.push((db.clone(), "sorted psl file missing".to_string()));
            continue;
        }
        let out_file = out_dir.join(format!("{db}.psl"));
        runner.submit(format!(
            "{pslmap_binary} {} {} {}",
            psl_file.display(),
            map_psl.display(),
            out_file.display()
        ));
    }
    Ok(skipped)
}
