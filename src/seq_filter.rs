//! SeqFilter: turns the tab-separated sequence rows produced by text
//! mining into per-db, size-capped FASTA shards ready for alignment.
//!
//! Each db gets a "short" and a "long" shard stream; a stream rolls over
//! to a new file once it exceeds its byte budget, but only at an article
//! boundary so no article's sequences are ever split across two files.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::annot_id::article_id_of;
use crate::config::{DbConfig, DigitsConfig, SeqFilterConfig};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SeqRow {
    pub annot_id: u64,
    pub seq: String,
    /// Explicit dbs from the row's `dbs` column; empty means "use the
    /// configured default genome set".
    pub dbs: Vec<String>,
    pub prefix_filter_accept: bool,
    pub suffix_filter_accept: bool,
}

fn target_dbs(row: &SeqRow, db_config: &DbConfig) -> Vec<String> {
    let mut dbs = if row.dbs.is_empty() {
        db_config.default_genomes.clone()
    } else {
        row.dbs.clone()
    };
    dbs.extend(db_config.always_use_genomes.iter().cloned());
    dbs.sort();
    dbs.dedup();
    dbs
}

#[derive(Debug)]
struct Shard {
    dir: PathBuf,
    db: String,
    size_class: &'static str,
    count: u32,
    file: File,
    byte_count: u64,
    last_article_id: u64,
}

impl Shard {
    fn open(dir: &Path, db: &str, size_class: &'static str, count: u32) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{db}.{count:02}.fa"));
        debug!("created fasta shard {}", path.display());
        let file = File::create(&path)?;
        Ok(Shard {
            dir: dir.to_path_buf(),
            db: db.to_string(),
            size_class,
            count,
            file,
            byte_count: 0,
            last_article_id: 0,
        })
    }

    fn roll(&mut self) -> Result<()> {
        self.count += 1;
        let path = self.dir.join(format!("{}.{:02}.fa", self.db, self.count));
        debug!("size budget reached, rolling to {}", path.display());
        self.file = File::create(&path)?;
        self.byte_count = 0;
        Ok(())
    }

    fn write(&mut self, annot_id: u64, seq: &str, max_bytes: u64, article_id: u64) -> Result<()> {
        if self.byte_count > max_bytes && article_id != self.last_article_id {
            self.roll()?;
        }
        writeln!(self.file, ">{annot_id}\n{seq}")?;
        self.byte_count += seq.len() as u64;
        self.last_article_id = article_id;
        Ok(())
    }
}

/// Opens and maintains the short/long FASTA shard streams for every db a
/// dataset aligns against.
pub struct FastaSharder {
    out_dir: PathBuf,
    config: SeqFilterConfig,
    shards: HashMap<(String, &'static str), Shard>,
    /// Sequences already emitted per article, so a repeated annotation of
    /// the same sequence text within one article is only written once.
    seen: HashMap<u64, HashSet<String>>,
}

impl FastaSharder {
    /// Creates the initial `<db>.00.fa` shard for every (db, size class)
    /// pair up front, the same way the original stage lays out its output
    /// tree before streaming rows into it.
    pub fn new(out_dir: impl Into<PathBuf>, dbs: &[String], config: SeqFilterConfig) -> Result<Self> {
        let out_dir = out_dir.into();
        let mut shards = HashMap::new();
        for db in dbs {
            for size_class in ["short", "long"] {
                let dir = out_dir.join(size_class);
                let shard = Shard::open(&dir, db, size_class, 0)?;
                shards.insert((db.clone(), size_class), shard);
            }
        }
        Ok(FastaSharder { out_dir, config, shards, seen: HashMap::new() })
    }

    fn max_bytes(&self, size_class: &str) -> u64 {
        if size_class == "short" {
            self.config.max_short_bytes
        } else {
            self.config.max_long_bytes
        }
    }

    /// Write one row's sequence into every target db's shard, skipping
    /// protein rows that failed the prefix/suffix filter and sequences
    /// already seen for this article. Returns whether the row was
    /// actually written.
    pub fn append_row(&mut self, row: &SeqRow, db_config: &DbConfig, digits: &DigitsConfig, is_prot: bool) -> Result<bool> {
        if is_prot && !(row.prefix_filter_accept && row.suffix_filter_accept) {
            debug!("skipping seq {}, failed prefix/suffix filter", row.annot_id);
            return Ok(false);
        }
        let article_id = article_id_of(row.annot_id, digits);
        let seen = self.seen.entry(article_id).or_default();
        if !seen.insert(row.seq.clone()) {
            debug!("skipping seq {}, duplicate within article {article_id}", row.annot_id);
            return Ok(false);
        }
        let size_class: &'static str = if row.seq.len() < self.config.short_seq_cutoff {
            "short"
        } else {
            "long"
        };
        let max_bytes = self.max_bytes(size_class);

        for db in target_dbs(row, db_config) {
            let shard = match self.shards.get_mut(&(db.clone(), size_class)) {
                Some(s) => s,
                None => {
                    let dir = self.out_dir.join(size_class);
                    let shard = Shard::open(&dir, &db, size_class, 0)?;
                    self.shards.entry((db.clone(), size_class)).or_insert(shard)
                }
            };
            shard.write(row.annot_id, &row.seq, max_bytes, article_id)?;
        }
        Ok(true)
    }

    pub fn close(self) -> Result<()> {
        for (_, mut shard) in self.shards {
            shard.file.flush()?;
        }
        Ok(())
    }
}

/// Parse sequence rows out of an annotator's tab output:
/// `annotId\tseq\tdbs\tprefixFilterAccept\tsuffixFilterAccept`, where `dbs`
/// is a comma-separated list (or empty, meaning "use the configured
/// default genome set"). Malformed lines are logged and skipped rather
/// than aborting the whole file.
pub fn read_seq_rows(path: &Path) -> Result<Vec<SeqRow>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 5 {
            debug!("skipping malformed seq row: {line:?}");
            continue;
        }
        let Ok(annot_id) = cols[0].parse::<u64>() else {
            debug!("skipping row with unparseable annotId: {line:?}");
            continue;
        };
        let dbs = if cols[2].is_empty() {
            Vec::new()
        } else {
            cols[2].split(',').map(|s| s.to_string()).collect()
        };
        rows.push(SeqRow {
            annot_id,
            seq: cols[1].to_string(),
            dbs,
            prefix_filter_accept: cols[3] == "1",
            suffix_filter_accept: cols[4] == "1",
        });
    }
    Ok(rows)
}

/// Length filter applied before a sequence reaches the sharder: drop
/// sequences that are too short for a reliable alignment or longer than
/// the max the aligner accepts.
pub fn passes_length_filter(seq: &str, config: &SeqFilterConfig, is_prot: bool) -> bool {
    let len = seq.len();
    let min = if is_prot { config.min_prot_seq_len } else { config.min_seq_len };
    len >= min && len <= config.max_seq_len
}
