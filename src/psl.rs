//! The PSL alignment record: the wire format produced by the aligner and
//! consumed by every downstream stage (sort/lift, chaining, table
//! building). Target names carry a `db,chrom,seqType` triple instead of a
//! bare chromosome name so a chain can be attributed back to the genome
//! and sequence type it was aligned against.

use std::fmt;

use crate::error::{PipelineError, Result};

/// `db,chrom,seqType` packed into PSL's `tName` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetName {
    pub db: String,
    pub chrom: String,
    pub seq_type: String,
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.db, self.chrom, self.seq_type)
    }
}

impl TargetName {
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(db), Some(chrom), Some(seq_type)) => Ok(TargetName {
                db: db.to_string(),
                chrom: chrom.to_string(),
                seq_type: seq_type.to_string(),
            }),
            _ => Err(PipelineError::data(
                "psl::TargetName::parse",
                format!("{s:?} is not a db,chrom,seqType triple"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PslRecord {
    pub matches: u64,
    pub mismatches: u64,
    pub rep_matches: u64,
    pub n_count: u64,
    pub q_num_insert: u64,
    pub q_base_insert: u64,
    pub t_num_insert: u64,
    pub t_base_insert: u64,
    pub strand: String,
    pub q_name: String,
    pub q_size: u64,
    pub q_start: u64,
    pub q_end: u64,
    pub t_name: TargetName,
    pub t_size: u64,
    pub t_start: u64,
    pub t_end: u64,
    pub block_sizes: Vec<u64>,
    pub q_starts: Vec<u64>,
    pub t_starts: Vec<u64>,
}

impl PslRecord {
    pub fn block_count(&self) -> usize {
        self.block_sizes.len()
    }

    pub fn q_coverage(&self) -> u64 {
        self.matches + self.mismatches + self.rep_matches
    }

    /// `tStart..tEnd`, the span this alignment occupies on the target.
    pub fn t_span(&self) -> (u64, u64) {
        (self.t_start, self.t_end)
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if cols.len() < 21 {
            return Err(PipelineError::data(
                "psl::parse_line",
                format!("expected 21 PSL columns, got {}", cols.len()),
            ));
        }
        let field = |i: usize| -> Result<&str> {
            cols.get(i).copied().ok_or_else(|| {
                PipelineError::data("psl::parse_line", format!("missing column {i}"))
            })
        };
        let num = |i: usize| -> Result<u64> {
            field(i)?.parse::<u64>().map_err(|e| {
                PipelineError::data("psl::parse_line", format!("column {i} not numeric: {e}"))
            })
        };
        let nums = |s: &str| -> Result<Vec<u64>> {
            s.trim_end_matches(',')
                .split(',')
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.parse::<u64>().map_err(|e| {
                        PipelineError::data("psl::parse_line", format!("bad block list entry {p:?}: {e}"))
                    })
                })
                .collect()
        };

        Ok(PslRecord {
            matches: num(0)?,
            mismatches: num(1)?,
            rep_matches: num(2)?,
            n_count: num(3)?,
            q_num_insert: num(4)?,
            q_base_insert: num(5)?,
            t_num_insert: num(6)?,
            t_base_insert: num(7)?,
            strand: field(8)?.to_string(),
            q_name: field(9)?.to_string(),
            q_size: num(10)?,
            q_start: num(11)?,
            q_end: num(12)?,
            t_name: TargetName::parse(field(13)?)?,
            t_size: num(14)?,
            t_start: num(15)?,
            t_end: num(16)?,
            block_sizes: nums(field(18)?)?,
            q_starts: nums(field(19)?)?,
            t_starts: nums(field(20)?)?,
        })
    }

    pub fn to_line(&self) -> String {
        let join = |v: &[u64]| -> String {
            let mut s: String = v.iter().map(|n| format!("{n},")).collect();
            if s.is_empty() {
                s.push(',');
            }
            s
        };
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.matches,
            self.mismatches,
            self.rep_matches,
            self.n_count,
            self.q_num_insert,
            self.q_base_insert,
            self.t_num_insert,
            self.t_base_insert,
            self.strand,
            self.q_name,
            self.q_size,
            self.q_start,
            self.q_end,
            self.t_name,
            self.t_size,
            self.t_start,
            self.t_end,
            self.block_count(),
            join(&self.block_sizes),
            join(&self.q_starts),
            join(&self.t_starts),
        )
    }
}

/// Read every well-formed PSL line from `text`; malformed lines are
/// skipped with a logged warning rather than aborting the whole read,
/// matching the row-level recovery policy for `PipelineError::Data`.
pub fn parse_all(text: &str) -> Vec<PslRecord> {
    text.lines()
        .filter(|l| !l.is_empty() && !l.starts_with(['p', '-'])) // skip PSL headers
        .filter_map(|line| match PslRecord::parse_line(line) {
            Ok(rec) => Some(rec),
            Err(e) => {
                log::warn!("skipping malformed PSL line: {e}");
                None
            }
        })
        .collect()
}
