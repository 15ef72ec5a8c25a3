//! BedX: standard 12-column BED plus the pipeline's extended columns
//! (annotId list, sequence type, per-block identity) that later feed the
//! marker and sequence tables.

use std::fmt;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BedFeature {
    pub chrom: String,
    pub chrom_start: u64,
    pub chrom_end: u64,
    pub name: String,
    pub score: u32,
    pub strand: char,
    pub thick_start: u64,
    pub thick_end: u64,
    pub item_rgb: String,
    pub block_sizes: Vec<u64>,
    pub block_starts: Vec<u64>,
    /// Extended fields beyond the core 12, carried through verbatim.
    pub extra: Vec<String>,
}

impl BedFeature {
    pub fn block_count(&self) -> usize {
        self.block_sizes.len()
    }

    /// Total bases covered by this feature's blocks (not the span, which
    /// may include introns between blocks).
    pub fn covered_bases(&self) -> u64 {
        self.block_sizes.iter().sum()
    }

    pub fn span(&self) -> u64 {
        self.chrom_end.saturating_sub(self.chrom_start)
    }

    pub fn to_line(&self) -> String {
        let join = |v: &[u64]| -> String { v.iter().map(|n| format!("{n},")).collect::<String>() };
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.chrom_start,
            self.chrom_end,
            self.name,
            self.score,
            self.strand,
            self.thick_start,
            self.thick_end,
            self.item_rgb,
            self.block_count(),
            join(&self.block_sizes),
            join(&self.block_starts),
        );
        for field in &self.extra {
            line.push('\t');
            line.push_str(field);
        }
        line
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
        if cols.len() < 12 {
            return Err(PipelineError::data(
                "bed::parse_line",
                format!("expected at least 12 BED columns, got {}", cols.len()),
            ));
        }
        let num = |i: usize, field: &str| -> Result<u64> {
            cols[i]
                .parse::<u64>()
                .map_err(|e| PipelineError::data("bed::parse_line", format!("{field} not numeric: {e}")))
        };
        let nums = |s: &str| -> Result<Vec<u64>> {
            s.trim_end_matches(',')
                .split(',')
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.parse::<u64>()
                        .map_err(|e| PipelineError::data("bed::parse_line", format!("bad block entry {p:?}: {e}")))
                })
                .collect()
        };
        let strand = cols[5].chars().next().ok_or_else(|| {
            PipelineError::data("bed::parse_line", "empty strand column".to_string())
        })?;
        Ok(BedFeature {
            chrom: cols[0].to_string(),
            chrom_start: num(1, "chromStart")?,
            chrom_end: num(2, "chromEnd")?,
            name: cols[3].to_string(),
            score: cols[4]
                .parse::<u32>()
                .map_err(|e| PipelineError::data("bed::parse_line", format!("score not numeric: {e}")))?,
            strand,
            thick_start: num(6, "thickStart")?,
            thick_end: num(7, "thickEnd")?,
            item_rgb: cols[8].to_string(),
            block_sizes: nums(cols[10])?,
            block_starts: nums(cols[11])?,
            extra: cols[12..].iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl fmt::Display for BedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Sort features for BED file output: chrom ascending, then chromStart
/// ascending, matching what the table loader expects on disk.
pub fn sort_for_output(features: &mut [BedFeature]) {
    features.sort_by(|a, b| a.chrom.cmp(&b.chrom).then(a.chrom_start.cmp(&b.chrom_start)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BedFeature {
        BedFeature {
            chrom: "chr1".to_string(),
            chrom_start: 1000,
            chrom_end: 1200,
            name: "44000203950000012".to_string(),
            score: 950,
            strand: '+',
            thick_start: 1000,
            thick_end: 1200,
            item_rgb: "0".to_string(),
            block_sizes: vec![100, 50],
            block_starts: vec![0, 150],
            extra: vec!["genome".to_string()],
        }
    }

    #[test]
    fn round_trips_through_line_format() {
        let feat = sample();
        let line = feat.to_line();
        let parsed = BedFeature::parse_line(&line).unwrap();
        assert_eq!(parsed, feat);
    }

    #[test]
    fn covered_bases_excludes_introns() {
        let feat = sample();
        assert_eq!(feat.covered_bases(), 150);
        assert_eq!(feat.span(), 200);
    }

    #[test]
    fn sort_orders_by_chrom_then_start() {
        let mut a = sample();
        a.chrom_start = 5000;
        let mut b = sample();
        b.chrom_start = 1000;
        let mut features = vec![a.clone(), b.clone()];
        sort_for_output(&mut features);
        assert_eq!(features[0].chrom_start, 1000);
        assert_eq!(features[1].chrom_start, 5000);
    }
}
