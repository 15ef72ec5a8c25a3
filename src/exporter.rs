//! Exporter: side-channel dumps out of the annotation tables for
//! downstream consumers that don't want to talk to the genome browser
//! database — plain FASTA of every annotated sequence, and a filtered
//! CDR3 candidate export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};

use crate::annot_id::article_id_of;
use crate::config::DigitsConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AnnotRow {
    pub annot_id: u64,
    pub seq: String,
}

/// Write every row to one FASTA file. When `article_titles` is given,
/// the header carries `pmid|title|journal|year` alongside the annotId,
/// matching the external-identifier export mode.
pub fn export_fasta(
    rows: impl IntoIterator<Item = AnnotRow>,
    out_file: &Path,
    article_titles: Option<&std::collections::HashMap<u64, String>>,
    digits: &DigitsConfig,
) -> Result<usize> {
    let file = File::create(out_file)?;
    let mut out = BufWriter::new(file);
    let mut count = 0;
    for row in rows {
        match article_titles {
            Some(titles) => {
                let article_id = article_id_of(row.annot_id, digits);
                let label = titles.get(&article_id).cloned().unwrap_or_default();
                writeln!(out, ">{}|{}", row.annot_id, label)?;
            }
            None => writeln!(out, ">{}", row.annot_id)?,
        }
        writeln!(out, "{}", row.seq)?;
        count += 1;
    }
    info!("wrote {count} sequences to {}", out_file.display());
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct Cdr3Row {
    pub annot_id: u64,
    pub seq: String,
    pub raw_line: String,
    pub prefix_filter_accept: bool,
    pub suffix_filter_accept: bool,
    pub markov_filter_accept: bool,
}

impl Cdr3Row {
    fn passes(&self) -> bool {
        self.prefix_filter_accept && self.suffix_filter_accept && self.markov_filter_accept
    }
}

/// Filter rows down to those passing all three CDR3 heuristics and write
/// them both as a tab file (the original row, verbatim) and a FASTA file.
pub fn export_cdr3(
    rows: impl IntoIterator<Item = Cdr3Row>,
    out_tab: &Path,
    out_fa: &Path,
    header_line: &str,
) -> Result<usize> {
    let tab_file = File::create(out_tab)?;
    let mut tab_out = BufWriter::new(tab_file);
    writeln!(tab_out, "{header_line}")?;
    let fa_file = File::create(out_fa)?;
    let mut fa_out = BufWriter::new(fa_file);

    let mut count = 0;
    for row in rows {
        if !row.passes() {
            debug!("annotId {} rejected by CDR3 filters", row.annot_id);
            continue;
        }
        writeln!(tab_out, "{}", row.raw_line)?;
        writeln!(fa_out, ">{}", row.annot_id)?;
        writeln!(fa_out, "{}", row.seq)?;
        count += 1;
    }
    info!("exported {count} CDR3 candidates to {} and {}", out_tab.display(), out_fa.display());
    Ok(count)
}
