//! AnnotId composite integer encoding: `articleId * 10^(F+A) + fileId *
//! 10^A + localAnnot`, where `F = fileDigits`, `A = annotDigits`.
//!
//! The inverse (split into article/file/local) is load-bearing: it is used
//! by the filter, chain, and table-building stages to recover the article
//! an alignment or annotation belongs to. All arithmetic is `u64`; config
//! loading rejects digit totals that would not fit (see `config::validate`).

use crate::config::DigitsConfig;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotIdParts {
    pub article_id: u64,
    pub file_id: u64,
    pub local_id: u64,
}

fn pow10(n: u32) -> u64 {
    10u64.pow(n)
}

/// Split an annotId into (articleId, fileId, localId).
pub fn split(annot_id: u64, digits: &DigitsConfig) -> AnnotIdParts {
    let annot_div = pow10(digits.annot_digits);
    let file_div = pow10(digits.file_digits);
    let local_id = annot_id % annot_div;
    let rest = annot_id / annot_div;
    let file_id = rest % file_div;
    let article_id = rest / file_div;
    AnnotIdParts {
        article_id,
        file_id,
        local_id,
    }
}

/// Recompose an annotId from its parts, validating the width invariants
/// (`localAnnot < 10^A`, `fileId < 10^F`).
pub fn compose(parts: AnnotIdParts, digits: &DigitsConfig) -> Result<u64> {
    let annot_div = pow10(digits.annot_digits);
    let file_div = pow10(digits.file_digits);
    if parts.local_id >= annot_div {
        return Err(PipelineError::data(
            "annot_id::compose",
            format!("localId {} does not fit in {} digits", parts.local_id, digits.annot_digits),
        ));
    }
    if parts.file_id >= file_div {
        return Err(PipelineError::data(
            "annot_id::compose",
            format!("fileId {} does not fit in {} digits", parts.file_id, digits.file_digits),
        ));
    }
    Ok(parts.article_id * file_div * annot_div + parts.file_id * annot_div + parts.local_id)
}

/// `articleId` alone, the common case for grouping annotations/alignments
/// by article without needing file/local ids.
pub fn article_id_of(annot_id: u64, digits: &DigitsConfig) -> u64 {
    let divider = pow10(digits.file_digits + digits.annot_digits);
    annot_id / divider
}

/// Parse an annotId from its decimal query-name representation, returning
/// `PipelineError::Data` rather than aborting the stage (malformed query
/// names must not sink a whole chaining pass, per the error policy).
pub fn parse(s: &str) -> Result<u64> {
    s.trim().parse::<u64>().map_err(|e| {
        PipelineError::data("annot_id::parse", format!("{s:?} is not a valid annotId: {e}"))
    })
}
