//! The chaining core: groups per-article alignments into chains by
//! genomic proximity, keeps only the heaviest-weighted chains per query
//! sequence, and folds the survivors into BED features.
//!
//! This is the algorithmic heart of the pipeline; every other stage is
//! bookkeeping around it.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::annot_id::{self, article_id_of};
use crate::bed::{sort_for_output, BedFeature};
use crate::config::{ChainConfig, DigitsConfig};
use crate::error::Result;
use crate::psl::{PslRecord, TargetName};

/// Alignments shorter than this are dropped by the global near-best
/// filter regardless of score, matching the original's minimum alignment
/// size of 19 matched bases.
pub const NEAR_BEST_MIN_ALIGN_SIZE: u64 = 19;

/// A chain: every PSL record chained together because they are on the
/// same db/chrom and within `maxDist` of each other.
pub type Chain = Vec<PslRecord>;

/// chainId -> qName -> psls still assigned to that chain.
type ChainMap = HashMap<String, HashMap<String, Vec<PslRecord>>>;

fn index_by_db_chrom(psls: Vec<PslRecord>) -> HashMap<(String, String), Vec<PslRecord>> {
    let mut out: HashMap<(String, String), Vec<PslRecord>> = HashMap::new();
    for psl in psls {
        let key = (psl.t_name.db.clone(), psl.t_name.chrom.clone());
        out.entry(key).or_default().push(psl);
    }
    out
}

/// Group alignments into chains: same db+chrom, within `maxDist` of the
/// previous member's `tEnd`. A query sequence that already has a chained
/// hit in the current chain is skipped unless it lands at the exact same
/// target span under a different sequence type (genome vs cDNA vs
/// protein), in which case both hits are kept.
pub fn chain_psls(psls: Vec<PslRecord>, config: &ChainConfig) -> ChainMap {
    debug!("chaining {} alignments", psls.len());
    let by_chrom = index_by_db_chrom(psls);

    let mut chains: HashMap<String, Chain> = HashMap::new();
    for ((db, chrom), mut chrom_psls) in by_chrom {
        if chrom.contains("_hap") {
            debug!("skipping haplotype chrom {chrom}");
            continue;
        }
        chrom_psls.sort_by_key(|p| p.t_start);
        let max_dist = config.max_dist_for(&db);

        let mut chain: Chain = Vec::new();
        let mut last_end: Option<u64> = None;
        let mut already_chained: HashMap<String, PslRecord> = HashMap::new();

        let mut flush = |chain: &mut Chain, chains: &mut HashMap<String, Chain>| {
            if let Some(first) = chain.first() {
                let base_id = format!("{},{}-{}", first.t_name.db, first.t_name.chrom, first.t_start);
                // Two chains can legitimately start at the same tStart (e.g.
                // duplicate hits at the same coordinate); keep chainIds
                // unique within this pass with a numeric suffix.
                let mut chain_id = base_id.clone();
                let mut suffix = 2;
                while chains.contains_key(&chain_id) {
                    chain_id = format!("{base_id}-{suffix}");
                    suffix += 1;
                }
                chains.insert(chain_id, std::mem::take(chain));
            }
        };

        for psl in chrom_psls {
            if let Some(prev) = already_chained.get(&psl.q_name) {
                let same_span = prev.t_start == psl.t_start
                    && prev.t_end == psl.t_end
                    && prev.block_sizes == psl.block_sizes;
                if same_span && prev.t_name != psl.t_name {
                    // same location, different sequence type: keep both
                } else {
                    debug!("query {} already chained here, skipping duplicate hit", psl.q_name);
                    continue;
                }
            }
            if let Some(end) = last_end {
                if psl.t_start.abs_diff(end) > max_dist {
                    flush(&mut chain, &mut chains);
                    already_chained.clear();
                }
            }
            last_end = Some(psl.t_end);
            already_chained.insert(psl.q_name.clone(), psl.clone());
            chain.push(psl);
        }
        flush(&mut chain, &mut chains);
    }

    let mut indexed: ChainMap = HashMap::new();
    for (chain_id, chain) in chains {
        let mut by_qname: HashMap<String, Vec<PslRecord>> = HashMap::new();
        for psl in chain {
            by_qname.entry(psl.q_name.clone()).or_default().push(psl);
        }
        indexed.insert(chain_id, by_qname);
    }
    indexed
}

fn best_chain_ids(scores: &HashMap<String, usize>) -> Vec<String> {
    let max_score = scores.values().copied().max().unwrap_or(0);
    scores
        .iter()
        .filter(|(_, &v)| v == max_score)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Resolve a query sequence that matched multiple chains down to the
/// chain(s) with the most member sequences, remove its members from
/// every other chain, and repeat until nothing is left. Returns
/// db -> list of chains (each chain a flat list of psls).
pub fn only_longest_chains(mut chains: ChainMap) -> HashMap<String, Vec<Chain>> {
    let mut best: HashMap<String, Vec<Chain>> = HashMap::new();

    while !chains.is_empty() {
        let scores: HashMap<String, usize> = chains.iter().map(|(id, m)| (id.clone(), m.len())).collect();
        let winners = best_chain_ids(&scores);
        let mut claimed_qnames: HashSet<String> = HashSet::new();

        for chain_id in &winners {
            let db = chain_id.split(',').next().unwrap_or("").to_string();
            if let Some(chain_dict) = chains.get(chain_id) {
                let flat: Chain = chain_dict.values().flatten().cloned().collect();
                for qname in chain_dict.keys() {
                    claimed_qnames.insert(qname.clone());
                }
                best.entry(db).or_default().push(flat);
            }
        }

        let mut next: ChainMap = HashMap::new();
        for (chain_id, chain_dict) in chains {
            let remaining: HashMap<String, Vec<PslRecord>> = chain_dict
                .into_iter()
                .filter(|(qname, _)| !claimed_qnames.contains(qname))
                .collect();
            if !remaining.is_empty() {
                next.insert(chain_id, remaining);
            }
        }
        chains = next;
    }
    best
}

/// Block-mask union of every psl's aligned blocks into one set of BED
/// blocks, mirroring a bit-per-base occupancy mask.
fn make_block_sizes(chain: &[PslRecord]) -> (Vec<u64>, Vec<u64>, u64) {
    let min_start = chain.iter().map(|p| p.t_start).min().unwrap_or(0);
    let max_end = chain.iter().map(|p| p.t_end).max().unwrap_or(0);
    let span = (max_end - min_start) as usize;
    let mut mask = vec![false; span];
    for psl in chain {
        for (&start, &size) in psl.t_starts.iter().zip(psl.block_sizes.iter()) {
            let offset = (start - min_start) as usize;
            for pos in offset..offset + size as usize {
                mask[pos] = true;
            }
        }
    }

    let mut block_starts = Vec::new();
    let mut block_sizes = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, &occupied) in mask.iter().enumerate() {
        match (occupied, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                block_starts.push(s as u64);
                block_sizes.push((i - s) as u64);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        block_starts.push(s as u64);
        block_sizes.push((mask.len() - s) as u64);
    }
    let covered = mask.iter().filter(|&&b| b).count() as u64;
    (block_starts, block_sizes, covered)
}

/// Fold a chain into one BED feature, or `None` if its covered bases
/// don't reach `minChainCoverage`.
pub fn psl_list_to_bedx(chain: &[PslRecord], min_cover: u64) -> Option<BedFeature> {
    if chain.is_empty() {
        return None;
    }
    let (block_starts, block_sizes, covered) = make_block_sizes(chain);
    if covered < min_cover {
        debug!("chain not long enough ({covered} < {min_cover}), skipping");
        return None;
    }

    let min_start = chain.iter().map(|p| p.t_start).min().unwrap();
    let max_end = chain.iter().map(|p| p.t_end).max().unwrap();
    let chrom = chain[0].t_name.chrom.clone();
    let mut seq_types: Vec<String> = chain.iter().map(|p| p.t_name.seq_type.clone()).collect();
    seq_types.sort();
    seq_types.dedup();

    let names: Vec<String> = chain
        .iter()
        .map(|p| format!("{}:{}-{}", p.q_name, p.q_start, p.q_end))
        .collect();

    Some(BedFeature {
        chrom,
        chrom_start: min_start,
        chrom_end: max_end,
        name: names.join(","),
        score: covered.min(u32::MAX as u64) as u32,
        strand: '+',
        thick_start: min_start,
        thick_end: max_end,
        item_rgb: "128,128,128".to_string(),
        block_sizes,
        block_starts,
        extra: vec![seq_types.join(",")],
    })
}

/// Convert every db's longest chains into BED features, dropping chains
/// that don't meet the coverage floor or exceed `maxChainLength`.
/// Returns `None` (skip the whole article) if any db ends up with more
/// than `maxFeatures` surviving chains.
pub fn chains_to_beds(
    chains: HashMap<String, Vec<Chain>>,
    config: &ChainConfig,
) -> Option<HashMap<String, (Vec<BedFeature>, Vec<PslRecord>)>> {
    let mut db_beds = HashMap::new();
    for (db, db_chains) in chains {
        debug!("converting {} chains on db {db} to bed", db_chains.len());
        let mut bed_list = Vec::new();
        let mut db_psls = Vec::new();
        for chain in db_chains {
            let Some(bedx) = psl_list_to_bedx(&chain, config.min_chain_coverage) else {
                continue;
            };
            if bedx.span() > config.max_chain_length {
                debug!("chain on {db} spans {} bases, over the {} limit", bedx.span(), config.max_chain_length);
                continue;
            }
            db_psls.extend(chain);
            bed_list.push(bedx);
        }
        if bed_list.is_empty() {
            continue;
        }
        if bed_list.len() > config.max_features {
            warn!("too many features on db {db} ({} > {}), skipping article", bed_list.len(), config.max_features);
            return None;
        }
        db_beds.insert(db, (bed_list, db_psls));
    }
    Some(db_beds)
}

/// Remove exact-duplicate hits produced by aligning the same sequence
/// against genome and cDNA/protein copies of a region, merging their
/// sequence types into one record's target name.
pub fn fuse_overlapping_psls(psls: Vec<PslRecord>) -> Vec<PslRecord> {
    let mut merged: HashMap<(u64, u64, u64, u64, String, String, u64, u64, u64, String, u64, u64, Vec<u64>), (PslRecord, HashSet<String>)> =
        HashMap::new();
    for psl in psls {
        let key = (
            psl.matches,
            psl.mismatches,
            psl.rep_matches,
            psl.n_count,
            psl.strand.clone(),
            psl.q_name.clone(),
            psl.q_size,
            psl.q_start,
            psl.q_end,
            psl.t_name.db.clone(),
            psl.t_start,
            psl.t_end,
            psl.block_sizes.clone(),
        );
        let entry = merged.entry(key).or_insert_with(|| (psl.clone(), HashSet::new()));
        entry.1.insert(psl.t_name.seq_type.clone());
    }
    merged
        .into_values()
        .map(|(mut psl, seq_types)| {
            let mut types: Vec<String> = seq_types.into_iter().collect();
            types.sort();
            psl.t_name = TargetName {
                db: psl.t_name.db.clone(),
                chrom: psl.t_name.chrom.clone(),
                seq_type: types.join(","),
            };
            psl
        })
        .collect()
}

/// Global merge + near-best filter, applied once across every per-db
/// sorted alignment file before re-splitting by article chunk: keep only
/// alignments tied for the best match count per query, discarding any
/// below `min_align_size`.
pub fn near_best_filter(psls: Vec<PslRecord>, min_align_size: u64) -> Vec<PslRecord> {
    let mut by_query: HashMap<String, Vec<PslRecord>> = HashMap::new();
    for psl in psls {
        if psl.matches < min_align_size {
            continue;
        }
        by_query.entry(psl.q_name.clone()).or_default().push(psl);
    }
    let mut out = Vec::new();
    for group in by_query.into_values() {
        let best = group.iter().map(|p| p.matches).max().unwrap_or(0);
        out.extend(group.into_iter().filter(|p| p.matches == best));
    }
    out
}

/// Recover the article a query name's annotId belongs to, tolerating a
/// trailing `:start-end` range suffix. Query names that don't parse as an
/// annotId are dropped with a warning rather than aborting the pass.
fn article_id_of_qname(q_name: &str, digits: &DigitsConfig) -> Option<u64> {
    let bare = q_name.split(':').next().unwrap_or(q_name);
    match annot_id::parse(bare) {
        Ok(id) => Some(article_id_of(id, digits)),
        Err(e) => {
            warn!("query name {q_name:?} is not a parseable annotId: {e}");
            None
        }
    }
}

/// Group alignments by the article their query name belongs to.
pub fn group_by_article(psls: Vec<PslRecord>, digits: &DigitsConfig) -> HashMap<u64, Vec<PslRecord>> {
    let mut out: HashMap<u64, Vec<PslRecord>> = HashMap::new();
    for psl in psls {
        if let Some(article_id) = article_id_of_qname(&psl.q_name, digits) {
            out.entry(article_id).or_default().push(psl);
        }
    }
    out
}

/// Deterministic chunk assignment for an article. The original looks up a
/// chunk id recorded by the text-mining layer; this crate has no such
/// mapping available, so it always falls back to the documented formula.
pub fn chunk_id_for(article_id: u64, config: &ChainConfig) -> u64 {
    article_id / config.chunk_article_count.max(1)
}

/// Re-split the near-best-filtered alignments by chunk id, dropping any
/// article whose alignment count meets or exceeds `maxDbMatchCount`
/// (it has matched too promiscuously to be worth chaining).
pub fn split_by_chunk(psls: Vec<PslRecord>, config: &ChainConfig, digits: &DigitsConfig) -> HashMap<u64, Vec<PslRecord>> {
    let mut by_chunk: HashMap<u64, Vec<PslRecord>> = HashMap::new();
    for (article_id, article_psls) in group_by_article(psls, digits) {
        if article_psls.len() >= config.max_db_match_count {
            warn!(
                "article {article_id} has {} alignments, at or over maxDbMatchCount {}, dropping",
                article_psls.len(),
                config.max_db_match_count
            );
            continue;
        }
        let chunk_id = chunk_id_for(article_id, config);
        by_chunk.entry(chunk_id).or_default().extend(article_psls);
    }
    by_chunk
}

/// The full per-article pipeline: chain, keep the heaviest chains, fold
/// into BED features. `None` means the article had too many features on
/// some db and was skipped entirely.
pub fn chain_article(psls: Vec<PslRecord>, config: &ChainConfig) -> Option<HashMap<String, (Vec<BedFeature>, Vec<PslRecord>)>> {
    let chained = chain_psls(psls, config);
    let longest = only_longest_chains(chained);
    chains_to_beds(longest, config)
}

/// The full per-chunk pipeline: group a chunk's alignments by article and
/// chain each article independently, merging the survivors per db. An
/// article dropped for exceeding `maxFeatures` on some db does not affect
/// any other article in the same chunk.
pub fn chain_chunk(psls: Vec<PslRecord>, config: &ChainConfig, digits: &DigitsConfig) -> HashMap<String, (Vec<BedFeature>, Vec<PslRecord>)> {
    let mut merged: HashMap<String, (Vec<BedFeature>, Vec<PslRecord>)> = HashMap::new();
    for (article_id, article_psls) in group_by_article(psls, digits) {
        let Some(db_beds) = chain_article(article_psls, config) else {
            debug!("article {article_id} skipped, too many features on some db");
            continue;
        };
        for (db, (beds, db_psls)) in db_beds {
            let entry = merged.entry(db).or_insert_with(|| (Vec::new(), Vec::new()));
            entry.0.extend(beds);
            entry.1.extend(db_psls);
        }
    }
    merged
}

/// Write one `<chunk>.<db>.bed` and `<chunk>.<db>.psl` file per db with
/// surviving chains. If the article produced no chains at all (either
/// nothing passed coverage/length filtering, or it was skipped for having
/// too many features on some db), a zero-byte sentinel is written at
/// `<chunk>.<firstDb>.bed` so a cluster scheduler's output-existence
/// check still succeeds for this chunk.
pub fn write_chain_outputs(
    out_dir: &Path,
    chunk_name: &str,
    configured_dbs: &[String],
    db_beds: Option<&HashMap<String, (Vec<BedFeature>, Vec<PslRecord>)>>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    let db_beds = match db_beds {
        Some(m) if !m.is_empty() => m,
        _ => {
            let first_db = configured_dbs.first().map(String::as_str).unwrap_or("unknown");
            let sentinel = out_dir.join(format!("{chunk_name}.{first_db}.bed"));
            info!("no chains produced for {chunk_name}, writing sentinel {}", sentinel.display());
            fs::write(&sentinel, b"")?;
            return Ok(vec![sentinel]);
        }
    };

    for (db, (bed_list, psls)) in db_beds {
        let mut bed_list = bed_list.clone();
        sort_for_output(&mut bed_list);
        let bed_path = out_dir.join(format!("{chunk_name}.{db}.bed"));
        let bed_text: String = bed_list.iter().map(|b| b.to_line() + "\n").collect();
        fs::write(&bed_path, bed_text)?;
        written.push(bed_path);

        let psl_path = out_dir.join(format!("{chunk_name}.{db}.psl"));
        let fused = fuse_overlapping_psls(psls.clone());
        let psl_text: String = fused.iter().map(|p| p.to_line() + "\n").collect();
        fs::write(&psl_path, psl_text)?;
        written.push(psl_path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psl(q_name: &str, db: &str, chrom: &str, seq_type: &str, t_start: u64, t_end: u64) -> PslRecord {
        let size = t_end - t_start;
        PslRecord {
            matches: size,
            mismatches: 0,
            rep_matches: 0,
            n_count: 0,
            q_num_insert: 0,
            q_base_insert: 0,
            t_num_insert: 0,
            t_base_insert: 0,
            strand: "+".to_string(),
            q_name: q_name.to_string(),
            q_size: size,
            q_start: 0,
            q_end: size,
            t_name: TargetName {
                db: db.to_string(),
                chrom: chrom.to_string(),
                seq_type: seq_type.to_string(),
            },
            t_size: 1_000_000,
            t_start,
            t_end,
            block_sizes: vec![size],
            q_starts: vec![0],
            t_starts: vec![t_start],
        }
    }

    fn config() -> ChainConfig {
        let mut max_dist = HashMap::new();
        max_dist.insert("default".to_string(), 1000u64);
        ChainConfig {
            max_dist,
            min_chain_coverage: 20,
            max_chain_length: 2_000_000,
            max_features: 10,
            max_db_match_count: 50,
            chunk_article_count: 2000,
            chunk_divider: 5000,
        }
    }

    #[test]
    fn nearby_hits_on_same_chrom_chain_together() {
        let psls = vec![
            psl("s1", "hg19", "chr1", "genome", 1000, 1100),
            psl("s2", "hg19", "chr1", "genome", 1150, 1250),
        ];
        let chains = chain_psls(psls, &config());
        assert_eq!(chains.len(), 1);
        let chain = chains.values().next().unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn distant_hits_split_into_separate_chains() {
        let psls = vec![
            psl("s1", "hg19", "chr1", "genome", 1000, 1100),
            psl("s2", "hg19", "chr1", "genome", 50_000, 50_100),
        ];
        let chains = chain_psls(psls, &config());
        assert_eq!(chains.len(), 2);
    }

    #[test]
    fn haplotype_chroms_are_skipped() {
        let psls = vec![psl("s1", "hg19", "chr1_hap1", "genome", 1000, 1100)];
        let chains = chain_psls(psls, &config());
        assert!(chains.is_empty());
    }

    #[test]
    fn only_longest_chains_picks_heaviest_weight() {
        let mut c1_members = HashMap::new();
        c1_members.insert("s1".to_string(), vec![psl("s1", "hg19", "chr1", "genome", 1000, 1100)]);
        let mut c2_members = HashMap::new();
        c2_members.insert("s1".to_string(), vec![psl("s1", "hg19", "chr2", "genome", 1000, 1100)]);
        c2_members.insert("s2".to_string(), vec![psl("s2", "hg19", "chr2", "genome", 1150, 1250)]);

        let mut chains = ChainMap::new();
        chains.insert("hg19,chr1-1000".to_string(), c1_members);
        chains.insert("hg19,chr2-1000".to_string(), c2_members);

        let best = only_longest_chains(chains);
        let hg19_chains = &best["hg19"];
        assert_eq!(hg19_chains.len(), 1);
        assert_eq!(hg19_chains[0].len(), 2);
    }

    #[test]
    fn make_block_sizes_unions_overlapping_blocks() {
        let chain = vec![
            psl("s1", "hg19", "chr1", "genome", 1000, 1100),
            psl("s2", "hg19", "chr1", "genome", 1050, 1200),
        ];
        let (_, _, covered) = make_block_sizes(&chain);
        assert_eq!(covered, 200);
    }

    #[test]
    fn bedx_rejects_chain_below_min_coverage() {
        let chain = vec![psl("s1", "hg19", "chr1", "genome", 1000, 1010)];
        assert!(psl_list_to_bedx(&chain, 20).is_none());
    }

    #[test]
    fn bedx_accepts_chain_meeting_min_coverage() {
        let chain = vec![psl("s1", "hg19", "chr1", "genome", 1000, 1100)];
        let bedx = psl_list_to_bedx(&chain, 20).unwrap();
        assert_eq!(bedx.chrom, "chr1");
        assert_eq!(bedx.chrom_start, 1000);
        assert_eq!(bedx.chrom_end, 1100);
    }

    #[test]
    fn chains_to_beds_skips_article_when_over_max_features() {
        let mut db_chains = Vec::new();
        for i in 0..3u64 {
            db_chains.push(vec![psl("s", "hg19", "chr1", "genome", 1000 + i * 10_000, 1100 + i * 10_000)]);
        }
        let mut chains = HashMap::new();
        chains.insert("hg19".to_string(), db_chains);
        let mut cfg = config();
        cfg.max_features = 2;
        assert!(chains_to_beds(chains, &cfg).is_none());
    }

    #[test]
    fn fuse_overlapping_merges_seq_types() {
        let psls = vec![
            psl("s1", "hg19", "chr1", "genome", 1000, 1100),
            psl("s1", "hg19", "chr1", "cdna", 1000, 1100),
        ];
        let fused = fuse_overlapping_psls(psls);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].t_name.seq_type, "cdna,genome");
    }

    #[test]
    fn write_chain_outputs_writes_sentinel_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let configured = vec!["hg19".to_string()];
        let written = write_chain_outputs(dir.path(), "chunk0", &configured, None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], dir.path().join("chunk0.hg19.bed"));
        assert_eq!(fs::metadata(&written[0]).unwrap().len(), 0);
    }

    fn digits() -> DigitsConfig {
        DigitsConfig {
            article_digits: 10,
            file_digits: 3,
            annot_digits: 5,
        }
    }

    #[test]
    fn near_best_filter_keeps_only_ties_for_best_per_query() {
        let mut weak = psl("s1", "hg19", "chr1", "genome", 1000, 1050);
        weak.matches = 30;
        let mut strong = psl("s1", "hg19", "chr2", "genome", 2000, 2100);
        strong.matches = 90;
        let mut tied = psl("s1", "hg19", "chr3", "genome", 3000, 3100);
        tied.matches = 90;
        let filtered = near_best_filter(vec![weak, strong, tied], NEAR_BEST_MIN_ALIGN_SIZE);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|p| p.matches == 90));
    }

    #[test]
    fn near_best_filter_drops_alignments_below_min_size() {
        let mut tiny = psl("s1", "hg19", "chr1", "genome", 1000, 1010);
        tiny.matches = 10;
        let filtered = near_best_filter(vec![tiny], NEAR_BEST_MIN_ALIGN_SIZE);
        assert!(filtered.is_empty());
    }

    #[test]
    fn group_by_article_splits_on_leading_article_digits() {
        let d = digits();
        let psls = vec![
            psl("44000203950000012", "hg19", "chr1", "genome", 1000, 1100),
            psl("44000203950000013", "hg19", "chr2", "genome", 2000, 2100),
            psl("54000203950000012", "hg19", "chr3", "genome", 3000, 3100),
        ];
        let grouped = group_by_article(psls, &d);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&440002039].len(), 2);
        assert_eq!(grouped[&540002039].len(), 1);
    }

    #[test]
    fn group_by_article_drops_unparseable_query_names() {
        let d = digits();
        let psls = vec![psl("not-a-number", "hg19", "chr1", "genome", 1000, 1100)];
        assert!(group_by_article(psls, &d).is_empty());
    }

    #[test]
    fn split_by_chunk_drops_articles_at_or_over_max_db_match_count() {
        let d = digits();
        let mut cfg = config();
        cfg.max_db_match_count = 2;
        cfg.chunk_article_count = 1_000_000_000;
        let psls = vec![
            psl("1000000001", "hg19", "chr1", "genome", 1000, 1100),
            psl("1000000001", "hg19", "chr2", "genome", 2000, 2100),
            psl("2000000001", "hg19", "chr3", "genome", 3000, 3100),
        ];
        let by_chunk = split_by_chunk(psls, &cfg, &d);
        let all: Vec<_> = by_chunk.values().flatten().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].q_name, "2000000001");
    }

    #[test]
    fn chain_chunk_keeps_articles_independent() {
        let d = digits();
        let mut cfg = config();
        cfg.max_features = 1;
        // Article 1 produces two chains on hg19 (over max_features, dropped);
        // article 2 produces one chain and should survive untouched.
        let psls = vec![
            psl("1000000001", "hg19", "chr1", "genome", 1000, 1100),
            psl("1000000002", "hg19", "chr2", "genome", 50_000, 50_100),
            psl("2000000001", "hg19", "chr3", "genome", 1000, 1100),
        ];
        let merged = chain_chunk(psls, &cfg, &d);
        let (beds, _) = &merged["hg19"];
        assert_eq!(beds.len(), 1);
        assert!(beds[0].name.starts_with("2000000001"));
    }

    #[test]
    fn write_chain_outputs_writes_bed_and_psl_per_db() {
        let dir = tempfile::tempdir().unwrap();
        let psls = vec![psl("s1", "hg19", "chr1", "genome", 1000, 1100)];
        let bedx = psl_list_to_bedx(&psls, 20).unwrap();
        let mut db_beds = HashMap::new();
        db_beds.insert("hg19".to_string(), (vec![bedx], psls));
        let configured = vec!["hg19".to_string()];
        let written = write_chain_outputs(dir.path(), "chunk0", &configured, Some(&db_beds)).unwrap();
        assert_eq!(written.len(), 2);
        let bed_text = fs::read_to_string(dir.path().join("chunk0.hg19.bed")).unwrap();
        assert!(bed_text.starts_with("chr1\t1000\t1100"));
    }
}
