//! TableBuilder: folds chained BED features and annotated sequences, plus
//! per-article metadata, into the flat tab files the `Loader` hands to
//! the genome browser database.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::annot_id::split;
use crate::bed::BedFeature;
use crate::config::DigitsConfig;
use crate::error::Result;

/// One record from an annotated-sequence tab file.
#[derive(Debug, Clone)]
pub struct SeqAnnotRow {
    pub annot_id: u64,
    pub seq: String,
    pub snippet: String,
}

fn constructed_article_file_id(article_id: u64, file_id: u64) -> u64 {
    article_id * 10_000 + file_id
}

/// Parse `files.tab` (`articleId\tfileId\tdesc\turl` per row) into
/// `constructed_article_file_id -> (desc, url)`. Malformed rows are
/// logged and skipped rather than aborting the whole file.
pub fn read_file_descs(path: &Path) -> Result<HashMap<u64, (String, String)>> {
    let mut out = HashMap::new();
    if !path.is_file() {
        return Ok(out);
    }
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 4 {
            warn!("skipping malformed files.tab row: {line:?}");
            continue;
        }
        let (Ok(article_id), Ok(file_id)) = (cols[0].parse::<u64>(), cols[1].parse::<u64>()) else {
            warn!("skipping files.tab row with unparseable ids: {line:?}");
            continue;
        };
        out.insert(constructed_article_file_id(article_id, file_id), (cols[2].to_string(), cols[3].to_string()));
    }
    Ok(out)
}

/// Parse `articles.tab` into `ArticleMeta` records. Column order mirrors
/// `ArticleMeta`'s field order after `article_id`. Malformed rows are
/// logged and skipped.
pub fn read_article_meta(path: &Path) -> Result<Vec<ArticleMeta>> {
    let mut out = Vec::new();
    if !path.is_file() {
        return Ok(out);
    }
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 15 {
            warn!("skipping malformed articles.tab row: {line:?}");
            continue;
        }
        let Ok(article_id) = cols[0].parse::<u64>() else {
            warn!("skipping articles.tab row with unparseable articleId: {line:?}");
            continue;
        };
        out.push(ArticleMeta {
            article_id,
            external_id: cols[1].to_string(),
            pmid: cols[2].to_string(),
            doi: cols[3].to_string(),
            source: cols[4].to_string(),
            publisher: cols[5].to_string(),
            journal: cols[6].to_string(),
            eissn: cols[7].to_string(),
            print_issn: cols[8].to_string(),
            vol: cols[9].to_string(),
            issue: cols[10].to_string(),
            page: cols[11].to_string(),
            year: sanitize_year(cols[12]),
            first_author_field: cols[13].to_string(),
            title: cols[14].to_string(),
        });
    }
    Ok(out)
}

/// Parse a two-column `issn\timpact` file into issn -> rounded impact
/// factor.
pub fn read_impact_factors(path: &Path) -> Result<HashMap<String, u32>> {
    let mut out = HashMap::new();
    if !path.is_file() {
        return Ok(out);
    }
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let mut cols = line.splitn(2, '\t');
        let (Some(issn), Some(impact_str)) = (cols.next(), cols.next()) else {
            warn!("skipping malformed impact factor row: {line:?}");
            continue;
        };
        let impact_str = impact_str.trim();
        if impact_str.is_empty() {
            continue;
        }
        match impact_str.parse::<f64>() {
            Ok(impact) => {
                out.insert(issn.to_string(), impact.round() as u32);
            }
            Err(_) => warn!("skipping impact factor row with unparseable impact: {line:?}"),
        }
    }
    Ok(out)
}

/// Parse an `articleId\tclass,class,...` file into articleId -> classes
/// joined back into one comma-separated string.
pub fn read_article_classes(path: &Path) -> Result<HashMap<u64, String>> {
    let mut out = HashMap::new();
    if !path.is_file() {
        return Ok(out);
    }
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let mut cols = line.splitn(2, '\t');
        let (Some(article_id_str), Some(classes)) = (cols.next(), cols.next()) else {
            warn!("skipping malformed article class row: {line:?}");
            continue;
        };
        let Ok(article_id) = article_id_str.parse::<u64>() else {
            warn!("skipping article class row with unparseable articleId: {line:?}");
            continue;
        };
        out.insert(article_id, classes.trim().to_string());
    }
    Ok(out)
}

/// Write `hgFixed.sequenceAnnot.tab`: one row per annotated sequence
/// belonging to an article that did end up mapped to at least one db.
/// Returns the set of articles that had at least one written sequence.
pub fn write_seq_tables(
    article_dbs: &HashMap<u64, Vec<String>>,
    rows: impl IntoIterator<Item = SeqAnnotRow>,
    file_descs: &HashMap<u64, (String, String)>,
    annot_links: &HashMap<u64, Vec<String>>,
    digits: &DigitsConfig,
    out_file: &Path,
) -> Result<HashSet<u64>> {
    info!("formatting sequence tables to genome browser format");
    let file = File::create(out_file)?;
    let mut out = BufWriter::new(file);

    let mut articles_with_seqs = HashSet::new();
    let mut in_rows = 0usize;
    let mut out_rows = 0usize;
    let mut no_desc_count = 0usize;

    for row in rows {
        let parts = split(row.annot_id, digits);
        let Some(dbs) = article_dbs.get(&parts.article_id) else {
            debug!("article {} is not mapped to any genome, not writing any sequence", parts.article_id);
            continue;
        };
        if dbs.is_empty() {
            continue;
        }
        articles_with_seqs.insert(parts.article_id);
        in_rows += 1;

        let article_file_id = constructed_article_file_id(parts.article_id, parts.file_id);
        let (desc, url) = file_descs.get(&article_file_id).cloned().unwrap_or_default();
        if desc.is_empty() {
            no_desc_count += 1;
        }
        let link_string = annot_links.get(&row.annot_id).map(|l| l.join(",")).unwrap_or_default();

        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{desc}\t{url}\t{}\t{}\t{link_string}",
            parts.article_id, parts.file_id, parts.local_id, row.annot_id, row.seq, row.snippet,
        )?;
        out_rows += 1;
    }

    info!("could not find file description for {no_desc_count} sequences");
    info!("{} articles have mapped sequences", articles_with_seqs.len());
    info!("got {in_rows} sequences, wrote {out_rows}");
    Ok(articles_with_seqs)
}

/// Per-article metadata read from the upstream corpus's article
/// descriptor file.
#[derive(Debug, Clone, Default)]
pub struct ArticleMeta {
    pub article_id: u64,
    pub external_id: String,
    pub pmid: String,
    pub doi: String,
    pub source: String,
    pub publisher: String,
    pub journal: String,
    pub eissn: String,
    pub print_issn: String,
    pub vol: String,
    pub issue: String,
    pub page: String,
    pub year: String,
    pub first_author_field: String,
    pub title: String,
}

/// Trim a year string down to its last whitespace-separated token's
/// digits, falling back to `"0"` for anything that doesn't parse.
pub fn sanitize_year(year_str: &str) -> String {
    let last_word = year_str.split(' ').next_back().unwrap_or("");
    let digits: String = last_word.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return "0".to_string();
    }
    match digits.parse::<u32>() {
        Ok(year) => year.to_string(),
        Err(_) => {
            warn!("{year_str:?} does not look like a year, cleaned string is {digits:?}");
            "0".to_string()
        }
    }
}

/// First author's family name: the token before the first space, comma,
/// or semicolon in the author field.
pub fn first_author(field: &str) -> String {
    field
        .split([' ', ',', ';'])
        .next()
        .unwrap_or("")
        .replace(['\n', '\r'], "")
}

fn ref_string(article: &ArticleMeta) -> String {
    format!("{} {} {} {}", first_author(&article.first_author_field), article.journal, sanitize_year(&article.year), article.vol)
}

/// Write `hgFixed.article.tab` (one row per article present in
/// `article_dbs` — mapped to at least one db, or carrying at least one
/// marker with an empty db list) and `publications.processedArticles.tab`
/// (every article seen, mapped or not, for downstream bookkeeping).
pub fn write_article_tables(
    article_dbs: &HashMap<u64, Vec<String>>,
    articles: impl IntoIterator<Item = ArticleMeta>,
    out_dir: &Path,
) -> Result<usize> {
    info!("formatting article information to genome browser format");
    fs::create_dir_all(out_dir)?;
    let article_file = File::create(out_dir.join("hgFixed.article.tab"))?;
    let mut article_out = BufWriter::new(article_file);
    let ext_id_file = File::create(out_dir.join("publications.processedArticles.tab"))?;
    let mut ext_id_out = BufWriter::new(ext_id_file);

    let mut written = 0usize;
    for article in articles {
        writeln!(ext_id_out, "{}\t{}\t{}", article.article_id, article.external_id, article.doi)?;

        let Some(dbs) = article_dbs.get(&article.article_id) else {
            continue;
        };
        let db_string = dbs.join(",");
        let eissn = if article.eissn.is_empty() { &article.print_issn } else { &article.eissn };
        let pmid = if article.pmid.is_empty() || article.pmid == "NONE" { "0".to_string() } else { article.pmid.clone() };

        writeln!(
            article_out,
            "{}\t{}\t{pmid}\t{}\t{}\t{}\t{}\t{}\t{eissn}\t{}\t{}\t{}\t{db_string}",
            article.article_id,
            article.external_id,
            article.doi,
            article.source,
            article.publisher,
            ref_string(&article),
            article.journal,
            article.vol,
            article.issue,
            article.page,
        )?;
        written += 1;
    }
    info!("wrote {written} article rows");
    Ok(written)
}

/// Split a BedX `name` field (comma-joined `qName:qStart-qEnd` tokens, as
/// written by `chain::psl_list_to_bedx`) back into its seqIds and
/// seqRanges extended-field strings.
fn seq_ids_and_ranges(name_field: &str) -> (String, String) {
    let mut ids = Vec::new();
    let mut ranges = Vec::new();
    for token in name_field.split(',') {
        match token.split_once(':') {
            Some((qname, range)) => {
                ids.push(qname.to_string());
                ranges.push(range.to_string());
            }
            None => ids.push(token.to_string()),
        }
    }
    (ids.join(","), ranges.join(","))
}

/// Overlap a db's chained BED features against a loci bed (its `name`
/// column holding gene names), returning query name -> overlapping gene
/// names. Intervals are considered overlapping when they share any base
/// on the same chrom.
pub fn overlap_loci(features: &[BedFeature], loci_bed_path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let mut by_query: HashMap<String, Vec<String>> = HashMap::new();
    if !loci_bed_path.is_file() {
        return Ok(by_query);
    }
    let text = fs::read_to_string(loci_bed_path)?;
    let mut loci = Vec::new();
    for line in text.lines() {
        if let Ok(locus) = BedFeature::parse_line(line) {
            loci.push(locus);
        }
    }
    for feature in features {
        let mut genes: Vec<String> = loci
            .iter()
            .filter(|l| l.chrom == feature.chrom && l.chrom_start < feature.chrom_end && feature.chrom_start < l.chrom_end)
            .map(|l| l.name.clone())
            .collect();
        if genes.is_empty() {
            continue;
        }
        genes.sort();
        genes.dedup();
        for token in feature.name.split(',') {
            let qname = token.split(':').next().unwrap_or(token);
            by_query.entry(qname.to_string()).or_insert_with(|| genes.clone());
        }
    }
    Ok(by_query)
}

/// Join per-article metadata, per-issn impact factor, per-article class,
/// and per-annotation locus overlap onto a chained BED feature's
/// extended-field tail, in the order `seqIds, seqRanges, publisher, pmid,
/// doi, printIssn, journal, title, firstAuthor, year, impact, classes,
/// loci` (the feature already carries `seqTypes` from chaining). Read
/// after chaining is over.
pub fn enrich_bed_features(
    features: &mut [BedFeature],
    article_of: impl Fn(&str) -> Option<u64>,
    articles: &HashMap<u64, ArticleMeta>,
    impact_by_issn: &HashMap<String, u32>,
    article_class: &HashMap<u64, String>,
    loci_by_query: &HashMap<String, Vec<String>>,
) {
    for feature in features.iter_mut() {
        let (seq_ids, seq_ranges) = seq_ids_and_ranges(&feature.name);
        let first_token = feature.name.split(',').next().unwrap_or("");
        let query_name = first_token.split(':').next().unwrap_or(first_token);
        let article_id = article_of(query_name);
        let article = article_id.and_then(|id| articles.get(&id));

        let issn = article
            .map(|a| if a.print_issn.is_empty() { a.eissn.clone() } else { a.print_issn.clone() })
            .unwrap_or_default();
        let impact = impact_by_issn.get(&issn).copied().unwrap_or(0);
        let classes = article_id.and_then(|id| article_class.get(&id)).cloned().unwrap_or_default();
        let loci = loci_by_query.get(query_name).cloned().unwrap_or_default().join(",");

        feature.extra.push(seq_ids);
        feature.extra.push(seq_ranges);
        feature.extra.push(article.map(|a| a.publisher.clone()).unwrap_or_default());
        feature.extra.push(article.map(|a| a.pmid.clone()).unwrap_or_default());
        feature.extra.push(article.map(|a| a.doi.clone()).unwrap_or_default());
        feature.extra.push(issn);
        feature.extra.push(article.map(|a| a.journal.clone()).unwrap_or_default());
        feature.extra.push(article.map(|a| a.title.clone()).unwrap_or_default());
        feature.extra.push(article.map(|a| first_author(&a.first_author_field)).unwrap_or_default());
        feature.extra.push(article.map(|a| a.year.clone()).unwrap_or_default());
        feature.extra.push(impact.to_string());
        feature.extra.push(classes);
        feature.extra.push(loci);
    }
}

/// Find the directory under a chained-bed tree that holds per-db marker
/// loci beds (named with a `loci` component), if one was produced.
pub fn find_loci_bed_dir(base_dir: &Path) -> Result<Option<PathBuf>> {
    if !base_dir.is_dir() {
        return Ok(None);
    }
    for entry in fs::read_dir(base_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if name.contains("loci") {
                    return Ok(Some(entry.path()));
                }
            }
        }
    }
    Ok(None)
}

/// One row from a marker annotator's tab output:
/// `annotId\tseq\tsnippet\ttype\tmarkerId\trecogType\trecogId\tsection`.
#[derive(Debug, Clone)]
pub struct MarkerRow {
    pub annot_id: u64,
    pub snippet: String,
    pub marker_type: String,
    pub marker_id: String,
    pub recog_type: String,
    pub recog_id: String,
    pub section: String,
}

pub fn read_marker_rows(path: &Path) -> Result<Vec<MarkerRow>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 8 {
            debug!("skipping malformed marker row: {line:?}");
            continue;
        }
        let Ok(annot_id) = cols[0].parse::<u64>() else {
            debug!("skipping marker row with unparseable annotId: {line:?}");
            continue;
        };
        rows.push(MarkerRow {
            annot_id,
            snippet: cols[2].to_string(),
            marker_type: cols[3].to_string(),
            marker_id: cols[4].to_string(),
            recog_type: cols[5].to_string(),
            recog_id: cols[6].to_string(),
            section: cols[7].to_string(),
        });
    }
    Ok(rows)
}

/// Rewrite a db's marker annotations into `<db>.markerAnnot.tab` (sorted
/// by markerId), tally the distinct-articles-per-marker counts into
/// `markerCounts.tab`, and collect every article id that had at least one
/// marker into `markerArticlesFile`. Markers are tallied per source file:
/// an article mentioned in more than one annotation file is counted once
/// per file, not deduplicated globally.
pub fn rewrite_marker_annots(
    marker_annot_dir: &Path,
    db: &str,
    table_dir: &Path,
    file_descs: &HashMap<u64, (String, String)>,
    digits: &DigitsConfig,
    marker_articles_file: &Path,
    marker_counts_file: &Path,
) -> Result<usize> {
    fs::create_dir_all(table_dir)?;
    struct OutRow {
        article_id: u64,
        file_id: u64,
        local_id: u64,
        desc: String,
        url: String,
        row: MarkerRow,
    }

    let mut out_rows: Vec<OutRow> = Vec::new();
    let mut marker_counts: HashMap<String, u64> = HashMap::new();
    let mut article_ids: Vec<u64> = Vec::new();

    if marker_annot_dir.is_dir() {
        for entry in fs::read_dir(marker_annot_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tab") {
                continue;
            }
            let mut file_marker_articles: HashMap<String, HashSet<u64>> = HashMap::new();
            for row in read_marker_rows(&path)? {
                let parts = split(row.annot_id, digits);
                let article_file_id = constructed_article_file_id(parts.article_id, parts.file_id);
                let (desc, url) = file_descs.get(&article_file_id).cloned().unwrap_or_default();
                file_marker_articles.entry(row.marker_id.clone()).or_default().insert(parts.article_id);
                out_rows.push(OutRow { article_id: parts.article_id, file_id: parts.file_id, local_id: parts.local_id, desc, url, row });
            }
            let mut file_article_ids = HashSet::new();
            for (marker_id, articles) in file_marker_articles {
                *marker_counts.entry(marker_id).or_insert(0) += articles.len() as u64;
                file_article_ids.extend(articles);
            }
            article_ids.extend(file_article_ids);
        }
    }

    out_rows.sort_by(|a, b| a.row.marker_id.cmp(&b.row.marker_id));
    let out_path = table_dir.join(format!("{db}.markerAnnot.tab"));
    let mut out = BufWriter::new(File::create(&out_path)?);
    for r in &out_rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.article_id, r.file_id, r.local_id, r.desc, r.url, r.row.marker_type, r.row.marker_id, r.row.recog_type, r.row.recog_id, r.row.section, r.row.snippet
        )?;
    }

    let mut articles_out = BufWriter::new(File::create(marker_articles_file)?);
    for id in &article_ids {
        writeln!(articles_out, "{id}")?;
    }

    let mut counts_out = BufWriter::new(File::create(marker_counts_file)?);
    let mut marker_ids: Vec<&String> = marker_counts.keys().collect();
    marker_ids.sort();
    for marker_id in marker_ids {
        writeln!(counts_out, "{marker_id}\t{}", marker_counts[marker_id])?;
    }

    info!("wrote {} marker annotation rows for {db}, {} markers", out_rows.len(), marker_counts.len());
    Ok(out_rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits() -> DigitsConfig {
        DigitsConfig {
            article_digits: 10,
            file_digits: 3,
            annot_digits: 5,
        }
    }

    #[test]
    fn sanitize_year_extracts_digits_from_last_word() {
        assert_eq!(sanitize_year("published 2019"), "2019");
        assert_eq!(sanitize_year("n.d."), "0");
        assert_eq!(sanitize_year(""), "0");
    }

    #[test]
    fn first_author_stops_at_separators() {
        assert_eq!(first_author("Smith, J and Doe, K"), "Smith");
        assert_eq!(first_author("Doe J; Roe K"), "Doe");
    }

    #[test]
    fn write_seq_tables_skips_unmapped_articles() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("hgFixed.sequenceAnnot.tab");
        let mut article_dbs = HashMap::new();
        article_dbs.insert(440002039u64, vec!["hg19".to_string()]);

        let rows = vec![
            SeqAnnotRow { annot_id: 44000203950000012, seq: "ACGT".to_string(), snippet: "snip".to_string() },
            SeqAnnotRow { annot_id: 99000000000000001, seq: "TTTT".to_string(), snippet: "snip2".to_string() },
        ];
        let mapped = write_seq_tables(&article_dbs, rows, &HashMap::new(), &HashMap::new(), &digits(), &out).unwrap();
        assert_eq!(mapped, HashSet::from([440002039u64]));
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("44000203950000012"));
    }

    #[test]
    fn write_article_tables_writes_processed_for_all_and_article_row_only_when_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let mut article_dbs = HashMap::new();
        article_dbs.insert(1u64, vec!["hg19".to_string()]);

        let articles = vec![
            ArticleMeta { article_id: 1, doi: "10.1/x".to_string(), journal: "Nature".to_string(), year: "2020".to_string(), ..Default::default() },
            ArticleMeta { article_id: 2, doi: "10.1/y".to_string(), ..Default::default() },
        ];
        let written = write_article_tables(&article_dbs, articles, dir.path()).unwrap();
        assert_eq!(written, 1);

        let processed = fs::read_to_string(dir.path().join("publications.processedArticles.tab")).unwrap();
        assert_eq!(processed.lines().count(), 2);

        let article_tab = fs::read_to_string(dir.path().join("hgFixed.article.tab")).unwrap();
        assert_eq!(article_tab.lines().count(), 1);
        assert!(article_tab.contains("hg19"));
    }

    #[test]
    fn find_loci_bed_dir_locates_matching_subdir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("markerLoci")).unwrap();
        fs::create_dir_all(dir.path().join("other")).unwrap();
        let found = find_loci_bed_dir(dir.path()).unwrap().unwrap();
        assert_eq!(found, dir.path().join("markerLoci"));
    }

    #[test]
    fn read_file_descs_parses_rows_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.tab");
        fs::write(&path, "1\t2\tsome desc\thttp://x\nbad row\n").unwrap();
        let descs = read_file_descs(&path).unwrap();
        assert_eq!(descs.get(&constructed_article_file_id(1, 2)), Some(&("some desc".to_string(), "http://x".to_string())));
        assert_eq!(descs.len(), 1);
    }

    #[test]
    fn read_article_meta_parses_full_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.tab");
        fs::write(&path, "1\text1\tPM1\t10.1/d\tsrc\tpub\tjournal\teissn\t1234-5678\tv1\ti1\tp1\tpublished 2021\tSmith J\tA Title\n").unwrap();
        let articles = read_article_meta(&path).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].print_issn, "1234-5678");
        assert_eq!(articles[0].year, "2021");
        assert_eq!(articles[0].title, "A Title");
    }

    #[test]
    fn read_impact_factors_rounds_and_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("impact.tab");
        fs::write(&path, "1234-5678\t4.6\nbad-issn\t\n").unwrap();
        let impacts = read_impact_factors(&path).unwrap();
        assert_eq!(impacts.get("1234-5678"), Some(&5));
        assert_eq!(impacts.len(), 1);
    }

    #[test]
    fn read_article_classes_parses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.tab");
        fs::write(&path, "1\tcancer,genomics\n").unwrap();
        let classes = read_article_classes(&path).unwrap();
        assert_eq!(classes.get(&1u64), Some(&"cancer,genomics".to_string()));
    }

    #[test]
    fn overlap_loci_matches_by_chrom_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loci.bed");
        fs::write(&path, "chr1\t100\t200\tBRCA1\nchr1\t500\t600\tTP53\n").unwrap();
        let features = vec![BedFeature {
            chrom: "chr1".to_string(),
            chrom_start: 150,
            chrom_end: 160,
            name: "q1:0-10".to_string(),
            ..Default::default()
        }];
        let hits = overlap_loci(&features, &path).unwrap();
        assert_eq!(hits.get("q1"), Some(&vec!["BRCA1".to_string()]));
    }

    #[test]
    fn enrich_bed_features_pushes_all_extra_fields() {
        let mut articles = HashMap::new();
        articles.insert(
            1u64,
            ArticleMeta { article_id: 1, print_issn: "1234-5678".to_string(), publisher: "Pub".to_string(), ..Default::default() },
        );
        let mut impacts = HashMap::new();
        impacts.insert("1234-5678".to_string(), 7u32);
        let mut classes = HashMap::new();
        classes.insert(1u64, "cancer".to_string());
        let mut loci = HashMap::new();
        loci.insert("q1".to_string(), vec!["BRCA1".to_string()]);

        let mut features = vec![BedFeature { name: "q1:0-10".to_string(), ..Default::default() }];
        enrich_bed_features(&mut features, |_| Some(1u64), &articles, &impacts, &classes, &loci);
        assert_eq!(features[0].extra.len(), 13);
        assert_eq!(features[0].extra[2], "Pub");
        assert_eq!(features[0].extra[10], "7");
        assert_eq!(features[0].extra[11], "cancer");
        assert_eq!(features[0].extra[12], "BRCA1");
    }

    #[test]
    fn rewrite_marker_annots_tallies_per_file_and_sorts_by_marker_id() {
        let dir = tempfile::tempdir().unwrap();
        let marker_dir = dir.path().join("markers");
        fs::create_dir_all(&marker_dir).unwrap();
        fs::write(
            marker_dir.join("a.tab"),
            "44000203950000012\tACGT\tsnip1\tgene\trs2\texact\tid1\tabstract\n\
             44000203950000013\tACGT\tsnip2\tgene\trs1\texact\tid2\tabstract\n",
        )
        .unwrap();
        let table_dir = dir.path().join("tables");
        let marker_articles = dir.path().join("markerArticles.tab");
        let marker_counts = dir.path().join("markerCounts.tab");

        let written = rewrite_marker_annots(&marker_dir, "hg19", &table_dir, &HashMap::new(), &digits(), &marker_articles, &marker_counts).unwrap();
        assert_eq!(written, 2);

        let out = fs::read_to_string(table_dir.join("hg19.markerAnnot.tab")).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("rs1"));
        assert!(lines[1].contains("rs2"));

        let counts = fs::read_to_string(marker_counts).unwrap();
        assert!(counts.contains("rs1\t1"));
        assert!(counts.contains("rs2\t1"));
    }
}
