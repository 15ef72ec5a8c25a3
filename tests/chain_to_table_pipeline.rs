//! End-to-end coverage across chaining, BED output, and the loader's
//! idempotence guarantee — the path an article's alignments take from
//! raw PSL hits to a loaded table.

use std::collections::HashMap;
use std::fs;

use pubmap::bed::BedFeature;
use pubmap::chain::{chain_article, write_chain_outputs};
use pubmap::config::ChainConfig;
use pubmap::loader::{load_table_files, LoadItem, LoadedFile, TableKind, TableSink};
use pubmap::psl::{PslRecord, TargetName};

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

fn psl(q_name: &str, t_start: u64, t_end: u64) -> PslRecord {
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
            db: "hg19".to_string(),
            chrom: "chr1".to_string(),
            seq_type: "genome".to_string(),
        },
        t_size: 1_000_000,
        t_start,
        t_end,
        block_sizes: vec![size],
        q_starts: vec![0],
        t_starts: vec![t_start],
    }
}

#[derive(Default)]
struct RecordingSink {
    tables: std::cell::RefCell<HashMap<(String, String), HashMap<String, LoadedFile>>>,
    loaded_items: std::cell::RefCell<Vec<LoadItem>>,
}

impl TableSink for RecordingSink {
    fn table_exists(&self, db: &str, table: &str) -> pubmap::error::Result<bool> {
        Ok(self.tables.borrow().contains_key(&(db.to_string(), table.to_string())))
    }

    fn create_tracking_table(&mut self, db: &str, table: &str) -> pubmap::error::Result<()> {
        self.tables.borrow_mut().insert((db.to_string(), table.to_string()), HashMap::new());
        Ok(())
    }

    fn loaded_files(&self, db: &str, table: &str) -> pubmap::error::Result<HashMap<String, LoadedFile>> {
        Ok(self.tables.borrow().get(&(db.to_string(), table.to_string())).cloned().unwrap_or_default())
    }

    fn record_loaded_file(&mut self, db: &str, table: &str, file_name: &str, size: u64, insert_time: &str) -> pubmap::error::Result<()> {
        self.tables
            .borrow_mut()
            .entry((db.to_string(), table.to_string()))
            .or_default()
            .insert(file_name.to_string(), LoadedFile { size, insert_time: insert_time.to_string() });
        Ok(())
    }

    fn load_table(&mut self, item: &LoadItem, _append: bool) -> pubmap::error::Result<()> {
        self.loaded_items.borrow_mut().push(item.clone());
        Ok(())
    }

    fn drop_table(&mut self, _db: &str, _table: &str) -> pubmap::error::Result<()> {
        Ok(())
    }
}

#[test]
fn article_with_two_close_hits_chains_and_loads_once() {
    let psls = vec![psl("seq1", 1000, 1100), psl("seq2", 1150, 1250)];
    let db_beds = chain_article(psls, &config()).expect("article should not be skipped");
    assert!(db_beds.contains_key("hg19"));

    let dir = tempfile::tempdir().unwrap();
    let written = write_chain_outputs(dir.path(), "chunk0", &["hg19".to_string()], Some(&db_beds)).unwrap();
    assert_eq!(written.len(), 2);

    let bed_path = dir.path().join("chunk0.hg19.bed");
    let bed_text = fs::read_to_string(&bed_path).unwrap();
    let feature = BedFeature::parse_line(bed_text.lines().next().unwrap()).unwrap();
    assert_eq!(feature.chrom, "chr1");
    assert_eq!(feature.chrom_start, 1000);
    assert_eq!(feature.chrom_end, 1250);

    let mut sink = RecordingSink::default();
    let items = vec![LoadItem {
        db: "hg19".to_string(),
        table: "pubsBlat".to_string(),
        kind: TableKind::Bed,
        file: bed_path.clone(),
    }];
    let touched = load_table_files(&mut sink, &items, "hgFixed", "pubsLoadedFiles").unwrap();
    assert_eq!(touched, vec!["hg19.pubsBlat".to_string()]);

    // loading again with the same file on disk is a no-op
    let touched_again = load_table_files(&mut sink, &items, "hgFixed", "pubsLoadedFiles").unwrap();
    assert!(touched_again.is_empty());
    assert_eq!(sink.loaded_items.borrow().len(), 1);
}

#[test]
fn article_with_too_many_features_is_skipped_and_gets_sentinel() {
    let mut cfg = config();
    cfg.max_features = 1;
    let mut psls = Vec::new();
    for i in 0..3u64 {
        psls.push(psl(&format!("seq{i}"), 1000 + i * 10_000, 1100 + i * 10_000));
    }
    let result = chain_article(psls, &cfg);
    assert!(result.is_none());

    let dir = tempfile::tempdir().unwrap();
    let written = write_chain_outputs(dir.path(), "chunk1", &["hg19".to_string()], result.as_ref()).unwrap();
    assert_eq!(written, vec![dir.path().join("chunk1.hg19.bed")]);
    assert_eq!(fs::metadata(&written[0]).unwrap().len(), 0);
}
