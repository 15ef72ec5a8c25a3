//! Integration coverage for the batch step state machine: monotonicity,
//! the InUse/InProgress failure modes, and current-batch resolution.

use std::collections::HashMap;

use pubmap::batch::{self, STEP_ORDER};
use pubmap::config::{ChainConfig, DbConfig, DigitsConfig, PipelineConfig, SeqFilterConfig};
use pubmap::context::PipelineContext;
use pubmap::error::PipelineError;

fn ctx(dir: &std::path::Path) -> PipelineContext {
    let mut max_dist = HashMap::new();
    max_dist.insert("default".to_string(), 10_000u64);
    let config = PipelineConfig {
        digits: DigitsConfig {
            article_digits: 10,
            file_digits: 3,
            annot_digits: 5,
        },
        seq_filter: SeqFilterConfig {
            min_seq_len: 20,
            max_seq_len: 50_000,
            min_prot_seq_len: 10,
            short_seq_cutoff: 1000,
            max_short_bytes: 2_000_000,
            max_long_bytes: 4_000_000,
        },
        chain: ChainConfig {
            max_dist,
            min_chain_coverage: 20,
            max_chain_length: 2_000_000,
            max_features: 10,
            max_db_match_count: 50,
            chunk_article_count: 2000,
            chunk_divider: 5000,
        },
        dbs: DbConfig::default(),
        annot_id_offsets: Default::default(),
        word_count_base: None,
    };
    PipelineContext::new(config, "pmc", dir)
}

#[test]
fn full_batch_lifecycle_from_new_to_tables() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path());

    assert!(batch::current_batch(&ctx).unwrap().is_none());

    let b0 = batch::new_batch(&ctx).unwrap();
    assert_eq!(b0.batch_id, 0);

    for step in STEP_ORDER {
        assert!(!batch::is_past(&b0, step));
        batch::flag(&b0, step).unwrap();
        assert!(batch::is_past(&b0, step));
    }

    assert!(batch::current_batch(&ctx).unwrap().is_none());
    let b1 = batch::new_batch(&ctx).unwrap();
    assert_eq!(b1.batch_id, 1);
}

#[test]
fn crashed_batch_blocks_new_batch_with_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path());
    let b0 = batch::new_batch(&ctx).unwrap();
    batch::flag(&b0, "annot").unwrap();
    batch::flag(&b0, "filter").unwrap();

    let err = batch::new_batch(&ctx).unwrap_err();
    match err {
        PipelineError::InProgress { batch_id, .. } => assert_eq!(batch_id, 0),
        other => panic!("expected InProgress, got {other:?}"),
    }
}

#[test]
fn batches_at_step_reports_every_batch_past_that_step() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path());
    let b0 = batch::new_batch(&ctx).unwrap();
    for step in STEP_ORDER {
        batch::flag(&b0, step).unwrap();
    }
    let b1 = batch::new_batch(&ctx).unwrap();
    batch::flag(&b1, "annot").unwrap();

    assert_eq!(batch::batches_at_step(&ctx, "annot").unwrap(), vec![0, 1]);
    assert_eq!(batch::batches_at_step(&ctx, "tables").unwrap(), vec![0]);
}

#[test]
fn unannotated_update_ids_tracks_progress_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx(dir.path());
    let b0 = batch::new_batch(&ctx).unwrap();
    b0.write_update_ids(&["2020".to_string(), "2021".to_string()]).unwrap();
    batch::flag(&b0, "annot").unwrap();

    let all_updates = vec!["2020".to_string(), "2021".to_string(), "2022".to_string()];
    let remaining = batch::unannotated_update_ids(&ctx, &all_updates).unwrap();
    assert_eq!(remaining, vec!["2022".to_string()]);
}
