use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};

use pubmap::align_dispatch::dispatch_blat_jobs;
use pubmap::annot_id::article_id_of;
use pubmap::annotate::{dispatch_annotators, ensure_word_count_file, AnnotatorJob};
use pubmap::batch::{self, STEP_ORDER};
use pubmap::bed::{sort_for_output, BedFeature};
use pubmap::chain::{chain_chunk, fuse_overlapping_psls, near_best_filter, split_by_chunk, write_chain_outputs, NEAR_BEST_MIN_ALIGN_SIZE};
use pubmap::config::PipelineConfig;
use pubmap::context::PipelineContext;
use pubmap::exporter::{export_cdr3, export_fasta, AnnotRow, Cdr3Row};
use pubmap::loader::{load_table_files, LoadItem, ShellTableSink, TableKind};
use pubmap::psl::parse_all;
use pubmap::runner::{ChunkRunner, LocalRunner};
use pubmap::seq_filter::{passes_length_filter, read_seq_rows, FastaSharder};
use pubmap::sort_lift::{dispatch_sort_jobs, lift_cdna_jobs};
use pubmap::table_builder::{
    enrich_bed_features, find_loci_bed_dir, overlap_loci, read_article_classes, read_article_meta, read_file_descs, read_impact_factors,
    rewrite_marker_annots, write_article_tables, write_seq_tables, ArticleMeta, SeqAnnotRow,
};

/// pubMap: resumable batch pipeline from text-mined sequences to genome
/// browser tables.
#[derive(Parser, Debug)]
#[command(name = "pubmap", version, about)]
struct Cli {
    /// Dataset name, e.g. "pmc"
    dataset: String,

    /// Step name, or a "from-to" range (e.g. "annot-chain")
    step: String,

    #[command(flatten)]
    options: Options,
}

#[derive(Args, Debug)]
struct Options {
    /// Path to the TOML config file
    #[arg(long, default_value = "pubmap.toml", help_heading = "Config")]
    config: PathBuf,

    /// Root output directory for batches and tables
    #[arg(long, default_value = ".", help_heading = "Config")]
    out_dir: PathBuf,

    /// Root directory of the mined text corpus
    #[arg(long, default_value = "text", help_heading = "Config")]
    text_dir: PathBuf,

    /// Restrict blat/sort/chain/load to these dbs (comma-separated)
    #[arg(long, value_delimiter = ',', help_heading = "Step options")]
    only_db: Vec<String>,

    /// Skip the cDNA/protein-to-genome lift during sort
    #[arg(long, help_heading = "Step options")]
    skip_convert: bool,

    /// Prefix prepended to every loaded table name
    #[arg(long, default_value = "", help_heading = "Step options")]
    table_prefix: String,

    /// Optional issn -> impact factor tab file used to enrich table output
    #[arg(long, help_heading = "Step options")]
    impact_file: Option<PathBuf>,

    /// Optional articleId -> classes tab file used to enrich table output
    #[arg(long, help_heading = "Step options")]
    class_file: Option<PathBuf>,

    /// Optional directory of per-db `<db>.bed` locus beds to overlap against
    #[arg(long, help_heading = "Step options")]
    loci_dir: Option<PathBuf>,

    /// blat binary invoked by the align step
    #[arg(long, default_value = "blat", help_heading = "Alignment options")]
    blat_binary: String,

    /// Extra options passed through to blat on every job
    #[arg(long, default_value = "", help_heading = "Alignment options")]
    blat_options: String,

    /// Sort script invoked by the sort step
    #[arg(long, default_value = "pubSortPsl", help_heading = "Alignment options")]
    sort_script: String,

    /// pslMap binary used for the cDNA/protein lift
    #[arg(long, default_value = "pslMap", help_heading = "Alignment options")]
    pslmap_binary: String,

    /// hgsql binary used for tracking-table bookkeeping
    #[arg(long, default_value = "hgsql", help_heading = "Loader options")]
    hgsql_binary: String,

    /// hgLoadBed binary used to load BED tracks
    #[arg(long, default_value = "hgLoadBed", help_heading = "Loader options")]
    hgload_bed_binary: String,

    /// hgLoadSqlTab binary used to load plain tab tables
    #[arg(long, default_value = "hgLoadSqlTab", help_heading = "Loader options")]
    hgload_sqltab_binary: String,

    /// hgFixed-style db the tracking table and article/seq tables live in
    #[arg(long, default_value = "hgFixed", help_heading = "Loader options")]
    tracking_db: String,

    /// Enable debug logging for this invocation (equivalent to RUST_LOG=debug)
    #[arg(short = 'v', long, help_heading = "Logging")]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run_step(ctx: &PipelineContext, step: &str, options: &Options) -> Result<()> {
    log::info!("=== running step {step} ===");
    match step {
        "new" => {
            let created = batch::new_batch(ctx).with_context(|| "creating new batch")?;
            log::info!("created batch {} at {}", created.batch_id, created.dir.display());
        }
        "annot" | "annotSeq" | "annotMarker" | "filter" | "blat" | "sort" | "chain" | "identifiers" | "tables" => {
            let current = batch::current_batch(ctx)
                .with_context(|| "finding current batch")?
                .ok_or_else(|| anyhow::anyhow!("no open batch; run the 'new' step first"))?;
            let mut runner = LocalRunner::new();
            run_pipeline_step(ctx, &current, step, &mut runner, options)?;
            batch::flag(&current, canonical_flag(step)).with_context(|| format!("flagging step {step} done"))?;
        }
        "load" => run_load(ctx, options)?,
        "dropAll" => run_drop_all(ctx, options)?,
        "switchOver" => run_switch_over(ctx, options)?,
        "expFasta" => run_export_fasta(ctx)?,
        "expCdr3" => run_export_cdr3(ctx)?,
        other => bail!("{other} is not a valid step"),
    }
    Ok(())
}

/// `annotSeq`/`annotMarker` share the `annot` batch flag: they are the same
/// monotonic step, split into two CLI-invocable halves so an operator can
/// run the sequence and marker annotators as separate cluster jobs.
fn canonical_flag(step: &str) -> &str {
    match step {
        "annotSeq" | "annotMarker" => "annot",
        other => other,
    }
}

fn run_pipeline_step(
    ctx: &PipelineContext,
    batch: &batch::Batch,
    step: &str,
    runner: &mut dyn ChunkRunner,
    options: &Options,
) -> Result<()> {
    log::debug!("running {step} for batch {} at {}", batch.batch_id, batch.dir.display());
    match step {
        "annot" | "annotSeq" | "annotMarker" => run_annot(ctx, batch, step, runner, options)?,
        "filter" => run_filter(ctx, batch)?,
        "blat" => run_blat(batch, runner, options)?,
        "sort" => run_sort(ctx, batch, runner, options)?,
        "chain" => run_chain(ctx, batch, options)?,
        "identifiers" => run_identifiers(ctx, batch)?,
        "tables" => run_tables(ctx, batch, options)?,
        other => bail!("{other} has no pipeline wiring"),
    }
    runner.finish(true)?;
    Ok(())
}

/// Each update is a subdirectory of `<textDir>/<dataset>`, the same
/// on-disk discovery the original's `findAllUpdateIds` does against the
/// text corpus tree.
fn discover_update_ids(ctx: &PipelineContext, text_dir: &std::path::Path) -> Result<Vec<String>> {
    let dataset_dir = ctx.text_dir(text_dir);
    if !dataset_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&dataset_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

fn run_annot(ctx: &PipelineContext, batch: &batch::Batch, step: &str, runner: &mut dyn ChunkRunner, options: &Options) -> Result<()> {
    let update_ids = discover_update_ids(ctx, &options.text_dir)?;
    let unannotated = batch::unannotated_update_ids(ctx, &update_ids).with_context(|| "finding unannotated update ids")?;
    batch.write_update_ids(&unannotated)?;

    if step != "annotMarker" {
        if let Some(word_count_base) = &ctx.config.word_count_base {
            ensure_word_count_file(runner, &batch.dir, word_count_base, &options.text_dir, &unannotated)
                .with_context(|| "ensuring word count file")?;
        }
    }

    let mut annotators = Vec::new();
    if step != "annotMarker" {
        annotators.push(AnnotatorJob { name: "dna".to_string(), annot_id_offset: ctx.config.annot_id_offsets.offset_for("dna") });
        annotators.push(AnnotatorJob { name: "prot".to_string(), annot_id_offset: ctx.config.annot_id_offsets.offset_for("prot") });
    }
    if step != "annotSeq" {
        annotators.push(AnnotatorJob { name: "marker".to_string(), annot_id_offset: ctx.config.annot_id_offsets.offset_for("marker") });
    }

    let chunk_names = batch.read_chunk_names()?;
    let submitted = dispatch_annotators(runner, &annotators, &chunk_names, &options.text_dir, &batch.dir.join("annots"))
        .with_context(|| "dispatching annotator jobs")?;
    log::info!("submitted {submitted} annotator jobs");
    Ok(())
}

fn run_filter(ctx: &PipelineContext, batch: &batch::Batch) -> Result<()> {
    for kind in ["dna", "prot"] {
        let in_dir = batch.annot_dir(kind);
        if !in_dir.is_dir() {
            continue;
        }
        let is_prot = kind == "prot";
        let out_dir = batch.filter_dir(kind);
        let mut sharder = FastaSharder::new(&out_dir, &ctx.config.dbs.align_genome_order, ctx.config.seq_filter.clone())
            .with_context(|| format!("opening fasta sharder for {kind}"))?;
        let mut kept = 0usize;
        let mut dropped = 0usize;
        for entry in std::fs::read_dir(&in_dir).with_context(|| format!("reading {}", in_dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tab") {
                continue;
            }
            for row in read_seq_rows(&path)? {
                if passes_length_filter(&row.seq, &ctx.config.seq_filter, is_prot) {
                    if sharder.append_row(&row, &ctx.config.dbs, &ctx.config.digits, is_prot)? {
                        kept += 1;
                    } else {
                        dropped += 1;
                    }
                } else {
                    dropped += 1;
                }
            }
        }
        sharder.close()?;
        log::info!("filter {kind}: kept {kept}, dropped {dropped}");
    }
    Ok(())
}

/// Shard files are split by size class ("short"/"long") purely to bound
/// job size; that split plays the role of AlignDispatcher's `seqType`
/// directory, so each (kind, size class) pair becomes one blat job group.
const SIZE_CLASSES: &[&str] = &["short", "long"];

fn run_blat(batch: &batch::Batch, runner: &mut dyn ChunkRunner, options: &Options) -> Result<()> {
    let size_classes: Vec<String> = SIZE_CLASSES.iter().map(|s| s.to_string()).collect();
    for kind in ["dna", "prot"] {
        let fa_dir = batch.filter_dir(kind);
        if !fa_dir.is_dir() {
            continue;
        }
        let psl_dir = batch.blat_dir(kind);
        match dispatch_blat_jobs(runner, &fa_dir, &psl_dir, &options.only_db, &size_classes, &options.blat_binary, &options.blat_options) {
            Ok(n) => log::info!("blat {kind}: {n} jobs submitted"),
            Err(e) => log::warn!("blat {kind}: {e}"),
        }
    }
    Ok(())
}

fn run_sort(ctx: &PipelineContext, batch: &batch::Batch, runner: &mut dyn ChunkRunner, options: &Options) -> Result<()> {
    let dbs = if options.only_db.is_empty() { ctx.config.dbs.align_genome_order.clone() } else { options.only_db.clone() };
    for kind in ["dna", "prot"] {
        let seq_type = if kind == "prot" { "p" } else { "c" };
        let in_dir = batch.blat_dir(kind);
        if !in_dir.is_dir() {
            continue;
        }
        let sorted_dir = batch.sort_dir(kind);
        dispatch_sort_jobs(runner, seq_type, &in_dir, &sorted_dir, &dbs, &options.sort_script, None)
            .with_context(|| format!("dispatching sort jobs for {kind}"))?;

        if !options.skip_convert {
            let cdna_map_dir = batch.dir.join("cdnaMap").join(kind);
            let lifted_dir = sorted_dir.join("lifted");
            if cdna_map_dir.is_dir() {
                let skipped = lift_cdna_jobs(runner, &sorted_dir, &cdna_map_dir, &lifted_dir, &dbs, &options.pslmap_binary)?;
                for (db, reason) in skipped {
                    log::warn!("skipping cDNA lift for {db}: {reason}");
                }
            }
        }
    }
    Ok(())
}

/// ChainEngine's full per-batch pipeline: (a) globally merge every sort
/// job's output and keep only near-best alignments per query; (b)
/// re-split the survivors by deterministic article chunk, dropping
/// articles that matched too promiscuously; (c) chain each chunk's
/// articles independently and write one bed/psl pair per (chunk, db).
fn run_chain(ctx: &PipelineContext, batch: &batch::Batch, options: &Options) -> Result<()> {
    let mut all_psls: Vec<pubmap::psl::PslRecord> = Vec::new();
    for kind in ["dna", "prot"] {
        let sort_dir = batch.sort_dir(kind);
        if !sort_dir.is_dir() {
            continue;
        }
        for entry in walk_psl_files(&sort_dir)? {
            let text = std::fs::read_to_string(&entry)?;
            all_psls.extend(parse_all(&text));
        }
    }

    let filtered = near_best_filter(all_psls, NEAR_BEST_MIN_ALIGN_SIZE);
    let by_chunk = split_by_chunk(filtered, &ctx.config.chain, &ctx.config.digits);

    let configured_dbs = if options.only_db.is_empty() { ctx.config.dbs.align_genome_order.clone() } else { options.only_db.clone() };
    if by_chunk.is_empty() {
        let written = write_chain_outputs(&batch.bed_dir(), "chunk0", &configured_dbs, None)
            .with_context(|| "writing chain outputs for chunk0")?;
        log::debug!("no alignments survived the near-best filter, wrote sentinel {:?}", written);
        return Ok(());
    }
    for (chunk_id, psls) in by_chunk {
        let chunk_name = format!("chunk{chunk_id}");
        let psls = fuse_overlapping_psls(psls);
        let db_beds = chain_chunk(psls, &ctx.config.chain, &ctx.config.digits);
        let db_beds_opt = if db_beds.is_empty() { None } else { Some(&db_beds) };
        let written = write_chain_outputs(&batch.bed_dir(), &chunk_name, &configured_dbs, db_beds_opt)
            .with_context(|| format!("writing chain outputs for {chunk_name}"))?;
        log::debug!("chunk {chunk_name}: wrote {} chain output files", written.len());
    }
    Ok(())
}

fn walk_psl_files(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in walkdir_flat(dir)? {
        if entry.extension().and_then(|e| e.to_str()) == Some("psl") {
            out.push(entry);
        }
    }
    Ok(out)
}

/// Non-recursive-then-recursive directory walk; `sort_dir` is at most two
/// levels deep (`<kind>/<sizeClass>/<db>.psl`).
fn walkdir_flat(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            for inner in std::fs::read_dir(&path)? {
                out.push(inner?.path());
            }
        } else {
            out.push(path);
        }
    }
    Ok(out)
}

fn run_identifiers(_ctx: &PipelineContext, batch: &batch::Batch) -> Result<()> {
    // Renumbers nothing by itself: the annotId space is already disjoint
    // per annotator (annotate::AnnotIdOffsets), so this step's only job is
    // to confirm the bed tree it is about to hand to TableBuilder exists.
    if !batch.bed_dir().is_dir() {
        log::warn!("no bed output found at {}; chain step may not have produced any features", batch.bed_dir().display());
    }
    Ok(())
}

/// TableBuilder's per-batch pipeline: join chained bed features with
/// article/impact/class/locus metadata, rewrite marker annotations, and
/// fold everything into the flat tab files the loader reads.
fn run_tables(ctx: &PipelineContext, batch: &batch::Batch, options: &Options) -> Result<()> {
    let table_dir = batch.table_dir();
    std::fs::create_dir_all(&table_dir)?;

    let file_descs = read_file_descs(&batch.files_tab()).with_context(|| "reading file descriptions")?;
    let articles = read_article_meta(&batch.articles_tab()).with_context(|| "reading article metadata")?;
    let article_by_id: HashMap<u64, ArticleMeta> = articles.iter().cloned().map(|a| (a.article_id, a)).collect();

    let impact_by_issn = match &options.impact_file {
        Some(path) => read_impact_factors(path).with_context(|| "reading impact factors")?,
        None => HashMap::new(),
    };
    let article_class = match &options.class_file {
        Some(path) => read_article_classes(path).with_context(|| "reading article classes")?,
        None => HashMap::new(),
    };
    let loci_root = match &options.loci_dir {
        Some(dir) => Some(dir.clone()),
        None => find_loci_bed_dir(&batch.dir)?,
    };

    let article_of = |name: &str| pubmap::annot_id::parse(name).ok().map(|id| article_id_of(id, &ctx.config.digits));

    let mut article_dbs: HashMap<u64, Vec<String>> = HashMap::new();
    let mut marker_article_ids: Vec<u64> = Vec::new();
    if batch.bed_dir().is_dir() {
        for entry in std::fs::read_dir(batch.bed_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bed") {
                continue;
            }
            let Some(db) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.split('.').nth(1)) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            let mut features: Vec<BedFeature> = text.lines().filter_map(|l| BedFeature::parse_line(l).ok()).collect();
            for feature in &features {
                let query = feature.name.split(',').next().unwrap_or(&feature.name);
                if let Some(article_id) = article_of(query.split(':').next().unwrap_or(query)) {
                    let dbs = article_dbs.entry(article_id).or_default();
                    if !dbs.contains(&db.to_string()) {
                        dbs.push(db.to_string());
                    }
                }
            }

            let loci_by_query = match &loci_root {
                Some(dir) => overlap_loci(&features, &dir.join(format!("{db}.bed"))).with_context(|| format!("overlapping loci for {db}"))?,
                None => HashMap::new(),
            };
            enrich_bed_features(&mut features, article_of, &article_by_id, &impact_by_issn, &article_class, &loci_by_query);
            sort_for_output(&mut features);

            let out_path = table_dir.join(path.file_name().unwrap());
            let bed_text: String = features.iter().map(|f| f.to_line() + "\n").collect();
            std::fs::write(&out_path, bed_text)?;

            let marker_dir = batch.annot_dir("marker");
            if marker_dir.is_dir() {
                let written = rewrite_marker_annots(
                    &marker_dir,
                    db,
                    &table_dir,
                    &file_descs,
                    &ctx.config.digits,
                    &batch.marker_articles_tab(),
                    &batch.marker_counts_tab(),
                )
                .with_context(|| format!("rewriting marker annotations for {db}"))?;
                log::info!("rewrote {written} marker annotation rows for {db}");
            }
        }
    }
    if let Ok(text) = std::fs::read_to_string(batch.marker_articles_tab()) {
        for line in text.lines() {
            if let Ok(id) = line.parse::<u64>() {
                marker_article_ids.push(id);
            }
        }
    }

    let mut seq_rows = Vec::new();
    for kind in ["dna", "prot"] {
        let dir = batch.annot_dir(kind);
        if !dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tab") {
                continue;
            }
            for row in read_seq_rows(&path)? {
                seq_rows.push(SeqAnnotRow { annot_id: row.annot_id, seq: row.seq, snippet: String::new() });
            }
        }
    }
    write_seq_tables(
        &article_dbs,
        seq_rows,
        &file_descs,
        &HashMap::new(),
        &ctx.config.digits,
        &table_dir.join("hgFixed.sequenceAnnot.tab"),
    )
    .with_context(|| "writing sequence tables")?;

    for article_id in marker_article_ids {
        article_dbs.entry(article_id).or_default();
    }
    write_article_tables(&article_dbs, articles, &table_dir).with_context(|| "writing article tables")?;
    Ok(())
}

/// Enumerate TableBuilder's actual outputs under `table_dir` as load
/// items, deriving `(db, table)` from each file's naming convention:
/// chained bed copies are `<chunk>.<db>.bed`, marker annotations are
/// `<db>.markerAnnot.tab`, and the remaining fixed tables are
/// `<db>.<table>.tab` where `db` is a pseudo-db like `hgFixed`. Zero-size
/// files are skipped; they are sentinels from a step that produced
/// nothing, not tables to load.
fn collect_table_dir_items(table_dir: &std::path::Path, table_prefix: &str, only_db: &[String]) -> Result<Vec<LoadItem>> {
    let mut items = Vec::new();
    if !table_dir.is_dir() {
        return Ok(items);
    }
    for entry in std::fs::read_dir(table_dir)? {
        let path = entry?.path();
        if std::fs::metadata(&path)?.len() == 0 {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let ext = path.extension().and_then(|e| e.to_str());
        let parts: Vec<&str> = stem.split('.').collect();

        let (db, table, kind, restrict_db) = match ext {
            Some("bed") => {
                let Some(db) = parts.get(1) else { continue };
                (db.to_string(), format!("{table_prefix}pubsBlat"), TableKind::Bed, true)
            }
            Some("tab") => {
                let (Some(db), Some(table_name)) = (parts.first(), parts.get(1)) else { continue };
                (db.to_string(), format!("{table_prefix}{table_name}"), TableKind::Tab, *table_name == "markerAnnot")
            }
            _ => continue,
        };
        if restrict_db && !only_db.is_empty() && !only_db.contains(&db) {
            continue;
        }
        items.push(LoadItem { db, table, kind, file: path });
    }
    Ok(items)
}

fn run_load(ctx: &PipelineContext, options: &Options) -> Result<()> {
    let mut sink = ShellTableSink::new(&options.hgsql_binary, &options.hgload_bed_binary, &options.hgload_sqltab_binary);
    let ids = batch::batch_ids(ctx)?;
    let Some(&latest) = ids.last() else {
        bail!("no batches to load");
    };
    let batch = batch::batch_at(ctx, latest);
    if !batch::is_past(&batch, "tables") {
        bail!("batch {latest} has not completed the tables step yet");
    }

    let items = collect_table_dir_items(&batch.table_dir(), &options.table_prefix, &options.only_db).with_context(|| "enumerating table directory")?;
    let touched = load_table_files(&mut sink, &items, &options.tracking_db, "pubsLoadedFiles").with_context(|| "loading tables")?;
    log::info!("loaded {} tables: {:?}", touched.len(), touched);
    Ok(())
}

fn run_drop_all(ctx: &PipelineContext, options: &Options) -> Result<()> {
    let mut sink = ShellTableSink::new(&options.hgsql_binary, &options.hgload_bed_binary, &options.hgload_sqltab_binary);
    let ids = batch::batch_ids(ctx)?;
    let Some(&latest) = ids.last() else {
        bail!("no batches to drop tables for");
    };
    let batch = batch::batch_at(ctx, latest);
    let mut items = Vec::new();
    if batch.bed_dir().is_dir() {
        for entry in std::fs::read_dir(batch.bed_dir())? {
            let path = entry?.path();
            if let Some(db) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.split('.').nth(1)) {
                items.push(LoadItem {
                    db: db.to_string(),
                    table: format!("{}pubsBlat", options.table_prefix),
                    kind: TableKind::Bed,
                    file: path,
                });
            }
        }
    }
    pubmap::loader::drop_all(&mut sink, &items).with_context(|| "dropping tables")?;
    Ok(())
}

fn run_switch_over(ctx: &PipelineContext, options: &Options) -> Result<()> {
    let mut sink = ShellTableSink::new(&options.hgsql_binary, &options.hgload_bed_binary, &options.hgload_sqltab_binary);
    let ids = batch::batch_ids(ctx)?;
    let Some(&latest) = ids.last() else {
        bail!("no batches to switch over");
    };
    let batch = batch::batch_at(ctx, latest);
    let mut items = Vec::new();
    if batch.bed_dir().is_dir() {
        for entry in std::fs::read_dir(batch.bed_dir())? {
            let path = entry?.path();
            if let Some(db) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.split('.').nth(1)) {
                items.push(LoadItem {
                    db: db.to_string(),
                    table: format!("{}pubsBlat", options.table_prefix),
                    kind: TableKind::Bed,
                    file: path,
                });
            }
        }
    }
    pubmap::loader::switch_over(&mut sink, &items, &options.table_prefix).with_context(|| "switching tables over")?;
    Ok(())
}

fn run_export_fasta(ctx: &PipelineContext) -> Result<()> {
    let ids = batch::batch_ids(ctx)?;
    let Some(&latest) = ids.last() else {
        bail!("no batches to export from");
    };
    let batch = batch::batch_at(ctx, latest);
    let mut rows = Vec::new();
    for kind in ["dna", "prot"] {
        let dir = batch.annot_dir(kind);
        if !dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tab") {
                for row in read_seq_rows(&path)? {
                    rows.push(AnnotRow { annot_id: row.annot_id, seq: row.seq });
                }
            }
        }
    }
    let out = batch.dir.join("export.fa");
    export_fasta(rows, &out, None, &ctx.config.digits).with_context(|| "exporting fasta")?;
    log::info!("wrote {}", out.display());
    Ok(())
}

fn run_export_cdr3(ctx: &PipelineContext) -> Result<()> {
    let ids = batch::batch_ids(ctx)?;
    let Some(&latest) = ids.last() else {
        bail!("no batches to export from");
    };
    let batch = batch::batch_at(ctx, latest);
    let dir = batch.annot_dir("prot");
    let mut rows = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tab") {
                for row in read_seq_rows(&path)? {
                    let raw_line = format!(
                        "{}\t{}\t{}\t{}\tY",
                        row.annot_id,
                        row.seq,
                        if row.prefix_filter_accept { "Y" } else { "N" },
                        if row.suffix_filter_accept { "Y" } else { "N" },
                    );
                    rows.push(Cdr3Row {
                        annot_id: row.annot_id,
                        seq: row.seq,
                        raw_line,
                        prefix_filter_accept: row.prefix_filter_accept,
                        suffix_filter_accept: row.suffix_filter_accept,
                        markov_filter_accept: true,
                    });
                }
            }
        }
    }
    let out_tab = batch.dir.join("cdr3.tab");
    let out_fa = batch.dir.join("cdr3.fa");
    let header = "annotId\tseq\tprefixFilterAccept\tsuffixFilterAccept\tmarkovFilterAccept";
    let written = export_cdr3(rows, &out_tab, &out_fa, header).with_context(|| "exporting cdr3")?;
    log::info!("wrote {written} cdr3 rows to {}", out_tab.display());
    Ok(())
}

fn run_step_range(ctx: &PipelineContext, from_step: &str, to_step: &str, options: &Options) -> Result<()> {
    let from_idx = STEP_ORDER
        .iter()
        .position(|s| *s == from_step)
        .with_context(|| format!("{from_step} is not a valid step"))?;
    let to_idx = STEP_ORDER
        .iter()
        .position(|s| *s == to_step)
        .with_context(|| format!("{to_step} is not a valid step"))?;
    if from_idx > to_idx {
        bail!("range {from_step}-{to_step} runs backwards");
    }
    for step in &STEP_ORDER[from_idx..=to_idx] {
        run_step(ctx, step, options)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.options.debug);

    let config = PipelineConfig::load(&cli.options.config)
        .with_context(|| format!("loading config {}", cli.options.config.display()))?;
    let ctx = PipelineContext::new(config, cli.dataset.clone(), cli.options.out_dir.clone());

    if let Some((from, to)) = cli.step.split_once('-') {
        run_step_range(&ctx, from, to, &cli.options)
    } else {
        run_step(&ctx, &cli.step, &cli.options)
    }
}
