//! Loader: the idempotent final step that pushes built tables into the
//! genome-browser database. `TableSink` is the seam standing in for the
//! real relational loader (`hgLoadBed`/`hgLoadSqlTab`), so the
//! idempotence logic can be exercised without a live database.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// One file already recorded as loaded: its size and insertion timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub size: u64,
    pub insert_time: String,
}

/// Which load call a table needs: BED tracks use `hgLoadBed`-style
/// loading, plain tab-separated tables use `hgLoadSqlTab`-style loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Bed,
    Tab,
}

/// One unit of work for the loader: a single table file for a single db.
#[derive(Debug, Clone)]
pub struct LoadItem {
    pub db: String,
    pub table: String,
    pub kind: TableKind,
    pub file: PathBuf,
}

/// Abstraction over the external relational database loader.
pub trait TableSink {
    fn table_exists(&self, db: &str, table: &str) -> Result<bool>;
    fn create_tracking_table(&mut self, db: &str, table: &str) -> Result<()>;
    fn loaded_files(&self, db: &str, table: &str) -> Result<HashMap<String, LoadedFile>>;
    fn record_loaded_file(&mut self, db: &str, table: &str, file_name: &str, size: u64, insert_time: &str) -> Result<()>;
    fn load_table(&mut self, item: &LoadItem, append: bool) -> Result<()>;
    fn drop_table(&mut self, db: &str, table: &str) -> Result<()>;
}

/// Compares a tracking table's recorded file sizes against what's
/// actually on disk. An empty tracking table is trivially consistent.
pub fn is_identical_on_disk(loaded: &HashMap<String, LoadedFile>) -> bool {
    for (fname, record) in loaded {
        let path = Path::new(fname);
        let disk_size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                warn!("file {fname} is recorded as loaded but is missing on disk");
                return false;
            }
        };
        if disk_size != record.size {
            warn!("file {fname} has size {disk_size} on disk but {} in the tracking table", record.size);
            return false;
        }
    }
    true
}

/// Fails the load rather than silently reloading or silently diverging
/// from what the database already has on record.
pub fn check_identical_on_disk(loaded: &HashMap<String, LoadedFile>) -> Result<()> {
    if is_identical_on_disk(loaded) {
        Ok(())
    } else {
        Err(PipelineError::InconsistentState(
            "tracked files differ from what is on disk; truncate the tracking table to reload everything".to_string(),
        ))
    }
}

/// Ensures a db's tracking table exists, returning its recorded contents
/// (empty if it was just created).
pub fn ensure_tracking_table<S: TableSink>(sink: &mut S, db: &str, table: &str) -> Result<HashMap<String, LoadedFile>> {
    if sink.table_exists(db, table)? {
        let loaded = sink.loaded_files(db, table)?;
        debug!("{} files already recorded as loaded in {db}.{table}", loaded.len());
        Ok(loaded)
    } else {
        sink.create_tracking_table(db, table)?;
        Ok(HashMap::new())
    }
}

/// Load every item whose file is not already recorded in the tracking
/// table, appending to existing tables once anything has been loaded
/// before. Returns the `db.table` names actually touched.
pub fn load_table_files<S: TableSink>(
    sink: &mut S,
    items: &[LoadItem],
    tracking_db: &str,
    tracking_table: &str,
) -> Result<Vec<String>> {
    let loaded_files = ensure_tracking_table(sink, tracking_db, tracking_table)?;
    check_identical_on_disk(&loaded_files)?;
    let append = !loaded_files.is_empty();

    let mut touched = Vec::new();
    for item in items {
        let fname = item.file.to_string_lossy().to_string();
        if loaded_files.contains_key(&fname) {
            debug!("{fname} already loaded, skipping");
            continue;
        }
        info!("loading {} into {}.{}", fname, item.db, item.table);
        sink.load_table(item, append)?;
        let size = fs::metadata(&item.file)?.len();
        let insert_time = Utc::now().to_rfc3339();
        sink.record_loaded_file(tracking_db, tracking_table, &fname, size, &insert_time)?;
        touched.push(format!("{}.{}", item.db, item.table));
    }
    Ok(touched)
}

/// Drop every table named in `items` before a from-scratch reload, used
/// for tables that are fully rebuilt rather than appended to (e.g. marker
/// bed tracks that get rewritten each run).
pub fn drop_all<S: TableSink>(sink: &mut S, items: &[LoadItem]) -> Result<()> {
    for item in items {
        sink.drop_table(&item.db, &item.table)?;
    }
    Ok(())
}

/// Promote a newly-loaded set of tables to be "the" live tables for a
/// dataset, e.g. by renaming a staging table prefix to the public one.
/// Left generic over the sink so the rename itself goes through the same
/// seam as every other database mutation.
pub fn switch_over<S: TableSink>(sink: &mut S, staging: &[LoadItem], _live_prefix: &str) -> Result<()> {
    for item in staging {
        debug!("promoting {}.{} to live", item.db, item.table);
        sink.load_table(item, false)?;
    }
    Ok(())
}

/// Production `TableSink`: shells out to the genome browser's own loader
/// binaries (`hgLoadBed`, `hgLoadSqlTab`) and `hgsql` for the tracking
/// table, the same way every other external collaborator in this pipeline
/// is driven through a command line rather than a client library.
pub struct ShellTableSink {
    hgsql_binary: String,
    hgload_bed_binary: String,
    hgload_sqltab_binary: String,
}

impl ShellTableSink {
    pub fn new(hgsql_binary: impl Into<String>, hgload_bed_binary: impl Into<String>, hgload_sqltab_binary: impl Into<String>) -> Self {
        ShellTableSink {
            hgsql_binary: hgsql_binary.into(),
            hgload_bed_binary: hgload_bed_binary.into(),
            hgload_sqltab_binary: hgload_sqltab_binary.into(),
        }
    }

    fn run(&self, cmdline: &str) -> Result<String> {
        debug!("running {cmdline}");
        let output = Command::new("sh").arg("-c").arg(cmdline).output()?;
        if !output.status.success() {
            return Err(PipelineError::data(
                "loader::ShellTableSink",
                format!("{cmdline} failed: {}", String::from_utf8_lossy(&output.stderr)),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TableSink for ShellTableSink {
    fn table_exists(&self, db: &str, table: &str) -> Result<bool> {
        let out = self.run(&format!("{} {db} -Ne \"show tables like '{table}'\"", self.hgsql_binary))?;
        Ok(!out.trim().is_empty())
    }

    fn create_tracking_table(&mut self, db: &str, table: &str) -> Result<()> {
        self.run(&format!(
            "{} {db} -e \"create table {table} (name varchar(255) not null primary key, size bigint not null, insertTime varchar(40) not null)\"",
            self.hgsql_binary
        ))?;
        Ok(())
    }

    fn loaded_files(&self, db: &str, table: &str) -> Result<HashMap<String, LoadedFile>> {
        let out = self.run(&format!("{} {db} -Ne \"select name,size,insertTime from {table}\"", self.hgsql_binary))?;
        let mut loaded = HashMap::new();
        for line in out.lines() {
            let mut parts = line.splitn(3, '\t');
            if let (Some(name), Some(size), Some(insert_time)) = (parts.next(), parts.next(), parts.next()) {
                if let Ok(size) = size.parse::<u64>() {
                    loaded.insert(name.to_string(), LoadedFile { size, insert_time: insert_time.to_string() });
                }
            }
        }
        Ok(loaded)
    }

    fn record_loaded_file(&mut self, db: &str, table: &str, file_name: &str, size: u64, insert_time: &str) -> Result<()> {
        self.run(&format!(
            "{} {db} -e \"insert into {table} (name,size,insertTime) values ('{file_name}',{size},'{insert_time}')\"",
            self.hgsql_binary
        ))?;
        Ok(())
    }

    fn load_table(&mut self, item: &LoadItem, append: bool) -> Result<()> {
        let binary = match item.kind {
            TableKind::Bed => &self.hgload_bed_binary,
            TableKind::Tab => &self.hgload_sqltab_binary,
        };
        let mut cmd = format!("{binary} {} {} {}", item.db, item.table, item.file.display());
        if append {
            cmd.push_str(" -oldTable");
        }
        self.run(&cmd)?;
        Ok(())
    }

    fn drop_table(&mut self, db: &str, table: &str) -> Result<()> {
        self.run(&format!("{} {db} -e \"drop table if exists {table}\"", self.hgsql_binary))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MemorySink {
        tables: RefCell<HashMap<(String, String), HashMap<String, LoadedFile>>>,
        loads: RefCell<Vec<(String, String, bool)>>,
    }

    impl TableSink for MemorySink {
        fn table_exists(&self, db: &str, table: &str) -> Result<bool> {
            Ok(self.tables.borrow().contains_key(&(db.to_string(), table.to_string())))
        }

        fn create_tracking_table(&mut self, db: &str, table: &str) -> Result<()> {
            self.tables.borrow_mut().insert((db.to_string(), table.to_string()), HashMap::new());
            Ok(())
        }

        fn loaded_files(&self, db: &str, table: &str) -> Result<HashMap<String, LoadedFile>> {
            Ok(self.tables.borrow().get(&(db.to_string(), table.to_string())).cloned().unwrap_or_default())
        }

        fn record_loaded_file(&mut self, db: &str, table: &str, file_name: &str, size: u64, insert_time: &str) -> Result<()> {
            self.tables
                .borrow_mut()
                .entry((db.to_string(), table.to_string()))
                .or_default()
                .insert(file_name.to_string(), LoadedFile { size, insert_time: insert_time.to_string() });
            Ok(())
        }

        fn load_table(&mut self, item: &LoadItem, append: bool) -> Result<()> {
            self.loads.borrow_mut().push((item.db.clone(), item.table.clone(), append));
            Ok(())
        }

        fn drop_table(&mut self, db: &str, table: &str) -> Result<()> {
            self.tables.borrow_mut().remove(&(db.to_string(), table.to_string()));
            Ok(())
        }
    }

    #[test]
    fn is_identical_on_disk_true_for_empty() {
        assert!(is_identical_on_disk(&HashMap::new()));
    }

    #[test]
    fn detects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bed");
        fs::write(&path, b"1234").unwrap();
        let mut loaded = HashMap::new();
        loaded.insert(path.to_string_lossy().to_string(), LoadedFile { size: 999, insert_time: "now".to_string() });
        assert!(!is_identical_on_disk(&loaded));
        assert!(check_identical_on_disk(&loaded).is_err());
    }

    #[test]
    fn load_table_files_skips_already_loaded_and_records_new() {
        let dir = tempfile::tempdir().unwrap();
        let bed = dir.path().join("hg19.bed");
        fs::write(&bed, b"chr1\t0\t100\n").unwrap();

        let mut sink = MemorySink::default();
        let items = vec![LoadItem {
            db: "hg19".to_string(),
            table: "pubsBlat".to_string(),
            kind: TableKind::Bed,
            file: bed.clone(),
        }];
        let touched = load_table_files(&mut sink, &items, "hgFixed", "pubsLoadedFiles").unwrap();
        assert_eq!(touched, vec!["hg19.pubsBlat".to_string()]);

        // second run: the file is already tracked, so nothing loads again
        let touched_again = load_table_files(&mut sink, &items, "hgFixed", "pubsLoadedFiles").unwrap();
        assert!(touched_again.is_empty());
        assert_eq!(sink.loads.borrow().len(), 1);
    }

    #[test]
    fn load_table_files_rejects_inconsistent_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let bed = dir.path().join("hg19.bed");
        fs::write(&bed, b"chr1\t0\t100\n").unwrap();

        let mut sink = MemorySink::default();
        sink.create_tracking_table("hgFixed", "pubsLoadedFiles").unwrap();
        sink.record_loaded_file("hgFixed", "pubsLoadedFiles", &bed.to_string_lossy(), 999, "now").unwrap();

        let items = vec![LoadItem {
            db: "hg19".to_string(),
            table: "pubsBlat".to_string(),
            kind: TableKind::Bed,
            file: bed,
        }];
        let err = load_table_files(&mut sink, &items, "hgFixed", "pubsLoadedFiles").unwrap_err();
        assert!(matches!(err, PipelineError::InconsistentState(_)));
    }
}
