//! `ChunkRunner`: the seam at which this crate hands work off to an
//! external cluster scheduler. The pipeline only ever submits opaque
//! command lines and waits for completion; it never talks to the
//! scheduler's wire protocol directly.

use std::process::Command;

use log::{debug, warn};

use crate::error::{PipelineError, Result};

pub trait ChunkRunner {
    /// Queue one command line for execution.
    fn submit(&mut self, cmdline: String);

    /// Block on every queued command line if `wait` is true. Returns
    /// `PipelineError::ClusterFailure` naming every command that exited
    /// non-zero (or otherwise could not be run).
    fn finish(&mut self, wait: bool) -> Result<()>;
}

/// Runs each submitted command line synchronously through the shell,
/// collecting failures instead of aborting on the first one. Stands in
/// for the cluster scheduler in single-machine or test runs.
#[derive(Debug, Default)]
pub struct LocalRunner {
    queued: Vec<String>,
}

impl LocalRunner {
    pub fn new() -> Self {
        LocalRunner::default()
    }
}

impl ChunkRunner for LocalRunner {
    fn submit(&mut self, cmdline: String) {
        debug!("queued: {cmdline}");
        self.queued.push(cmdline);
    }

    fn finish(&mut self, wait: bool) -> Result<()> {
        if !wait {
            return Ok(());
        }
        let mut failed = Vec::new();
        for cmdline in self.queued.drain(..) {
            let status = Command::new("sh").arg("-c").arg(&cmdline).status();
            match status {
                Ok(s) if s.success() => {}
                Ok(s) => {
                    warn!("job exited with {s}: {cmdline}");
                    failed.push(cmdline);
                }
                Err(e) => {
                    warn!("job could not start ({e}): {cmdline}");
                    failed.push(cmdline);
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ClusterFailure(failed))
        }
    }
}

/// Records submitted command lines without running them. Used in unit
/// tests that only want to assert on dispatch logic (job counts, target
/// groupings) and in `--dryRun` CLI invocations.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    pub submitted: Vec<String>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        DryRunRunner::default()
    }
}

impl ChunkRunner for DryRunRunner {
    fn submit(&mut self, cmdline: String) {
        self.submitted.push(cmdline);
    }

    fn finish(&mut self, _wait: bool) -> Result<()> {
        Ok(())
    }
}
