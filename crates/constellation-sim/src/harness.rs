//! Multi-process launch
//!
//! Worker `k` of `P` simulates steps `k, k+P, k+2P, ...`. Workers share no
//! memory and write disjoint per-tick files; the harness only spawns them and
//! waits on each one independently.

use crate::{Result, SimError};
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Steps assigned to `worker` out of `workers`, in ascending order.
pub fn stride(total_steps: u64, worker: usize, workers: usize) -> Vec<u64> {
    if workers == 0 || worker >= workers {
        return Vec::new();
    }
    (worker as u64..total_steps).step_by(workers).collect()
}

/// One worker fewer than the available cores, but at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// How to start a worker. `--worker <k> --workers <P>` is appended per
/// worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub status: ExitStatus,
}

pub async fn launch(command: &WorkerCommand, workers: usize) -> Result<Vec<WorkerOutcome>> {
    if workers == 0 {
        return Err(SimError::Config("workers must be at least 1".into()));
    }

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg("--worker")
            .arg(worker.to_string())
            .arg("--workers")
            .arg(workers.to_string())
            .kill_on_drop(true)
            .spawn()?;
        info!("Started worker {} (pid {:?})", worker, child.id());

        set.spawn(async move { (worker, child.wait().await) });
    }

    let mut outcomes = Vec::with_capacity(workers);
    while let Some(joined) = set.join_next().await {
        let (worker, status) =
            joined.map_err(|e| SimError::Config(format!("worker wait task failed: {e}")))?;
        let status = status?;
        if status.success() {
            info!("Worker {} finished", worker);
        } else {
            error!("Worker {} failed: {}", worker, status);
        }
        outcomes.push(WorkerOutcome { worker, status });
    }
    outcomes.sort_by_key(|o| o.worker);

    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.status.success())
        .map(|o| format!("worker {} ({})", o.worker, o.status))
        .collect();
    if !failed.is_empty() {
        return Err(SimError::ProcessFailure {
            failed: failed.len(),
            total: workers,
            detail: failed.join(", "),
        });
    }
    Ok(outcomes)
}
