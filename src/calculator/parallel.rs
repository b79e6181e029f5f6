//! Scheduling of per-modifier calculations.
//!
//! With [`Isolation::PerTask`] the tasks are queued on a job channel and
//! drained by a bounded pool of named worker threads, each task solved in
//! its own forked scope. Results are fanned in over a second channel by the
//! calling thread. It stops waiting once every task has had its deadline
//! (plus a short grace period); workers still busy are left detached and
//! pick up no further jobs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError};
use tracing::{debug, warn};

use super::config::Isolation;
use super::error::CalcError;
use super::query::{run_task, Query, Task};
use super::report::{Outcome, Report};
use crate::model::ModifierId;

const COLLECT_GRACE: Duration = Duration::from_millis(50);

pub(crate) fn run(query: Arc<Query>, tasks: &[Task]) -> Report {
    let mut report = match query.isolation {
        Isolation::Shared => sequential(&query, tasks),
        Isolation::PerTask => fan_out(query, tasks),
    };
    report.finish();
    report
}

fn sequential(query: &Query, tasks: &[Task]) -> Report {
    let mut report = Report::default();
    for task in tasks {
        report.record(task.modifier(), run_task(query, *task));
    }
    report
}

fn pool_size(query: &Query, tasks: usize) -> usize {
    let limit = query.max_workers.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    limit.clamp(1, tasks.max(1))
}

fn fan_out(query: Arc<Query>, tasks: &[Task]) -> Report {
    let mut report = Report::default();
    let (job_tx, job_rx) = unbounded::<(usize, Task)>();
    let (tx, rx) = unbounded::<(usize, Result<Outcome, CalcError>)>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let mut pending: BTreeMap<usize, ModifierId> = BTreeMap::new();
    for (slot, task) in tasks.iter().copied().enumerate() {
        // unbounded and the receiver is alive
        let _ = job_tx.send((slot, task));
        pending.insert(slot, task.modifier());
    }
    drop(job_tx);

    let size = pool_size(&query, tasks.len());
    let mut spawned = 0;
    let mut spawn_error = None;
    for n in 0..size {
        let worker_query = Arc::clone(&query);
        let worker_jobs = job_rx.clone();
        let worker_tx = tx.clone();
        let worker_cancelled = Arc::clone(&cancelled);
        let handle = thread::Builder::new()
            .name(format!("hybridtime-worker-{n}"))
            .spawn(move || {
                for (slot, task) in worker_jobs.iter() {
                    if worker_cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    let result = run_task(&worker_query, task);
                    if worker_tx.send((slot, result)).is_err() {
                        break;
                    }
                }
            });
        match handle {
            Ok(_detached) => spawned += 1,
            Err(e) => {
                warn!(worker = n, error = %e, "cannot spawn solver worker");
                spawn_error = Some(e.to_string());
            }
        }
    }
    drop(job_rx);
    drop(tx);

    if spawned == 0 {
        let reason = spawn_error.unwrap_or_else(|| "no worker started".to_string());
        for id in std::mem::take(&mut pending).into_values() {
            report.record(id, Err(CalcError::Spawn(reason.clone())));
        }
        return report;
    }
    debug!(workers = spawned, tasks = tasks.len(), "fanned out");

    // a worker runs its share of the queue back to back
    let rounds = u32::try_from(tasks.len().div_ceil(spawned)).unwrap_or(u32::MAX);
    let deadline = query.worker_deadline.and_then(|budget| {
        start.checked_add(budget.saturating_mul(rounds).saturating_add(COLLECT_GRACE))
    });
    while !pending.is_empty() {
        let received = match deadline {
            Some(at) => rx.recv_deadline(at),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((slot, result)) => {
                if let Some(id) = pending.remove(&slot) {
                    report.record(id, result);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Relaxed);
                for id in std::mem::take(&mut pending).into_values() {
                    warn!(modifier = %id, "worker missed its deadline");
                    report.timed_out.push(id);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                for id in std::mem::take(&mut pending).into_values() {
                    report.record(id, Err(CalcError::WorkerLost(id)));
                }
            }
        }
    }
    report
}
