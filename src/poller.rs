//! Supervised background polling loop

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{PolicyEdit, ReplyPolicy};
use crate::engine::MailCycleEngine;
use crate::error::Result;
use crate::state::{self, RunStatus};

/// Filesystem locations the running service reads and writes
#[derive(Debug, Clone)]
pub struct ServicePaths {
    pub data_file: PathBuf,
    pub status_file: PathBuf,
    pub edits_file: PathBuf,
}

/// Handle to a spawned polling task
///
/// Dropping the handle does not stop the poller; call `request_stop`
/// and then `join` for an orderly shutdown.
pub struct PollerHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl PollerHandle {
    /// Whether the polling task is still alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Ask the loop to exit at the next stop check
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the polling task to finish
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Poller task failed: {}", e);
        }
    }
}

/// Spawn the polling loop as a background task
pub fn spawn(
    engine: MailCycleEngine,
    initial_policy: ReplyPolicy,
    interval: Duration,
    paths: ServicePaths,
) -> PollerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        run_loop(engine, initial_policy, interval, paths, flag).await;
    });

    PollerHandle { handle, shutdown }
}

async fn run_loop(
    engine: MailCycleEngine,
    initial_policy: ReplyPolicy,
    interval: Duration,
    paths: ServicePaths,
    shutdown: Arc<AtomicBool>,
) {
    info!("Auto-reply poller started (interval {:?})", interval);
    let mut policy = initial_policy;
    let mut last_applied: Option<u64> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Policy edits only take effect at cycle boundaries, so a cycle
        // always runs under a single consistent policy
        match PolicyEdit::load(&paths.edits_file).await {
            Ok(edit) => {
                if apply_pending_edit(&mut policy, &mut last_applied, edit) {
                    info!(
                        "Applied policy edit version {}",
                        last_applied.unwrap_or_default()
                    );
                }
            }
            Err(e) => warn!("Failed to read policy edits: {}", e),
        }

        if let Err(e) = run_cycle_once(&engine, &policy, &paths).await {
            error!("An unexpected error occurred: {}", e);
            if let Err(e) = state::set_status(&paths.status_file, RunStatus::Stopped).await {
                warn!("Failed to write status file: {}", e);
            }
        } else {
            debug!("Cycle complete, next poll in {:?}", interval);
        }

        sleep_with_stop_checks(interval, &shutdown).await;
    }

    if let Err(e) = state::set_status(&paths.status_file, RunStatus::Stopped).await {
        warn!("Failed to write status file: {}", e);
    }
    info!("Auto-reply poller stopped");
}

/// Run one cycle and persist its results
///
/// Also used directly by `run --once`.
pub async fn run_cycle_once(
    engine: &MailCycleEngine,
    policy: &ReplyPolicy,
    paths: &ServicePaths,
) -> Result<()> {
    state::set_status(&paths.status_file, RunStatus::Running).await?;

    let outcome = engine.run_cycle(policy).await;
    let replied = outcome.replied.len();
    let ignored = outcome.ignored.len();

    let log =
        state::ReplyLog::append_cycle(&paths.data_file, outcome.replied, outcome.ignored).await?;
    info!(
        "Cycle finished: {} replied, {} ignored ({} records total)",
        replied,
        ignored,
        log.replied_mails.len() + log.ignored_mails.len()
    );
    Ok(())
}

/// Apply a pending policy edit if its version differs from the last
/// applied one. Returns whether the policy changed.
fn apply_pending_edit(
    policy: &mut ReplyPolicy,
    last_applied: &mut Option<u64>,
    edit: Option<PolicyEdit>,
) -> bool {
    match edit {
        Some(edit) if *last_applied != Some(edit.version) => {
            *policy = edit.to_policy();
            *last_applied = Some(edit.version);
            true
        }
        _ => false,
    }
}

/// Sleep for the poll interval, waking every second to honor stop requests
async fn sleep_with_stop_checks(interval: Duration, shutdown: &AtomicBool) {
    let mut remaining = interval;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let step = std::cmp::min(remaining, Duration::from_secs(1));
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}
