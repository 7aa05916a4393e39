//! Dispatching pick-and-place commands to an external executor.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::task::PickPlaceCommand;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("executor not ready after {waited:?}")]
    Unavailable { waited: Duration },

    #[error("executor service call failed: {0}")]
    Service(String),

    #[error("execution interrupted")]
    Interrupted,
}

/// Service that performs a pick-and-place request.
pub trait PickPlaceExecutor: Send + Sync {
    /// Whether the service currently accepts requests.
    fn is_ready(&self) -> bool;

    /// Perform one request. `Ok(false)` means the service ran but reported
    /// failure.
    fn execute(&self, command: &PickPlaceCommand) -> Result<bool, ExecutorError>;
}

/// Poll `is_ready` every `poll` until it succeeds or `timeout` elapses.
pub fn wait_for_executor(
    executor: &dyn PickPlaceExecutor,
    timeout: Duration,
    poll: Duration,
) -> Result<(), ExecutorError> {
    let start = Instant::now();
    loop {
        if executor.is_ready() {
            return Ok(());
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Err(ExecutorError::Unavailable { waited });
        }
        thread::sleep(poll.min(timeout - waited));
    }
}

/// Outcome counts of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Commands never sent because the executor became unavailable.
    pub not_dispatched: usize,
}

/// Send commands one at a time, waiting for readiness before each.
///
/// A failed command is logged and counted; the next one is still sent. If
/// the executor stays unavailable past `timeout`, the remaining commands are
/// counted as not dispatched and the report is returned normally.
///
/// # Errors
///
/// Only [`ExecutorError::Interrupted`] is returned; the frame should stop.
pub fn dispatch_commands(
    executor: &dyn PickPlaceExecutor,
    commands: &[PickPlaceCommand],
    timeout: Duration,
    poll: Duration,
) -> Result<DispatchReport, ExecutorError> {
    let mut report = DispatchReport::default();

    for (i, command) in commands.iter().enumerate() {
        if let Err(e) = wait_for_executor(executor, timeout, poll) {
            report.not_dispatched = commands.len() - i;
            log::error!("{}; {} command(s) not dispatched", e, report.not_dispatched);
            break;
        }

        match executor.execute(command) {
            Ok(true) => {
                log::info!("{}: pick and place succeeded ({} arm)", command.object_name, command.arm_name);
                report.succeeded += 1;
            }
            Ok(false) => {
                log::warn!("{}: pick and place reported failure", command.object_name);
                report.failed += 1;
            }
            Err(ExecutorError::Interrupted) => return Err(ExecutorError::Interrupted),
            Err(e) => {
                log::warn!("{}: {}", command.object_name, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Dry-run executor: always ready, logs each request and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExecutor;

impl PickPlaceExecutor for LoggingExecutor {
    fn is_ready(&self) -> bool {
        true
    }

    fn execute(&self, command: &PickPlaceCommand) -> Result<bool, ExecutorError> {
        let p = command.pick_pose.position;
        let q = command.place_pose.position;
        log::info!(
            "scene {}: {} arm picks '{}' at ({:.3}, {:.3}, {:.3}) -> ({:.3}, {:.3}, {:.3})",
            command.test_scene_num,
            command.arm_name,
            command.object_name,
            p.x,
            p.y,
            p.z,
            q.x,
            q.y,
            q.z
        );
        Ok(true)
    }
}
