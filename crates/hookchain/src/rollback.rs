use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audit::{HookAuditLog, HookStatus};
use crate::config::RollbackPolicy;
use crate::context::HookContext;
use crate::error::{CompensationError, HookError, panic_message};
use crate::handler::{Compensate, HandlerLabel};

/// A completed, compensation-capable hook waiting on a possible rollback.
pub(crate) struct CompensationEntry {
    compensator: Arc<dyn Compensate>,
    label: HandlerLabel,
    snapshot: HookContext,
    record: usize,
}

impl CompensationEntry {
    pub(crate) fn new(
        compensator: Arc<dyn Compensate>,
        label: HandlerLabel,
        snapshot: HookContext,
        record: usize,
    ) -> Self {
        Self {
            compensator,
            label,
            snapshot,
            record,
        }
    }
}

/// Entries in the order their hooks completed; unwound last-in-first-out.
#[derive(Default)]
pub(crate) struct CompensationStack {
    entries: Vec<CompensationEntry>,
}

impl CompensationStack {
    pub(crate) fn push(&mut self, entry: CompensationEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Compensate every entry, most recent first, each against its own snapshot.
    ///
    /// Under `RollbackPolicy::Guarded` a failing or panicking compensation is
    /// recorded and the walk continues. Under `Unguarded` the first panic is
    /// recorded, the remaining entries are skipped, and the panic is handed
    /// back in [`RollbackPanic`] for the caller to resume.
    pub(crate) fn run_rollback(
        self,
        policy: RollbackPolicy,
        audit: &Mutex<HookAuditLog>,
    ) -> Result<Vec<CompensationError>, RollbackPanic> {
        let mut failures = Vec::new();

        for entry in self.entries.into_iter().rev() {
            debug!(hook = %entry.label, "compensating hook");

            let result = match panic::catch_unwind(AssertUnwindSafe(|| {
                entry.compensator.compensate(&entry.snapshot)
            })) {
                Ok(result) => result,
                Err(payload) => {
                    let error = HookError::Panicked {
                        label: entry.label.clone(),
                        message: panic_message(payload.as_ref()),
                    };
                    if policy == RollbackPolicy::Unguarded {
                        warn!(hook = %entry.label, %error, "compensation panicked, abandoning rollback");
                        audit
                            .lock()
                            .record_finish(entry.record, HookStatus::CompensationFailed);
                        failures.push(CompensationError {
                            label: entry.label,
                            error,
                        });
                        return Err(RollbackPanic { failures, payload });
                    }
                    Err(error)
                }
            };

            match result {
                Ok(()) => {
                    audit
                        .lock()
                        .record_finish(entry.record, HookStatus::Compensated);
                }
                Err(error) => {
                    warn!(hook = %entry.label, %error, "compensation failed");
                    audit
                        .lock()
                        .record_finish(entry.record, HookStatus::CompensationFailed);
                    failures.push(CompensationError {
                        label: entry.label,
                        error,
                    });
                }
            }
        }

        Ok(failures)
    }
}

/// An unguarded rollback cut short by a compensation panic.
pub(crate) struct RollbackPanic {
    /// Failures recorded up to and including the panicking compensation.
    pub(crate) failures: Vec<CompensationError>,
    pub(crate) payload: Box<dyn Any + Send>,
}
