use std::time::Instant;

use crate::handler::HandlerLabel;

/// Status of a hook invocation in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HookStatus {
    /// Hook has started and not yet finished.
    Running,
    /// Hook completed without stopping the chain.
    Completed,
    /// Hook stopped the chain with a successful abort.
    Stopped,
    /// Hook returned an error or aborted with one.
    Failed,
    /// Hook panicked and the dispatcher converted the panic.
    Panicked,
    /// Hook was compensated during rollback.
    Compensated,
    /// Hook's compensation failed.
    CompensationFailed,
}

/// Record of one hook invocation against a context.
#[derive(Debug, Clone)]
pub struct HookRecord {
    /// Key, name and chain position of the hook.
    pub label: HandlerLabel,
    /// Current status.
    pub status: HookStatus,
    /// When the hook started running.
    pub started_at: Instant,
    /// When the hook finished running or was compensated.
    pub completed_at: Option<Instant>,
}

/// Audit log of every hook invocation made against one context.
#[derive(Debug, Clone, Default)]
pub struct HookAuditLog {
    records: Vec<HookRecord>,
}

impl HookAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hook starting; returns the record's index.
    pub(crate) fn record_start(&mut self, label: HandlerLabel) -> usize {
        self.records.push(HookRecord {
            label,
            status: HookStatus::Running,
            started_at: Instant::now(),
            completed_at: None,
        });
        self.records.len() - 1
    }

    pub(crate) fn record_finish(&mut self, index: usize, status: HookStatus) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = status;
            record.completed_at = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn records(&self) -> &[HookRecord] {
        &self.records
    }

    /// One line per invocation, in invocation order.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                HookStatus::Running => "…",
                HookStatus::Completed => "✓",
                HookStatus::Stopped => "■",
                HookStatus::Failed => "✗",
                HookStatus::Panicked => "‼",
                HookStatus::Compensated => "↩",
                HookStatus::CompensationFailed => "⚠",
            };
            lines.push(format!("{status} {}", record.label));
        }
        lines.join("\n")
    }
}
