use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audit::{HookAuditLog, HookStatus};
use crate::config::RollbackPolicy;
use crate::error::{CompensationError, HookError};
use crate::handler::HandlerLabel;
use crate::rollback::{CompensationEntry, CompensationStack, RollbackPanic};

/// A stored parameter value. Values are shared, never deep-copied.
pub type ParamValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug)]
enum Termination {
    Running,
    RollingBack,
    AbortedOk,
    AbortedErr(HookError),
}

/// Request-scoped state threaded through hook chains.
///
/// Holds the parameters hooks read and write, the termination state, and the
/// compensation stack built up as compensating hooks complete. All methods
/// take `&self`; the context may be shared across threads.
///
/// # Snapshots are shallow
///
/// Before a compensating hook is pushed for rollback, the parameters are
/// snapshotted by cloning each stored [`ParamValue`] handle. A value with
/// interior mutability (an `Arc<Mutex<Vec<_>>>`, say) that a later hook
/// mutates in place shows that mutation in the snapshot too. Store plain
/// values, and replace rather than mutate them, when a compensation must see
/// the state as it was.
pub struct HookContext {
    params: DashMap<String, ParamValue>,
    registry: Option<String>,
    rollback_policy: RollbackPolicy,
    state: Mutex<Termination>,
    compensations: Mutex<CompensationStack>,
    compensation_failures: Mutex<Vec<CompensationError>>,
    audit: Mutex<HookAuditLog>,
    rollback_panicked: AtomicBool,
}

impl Default for HookContext {
    fn default() -> Self {
        Self {
            params: DashMap::new(),
            registry: None,
            rollback_policy: RollbackPolicy::default(),
            state: Mutex::new(Termination::Running),
            compensations: Mutex::new(CompensationStack::default()),
            compensation_failures: Mutex::new(Vec::new()),
            audit: Mutex::new(HookAuditLog::new()),
            rollback_panicked: AtomicBool::new(false),
        }
    }
}

impl HookContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch against the named registry instead of the default one.
    #[must_use]
    pub fn with_registry(mut self, name: impl Into<String>) -> Self {
        self.registry = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    #[must_use]
    pub fn registry_name(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    #[must_use]
    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.rollback_policy
    }

    pub fn set_param<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.params.insert(key.into(), Arc::new(value));
    }

    /// Store an already shared value. Later readers get the same allocation.
    pub fn set_param_value(&self, key: impl Into<String>, value: ParamValue) {
        self.params.insert(key.into(), value);
    }

    /// Typed read of a parameter. Returns `None` when the key is missing or
    /// holds a value of another type.
    #[must_use]
    pub fn param<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = self.param_value(key)?;
        match value.downcast::<T>() {
            Ok(typed) => Some(typed),
            Err(_) => {
                debug!(key, expected = std::any::type_name::<T>(), "parameter has another type");
                None
            }
        }
    }

    #[must_use]
    pub fn param_value(&self, key: &str) -> Option<ParamValue> {
        let value = self.params.get(key).map(|entry| Arc::clone(entry.value()));
        if value.is_none() {
            debug!(key, "parameter not set");
        }
        value
    }

    #[must_use]
    pub fn contains_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn remove_param(&self, key: &str) -> Option<ParamValue> {
        self.params.remove(key).map(|(_, value)| value)
    }

    #[must_use]
    pub fn param_keys(&self) -> Vec<String> {
        self.params.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Shallow copy of the parameters for use as a compensation snapshot.
    ///
    /// The copy keeps the registry name and rollback policy but starts
    /// running, with an empty compensation stack and audit log.
    #[must_use]
    pub fn snapshot(&self) -> HookContext {
        HookContext {
            params: self
                .params
                .iter()
                .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                .collect(),
            registry: self.registry.clone(),
            rollback_policy: self.rollback_policy,
            ..HookContext::default()
        }
    }

    /// Abort with a failure: roll back every completed compensating hook,
    /// most recent first, then mark the context aborted with `error`.
    ///
    /// Rollback finishes before [`is_aborted`](Self::is_aborted) reports
    /// `true`. A context stopped with [`abort_ok`](Self::abort_ok) is turned
    /// into a failure and rolled back. Once a context has failed, later
    /// failures are ignored, so rollback runs at most once.
    ///
    /// # Panics
    ///
    /// Under [`RollbackPolicy::Unguarded`] a panicking compensation is
    /// recorded in [`compensation_failures`](Self::compensation_failures),
    /// the context is marked failed, and the panic is resumed.
    pub fn abort_with_error(&self, error: HookError) {
        {
            let mut state = self.state.lock();
            match *state {
                Termination::Running | Termination::AbortedOk => {
                    *state = Termination::RollingBack;
                }
                Termination::RollingBack | Termination::AbortedErr(_) => {
                    debug!(%error, "context already failed, ignoring abort");
                    return;
                }
            }
        }

        let stack = std::mem::take(&mut *self.compensations.lock());
        match stack.run_rollback(self.rollback_policy, &self.audit) {
            Ok(failures) => {
                self.compensation_failures.lock().extend(failures);
                warn!(%error, "hook chain aborted with error");
                *self.state.lock() = Termination::AbortedErr(error);
            }
            Err(RollbackPanic { failures, payload }) => {
                self.compensation_failures.lock().extend(failures);
                warn!(%error, "hook chain aborted with error, rollback panicked");
                *self.state.lock() = Termination::AbortedErr(error);
                self.rollback_panicked.store(true, Ordering::SeqCst);
                panic::resume_unwind(payload);
            }
        }
    }

    /// Stop successfully. Completed hooks are kept, nothing is rolled back.
    ///
    /// Has no effect on a context that is already stopped or failed.
    pub fn abort_ok(&self) {
        let mut state = self.state.lock();
        if matches!(*state, Termination::Running) {
            *state = Termination::AbortedOk;
            debug!("hook chain stopped");
        } else {
            debug!("context already terminated, ignoring abort");
        }
    }

    /// Store `value` under `key`, then abort with `error`.
    pub fn abort_with_result<T>(&self, error: HookError, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.set_param(key, value);
        self.abort_with_error(error);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(
            *self.state.lock(),
            Termination::AbortedOk | Termination::AbortedErr(_)
        )
    }

    #[must_use]
    pub fn is_aborted_with_error(&self) -> bool {
        matches!(*self.state.lock(), Termination::AbortedErr(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<HookError> {
        match &*self.state.lock() {
            Termination::AbortedErr(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// `true` unless the context was aborted with an error.
    #[must_use]
    pub fn ok(&self) -> bool {
        !self.is_aborted_with_error()
    }

    /// Audit log of every hook run and compensation against this context.
    #[must_use]
    pub fn audit(&self) -> HookAuditLog {
        self.audit.lock().clone()
    }

    /// Compensations that failed during rollback.
    #[must_use]
    pub fn compensation_failures(&self) -> Vec<CompensationError> {
        self.compensation_failures.lock().clone()
    }

    /// Number of completed hooks that would be compensated on a failure.
    #[must_use]
    pub fn pending_compensations(&self) -> usize {
        self.compensations.lock().len()
    }

    /// Dispatch treats a context that is rolling back as already terminated.
    pub(crate) fn is_terminated(&self) -> bool {
        !matches!(*self.state.lock(), Termination::Running)
    }

    /// Clears and returns whether the last rollback was cut short by an
    /// unguarded compensation panic.
    pub(crate) fn take_rollback_panic(&self) -> bool {
        self.rollback_panicked.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn push_compensation(&self, entry: CompensationEntry) {
        self.compensations.lock().push(entry);
    }

    pub(crate) fn record_start(&self, label: HandlerLabel) -> usize {
        self.audit.lock().record_start(label)
    }

    pub(crate) fn record_finish(&self, record: usize, status: HookStatus) {
        self.audit.lock().record_finish(record, status);
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("params", &self.param_keys())
            .field("registry", &self.registry)
            .field("rollback_policy", &self.rollback_policy)
            .field("state", &*self.state.lock())
            .field("pending_compensations", &self.pending_compensations())
            .finish_non_exhaustive()
    }
}
