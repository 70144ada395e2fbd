use std::fmt;
use std::sync::Arc;

use crate::context::HookContext;
use crate::error::HookError;
use crate::key::HookKey;

/// The run capability every registered hook provides.
///
/// A hook reads and writes the context's parameters and may terminate the
/// chain through one of the context's abort operations. Returning `Err` is
/// the same as calling [`HookContext::abort_with_error`] with that error.
/// Hooks must not retain the context beyond the call.
pub trait Hook: Send + Sync {
    /// Name used in diagnostics. Unnamed hooks are labelled by position.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Run the hook against the live context.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the chain and roll back completed hooks.
    fn run(&self, ctx: &HookContext) -> Result<(), HookError>;
}

/// The optional compensate capability.
///
/// Invoked during rollback with the snapshot taken right after this hook's
/// `run` completed, never with the live context.
pub trait Compensate: Send + Sync {
    /// Undo the hook's effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the compensation could not be completed. The
    /// failure is recorded and the remaining compensations still run.
    fn compensate(&self, snapshot: &HookContext) -> Result<(), HookError>;
}

/// A registered hook: its run capability plus optional compensation and name.
///
/// Clones share the underlying hook instance, so registering a clone twice
/// under one key runs the same instance twice.
#[derive(Clone)]
pub struct Handler {
    name: Option<Arc<str>>,
    hook: Arc<dyn Hook>,
    compensator: Option<Arc<dyn Compensate>>,
}

impl Handler {
    /// Wrap a hook that has nothing to undo.
    #[must_use]
    pub fn new<H>(hook: H) -> Self
    where
        H: Hook + 'static,
    {
        Self {
            name: None,
            hook: Arc::new(hook),
            compensator: None,
        }
    }

    /// Wrap a hook that also compensates. Run and compensation share one instance.
    #[must_use]
    pub fn compensating<H>(hook: H) -> Self
    where
        H: Hook + Compensate + 'static,
    {
        let hook = Arc::new(hook);
        let run: Arc<dyn Hook> = hook.clone();
        Self {
            name: None,
            hook: run,
            compensator: Some(hook),
        }
    }

    /// Build a handler from a closure.
    #[must_use]
    pub fn from_fn<F>(run: F) -> Self
    where
        F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Self::new(FnHook(run))
    }

    /// Attach a compensation closure, replacing any existing compensation.
    #[must_use]
    pub fn with_compensation<F>(mut self, compensate: F) -> Self
    where
        F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.compensator = Some(Arc::new(FnCompensate(compensate)));
        self
    }

    /// Override the diagnostic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().or_else(|| self.hook.name())
    }

    #[must_use]
    pub fn compensates(&self) -> bool {
        self.compensator.is_some()
    }

    pub(crate) fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        self.hook.run(ctx)
    }

    pub(crate) fn compensator(&self) -> Option<&Arc<dyn Compensate>> {
        self.compensator.as_ref()
    }

    pub(crate) fn label(&self, key: &HookKey, position: usize) -> HandlerLabel {
        HandlerLabel::new(key.clone(), self.name().map(Arc::from), position)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("compensates", &self.compensates())
            .finish_non_exhaustive()
    }
}

struct FnHook<F>(F);

impl<F> Hook for FnHook<F>
where
    F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync,
{
    fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        (self.0)(ctx)
    }
}

struct FnCompensate<F>(F);

impl<F> Compensate for FnCompensate<F>
where
    F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync,
{
    fn compensate(&self, snapshot: &HookContext) -> Result<(), HookError> {
        (self.0)(snapshot)
    }
}

/// Identifies one hook invocation in diagnostics: key, optional name and
/// position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerLabel {
    key: HookKey,
    name: Option<Arc<str>>,
    position: usize,
}

impl HandlerLabel {
    #[must_use]
    pub fn new(key: HookKey, name: Option<Arc<str>>, position: usize) -> Self {
        Self {
            key,
            name,
            position,
        }
    }

    #[must_use]
    pub fn key(&self) -> &HookKey {
        &self.key
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for HandlerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}->{}][{}]",
            self.key,
            self.name.as_deref().unwrap_or_default(),
            self.position
        )
    }
}
