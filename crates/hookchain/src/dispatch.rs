use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use crate::audit::HookStatus;
use crate::context::HookContext;
use crate::error::{HookError, panic_message};
use crate::key::HookKey;
use crate::registry::{HookRegistry, Hooks};
use crate::rollback::CompensationEntry;

enum Outcome {
    Returned,
    Failed,
    Panicked,
}

impl HookRegistry {
    /// Run every hook registered under `key` against `ctx`, in registration order.
    ///
    /// Does nothing if `ctx` is already terminated or no hook is registered.
    /// A hook that returns an error or panics aborts `ctx` with that failure,
    /// which rolls back the compensating hooks completed so far. The chain
    /// stops at the first hook after which `ctx` is aborted. Results are read
    /// from the context afterwards; nothing is returned.
    ///
    /// # Panics
    ///
    /// Hook panics never escape. Under [`RollbackPolicy::Unguarded`] a
    /// compensation panic escapes, whether the rollback was started by a
    /// returned error or by the hook calling
    /// [`HookContext::abort_with_error`] itself.
    ///
    /// [`RollbackPolicy::Unguarded`]: crate::RollbackPolicy::Unguarded
    pub fn dispatch(&self, key: &HookKey, ctx: &HookContext) {
        if ctx.is_terminated() {
            debug!(%key, "context already terminated, skipping dispatch");
            return;
        }
        let Some(chain) = self.chain(key) else {
            debug!(registry = %self.name(), %key, "no hooks registered");
            return;
        };

        let _span = debug_span!("dispatch", registry = %self.name(), %key).entered();

        for (position, handler) in chain.handlers().iter().enumerate() {
            let label = handler.label(key, position);
            let record = ctx.record_start(label.clone());

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler.run(ctx))) {
                Ok(Ok(())) => Outcome::Returned,
                Ok(Err(error)) => {
                    ctx.record_finish(record, HookStatus::Failed);
                    ctx.abort_with_error(error);
                    Outcome::Failed
                }
                Err(payload) if ctx.take_rollback_panic() => {
                    ctx.record_finish(record, HookStatus::Failed);
                    warn!(hook = %label, "compensation panicked during rollback");
                    panic::resume_unwind(payload);
                }
                Err(payload) => {
                    let error = HookError::Panicked {
                        label: label.clone(),
                        message: panic_message(payload.as_ref()),
                    };
                    warn!(hook = %label, %error, "hook panicked");
                    ctx.abort_with_error(error);
                    Outcome::Panicked
                }
            };

            if ctx.is_terminated() {
                let status = match outcome {
                    Outcome::Panicked => HookStatus::Panicked,
                    Outcome::Failed => HookStatus::Failed,
                    Outcome::Returned if ctx.is_aborted_with_error() => HookStatus::Failed,
                    Outcome::Returned => HookStatus::Stopped,
                };
                ctx.record_finish(record, status);
                debug!(hook = %label, "hook stopped the chain");
                break;
            }

            ctx.record_finish(record, HookStatus::Completed);
            debug!(hook = %label, "hook completed");

            if let Some(compensator) = handler.compensator() {
                ctx.push_compensation(CompensationEntry::new(
                    Arc::clone(compensator),
                    label,
                    ctx.snapshot(),
                    record,
                ));
            }
        }
    }
}

impl Hooks {
    /// Dispatch `key` against the registry `ctx` names, or the default registry.
    ///
    /// See [`HookRegistry::dispatch`]. A registry that was never registered
    /// into behaves like one with no hooks.
    pub fn dispatch(&self, key: &HookKey, ctx: &HookContext) {
        match self.existing(ctx.registry_name()) {
            Some(registry) => registry.dispatch(key, ctx),
            None => debug!(
                registry = ctx.registry_name().unwrap_or(self.config().default_registry()),
                %key,
                "registry does not exist"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::Handler;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        Handler::from_fn(move |_| {
            log.lock().expect("lock").push(name.to_string());
            Ok(())
        })
        .with_name(name)
    }

    #[test]
    fn runs_hooks_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = HookRegistry::new("default");
        let key = HookKey::from("bird");
        registry.register(&key, recording(&log, "a"));
        registry.register(&key, recording(&log, "b"));
        registry.register(&key, recording(&log, "c"));

        let ctx = HookContext::new();
        registry.dispatch(&key, &ctx);

        assert_eq!(*log.lock().expect("lock"), vec!["a", "b", "c"]);
        assert!(!ctx.is_aborted());
    }

    #[test]
    fn returned_error_aborts_and_marks_failed() {
        let registry = HookRegistry::new("default");
        let key = HookKey::from("bird");
        registry.register(&key, Handler::from_fn(|_| Err(HookError::msg("nope"))));

        let ctx = HookContext::new();
        registry.dispatch(&key, &ctx);

        assert!(ctx.is_aborted_with_error());
        assert_eq!(ctx.error().map(|e| e.to_string()).as_deref(), Some("nope"));
        assert_eq!(ctx.audit().records()[0].status, HookStatus::Failed);
    }

    #[test]
    fn panic_is_converted_into_failure() {
        let registry = HookRegistry::new("default");
        let key = HookKey::from("bird");
        registry.register(
            &key,
            Handler::from_fn(|_| panic!("kaboom")).with_name("exploder"),
        );

        let ctx = HookContext::new();
        registry.dispatch(&key, &ctx);

        let error = ctx.error().expect("error recorded");
        assert!(error.is_panic());
        assert_eq!(error.to_string(), "hook [bird->exploder][0] panicked: kaboom");
        assert_eq!(ctx.audit().records()[0].status, HookStatus::Panicked);
    }

    #[test]
    fn abort_ok_is_recorded_as_stopped() {
        let registry = HookRegistry::new("default");
        let key = HookKey::from("bird");
        registry.register(
            &key,
            Handler::from_fn(|ctx| {
                ctx.abort_ok();
                Ok(())
            }),
        );

        let ctx = HookContext::new();
        registry.dispatch(&key, &ctx);

        assert!(ctx.is_aborted());
        assert!(ctx.ok());
        assert_eq!(ctx.audit().records()[0].status, HookStatus::Stopped);
    }

    #[test]
    fn hooks_dispatch_ignores_missing_registry() {
        let hooks = Hooks::new();
        let ctx = HookContext::new().with_registry("nowhere");
        hooks.dispatch(&HookKey::from("bird"), &ctx);

        assert!(!ctx.is_aborted());
        assert!(hooks.registry_names().is_empty());
    }

    #[test]
    fn hook_may_register_while_running() {
        let registry = Arc::new(HookRegistry::new("default"));
        let key = HookKey::from("bird");
        let inner = Arc::clone(&registry);
        let inner_key = key.clone();
        registry.register(
            &key,
            Handler::from_fn(move |_| {
                inner.register(&inner_key, Handler::from_fn(|_| Ok(())));
                Ok(())
            }),
        );

        let ctx = HookContext::new();
        registry.dispatch(&key, &ctx);

        assert_eq!(ctx.audit().records().len(), 1);
        assert_eq!(registry.chain(&key).map(|c| c.len()), Some(2));
    }
}
