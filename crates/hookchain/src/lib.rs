//! Named, ordered hook chains with compensating rollback.
//!
//! Hooks are registered under a [`HookKey`] in a named registry. Dispatching
//! a key runs its hooks in registration order against a shared
//! [`HookContext`]. Any hook may stop the chain: [`HookContext::abort_ok`]
//! keeps the work done so far, while a failure (an error, a panic, or
//! [`HookContext::abort_with_error`]) compensates every completed
//! compensating hook in reverse order, each against the parameter snapshot
//! taken right after it ran.
//!
//! ```
//! use hookchain::{Handler, HookContext, HookError, HookKey, Hooks};
//!
//! let hooks = Hooks::new();
//! let reserve = HookKey::from("reserve");
//! hooks.register(
//!     &reserve,
//!     Handler::from_fn(|ctx| {
//!         ctx.set_param("reserved", true);
//!         Ok(())
//!     })
//!     .with_compensation(|_snapshot| Ok(()))
//!     .with_name("reserve stock"),
//! );
//!
//! let ctx = HookContext::new();
//! hooks.dispatch(&reserve, &ctx);
//! assert!(!ctx.is_aborted());
//!
//! ctx.abort_with_error(HookError::msg("payment declined"));
//! assert!(ctx.is_aborted_with_error());
//! ```

mod audit;
mod config;
mod context;
mod dispatch;
mod error;
mod handler;
mod key;
mod registry;
mod rollback;

pub use audit::{HookAuditLog, HookRecord, HookStatus};
pub use config::{DEFAULT_REGISTRY, EngineConfig, RollbackPolicy};
pub use context::{HookContext, ParamValue};
pub use error::{CompensationError, ConfigError, HookError};
pub use handler::{Compensate, Handler, HandlerLabel, Hook};
pub use key::HookKey;
pub use registry::{HookChain, HookRegistry, Hooks};
