//! Time-delay primitives for Cadence
//!
//! This crate provides:
//! - Debounce (single trailing invocation after a quiet period)
//! - Throttle (at most one invocation per interval, trailing call preserved)
//! - Debounce with max wait (optional leading fire, forced periodic fire)
//! - Cancellable timer handles on the Tokio clock
//!
//! Every primitive owns its timer and its last-seen arguments. Operations
//! are plain `Fn(A)` side effects; anything asynchronous should be spawned
//! from inside the operation.
//!
//! Timers are Tokio tasks, so all primitives must be triggered from within
//! a Tokio runtime.

pub mod debounce;
pub mod max_wait;
pub mod throttle;
pub mod timer;

pub use debounce::{debounce, Debounced};
pub use max_wait::{debounce_with_max_wait, MaxWaitDebounced, MaxWaitOptions};
pub use throttle::{throttle, Throttled};
pub use timer::Timer;

use std::sync::Weak;

/// Stop future scheduling without touching work that already started
///
/// Implemented by every primitive so that an owner (such as a UI session)
/// can hold heterogeneous primitives and tear them all down at once. This is
/// cheap and synchronous; it is not cooperative cancellation of an operation
/// that is already running.
pub trait Unschedule: Send + Sync {
    /// Drop pending arguments and cancel every scheduled timer
    fn unschedule(&self);

    /// Whether an invocation is currently scheduled
    fn is_scheduled(&self) -> bool;
}

/// Primitive an owner can track without keeping it alive
///
/// The weak handle dies with the primitive's last clone, at which point
/// its timers are already cancelled.
pub trait Downgrade: Unschedule {
    fn downgrade(&self) -> Weak<dyn Unschedule>;
}

/// Operation invoked by a primitive
pub(crate) type Operation<A> = Box<dyn Fn(A) + Send + Sync>;
