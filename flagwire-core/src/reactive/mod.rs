//! Reactive Primitives
//!
//! This module implements the reactive system the flag state is built on:
//! signals, memos, and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal is written, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects push reactive state into external systems: provider
//! context, mounted views.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a cell is read, we check if there is an active
//! tracking context and, if so, register the dependency.

mod cell;
mod context;
mod effect;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use cell::ReadCell;
pub use context::{ReactiveContext, TrackedFrame};
pub use effect::Effect;
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::{ReadSignal, Signal};
pub use subscriber::{Subscriber, SubscriberId};
