// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running targets.
//!
//! [`TargetExecutor`] starts one worker per [`TargetPlan`] and returns a
//! [`RunHandle`] that yields the tagged events of that run. [`RunSession`]
//! sits on top of it: it owns the aggregator for the current run and keeps
//! draining superseded runs until all of their workers are done.
//! [`SessionRunner`] wraps a session in its own runtime, with signal handling,
//! for non-interactive use.

mod command;
mod executor;
mod imp;
mod session;

pub use command::*;
pub use imp::*;
pub use session::*;
