// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run tests across several test frameworks at once.
//!
//! Targets are configured in `.lazytest.toml`; see
//! [`lazytest_runner::config`] for the format.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
