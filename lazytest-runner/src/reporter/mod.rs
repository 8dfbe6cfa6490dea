// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live aggregation of test results.
//!
//! The main type here is [`RunAggregator`], which turns the target-tagged
//! event stream of one run into per-target suite/test trees and finally an
//! [`AggregatedRun`].

mod aggregator;
mod tree;

pub use aggregator::*;
pub use tree::*;
