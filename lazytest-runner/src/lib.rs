// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for lazytest: a streaming test-execution engine that
//! runs several test frameworks ("targets") at once and aggregates their
//! results while they are still running.
//!
//! The basic flow is:
//!
//! 1. [`config::LazytestConfig`] turns configured targets and a list of files
//!    into [`runner::TargetPlan`]s.
//! 2. [`runner::TargetExecutor`] spawns one subprocess per plan and decodes
//!    its stdout with the [`decoder`] matching the target's dialect.
//! 3. Every decoded [`events::Event`] is tagged with its target and run and
//!    sent over a single channel.
//! 4. [`runner::RunSession`] consumes that channel and feeds a
//!    [`reporter::RunAggregator`], which builds the live suite/test tree and
//!    finally an [`reporter::AggregatedRun`].

pub mod config;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod reporter;
pub mod runner;
pub mod signal;
