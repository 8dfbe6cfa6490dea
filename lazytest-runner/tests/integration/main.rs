// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

// The fixture targets replay captured output with `cat`.
#![cfg(unix)]

mod fixtures;
mod run;
