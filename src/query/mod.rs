// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Query planning (C6), pattern cache integration (C7), and cross-tree
//! arbitration (C8).

pub mod arbiter;
pub mod condition;
pub mod dispatch;
pub mod executor;

#[cfg(feature = "async")]
pub mod executor_async;

pub use arbiter::choose_driver;
pub use condition::{Condition, Order, Predicate, Tag};
pub use executor::{LeafSource, Scan};

#[cfg(feature = "async")]
pub use executor_async::{AsyncLeafSource, AsyncScan};
