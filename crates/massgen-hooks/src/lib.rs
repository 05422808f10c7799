// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Hook Manager: registration, glob matching against tool names,
//! ordered execution with deny short-circuit, inject-payload aggregation,
//! and the external-command hook protocol.

mod external;
mod manager;
mod matcher;

pub use external::run_external_hook;
pub use manager::{HookManager, HookOutcome, InProcessHandler};
pub use matcher::{glob_to_regex, matches};
