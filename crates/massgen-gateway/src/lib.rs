// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Subagent Gateway: a parent agent calls
//! `spawn_subagents` with a list of tasks; the gateway validates the
//! request, spawns one child orchestrator process per task, and — unless
//! running in async mode — blocks until every child completes or times
//! out, classifying each outcome from the child's Status document and
//! folding its costs into the parent's totals.
//!
//! There is no shared memory between parent and child: the only channel
//! is the subprocess's argv/env plus the Status document each child
//! writes under its own `subagents/<subagent_id>/` directory under
//! the turn's persisted state layout.

mod dispatch;
mod outcome;
mod request;
mod spawn;

pub use outcome::{SubagentOutcome, SubagentOutcomeKind};
pub use request::SubagentRequest;
pub use spawn::{SubagentGateway, SubagentHandle};
