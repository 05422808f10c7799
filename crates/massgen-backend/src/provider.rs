// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The consumed Backend Adapter contract: an Agent Runtime
/// drives exactly one `BackendSession` per agent for the life of a turn.
/// Concrete provider drivers (Anthropic, OpenAI, ...) are out of scope —
/// this crate ships the trait, the wire types, and a deterministic mock
/// for tests.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Human-readable backend name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
