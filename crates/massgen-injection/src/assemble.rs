// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use massgen_types::{AnswerKey, InjectStrategy};
use tracing::debug;

use crate::item::{InjectableItem, ItemKind};
use crate::InjectionContext;

const MAX_EXCERPT_CHARS: usize = 4_000;

/// Builds the content block injected into a recipient agent's running
/// session out of peer answers/votes it has not yet seen.
pub struct InjectionEngine {
    excerpt_limit: usize,
}

impl Default for InjectionEngine {
    fn default() -> Self {
        Self {
            excerpt_limit: MAX_EXCERPT_CHARS,
        }
    }
}

impl InjectionEngine {
    pub fn new(excerpt_limit: usize) -> Self {
        Self { excerpt_limit }
    }

    /// Filter `items` down to what `already_seen` has not observed yet,
    /// order them oldest-first, and render a single content block. Returns
    /// `None` when there is nothing new — the first call for a recipient
    /// with no peer activity yet is naturally suppressed this way, rather
    /// than injecting an empty block.
    ///
    /// `vote_only` restricts the block to `Vote` items, used once the turn
    /// has moved into convergence and new answers are no longer solicited.
    pub fn assemble(
        &self,
        already_seen: &HashSet<AnswerKey>,
        mut items: Vec<InjectableItem>,
        vote_only: bool,
    ) -> Option<String> {
        items.retain(|item| !already_seen.contains(&item.key));
        if vote_only {
            items.retain(|item| item.kind == ItemKind::Vote);
        }
        if items.is_empty() {
            return None;
        }
        items.sort_by_key(|item| item.timestamp);

        let mut block = String::new();
        for item in &items {
            let label = match item.kind {
                ItemKind::Answer => "answer",
                ItemKind::Vote => "vote",
            };
            let excerpt = truncate(&item.content, self.excerpt_limit);
            block.push_str(&format!(
                "--- {} from {} ---\n{}\n",
                label, item.source_anon_id, excerpt
            ));
        }

        debug!(items = items.len(), vote_only, "assembled injection block");
        Some(block)
    }

    /// Which delivery strategy applies given where the recipient currently
    /// is in its turn.
    pub fn strategy_for(&self, context: InjectionContext) -> InjectStrategy {
        match context {
            InjectionContext::AwaitingToolResult => InjectStrategy::ToolResult,
            InjectionContext::MidStream => InjectStrategy::UserMessage,
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &text[..cut])
}
