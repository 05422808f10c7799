// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_novelty_threshold() -> f32 {
    0.70
}

fn default_initial_round_timeout_secs() -> u64 {
    120
}

fn default_subsequent_round_timeout_secs() -> u64 {
    300
}

fn default_round_grace_secs() -> u64 {
    30
}

fn default_max_restarts_per_agent() -> u32 {
    2
}

fn default_hook_timeout_ms() -> u64 {
    5_000
}

fn default_max_subagent_depth() -> u32 {
    3
}

fn default_max_subagent_concurrency() -> u32 {
    4
}

fn default_subagent_timeout_secs() -> u64 {
    600
}

fn default_min_subagent_timeout_secs() -> u64 {
    10
}

fn default_max_subagent_timeout_secs() -> u64 {
    3_600
}

fn default_max_new_answers_per_agent() -> u32 {
    3
}

/// A turn's tunable knobs: everything the Orchestrator, Hook Manager and
/// Subagent Gateway read before or during a run. This is deliberately a
/// small, flat config — the full YAML/CLI configuration system end users
/// interact with is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(default)]
    pub novelty: NoveltyConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub restarts: RestartConfig,
    #[serde(default)]
    pub hooks: HookConfig,
    #[serde(default)]
    pub subagents: SubagentConfig,
    #[serde(default)]
    pub answers: AnswerConfig,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            novelty: NoveltyConfig::default(),
            timeouts: TimeoutConfig::default(),
            restarts: RestartConfig::default(),
            hooks: HookConfig::default(),
            subagents: SubagentConfig::default(),
            answers: AnswerConfig::default(),
        }
    }
}

/// How strict the token-overlap novelty check is before a new answer is
/// accepted. Mirrors the three named presets (lenient/balanced/strict); `threshold` is the
/// Jaccard similarity ceiling above which an answer is rejected as
/// non-novel. `None` (lenient) is represented as `f32::INFINITY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyConfig {
    #[serde(default = "default_novelty_threshold")]
    pub threshold: f32,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            threshold: default_novelty_threshold(),
        }
    }
}

/// Round-timeout behavior. The first round (exploration, before any
/// agent has answered or voted) gets a shorter fuse than every round
/// after it, since a cold start with no peer context yet should not be
/// allowed to stall as long as a convergence round waiting on a holdout
/// voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_initial_round_timeout_secs")]
    pub initial_round_timeout_secs: u64,
    #[serde(default = "default_subsequent_round_timeout_secs")]
    pub subsequent_round_timeout_secs: u64,
    /// Grace period after the round timeout fires before the Orchestrator
    /// forcibly selects a winner from whatever answers exist.
    #[serde(default = "default_round_grace_secs")]
    pub round_grace_secs: u64,
}

impl TimeoutConfig {
    /// The timeout to arm for the Nth round (0-indexed): the initial
    /// timeout for the first round, the subsequent timeout for every
    /// round after.
    pub fn timeout_for_round(&self, round_index: u32) -> std::time::Duration {
        let secs = if round_index == 0 {
            self.initial_round_timeout_secs
        } else {
            self.subsequent_round_timeout_secs
        };
        std::time::Duration::from_secs(secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initial_round_timeout_secs: default_initial_round_timeout_secs(),
            subsequent_round_timeout_secs: default_subsequent_round_timeout_secs(),
            round_grace_secs: default_round_grace_secs(),
        }
    }
}

/// Restart budget per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default = "default_max_restarts_per_agent")]
    pub max_restarts_per_agent: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts_per_agent: default_max_restarts_per_agent(),
        }
    }
}

/// Default timeout applied to a hook invocation when its registration
/// does not override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default = "default_hook_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_hook_timeout_ms(),
        }
    }
}

/// Bounds enforced by the Subagent Gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentConfig {
    #[serde(default = "default_max_subagent_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_subagent_concurrency")]
    pub max_concurrency: u32,
    /// Requested per-child timeout before clamping.
    #[serde(default = "default_subagent_timeout_secs")]
    pub timeout_secs: u64,
    /// Floor a requested timeout is clamped to.
    #[serde(default = "default_min_subagent_timeout_secs")]
    pub min_timeout_secs: u64,
    /// Ceiling a requested timeout is clamped to.
    #[serde(default = "default_max_subagent_timeout_secs")]
    pub max_timeout_secs: u64,
}

impl SubagentConfig {
    /// Clamp a caller-requested timeout into `[min_timeout_secs, max_timeout_secs]`.
    pub fn clamp_timeout(&self, requested_secs: u64) -> u64 {
        requested_secs.clamp(self.min_timeout_secs, self.max_timeout_secs)
    }
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_subagent_depth(),
            max_concurrency: default_max_subagent_concurrency(),
            timeout_secs: default_subagent_timeout_secs(),
            min_timeout_secs: default_min_subagent_timeout_secs(),
            max_timeout_secs: default_max_subagent_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod subagent_config_tests {
    use super::*;

    #[test]
    fn clamp_timeout_floors_below_minimum() {
        let config = SubagentConfig::default();
        assert_eq!(config.clamp_timeout(1), config.min_timeout_secs);
    }

    #[test]
    fn clamp_timeout_ceils_above_maximum() {
        let config = SubagentConfig::default();
        assert_eq!(config.clamp_timeout(999_999), config.max_timeout_secs);
    }

    #[test]
    fn clamp_timeout_passes_through_in_range() {
        let config = SubagentConfig::default();
        assert_eq!(config.clamp_timeout(120), 120);
    }
}

/// Per-agent cap on `new_answer` submissions within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    #[serde(default = "default_max_new_answers_per_agent")]
    pub max_new_answers_per_agent: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_new_answers_per_agent: default_max_new_answers_per_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_balanced_novelty_preset() {
        let config = TurnConfig::default();
        assert_eq!(config.novelty.threshold, 0.70);
        assert_eq!(config.restarts.max_restarts_per_agent, 2);
        assert_eq!(config.subagents.max_depth, 3);
    }
}
