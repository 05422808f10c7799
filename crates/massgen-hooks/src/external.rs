// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use massgen_types::{HookEvent, HookResult, ToolDecision};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Run an external-command hook: the event is written as JSON on the
/// child's stdin, the child's stdout is parsed as a `HookResult`. Wrapped
/// in `tokio::time::timeout` the same way any subprocess-backed tool call
/// bounds its own child process.
pub async fn run_external_hook(
    command: &Path,
    event: &HookEvent,
    timeout: Duration,
    fail_closed: bool,
) -> HookResult {
    match tokio::time::timeout(timeout, invoke(command, event)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!(command = %command.display(), error = %err, "hook command failed");
            closed_or_open(fail_closed, format!("hook command failed: {err}"))
        }
        Err(_) => {
            warn!(command = %command.display(), timeout_ms = %timeout.as_millis(), "hook command timed out");
            closed_or_open(fail_closed, "hook command timed out".to_string())
        }
    }
}

fn closed_or_open(fail_closed: bool, reason: String) -> HookResult {
    if fail_closed {
        HookResult::deny(reason)
    } else {
        debug!(reason = %reason, "hook failure treated as fail-open, allowing tool call");
        HookResult::allow()
    }
}

async fn invoke(command: &Path, event: &HookEvent) -> anyhow::Result<HookResult> {
    let payload = serde_json::to_vec(event).context("serializing hook event")?;
    let event_type = serde_json::to_value(event.event_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut child = Command::new(command)
        .env("MASSGEN_TOOL_NAME", &event.tool_name)
        .env("MASSGEN_EVENT_TYPE", event_type)
        .env("MASSGEN_SESSION_ID", event.session_id.to_string())
        .env("MASSGEN_AGENT_ID", event.agent_id.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning hook command {}", command.display()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&payload)
            .await
            .context("writing hook event to child stdin")?;
    }

    let output = child
        .wait_with_output()
        .await
        .context("waiting for hook command")?;

    if !output.status.success() {
        anyhow::bail!(
            "hook command exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let result: HookResult =
        serde_json::from_slice(&output.stdout).context("parsing hook command stdout")?;
    Ok(result)
}
