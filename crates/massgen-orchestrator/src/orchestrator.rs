// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use massgen_agent::{
    coordination_system_prompt, AgentEvent, AgentRuntime, ConversationCheckpoint, CoordinationAction,
};
use massgen_backend::{BackendSession, Message};
use massgen_config::TurnConfig;
use massgen_hooks::HookManager;
use massgen_injection::{InjectableItem, InjectionContext, InjectionEngine, ItemKind};
use massgen_types::{
    AgentId, AgentRecord, AgentState, AgentStatus, Answer, AnswerKey, AnonymizedId, CostAggregate,
    InjectStrategy, Phase, Snapshot, TurnId, TurnStatus, Vote, WorkspaceRecord,
};
use massgen_workspace::{PermissionManager, WorkspaceManager};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::acceptance::{validate_answer, validate_vote};
use crate::consensus::{has_strict_plurality, plurality_winner, AnswerRef};
use crate::novelty::{tokenize, NoveltyMetric, TokenOverlapMetric};
use crate::status::{completion_percentage, StatusWriter};

/// Abstraction the Orchestrator dispatches `spawn_subagents` requests
/// through. A concrete implementation backed by the Subagent Gateway is
/// wired in by the root binary; the Orchestrator itself never depends on
/// how subagents are actually spawned.
#[async_trait]
pub trait SubagentDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        agent_id: AgentId,
        tasks: Vec<String>,
    ) -> anyhow::Result<(Vec<String>, CostAggregate)>;
}

/// A dispatcher that rejects every request, used when subagents are
/// disabled for a turn.
pub struct NoSubagents;

#[async_trait]
impl SubagentDispatcher for NoSubagents {
    async fn dispatch(
        &self,
        _agent_id: AgentId,
        _tasks: Vec<String>,
    ) -> anyhow::Result<(Vec<String>, CostAggregate)> {
        anyhow::bail!("subagents are not enabled for this turn")
    }
}

struct RunningAgent {
    cancel: Option<oneshot::Sender<()>>,
    inject: mpsc::Sender<(String, InjectStrategy)>,
    join: tokio::task::JoinHandle<()>,
    backend: Arc<dyn BackendSession>,
    checkpoint: ConversationCheckpoint,
}

/// Drives one turn to completion: exploration, convergence, presentation.
/// Owns every piece of turn-scoped state; agents never touch it directly,
/// only through the `AgentEvent` stream each `AgentRuntime` reports over.
pub struct Orchestrator {
    turn_id: TurnId,
    config: TurnConfig,
    hooks: Arc<HookManager>,
    injection: InjectionEngine,
    novelty: Arc<dyn NoveltyMetric>,
    dispatcher: Arc<dyn SubagentDispatcher>,
    status_writer: Arc<StatusWriter>,
    workspace: Arc<WorkspaceManager>,
    permissions: Arc<PermissionManager>,

    records: HashMap<AgentId, AgentRecord>,
    anonymized_ids: HashMap<AgentId, AnonymizedId>,
    answers: HashMap<AnswerKey, Answer>,
    votes: HashMap<AgentId, Vote>,
    workspaces: HashMap<AgentId, WorkspaceRecord>,
    snapshots: HashMap<AnswerKey, Snapshot>,
    status: Arc<RwLock<TurnStatus>>,
    subagent_refs: Vec<String>,
    subagent_cost: CostAggregate,
}

impl Orchestrator {
    pub fn new(
        config: TurnConfig,
        hooks: Arc<HookManager>,
        dispatcher: Arc<dyn SubagentDispatcher>,
        status_writer: Arc<StatusWriter>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            turn_id: TurnId::new(),
            config,
            hooks,
            injection: InjectionEngine::default(),
            novelty: Arc::new(TokenOverlapMetric),
            dispatcher,
            status_writer,
            workspace: Arc::new(WorkspaceManager::new(workspace_root.into())),
            permissions: Arc::new(PermissionManager::new()),
            records: HashMap::new(),
            anonymized_ids: HashMap::new(),
            answers: HashMap::new(),
            votes: HashMap::new(),
            workspaces: HashMap::new(),
            snapshots: HashMap::new(),
            status: Arc::new(RwLock::new(TurnStatus::new(Utc::now()))),
            subagent_refs: Vec::new(),
            subagent_cost: CostAggregate::default(),
        }
    }

    /// Run one turn to completion against the given set of agent backends,
    /// in join order (join order fixes anonymized id assignment). Returns
    /// the final Status document.
    #[instrument(skip(self, backends))]
    pub async fn run_turn(
        &mut self,
        backends: Vec<(AgentId, Arc<dyn BackendSession>)>,
    ) -> anyhow::Result<TurnStatus> {
        let total_agents = backends.len();
        for (index, (agent_id, _)) in backends.iter().enumerate() {
            let anon = AnonymizedId::for_index(index);
            self.records.insert(*agent_id, AgentRecord::new(*agent_id, anon.clone()));
            self.anonymized_ids.insert(*agent_id, anon);
        }

        let (event_tx, mut event_rx) = mpsc::channel::<(AgentId, AgentEvent)>(256);
        let mut running: HashMap<AgentId, RunningAgent> = HashMap::new();

        for (agent_id, backend) in backends {
            let workspace = self
                .workspace
                .ensure_workspace(agent_id)
                .await
                .unwrap_or_else(|_| WorkspaceRecord::new(agent_id, self.workspace.root().join(agent_id.to_string())));
            self.permissions
                .add_turn_context_path(
                    agent_id,
                    workspace.root_path.clone(),
                    massgen_types::PermissionLevel::Write,
                )
                .await;
            self.workspaces.insert(agent_id, workspace);

            self.set_state(agent_id, AgentState::Working);
            self.spawn_agent(agent_id, backend, None, event_tx.clone(), &mut running)
                .await;
        }

        self.write_status().await;
        let heartbeat = self
            .status_writer
            .clone()
            .spawn_heartbeat(self.status.clone());

        let grace = Duration::from_secs(self.config.timeouts.round_grace_secs);
        let mut round_index = 0u32;

        loop {
            if running.is_empty() {
                break;
            }
            let round_timeout = self.config.timeouts.timeout_for_round(round_index);
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    round_index += 1;
                    match maybe_event {
                        Some((agent_id, event)) => {
                            self.handle_event(agent_id, event, total_agents, event_tx.clone(), &mut running).await;
                            if self.maybe_declare_winner(total_agents).await {
                                self.cancel_all(&mut running, grace).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(round_timeout) => {
                    warn!("round timeout elapsed, forcing a winner from current state");
                    self.force_winner_on_timeout(total_agents).await;
                    self.cancel_all(&mut running, grace).await;
                }
            }
        }

        heartbeat.abort();
        {
            let mut status = self.status.write().await;
            status.phase = Phase::Presentation;
            status.updated_at = Utc::now();
        }
        self.write_status().await;
        Ok(self.status.read().await.clone())
    }

    async fn spawn_agent(
        &self,
        agent_id: AgentId,
        backend: Arc<dyn BackendSession>,
        initial_messages: Option<Vec<Message>>,
        event_tx: mpsc::Sender<(AgentId, AgentEvent)>,
        running: &mut HashMap<AgentId, RunningAgent>,
    ) {
        let anon = self.anonymized_ids[&agent_id].clone();
        let prompt = coordination_system_prompt(&anon, self.records.len().max(1));
        let checkpoint: ConversationCheckpoint = Arc::new(Mutex::new(Vec::new()));
        let mut runtime = AgentRuntime::new(
            agent_id,
            self.turn_id,
            backend.clone(),
            self.hooks.clone(),
            64_000,
            40,
            prompt,
        )
        .with_checkpoint(checkpoint.clone());
        if let Some(messages) = initial_messages {
            runtime.session_mut().replace_messages(messages);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (inject_tx, inject_rx) = mpsc::channel(32);
        let (tx, mut rx) = mpsc::channel(64);

        let join = tokio::spawn(async move {
            let _ = runtime.run_turn(tx, cancel_rx, inject_rx).await;
        });
        let forward_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if forward_tx.send((agent_id, event)).await.is_err() {
                    break;
                }
            }
        });

        running.insert(
            agent_id,
            RunningAgent {
                cancel: Some(cancel_tx),
                inject: inject_tx,
                join,
                backend,
                checkpoint,
            },
        );
    }

    /// Cancel `agent_id`'s current runtime and respawn it from its last
    /// checkpointed conversation plus `note`, bounded by
    /// `TurnConfig::max_restarts_per_agent`. Used when a recipient cannot
    /// be reached via the normal injection channel — it has already
    /// answered and moved into vote-only mode, where new candidates
    /// require a refreshed `vote` tool schema rather than a mid-stream
    /// message.
    async fn restart_agent(
        &mut self,
        agent_id: AgentId,
        note: String,
        event_tx: mpsc::Sender<(AgentId, AgentEvent)>,
        running: &mut HashMap<AgentId, RunningAgent>,
    ) {
        let restarts_used = self.records.get(&agent_id).map(|r| r.restarts_used).unwrap_or(0);
        if restarts_used >= self.config.restarts.max_restarts_per_agent {
            warn!(agent = %agent_id, "restart budget exhausted, leaving agent as-is");
            return;
        }
        let Some(old) = running.remove(&agent_id) else {
            return;
        };
        if let Some(cancel) = old.cancel {
            let _ = cancel.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), old.join).await;

        let mut messages = old.checkpoint.lock().await.clone();
        messages.push(Message::user(note));

        self.spawn_agent(agent_id, old.backend, Some(messages), event_tx, running)
            .await;
        if let Some(record) = self.records.get_mut(&agent_id) {
            record.restarts_used += 1;
            record.state = AgentState::Working;
        }
        info!(agent = %agent_id, restarts_used, "agent restarted with updated peer context");
    }

    async fn handle_event(
        &mut self,
        agent_id: AgentId,
        event: AgentEvent,
        total_agents: usize,
        event_tx: mpsc::Sender<(AgentId, AgentEvent)>,
        running: &mut HashMap<AgentId, RunningAgent>,
    ) {
        match event {
            AgentEvent::ToolCallStarted { action, .. } => match action {
                CoordinationAction::NewAnswer { text } => {
                    self.accept_answer(agent_id, text, running).await;
                }
                CoordinationAction::Vote { target_anon_id } => {
                    self.accept_vote(agent_id, target_anon_id, running).await;
                }
                CoordinationAction::SpawnSubagents { tasks } => {
                    self.run_subagents(agent_id, tasks).await;
                }
            },
            AgentEvent::TokenUsage {
                input,
                output,
                cache_read: _,
                cache_write: _,
            } => {
                if let Some(record) = self.records.get_mut(&agent_id) {
                    record.counters.tokens_in += input;
                    record.counters.tokens_out += output;
                }
            }
            AgentEvent::TurnComplete => {
                self.set_state(agent_id, AgentState::Completed);
                running.remove(&agent_id);
            }
            AgentEvent::Aborted { .. } => {
                self.set_state(agent_id, AgentState::Failed);
                running.remove(&agent_id);
            }
            AgentEvent::Error(reason) => {
                warn!(agent = %agent_id, reason, "agent reported an error");
            }
            AgentEvent::TextDelta(_) | AgentEvent::ToolCallFinished { .. } => {}
        }
        // Every natural pause in any agent's stream is an opportunity to
        // flush outstanding peer updates to whoever is still running,
        // generalized from one recipient at a time to the whole running set.
        self.flush_injections(running, event_tx).await;
        self.recompute_completion(total_agents).await;
        self.write_status().await;
    }

    async fn accept_answer(
        &mut self,
        agent_id: AgentId,
        text: String,
        running: &HashMap<AgentId, RunningAgent>,
    ) {
        let cap = self.config.answers.max_new_answers_per_agent;
        let threshold = self.config.novelty.threshold;
        let candidate_tokens = tokenize(&text);
        let existing_tokens: Vec<HashSet<String>> = self
            .answers
            .values()
            .filter(|a| a.agent_id != agent_id)
            .map(|a| a.token_overlap_fingerprint.clone())
            .collect();

        let record = match self.records.get(&agent_id) {
            Some(r) => r.clone(),
            None => return,
        };

        match validate_answer(
            &record,
            cap,
            self.novelty.as_ref(),
            &candidate_tokens,
            &existing_tokens,
            threshold,
        ) {
            Ok(()) => {
                let version = record.counters.new_answers_emitted + 1;
                let key = AnswerKey { agent_id, version };
                let mut answer = Answer {
                    agent_id,
                    version,
                    text,
                    workspace_snapshot_ref: None,
                    timestamp: Utc::now(),
                    token_overlap_fingerprint: candidate_tokens,
                };

                if let Some(workspace) = self.workspaces.get(&agent_id).cloned() {
                    match self.take_snapshot(&workspace, version).await {
                        Some(snapshot) => {
                            answer.workspace_snapshot_ref = Some(snapshot.snapshot_ref.clone());
                            self.snapshots.insert(key, snapshot);
                        }
                        None => {
                            info!(
                                agent = %agent_id,
                                version,
                                "workspace snapshot unavailable, answer will be shared as text only"
                            );
                        }
                    }
                }

                self.answers.insert(key, answer);
                if let Some(record) = self.records.get_mut(&agent_id) {
                    record.counters.new_answers_emitted = version;
                    record.state = AgentState::Answered;
                    record.mark_seen(key);
                }
                info!(agent = %agent_id, version, "answer accepted");
                self.notify_agent(
                    agent_id,
                    format!("your new_answer (v{version}) was accepted."),
                    running,
                )
                .await;
            }
            Err(err) => {
                info!(agent = %agent_id, error = %err, "answer rejected");
                self.notify_agent(
                    agent_id,
                    format!("your new_answer was rejected: {err}. Adjust your answer or cast a vote instead."),
                    running,
                )
                .await;
            }
        }
    }

    /// Deliver the orchestrator's verdict on a coordination tool call back
    /// into the calling agent's own session, as a `tool_result` so the
    /// agent can read it as the outcome of the call it just made rather
    /// than a peer update.
    async fn notify_agent(
        &self,
        agent_id: AgentId,
        content: String,
        running: &HashMap<AgentId, RunningAgent>,
    ) {
        if let Some(handle) = running.get(&agent_id) {
            let _ = handle.inject.send((content, InjectStrategy::ToolResult)).await;
        }
    }

    /// Take a workspace snapshot for `version`, retrying once after a
    /// short settle delay if the first attempt reports the workspace as
    /// mid-write (`snapshot_busy`). A persistent
    /// failure returns `None`: the caller still accepts the answer for
    /// voting, peers just never see a workspace pointer for it.
    async fn take_snapshot(&self, workspace: &WorkspaceRecord, version: u32) -> Option<Snapshot> {
        if let Ok(snapshot) = self.workspace.snapshot(workspace, version).await {
            return Some(snapshot);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        match self.workspace.snapshot(workspace, version).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(agent = %workspace.agent_id, error = %err, "snapshot_busy persisted after retry");
                None
            }
        }
    }

    async fn accept_vote(
        &mut self,
        agent_id: AgentId,
        target_anon_id: String,
        running: &HashMap<AgentId, RunningAgent>,
    ) {
        let Some(target_agent) = self
            .anonymized_ids
            .iter()
            .find(|(_, anon)| anon.0 == target_anon_id)
            .map(|(id, _)| *id)
        else {
            info!(agent = %agent_id, target_anon_id, "vote targets an unknown anonymized id");
            self.notify_agent(
                agent_id,
                format!("your vote was rejected: invalid_vote_target ('{target_anon_id}' is not a known peer)."),
                running,
            )
            .await;
            return;
        };
        let target = match self
            .answers
            .keys()
            .filter(|k| k.agent_id == target_agent)
            .max_by_key(|k| k.version)
        {
            Some(key) => *key,
            None => {
                info!(agent = %agent_id, target_anon_id, "vote targets an agent with no answer yet");
                self.notify_agent(
                    agent_id,
                    format!("your vote was rejected: invalid_vote_target ('{target_anon_id}' has no answer yet)."),
                    running,
                )
                .await;
                return;
            }
        };

        let vote = Vote {
            voter_id: agent_id,
            target,
            timestamp: Utc::now(),
        };
        let existing_keys: HashSet<AnswerKey> = self.answers.keys().copied().collect();
        match validate_vote(&vote, &existing_keys) {
            Ok(()) => {
                info!(agent = %agent_id, ?target, "vote accepted");
                self.votes.insert(agent_id, vote);
                self.set_state(agent_id, AgentState::Voting);
                self.notify_agent(agent_id, format!("your vote for {target_anon_id} was accepted."), running)
                    .await;
            }
            Err(err) => {
                info!(agent = %agent_id, error = %err, "vote rejected");
                self.notify_agent(
                    agent_id,
                    format!("your vote was rejected: {err}. Cast a vote for a different candidate."),
                    running,
                )
                .await;
            }
        }
    }

    /// Deliver every answer a running recipient hasn't yet seen. Recipients
    /// still `Working` get it as a mid-stream injection, subject to the
    /// one-time first-injection grace: a recipient's very first eligible
    /// delivery in a turn is suppressed so it gets a chance to form its
    /// own approach before seeing peers'. Recipients already
    /// `Answered` or `Voting` are in vote-only mode: the normal injection
    /// channel is never used for them, they are restarted instead with a
    /// refreshed note naming the current candidates and a fresh `vote` tool
    /// schema.
    async fn flush_injections(
        &mut self,
        running: &mut HashMap<AgentId, RunningAgent>,
        event_tx: mpsc::Sender<(AgentId, AgentEvent)>,
    ) {
        let recipients: Vec<AgentId> = running.keys().copied().collect();

        for recipient_id in recipients {
            let already_seen = self
                .records
                .get(&recipient_id)
                .map(|r| r.visibility.clone())
                .unwrap_or_default();
            let unseen_keys: Vec<AnswerKey> = self
                .answers
                .keys()
                .filter(|key| key.agent_id != recipient_id && !already_seen.contains(key))
                .copied()
                .collect();
            if unseen_keys.is_empty() {
                continue;
            }

            let vote_only = matches!(
                self.records.get(&recipient_id).map(|r| r.state),
                Some(AgentState::Answered | AgentState::Voting)
            );

            if vote_only {
                let note = self.candidates_note(recipient_id);
                self.restart_agent(recipient_id, note, event_tx.clone(), running).await;
                if let Some(record) = self.records.get_mut(&recipient_id) {
                    for key in unseen_keys {
                        record.mark_seen(key);
                    }
                }
                continue;
            }

            let mut items = Vec::with_capacity(unseen_keys.len());
            for key in &unseen_keys {
                let answer = self.answers.get(key).cloned().expect("key came from self.answers");
                let source_anon = self.anonymized_ids[&answer.agent_id].clone();
                let content = self.render_item_content(recipient_id, &answer).await;
                items.push(InjectableItem {
                    source_anon_id: source_anon,
                    kind: ItemKind::Answer,
                    key: *key,
                    content,
                    timestamp: answer.timestamp,
                });
            }

            let Some(block) = self.injection.assemble(&already_seen, items.clone(), false) else {
                continue;
            };

            let already_spent = self
                .records
                .get(&recipient_id)
                .map(|r| r.spent_first_injection_grace)
                .unwrap_or(true);
            if !already_spent {
                if let Some(record) = self.records.get_mut(&recipient_id) {
                    record.spent_first_injection_grace = true;
                }
                continue;
            }

            if let Some(handle) = running.get(&recipient_id) {
                let strategy = self.injection.strategy_for(InjectionContext::AwaitingToolResult);
                if handle.inject.send((block, strategy)).await.is_ok() {
                    if let Some(record) = self.records.get_mut(&recipient_id) {
                        for item in &items {
                            record.mark_seen(item.key);
                        }
                    }
                    self.enter_convergence().await;
                }
            }
        }
    }

    /// Move the turn out of `Exploration` the first time a peer answer is
    /// actually delivered to a running agent. Idempotent — a turn that is
    /// already in `Convergence` or `Presentation` is left alone.
    async fn enter_convergence(&self) {
        let mut status = self.status.write().await;
        if status.phase == Phase::Exploration {
            status.phase = Phase::Convergence;
            status.updated_at = Utc::now();
        }
    }

    /// Expose `answer`'s workspace snapshot (if any) into a mirror scoped to
    /// `recipient_id`, grant the recipient read access to it, and fold a
    /// reference to the mirror path into the injected text. Falls back to
    /// text-only content when there is no snapshot or exposing it fails.
    async fn render_item_content(&self, recipient_id: AgentId, answer: &Answer) -> String {
        let source_anon = self.anonymized_ids[&answer.agent_id].clone();
        let mut content = if let Some(source_workspace) = self.workspaces.get(&answer.agent_id) {
            let mut real_to_anon = HashMap::new();
            real_to_anon.insert(source_workspace.root_path.clone(), source_anon.0.clone());
            self.workspace.rewrite_paths(&answer.text, &real_to_anon)
        } else {
            answer.text.clone()
        };
        let key = answer.key();
        let Some(snapshot) = self.snapshots.get(&key) else {
            return content;
        };
        match self.workspace.expose(snapshot, recipient_id, source_anon.0.clone()).await {
            Ok(mirror) => {
                self.permissions
                    .add_turn_context_path(recipient_id, mirror.mirror_path.clone(), massgen_types::PermissionLevel::Read)
                    .await;
                content = format!("{content}\n[workspace mirror: {}]", mirror.mirror_path.display());
            }
            Err(err) => {
                warn!(error = %err, "failed to expose workspace snapshot to peer, sharing text only");
            }
        }
        content
    }

    /// Render the current candidate answers as a plain-text note, used as
    /// the restart message for agents in vote-only mode who need a refresh
    /// of what they are voting on.
    fn candidates_note(&self, recipient_id: AgentId) -> String {
        let mut answers: Vec<&Answer> = self
            .answers
            .values()
            .filter(|a| a.agent_id != recipient_id)
            .collect();
        answers.sort_by_key(|a| (a.agent_id.0, a.version));

        let mut lines = vec!["Peer answers have changed since your last vote:".to_string()];
        for answer in answers {
            let anon = &self.anonymized_ids[&answer.agent_id];
            let excerpt: String = answer.text.chars().take(240).collect();
            lines.push(format!("- {anon} (v{}): {excerpt}", answer.version));
        }
        lines.push("Review the candidates and cast or update your vote with the `vote` tool.".to_string());
        lines.join("\n")
    }

    async fn run_subagents(&mut self, agent_id: AgentId, tasks: Vec<String>) {
        if tasks.len() as u32 > self.config.subagents.max_concurrency {
            warn!(agent = %agent_id, requested = tasks.len(), "subagent request exceeds concurrency bound");
            return;
        }
        match self.dispatcher.dispatch(agent_id, tasks).await {
            Ok((refs, cost)) => {
                self.subagent_refs.extend(refs);
                self.subagent_cost.tokens_in += cost.tokens_in;
                self.subagent_cost.tokens_out += cost.tokens_out;
                self.subagent_cost.estimated_cost_usd += cost.estimated_cost_usd;
            }
            Err(err) => warn!(agent = %agent_id, error = %err, "subagent dispatch failed"),
        }
    }

    async fn maybe_declare_winner(&mut self, total_agents: usize) -> bool {
        let all_resolved = self.records.values().all(|r| {
            matches!(r.state, AgentState::Voting | AgentState::Completed | AgentState::Failed)
                || r.counters.new_answers_emitted >= self.config.answers.max_new_answers_per_agent
        });
        let votes: Vec<Vote> = self.votes.values().cloned().collect();

        if all_resolved && has_strict_plurality(&votes, total_agents) {
            return self.select_winner(&votes).await;
        }

        let all_completed = self.records.values().all(|r| {
            matches!(r.state, AgentState::Completed | AgentState::Failed)
        });
        if all_completed && !self.records.is_empty() {
            return self.select_winner(&votes).await;
        }
        false
    }

    async fn force_winner_on_timeout(&mut self, _total_agents: usize) -> bool {
        let votes: Vec<Vote> = self.votes.values().cloned().collect();
        let winner = self.select_winner(&votes).await;
        let mut status = self.status.write().await;
        status.subagent_refs.push("round_timeout".to_string());
        winner
    }

    async fn select_winner(&mut self, votes: &[Vote]) -> bool {
        let answer_refs: Vec<AnswerRef> = self
            .answers
            .values()
            .map(|a| AnswerRef {
                key: a.key(),
                timestamp: a.timestamp,
            })
            .collect();
        let winner = plurality_winner(votes, &answer_refs, &self.anonymized_ids);
        if let Some(winner) = winner {
            let text = self.answers.get(&winner).map(|a| a.text.clone());
            let mut status = self.status.write().await;
            status.winner = Some(winner);
            status.winner_text = text;
            status.phase = Phase::Presentation;
            true
        } else {
            false
        }
    }

    async fn cancel_all(&mut self, running: &mut HashMap<AgentId, RunningAgent>, grace: Duration) {
        for (_, mut handle) in running.drain() {
            if let Some(cancel) = handle.cancel.take() {
                let _ = cancel.send(());
            }
            let _ = tokio::time::timeout(grace, &mut handle.join).await;
        }
    }

    fn set_state(&mut self, agent_id: AgentId, state: AgentState) {
        if let Some(record) = self.records.get_mut(&agent_id) {
            record.state = state;
        }
    }

    async fn recompute_completion(&mut self, total_agents: usize) {
        let answers = self.answers.len();
        let votes = self.votes.len();
        let mut status = self.status.write().await;
        status.completion_percentage = completion_percentage(total_agents, answers, votes);
        status.updated_at = Utc::now();
        status.cost = self.aggregate_cost();
        status.agents = self
            .records
            .iter()
            .map(|(id, record)| {
                (
                    *id,
                    AgentStatus {
                        agent_id: *id,
                        anonymized_id: record.anonymized_id.clone(),
                        state: record.state,
                        counters: record.counters.clone(),
                        restarts_used: record.restarts_used,
                    },
                )
            })
            .collect();
        status.subagent_refs = self.subagent_refs.clone();
    }

    fn aggregate_cost(&self) -> CostAggregate {
        let mut cost = self.subagent_cost.clone();
        for record in self.records.values() {
            cost.tokens_in += record.counters.tokens_in;
            cost.tokens_out += record.counters.tokens_out;
            cost.estimated_cost_usd += record.counters.estimated_cost_usd;
        }
        cost
    }

    async fn write_status(&self) {
        let snapshot = self.status.read().await.clone();
        if let Err(err) = self.status_writer.write(&snapshot).await {
            warn!(error = %err, "failed to write turn status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use massgen_backend::ScriptedMockSession;

    fn hooks() -> Arc<HookManager> {
        Arc::new(HookManager::new(Duration::from_secs(1)))
    }

    async fn writer() -> (Arc<StatusWriter>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        (
            Arc::new(StatusWriter::new(path, Duration::from_secs(60))),
            dir,
        )
    }

    #[tokio::test]
    async fn two_agent_turn_converges_on_a_vote() {
        let (status_writer, _dir) = writer().await;
        let mut orchestrator = Orchestrator::new(
            TurnConfig::default(),
            hooks(),
            Arc::new(NoSubagents),
            status_writer,
            _dir.path().join("workspaces"),
        );

        let agent_a = AgentId::new();
        let agent_b = AgentId::new();

        let backend_a = Arc::new(ScriptedMockSession::tool_then_text(
            "call-a",
            "new_answer",
            r#"{"text":"forty two is the answer to everything"}"#,
            "waiting",
        ));
        let backend_b = Arc::new(ScriptedMockSession::new(vec![vec![
            massgen_backend::ResponseEvent::ToolCall {
                id: "call-b1".into(),
                name: "new_answer".into(),
                arguments: r#"{"text":"the answer is clearly something else entirely"}"#.into(),
            },
            massgen_backend::ResponseEvent::Done,
        ]]));

        let status = orchestrator
            .run_turn(vec![(agent_a, backend_a), (agent_b, backend_b)])
            .await
            .unwrap();

        assert_eq!(status.phase, Phase::Presentation);
        assert_eq!(status.agents.len(), 2);
    }

    #[tokio::test]
    async fn single_agent_turn_has_no_voting() {
        let (status_writer, _dir) = writer().await;
        let mut orchestrator = Orchestrator::new(
            TurnConfig::default(),
            hooks(),
            Arc::new(NoSubagents),
            status_writer,
            _dir.path().join("workspaces"),
        );
        let agent = AgentId::new();
        let backend = Arc::new(ScriptedMockSession::tool_then_text(
            "call-1",
            "new_answer",
            r#"{"text":"the only answer"}"#,
            "done",
        ));
        let status = orchestrator.run_turn(vec![(agent, backend)]).await.unwrap();
        assert_eq!(status.phase, Phase::Presentation);
        assert!(status.agents.values().all(|a| a.counters.new_answers_emitted <= 1));
    }
}
