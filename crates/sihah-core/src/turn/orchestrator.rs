//! Turn orchestrator: drives one user utterance through analysis, retrieval,
//! prompt assembly, model invocation, post-processing, and persistence.
//!
//! Also owns the conversation lifecycle operations (pause, end, transfer).
//! Turns and transitions on one conversation are serialized by a lease; turns
//! on different conversations run concurrently.
//!
//! Terminal policy: ending or transferring a conversation that is already
//! `Ended` or `Transferred` is a no-op that returns the stored conversation.
//! No second SYSTEM record is written and no event is emitted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use sihah_types::agent::AgentConfig;
use sihah_types::analysis::TextAnalysis;
use sihah_types::chat::{
    Conversation, ConversationMessage, ConversationStatus, DEFAULT_CHANNEL, Metadata, NewMessage,
};
use sihah_types::config::GlobalConfig;
use sihah_types::error::{RepositoryError, TurnError};
use sihah_types::event::ConversationEvent;
use sihah_types::knowledge::ContextChunk;
use sihah_types::llm::MessageRole;
use sihah_types::turn::{TurnProcessingInfo, TurnResult};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::chat::repository::ConversationRepository;
use crate::event::EventPublisher;
use crate::knowledge::retriever::ContextRetriever;
use crate::llm::invoker::{InvocationParams, ModelInvoker};
use crate::llm::retry::{RetryFailure, RetryPolicy};
use crate::prompt::assembler::{PromptAssembler, PromptLimits};
use crate::text::analyzer::{LanguageAnalyzer, analyze_or_neutral};

use super::lease::ConversationLeases;
use super::lifecycle::{Lifecycle, LifecycleState};
use super::postprocess::post_process;

/// Tunables for turn processing.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub limits: PromptLimits,
    pub retrieval_top_k: usize,
    /// Bounds lease wait, retrieval, and every model attempt plus backoff.
    pub turn_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}

impl TurnSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            limits: PromptLimits::from(&config.pipeline),
            retrieval_top_k: config.pipeline.retrieval_top_k,
            turn_timeout: Duration::from_secs(config.pipeline.turn_timeout_secs.max(1)),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Counts turns in progress so shutdown can wait for them.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// The conversation turn pipeline.
pub struct TurnOrchestrator<R: ConversationRepository> {
    repo: Arc<R>,
    analyzer: Arc<dyn LanguageAnalyzer>,
    retriever: Option<ContextRetriever>,
    invoker: ModelInvoker,
    events: Arc<dyn EventPublisher>,
    settings: TurnSettings,
    leases: ConversationLeases,
    lifecycle: Lifecycle,
    in_flight: InFlight,
}

impl<R: ConversationRepository> TurnOrchestrator<R> {
    /// Build an orchestrator in the `Constructed` state. Call [`start`]
    /// before processing turns.
    ///
    /// [`start`]: Self::start
    pub fn new(
        repo: Arc<R>,
        analyzer: Arc<dyn LanguageAnalyzer>,
        invoker: ModelInvoker,
        events: Arc<dyn EventPublisher>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            repo,
            analyzer,
            retriever: None,
            invoker,
            events,
            settings,
            leases: ConversationLeases::new(),
            lifecycle: Lifecycle::new(),
            in_flight: InFlight::default(),
        }
    }

    /// Attach a knowledge retriever. Without one, turns run with no context.
    pub fn with_retriever(mut self, retriever: ContextRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Move to `Ready`. Returns false if already started or shut down.
    pub fn start(&self) -> bool {
        let started = self.lifecycle.advance(LifecycleState::Ready);
        if started {
            info!(
                analyzer = self.analyzer.name(),
                default_model = self.invoker.registry().default_model(),
                retrieval = self.retriever.is_some(),
                "Turn orchestrator ready"
            );
        }
        started
    }

    /// Stop accepting work and wait for in-flight turns to finish.
    pub async fn shutdown(&self) {
        if !self.lifecycle.advance(LifecycleState::ShuttingDown) {
            return;
        }
        info!(
            in_flight = self.in_flight.count.load(Ordering::SeqCst),
            "Turn orchestrator shutting down"
        );
        self.in_flight.wait_idle().await;
        self.lifecycle.advance(LifecycleState::Stopped);
        info!("Turn orchestrator stopped");
    }

    /// Process one user utterance and persist the resulting exchange.
    ///
    /// The first turn on an unknown `conversation_id` creates the
    /// conversation for `agent`. The channel is taken from the `channel`
    /// metadata key. On any error nothing is persisted and a `TurnFailed`
    /// event is emitted.
    pub async fn process_turn(
        &self,
        conversation_id: Uuid,
        agent: &AgentConfig,
        user_input: &str,
        metadata: Metadata,
    ) -> Result<TurnResult, TurnError> {
        let _guard = self.in_flight.enter();
        if !self.lifecycle.is_ready() {
            return Err(TurnError::ShuttingDown);
        }
        if user_input.trim().is_empty() {
            return Err(TurnError::Validation("user input is empty".to_string()));
        }

        let span = info_span!(
            "turn",
            conversation_id = %conversation_id,
            agent_id = %agent.agent_id,
        );
        let result = self
            .run_turn(conversation_id, agent, user_input, metadata)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            let kind = e.kind();
            match e {
                TurnError::Validation(_)
                | TurnError::ConversationNotFound(_)
                | TurnError::ConversationNotActive { .. } => {
                    debug!(conversation_id = %conversation_id, error = %e, "Turn rejected");
                }
                _ => {
                    error!(conversation_id = %conversation_id, ?kind, error = %e, "Turn failed");
                }
            }
            self.events.emit(ConversationEvent::TurnFailed {
                conversation_id,
                kind,
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_turn(
        &self,
        conversation_id: Uuid,
        agent: &AgentConfig,
        user_input: &str,
        metadata: Metadata,
    ) -> Result<TurnResult, TurnError> {
        let started = Instant::now();
        let deadline = started + self.settings.turn_timeout;

        let _lease = tokio::time::timeout_at(deadline, self.leases.acquire(conversation_id))
            .await
            .map_err(|_| TurnError::DeadlineExceeded)?;

        let conversation = match self.repo.get_conversation(&conversation_id).await? {
            Some(c) if c.agent_id != agent.agent_id => {
                return Err(TurnError::Validation(format!(
                    "conversation {conversation_id} belongs to another agent"
                )));
            }
            Some(c) if !c.status.accepts_turns() => {
                return Err(TurnError::ConversationNotActive {
                    id: conversation_id,
                    status: c.status,
                });
            }
            Some(c) => c,
            None => {
                let channel = metadata
                    .get("channel")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_CHANNEL);
                Conversation::new(conversation_id, agent.agent_id, channel)
            }
        };
        self.events
            .emit(ConversationEvent::TurnStarted { conversation_id });

        let analysis = analyze_or_neutral(self.analyzer.as_ref(), user_input);
        let (chunks, retrieval_degraded) = self.retrieve(agent, &analysis, deadline).await;

        let history = self
            .repo
            .read_recent_history(&conversation_id, self.settings.limits.history_limit)
            .await?;
        let messages = PromptAssembler::assemble(
            agent,
            &analysis,
            &chunks,
            &history,
            user_input,
            self.settings.limits,
        );
        debug!(
            prompt_messages = messages.len(),
            history = history.len(),
            chunks = chunks.len(),
            "Prompt assembled"
        );

        let params = InvocationParams {
            temperature: agent.temperature,
            max_tokens: agent.max_output_tokens,
        };
        let (invocation, attempts) = self
            .settings
            .retry
            .run(deadline, |_| {
                self.invoker.invoke(&agent.model, messages.clone(), params)
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => TurnError::Llm {
                    attempts,
                    source: last,
                },
                RetryFailure::DeadlineExceeded { .. } => TurnError::DeadlineExceeded,
            })?;

        let reply = post_process(&invocation.response.content, analysis.is_hebrew());

        let user_message = NewMessage::new(
            MessageRole::User,
            user_input,
            user_metadata(metadata, &analysis),
        );
        let mut processing = TurnProcessingInfo {
            model: invocation.model.clone(),
            fell_back: invocation.fell_back,
            attempts,
            context_chunks: chunks.len(),
            retrieval_degraded,
            language: Some(analysis.language),
            sentiment: Some(analysis.sentiment.label),
            input_tokens: invocation.response.usage.input_tokens,
            output_tokens: invocation.response.usage.output_tokens,
            duration_ms: 0,
            user_message_id: Some(user_message.id),
            assistant_message_id: None,
        };

        let mut assistant_message =
            NewMessage::new(MessageRole::Assistant, reply.text.clone(), Metadata::new());
        processing.assistant_message_id = Some(assistant_message.id);
        processing.duration_ms = started.elapsed().as_millis() as u64;
        assistant_message.metadata = assistant_metadata(
            &processing,
            &invocation.provider,
            reply.confidence,
            &reply.suggested_actions,
        );

        let stored = match self
            .repo
            .append_turn(&conversation, &[user_message, assistant_message])
            .await
        {
            Ok(stored) => stored,
            // Status changed underneath us, e.g. by another process.
            Err(RepositoryError::Conflict(_)) => {
                let status = self
                    .repo
                    .get_conversation(&conversation_id)
                    .await?
                    .map_or(ConversationStatus::Ended, |c| c.status);
                return Err(TurnError::ConversationNotActive {
                    id: conversation_id,
                    status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(message) = stored.into_iter().find(|m| m.role == MessageRole::Assistant) {
            self.events.emit(ConversationEvent::TurnCompleted {
                conversation_id,
                message,
            });
        }

        info!(
            model = %processing.model,
            attempts,
            fell_back = processing.fell_back,
            context_chunks = processing.context_chunks,
            duration_ms = processing.duration_ms,
            "Turn completed"
        );

        Ok(TurnResult {
            conversation_id,
            reply: reply.text,
            confidence: reply.confidence,
            suggested_actions: reply.suggested_actions,
            processing,
        })
    }

    /// Retrieval never fails a turn: errors and timeouts yield no context.
    async fn retrieve(
        &self,
        agent: &AgentConfig,
        analysis: &TextAnalysis,
        deadline: Instant,
    ) -> (Vec<ContextChunk>, bool) {
        let Some(retriever) = &self.retriever else {
            return (Vec::new(), false);
        };
        let query = retriever.retrieve(
            agent.agent_id,
            &analysis.normalized,
            self.settings.retrieval_top_k,
        );
        match tokio::time::timeout_at(deadline, query).await {
            Ok(Ok(chunks)) => (chunks, false),
            Ok(Err(e)) => {
                warn!(agent_id = %agent.agent_id, error = %e, "Retrieval failed, continuing without context");
                (Vec::new(), true)
            }
            Err(_) => {
                warn!(agent_id = %agent.agent_id, "Retrieval timed out, continuing without context");
                (Vec::new(), true)
            }
        }
    }

    /// Pause an active conversation. Paused conversations reject turns but
    /// can still be ended or transferred.
    pub async fn pause_conversation(
        &self,
        conversation_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Conversation, TurnError> {
        let note = match reason {
            Some(r) => format!("Conversation paused: {r}"),
            None => "Conversation paused".to_string(),
        };
        self.transition(conversation_id, ConversationStatus::Paused, note, reason, None)
            .await
    }

    /// End a conversation. A no-op on a conversation that is already ended
    /// or transferred.
    pub async fn end_conversation(
        &self,
        conversation_id: Uuid,
        reason: Option<&str>,
    ) -> Result<Conversation, TurnError> {
        let note = match reason {
            Some(r) => format!("Conversation ended: {r}"),
            None => "Conversation ended".to_string(),
        };
        self.transition(conversation_id, ConversationStatus::Ended, note, reason, None)
            .await
    }

    /// Hand a conversation over to `target` (a queue, team, or human agent).
    /// A no-op on a conversation that is already ended or transferred.
    pub async fn transfer_conversation(
        &self,
        conversation_id: Uuid,
        target: &str,
        reason: Option<&str>,
    ) -> Result<Conversation, TurnError> {
        if target.trim().is_empty() {
            return Err(TurnError::Validation("transfer target is empty".to_string()));
        }
        let note = match reason {
            Some(r) => format!("Conversation transferred to {target}: {r}"),
            None => format!("Conversation transferred to {target}"),
        };
        self.transition(
            conversation_id,
            ConversationStatus::Transferred,
            note,
            reason,
            Some(target),
        )
        .await
    }

    async fn transition(
        &self,
        conversation_id: Uuid,
        next: ConversationStatus,
        note: String,
        reason: Option<&str>,
        target: Option<&str>,
    ) -> Result<Conversation, TurnError> {
        let _guard = self.in_flight.enter();
        if !self.lifecycle.is_ready() {
            return Err(TurnError::ShuttingDown);
        }
        let _lease =
            tokio::time::timeout(self.settings.turn_timeout, self.leases.acquire(conversation_id))
                .await
                .map_err(|_| TurnError::DeadlineExceeded)?;

        let current = self
            .repo
            .get_conversation(&conversation_id)
            .await?
            .ok_or(TurnError::ConversationNotFound(conversation_id))?;

        if current.status == next || (next.is_terminal() && current.status.is_terminal()) {
            debug!(
                conversation_id = %conversation_id,
                status = %current.status,
                requested = %next,
                "Conversation already in final state, nothing to do"
            );
            return Ok(current);
        }
        if !current.status.can_transition_to(next) {
            return Err(TurnError::IllegalTransition {
                id: conversation_id,
                from: current.status,
                to: next,
            });
        }

        let mut meta = Metadata::new();
        meta.insert("transition".into(), json!({ "from": current.status, "to": next }));
        if let Some(r) = reason {
            meta.insert("reason".into(), json!(r));
        }
        if let Some(t) = target {
            meta.insert("target".into(), json!(t));
        }
        let record = NewMessage::new(MessageRole::System, note, meta);

        let updated = self
            .repo
            .update_conversation_status(&conversation_id, current.status, next, &record)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => TurnError::ConversationNotFound(conversation_id),
                other => TurnError::Persistence(other),
            })?;

        info!(
            conversation_id = %conversation_id,
            from = %current.status,
            to = %next,
            "Conversation status changed"
        );
        self.events.emit(ConversationEvent::ConversationStatusChanged {
            conversation_id,
            from: current.status,
            to: next,
        });
        Ok(updated)
    }

    pub async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, TurnError> {
        self.repo
            .get_conversation(&conversation_id)
            .await?
            .ok_or(TurnError::ConversationNotFound(conversation_id))
    }

    /// Full transcript, oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ConversationMessage>, TurnError> {
        self.get_conversation(conversation_id).await?;
        Ok(self.repo.list_messages(&conversation_id).await?)
    }

    /// Set one metadata key on a conversation in any status.
    pub async fn annotate_conversation(
        &self,
        conversation_id: Uuid,
        key: &str,
        value: Value,
    ) -> Result<Conversation, TurnError> {
        if key.trim().is_empty() {
            return Err(TurnError::Validation("metadata key is empty".to_string()));
        }
        self.repo
            .annotate_conversation(&conversation_id, key, value)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => TurnError::ConversationNotFound(conversation_id),
                other => TurnError::Persistence(other),
            })
    }
}

fn user_metadata(mut metadata: Metadata, analysis: &TextAnalysis) -> Metadata {
    metadata.insert("language".into(), json!(analysis.language.code()));
    metadata.insert("sentiment".into(), json!(analysis.sentiment));
    if !analysis.entities.is_empty() {
        metadata.insert("entities".into(), json!(analysis.entities));
    }
    metadata
}

fn assistant_metadata(
    processing: &TurnProcessingInfo,
    provider: &str,
    confidence: f32,
    actions: &[String],
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("processing".into(), json!(processing));
    metadata.insert("provider".into(), json!(provider));
    metadata.insert("confidence".into(), json!(confidence));
    if !actions.is_empty() {
        metadata.insert("suggested_actions".into(), json!(actions));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::memory::InMemoryConversationRepository;
    use crate::event::EventBus;
    use crate::event::bus::PublishedEvent;
    use crate::knowledge::box_embedder::BoxEmbedder;
    use crate::knowledge::box_index::BoxVectorIndex;
    use crate::knowledge::indexer::DocumentIndexer;
    use crate::knowledge::memory_index::InMemoryVectorIndex;
    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::registry::ModelRegistry;
    use crate::test_support::{
        FailingEmbedder, HashEmbedder, Scripted, ScriptedLlm, agent_config, document,
    };
    use crate::text::analyzer::HebrewAnalyzer;
    use sihah_types::analysis::Language;
    use sihah_types::error::TurnErrorKind;
    use sihah_types::llm::{CompletionRequest, LlmError};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::broadcast;

    const DIM: usize = 64;

    struct Harness {
        orchestrator: Arc<TurnOrchestrator<InMemoryConversationRepository>>,
        repo: Arc<InMemoryConversationRepository>,
        events: broadcast::Receiver<PublishedEvent>,
        calls: Arc<AtomicU32>,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
        agent: AgentConfig,
    }

    fn settings() -> TurnSettings {
        TurnSettings {
            limits: PromptLimits::default(),
            retrieval_top_k: 3,
            turn_timeout: Duration::from_secs(30),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(400),
                multiplier: 2.0,
            },
        }
    }

    fn harness_with(
        llm: ScriptedLlm,
        retriever: Option<ContextRetriever>,
        settings: TurnSettings,
    ) -> Harness {
        let calls = llm.calls.clone();
        let requests = llm.requests.clone();
        let mut registry = ModelRegistry::new("test-model");
        registry.register(BoxLlmProvider::new(llm), ["test-model"]);

        let repo = Arc::new(InMemoryConversationRepository::new());
        let bus = EventBus::new(64);
        let events = bus.subscribe();
        let mut orchestrator = TurnOrchestrator::new(
            repo.clone(),
            Arc::new(HebrewAnalyzer::new()),
            ModelInvoker::new(Arc::new(registry)),
            Arc::new(bus),
            settings,
        );
        if let Some(r) = retriever {
            orchestrator = orchestrator.with_retriever(r);
        }
        assert!(orchestrator.start());

        Harness {
            orchestrator: Arc::new(orchestrator),
            repo,
            events,
            calls,
            requests,
            agent: agent_config(Uuid::now_v7()),
        }
    }

    fn harness(llm: ScriptedLlm) -> Harness {
        harness_with(llm, None, settings())
    }

    fn knowledge() -> (ContextRetriever, DocumentIndexer) {
        let embedder = Arc::new(BoxEmbedder::new(HashEmbedder::new(DIM)));
        let index = Arc::new(BoxVectorIndex::new(InMemoryVectorIndex::new(DIM)));
        (
            ContextRetriever::new(embedder.clone(), index.clone()),
            DocumentIndexer::new(embedder, index, 512),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<PublishedEvent>) -> Vec<ConversationEvent> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p.event);
        }
        out
    }

    #[tokio::test]
    async fn hebrew_greeting_on_empty_knowledge_base() {
        let (retriever, _) = knowledge();
        let mut h = harness_with(
            ScriptedLlm::replying("שלום! במה אוכל לעזור?"),
            Some(retriever),
            settings(),
        );
        let id = Uuid::now_v7();

        let result = h
            .orchestrator
            .process_turn(id, &h.agent, "שלום, אני צריך עזרה", Metadata::new())
            .await
            .unwrap();

        assert!(result.confidence > 0.0);
        assert!(!result.reply.is_empty());
        assert_eq!(result.processing.language, Some(Language::Hebrew));
        assert_eq!(result.processing.context_chunks, 0);
        assert!(!result.processing.retrieval_degraded);
        assert_eq!(result.processing.attempts, 1);

        let messages = h.orchestrator.list_messages(id).await.unwrap();
        let n = messages.len();
        assert_eq!(n, 2);
        assert_eq!(messages[n - 2].role, MessageRole::User);
        assert_eq!(messages[n - 2].content, "שלום, אני צריך עזרה");
        assert_eq!(messages[n - 1].role, MessageRole::Assistant);
        assert_eq!(messages[n - 1].content, result.reply);
        assert_eq!(
            result.processing.assistant_message_id,
            Some(messages[n - 1].id)
        );

        let conversation = h.orchestrator.get_conversation(id).await.unwrap();
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert_eq!(conversation.agent_id, h.agent.agent_id);

        let events = drain(&mut h.events);
        assert!(matches!(events[0], ConversationEvent::TurnStarted { .. }));
        assert!(matches!(
            &events[1],
            ConversationEvent::TurnCompleted { message, .. } if message.role == MessageRole::Assistant
        ));
    }

    #[tokio::test]
    async fn transfer_twice_appends_single_record() {
        let mut h = harness(ScriptedLlm::replying("אעביר אותך לנציג"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "אני רוצה לדבר עם נציג", Metadata::new())
            .await
            .unwrap();
        drain(&mut h.events);

        let first = h
            .orchestrator
            .transfer_conversation(id, "human_support", Some("customer request"))
            .await
            .unwrap();
        assert_eq!(first.status, ConversationStatus::Transferred);
        assert!(first.ended_at.is_some());

        let second = h
            .orchestrator
            .transfer_conversation(id, "human_support", None)
            .await
            .unwrap();
        assert_eq!(second.status, ConversationStatus::Transferred);
        assert_eq!(second.ended_at, first.ended_at);

        let messages = h.orchestrator.list_messages(id).await.unwrap();
        let system: Vec<_> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .collect();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0].metadata["target"], "human_support");
        assert_eq!(messages.last().unwrap().role, MessageRole::System);

        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ConversationEvent::ConversationStatusChanged {
                to: ConversationStatus::Transferred,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn end_after_transfer_is_noop() {
        let h = harness(ScriptedLlm::replying("בסדר"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "היי", Metadata::new())
            .await
            .unwrap();
        h.orchestrator
            .transfer_conversation(id, "billing", None)
            .await
            .unwrap();

        let after = h.orchestrator.end_conversation(id, None).await.unwrap();
        assert_eq!(after.status, ConversationStatus::Transferred);
        assert_eq!(h.repo.list_messages(&id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ended_conversation_rejects_turns() {
        let h = harness(ScriptedLlm::replying("תודה"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "תודה רבה", Metadata::new())
            .await
            .unwrap();
        h.orchestrator
            .end_conversation(id, Some("resolved"))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .process_turn(id, &h.agent, "עוד שאלה", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::ConversationNotActive {
                status: ConversationStatus::Ended,
                ..
            }
        ));
        assert_eq!(err.kind(), TurnErrorKind::ConversationUnavailable);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.repo.list_messages(&id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejected_turn_emits_only_failure() {
        let mut h = harness(ScriptedLlm::replying("תודה"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "תודה רבה", Metadata::new())
            .await
            .unwrap();
        h.orchestrator.end_conversation(id, None).await.unwrap();
        drain(&mut h.events);

        h.orchestrator
            .process_turn(id, &h.agent, "עוד שאלה", Metadata::new())
            .await
            .unwrap_err();
        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1, "{events:?}");
        assert!(matches!(
            events[0],
            ConversationEvent::TurnFailed {
                kind: TurnErrorKind::ConversationUnavailable,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_waits_at_most_the_turn_timeout() {
        let mut s = settings();
        s.turn_timeout = Duration::from_secs(2);
        let h = harness_with(ScriptedLlm::replying("x"), None, s);
        let id = Uuid::now_v7();
        let _held = h.orchestrator.leases.acquire(id).await;

        let err = h.orchestrator.end_conversation(id, None).await.unwrap_err();
        assert!(matches!(err, TurnError::DeadlineExceeded));
        assert_eq!(err.kind(), TurnErrorKind::RetryLater);
    }

    #[tokio::test]
    async fn paused_conversation_rejects_turns_but_can_end() {
        let h = harness(ScriptedLlm::replying("רגע"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "שלום", Metadata::new())
            .await
            .unwrap();
        let paused = h.orchestrator.pause_conversation(id, None).await.unwrap();
        assert_eq!(paused.status, ConversationStatus::Paused);
        assert!(paused.ended_at.is_none());

        let err = h
            .orchestrator
            .process_turn(id, &h.agent, "שלום?", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ConversationNotActive { .. }));

        let ended = h.orchestrator.end_conversation(id, None).await.unwrap();
        assert_eq!(ended.status, ConversationStatus::Ended);

        let err = h
            .orchestrator
            .pause_conversation(id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn transitions_on_unknown_conversation_are_not_found() {
        let h = harness(ScriptedLlm::replying("x"));
        let err = h
            .orchestrator
            .transfer_conversation(Uuid::now_v7(), "sales", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ConversationNotFound(_)));
        assert_eq!(err.kind(), TurnErrorKind::ConversationUnavailable);
    }

    #[tokio::test]
    async fn persistence_failure_leaves_no_messages() {
        let mut h = harness(ScriptedLlm::replying("תשובה"));
        let id = Uuid::now_v7();
        h.repo.set_fail_appends(true);

        let err = h
            .orchestrator
            .process_turn(id, &h.agent, "שאלה חשובה", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Persistence(_)));
        assert_eq!(err.kind(), TurnErrorKind::Internal);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);

        assert!(h.repo.list_messages(&id).await.unwrap().is_empty());
        assert!(h.repo.get_conversation(&id).await.unwrap().is_none());

        let events = drain(&mut h.events);
        assert!(matches!(
            events.last(),
            Some(ConversationEvent::TurnFailed {
                kind: TurnErrorKind::Internal,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_no_orphan_user_message() {
        let mut h = harness(ScriptedLlm::new(vec![
            Scripted::Fail(LlmError::Timeout(1_000)),
            Scripted::Fail(LlmError::RateLimited {
                retry_after_ms: Some(200),
            }),
            Scripted::Fail(LlmError::Overloaded("busy".into())),
        ]));
        let id = Uuid::now_v7();

        let err = h
            .orchestrator
            .process_turn(id, &h.agent, "מה קורה?", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Llm { attempts: 3, .. }));
        assert_eq!(err.kind(), TurnErrorKind::RetryLater);
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);
        assert!(h.repo.list_messages(&id).await.unwrap().is_empty());

        let events = drain(&mut h.events);
        assert!(matches!(
            events.last(),
            Some(ConversationEvent::TurnFailed {
                kind: TurnErrorKind::RetryLater,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let h = harness(ScriptedLlm::new(vec![
            Scripted::Fail(LlmError::Timeout(1_000)),
            Scripted::Reply("הנה התשובה".into()),
        ]));
        let result = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "שאלה", Metadata::new())
            .await
            .unwrap();
        assert_eq!(result.processing.attempts, 2);
        assert_eq!(result.reply, "הנה התשובה");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let h = harness(ScriptedLlm::new(vec![Scripted::Fail(
            LlmError::AuthenticationFailed,
        )]));
        let err = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "שאלה", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Llm { attempts: 1, .. }));
        assert_eq!(err.kind(), TurnErrorKind::Internal);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_slow_model() {
        let mut s = settings();
        s.turn_timeout = Duration::from_secs(2);
        let h = harness_with(
            ScriptedLlm::new(vec![Scripted::Slow(Duration::from_secs(60), "late".into())]),
            None,
            s,
        );
        let id = Uuid::now_v7();
        let err = h
            .orchestrator
            .process_turn(id, &h.agent, "שלום", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::DeadlineExceeded));
        assert_eq!(err.kind(), TurnErrorKind::RetryLater);
        assert!(h.repo.list_messages(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let h = harness(ScriptedLlm::replying("x"));
        let err = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "   \n", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));
        assert_eq!(err.kind(), TurnErrorKind::InvalidRequest);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conversation_owned_by_other_agent_is_invalid() {
        let h = harness(ScriptedLlm::replying("x"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "שלום", Metadata::new())
            .await
            .unwrap();
        let other = agent_config(Uuid::now_v7());
        let err = h
            .orchestrator
            .process_turn(id, &other, "שלום", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_model_falls_back_to_default() {
        let mut h = harness(ScriptedLlm::replying("כן"));
        h.agent.model = "no-such-model".into();
        let result = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "שלום", Metadata::new())
            .await
            .unwrap();
        assert!(result.processing.fell_back);
        assert_eq!(result.processing.model, "test-model");
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_no_context() {
        let embedder = Arc::new(BoxEmbedder::new(FailingEmbedder { dimension: DIM }));
        let index = Arc::new(BoxVectorIndex::new(InMemoryVectorIndex::new(DIM)));
        let h = harness_with(
            ScriptedLlm::replying("אין לי מידע על זה"),
            Some(ContextRetriever::new(embedder, index)),
            settings(),
        );
        let result = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "מה שעות הפתיחה?", Metadata::new())
            .await
            .unwrap();
        assert!(result.processing.retrieval_degraded);
        assert_eq!(result.processing.context_chunks, 0);
        let requests = h.requests.lock().unwrap();
        assert!(!requests[0].messages[0].content.contains("<knowledge>"));
    }

    #[tokio::test]
    async fn retrieved_knowledge_reaches_the_prompt() {
        let (retriever, indexer) = knowledge();
        let h = harness_with(ScriptedLlm::replying("פתוחים 9 עד 17"), Some(retriever), settings());
        indexer
            .index_document(&document(
                h.agent.agent_id,
                "hours",
                "שעות הפתיחה של החנות הן בין 9 ל 17",
            ))
            .await
            .unwrap();

        let result = h
            .orchestrator
            .process_turn(Uuid::now_v7(), &h.agent, "מה שעות הפתיחה של החנות", Metadata::new())
            .await
            .unwrap();
        assert_eq!(result.processing.context_chunks, 1);
        let requests = h.requests.lock().unwrap();
        let system = &requests[0].messages[0].content;
        assert!(system.contains("<knowledge>"));
        assert!(system.contains("source=\"hours\""));
        assert!(system.contains("<language>"));
    }

    #[tokio::test]
    async fn history_flows_into_next_prompt() {
        let h = harness(ScriptedLlm::new(vec![
            Scripted::Reply("איך קוראים לך?".into()),
            Scripted::Reply("נעים להכיר, דנה".into()),
        ]));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "שלום", Metadata::new())
            .await
            .unwrap();
        h.orchestrator
            .process_turn(id, &h.agent, "דנה", Metadata::new())
            .await
            .unwrap();

        let requests = h.requests.lock().unwrap();
        let second = &requests[1].messages;
        let roles: Vec<MessageRole> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(second[1].content, "שלום");
        assert_eq!(second[3].content, "דנה");
    }

    #[tokio::test]
    async fn turns_in_one_conversation_are_serialized() {
        let h = harness(ScriptedLlm::replying("אוקיי"));
        let id = Uuid::now_v7();
        let mut handles = Vec::new();
        for i in 0..6 {
            let orchestrator = h.orchestrator.clone();
            let agent = h.agent.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .process_turn(id, &agent, &format!("הודעה {i}"), Metadata::new())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let messages = h.repo.list_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 12);
        for (i, pair) in messages.chunks(2).enumerate() {
            assert_eq!(pair[0].role, MessageRole::User, "pair {i}");
            assert_eq!(pair[1].role, MessageRole::Assistant, "pair {i}");
        }
        // Each prompt saw every earlier exchange.
        let requests = h.requests.lock().unwrap();
        let mut sizes: Vec<usize> = requests.iter().map(|r| r.messages.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 4, 6, 8, 10, 12]);
    }

    #[tokio::test]
    async fn user_metadata_carries_analysis_and_channel() {
        let h = harness(ScriptedLlm::replying("קיבלתי"));
        let id = Uuid::now_v7();
        let mut meta = Metadata::new();
        meta.insert("channel".into(), json!("whatsapp"));
        h.orchestrator
            .process_turn(id, &h.agent, "תודה רבה, מעולה!", meta)
            .await
            .unwrap();

        let conversation = h.orchestrator.get_conversation(id).await.unwrap();
        assert_eq!(conversation.channel, "whatsapp");

        let messages = h.repo.list_messages(&id).await.unwrap();
        assert_eq!(messages[0].metadata["language"], "he");
        assert_eq!(messages[0].metadata["sentiment"]["label"], "positive");
        assert_eq!(messages[1].metadata["processing"]["attempts"], 1);
    }

    #[tokio::test]
    async fn annotation_allowed_after_end() {
        let h = harness(ScriptedLlm::replying("להתראות"));
        let id = Uuid::now_v7();
        h.orchestrator
            .process_turn(id, &h.agent, "ביי", Metadata::new())
            .await
            .unwrap();
        h.orchestrator.end_conversation(id, None).await.unwrap();

        let annotated = h
            .orchestrator
            .annotate_conversation(id, "csat", json!(5))
            .await
            .unwrap();
        assert_eq!(annotated.metadata["csat"], 5);
        assert_eq!(annotated.status, ConversationStatus::Ended);
    }

    #[tokio::test]
    async fn lifecycle_gates_turns() {
        let llm = ScriptedLlm::replying("x");
        let mut registry = ModelRegistry::new("test-model");
        registry.register(BoxLlmProvider::new(llm), ["test-model"]);
        let orchestrator = TurnOrchestrator::new(
            Arc::new(InMemoryConversationRepository::new()),
            Arc::new(HebrewAnalyzer::new()),
            ModelInvoker::new(Arc::new(registry)),
            Arc::new(EventBus::new(8)),
            settings(),
        );
        let agent = agent_config(Uuid::now_v7());

        let err = orchestrator
            .process_turn(Uuid::now_v7(), &agent, "שלום", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ShuttingDown));

        assert!(orchestrator.start());
        assert!(!orchestrator.start());
        orchestrator
            .process_turn(Uuid::now_v7(), &agent, "שלום", Metadata::new())
            .await
            .unwrap();

        orchestrator.shutdown().await;
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        let err = orchestrator
            .process_turn(Uuid::now_v7(), &agent, "שלום", Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TurnErrorKind::RetryLater);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_turn() {
        let h = harness(ScriptedLlm::new(vec![Scripted::Slow(
            Duration::from_secs(1),
            "סיימתי".into(),
        )]));
        let id = Uuid::now_v7();
        let orchestrator = h.orchestrator.clone();
        let agent = h.agent.clone();
        let turn = tokio::spawn(async move {
            orchestrator
                .process_turn(id, &agent, "שלום", Metadata::new())
                .await
        });
        tokio::task::yield_now().await;
        while h.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        h.orchestrator.shutdown().await;
        assert_eq!(h.orchestrator.state(), LifecycleState::Stopped);
        assert!(turn.await.unwrap().is_ok());
        assert_eq!(h.repo.list_messages(&id).await.unwrap().len(), 2);
    }
}
