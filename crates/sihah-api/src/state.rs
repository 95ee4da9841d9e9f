//! Application state wiring the pipeline together.
//!
//! AppState holds the concrete component instances used by both the CLI and
//! the HTTP API. Core components are generic over their ports; AppState pins
//! them to the SQLite/LanceDB/OpenAI-compatible implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use sihah_core::event::bus::EventBus;
use sihah_core::event::publisher::EventPublisher;
use sihah_core::ingest::worker::{IngestSettings, IngestWorkerPool};
use sihah_core::knowledge::box_embedder::BoxEmbedder;
use sihah_core::knowledge::box_index::BoxVectorIndex;
use sihah_core::knowledge::indexer::DocumentIndexer;
use sihah_core::knowledge::retriever::ContextRetriever;
use sihah_core::llm::invoker::ModelInvoker;
use sihah_core::llm::registry::ModelRegistry;
use sihah_core::text::analyzer::HebrewAnalyzer;
use sihah_core::turn::orchestrator::{TurnOrchestrator, TurnSettings};
use sihah_infra::config::{data_dir, load_global_config, vector_dir};
use sihah_infra::llm::build_registry;
use sihah_infra::sqlite::conversation::SqliteConversationRepository;
use sihah_infra::sqlite::ingest_queue::SqliteWorkQueue;
use sihah_infra::sqlite::pool::{DatabasePool, default_database_url};
use sihah_infra::vector::embedder::OpenAiEmbedder;
use sihah_infra::vector::lance::LanceVectorIndex;
use sihah_types::config::GlobalConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type Orchestrator = TurnOrchestrator<SqliteConversationRepository>;
pub type IngestPool = IngestWorkerPool<SqliteWorkQueue>;

/// Embedder and vector index shared by retrieval and ingestion.
#[derive(Clone)]
pub struct Knowledge {
    pub embedder: Arc<BoxEmbedder>,
    pub index: Arc<BoxVectorIndex>,
}

/// Shared application state.
///
/// Used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<SqliteWorkQueue>,
    /// `None` when the embedding endpoint is not configured; turns then run
    /// without retrieval and documents stay queued.
    pub indexer: Option<Arc<DocumentIndexer>>,
    pub event_bus: EventBus,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to the DB
    /// and vector store, build providers.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;

        let db_pool = DatabasePool::new(&default_database_url())
            .await
            .context("opening conversation database")?;

        let registry = build_registry(&config.models);

        let knowledge = match OpenAiEmbedder::from_config(&config.embedding) {
            Ok(embedder) => {
                let index =
                    LanceVectorIndex::open(vector_dir(&data_dir), config.embedding.dimension)
                        .await
                        .context("opening knowledge index")?;
                Some(Knowledge {
                    embedder: Arc::new(BoxEmbedder::new(embedder)),
                    index: Arc::new(BoxVectorIndex::new(index)),
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Embedding unavailable, running without knowledge retrieval");
                None
            }
        };

        Ok(Self::assemble(config, data_dir, db_pool, registry, knowledge))
    }

    /// Wire the pipeline from already-built parts.
    pub fn assemble(
        config: GlobalConfig,
        data_dir: PathBuf,
        db_pool: DatabasePool,
        registry: ModelRegistry,
        knowledge: Option<Knowledge>,
    ) -> Self {
        let event_bus = EventBus::new(config.events.capacity);
        let events: Arc<dyn EventPublisher> = Arc::new(event_bus.clone());

        let orchestrator = TurnOrchestrator::new(
            Arc::new(SqliteConversationRepository::new(db_pool.clone())),
            Arc::new(HebrewAnalyzer::new()),
            ModelInvoker::new(Arc::new(registry)),
            events,
            TurnSettings::from_config(&config),
        );

        let (orchestrator, indexer) = match knowledge {
            Some(k) => {
                let retriever =
                    ContextRetriever::new(Arc::clone(&k.embedder), Arc::clone(&k.index));
                let indexer =
                    DocumentIndexer::new(k.embedder, k.index, config.ingest.chunk_chars);
                (orchestrator.with_retriever(retriever), Some(Arc::new(indexer)))
            }
            None => (orchestrator, None),
        };

        Self {
            orchestrator: Arc::new(orchestrator),
            queue: Arc::new(SqliteWorkQueue::new(db_pool)),
            indexer,
            event_bus,
            config: Arc::new(config),
            data_dir,
        }
    }

    /// Build the ingestion worker pool. Fails when no embedder is configured.
    pub fn worker_pool(&self) -> anyhow::Result<IngestPool> {
        let indexer = self
            .indexer
            .clone()
            .context("ingestion needs the [embedding] section configured")?;
        Ok(IngestWorkerPool::new(
            Arc::clone(&self.queue),
            indexer,
            Arc::new(self.event_bus.clone()),
            IngestSettings::from(&self.config.ingest),
        ))
    }
}
