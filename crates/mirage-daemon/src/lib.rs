//! Daemon wiring: builds the stores, provider chain, and pipeline from
//! configuration, and serves the HTTP ingress and observer surface.

pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mirage_core::config::MirageConfig;
use mirage_core::store::{DefenseStore, FileListStore, ForensicStore};
use mirage_engine::artifact::ProtectedArtifact;
use mirage_engine::evidence::{EvidenceService, HttpEvidenceService};
use mirage_engine::evolution::EvolutionEngine;
use mirage_engine::generator::{HttpGenerator, ProviderChain, TextGenerator};
use mirage_engine::pipeline::Pipeline;
use mirage_engine::responder::DeceptionResponder;

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<DefenseStore>,
    pub forensics: Arc<ForensicStore>,
    pub artifact: Arc<ProtectedArtifact>,
    pub evolution: Arc<EvolutionEngine>,
}

pub struct Daemon {
    config: MirageConfig,
    state: AppState,
}

impl Daemon {
    /// Construct every collaborator once and wire the pipeline.
    pub fn new(config: MirageConfig) -> Result<Self> {
        let lists = FileListStore::open(config.data_dir.join("lists"))
            .context("opening list store")?;
        let store = Arc::new(DefenseStore::new(Arc::new(lists)));

        let forensics = Arc::new(
            ForensicStore::open(&config.forensic_db_path).context("opening forensic store")?,
        );

        let artifact = Arc::new(ProtectedArtifact::new(config.artifact_path.clone()));
        artifact.ensure_seeded().context("seeding protected artifact")?;

        let chain = ProviderChain::from_env(&config.generator);
        if chain.is_empty() {
            warn!("no generation provider configured; engagements will fail until a key is set");
        } else if let Some(entry) = chain.active() {
            info!(provider = ?entry.provider, model = %entry.model, "generation provider selected");
        }
        let generator: Arc<dyn TextGenerator> = Arc::new(HttpGenerator::new(
            chain,
            Duration::from_secs(config.generator.request_timeout_secs),
        ));

        let evidence: Option<Arc<dyn EvidenceService>> =
            config.evidence.endpoint.clone().map(|endpoint| {
                Arc::new(HttpEvidenceService::new(
                    endpoint,
                    Duration::from_secs(config.evidence.request_timeout_secs),
                )) as Arc<dyn EvidenceService>
            });
        if evidence.is_none() {
            info!("evidence capture disabled (no endpoint configured)");
        }

        let responder = DeceptionResponder::new(generator.clone(), config.generator.clone());
        let evolution = Arc::new(EvolutionEngine::new(
            generator,
            store.clone(),
            artifact.clone(),
            config.generator.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            forensics.clone(),
            responder,
            evidence,
            evolution.clone(),
            config.auto_evolve,
        ));

        Ok(Self {
            config,
            state: AppState {
                pipeline,
                store,
                forensics,
                artifact,
                evolution,
            },
        })
    }

    /// Serve the ingress on the configured loopback port until shutdown.
    pub async fn run(self) -> Result<()> {
        let app = routes::router(self.state);
        let addr = format!("127.0.0.1:{}", self.config.listen_port);
        info!("mirage listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
