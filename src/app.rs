use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::assets;
use crate::catalog;
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::export;
use crate::fetch::Fetcher;
use crate::languages;
use crate::source::SimulationSource;
use crate::store::StateStore;
use crate::taxonomy;
use crate::transform;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A pipeline stage began, with the number of items it will process.
    StageStart { stage: &'static str, total: usize },
    /// One item of the current stage finished.
    Tick { postfix: String },
}

impl ProgressEvent {
    pub fn stage_start(stage: &'static str, total: usize) -> Self {
        ProgressEvent::StageStart { stage, total }
    }

    pub fn tick(postfix: impl Into<String>) -> Self {
        ProgressEvent::Tick {
            postfix: postfix.into(),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Sink that swallows everything; used by tests and non-interactive runs
/// where the tracing output is the progress report.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// What a completed run did, for the final summary line and the JSON
/// summary in non-interactive mode.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub languages: usize,
    pub simulations: usize,
    pub failed_downloads: usize,
    /// Languages whose taxonomy degraded to the English fallback; operators
    /// use this to assess metadata quality.
    pub fallback_languages: Vec<String>,
    pub archives: Vec<String>,
}

/// The whole harvest pipeline. Stages run strictly in sequence, each
/// completing before the next starts, so every stage reads a settled,
/// immutable view of its predecessor's output.
pub struct Pipeline<S> {
    config: HarvestConfig,
    source: S,
    fetcher: Arc<dyn Fetcher>,
    store: StateStore,
}

impl<S: SimulationSource> Pipeline<S> {
    pub fn new(config: HarvestConfig, source: S, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = StateStore::new(
            config.state_dir.clone(),
            config.output_dir.clone(),
        );
        Self {
            config,
            source,
            fetcher,
            store,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn run(&self, sink: &dyn ProgressSink) -> Result<RunSummary, HarvestError> {
        self.store.reset()?;

        let languages =
            languages::discover(&self.source, &self.config, &self.store).await?;

        let taxonomy = taxonomy::build(&self.source, &self.config, &languages).await?;

        let mut build = catalog::build(
            &self.source,
            &self.config,
            &languages,
            &taxonomy,
            &self.store,
            sink,
        )
        .await?;

        let failures = assets::download_all(
            self.fetcher.as_ref(),
            &self.config,
            &build.download_queue,
            &self.store.get_dir(),
            sink,
        )
        .await?;
        assets::evict_failures(&mut build.catalogs, &failures, &self.store)?;

        transform::run(&self.store, sink)?;

        let today = Utc::now().date_naive();
        let targets = export::prepare_targets(&languages, &self.config, today);
        export::validate_targets(&targets)?;

        let mut archives: Vec<Utf8PathBuf> = Vec::new();
        for target in &targets {
            if let Some(sealed) =
                export::export_target(&self.store, &self.config, &languages, target, sink)?
            {
                archives.push(sealed);
            }
        }

        let summary = RunSummary {
            languages: languages.len(),
            simulations: build.catalogs.values().map(|list| list.len()).sum(),
            failed_downloads: failures.len(),
            fallback_languages: taxonomy
                .fallback_languages()
                .iter()
                .map(|slug| slug.to_string())
                .collect(),
            archives: archives.iter().map(|path| path.to_string()).collect(),
        };
        info!(
            "done: {} languages, {} simulations, {} archives",
            summary.languages,
            summary.simulations,
            summary.archives.len()
        );
        Ok(summary)
    }
}
