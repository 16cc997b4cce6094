use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;
use tracing::{error, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::SimulationsList;
use crate::config::HarvestConfig;
use crate::domain::{AssetReference, LocaleSlug};
use crate::error::HarvestError;
use crate::fetch::Fetcher;
use crate::pool;
use crate::store::StateStore;

/// `(id, language)` pairs whose assets could not be downloaded. Every pair
/// in here must be evicted from its persisted catalog.
pub type FailureSet = BTreeSet<(String, LocaleSlug)>;

/// Downloads every queued asset with bounded concurrency through the shared
/// rate-limited fetcher. Individual failures are recorded and the run
/// continues; once more simulations have failed than the configured
/// threshold the whole phase aborts, since that points at a systemic
/// problem rather than isolated bad assets.
pub async fn download_all(
    fetcher: &dyn Fetcher,
    config: &HarvestConfig,
    queue: &[AssetReference],
    dest_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<FailureSet, HarvestError> {
    info!("getting documents and images...");
    sink.event(ProgressEvent::stage_start("assets", queue.len()));

    let failures: Mutex<FailureSet> = Mutex::new(BTreeSet::new());
    let tripped = AtomicBool::new(false);

    pool::map_bounded(config.workers, queue.iter(), |asset| {
        let failures = &failures;
        let tripped = &tripped;
        async move {
            if tripped.load(Ordering::Relaxed) {
                return;
            }

            let file_name = asset.local_file_name();
            let path = dest_dir.join(&file_name);
            match fetcher.fetch(&asset.url).await {
                Ok(body) => {
                    if let Err(err) = tokio::fs::write(path.as_std_path(), &body).await {
                        error!("failed to write {path}: {err}");
                        record_failure(failures, tripped, config.failure_threshold, asset);
                        return;
                    }
                    sink.event(ProgressEvent::tick(file_name));
                    info!(" + {}", path.file_name().unwrap_or_default());
                }
                Err(err) => {
                    // drop any stale copy so nothing half-written survives
                    let _ = std::fs::remove_file(path.as_std_path());
                    if config.verbose_errors {
                        error!(
                            "failed to get url {}: status = {:?}",
                            asset.url,
                            err.status()
                        );
                    } else {
                        warn!(
                            "unable to get simulation data from {}, skipping it",
                            asset.url
                        );
                    }
                    record_failure(failures, tripped, config.failure_threshold, asset);
                    sink.event(ProgressEvent::tick(file_name));
                }
            }
        }
    })
    .await;

    let failures = failures.into_inner().unwrap_or_default();
    if tripped.load(Ordering::Relaxed) {
        return Err(HarvestError::TooManyFailures {
            failed: failures.len(),
            threshold: config.failure_threshold,
        });
    }
    Ok(failures)
}

fn record_failure(
    failures: &Mutex<FailureSet>,
    tripped: &AtomicBool,
    threshold: usize,
    asset: &AssetReference,
) {
    let mut guard = failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert((asset.id.clone(), asset.language.clone()));
    if guard.len() > threshold {
        tripped.store(true, Ordering::Relaxed);
    }
}

/// Corrects the persisted catalogs after the download phase: every failed
/// `(id, language)` pair is removed from its list and the list re-persisted,
/// so nothing in a catalog lacks its assets on disk.
pub fn evict_failures(
    catalogs: &mut BTreeMap<LocaleSlug, SimulationsList>,
    failures: &FailureSet,
    store: &StateStore,
) -> Result<(), HarvestError> {
    let mut touched: BTreeSet<LocaleSlug> = BTreeSet::new();
    for (id, language) in failures {
        if let Some(list) = catalogs.get_mut(language) {
            warn!("evicting {id} from the {language} catalog (asset download failed)");
            list.remove(id);
            touched.insert(language.clone());
        }
    }
    for language in touched {
        if let Some(list) = catalogs.get(&language) {
            list.persist(store)?;
        }
    }
    Ok(())
}
