use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::HarvestConfig;
use crate::container::{ContainerBuilder, link_prefix, namespace_for_extension};
use crate::domain::{
    ArchiveMetadata, ExportTarget, LanguageDescriptor, LocaleSlug, Simulation,
    split_id_and_language,
};
use crate::error::HarvestError;
use crate::locale;
use crate::store::StateStore;

const INDEX_TEMPLATE: &str = include_str!("../res/template.html");

/// Longest in-document reference worth extracting; anything longer is data
/// inlined by the upstream build, not a file.
const MAX_RESOURCE_NAME_LEN: usize = 40;

/// Builds the target list for a run: one multi-language archive with the
/// country variants rolled up, plus one archive per language unless the
/// operator asked for the multi-language one only.
pub fn prepare_targets(
    languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
    config: &HarvestConfig,
    today: NaiveDate,
) -> Vec<ExportTarget> {
    let date_postfix = today.format("%Y-%m");
    let mut targets = Vec::new();

    if config.create_mul || config.mul_only {
        let rolled: Vec<LocaleSlug> = languages
            .keys()
            .filter(|slug| {
                !slug.is_variant()
                    || !languages.keys().any(|other| other.as_str() == slug.base_code())
            })
            .cloned()
            .collect();
        targets.push(ExportTarget {
            output: format!("phet_mul_all_{date_postfix}"),
            date: today,
            languages: rolled,
        });
    }

    if !config.mul_only {
        for slug in languages.keys() {
            targets.push(ExportTarget {
                output: format!("phet_{}_all_{}", slug.archive_code(), date_postfix),
                date: today,
                languages: vec![slug.clone()],
            });
        }
    }

    targets
}

/// Every target language must map into ISO 639-3 before any archive work
/// begins; an unmapped slug is a configuration error, not a per-item one.
pub fn validate_targets(targets: &[ExportTarget]) -> Result<(), HarvestError> {
    for target in targets {
        for language in &target.languages {
            if locale::iso639_3(language).is_none() {
                return Err(HarvestError::UnmappedLanguage(language.to_string()));
            }
        }
    }
    Ok(())
}

/// Locale tag sealed into the archive: the ISO 639-3 code for a
/// single-language target, the generic `mul` tag otherwise.
pub fn locale_tag(target: &ExportTarget) -> Result<String, HarvestError> {
    match target.languages.as_slice() {
        [single] => locale::iso639_3(single)
            .map(str::to_string)
            .ok_or_else(|| HarvestError::UnmappedLanguage(single.to_string())),
        _ => Ok("mul".to_string()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedCatalog<'a> {
    language_mappings: &'a BTreeMap<String, String>,
    sims_by_language: &'a BTreeMap<String, Vec<Simulation>>,
}

/// Merged catalog view for one target: the union of the per-language
/// persisted lists, plus the language display mapping and a title lookup
/// for packaged page names.
pub struct MergedCatalog {
    language_mappings: BTreeMap<String, String>,
    sims_by_language: BTreeMap<String, Vec<Simulation>>,
    titles: BTreeMap<(String, String), String>,
}

impl MergedCatalog {
    pub fn load(
        store: &StateStore,
        target: &ExportTarget,
        languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
    ) -> Result<Self, HarvestError> {
        let mut language_mappings = BTreeMap::new();
        let mut sims_by_language = BTreeMap::new();
        let mut titles = BTreeMap::new();

        for slug in &target.languages {
            let simulations = match store.read_catalog(slug) {
                Ok(simulations) => simulations,
                Err(HarvestError::MissingCatalog(_)) => {
                    warn!("failed to get catalog for language {slug}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if simulations.is_empty() {
                continue;
            }
            let local_name = languages
                .get(slug)
                .map(|descriptor| descriptor.local_name.clone())
                .unwrap_or_else(|| slug.to_string());
            language_mappings.insert(slug.to_string(), local_name);
            for simulation in &simulations {
                titles.insert(
                    (slug.to_string(), simulation.id.clone()),
                    simulation.title.clone(),
                );
            }
            sims_by_language.insert(slug.to_string(), simulations);
        }

        Ok(Self {
            language_mappings,
            sims_by_language,
            titles,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sims_by_language.values().all(Vec::is_empty)
    }

    pub fn simulation_count(&self) -> usize {
        self.sims_by_language.values().map(Vec::len).sum()
    }

    /// Display title for a packaged page name like `forces_fr.html`; `None`
    /// for non-page files and for the index itself.
    pub fn title_for(&self, file_name: &str) -> Option<String> {
        if !file_name.ends_with(".html") || file_name == "index.html" {
            return None;
        }
        let (id, language) = split_id_and_language(file_name)?;
        self.titles.get(&(language.to_string(), id)).cloned()
    }

    /// Embeddable script: the catalog payload plus the storage prefix the
    /// index page scopes its state under.
    pub fn to_catalog_script(&self, output: &str) -> Result<String, HarvestError> {
        let embedded = EmbeddedCatalog {
            language_mappings: &self.language_mappings,
            sims_by_language: &self.sims_by_language,
        };
        let json = serde_json::to_string(&embedded).map_err(HarvestError::filesystem)?;
        Ok(format!(
            "window.simCatalog = {json};\nwindow.lsPrefix = \"{output}\";\n"
        ))
    }
}

/// Exports one target: stages its documents with rewritten references,
/// generates the index, and seals everything into the archive container.
/// Returns `None` (after a log line) when the merged catalog is empty.
pub fn export_target(
    store: &StateStore,
    config: &HarvestConfig,
    languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
    target: &ExportTarget,
    sink: &dyn ProgressSink,
) -> Result<Option<Utf8PathBuf>, HarvestError> {
    let staging = store.export_dir().join(&target.output);
    if staging.as_std_path().exists() {
        fs::remove_dir_all(staging.as_std_path()).map_err(HarvestError::filesystem)?;
    }
    fs::create_dir_all(staging.as_std_path()).map_err(HarvestError::filesystem)?;

    extract_resources(&store.transform_dir(), &staging, target)?;

    let catalog = MergedCatalog::load(store, target, languages)?;
    if catalog.is_empty() {
        info!("skipping {}.archive (empty)", target.output);
        return Ok(None);
    }

    fs::write(
        staging.join("index.html").as_std_path(),
        INDEX_TEMPLATE.as_bytes(),
    )
    .map_err(HarvestError::filesystem)?;
    fs::write(
        staging.join("catalog.js").as_std_path(),
        catalog.to_catalog_script(&target.output)?,
    )
    .map_err(HarvestError::filesystem)?;

    let tag = locale_tag(target)?;
    let metadata = ArchiveMetadata {
        name: format!("phet_{tag}_all"),
        title: "PhET Interactive Simulations".to_string(),
        description: "Interactive simulations for science and math".to_string(),
        creator: "University of Colorado".to_string(),
        publisher: "Offline Labs".to_string(),
        language: tag,
        date: target.date.format("%Y-%m-%d").to_string(),
        tags: "phet;simulations;science;math".to_string(),
        source: format!(
            "{}/{}/simulations/",
            config.base_url,
            target
                .languages
                .first()
                .map(LocaleSlug::as_str)
                .unwrap_or("en")
        ),
    };

    info!("creating {}.archive ...", target.output);
    let dest = store.dist_dir().join(format!("{}.archive", target.output));
    let mut builder = ContainerBuilder::create(&dest)?;

    let mut names: Vec<String> = fs::read_dir(staging.as_std_path())
        .map_err(HarvestError::filesystem)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    sink.event(ProgressEvent::stage_start("export", names.len()));
    for name in names {
        let data =
            fs::read(staging.join(&name).as_std_path()).map_err(HarvestError::filesystem)?;
        let ext = name.rsplit('.').next().unwrap_or_default();
        let title = catalog.title_for(&name);
        builder.add_entry(
            namespace_for_extension(ext),
            &name,
            title.as_deref(),
            &data,
        )?;
        sink.event(ProgressEvent::tick(name));
    }
    builder.set_welcome("index.html");

    let sealed = builder.finalize(&metadata)?;
    info!(
        "created {} ({} simulations)",
        sealed,
        catalog.simulation_count()
    );
    Ok(Some(sealed))
}

/// Stages the documents belonging to the target's languages, rewriting
/// their resource references to namespace-prefixed paths and copying the
/// referenced files (and the hash-named sub-resources those reference)
/// alongside.
fn extract_resources(
    transform_dir: &Utf8Path,
    staging: &Utf8Path,
    target: &ExportTarget,
) -> Result<(), HarvestError> {
    let mut documents: Vec<String> = fs::read_dir(transform_dir.as_std_path())
        .map_err(HarvestError::filesystem)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".html"))
        .filter(|name| {
            split_id_and_language(name)
                .is_some_and(|(_, language)| target.languages.contains(&language))
        })
        .collect();
    documents.sort();

    for document in documents {
        if let Err(err) = extract_document(transform_dir, staging, &document) {
            warn!("unable to extract resources from {document}, skipping it: {err}");
        }
    }
    Ok(())
}

fn extract_document(
    transform_dir: &Utf8Path,
    staging: &Utf8Path,
    document: &str,
) -> Result<(), HarvestError> {
    let mut html = fs::read_to_string(transform_dir.join(document).as_std_path())
        .map_err(HarvestError::filesystem)?;

    // the simulation's preview image, referenced by the generated index
    if let Some((id, _)) = split_id_and_language(document) {
        let image = format!("{id}.png");
        let source = transform_dir.join(&image);
        if source.as_std_path().exists() {
            fs::copy(source.as_std_path(), staging.join(&image).as_std_path())
                .map_err(HarvestError::filesystem)?;
        } else {
            warn!("preview image {image} is missing");
        }
    }

    let src_re = Regex::new(r#"src="([^"]+)""#).unwrap();
    let references: std::collections::BTreeSet<String> = src_re
        .captures_iter(&html)
        .map(|caps| caps[1].to_string())
        .filter(|name| name.len() <= MAX_RESOURCE_NAME_LEN && !name.contains("this.image"))
        .collect();

    for reference in references {
        let ext = reference.rsplit('.').next().unwrap_or_default();
        let source = transform_dir.join(&reference);
        let content = match fs::read(source.as_std_path()) {
            Ok(content) => content,
            Err(err) => {
                warn!("referenced resource {reference} is unreadable, skipping it: {err}");
                continue;
            }
        };
        html = html.replace(&reference, &format!("{}{reference}", link_prefix(ext)));

        let content = copy_hash_named_resources(&content, transform_dir, staging)?;
        fs::write(staging.join(&reference).as_std_path(), content)
            .map_err(HarvestError::filesystem)?;
    }

    fs::write(staging.join(document).as_std_path(), html).map_err(HarvestError::filesystem)?;
    Ok(())
}

/// Sub-resources split out during the transform phase are referenced by a
/// fixed 32-hex-character name pattern. Rewrites those references to their
/// namespace prefix and copies the files into staging.
fn copy_hash_named_resources(
    content: &[u8],
    transform_dir: &Utf8Path,
    staging: &Utf8Path,
) -> Result<Vec<u8>, HarvestError> {
    let Ok(text) = std::str::from_utf8(content) else {
        return Ok(content.to_vec());
    };
    let hash_re = Regex::new(r"[0-9a-f]{32}\.(?:svg|jpg|jpeg|png|js)").unwrap();

    let mut rewritten = text.to_string();
    for name in hash_re
        .find_iter(text)
        .map(|found| found.as_str().to_string())
        .collect::<std::collections::BTreeSet<String>>()
    {
        let ext = name.rsplit('.').next().unwrap_or_default();
        let source = transform_dir.join(&name);
        if source.as_std_path().exists() {
            fs::copy(source.as_std_path(), staging.join(&name).as_std_path())
                .map_err(HarvestError::filesystem)?;
        }
        rewritten = rewritten.replace(&name, &format!("{}{name}", link_prefix(ext)));
    }
    Ok(rewritten.into_bytes())
}
