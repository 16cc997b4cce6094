use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::domain::{LanguageDescriptor, LocaleSlug};
use crate::error::HarvestError;
use crate::locale;
use crate::source::{LanguageRow, SimulationSource};
use crate::store::StateStore;

/// Country variants that never participate in variant collapsing. Kept as a
/// named special case: the intent upstream is "keep this particular
/// variant", nothing more general.
pub const VARIANT_COLLAPSE_EXEMPT: &[&str] = &["zh_CN"];

/// Resolves the language set every downstream stage iterates over and
/// persists it as the durable language index.
pub async fn discover(
    source: &dyn SimulationSource,
    config: &HarvestConfig,
    store: &StateStore,
) -> Result<BTreeMap<LocaleSlug, LanguageDescriptor>, HarvestError> {
    let rows = source.language_rows().await?;
    if rows.is_empty() {
        warn!("language discovery returned zero rows; nothing to catalog");
        store.write_languages(&BTreeMap::new())?;
        return Ok(BTreeMap::new());
    }

    let mut languages: BTreeMap<LocaleSlug, LanguageDescriptor> = BTreeMap::new();
    for row in rows {
        if let Some(include) = &config.include_languages
            && !include.contains(&row.slug)
        {
            continue;
        }
        if config.exclude_languages.contains(&row.slug) {
            continue;
        }
        languages.insert(row.slug.clone(), descriptor_for(row));
    }

    if config.without_language_variants {
        languages = collapse_variants(languages, VARIANT_COLLAPSE_EXEMPT);
    }

    store.write_languages(&languages)?;
    info!("got {} languages", languages.len());
    Ok(languages)
}

fn descriptor_for(row: LanguageRow) -> LanguageDescriptor {
    LanguageDescriptor {
        lang_code: row.slug.base_code().to_string(),
        name: locale::english_name(&row.slug),
        local_name: locale::native_name(&row.slug),
        source_url: row.url,
        count: row.count,
        slug: row.slug,
    }
}

/// Keeps one slug per base language code: the one advertising more
/// simulations, with ties going to the macro-language code. Slugs on the
/// exempt list are always kept verbatim, regardless of count.
pub fn collapse_variants(
    languages: BTreeMap<LocaleSlug, LanguageDescriptor>,
    exempt: &[&str],
) -> BTreeMap<LocaleSlug, LanguageDescriptor> {
    let mut kept: BTreeMap<LocaleSlug, LanguageDescriptor> = BTreeMap::new();
    let mut best_per_base: BTreeMap<String, LanguageDescriptor> = BTreeMap::new();

    for (slug, descriptor) in languages {
        if exempt.contains(&slug.as_str()) {
            info!("using {} simulations for {} language", slug, slug.base_code());
            kept.insert(slug, descriptor);
            continue;
        }
        let base = slug.base_code().to_string();
        let replace = match best_per_base.get(&base) {
            Some(current) => loses_to(current, &descriptor),
            None => true,
        };
        if replace {
            best_per_base.insert(base, descriptor);
        } else {
            info!("skipping {} language", slug);
        }
    }

    for (_, descriptor) in best_per_base {
        kept.insert(descriptor.slug.clone(), descriptor);
    }
    kept
}

/// Whether `current` should be replaced by `challenger`. Higher count wins;
/// on a tie the macro-language code (no country variant) wins.
fn loses_to(current: &LanguageDescriptor, challenger: &LanguageDescriptor) -> bool {
    if challenger.count != current.count {
        return challenger.count > current.count;
    }
    current.slug.is_variant() && !challenger.slug.is_variant()
}
