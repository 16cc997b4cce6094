use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{LanguageDescriptor, LocaleSlug, Simulation};
use crate::error::HarvestError;

/// Staging-directory layout for one run. Every stage reads from and writes
/// to a fixed subtree so that later stages see a complete, settled view of
/// earlier output.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_root: Utf8PathBuf,
    dist_root: Utf8PathBuf,
}

impl StateStore {
    pub fn new(state_root: Utf8PathBuf, dist_root: Utf8PathBuf) -> Self {
        Self {
            state_root,
            dist_root,
        }
    }

    pub fn get_dir(&self) -> Utf8PathBuf {
        self.state_root.join("get")
    }

    pub fn catalogs_dir(&self) -> Utf8PathBuf {
        self.get_dir().join("catalogs")
    }

    pub fn transform_dir(&self) -> Utf8PathBuf {
        self.state_root.join("transform")
    }

    pub fn export_dir(&self) -> Utf8PathBuf {
        self.state_root.join("export")
    }

    pub fn dist_dir(&self) -> Utf8PathBuf {
        self.dist_root.clone()
    }

    pub fn languages_path(&self) -> Utf8PathBuf {
        self.get_dir().join("languages.json")
    }

    pub fn catalog_path(&self, language: &LocaleSlug) -> Utf8PathBuf {
        self.catalogs_dir().join(format!("{language}.json"))
    }

    /// Recreates the staging tree from scratch. Output archives in `dist`
    /// are left alone.
    pub fn reset(&self) -> Result<(), HarvestError> {
        if self.state_root.as_std_path().exists() {
            fs::remove_dir_all(self.state_root.as_std_path())
                .map_err(HarvestError::filesystem)?;
        }
        for dir in [
            self.get_dir(),
            self.catalogs_dir(),
            self.transform_dir(),
            self.export_dir(),
            self.dist_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path()).map_err(HarvestError::filesystem)?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path()).map_err(HarvestError::filesystem)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content).map_err(HarvestError::filesystem)?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(HarvestError::filesystem)?;
        Ok(())
    }

    pub fn write_languages(
        &self,
        languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
    ) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(languages).map_err(HarvestError::filesystem)?;
        Self::write_bytes_atomic(&self.languages_path(), &content)
    }

    pub fn read_languages(
        &self,
    ) -> Result<BTreeMap<LocaleSlug, LanguageDescriptor>, HarvestError> {
        let content = fs::read_to_string(self.languages_path().as_std_path())
            .map_err(HarvestError::filesystem)?;
        serde_json::from_str(&content).map_err(HarvestError::filesystem)
    }

    /// Persists one language's catalog. The list must already be in its
    /// final order; array order is significant in the on-disk format.
    pub fn write_catalog(
        &self,
        language: &LocaleSlug,
        simulations: &[Simulation],
    ) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(simulations).map_err(HarvestError::filesystem)?;
        Self::write_bytes_atomic(&self.catalog_path(language), &content)
    }

    pub fn read_catalog(&self, language: &LocaleSlug) -> Result<Vec<Simulation>, HarvestError> {
        let path = self.catalog_path(language);
        if !path.as_std_path().exists() {
            return Err(HarvestError::MissingCatalog(language.to_string()));
        }
        let content =
            fs::read_to_string(path.as_std_path()).map_err(HarvestError::filesystem)?;
        serde_json::from_str(&content).map_err(HarvestError::filesystem)
    }

    /// Lists the locale slugs that have a persisted catalog.
    pub fn catalog_languages(&self) -> Result<Vec<LocaleSlug>, HarvestError> {
        let dir = self.catalogs_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut slugs = Vec::new();
        for entry in fs::read_dir(dir.as_std_path()).map_err(HarvestError::filesystem)? {
            let entry = entry.map_err(HarvestError::filesystem)?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(slug) = stem.parse() {
                slugs.push(slug);
            }
        }
        slugs.sort();
        Ok(slugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, StateStore) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = StateStore::new(root.join("state"), root.join("dist"));
        store.reset().unwrap();
        (temp, store)
    }

    fn simulation(id: &str, language: &str, title: &str) -> Simulation {
        Simulation {
            id: id.to_string(),
            language: language.parse().unwrap(),
            title: title.to_string(),
            categories: Vec::new(),
            topics: Vec::new(),
            description: String::new(),
        }
    }

    #[test]
    fn layout_paths() {
        let store = StateStore::new(Utf8PathBuf::from("state"), Utf8PathBuf::from("dist"));
        let lang: LocaleSlug = "pt_BR".parse().unwrap();
        assert_eq!(store.catalog_path(&lang), "state/get/catalogs/pt_BR.json");
        assert_eq!(store.languages_path(), "state/get/languages.json");
        assert_eq!(store.transform_dir(), "state/transform");
    }

    #[test]
    fn catalog_round_trip_preserves_order() {
        let (_temp, store) = sandbox();
        let lang: LocaleSlug = "fr".parse().unwrap();
        let sims = vec![
            simulation("alpha", "fr", "Alpha"),
            simulation("beta", "fr", "Beta"),
        ];
        store.write_catalog(&lang, &sims).unwrap();
        assert_eq!(store.read_catalog(&lang).unwrap(), sims);
        assert_eq!(store.catalog_languages().unwrap(), vec![lang]);
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let (_temp, store) = sandbox();
        let lang: LocaleSlug = "fr".parse().unwrap();
        assert!(matches!(
            store.read_catalog(&lang),
            Err(HarvestError::MissingCatalog(_))
        ));
    }

    #[test]
    fn reset_clears_previous_state() {
        let (_temp, store) = sandbox();
        let marker = store.get_dir().join("marker.txt");
        fs::write(marker.as_std_path(), b"x").unwrap();
        store.reset().unwrap();
        assert!(!marker.as_std_path().exists());
    }
}
