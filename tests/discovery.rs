mod common;

use camino::Utf8PathBuf;

use common::{StubSource, sandbox_config};
use phet_harvester::config::resolve_include_list;
use phet_harvester::languages;
use phet_harvester::store::StateStore;

fn sandbox(root: &std::path::Path) -> StateStore {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    let store = StateStore::new(root.join("state"), root.join("dist"));
    store.reset().unwrap();
    store
}

fn stub() -> StubSource {
    let mut source = StubSource::default();
    source.add_language("en", 100);
    source.add_language("fr", 40);
    source.add_language("es", 30);
    source.add_language("es_MX", 45);
    source.add_language("zh_CN", 25);
    source
}

#[tokio::test]
async fn include_list_always_keeps_english() {
    let temp = tempfile::tempdir().unwrap();
    let store = sandbox(temp.path());
    let mut config = sandbox_config(temp.path());
    config.include_languages = Some(resolve_include_list(vec!["fr".to_string()]).unwrap());

    let languages = languages::discover(&stub(), &config, &store).await.unwrap();
    let slugs: Vec<_> = languages.keys().map(|slug| slug.as_str()).collect();
    assert_eq!(slugs, vec!["en", "fr"]);
}

#[tokio::test]
async fn exclusions_and_variant_collapsing_apply() {
    let temp = tempfile::tempdir().unwrap();
    let store = sandbox(temp.path());
    let mut config = sandbox_config(temp.path());
    config.exclude_languages = vec!["fr".parse().unwrap()];
    config.without_language_variants = true;

    let languages = languages::discover(&stub(), &config, &store).await.unwrap();
    let slugs: Vec<_> = languages.keys().map(|slug| slug.as_str()).collect();
    // es_MX outnumbers es; zh_CN is the named exemption and stays
    assert_eq!(slugs, vec!["en", "es_MX", "zh_CN"]);
}

#[tokio::test]
async fn discovery_persists_the_language_index() {
    let temp = tempfile::tempdir().unwrap();
    let store = sandbox(temp.path());
    let config = sandbox_config(temp.path());

    languages::discover(&stub(), &config, &store).await.unwrap();
    let index = store.read_languages().unwrap();
    assert_eq!(index.len(), 5);
    let es_mx_slug: phet_harvester::domain::LocaleSlug = "es_MX".parse().unwrap();
    let es_mx = index.get(&es_mx_slug).unwrap();
    assert_eq!(es_mx.lang_code, "es");
    assert_eq!(es_mx.local_name, "español (México)");
    assert_eq!(es_mx.count, 45);
}

#[tokio::test]
async fn zero_rows_yield_an_empty_index() {
    let temp = tempfile::tempdir().unwrap();
    let store = sandbox(temp.path());
    let config = sandbox_config(temp.path());

    let languages = languages::discover(&StubSource::default(), &config, &store)
        .await
        .unwrap();
    assert!(languages.is_empty());
    assert!(store.read_languages().unwrap().is_empty());
}
