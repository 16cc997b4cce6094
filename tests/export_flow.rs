mod common;

use std::collections::BTreeMap;
use std::io::Read;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use zip::ZipArchive;

use common::sandbox_config;
use phet_harvester::app::NullSink;
use phet_harvester::domain::{
    Category, ExportTarget, LanguageDescriptor, LocaleSlug, Simulation,
};
use phet_harvester::export;
use phet_harvester::store::StateStore;

const HASH_NAME: &str = "0123456789abcdef0123456789abcdef.png";

fn language_map(slug: &str, local_name: &str) -> BTreeMap<LocaleSlug, LanguageDescriptor> {
    let slug: LocaleSlug = slug.parse().unwrap();
    let descriptor = LanguageDescriptor {
        slug: slug.clone(),
        lang_code: slug.base_code().to_string(),
        name: String::new(),
        local_name: local_name.to_string(),
        source_url: String::new(),
        count: 1,
    };
    BTreeMap::from([(slug, descriptor)])
}

fn target(output: &str, language: &str) -> ExportTarget {
    ExportTarget {
        output: output.to_string(),
        date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        languages: vec![language.parse().unwrap()],
    }
}

fn staged_store(root: &std::path::Path) -> StateStore {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    let store = StateStore::new(root.join("state"), root.join("dist"));
    store.reset().unwrap();
    store
}

#[test]
fn export_rewrites_references_and_attaches_titles() {
    let temp = tempfile::tempdir().unwrap();
    let config = sandbox_config(temp.path());
    let store = staged_store(temp.path());

    let transform = store.transform_dir();
    std::fs::write(
        transform.join("forces_fr.html").as_std_path(),
        br#"<html><head><script src="sim.js"></script></head><body></body></html>"#,
    )
    .unwrap();
    std::fs::write(
        transform.join("sim.js").as_std_path(),
        format!(r#"var splash = "{HASH_NAME}";"#),
    )
    .unwrap();
    std::fs::write(transform.join(HASH_NAME).as_std_path(), b"png-bytes").unwrap();
    std::fs::write(transform.join("forces.png").as_std_path(), b"preview").unwrap();

    let fr: LocaleSlug = "fr".parse().unwrap();
    store
        .write_catalog(
            &fr,
            &[Simulation {
                id: "forces".to_string(),
                language: fr.clone(),
                title: "Forces et mouvement".to_string(),
                categories: vec![Category {
                    title: "Physique".to_string(),
                    slug: "physics".to_string(),
                }],
                topics: Vec::new(),
                description: String::new(),
            }],
        )
        .unwrap();

    let languages = language_map("fr", "français");
    let sealed = export::export_target(
        &store,
        &config,
        &languages,
        &target("phet_fr_all_2024-06", "fr"),
        &NullSink,
    )
    .unwrap()
    .expect("archive should be produced");

    let file = std::fs::File::open(sealed.as_std_path()).unwrap();
    let mut archive = ZipArchive::new(file).unwrap();

    let mut page = String::new();
    archive
        .by_name("A/forces_fr.html")
        .unwrap()
        .read_to_string(&mut page)
        .unwrap();
    assert!(page.contains(r#"src="../-/sim.js""#));

    let mut script = String::new();
    archive
        .by_name("-/sim.js")
        .unwrap()
        .read_to_string(&mut script)
        .unwrap();
    assert!(script.contains(&format!("../I/{HASH_NAME}")));

    // hash-named sub-resource and preview image travel along
    assert!(archive.by_name(&format!("I/{HASH_NAME}")).is_ok());
    assert!(archive.by_name("I/forces.png").is_ok());

    let mut index = String::new();
    archive
        .by_name("M/index.json")
        .unwrap()
        .read_to_string(&mut index)
        .unwrap();
    let entries: serde_json::Value = serde_json::from_str(&index).unwrap();
    let page_entry = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["path"] == "A/forces_fr.html")
        .unwrap();
    assert_eq!(page_entry["title"], "Forces et mouvement");
    assert_eq!(page_entry["mime"], "text/html");

    let mut welcome = String::new();
    archive
        .by_name("M/welcome")
        .unwrap()
        .read_to_string(&mut welcome)
        .unwrap();
    assert_eq!(welcome, "A/index.html");

    let mut catalog_js = String::new();
    archive
        .by_name("-/catalog.js")
        .unwrap()
        .read_to_string(&mut catalog_js)
        .unwrap();
    assert!(catalog_js.contains("français"));
    assert!(catalog_js.contains(r#"window.lsPrefix = "phet_fr_all_2024-06""#));
}

#[test]
fn empty_catalog_skips_the_target_without_an_archive() {
    let temp = tempfile::tempdir().unwrap();
    let config = sandbox_config(temp.path());
    let store = staged_store(temp.path());

    let languages = language_map("de", "Deutsch");
    let result = export::export_target(
        &store,
        &config,
        &languages,
        &target("phet_de_all_2024-06", "de"),
        &NullSink,
    )
    .unwrap();
    assert!(result.is_none());
    assert!(
        std::fs::read_dir(store.dist_dir().as_std_path())
            .unwrap()
            .next()
            .is_none()
    );
}

#[test]
fn documents_of_other_languages_stay_out() {
    let temp = tempfile::tempdir().unwrap();
    let config = sandbox_config(temp.path());
    let store = staged_store(temp.path());

    let transform = store.transform_dir();
    for name in ["forces_fr.html", "forces_de.html"] {
        std::fs::write(
            transform.join(name).as_std_path(),
            b"<html><body></body></html>",
        )
        .unwrap();
    }
    std::fs::write(transform.join("forces.png").as_std_path(), b"preview").unwrap();

    let fr: LocaleSlug = "fr".parse().unwrap();
    store
        .write_catalog(
            &fr,
            &[Simulation {
                id: "forces".to_string(),
                language: fr.clone(),
                title: "Forces".to_string(),
                categories: Vec::new(),
                topics: Vec::new(),
                description: String::new(),
            }],
        )
        .unwrap();

    let languages = language_map("fr", "français");
    let sealed = export::export_target(
        &store,
        &config,
        &languages,
        &target("phet_fr_all_2024-06", "fr"),
        &NullSink,
    )
    .unwrap()
    .unwrap();

    let file = std::fs::File::open(sealed.as_std_path()).unwrap();
    let mut archive = ZipArchive::new(file).unwrap();
    assert!(archive.by_name("A/forces_fr.html").is_ok());
    let names: Vec<String> = {
        let file = std::fs::File::open(sealed.as_std_path()).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    };
    assert!(!names.contains(&"A/forces_de.html".to_string()));
}
