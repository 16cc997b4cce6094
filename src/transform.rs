use std::fs;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8Path;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::HarvestError;
use crate::store::StateStore;

/// Embedded resources smaller than this stay inline; splitting them out
/// buys nothing.
const MIN_EMBED_BYTES: usize = 1024;

/// Script fragments that only make sense online. Documents are scrubbed of
/// any script block mentioning one of these.
const ONLINE_ONLY_MARKERS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "phet.colorado.edu/analytics",
];

/// Prepares downloaded documents for export: splits large base64-embedded
/// resources out into content-hash-named files and scrubs online-only
/// script blocks. Images pass through unmodified.
pub fn run(store: &StateStore, sink: &dyn ProgressSink) -> Result<(), HarvestError> {
    let in_dir = store.get_dir();
    let out_dir = store.transform_dir();

    let mut entries: Vec<_> = fs::read_dir(in_dir.as_std_path())
        .map_err(HarvestError::filesystem)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            let ext = name.rsplit('.').next().unwrap_or_default();
            matches!(ext, "html" | "png" | "jpg" | "jpeg" | "svg")
        })
        .collect();
    entries.sort();

    info!("converting documents...");
    sink.event(ProgressEvent::stage_start("transform", entries.len()));

    for file_name in entries {
        let source = in_dir.join(&file_name);
        let dest = out_dir.join(&file_name);
        let result = if file_name.ends_with(".html") {
            convert_document(&source, &dest, &out_dir)
        } else {
            fs::copy(source.as_std_path(), dest.as_std_path())
                .map(|_| ())
                .map_err(HarvestError::filesystem)
        };
        if let Err(err) = result {
            warn!("unable to transform {file_name}, skipping it: {err}");
        }
        sink.event(ProgressEvent::tick(file_name));
    }
    Ok(())
}

fn convert_document(
    source: &Utf8Path,
    dest: &Utf8Path,
    resource_dir: &Utf8Path,
) -> Result<(), HarvestError> {
    let html = fs::read_to_string(source.as_std_path()).map_err(HarvestError::filesystem)?;
    let html = extract_base64(&html, resource_dir)?;
    let html = remove_online_only_scripts(&html);
    fs::write(dest.as_std_path(), html).map_err(HarvestError::filesystem)?;
    Ok(())
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/svg+xml" => Some("svg"),
        "application/javascript" | "text/javascript" => Some("js"),
        _ => None,
    }
}

/// 32-hex-character content hash used to name split-out resources. The
/// export stage finds these files by this exact pattern when copying
/// sub-resources between staging directories.
fn resource_name(data: &[u8], ext: &str) -> String {
    let digest = Sha256::digest(data);
    format!("{}.{}", &hex::encode(digest)[..32], ext)
}

/// Replaces every sufficiently large `data:` URL with a reference to a
/// hash-named file written next to the documents.
pub(crate) fn extract_base64(
    html: &str,
    resource_dir: &Utf8Path,
) -> Result<String, HarvestError> {
    let data_url_re =
        Regex::new(r#"data:([a-zA-Z0-9.+/-]+);base64,([A-Za-z0-9+/=]+)"#).unwrap();

    let mut output = String::with_capacity(html.len());
    let mut cursor = 0;
    for caps in data_url_re.captures_iter(html) {
        let whole = caps.get(0).unwrap();
        let mime = &caps[1];
        let encoded = &caps[2];

        let Some(ext) = extension_for_mime(mime) else {
            continue;
        };
        if encoded.len() < MIN_EMBED_BYTES {
            continue;
        }
        let Ok(data) = BASE64.decode(encoded) else {
            continue;
        };

        let file_name = resource_name(&data, ext);
        let path = resource_dir.join(&file_name);
        if !path.as_std_path().exists() {
            fs::write(path.as_std_path(), &data).map_err(HarvestError::filesystem)?;
        }

        output.push_str(&html[cursor..whole.start()]);
        output.push_str(&file_name);
        cursor = whole.end();
    }
    output.push_str(&html[cursor..]);
    Ok(output)
}

pub(crate) fn remove_online_only_scripts(html: &str) -> String {
    let script_re = Regex::new(r"(?s)<script\b[^>]*>.*?</script>").unwrap();
    script_re
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let block = &caps[0];
            if ONLINE_ONLY_MARKERS.iter().any(|marker| block.contains(marker)) {
                String::new()
            } else {
                block.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn splits_large_png_out_and_rewrites_reference() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let encoded = BASE64.encode(vec![7u8; 2048]);
        let html = format!(r#"<img src="data:image/png;base64,{encoded}">"#);
        let rewritten = extract_base64(&html, &dir).unwrap();

        assert!(!rewritten.contains("base64"));
        let name_re = Regex::new(r#"src="([0-9a-f]{32}\.png)""#).unwrap();
        let caps = name_re.captures(&rewritten).expect("hash-named reference");
        assert!(dir.join(&caps[1]).as_std_path().exists());
    }

    #[test]
    fn small_embeds_stay_inline() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let encoded = BASE64.encode(b"tiny");
        let html = format!(r#"<img src="data:image/png;base64,{encoded}">"#);
        let rewritten = extract_base64(&html, &dir).unwrap();
        assert_eq!(rewritten, html);
    }

    #[test]
    fn unknown_mime_stays_inline() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let encoded = BASE64.encode(vec![1u8; 2048]);
        let html = format!(r#"<embed src="data:audio/ogg;base64,{encoded}">"#);
        let rewritten = extract_base64(&html, &dir).unwrap();
        assert_eq!(rewritten, html);
    }

    #[test]
    fn identical_content_reuses_one_file() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let encoded = BASE64.encode(vec![9u8; 4096]);
        let html = format!(
            r#"<img src="data:image/png;base64,{encoded}"><img src="data:image/png;base64,{encoded}">"#
        );
        extract_base64(&html, &dir).unwrap();
        let files: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn analytics_scripts_are_scrubbed() {
        let html = concat!(
            "<script src=\"sim.js\"></script>",
            "<script>var x = 'https://www.google-analytics.com/ga.js';</script>",
            "<p>keep me</p>"
        );
        let scrubbed = remove_online_only_scripts(html);
        assert!(scrubbed.contains("sim.js"));
        assert!(scrubbed.contains("keep me"));
        assert!(!scrubbed.contains("google-analytics"));
    }
}
