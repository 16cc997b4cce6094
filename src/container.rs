use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::domain::ArchiveMetadata;
use crate::error::HarvestError;

/// Addressing namespace of a packaged file, chosen from its MIME type.
/// Pages, assets and images are linked with different prefixes inside
/// rewritten documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Browsable HTML pages.
    Article,
    /// Scripts, styles, fonts and anything unrecognized.
    Asset,
    /// Raster and vector images.
    Image,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Article => "A",
            Namespace::Asset => "-",
            Namespace::Image => "I",
        }
    }
}

/// MIME type by file extension; unknown extensions are treated as generic
/// binary assets.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

pub fn namespace_for_extension(ext: &str) -> Namespace {
    match mime_for_extension(ext) {
        "text/html" => Namespace::Article,
        mime if mime.starts_with("image/") => Namespace::Image,
        _ => Namespace::Asset,
    }
}

/// Link prefix for referencing a file of the given extension from inside a
/// packaged page.
pub fn link_prefix(ext: &str) -> String {
    format!("../{}/", namespace_for_extension(ext).prefix())
}

#[derive(Debug, Serialize)]
struct EntryRecord {
    path: String,
    mime: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

/// Archive container under construction. Entries are written to a temp file
/// next to the destination; nothing appears at the destination path until
/// `finalize` succeeds, so a failed build never leaves a partial archive
/// behind.
pub struct ContainerBuilder {
    writer: ZipWriter<NamedTempFile>,
    dest: Utf8PathBuf,
    entries: Vec<EntryRecord>,
    welcome: Option<String>,
}

impl ContainerBuilder {
    pub fn create(dest: &Utf8Path) -> Result<Self, HarvestError> {
        let parent = dest
            .parent()
            .ok_or_else(|| HarvestError::Container("destination has no parent".to_string()))?;
        std::fs::create_dir_all(parent.as_std_path()).map_err(HarvestError::filesystem)?;
        let temp = NamedTempFile::new_in(parent.as_std_path())
            .map_err(HarvestError::filesystem)?;
        Ok(Self {
            writer: ZipWriter::new(temp),
            dest: dest.to_path_buf(),
            entries: Vec::new(),
            welcome: None,
        })
    }

    /// Adds one file under its namespace. `title` is the human label shown
    /// by readers browsing the archive; pages carry their simulation title.
    pub fn add_entry(
        &mut self,
        namespace: Namespace,
        name: &str,
        title: Option<&str>,
        data: &[u8],
    ) -> Result<(), HarvestError> {
        let path = format!("{}/{}", namespace.prefix(), name);
        let ext = name.rsplit('.').next().unwrap_or_default();
        self.write_file(&path, data)?;
        debug!("packed {path}");
        self.entries.push(EntryRecord {
            path,
            mime: mime_for_extension(ext),
            title: title.map(str::to_string),
        });
        Ok(())
    }

    /// Marks the archive's entry-point page (a name previously added under
    /// the article namespace).
    pub fn set_welcome(&mut self, name: &str) {
        self.welcome = Some(format!("{}/{}", Namespace::Article.prefix(), name));
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Seals the archive: writes the metadata block and the entry index,
    /// closes the container and atomically moves it to the destination.
    pub fn finalize(mut self, metadata: &ArchiveMetadata) -> Result<Utf8PathBuf, HarvestError> {
        let meta_json =
            serde_json::to_vec_pretty(metadata).map_err(HarvestError::filesystem)?;
        self.write_file("M/metadata.json", &meta_json)?;

        let index_json =
            serde_json::to_vec_pretty(&self.entries).map_err(HarvestError::filesystem)?;
        self.write_file("M/index.json", &index_json)?;

        if let Some(welcome) = self.welcome.clone() {
            self.write_file("M/welcome", welcome.as_bytes())?;
        }

        let temp = self
            .writer
            .finish()
            .map_err(|err| HarvestError::Container(err.to_string()))?;
        temp.persist(self.dest.as_std_path())
            .map_err(|err| HarvestError::Container(err.to_string()))?;
        Ok(self.dest)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), HarvestError> {
        self.writer
            .start_file(path, SimpleFileOptions::default())
            .map_err(|err| HarvestError::Container(err.to_string()))?;
        self.writer
            .write_all(data)
            .map_err(|err| HarvestError::Container(err.to_string()))?;
        Ok(())
    }
}
