// crates/tilekeep-core/src/extract.rs

use std::fs::File;
use std::path::{Component, Path};

use tracing::info;
use zip::ZipArchive;

use crate::error::Result;

pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` below `dest_dir` and return the name of the
    /// top-level folder that came out of it.
    fn unpack(&self, archive: &Path, dest_dir: &Path) -> Result<String>;
}

/// Extractor for the zip archives every supported provider delivers.
#[derive(Debug, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn unpack(&self, archive: &Path, dest_dir: &Path) -> Result<String> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)?;

        let folder = top_level_folder(&zip).unwrap_or_else(|| {
            archive
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        std::fs::create_dir_all(dest_dir)?;
        zip.extract(dest_dir)?;
        info!(
            archive = %archive.display(),
            folder = %folder,
            "archive unpacked"
        );
        Ok(folder)
    }
}

fn top_level_folder(zip: &ZipArchive<File>) -> Option<String> {
    for name in zip.file_names() {
        if let Some(Component::Normal(first)) = Path::new(name).components().next() {
            return Some(first.to_string_lossy().into_owned());
        }
    }
    None
}
