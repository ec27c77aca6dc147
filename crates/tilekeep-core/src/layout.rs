// crates/tilekeep-core/src/layout.rs

use std::io;
use std::path::{Path, PathBuf};

use crate::naming;
use crate::types::PoiRecord;

/// On-disk layout below the data directory: downloaded archives, unpacked
/// tile folders and crop outputs each live under their own prefix.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.root.join("tiles")
    }

    pub fn crops_dir(&self) -> PathBuf {
        self.root.join("crops")
    }

    /// Where a tile's downloaded archive lands.
    pub fn archive_path(&self, folder_name: &str) -> PathBuf {
        self.archives_dir().join(format!("{}.zip", folder_name))
    }

    /// Where a tile's unpacked folder lives.
    pub fn tile_dir(&self, folder_name: &str) -> PathBuf {
        self.tiles_dir().join(folder_name)
    }

    /// Per-POI crop output directory, named by the request key.
    pub fn crop_dir(&self, poi: &PoiRecord) -> PathBuf {
        self.crops_dir().join(naming::poi_dir_name(poi))
    }

    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.archives_dir())?;
        std::fs::create_dir_all(self.tiles_dir())?;
        std::fs::create_dir_all(self.crops_dir())?;
        Ok(())
    }
}
