//! Ephemtree: planetary ephemerides and reference-frame-tree consistency
//!
//! This crate maintains a registry of celestial bodies and ephemeris
//! providers, keeps a tree of reference frames consistent with the set of
//! bodies a simulation currently needs, and interpolates body states from
//! versioned binary ephemeris table files.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod adapter;
pub mod constants;
pub mod ephemfile;
pub mod framelib;
pub mod items;
pub mod manager;
pub mod providers;

// Re-export commonly used types
pub use adapter::{BodyStatus, FileEphemerisProvider};
pub use ephemfile::{EphemFileError, EphemerisTable, TargetBody};
pub use framelib::{FrameError, FrameId, FrameState, FrameTree};
pub use items::{ItemAspect, ItemError, ItemId};
pub use manager::{EphemeridesManager, EphemerisProvider};

/// Main error type for the ephemtree library
#[derive(Debug, Error)]
pub enum EphemError {
    /// A registration or configuration step was abandoned; the simulation
    /// may continue partially configured
    #[error("Setup error: {0}")]
    Setup(String),

    /// A requested model fidelity references a missing sub-model
    #[error("Fidelity error: {0}")]
    Fidelity(String),

    /// An invariant was violated; signals an integration defect
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Ephemeris file error: {0}")]
    File(#[from] EphemFileError),

    #[error("Frame tree error: {0}")]
    Frame(#[from] FrameError),

    #[error("Item error: {0}")]
    Item(#[from] ItemError),
}

/// Result type for ephemtree operations
pub type Result<T> = std::result::Result<T, EphemError>;

/// Entry point for loading ephemeris data
pub struct Loader {
    data_dir: Option<PathBuf>,
    single_point_source: bool,
}

impl Loader {
    /// Create a new loader with no data directory
    pub fn new() -> Self {
        Self {
            data_dir: None,
            single_point_source: false,
        }
    }

    /// Set a custom data directory
    pub fn with_data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Configure the manager for a single translation source
    pub fn single_point_source(mut self, single: bool) -> Self {
        self.single_point_source = single;
        self
    }

    /// Open an ephemeris table file, resolving the name against the data
    /// directory if one is set
    pub fn load_ephemeris_table<P: AsRef<Path>>(
        &self,
        name: P,
        model_id: u32,
    ) -> Result<EphemerisTable> {
        let path = match &self.data_dir {
            Some(dir) => dir.join(name.as_ref()),
            None => name.as_ref().to_path_buf(),
        };
        Ok(EphemerisTable::open(path, model_id)?)
    }

    /// Create an ephemerides manager with this loader's configuration
    pub fn manager(&self) -> EphemeridesManager {
        let mut manager = EphemeridesManager::new();
        manager.set_single_point_source(self.single_point_source);
        manager
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
