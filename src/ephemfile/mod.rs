//! Binary ephemeris tables
//!
//! Reading, interpolating, and generating versioned binary ephemeris files.
//! A table holds Chebyshev coefficient records for the solar-system bodies
//! over contiguous time segments; the reader memory-maps the file, validates
//! the header, and evaluates position and velocity for any covered epoch.

pub mod bodies;
pub mod chebyshev;
pub mod errors;
pub mod format;
pub mod reader;
pub mod synthetic;

pub use bodies::{FileItem, TargetBody, N_FILE_ITEMS};
pub use chebyshev::ChebyshevTables;
pub use errors::{EphemFileError, Result};
pub use format::{ItemDescriptor, SegmentDescriptor, TableBuilder, TableHeader, FORMAT_VERSION};
pub use reader::{collinear_l1_fraction, EphemerisTable, MAX_ITEMS};
pub use synthetic::{SyntheticModel, SYNTHETIC_MODEL_ID};
