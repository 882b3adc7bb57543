//! # PccKit
//!
//! A pure-Rust library for Unreal Engine 3 package files (`.pcc`, `.upk`,
//! `.sfm`) as shipped by the Mass Effect games.
//!
//! ## Features
//!
//! - **Tables** - Load names, imports, exports, depends and guids
//! - **Chunked compression** - Lazy decompression of one chunk at a time,
//!   Zlib built in, LZO and Oodle pluggable through [`compression::BlockCodec`]
//! - **Export replacement** - Swap payloads, rename names, and rewrite the
//!   package with consistent offsets
//!
//! ## Quick Start
//!
//! ```no_run
//! use pcckit::prelude::*;
//!
//! let mut package = Package::open("Startup_INT.pcc")?;
//! println!("{} exports", package.exports().len());
//!
//! let data = package.export_data(0)?;
//! package.set_export_data(0, data)?;
//! package.save_to_file("Startup_INT.pcc", SaveMode::ForceDecompressed, &SaveOptions::default())?;
//! # Ok::<(), pcckit::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `pcckit` command-line binary

pub mod batch;
pub mod compression;
pub mod error;
pub mod package;

pub use error::{Error, ErrorKind, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};

    pub use crate::compression::{BlockCodec, CodecSet, CompressionType, ZlibCodec};

    pub use crate::package::{
        ChunkCache, LoadLevel, OpenOptions, Package, PackageVersion, SaveMode, SaveOptions,
        SaveOutcome, SaveProgress, SingleChunkCache,
    };

    pub use crate::batch::{BatchRepackResult, batch_repack, find_package_files};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
