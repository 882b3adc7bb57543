use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::compression::CompressionType;
use crate::package::SaveMode;

pub mod execute;
pub mod extract;
pub mod info;
pub mod list;
pub mod repack;
pub mod replace;

/// Output representation for commands that save
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Keep the source representation
    Original,
    /// Chunk-compressed output
    Compressed,
    /// Plain decompressed output
    Decompressed,
}

impl From<ModeArg> for SaveMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Original => SaveMode::AsOriginal,
            ModeArg::Compressed => SaveMode::ForceCompressed,
            ModeArg::Decompressed => SaveMode::ForceDecompressed,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show header and table information
    Info {
        /// Package file
        source: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List exports
    List {
        /// Package file
        source: PathBuf,

        /// Only list exports of this class
        #[arg(long)]
        class: Option<String>,

        /// Show data offset and size
        #[arg(short, long)]
        detailed: bool,
    },

    /// Write an export's payload to a file
    Extract {
        /// Package file
        source: PathBuf,

        /// Export index
        #[arg(short, long)]
        export: usize,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace an export's payload and save the package
    Replace {
        /// Package file
        source: PathBuf,

        /// Export index
        #[arg(short, long)]
        export: usize,

        /// File holding the new payload
        #[arg(short, long)]
        input: PathBuf,

        /// Output package (defaults to overwriting the source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output representation
        #[arg(long, value_enum, default_value = "original")]
        mode: ModeArg,
    },

    /// Rewrite a package, optionally changing its compression
    Repack {
        /// Package file
        source: PathBuf,

        /// Output package (defaults to overwriting the source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output representation
        #[arg(long, value_enum, default_value = "original")]
        mode: ModeArg,

        /// Codec for compressed output (zlib, lzo, oodle)
        #[arg(long)]
        compression: Option<CompressionType>,

        /// Append the processed marker
        #[arg(long)]
        marker: bool,

        /// Suppress progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Repack every package under a directory in place
    Batch {
        /// Directory to search for packages
        dir: PathBuf,

        /// Output representation
        #[arg(long, value_enum, default_value = "original")]
        mode: ModeArg,

        /// Append the processed marker
        #[arg(long)]
        marker: bool,
    },
}
