//! Command execution implementations

use super::Commands;
use super::{extract, info, list, repack, replace};

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying command fails.
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Info { source, json } => info::execute(source, *json),
            Commands::List {
                source,
                class,
                detailed,
            } => list::execute(source, class.as_deref(), *detailed),
            Commands::Extract {
                source,
                export,
                output,
            } => extract::execute(source, *export, output),
            Commands::Replace {
                source,
                export,
                input,
                output,
                mode,
            } => replace::execute(source, *export, input, output.as_deref(), (*mode).into()),
            Commands::Repack {
                source,
                output,
                mode,
                compression,
                marker,
                quiet,
            } => repack::single(
                source,
                output.as_deref(),
                (*mode).into(),
                *compression,
                *marker,
                *quiet,
            ),
            Commands::Batch { dir, mode, marker } => repack::batch(dir, (*mode).into(), *marker),
        }
    }
}
