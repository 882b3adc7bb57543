//! CLI command for replacing an export payload

use std::path::Path;

use crate::package::{Package, SaveMode, SaveOptions, SaveOutcome};

pub fn execute(
    source: &Path,
    export: usize,
    input: &Path,
    output: Option<&Path>,
    mode: SaveMode,
) -> anyhow::Result<()> {
    let data = std::fs::read(input)?;
    let mut package = Package::open(source)?;
    let old_size = package.export(export)?.data_size();
    package.set_export_data(export, data)?;

    let target = output.unwrap_or(source);
    let outcome = package.save_to_file(target, mode, &SaveOptions::default())?;

    println!(
        "Replaced export {} ({}): {} -> {} bytes",
        export,
        package.export_object_name(export)?,
        old_size,
        package.export(export)?.data_size()
    );
    if let SaveOutcome::Written {
        relocated_exports,
        deferred_tables,
        ..
    } = outcome
    {
        if relocated_exports > 0 {
            println!("Relocated {relocated_exports} exports to make room for the tables");
        }
        for table in deferred_tables {
            println!("Moved the {} table after the export data", table.as_str());
        }
    }
    println!("Saved {}", target.display());
    Ok(())
}
