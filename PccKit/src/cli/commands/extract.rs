//! CLI command for extracting an export payload

use std::path::Path;

use crate::package::{LoadLevel, OpenOptions};

pub fn execute(source: &Path, export: usize, output: &Path) -> anyhow::Result<()> {
    let mut package = OpenOptions::new().with_level(LoadLevel::Tables).open(source)?;
    let data = package.export_data(export)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &data)?;

    println!(
        "Extracted export {} ({}) to {} ({} bytes)",
        export,
        package.export_object_name(export)?,
        output.display(),
        data.len()
    );
    Ok(())
}
