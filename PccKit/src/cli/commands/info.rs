//! CLI command for package information

use std::path::Path;

use crate::cli::progress::format_size;
use crate::package::Package;

pub fn execute(source: &Path, json: bool) -> anyhow::Result<()> {
    let package = Package::open(source)?;
    let summary = package.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Package Information: {}", source.display());
    println!();
    println!("Version: {}", summary.version.to_u16());
    println!("Compression: {}", summary.compression.as_str());
    if summary.chunks > 0 {
        println!("Chunks: {}", summary.chunks);
        for chunk in package.chunks() {
            println!(
                "  {:>10} @ {:<10} -> {:>10} @ {}",
                format_size(u64::from(chunk.compressed_size)),
                chunk.compressed_offset,
                format_size(u64::from(chunk.uncompressed_size)),
                chunk.uncompressed_offset
            );
        }
    }
    println!();
    println!("Names:   {:>6}  @ {}", summary.names, summary.names_offset);
    println!("Imports: {:>6}  @ {}", summary.imports, summary.imports_offset);
    println!("Exports: {:>6}  @ {}", summary.exports, summary.exports_offset);
    println!();
    println!("End of tables: {}", summary.end_of_tables);
    println!("End of data:   {}", summary.exports_end_offset);
    if summary.marked {
        println!("Processed marker present");
    }

    Ok(())
}
