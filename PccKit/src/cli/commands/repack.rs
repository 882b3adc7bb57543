//! CLI commands for repacking packages

use std::path::Path;
use std::time::Instant;

use crate::batch::{batch_repack, find_package_files};
use crate::cli::progress::{
    DISK, LOOKING_GLASS, PACKAGE, TRUCK, format_size, print_done, print_step, simple_bar,
};
use crate::compression::CompressionType;
use crate::package::{OpenOptions, SaveMode, SaveOptions, SaveOutcome, SavePhase};

/// Repack a single package
pub fn single(
    source: &Path,
    output: Option<&Path>,
    mode: SaveMode,
    compression: Option<CompressionType>,
    marker: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let target = output.unwrap_or(source);

    if !quiet {
        print_step(1, 2, LOOKING_GLASS, &format!("Reading {}...", source.display()));
    }
    let mut package = OpenOptions::new().open(source)?;

    let mut options = SaveOptions::new().with_marker(marker);
    if let Some(compression) = compression {
        options = options.with_compression(compression);
    }

    if !quiet {
        print_step(2, 2, PACKAGE, &format!("Writing {}...", target.display()));
    }
    let bar = simple_bar(0, SavePhase::PlacingTables.as_str());
    if quiet {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let outcome = package.save_to_file_with_progress(target, mode, &options, &|progress| {
        bar.set_message(progress.phase.as_str());
        bar.set_length(progress.total as u64);
        bar.set_position(progress.current as u64);
    })?;
    bar.finish_and_clear();

    match outcome {
        SaveOutcome::Written {
            compressed,
            relocated_exports,
            deferred_tables,
            size,
        } => {
            println!(
                "{}Wrote {} ({}, {})",
                DISK,
                target.display(),
                if compressed { "compressed" } else { "decompressed" },
                format_size(size)
            );
            if relocated_exports > 0 {
                println!("Relocated {relocated_exports} exports");
            }
            if !deferred_tables.is_empty() {
                let names: Vec<_> = deferred_tables.iter().map(|t| t.as_str()).collect();
                println!("Tables after export data: {}", names.join(", "));
            }
        }
        SaveOutcome::Unchanged => println!("{} is already up to date", target.display()),
        SaveOutcome::Skipped => println!(
            "Skipped {}: tables do not fit in front of the export data",
            source.display()
        ),
    }

    if !quiet {
        print_done(started.elapsed());
    }
    Ok(())
}

/// Repack every package under a directory in place
pub fn batch(dir: &Path, mode: SaveMode, marker: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let files = find_package_files(dir);
    if files.is_empty() {
        println!("No packages found in {}", dir.display());
        return Ok(());
    }

    print_step(1, 1, TRUCK, &format!("Repacking {} packages...", files.len()));
    let bar = simple_bar(files.len() as u64, "Repacking");
    let options = SaveOptions::new().with_marker(marker);
    let result = batch_repack(&files, mode, &options, |progress| {
        bar.set_position(progress.current as u64);
    });
    bar.finish_and_clear();

    for line in result.results.iter().filter(|r| r.starts_with("Failed")) {
        println!("  {line}");
    }
    println!(
        "{} repacked, {} skipped, {} failed",
        result.success_count, result.skipped_count, result.fail_count
    );
    print_done(started.elapsed());

    if result.fail_count > 0 {
        anyhow::bail!("{} packages failed to repack", result.fail_count);
    }
    Ok(())
}
