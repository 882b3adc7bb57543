//! CLI command for listing exports

use std::path::Path;

use crate::cli::progress::format_size;
use crate::package::{LoadLevel, OpenOptions};

pub fn execute(source: &Path, class: Option<&str>, detailed: bool) -> anyhow::Result<()> {
    let package = OpenOptions::new().with_level(LoadLevel::Tables).open(source)?;

    let mut shown = 0;
    for (id, export) in package.exports().iter().enumerate() {
        let class_name = package.export_class_name(id)?;
        if class.is_some_and(|c| !c.eq_ignore_ascii_case(class_name)) {
            continue;
        }
        let object_name = package.export_object_name(id)?;
        if detailed {
            println!(
                "{:>6}  {:<32} {:<40} {:>10} {:>10}",
                id,
                class_name,
                object_name,
                export.data_offset(),
                format_size(u64::from(export.data_size()))
            );
        } else {
            println!("{id:>6}  {class_name}'{object_name}'");
        }
        shown += 1;
    }

    println!("\n{shown} of {} exports", package.exports().len());
    Ok(())
}
