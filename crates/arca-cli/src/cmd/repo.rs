//! Repository list management

use anyhow::{Context, Result};
use arca_schema::RepositoryRecord;

/// Print registered repositories in search order.
pub fn list() -> Result<()> {
    let (_, store) = crate::context()?;
    let records = store.list().context("Failed to load repositories")?;

    if records.is_empty() {
        println!("No repositories registered. Add one with 'arca repo add'.");
        return Ok(());
    }

    let width = records.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  PRIORITY  TRUSTED  LOCATION", "NAME");
    for record in &records {
        print_row(record, width);
    }
    Ok(())
}

fn print_row(record: &RepositoryRecord, width: usize) {
    println!(
        "{:<width$}  {:>8}  {:<7}  {}",
        record.name,
        record.priority,
        if record.trusted { "yes" } else { "no" },
        record.location
    );
}

pub fn add(name: &str, url: &str, priority: i32, trusted: bool) -> Result<()> {
    let (_, store) = crate::context()?;
    let record = store
        .add(name, url, priority, trusted)
        .with_context(|| format!("Failed to register '{name}'"))?;
    println!("Registered {} at {}", record.name, record.location);
    Ok(())
}

pub fn add_gallery(priority: i32, trusted: bool) -> Result<()> {
    let (_, store) = crate::context()?;
    let record = store
        .add_gallery(priority, trusted)
        .context("Failed to register the gallery")?;
    println!("Registered {} at {}", record.name, record.location);
    Ok(())
}

pub fn remove(name: &str) -> Result<()> {
    let (_, store) = crate::context()?;
    let record = store
        .remove(name)
        .with_context(|| format!("Failed to remove '{name}'"))?;
    println!("Removed {}", record.name);
    Ok(())
}
