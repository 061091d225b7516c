//! Category administration commands.

use std::io::Write;

use anyhow::Result;
use tg_core::{Category, CategoryId, ProductivityType};
use tg_db::{CategoryUpdate, Database};

/// Prints categories as a table or JSON array.
pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    productivity_type: Option<ProductivityType>,
    json: bool,
) -> Result<()> {
    let categories = db.list_categories(productivity_type)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&categories)?)?;
        return Ok(());
    }

    if categories.is_empty() {
        writeln!(writer, "No categories.")?;
        return Ok(());
    }

    let width = categories
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);
    for category in &categories {
        write!(
            writer,
            "{:<4}  {:<width$}  {}",
            category.id, category.name, category.productivity_type
        )?;
        if let Some(description) = &category.description {
            write!(writer, "  {description}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn add(
    db: &Database,
    name: &str,
    productivity_type: ProductivityType,
    description: Option<&str>,
) -> Result<Category> {
    Ok(db.create_category(name, productivity_type, description)?)
}

pub fn update(db: &Database, id: CategoryId, update: &CategoryUpdate) -> Result<Category> {
    Ok(db.update_category(id, update)?)
}

pub fn remove(db: &Database, id: CategoryId) -> Result<()> {
    Ok(db.delete_category(id)?)
}
