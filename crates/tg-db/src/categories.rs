//! Productivity category registry and administration.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tg_core::{Category, CategoryId, CategoryRegistry, ProductivityType, ValidationError};

use crate::{Database, DbError, format_timestamp};

const CATEGORY_COLUMNS: &str = "id, name, productivity_type, description";

/// Changes to apply in [`Database::update_category`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub productivity_type: Option<ProductivityType>,
    pub description: Option<String>,
}

type CategoryRow = (CategoryId, String, String, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<CategoryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_category((id, name, productivity_type, description): CategoryRow) -> Result<Category, DbError> {
    Ok(Category {
        id,
        name,
        productivity_type: productivity_type.parse()?,
        description,
    })
}

fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Category>, DbError> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM app_categories WHERE name = ?"),
        [name],
        read_row,
    )
    .optional()?
    .map(into_category)
    .transpose()
}

fn find_by_id(conn: &Connection, id: CategoryId) -> Result<Option<Category>, DbError> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM app_categories WHERE id = ?"),
        [id],
        read_row,
    )
    .optional()?
    .map(into_category)
    .transpose()
}

fn insert(
    conn: &Connection,
    name: &str,
    productivity_type: ProductivityType,
    description: Option<&str>,
) -> Result<usize, DbError> {
    let now = format_timestamp(&Utc::now());
    let inserted = conn.execute(
        "
        INSERT INTO app_categories (name, productivity_type, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(name) DO NOTHING
        ",
        params![name, productivity_type.as_str(), description, now, now],
    )?;
    Ok(inserted)
}

fn validate_name(name: &str) -> Result<(), DbError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "category name",
        }
        .into());
    }
    Ok(())
}

impl CategoryRegistry for Database {
    type Error = DbError;

    fn find_by_name(&self, name: &str) -> Result<Option<Category>, DbError> {
        find_by_name(&self.conn(), name)
    }

    fn list_all(&self) -> Result<Vec<Category>, DbError> {
        self.list_categories(None)
    }

    /// Inserts unless a category with the same name exists, then reads back.
    /// Losing a concurrent insert is indistinguishable from finding it.
    fn create(
        &self,
        name: &str,
        productivity_type: ProductivityType,
        description: Option<&str>,
    ) -> Result<Category, DbError> {
        validate_name(name)?;
        let conn = self.conn();
        insert(&conn, name, productivity_type, description)?;
        find_by_name(&conn, name)?.ok_or_else(|| DbError::DuplicateCategory {
            name: name.to_string(),
        })
    }
}

impl Database {
    /// Creates a category, failing if the name is taken.
    pub fn create_category(
        &self,
        name: &str,
        productivity_type: ProductivityType,
        description: Option<&str>,
    ) -> Result<Category, DbError> {
        validate_name(name)?;
        let conn = self.conn();
        if insert(&conn, name, productivity_type, description)? == 0 {
            return Err(DbError::DuplicateCategory {
                name: name.to_string(),
            });
        }
        let id = conn.last_insert_rowid();
        find_by_id(&conn, id)?.ok_or(DbError::CategoryNotFound(id))
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Option<Category>, DbError> {
        find_by_id(&self.conn(), id)
    }

    /// Lists categories in creation order, optionally of one type.
    pub fn list_categories(
        &self,
        productivity_type: Option<ProductivityType>,
    ) -> Result<Vec<Category>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {CATEGORY_COLUMNS}
            FROM app_categories
            WHERE ?1 IS NULL OR productivity_type = ?1
            ORDER BY id ASC
            "
        ))?;
        let rows = stmt.query_map([productivity_type.map(|t| t.as_str())], read_row)?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(into_category(row?)?);
        }
        Ok(categories)
    }

    /// Renames and/or retypes a category.
    pub fn update_category(
        &self,
        id: CategoryId,
        update: &CategoryUpdate,
    ) -> Result<Category, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current = find_by_id(&tx, id)?.ok_or(DbError::CategoryNotFound(id))?;

        if let Some(name) = &update.name {
            validate_name(name)?;
            if find_by_name(&tx, name)?.is_some_and(|other| other.id != id) {
                return Err(DbError::DuplicateCategory { name: name.clone() });
            }
        }

        tx.execute(
            "
            UPDATE app_categories
            SET name = ?, productivity_type = ?, description = ?, updated_at = ?
            WHERE id = ?
            ",
            params![
                update.name.as_deref().unwrap_or(&current.name),
                update
                    .productivity_type
                    .unwrap_or(current.productivity_type)
                    .as_str(),
                update.description.as_deref().or(current.description.as_deref()),
                format_timestamp(&Utc::now()),
                id,
            ],
        )?;
        let updated = find_by_id(&tx, id)?.ok_or(DbError::CategoryNotFound(id))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Deletes a category that no usage bucket references.
    pub fn delete_category(&self, id: CategoryId) -> Result<(), DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM hourly_app_usage WHERE category_id = ?",
            [id],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Err(DbError::CategoryInUse { id, count });
        }

        if tx.execute("DELETE FROM app_categories WHERE id = ?", [id])? == 0 {
            return Err(DbError::CategoryNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }
}
