//! Category table. Defaults are seeded by the schema migration.

use tracing::debug;
use uuid::Uuid;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{now_micros, Category, CategoryRef, CategoryRow};

const CATEGORY_COLUMNS: &str = "id, name, color, icon, is_default";
pub const DEFAULT_COLOR: &str = "#6B7280";
pub const DEFAULT_ICON: &str = "folder";

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl NewCategory {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: DEFAULT_COLOR.into(),
            icon: DEFAULT_ICON.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Clone)]
pub struct CategoryStore {
    store: Store,
}

impl CategoryStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Defaults first in seed order, then user categories by creation time.
    pub async fn list(&self) -> Result<Vec<Category>, StoreError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY created_at, id");
        let rows: Vec<CategoryRow> = sqlx::query_as(&sql).fetch_all(self.store.pool()).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Category>, StoreError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?");
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?;
        Ok(row.map(Category::from))
    }

    /// Look up a record's category; a dangling id resolves to `Uncategorized`.
    pub async fn resolve(&self, id: &str) -> Result<CategoryRef, StoreError> {
        Ok(match self.get(id).await? {
            Some(category) => CategoryRef::Known(category),
            None => CategoryRef::Uncategorized,
        })
    }

    pub async fn add(&self, new: NewCategory) -> Result<Category, StoreError> {
        if new.name.trim().is_empty() {
            return Err(StoreError::empty_field("name"));
        }
        let id = Uuid::now_v7().to_string();
        let _w = self.store.write_guard().await;
        sqlx::query(
            "INSERT INTO categories (id, name, color, icon, is_default, created_at) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.color)
        .bind(&new.icon)
        .bind(now_micros())
        .execute(self.store.pool())
        .await?;
        debug!(id = %id, "category added");
        Ok(Category {
            id,
            name: new.name,
            color: new.color,
            icon: new.icon,
            is_default: false,
        })
    }

    pub async fn update(&self, id: &str, changes: CategoryUpdate) -> Result<Category, StoreError> {
        if matches!(&changes.name, Some(n) if n.trim().is_empty()) {
            return Err(StoreError::empty_field("name"));
        }
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let merged = Category {
            name: changes.name.unwrap_or(current.name),
            color: changes.color.unwrap_or(current.color),
            icon: changes.icon.unwrap_or(current.icon),
            ..current
        };
        let _w = self.store.write_guard().await;
        sqlx::query("UPDATE categories SET name = ?, color = ?, icon = ? WHERE id = ?")
            .bind(&merged.name)
            .bind(&merged.color)
            .bind(&merged.icon)
            .bind(&merged.id)
            .execute(self.store.pool())
            .await?;
        Ok(merged)
    }

    /// Remove a category. Records keep their reference. Absent ids are a no-op.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _w = self.store.write_guard().await;
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(self.store.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn defaults_are_seeded_in_order() {
        let dir = tempdir().unwrap();
        let categories = CategoryStore::new(Store::open(&dir.path().join("db")).await.unwrap());
        let names: Vec<String> = categories
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            ["Social Media", "Work", "Banking", "Shopping", "Entertainment", "Other"]
        );
        let banking = categories.get("3").await.unwrap().unwrap();
        assert_eq!(banking.color, "#F59E0B");
        assert_eq!(banking.icon, "credit-card");
        assert!(banking.is_default);
    }

    #[tokio::test]
    async fn add_rename_delete_and_resolve() {
        let dir = tempdir().unwrap();
        let categories = CategoryStore::new(Store::open(&dir.path().join("db")).await.unwrap());

        let travel = categories.add(NewCategory::named("Travel")).await.unwrap();
        assert_eq!(categories.list().await.unwrap().last().unwrap().id, travel.id);

        let renamed = categories
            .update(
                &travel.id,
                CategoryUpdate {
                    name: Some("Trips".into()),
                    ..CategoryUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Trips");
        assert_eq!(renamed.icon, DEFAULT_ICON);

        assert!(categories.delete(&travel.id).await.unwrap());
        assert!(!categories.delete(&travel.id).await.unwrap());
        assert_eq!(
            categories.resolve(&travel.id).await.unwrap(),
            CategoryRef::Uncategorized
        );
        assert!(matches!(
            categories.add(NewCategory::named(" ")).await,
            Err(StoreError::Validation(_))
        ));
    }
}
