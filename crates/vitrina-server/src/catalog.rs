//! Catalog read model
//!
//! Product and catalog entities are owned by the catalog service; the
//! gateway only checks that referenced ids exist and reads the denormalized
//! name/price it snapshots into request line items.

use std::collections::HashMap;

use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct ProductRef {
    pub id: String,
    pub name: String,
    pub price_cents: Option<i64>,
}

#[derive(Clone)]
pub struct CatalogStore {
    db: SqlitePool,
}

impl CatalogStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn product_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn catalog_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM catalogs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    /// Loads name/price for each id. Missing ids are simply absent from the
    /// returned map; the caller decides how to report them.
    pub async fn load_products(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, ProductRef>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("SELECT id, name, price_cents FROM products WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (String, String, Option<i64>)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.db).await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, price_cents)| {
                (
                    id.clone(),
                    ProductRef {
                        id,
                        name,
                        price_cents,
                    },
                )
            })
            .collect())
    }
}
