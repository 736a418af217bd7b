//! Product persistence and inventory aggregates.

use crate::db::Session;
use crate::db::macros::with_connection;
use crate::error::{DbError, DbResult};
use crate::models::product::validate_inventory;
use crate::models::{NewProduct, Product};
use tracing::debug;

const COLUMNS: &str = "id, name, price, sku, description, inventory";

const TOTAL_VALUE: &str =
    "SELECT CAST(COALESCE(SUM(price * inventory), 0) AS DOUBLE PRECISION) FROM products";
const COUNT: &str = "SELECT COUNT(*) FROM products";

fn insert_sql() -> String {
    format!(
        "INSERT INTO products (name, price, sku, description, inventory) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
    )
}

fn select_sql(filter: &str) -> String {
    format!("SELECT {COLUMNS} FROM products {filter}")
}

pub struct ProductRepository;

impl ProductRepository {
    /// Insert a product. A duplicate sku fails with a unique `ConstraintViolation`.
    pub async fn create(session: &mut Session, product: NewProduct) -> DbResult<Product> {
        product.validate()?;
        let sql = insert_sql();
        let created = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Product>(&sql)
                            .bind(product.name.as_str())
                            .bind(product.price)
                            .bind(product.sku.as_str())
                            .bind(product.description.as_deref())
                            .bind(product.inventory)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await?;
        debug!(product_id = created.id, sku = %created.sku, "Product created");
        Ok(created)
    }

    pub async fn get_by_id(session: &mut Session, id: i64) -> DbResult<Option<Product>> {
        let sql = select_sql("WHERE id = $1");
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Product>(&sql)
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    pub async fn get_by_sku(session: &mut Session, sku: &str) -> DbResult<Option<Product>> {
        let sql = select_sql("WHERE sku = $1");
        let sku = sku.to_string();
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Product>(&sql)
                            .bind(sku.as_str())
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// All products ordered by id.
    pub async fn list_all(session: &mut Session) -> DbResult<Vec<Product>> {
        let sql = select_sql("ORDER BY id");
        session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Product>(&sql)
                            .fetch_all(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    /// Set a product's stock level in a single statement.
    ///
    /// Returns `Ok(None)` when no product has this id; unlike `create`, a
    /// missing row is not an error.
    pub async fn update_inventory(
        session: &mut Session,
        id: i64,
        inventory: i64,
    ) -> DbResult<Option<Product>> {
        validate_inventory(inventory)?;
        let sql = format!("UPDATE products SET inventory = $1 WHERE id = $2 RETURNING {COLUMNS}");
        let updated = session
            .execute(move |tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_as::<_, Product>(&sql)
                            .bind(inventory)
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await?;
        if updated.is_none() {
            debug!(product_id = id, "Inventory update skipped, no such product");
        }
        Ok(updated)
    }

    /// Sum of `price * inventory` over all products; 0 for an empty table.
    pub async fn total_inventory_value(session: &mut Session) -> DbResult<f64> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_scalar::<_, f64>(TOTAL_VALUE)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }

    pub async fn count(session: &mut Session) -> DbResult<i64> {
        session
            .execute(|tx| {
                Box::pin(async move {
                    with_connection!(tx, |conn| {
                        sqlx::query_scalar::<_, i64>(COUNT)
                            .fetch_one(&mut *conn)
                            .await
                            .map_err(DbError::from)
                    })
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_sql() {
        assert_eq!(
            select_sql("WHERE sku = $1"),
            "SELECT id, name, price, sku, description, inventory FROM products WHERE sku = $1"
        );
        assert!(insert_sql().ends_with("RETURNING id, name, price, sku, description, inventory"));
    }
}
