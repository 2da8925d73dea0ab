use async_trait::async_trait;
use common::{ProductId, PurchaseId};
use domain::{DomainError, Money, ProductCatalog, ProductStatus, PurchasedItem};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::catalog::missing;
use crate::ledger::{merge_items, observe_release, observe_reserve};
use crate::{
    IdempotencyRecord, Ledger, LedgerError, NewProduct, Product, ProductRepository, Result,
};

const RECORDS_PKEY: &str = "idempotency_records_pkey";

/// PostgreSQL-backed inventory ledger.
///
/// Stock changes run in a read-committed transaction that locks product
/// rows with `SELECT ... FOR UPDATE` in ascending id order. Dropping the
/// transaction without committing rolls it back.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_i64(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            brand_name: row.try_get("brand_name")?,
            price: Money::from_minor(row.try_get("price")?),
            inventory: row.try_get("inventory")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_record(row: PgRow) -> Result<IdempotencyRecord> {
        Ok(IdempotencyRecord {
            purchase_id: PurchaseId::from_i64(row.try_get("purchase_id")?),
            product_id: ProductId::from_i64(row.try_get("product_id")?),
            amount: row.try_get("amount")?,
            released: row.try_get("released")?,
        })
    }

    /// Locks a product row and returns its stock.
    async fn lock_stock(
        tx: &mut Transaction<'_, Postgres>,
        product_id: ProductId,
    ) -> Result<Option<i64>> {
        Ok(
            sqlx::query_scalar("SELECT inventory FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id.as_i64())
                .fetch_optional(&mut **tx)
                .await?,
        )
    }

    async fn reserve_in_tx(&self, key: PurchaseId, items: &[PurchasedItem]) -> Result<()> {
        let lines = merge_items(items)?;

        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM idempotency_records WHERE purchase_id = $1)",
        )
        .bind(key.as_i64())
        .fetch_one(&self.pool)
        .await?;
        if applied {
            return Err(LedgerError::AlreadyApplied(key));
        }

        let mut tx = self.pool.begin().await?;

        // Lines are sorted by product id, so concurrent reserves lock rows
        // in the same order
        for &(product_id, amount) in &lines {
            let available = Self::lock_stock(&mut tx, product_id)
                .await?
                .ok_or(LedgerError::ProductNotFound(product_id))?;
            if available < amount {
                return Err(LedgerError::InsufficientStock {
                    product_id,
                    requested: amount,
                    available,
                });
            }

            sqlx::query("UPDATE products SET inventory = inventory - $1 WHERE id = $2")
                .bind(amount)
                .bind(product_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        for &(product_id, amount) in &lines {
            sqlx::query(
                r#"
                INSERT INTO idempotency_records (purchase_id, product_id, amount)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(key.as_i64())
            .bind(product_id.as_i64())
            .bind(amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent reserve for the same key committed first
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(RECORDS_PKEY)
                {
                    return LedgerError::AlreadyApplied(key);
                }
                LedgerError::Database(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn release_in_tx(&self, key: PurchaseId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query(
            r#"
            SELECT purchase_id, product_id, amount, released
            FROM idempotency_records
            WHERE purchase_id = $1
            ORDER BY product_id ASC
            FOR UPDATE
            "#,
        )
        .bind(key.as_i64())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Self::row_to_record)
        .collect::<Result<Vec<_>>>()?;

        let Some(first) = records.first() else {
            return Err(LedgerError::UnknownKey(key));
        };
        if first.released {
            return Ok(true);
        }

        for record in &records {
            Self::lock_stock(&mut tx, record.product_id).await?;
            sqlx::query("UPDATE products SET inventory = inventory + $1 WHERE id = $2")
                .bind(record.amount)
                .bind(record.product_id.as_i64())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE idempotency_records SET released = TRUE WHERE purchase_id = $1")
            .bind(key.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(false)
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    #[tracing::instrument(skip(self, items), fields(purchase_id = %key))]
    async fn reserve(&self, key: PurchaseId, items: &[PurchasedItem]) -> Result<()> {
        let result = self.reserve_in_tx(key, items).await;
        observe_reserve(&result);
        result
    }

    #[tracing::instrument(skip(self), fields(purchase_id = %key))]
    async fn release(&self, key: PurchaseId) -> Result<bool> {
        let result = self.release_in_tx(key).await;
        observe_release(&result);
        result
    }

    async fn stock(&self, product_id: ProductId) -> Result<i64> {
        sqlx::query_scalar("SELECT inventory FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::ProductNotFound(product_id))
    }

    async fn records(&self, key: PurchaseId) -> Result<Vec<IdempotencyRecord>> {
        sqlx::query(
            r#"
            SELECT purchase_id, product_id, amount, released
            FROM idempotency_records
            WHERE purchase_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(key.as_i64())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_record)
        .collect()
    }
}

#[async_trait]
impl ProductRepository for PostgresLedger {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, description, brand_name, price, inventory)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, brand_name, price, inventory, created_at
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.brand_name)
        .bind(product.price.minor())
        .bind(product.inventory)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, brand_name, price, inventory, created_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::ProductNotFound(id))?;

        Self::row_to_product(row)
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        sqlx::query(
            r#"
            SELECT id, name, description, brand_name, price, inventory, created_at
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_product)
        .collect()
    }

    async fn check_products(&self, ids: &[ProductId]) -> Result<Vec<ProductStatus>> {
        let raw: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query("SELECT id, price FROM products WHERE id = ANY($1)")
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;

        let mut found = std::collections::HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let price: i64 = row.try_get("price")?;
            found.insert(ProductId::from_i64(id), Money::from_minor(price));
        }

        Ok(ids
            .iter()
            .map(|id| match found.get(id) {
                Some(price) => ProductStatus {
                    product_id: *id,
                    price: *price,
                    exists: true,
                },
                None => missing(*id),
            })
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for PostgresLedger {
    async fn check_products(
        &self,
        ids: &[ProductId],
    ) -> std::result::Result<Vec<ProductStatus>, DomainError> {
        ProductRepository::check_products(self, ids)
            .await
            .map_err(|e| DomainError::Catalog(e.to_string()))
    }
}
