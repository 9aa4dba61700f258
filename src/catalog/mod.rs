//! Catalog access — reads asset records needing sync and writes reconciled
//! locations back. The `Catalog` trait is the seam between the pipeline and
//! MySQL so the orchestrator can be exercised against an in-memory fake.

pub mod dsn;
pub mod error;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;

pub use dsn::{CatalogDsn, DsnError};
pub use error::CatalogError;

use error::classify;

/// A catalog record pointing at one binary asset still needing sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Opaque catalog key, stringified so integer and uuid keys look alike.
    pub id: String,
    pub display_name: String,
    /// Non-empty by the reader's selection predicate.
    pub source_location: String,
    /// Base for resolving relative source locations.
    pub base_url: Option<String>,
}

/// Read/write surface over the catalog store.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Snapshot of asset records under the non-null, non-empty location
    /// predicate. Captured once at run start; never re-queried mid-run.
    async fn list_assets(&self) -> Result<Vec<AssetRef>, CatalogError>;

    /// Rewrite every row whose stored location equals `old` exactly,
    /// returning the number of rows affected. Never propagates an error:
    /// any failure rolls back and reports 0 affected rows.
    async fn update_location(&self, old: &str, new: &str) -> u64;
}

/// Table and column layout of the catalog, overriding the conventional
/// `products` schema when needed.
#[derive(Debug, Clone)]
pub struct CatalogSchema {
    pub table: String,
    pub id_column: String,
    pub name_column: String,
    pub location_column: String,
}

impl Default for CatalogSchema {
    fn default() -> Self {
        Self {
            table: "products".to_string(),
            id_column: "product_id".to_string(),
            name_column: "product_name".to_string(),
            location_column: "image_path".to_string(),
        }
    }
}

impl CatalogSchema {
    /// Identifiers are interpolated into SQL and cannot be bound as
    /// parameters, so restrict them to a safe character set.
    fn validate(&self) -> Result<(), CatalogError> {
        for ident in [
            &self.table,
            &self.id_column,
            &self.name_column,
            &self.location_column,
        ] {
            let ok = !ident.is_empty()
                && ident
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !ok {
                return Err(CatalogError::Schema(format!(
                    "invalid identifier '{ident}'"
                )));
            }
        }
        Ok(())
    }
}

/// MySQL-backed catalog.
pub struct MySqlCatalog {
    pool: MySqlPool,
    select_sql: String,
    update_sql: String,
    base_url: Option<String>,
}

impl MySqlCatalog {
    /// Connect to the store and prepare the query surface.
    ///
    /// `distinct` selects one record per physical location so an asset
    /// referenced by many rows is transferred once.
    pub async fn connect(
        dsn: &CatalogDsn,
        schema: CatalogSchema,
        distinct: bool,
        base_url: Option<String>,
    ) -> Result<Self, CatalogError> {
        schema.validate()?;

        let options = MySqlConnectOptions::new()
            .host(&dsn.host)
            .port(dsn.port)
            .username(&dsn.user)
            .password(&dsn.password)
            .database(&dsn.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(classify)?;

        // Fail fast on unreachable stores instead of at the first query.
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(classify)?;

        Ok(Self {
            select_sql: build_select_sql(&schema, distinct),
            update_sql: build_update_sql(&schema),
            pool,
            base_url,
        })
    }
}

fn build_select_sql(schema: &CatalogSchema, distinct: bool) -> String {
    let CatalogSchema {
        table,
        id_column: id,
        name_column: name,
        location_column: loc,
    } = schema;
    if distinct {
        // One representative row per physical location: the row with the
        // smallest key, so id and name always come from the same record.
        format!(
            "SELECT CAST(`{id}` AS CHAR) AS id, `{name}` AS name, `{loc}` AS location \
             FROM `{table}` AS outer_row \
             WHERE `{loc}` IS NOT NULL AND `{loc}` <> '' \
             AND `{id}` = (SELECT MIN(`{id}`) FROM `{table}` \
             WHERE `{loc}` = outer_row.`{loc}`)"
        )
    } else {
        format!(
            "SELECT CAST(`{id}` AS CHAR) AS id, `{name}` AS name, `{loc}` AS location \
             FROM `{table}` WHERE `{loc}` IS NOT NULL AND `{loc}` <> ''"
        )
    }
}

fn build_update_sql(schema: &CatalogSchema) -> String {
    format!(
        "UPDATE `{table}` SET `{loc}` = ? WHERE `{loc}` = ?",
        table = schema.table,
        loc = schema.location_column
    )
}

#[async_trait]
impl Catalog for MySqlCatalog {
    async fn list_assets(&self) -> Result<Vec<AssetRef>, CatalogError> {
        let rows = sqlx::query(&self.select_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let mut assets = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Option<String> = row.try_get("id").map_err(classify)?;
            let name: Option<String> = row.try_get("name").map_err(classify)?;
            let location: String = row.try_get("location").map_err(classify)?;
            assets.push(AssetRef {
                id: id.unwrap_or_default(),
                display_name: name.unwrap_or_default(),
                source_location: location,
                base_url: self.base_url.clone(),
            });
        }
        Ok(assets)
    }

    async fn update_location(&self, old: &str, new: &str) -> u64 {
        let result: Result<u64, sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            let done = sqlx::query(&self.update_sql)
                .bind(new)
                .bind(old)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(done.rows_affected())
        }
        .await;

        match result {
            Ok(count) => count,
            Err(e) => {
                // Rolled back on drop; reconcile failures are reported as
                // zero affected rows, never raised past this boundary.
                tracing::warn!("Failed to update catalog location '{}': {}", old, e);
                0
            }
        }
    }
}
