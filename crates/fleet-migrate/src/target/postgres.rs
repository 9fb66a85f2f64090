//! PostgreSQL target.
//!
//! Rows are written with multi-row parameterized `INSERT` statements inside
//! one transaction per `bulk_insert` call. Statements are split so no single
//! statement exceeds the wire protocol's bind parameter limit.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::tls::{self, SslMode};
use super::TargetStore;
use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_pg, quote_pg_list};
use crate::core::{Row, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL target backed by a deadpool connection pool.
pub struct PgTarget {
    pool: Pool,
    schema: String,
}

impl PgTarget {
    /// Connect to the target and verify the connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("fleet-migrate");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match tls::connector(SslMode::parse(&config.ssl_mode)?)? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Shared connection pool, for the state store.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context.to_string()))
    }
}

/// Build `INSERT INTO t (cols) VALUES ($1, ..), ($n, ..)` for `rows` rows.
fn insert_statement(qualified: &str, column_list: &str, columns: usize, rows: usize) -> String {
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", qualified, column_list);
    let mut param = 1;
    for r in 0..rows {
        if r > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for c in 0..columns {
            if c > 0 {
                sql.push_str(", ");
            }
            sql.push('$');
            sql.push_str(&param.to_string());
            param += 1;
        }
        sql.push(')');
    }
    sql
}

/// Read column `idx` of a result row as an owned value.
fn read_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue> {
    let value: SqlValue = match *row.columns()[idx].type_() {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(i32::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.into(),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|dt| dt.and_utc())
            .into(),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            row.try_get::<_, Option<Vec<String>>>(idx)?.into()
        }
        Type::JSON | Type::JSONB => row.try_get::<_, Option<serde_json::Value>>(idx)?.into(),
        _ => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn bulk_insert(&self, table: &str, columns: &[&str], rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(MigrateError::transfer(
                table,
                format!(
                    "row has {} values for {} columns",
                    bad.len(),
                    columns.len()
                ),
            ));
        }

        let qualified = qualify_pg(&self.schema, table)?;
        let column_list = quote_pg_list(columns)?;
        let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);

        let mut client = self.client("bulk insert").await?;
        let tx = client.transaction().await?;
        let mut written = 0u64;
        for chunk in rows.chunks(rows_per_statement) {
            let sql = insert_statement(&qualified, &column_list, columns.len(), chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            written += tx
                .execute(sql.as_str(), &params)
                .await
                .map_err(|e| MigrateError::transfer(table, e.to_string()))?;
        }
        tx.commit().await?;

        debug!("{}: inserted {} rows", table, written);
        Ok(written)
    }

    async fn truncate(&self, table: &str, cascade: bool) -> Result<()> {
        let client = self.client("truncate").await?;
        let sql = format!(
            "TRUNCATE TABLE {}{}",
            qualify_pg(&self.schema, table)?,
            if cascade { " CASCADE" } else { "" }
        );
        client.batch_execute(&sql).await?;
        debug!("Truncated table {}.{}", self.schema, table);
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &[(&str, SqlValue)],
    ) -> Result<Vec<Row>> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            quote_pg_list(columns)?,
            qualify_pg(&self.schema, table)?
        );
        for (i, (column, _)) in filter.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} = ${}", quote_pg(column)?, i + 1));
        }
        let params: Vec<&(dyn ToSql + Sync)> = filter
            .iter()
            .map(|(_, v)| v as &(dyn ToSql + Sync))
            .collect();

        let client = self.client("select").await?;
        let rows = client.query(sql.as_str(), &params).await?;
        rows.iter()
            .map(|row| (0..row.len()).map(|i| read_value(row, i)).collect::<Result<Row>>())
            .collect()
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let client = self.client("count").await?;
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_pg(&self.schema, table)?);
        let row = client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    async fn exec_raw(&self, sql: &str) -> Result<()> {
        let client = self.client("exec").await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    fn qualify(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    fn target_type(&self) -> &str {
        "postgres"
    }
}
