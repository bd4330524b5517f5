use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    FundId, IdempotencyKey, OutboxEntryId, SecurityId, TransactionId, TransactionSubTypeId,
};
use domain::{LedgerTransaction, TransactionStatus};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::records::{AuditEntry, CreationUnit, IdempotencyRecord, OutboxEntry, OutboxStatus};
use crate::store::{LedgerStore, ReferenceDirectory};
use crate::{LedgerStoreError, Result};

/// PostgreSQL-backed ledger store implementation.
///
/// Both units of work run inside a single database transaction; the
/// storage engine's locking discipline provides the atomicity the
/// pipeline relies on.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and returns a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_transaction(row: PgRow) -> Result<LedgerTransaction> {
        let status: TransactionStatus = row.try_get::<String, _>("status")?.parse()?;

        Ok(LedgerTransaction::from_stored(
            TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            FundId::new(row.try_get("fund_id")?),
            row.try_get::<Option<i32>, _>("security_id")?.map(SecurityId::new),
            TransactionSubTypeId::new(row.try_get("sub_type_id")?),
            row.try_get("trade_date")?,
            row.try_get("settle_date")?,
            row.try_get::<Decimal, _>("quantity")?,
            row.try_get::<Decimal, _>("price")?,
            row.try_get::<Decimal, _>("amount")?,
            row.try_get::<String, _>("currency")?.trim().to_string(),
            status,
            row.try_get("created_by")?,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<DateTime<Utc>, _>("updated_at")?,
        ))
    }

    fn row_to_outbox_entry(row: PgRow) -> Result<OutboxEntry> {
        let status: OutboxStatus = row.try_get::<String, _>("status")?.parse()?;

        Ok(OutboxEntry {
            id: OutboxEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            occurred_at: row.try_get("occurred_at")?,
            status,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            published_at: row.try_get("published_at")?,
        })
    }

    fn row_to_audit_entry(row: PgRow) -> Result<AuditEntry> {
        Ok(AuditEntry {
            entity_name: row.try_get("entity_name")?,
            entity_id: row.try_get("entity_id")?,
            event_type: row.try_get("event_type")?,
            performed_by: row.try_get("performed_by")?,
            data_before: row.try_get("data_before")?,
            data_after: row.try_get("data_after")?,
            correlation_id: row.try_get("correlation_id")?,
            request_id: row.try_get("request_id")?,
            source: row.try_get("source")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn insert_audit(
        conn: &mut sqlx::PgConnection,
        entry: &AuditEntry,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (entity_name, entity_id, event_type, performed_by, data_before,
                 data_after, correlation_id, request_id, source, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.entity_name)
        .bind(&entry.entity_id)
        .bind(&entry.event_type)
        .bind(&entry.performed_by)
        .bind(&entry.data_before)
        .bind(&entry.data_after)
        .bind(&entry.correlation_id)
        .bind(&entry.request_id)
        .bind(&entry.source)
        .bind(entry.recorded_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn find_idempotency(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT idempotency_key, transaction_id, created_at
            FROM transaction_idempotency
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(IdempotencyRecord {
                key: IdempotencyKey::from_uuid(row.try_get::<Uuid, _>("idempotency_key")?),
                transaction_id: row
                    .try_get::<Option<Uuid>, _>("transaction_id")?
                    .map(TransactionId::from_uuid),
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<LedgerTransaction>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, fund_id, security_id, sub_type_id, trade_date, settle_date,
                   quantity, price, amount, currency, status, created_by,
                   created_at, updated_at
            FROM ledger_transactions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn commit_creation(&self, unit: CreationUnit) -> Result<()> {
        let tx = &unit.transaction;
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO ledger_transactions
                (id, fund_id, security_id, sub_type_id, trade_date, settle_date,
                 quantity, price, amount, currency, status, created_by,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(tx.id().as_uuid())
        .bind(tx.fund_id().as_i32())
        .bind(tx.security_id().map(|s| s.as_i32()))
        .bind(tx.sub_type_id().as_i32())
        .bind(tx.trade_date())
        .bind(tx.settle_date())
        .bind(tx.quantity())
        .bind(tx.price())
        .bind(tx.amount())
        .bind(tx.currency())
        .bind(tx.status().as_str())
        .bind(tx.created_by())
        .bind(tx.created_at())
        .bind(tx.updated_at())
        .execute(&mut *db_tx)
        .await?;

        // Insert-or-link: a leftover record with no linked transaction is
        // claimed; a record linked by a concurrent winner yields no row.
        let linked: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO transaction_idempotency (idempotency_key, transaction_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT transaction_idempotency_key_unique
            DO UPDATE SET transaction_id = EXCLUDED.transaction_id
            WHERE transaction_idempotency.transaction_id IS NULL
            RETURNING id
            "#,
        )
        .bind(unit.idempotency.key.as_uuid())
        .bind(unit.idempotency.transaction_id.map(|t| t.as_uuid()))
        .bind(unit.idempotency.created_at)
        .fetch_optional(&mut *db_tx)
        .await?;

        if linked.is_none() {
            // Rolls back on drop; the concurrent creator's row stands.
            tracing::debug!(
                idempotency_key = %unit.idempotency.key,
                "idempotency key already linked, aborting creation unit"
            );
            return Err(LedgerStoreError::DuplicateIdempotencyKey(
                unit.idempotency.key,
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO transaction_outbox
                (id, event_type, payload, occurred_at, status, retry_count,
                 last_error, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(unit.outbox.id.as_uuid())
        .bind(&unit.outbox.event_type)
        .bind(&unit.outbox.payload)
        .bind(unit.outbox.occurred_at)
        .bind(unit.outbox.status.as_str())
        .bind(unit.outbox.retry_count)
        .bind(&unit.outbox.last_error)
        .bind(unit.outbox.published_at)
        .execute(&mut *db_tx)
        .await?;

        Self::insert_audit(&mut *db_tx, &unit.audit).await?;

        db_tx.commit().await?;
        tracing::debug!(transaction_id = %tx.id(), "creation unit committed");
        Ok(())
    }

    async fn commit_transition(
        &self,
        transaction: &LedgerTransaction,
        audit: AuditEntry,
    ) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET status = $1, updated_at = $2
            WHERE id = $3 AND status = 'Pending'
            "#,
        )
        .bind(transaction.status().as_str())
        .bind(transaction.updated_at())
        .bind(transaction.id().as_uuid())
        .execute(&mut *db_tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM ledger_transactions WHERE id = $1")
                    .bind(transaction.id().as_uuid())
                    .fetch_optional(&mut *db_tx)
                    .await?;

            return match status {
                None => Err(LedgerStoreError::TransactionNotFound(transaction.id())),
                Some(status) => Err(LedgerStoreError::TransitionConflict {
                    id: transaction.id(),
                    status,
                }),
            };
        }

        Self::insert_audit(&mut *db_tx, &audit).await?;

        db_tx.commit().await?;
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, occurred_at, status, retry_count,
                   last_error, published_at
            FROM transaction_outbox
            WHERE status <> 'Published'
            ORDER BY occurred_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox_entry).collect()
    }

    async fn mark_published(&self, id: OutboxEntryId) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE transaction_outbox
            SET status = 'Published', published_at = $1
            WHERE id = $2 AND status <> 'Published'
            "#,
        )
        .bind(Utc::now())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM transaction_outbox WHERE id = $1)")
                    .bind(id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
            return if exists {
                Err(LedgerStoreError::AlreadyPublished(id))
            } else {
                Err(LedgerStoreError::OutboxEntryNotFound(id))
            };
        }

        Ok(())
    }

    async fn record_publish_failure(&self, id: OutboxEntryId, error: &str) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE transaction_outbox
            SET status = 'Failed', retry_count = retry_count + 1, last_error = $1
            WHERE id = $2
            "#,
        )
        .bind(error)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(LedgerStoreError::OutboxEntryNotFound(id));
        }
        Ok(())
    }

    async fn audit_entries_for(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entity_name, entity_id, event_type, performed_by, data_before,
                   data_after, correlation_id, request_id, source, recorded_at
            FROM audit_log
            WHERE entity_name = $1 AND entity_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(entity_name)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_audit_entry).collect()
    }
}

#[async_trait]
impl ReferenceDirectory for PostgresLedgerStore {
    async fn fund_exists(&self, id: FundId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM funds WHERE id = $1)")
            .bind(id.as_i32())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn security_exists(&self, id: SecurityId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM securities WHERE id = $1)")
                .bind(id.as_i32())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn sub_type_exists(&self, id: TransactionSubTypeId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM transaction_sub_types WHERE id = $1)",
        )
        .bind(id.as_i32())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
