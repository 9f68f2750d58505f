use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewOutboxEvent, OrderId, OutboxEvent, Result, ServiceName, TransactionLogEntry,
    TransactionLogError, TransactionStatus, TxId,
    store::{
        OutboxStore, TransactionLogStore, UnfinishedTransaction, validate_entry,
        validate_registration,
    },
};

/// PostgreSQL-backed transaction log.
#[derive(Clone)]
pub struct PostgresTransactionLogStore {
    pool: PgPool,
}

impl PostgresTransactionLogStore {
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
        tracing::info!("transaction log migrations applied");
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<TransactionLogEntry> {
        let code: String = row.try_get("status")?;
        let status = TransactionStatus::from_code(&code)
            .ok_or_else(|| TransactionLogError::UnknownStatus(code.clone()))?;
        let service: String = row.try_get("service_name")?;
        let retry_count: i32 = row.try_get("retry_count")?;

        Ok(TransactionLogEntry {
            tx_id: TxId::from_uuid(row.try_get::<Uuid, _>("tx_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            service_name: service.parse::<ServiceName>()?,
            status,
            error_message: row.try_get("error_message")?,
            retry_count: u32::try_from(retry_count).unwrap_or_default(),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_outbox_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            tx_id: TxId::from_uuid(row.try_get::<Uuid, _>("tx_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            processed: row.try_get("processed")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

async fn insert_entry<'e, E>(executor: E, entry: &TransactionLogEntry) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO transaction_log (tx_id, order_id, service_name, status, error_message, retry_count, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.tx_id.as_uuid())
    .bind(entry.order_id.as_uuid())
    .bind(entry.service_name.as_str())
    .bind(entry.status.code())
    .bind(entry.error_message.as_deref())
    .bind(i32::try_from(entry.retry_count).unwrap_or(i32::MAX))
    .bind(entry.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl TransactionLogStore for PostgresTransactionLogStore {
    async fn append(&self, entry: TransactionLogEntry) -> Result<()> {
        validate_entry(&entry)?;
        insert_entry(&self.pool, &entry).await
    }

    async fn register_saga(
        &self,
        entries: Vec<TransactionLogEntry>,
        event: NewOutboxEvent,
    ) -> Result<i64> {
        validate_registration(&entries, &event)?;

        let mut tx = self.pool.begin().await?;

        for entry in &entries {
            insert_entry(&mut *tx, entry).await?;
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (tx_id, order_id, event_type, payload, processed, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING id
            "#,
        )
        .bind(event.tx_id.as_uuid())
        .bind(event.order_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(
            tx_id = %event.tx_id,
            entries = entries.len(),
            outbox_id = id,
            "registered saga"
        );
        Ok(id)
    }

    async fn entries_for_transaction(&self, tx_id: TxId) -> Result<Vec<TransactionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_id, order_id, service_name, status, error_message, retry_count, created_at
            FROM transaction_log
            WHERE tx_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(tx_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_id, order_id, service_name, status, error_message, retry_count, created_at
            FROM transaction_log
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn find_unfinished(&self) -> Result<Vec<UnfinishedTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT t.tx_id, t.order_id, MIN(t.id) AS first_id
            FROM transaction_log t
            WHERE t.status = 'U'
              AND NOT EXISTS (
                  SELECT 1 FROM transaction_log r
                  WHERE r.tx_id = t.tx_id
                    AND r.service_name = t.service_name
                    AND r.status IN ('S', 'R', 'RF', 'D')
              )
            GROUP BY t.tx_id, t.order_id
            ORDER BY first_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(UnfinishedTransaction {
                    tx_id: TxId::from_uuid(row.try_get::<Uuid, _>("tx_id")?),
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                })
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for PostgresTransactionLogStore {
    async fn unprocessed_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tx_id, order_id, event_type, payload, processed, created_at, processed_at
            FROM outbox_events
            WHERE processed = FALSE
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox_event).collect()
    }

    async fn mark_outbox_processed(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET processed = TRUE, processed_at = COALESCE(processed_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransactionLogError::OutboxEventNotFound(id));
        }
        Ok(())
    }
}
