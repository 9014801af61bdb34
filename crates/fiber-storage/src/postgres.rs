//! Postgres-backed storage. Samples go into a table with a unique
//! `(time, node_id)` constraint (spec §3/§6); conflicts are captured
//! per-row via `ON CONFLICT DO NOTHING` plus a follow-up existence check,
//! the "catch per-row and route duplicates" strategy spec §4.4 step 4
//! explicitly allows.

use crate::audit::{AuditEntry, GENESIS_HASH};
use crate::read::{MetricRow, MetricsQuery, ReadBackend, StatusReport};
use crate::write::{PersistOutcome, WriteBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiber_core::{ConflictRecord, FiberError, FiberResult, Node, NodeStatus, Sample};
use sqlx::PgPool;

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(db_url: &str) -> FiberResult<Self> {
        let pool = PgPool::connect(db_url).await.map_err(|e| FiberError::transient("postgres", e))?;
        Ok(Self { pool })
    }

    /// Applies the schema this crate depends on. Idempotent; safe to call on
    /// every startup (the schema itself — hypertable/continuous-aggregate
    /// conversion — is the out-of-scope storage capability spec §9 assumes).
    pub async fn migrate(&self) -> FiberResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS samples (
                time TIMESTAMPTZ NOT NULL,
                node_id TEXT NOT NULL,
                latency_ms DOUBLE PRECISION NOT NULL,
                uptime_pct DOUBLE PRECISION NOT NULL,
                packet_loss_pct DOUBLE PRECISION NOT NULL,
                target_host TEXT NOT NULL,
                probe_type TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                PRIMARY KEY (time, node_id)
            );

            CREATE TABLE IF NOT EXISTS nodes (
                node_id TEXT PRIMARY KEY,
                country TEXT NOT NULL,
                region TEXT NOT NULL,
                lat DOUBLE PRECISION,
                lng DOUBLE PRECISION,
                status TEXT NOT NULL,
                last_seen_at TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL DEFAULT 'null'::jsonb
            );

            CREATE TABLE IF NOT EXISTS conflicts (
                time TIMESTAMPTZ NOT NULL,
                node_id TEXT NOT NULL,
                payload JSONB NOT NULL,
                conflict_at TIMESTAMPTZ NOT NULL,
                ingest_region TEXT
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id BIGSERIAL PRIMARY KEY,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FiberError::transient("postgres-migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl WriteBackend for PostgresStorage {
    async fn upsert_node(&self, node_id: &str, seen_at: DateTime<Utc>) -> FiberResult<Node> {
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            INSERT INTO nodes (node_id, country, region, lat, lng, status, last_seen_at, metadata)
            VALUES ($1, '', '', NULL, NULL, 'reporting', $2, 'null'::jsonb)
            ON CONFLICT (node_id) DO UPDATE
                SET last_seen_at = GREATEST(nodes.last_seen_at, EXCLUDED.last_seen_at)
            RETURNING node_id, country, region, lat, lng, status, last_seen_at, metadata
            "#,
        )
        .bind(node_id)
        .bind(seen_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FiberError::transient("postgres-upsert-node", e))?;

        row.into_node()
    }

    async fn register_node(&self, node: Node) -> FiberResult<Node> {
        let status = node_status_str(node.status);
        let row = sqlx::query_as::<_, NodeRow>(
            r#"
            INSERT INTO nodes (node_id, country, region, lat, lng, status, last_seen_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (node_id) DO UPDATE
                SET country = EXCLUDED.country,
                    region = EXCLUDED.region,
                    lat = EXCLUDED.lat,
                    lng = EXCLUDED.lng,
                    status = EXCLUDED.status,
                    metadata = EXCLUDED.metadata
            RETURNING node_id, country, region, lat, lng, status, last_seen_at, metadata
            "#,
        )
        .bind(&node.node_id)
        .bind(&node.country)
        .bind(&node.region)
        .bind(node.lat)
        .bind(node.lng)
        .bind(status)
        .bind(node.last_seen_at)
        .bind(&node.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FiberError::transient("postgres-register-node", e))?;

        row.into_node()
    }

    async fn delete_node(&self, node_id: &str) -> FiberResult<()> {
        sqlx::query("UPDATE nodes SET status = 'deleted' WHERE node_id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await
            .map_err(|e| FiberError::transient("postgres-delete-node", e))?;
        Ok(())
    }

    async fn insert_samples(&self, samples: Vec<(Sample, Option<String>)>) -> FiberResult<PersistOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| FiberError::transient("postgres-tx", e))?;
        let mut outcome = PersistOutcome::default();

        for (sample, ingest_region) in samples {
            let result = sqlx::query(
                r#"
                INSERT INTO samples (time, node_id, latency_ms, uptime_pct, packet_loss_pct, target_host, probe_type, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (time, node_id) DO NOTHING
                "#,
            )
            .bind(sample.timestamp)
            .bind(&sample.node_id)
            .bind(sample.latency_ms)
            .bind(sample.uptime_pct)
            .bind(sample.packet_loss_pct)
            .bind(&sample.target_host)
            .bind(&sample.probe_type)
            .bind(&sample.metadata)
            .execute(&mut *tx)
            .await
            .map_err(|e| FiberError::transient("postgres-insert-sample", e))?;

            if result.rows_affected() == 1 {
                outcome.inserted += 1;
            } else {
                let conflict = ConflictRecord::from_rejected(sample, ingest_region);
                sqlx::query(
                    "INSERT INTO conflicts (time, node_id, payload, conflict_at, ingest_region) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(conflict.time)
                .bind(&conflict.node_id)
                .bind(serde_json::to_value(&conflict.payload).expect("Sample serializes"))
                .bind(conflict.conflict_at)
                .bind(&conflict.ingest_region)
                .execute(&mut *tx)
                .await
                .map_err(|e| FiberError::transient("postgres-insert-conflict", e))?;
                outcome.conflicts.push(conflict);
            }
        }

        tx.commit().await.map_err(|e| FiberError::transient("postgres-commit", e))?;
        Ok(outcome)
    }

    async fn append_audit_entry(&self, action: &str, actor: &str) -> FiberResult<AuditEntry> {
        let prev_hash: String = sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FiberError::transient("postgres-audit-read", e))?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let entry = AuditEntry::next(&prev_hash, action, actor, Utc::now());

        sqlx::query("INSERT INTO audit_log (action, actor, ts, prev_hash, hash) VALUES ($1, $2, $3, $4, $5)")
            .bind(&entry.action)
            .bind(&entry.actor)
            .bind(entry.timestamp)
            .bind(&entry.prev_hash)
            .bind(&entry.hash)
            .execute(&self.pool)
            .await
            .map_err(|e| FiberError::transient("postgres-audit-write", e))?;

        Ok(entry)
    }
}

#[async_trait]
impl ReadBackend for PostgresStorage {
    async fn status(&self) -> FiberResult<StatusReport> {
        let node_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FiberError::transient("postgres-status", e))?;
        let conflict_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conflicts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FiberError::transient("postgres-status", e))?;

        Ok(StatusReport { db: "ok", node_count, conflict_count })
    }

    async fn query_metrics(&self, query: MetricsQuery) -> FiberResult<Vec<MetricRow>> {
        let limit = if query.limit == 0 { 100 } else { query.limit } as i64;
        let rows = sqlx::query_as::<_, MetricRowSql>(
            r#"
            SELECT time, node_id, latency_ms, uptime_pct, packet_loss_pct
            FROM samples
            WHERE ($1::text IS NULL OR node_id = $1)
              AND ($2::timestamptz IS NULL OR time >= $2)
            ORDER BY time DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.node_id)
        .bind(query.since)
        .bind(limit)
        .bind(query.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FiberError::transient("postgres-metrics", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    node_id: String,
    country: String,
    region: String,
    lat: Option<f64>,
    lng: Option<f64>,
    status: String,
    last_seen_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl NodeRow {
    fn into_node(self) -> FiberResult<Node> {
        let status = match self.status.as_str() {
            "registered" => NodeStatus::Registered,
            "reporting" => NodeStatus::Reporting,
            "deleted" => NodeStatus::Deleted,
            other => return Err(FiberError::Fatal(format!("unknown node status {other:?} in storage"))),
        };
        Ok(Node {
            node_id: self.node_id,
            country: self.country,
            region: self.region,
            lat: self.lat,
            lng: self.lng,
            status,
            last_seen_at: self.last_seen_at,
            metadata: self.metadata,
        })
    }
}

fn node_status_str(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Registered => "registered",
        NodeStatus::Reporting => "reporting",
        NodeStatus::Deleted => "deleted",
    }
}

#[derive(sqlx::FromRow)]
struct MetricRowSql {
    time: DateTime<Utc>,
    node_id: String,
    latency_ms: f64,
    uptime_pct: f64,
    packet_loss_pct: f64,
}

impl From<MetricRowSql> for MetricRow {
    fn from(row: MetricRowSql) -> Self {
        MetricRow {
            time: row.time,
            node_id: row.node_id,
            latency_ms: row.latency_ms,
            uptime_pct: row.uptime_pct,
            packet_loss_pct: row.packet_loss_pct,
        }
    }
}
