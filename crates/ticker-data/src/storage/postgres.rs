//! PostgreSQL 저장소.
//!
//! 커넥션 풀은 프로세스 부트스트랩이 소유하며, 저장소는 이를 참조로만 사용합니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, warn};

use ticker_core::{AssetIdentity, QuoteSnapshot, RequestContext, Result, TickerError, TrackedAsset};

use super::{AssetFailure, AssetStore, PersistReport, Persister};

const CREATE_TRACKED_ASSETS: &str = r#"
    CREATE TABLE IF NOT EXISTS tracked_assets (
        id          BIGSERIAL PRIMARY KEY,
        provider_id BIGINT NOT NULL UNIQUE,
        symbol      TEXT NOT NULL,
        name        TEXT NOT NULL,
        slug        TEXT,
        enabled     BOOLEAN NOT NULL DEFAULT TRUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const CREATE_QUOTE_SNAPSHOTS: &str = r#"
    CREATE TABLE IF NOT EXISTS quote_snapshots (
        provider_id         BIGINT NOT NULL,
        fetched_at          TIMESTAMPTZ NOT NULL,
        symbol              TEXT NOT NULL,
        price               NUMERIC NOT NULL,
        market_cap          NUMERIC,
        volume_24h          NUMERIC,
        percent_change_1h   NUMERIC,
        percent_change_24h  NUMERIC,
        percent_change_7d   NUMERIC,
        circulating_supply  NUMERIC,
        total_supply        NUMERIC,
        provider_updated_at TIMESTAMPTZ,
        PRIMARY KEY (provider_id, fetched_at)
    )
"#;

const CREATE_QUOTE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_quote_snapshots_fetched_at
    ON quote_snapshots (fetched_at DESC)
"#;

/// tracked_assets 레코드.
#[derive(Debug, Clone, FromRow)]
struct AssetRecord {
    id: i64,
    provider_id: i64,
    symbol: String,
    name: String,
    slug: Option<String>,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<AssetRecord> for TrackedAsset {
    fn from(r: AssetRecord) -> Self {
        Self {
            id: r.id,
            provider_id: r.provider_id,
            symbol: r.symbol,
            name: r.name,
            slug: r.slug,
            enabled: r.enabled,
            created_at: r.created_at,
        }
    }
}

/// PostgreSQL 저장소.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 기존 풀로 생성.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 새 커넥션 풀 생성.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        info!(max_connections, "데이터베이스 연결 중");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| TickerError::Persistence(format!("connect: {}", e)))?;

        info!("데이터베이스 연결 성공");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 테이블 생성 (이미 있으면 건너뜀).
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in [CREATE_TRACKED_ASSETS, CREATE_QUOTE_SNAPSHOTS, CREATE_QUOTE_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(persistence_error)?;
        }
        debug!("스키마 확인 완료");
        Ok(())
    }

    async fn upsert_quote(&self, s: &QuoteSnapshot) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO quote_snapshots (
                provider_id, fetched_at, symbol, price, market_cap, volume_24h,
                percent_change_1h, percent_change_24h, percent_change_7d,
                circulating_supply, total_supply, provider_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (provider_id, fetched_at) DO UPDATE SET
                symbol = EXCLUDED.symbol,
                price = EXCLUDED.price,
                market_cap = EXCLUDED.market_cap,
                volume_24h = EXCLUDED.volume_24h,
                percent_change_1h = EXCLUDED.percent_change_1h,
                percent_change_24h = EXCLUDED.percent_change_24h,
                percent_change_7d = EXCLUDED.percent_change_7d,
                circulating_supply = EXCLUDED.circulating_supply,
                total_supply = EXCLUDED.total_supply,
                provider_updated_at = EXCLUDED.provider_updated_at
            "#,
        )
        .bind(s.provider_id)
        .bind(s.fetched_at)
        .bind(&s.symbol)
        .bind(s.price)
        .bind(s.market_cap)
        .bind(s.volume_24h)
        .bind(s.percent_change_1h)
        .bind(s.percent_change_24h)
        .bind(s.percent_change_7d)
        .bind(s.circulating_supply)
        .bind(s.total_supply)
        .bind(s.provider_timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Persister for PgStore {
    async fn apply(&self, ctx: &RequestContext, snapshots: &[QuoteSnapshot]) -> Result<PersistReport> {
        let mut report = PersistReport::default();

        // 자산별로 개별 upsert: 실패한 자산만 다음 사이클에서 다시 쓰면 됨
        for (i, snapshot) in snapshots.iter().enumerate() {
            let written = match ctx.run_until_deadline(self.upsert_quote(snapshot)).await {
                Ok(written) => written,
                Err(_) => {
                    // 쓰는 중이던 행은 커밋 여부를 알 수 없으므로 실패로 보고 (재적용은 멱등)
                    warn!(
                        provider_id = snapshot.provider_id,
                        remaining = snapshots.len() - i,
                        "데드라인 경과, 남은 시세 저장 중단"
                    );
                    report.deadline_exceeded(&snapshots[i..]);
                    break;
                }
            };

            match written {
                Ok(()) => report.persisted.push(snapshot.provider_id),
                Err(e) => {
                    warn!(
                        provider_id = snapshot.provider_id,
                        error = %e,
                        "시세 저장 실패"
                    );
                    report.failed.push(AssetFailure {
                        provider_id: snapshot.provider_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl AssetStore for PgStore {
    async fn upsert_assets(&self, identities: &[AssetIdentity]) -> Result<Vec<TrackedAsset>> {
        let mut tx = self.pool.begin().await.map_err(persistence_error)?;
        let mut upserted = Vec::with_capacity(identities.len());

        for identity in identities {
            let record: AssetRecord = sqlx::query_as(
                r#"
                INSERT INTO tracked_assets (provider_id, symbol, name, slug, enabled, created_at)
                VALUES ($1, $2, $3, $4, TRUE, NOW())
                ON CONFLICT (provider_id) DO UPDATE SET
                    symbol = EXCLUDED.symbol,
                    name = EXCLUDED.name,
                    slug = EXCLUDED.slug
                RETURNING id, provider_id, symbol, name, slug, enabled, created_at
                "#,
            )
            .bind(identity.provider_id)
            .bind(&identity.symbol)
            .bind(&identity.name)
            .bind(identity.slug.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(persistence_error)?;

            upserted.push(record.into());
        }

        tx.commit().await.map_err(persistence_error)?;
        Ok(upserted)
    }

    async fn list_assets(&self) -> Result<Vec<TrackedAsset>> {
        let records: Vec<AssetRecord> = sqlx::query_as(
            r#"
            SELECT id, provider_id, symbol, name, slug, enabled, created_at
            FROM tracked_assets
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn set_enabled(&self, provider_id: i64, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE tracked_assets SET enabled = $2 WHERE provider_id = $1")
            .bind(provider_id)
            .bind(enabled)
            .execute(&self.pool)
            .await
            .map_err(persistence_error)?;

        Ok(result.rows_affected() > 0)
    }
}

fn persistence_error(err: sqlx::Error) -> TickerError {
    TickerError::Persistence(err.to_string())
}
