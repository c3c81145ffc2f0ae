//! Quote ticker daemon.

use std::sync::Arc;

use clap::Parser;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ticker_core::{init_logging, LogConfig, LogFormat, RequestContext};
use ticker_data::{AssetStore, CmcClient, CmcQuoteDecoder, MemoryStore, Persister, PgStore};
use ticker_collector::{AssetRegistry, CycleOrchestrator, IdentityResolver, Result, TickerConfig};

#[derive(Parser)]
#[command(name = "ticker-collector")]
#[command(about = "Periodic crypto quote collector", long_about = None)]
#[command(version)]
struct Cli {
    /// 로그 레벨 (trace, debug, info, warn, error). 미지정 시 LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact). 미지정 시 LOG_FORMAT
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    let mut log_config = LogConfig::from_env();
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config)?;

    info!("Quote ticker collector 시작");

    // 설정 로드 (실패 시 어떤 작업도 시작하지 않음)
    let config = TickerConfig::from_env().inspect_err(|e| error!(error = %e, "설정 로드 실패"))?;
    info!(
        ticker_interval = ?config.schedule.ticker_interval,
        mapper_interval = ?config.schedule.mapper_interval,
        request_timeout = ?config.provider.request_timeout,
        use_db = config.storage.use_db,
        symbols = config.assets.tracked_symbols.len(),
        "설정 로드 완료"
    );

    // 공유 자원: HTTP 커넥션 풀, 저장소
    let http = CmcClient::build_http_client(config.provider.request_timeout)?;
    let client = Arc::new(CmcClient::new(config.cmc_config(), http));

    let (persister, store, pg): (Arc<dyn Persister>, Arc<dyn AssetStore>, Option<PgStore>) =
        match (&config.storage.use_db, &config.storage.database_url) {
            (true, Some(url)) => {
                let pg = PgStore::connect(url.expose_secret(), config.storage.max_connections).await?;
                pg.ensure_schema().await?;
                let shared = Arc::new(pg.clone());
                (
                    shared.clone() as Arc<dyn Persister>,
                    shared as Arc<dyn AssetStore>,
                    Some(pg),
                )
            }
            _ => {
                info!("USE_DB=false, 인메모리 저장소 사용");
                let memory = Arc::new(MemoryStore::new());
                (
                    memory.clone() as Arc<dyn Persister>,
                    memory as Arc<dyn AssetStore>,
                    None,
                )
            }
        };

    let shutdown = CancellationToken::new();
    let registry = AssetRegistry::new();

    let resolver = IdentityResolver::new(
        client.clone(),
        store,
        registry.clone(),
        config.assets.tracked_symbols.clone(),
        config.assets.bootstrap_top_n,
        &shutdown,
    );
    let orchestrator = CycleOrchestrator::new(
        client,
        Arc::new(CmcQuoteDecoder),
        persister,
        registry.clone(),
        &shutdown,
    );

    // 자산 레지스트리 초기화 + 즉시 한 번 해석
    let bootstrap_ctx =
        RequestContext::new(shutdown.child_token()).with_timeout(config.provider.request_timeout);
    if let Err(e) = resolver.reload_registry(&bootstrap_ctx).await {
        warn!(error = %e, "저장된 자산 로드 실패");
    }
    match resolver.refresh(&bootstrap_ctx).await {
        Ok(set) => info!(assets = set.len(), "초기 식별자 해석 완료"),
        Err(e) => warn!(error = %e, assets = registry.len(), "초기 식별자 해석 실패, 저장된 자산으로 시작"),
    }

    resolver.start(config.schedule.mapper_interval, config.provider.request_timeout)?;
    orchestrator.start(config.schedule.ticker_interval, config.provider.request_timeout)?;

    info!(
        "=== 데몬 실행 중 (시세 주기: {:?}, 해석 주기: {:?}) ===",
        config.schedule.ticker_interval, config.schedule.mapper_interval
    );

    shutdown_signal().await;
    shutdown.cancel();

    orchestrator.stop().await;
    resolver.stop().await;
    orchestrator.stats().log_summary("시세 사이클");

    if let Some(pg) = pg {
        pg.pool().close().await;
    }
    info!("Quote ticker collector 종료");

    Ok(())
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 종료 중..."),
        _ = terminate => warn!("SIGTERM 수신, 종료 중..."),
    }
}
