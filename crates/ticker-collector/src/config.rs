//! 환경변수 기반 설정 모듈.
//!
//! 시작 시 한 번 로드되며 실행 중에는 다시 읽지 않습니다.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use ticker_data::CmcConfig;

use crate::error::CollectorError;
use crate::Result;

const DEFAULT_BASE_URL: &str = "https://pro-api.coinmarketcap.com";
const QUOTES_PATH: &str = "/v2/cryptocurrency/quotes/latest";
const ID_MAP_PATH: &str = "/v1/cryptocurrency/map";

/// 수집기 전체 설정
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// 시세 provider 설정
    pub provider: ProviderConfig,
    /// 스케줄 설정
    pub schedule: ScheduleConfig,
    /// 추적 자산 설정
    pub assets: AssetConfig,
    /// 저장소 설정
    pub storage: StorageConfig,
}

/// CoinMarketCap 설정
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API 키 (Debug 출력 시 마스킹)
    pub api_key: SecretString,
    pub base_url: String,
    pub quotes_url: String,
    pub map_url: String,
    /// 사이클 타임아웃 (HTTP 요청 타임아웃 겸용)
    pub request_timeout: Duration,
}

/// 스케줄 설정
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// 시세 사이클 주기
    pub ticker_interval: Duration,
    /// 식별자 해석 주기
    pub mapper_interval: Duration,
}

/// 추적 자산 설정
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// 해석할 심볼 (대문자)
    pub tracked_symbols: Vec<String>,
    /// 추적 자산이 없을 때 가져올 상위 자산 수 (0이면 비활성화)
    pub bootstrap_top_n: usize,
}

/// 저장소 설정
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// PostgreSQL 사용 여부 (false면 인메모리)
    pub use_db: bool,
    /// 연결 문자열 (비밀번호 포함)
    pub database_url: Option<SecretString>,
    pub max_connections: u32,
}

impl TickerConfig {
    /// 환경변수에서 설정 로드 (`.env` 파일 우선 로드)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 로드. 빈 값은 미설정으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("CMC_API_KEY").ok_or_else(|| {
            CollectorError::Config("CMC_API_KEY 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let base_url = get("CMC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let quotes_url = get("CMC_QUOTES_URL").unwrap_or_else(|| format!("{}{}", base_url, QUOTES_PATH));
        let map_url = get("CMC_ID_MAP_URL").unwrap_or_else(|| format!("{}{}", base_url, ID_MAP_PATH));

        let use_db = get("USE_DB").map(|v| parse_bool(&v)).unwrap_or(false);
        let database_url = get("DATABASE_URL").or_else(|| {
            use_db.then(|| {
                format!(
                    "postgres://{}:{}@{}:{}/{}",
                    get("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                    get("DB_PASSWORD").unwrap_or_else(|| "postgres".to_string()),
                    get("DB_HOST").unwrap_or_else(|| "postgres".to_string()),
                    get("DB_PORT").unwrap_or_else(|| "5432".to_string()),
                    get("DB_NAME").unwrap_or_else(|| "postgres".to_string()),
                )
            })
        });

        let config = Self {
            provider: ProviderConfig {
                api_key: SecretString::new(api_key.into()),
                base_url,
                quotes_url,
                map_url,
                request_timeout: duration_var(&get, "CMC_REQUEST_TIMEOUT", Duration::from_secs(30))?,
            },
            schedule: ScheduleConfig {
                ticker_interval: duration_var(&get, "TICKER_INTERVAL", Duration::from_secs(120))?,
                mapper_interval: duration_var(&get, "MAPPER_INTERVAL", Duration::from_secs(24 * 3600))?,
            },
            assets: AssetConfig {
                tracked_symbols: get("TRACKED_SYMBOLS")
                    .map(|v| parse_symbols(&v))
                    .unwrap_or_default(),
                bootstrap_top_n: parse_var(&get, "BOOTSTRAP_TOP_N", 5)?,
            },
            storage: StorageConfig {
                use_db,
                database_url: database_url.map(|url| SecretString::new(url.into())),
                max_connections: parse_var(&get, "DB_MAX_CONNECTIONS", 5)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정 검증. 실패하면 수집기를 시작하지 않습니다.
    pub fn validate(&self) -> Result<()> {
        if self.provider.api_key.expose_secret().trim().is_empty() {
            return Err(config_error("CMC_API_KEY가 비어 있습니다"));
        }
        for (key, url) in [
            ("CMC_QUOTES_URL", &self.provider.quotes_url),
            ("CMC_ID_MAP_URL", &self.provider.map_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(config_error(format!("{}는 http(s) URL이어야 합니다: {}", key, url)));
            }
        }

        let schedule = &self.schedule;
        if self.provider.request_timeout.is_zero()
            || schedule.ticker_interval.is_zero()
            || schedule.mapper_interval.is_zero()
        {
            return Err(config_error("주기와 타임아웃은 0보다 커야 합니다"));
        }
        // 타임아웃이 주기 이상이면 사이클이 겹치지 않아도 tick이 계속 누락됨
        if self.provider.request_timeout >= schedule.ticker_interval {
            return Err(config_error(format!(
                "CMC_REQUEST_TIMEOUT({:?})은 TICKER_INTERVAL({:?})보다 짧아야 합니다",
                self.provider.request_timeout, schedule.ticker_interval
            )));
        }
        if self.provider.request_timeout >= schedule.mapper_interval {
            return Err(config_error(format!(
                "CMC_REQUEST_TIMEOUT({:?})은 MAPPER_INTERVAL({:?})보다 짧아야 합니다",
                self.provider.request_timeout, schedule.mapper_interval
            )));
        }

        if self.storage.use_db {
            match &self.storage.database_url {
                Some(url) if url.expose_secret().starts_with("postgres") => {}
                Some(_) => return Err(config_error("DATABASE_URL은 postgres:// 형식이어야 합니다")),
                None => return Err(config_error("USE_DB=true이지만 DATABASE_URL이 없습니다")),
            }
            if self.storage.max_connections == 0 {
                return Err(config_error("DB_MAX_CONNECTIONS는 0보다 커야 합니다"));
            }
        }

        Ok(())
    }

    /// Provider 클라이언트 설정 생성
    pub fn cmc_config(&self) -> CmcConfig {
        CmcConfig {
            api_key: self.provider.api_key.clone(),
            quotes_url: self.provider.quotes_url.clone(),
            map_url: self.provider.map_url.clone(),
            timeout: self.provider.request_timeout,
        }
    }
}

fn config_error(message: impl Into<String>) -> CollectorError {
    CollectorError::Config(message.into())
}

/// 기간 문자열 파싱 (`500ms`, `30s`, `2m`, `24h`, 단위 없으면 초)
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let n: u64 = number.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs),
        "h" => n.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// 쉼표로 구분된 심볼 목록 (대문자, 중복 제거)
fn parse_symbols(value: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in value.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1")
}

/// 기간 환경변수 (잘못된 형식은 설정 에러)
fn duration_var<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_duration(&raw)
            .ok_or_else(|| config_error(format!("{} 형식이 잘못되었습니다: {}", key, raw))),
        None => Ok(default),
    }
}

/// 숫자 환경변수 (잘못된 형식은 설정 에러)
fn parse_var<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| config_error(format!("{} 형식이 잘못되었습니다: {}", key, raw))),
        None => Ok(default),
    }
}
