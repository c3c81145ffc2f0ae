//! CoinMarketCap API 클라이언트.
//!
//! - 시세: `GET /v2/cryptocurrency/quotes/latest?id=1,1027&convert=USD&aux=...`
//! - ID 맵: `GET /v1/cryptocurrency/map?symbol=BTC,ETH` 또는 `?limit=N&sort=cmc_rank`
//!
//! Provider 문서는 심볼 대신 숫자 ID 사용을 권장합니다.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use ticker_core::{AssetIdentity, AssetSet, RequestContext, Result, TickerError};

use super::{IdentitySource, QuoteFetcher};
use crate::decoder::decode_identity_map;

/// API 키 헤더.
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// 시세와 함께 요청할 보조 필드.
const QUOTE_AUX_FIELDS: &str = "circulating_supply,total_supply,volume_24h_reported";

/// CoinMarketCap 클라이언트 설정.
///
/// `Debug` 구현은 API 키를 출력하지 않습니다.
#[derive(Clone)]
pub struct CmcConfig {
    pub api_key: SecretString,
    pub quotes_url: String,
    pub map_url: String,
    /// HTTP 요청 타임아웃 (컨텍스트 데드라인이 더 이르면 그것을 따름)
    pub timeout: Duration,
}

impl fmt::Debug for CmcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmcConfig")
            .field("api_key", &"***REDACTED***")
            .field("quotes_url", &self.quotes_url)
            .field("map_url", &self.map_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// CoinMarketCap 클라이언트.
///
/// HTTP 커넥션 풀(`reqwest::Client`)은 프로세스 시작 시 한 번 만들어 공유합니다.
#[derive(Debug, Clone)]
pub struct CmcClient {
    config: CmcConfig,
    client: Client,
}

impl CmcClient {
    /// 공유 HTTP 클라이언트로 생성.
    pub fn new(config: CmcConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// 공유용 HTTP 클라이언트 생성.
    pub fn build_http_client(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TickerError::Configuration(format!("HTTP 클라이언트 생성 실패: {}", e)))
    }

    pub fn config(&self) -> &CmcConfig {
        &self.config
    }

    fn get(&self, ctx: &RequestContext, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .header(API_KEY_HEADER, self.config.api_key.expose_secret());

        match ctx.remaining() {
            Some(remaining) => request.timeout(remaining.min(self.config.timeout)),
            None => request,
        }
    }

    /// 요청 전송 후 본문 반환.
    ///
    /// 5xx는 전송 에러로 처리합니다. 그 외 상태 코드는 provider가 본문에 status
    /// 객체를 담아 보내므로 디코더가 분류하도록 본문을 그대로 넘깁니다.
    async fn execute(&self, ctx: &RequestContext, request: RequestBuilder) -> Result<Vec<u8>> {
        let send = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();

            if status.is_server_error() {
                return Err(TickerError::Transport(format!("HTTP {}", status)));
            }

            let body = response.bytes().await.map_err(transport_error)?;
            if !status.is_success() {
                warn!(status = %status, size = body.len(), "Provider 비정상 응답");
            }
            Ok(body.to_vec())
        };

        ctx.run(send).await.map_err(TickerError::from)?
    }
}

#[async_trait]
impl QuoteFetcher for CmcClient {
    fn name(&self) -> &str {
        "coinmarketcap"
    }

    async fn fetch(&self, ctx: &RequestContext, assets: &AssetSet) -> Result<Vec<u8>> {
        let ids = assets.to_query_param();
        debug!(ids = %ids, "시세 요청");

        let request = self.get(ctx, &self.config.quotes_url).query(&[
            ("id", ids.as_str()),
            ("convert", "USD"),
            ("aux", QUOTE_AUX_FIELDS),
        ]);

        self.execute(ctx, request).await
    }
}

#[async_trait]
impl IdentitySource for CmcClient {
    async fn lookup_symbols(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> Result<Vec<AssetIdentity>> {
        let joined = symbols.join(",");
        debug!(symbols = %joined, "ID 맵 조회");

        let request = self
            .get(ctx, &self.config.map_url)
            .query(&[("symbol", joined.as_str())]);

        let body = self.execute(ctx, request).await?;
        decode_identity_map(&body)
    }

    async fn top_assets(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<AssetIdentity>> {
        if limit == 0 {
            return Err(TickerError::Configuration(
                "limit은 0보다 커야 합니다".to_string(),
            ));
        }
        debug!(limit, "상위 자산 조회");

        let request = self.get(ctx, &self.config.map_url).query(&[
            ("limit", limit.to_string().as_str()),
            ("sort", "cmc_rank"),
        ]);

        let body = self.execute(ctx, request).await?;
        decode_identity_map(&body)
    }
}

fn transport_error(err: reqwest::Error) -> TickerError {
    if err.is_timeout() {
        TickerError::Timeout(err.to_string())
    } else {
        TickerError::Transport(err.to_string())
    }
}
