//! CoinMarketCap 클라이언트 HTTP 계약 테스트 (mockito).

use std::time::{Duration, Instant};

use mockito::Matcher;
use secrecy::SecretString;
use tokio::net::TcpListener;

use ticker_core::{AssetSet, ErrorKind, RequestContext, TickerError};
use ticker_data::{CmcClient, CmcConfig, CmcQuoteDecoder, IdentitySource, QuoteDecoder, QuoteFetcher};

const QUOTES_PATH: &str = "/v2/cryptocurrency/quotes/latest";
const MAP_PATH: &str = "/v1/cryptocurrency/map";

fn client_for(base_url: &str) -> CmcClient {
    let config = CmcConfig {
        api_key: SecretString::new("test-key".into()),
        quotes_url: format!("{}{}", base_url, QUOTES_PATH),
        map_url: format!("{}{}", base_url, MAP_PATH),
        timeout: Duration::from_secs(5),
    };
    let http = CmcClient::build_http_client(config.timeout).expect("HTTP 클라이언트 생성 실패");
    CmcClient::new(config, http)
}

#[tokio::test]
async fn test_fetch_sends_ids_and_api_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", QUOTES_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), "1,1027,5994".into()),
            Matcher::UrlEncoded("convert".into(), "USD".into()),
            Matcher::UrlEncoded(
                "aux".into(),
                "circulating_supply,total_supply,volume_24h_reported".into(),
            ),
        ]))
        .match_header("x-cmc_pro_api_key", "test-key")
        .match_header("accept", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":{"error_code":0,"error_message":null,"credit_count":1},
                "data":{"1":{"id":1,"name":"Bitcoin","symbol":"BTC","quote":{"USD":{"price":50000.0}}}}}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server.url());
    let ctx = RequestContext::background().with_timeout(Duration::from_secs(5));
    let body = client
        .fetch(&ctx, &AssetSet::new([1, 1027, 5994]))
        .await
        .expect("fetch 실패");

    mock.assert_async().await;
    let snapshots = CmcQuoteDecoder.decode(&body, chrono::Utc::now()).unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", QUOTES_PATH)
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client
        .fetch(&RequestContext::background(), &AssetSet::new([1]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_client_error_body_reaches_decoder() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", QUOTES_PATH)
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(
            r#"{"status":{"error_code":1008,"error_message":"You've exceeded your API Key's HTTP request rate limit.","credit_count":0}}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server.url());
    let body = client
        .fetch(&RequestContext::background(), &AssetSet::new([1]))
        .await
        .expect("4xx 본문은 디코더로 전달되어야 함");

    let err = CmcQuoteDecoder.decode(&body, chrono::Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderApplication);
}

#[tokio::test]
async fn test_lookup_symbols() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", MAP_PATH)
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTC,ETH".into()))
        .with_status(200)
        .with_body(
            r#"{"status":{"error_code":0,"credit_count":1},"data":[
                {"id":1,"rank":1,"name":"Bitcoin","symbol":"BTC","slug":"bitcoin","is_active":1},
                {"id":1027,"rank":2,"name":"Ethereum","symbol":"ETH","slug":"ethereum","is_active":1}
            ]}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server.url());
    let identities = client
        .lookup_symbols(
            &RequestContext::background(),
            &["BTC".to_string(), "ETH".to_string()],
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(identities.len(), 2);
    assert_eq!(identities[1].provider_id, 1027);
}

#[tokio::test]
async fn test_top_assets_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", MAP_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "5".into()),
            Matcher::UrlEncoded("sort".into(), "cmc_rank".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"status":{"error_code":0,"credit_count":1},"data":[]}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let identities = client
        .top_assets(&RequestContext::background(), 5)
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(identities.is_empty());
}

#[tokio::test]
async fn test_top_assets_rejects_zero_limit() {
    let client = client_for("http://127.0.0.1:9");
    let err = client
        .top_assets(&RequestContext::background(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, TickerError::Configuration(_)));
}

/// 연결은 받지만 응답하지 않는 서버.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_honors_deadline() {
    let client = client_for(&silent_server().await);
    let ctx = RequestContext::background().with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = client.fetch(&ctx, &AssetSet::new([1])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_fetch_returns_promptly_on_cancel() {
    let client = client_for(&silent_server().await);
    let ctx = RequestContext::background().with_timeout(Duration::from_secs(30));
    cancel_after(&ctx, Duration::from_millis(100));

    let started = Instant::now();
    let err = client.fetch(&ctx, &AssetSet::new([1])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// 지정 시간 후 컨텍스트 취소.
fn cancel_after(ctx: &RequestContext, delay: Duration) {
    let token = ctx.token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}
