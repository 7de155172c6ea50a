use chrono::Utc;
use common::{Credentials, Error, ExchangeSettings, MarketData, OrderSide};
use engine::binance::sign;
use engine::BinanceClient;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const SECRET: &str = "test-secret";

fn settings(auto_expand: bool) -> ExchangeSettings {
    ExchangeSettings {
        auto_expand_recv_window: auto_expand,
        clock_samples: 1,
        timeout_secs: 5,
        ..ExchangeSettings::default()
    }
}

fn client(server: &MockServer, auto_expand: bool) -> BinanceClient {
    let credentials = Credentials {
        api_key: "test-key".into(),
        api_secret: SECRET.into(),
    };
    BinanceClient::new(credentials, server.uri(), &settings(auto_expand), 1_000).unwrap()
}

fn stale_timestamp() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "code": -1021,
        "msg": "Timestamp for this request is outside of the recvWindow."
    }))
}

async fn mount_server_time(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "serverTime": Utc::now().timestamp_millis()
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Accepts a GET whose trailing `signature` is the HMAC of everything before it.
struct ValidSignature;

impl Match for ValidSignature {
    fn matches(&self, request: &Request) -> bool {
        let Some(query) = request.url.query() else {
            return false;
        };
        match query.rsplit_once("&signature=") {
            Some((payload, signature)) => sign(SECRET, payload) == signature,
            None => false,
        }
    }
}

#[tokio::test]
async fn signed_get_carries_key_timestamp_and_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .and(query_param("recvWindow", "5000"))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "balances": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server, false).account().await.unwrap();
    assert_eq!(body["balances"], json!([]));

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap().to_string();
    assert!(query.contains("timestamp="));
}

#[tokio::test]
async fn stale_timestamp_twice_resyncs_once_then_fails_with_clock_drift() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(stale_timestamp())
        .expect(2)
        .mount(&server)
        .await;
    mount_server_time(&server, 1).await;

    let client = client(&server, false);
    let result = client.account().await;

    assert!(matches!(result, Err(Error::ClockDrift(_))), "got {result:?}");
    assert_eq!(client.clock().sync_count(), 1);
    server.verify().await;
}

#[tokio::test]
async fn stale_timestamp_once_is_retried_after_resync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(stale_timestamp())
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(ValidSignature)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "canTrade": true })))
        .expect(1)
        .mount(&server)
        .await;
    mount_server_time(&server, 1).await;

    let body = client(&server, false).account().await.unwrap();
    assert_eq!(body["canTrade"], json!(true));
    server.verify().await;
}

#[tokio::test]
async fn other_exchange_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": -2015,
            "msg": "Invalid API-key, IP, or permissions for action."
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_server_time(&server, 0).await;

    let result = client(&server, false).account().await;
    match result {
        Err(Error::RequestFailed { code, message }) => {
            assert_eq!(code, -2015);
            assert!(message.starts_with("Invalid API-key"));
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    server.verify().await;
}

#[tokio::test]
async fn non_json_error_body_keeps_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let result = client(&server, false).account().await;
    assert!(matches!(result, Err(Error::RequestFailed { code: 503, .. })));
}

#[tokio::test]
async fn retry_widens_receive_window_when_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(query_param("recvWindow", "5000"))
        .respond_with(stale_timestamp())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(query_param("recvWindow", "10000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_server_time(&server, 1).await;

    let client = client(&server, true);
    client.account().await.unwrap();
    assert_eq!(client.recv_window_ms(), 10_000);
    server.verify().await;
}

#[tokio::test]
async fn receive_window_is_left_alone_when_expansion_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .respond_with(stale_timestamp())
        .mount(&server)
        .await;
    mount_server_time(&server, 1).await;

    let client = client(&server, false);
    assert!(client.account().await.is_err());
    assert_eq!(client.recv_window_ms(), 5_000);
}

#[tokio::test]
async fn test_order_posts_signed_form_and_returns_unit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/order/test"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .and(body_string_contains("symbol=BTCUSDT"))
        .and(body_string_contains("side=BUY"))
        .and(body_string_contains("type=MARKET"))
        .and(body_string_contains("&signature="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, false).test_order("BTCUSDT", OrderSide::Buy, 0.001).await;
    assert!(result.is_ok());
    server.verify().await;
}

#[tokio::test]
async fn klines_are_parsed_in_ascending_order() {
    let server = MockServer::start().await;
    let rows = json!([
        [1_700_000_120_000i64, "3", "3.5", "2.5", "3.2", "30", 1_700_000_179_999i64, "0", 1, "0", "0", "0"],
        [1_700_000_000_000i64, "1", "1.5", "0.5", "1.2", "10", 1_700_000_059_999i64, "0", 1, "0", "0", "0"],
        [1_700_000_060_000i64, "2", "2.5", "1.5", "2.2", "20", 1_700_000_119_999i64, "0", 1, "0", "0", "0"]
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .expect(1)
        .mount(&server)
        .await;

    let series = client(&server, false).get_ohlcv("BTCUSDT", "1m", 3).await.unwrap();
    assert_eq!(series.len(), 3);
    assert_eq!(series.closes(), vec![1.2, 2.2, 3.2]);
    assert_eq!(series.volumes(), vec![10.0, 20.0, 30.0]);
    let times: Vec<i64> = series.candles().iter().map(|c| c.open_time.timestamp_millis()).collect();
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn oversized_kline_limit_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let series = client(&server, false).get_ohlcv("BTCUSDT", "1h", 5_000).await.unwrap();
    assert!(series.is_empty());
    server.verify().await;
}

#[tokio::test]
async fn price_ticker_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/price"))
        .and(query_param("symbol", "ETHUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "ETHUSDT",
            "price": "3150.25000000"
        })))
        .mount(&server)
        .await;

    let price = client(&server, false).get_price("ETHUSDT").await.unwrap();
    assert_eq!(price, 3150.25);
}

#[tokio::test]
async fn clock_sync_measures_server_offset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "serverTime": Utc::now().timestamp_millis() + 5_000
        })))
        .mount(&server)
        .await;

    let client = client(&server, false);
    let clock = client.clock();
    let offset = clock.sync().await.unwrap();
    assert!((4_000..=5_100).contains(&offset), "offset {offset}");
    assert_eq!(clock.offset_ms(), offset);
    assert!(!clock.is_stale(std::time::Duration::from_secs(60)));
}

#[tokio::test]
async fn ping_and_server_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "serverTime": 1_499_827_319_559i64 })))
        .mount(&server)
        .await;

    let client = client(&server, false);
    client.ping().await.unwrap();
    assert_eq!(client.server_time().await.unwrap(), 1_499_827_319_559);
    server.verify().await;
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    let credentials = Credentials {
        api_key: "k".into(),
        api_secret: "s".into(),
    };
    let client = BinanceClient::new(credentials, "http://127.0.0.1:1", &settings(false), 1_000).unwrap();
    let err = client.ping().await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
