#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use flate2::{Compression, write::GzEncoder};
use tokio::net::TcpListener;

use portal_proxy::{
    AppConfig, DynLinkStore, EdgeApplicationServer, FileLinkStore,
    server::services::edge_services::EdgeServices,
};

pub const LOAD_PATH: &str = "/stalker_portal/server/load.php";

/// a fake stalker portal. Link answers come from the two maps, everything it's asked gets
/// written down in `calls` so tests can check ordering.
#[derive(Default)]
pub struct MockPortal {
    pub origin: Mutex<String>,
    /// ch_id -> cmd answered by get_link_for_ch
    pub local_links: Mutex<HashMap<String, String>>,
    /// cmd -> cmd answered by create_link
    pub provider_links: Mutex<HashMap<String, String>>,
    /// body of get_all_channels
    pub channels: Mutex<String>,
    pub calls: Mutex<Vec<String>>,
    pub link_for_ch_calls: AtomicUsize,
    pub create_link_calls: AtomicUsize,
    pub link_delay: Mutex<Duration>,
}

impl MockPortal {
    pub fn origin(&self) -> String {
        self.origin.lock().unwrap().clone()
    }

    pub fn add_local_link(&self, ch_id: &str, cmd: &str) {
        self.local_links
            .lock()
            .unwrap()
            .insert(ch_id.to_string(), cmd.to_string());
    }

    pub fn add_provider_link(&self, cmd: &str, resolved: &str) {
        self.provider_links
            .lock()
            .unwrap()
            .insert(cmd.to_string(), resolved.to_string());
    }

    pub fn set_channels(&self, body: &str) {
        *self.channels.lock().unwrap() = body.to_string();
    }

    pub fn set_link_delay(&self, delay: Duration) {
        *self.link_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn json_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn link_answer(cmd: Option<String>) -> Response {
    match cmd {
        Some(cmd) => json_response(serde_json::json!({"js": {"cmd": cmd, "error": ""}}).to_string()),
        None => json_response(
            serde_json::json!({"js": {"cmd": "", "error": "nothing_to_play"}}).to_string(),
        ),
    }
}

async fn load_php(
    State(portal): State<Arc<MockPortal>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let action = params.get("action").cloned().unwrap_or_default();

    match action.as_str() {
        "get_link_for_ch" => {
            let ch_id = params.get("ch_id").cloned().unwrap_or_default();
            portal.link_for_ch_calls.fetch_add(1, Ordering::SeqCst);
            portal
                .calls
                .lock()
                .unwrap()
                .push(format!("get_link_for_ch:{}", ch_id));
            let delay = *portal.link_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            let cmd = portal.local_links.lock().unwrap().get(&ch_id).cloned();
            link_answer(cmd)
        }
        "create_link" => {
            let cmd = params.get("cmd").cloned().unwrap_or_default();
            portal.create_link_calls.fetch_add(1, Ordering::SeqCst);
            portal
                .calls
                .lock()
                .unwrap()
                .push(format!("create_link:{}", cmd));
            if params.get("JsHttpRequest").map(String::as_str) != Some("1-xml") {
                return StatusCode::BAD_REQUEST.into_response();
            }
            let delay = *portal.link_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            let resolved = portal.provider_links.lock().unwrap().get(&cmd).cloned();
            link_answer(resolved)
        }
        "get_all_channels" => json_response(portal.channels.lock().unwrap().clone()),
        _ => json_response(r#"{"js":true}"#.to_string()),
    }
}

async fn text_page(State(portal): State<Arc<MockPortal>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        format!(
            "<a href=\"{0}/portal.php\">portal</a> <img src=\"{0}/logo.png\">",
            portal.origin()
        ),
    )
        .into_response()
}

async fn binary_page(State(portal): State<Arc<MockPortal>>) -> Response {
    let mut body = vec![0xff, 0xfe, 0x00];
    body.extend_from_slice(portal.origin().as_bytes());
    ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
}

async fn gzip_page(State(portal): State<Arc<MockPortal>>) -> Response {
    let json = serde_json::json!({"js": {"logo": format!("{}/logo.png", portal.origin())}});
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.to_string().as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        compressed,
    )
        .into_response()
}

async fn brotli_page() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::CONTENT_ENCODING, "br"),
        ],
        vec![0x1b, 0x03, 0x00, 0xf8],
    )
        .into_response()
}

async fn broken_json(State(portal): State<Arc<MockPortal>>) -> Response {
    json_response(format!("<html>oops {}/error</html>", portal.origin()))
}

async fn echo(uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let query = uri.query().unwrap_or("").to_string();
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    (
        [
            ("x-echo-query", query),
            ("x-echo-cookie", cookie),
            ("x-echo-host", host),
            ("content-type", "application/octet-stream".to_string()),
        ],
        body,
    )
        .into_response()
}

async fn redirect(State(portal): State<Arc<MockPortal>>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("{}/elsewhere", portal.origin()))],
    )
        .into_response()
}

pub async fn spawn_mock_portal() -> Arc<MockPortal> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let portal = Arc::new(MockPortal::default());
    *portal.origin.lock().unwrap() = format!("http://{}", addr);

    let app = Router::new()
        .route(LOAD_PATH, get(load_php))
        .route("/text", get(text_page))
        .route("/binary", get(binary_page))
        .route("/gzip", get(gzip_page))
        .route("/brotli", get(brotli_page))
        .route("/broken-json", get(broken_json))
        .route("/echo", any(echo))
        .route("/redirect", get(redirect))
        .with_state(portal.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    portal
}

pub fn test_config(upstream_domain: &str) -> AppConfig {
    AppConfig {
        upstream_domain: upstream_domain.to_string(),
        upstream_timeout_secs: 5,
        // tests shouldn't sit in the throttle
        throttle_budget: 1000,
        throttle_window_ms: 1000,
        max_concurrent_requests: 64,
        ..Default::default()
    }
    .validate()
    .unwrap()
}

pub fn temp_cache_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("portal_proxy_test_{}", nanoid::nanoid!()))
}

pub async fn temp_store() -> DynLinkStore {
    Arc::new(FileLinkStore::open(temp_cache_dir()).await.unwrap())
}

pub async fn test_services(config: AppConfig, store: DynLinkStore) -> EdgeServices {
    EdgeServices::new(Arc::new(config), store, None).unwrap()
}

/// runs the proxy on a random port, returns its address
pub async fn spawn_proxy(services: EdgeServices) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = EdgeApplicationServer::router(services);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// the channel list of the round trip example, pointed at the given portal
pub fn example_channels(origin: &str) -> String {
    serde_json::json!({
        "js": {
            "total_items": 1,
            "data": [{
                "id": "1",
                "name": "Channel One",
                "cmd": format!("ffmpeg {}/ch1", origin),
                "cmds": [{
                    "id": "11",
                    "url": format!("ffmpeg {}/ch1", origin),
                    "use_http_tmp_link": "1"
                }]
            }]
        }
    })
    .to_string()
}
