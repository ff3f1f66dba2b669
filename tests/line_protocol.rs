use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use boothgrid::engine::{Engine, InMemoryApplications};
use boothgrid::notify::NotifyHub;
use boothgrid::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("boothgrid_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(
        Engine::new(
            dir.join("layouts.wal"),
            Arc::new(NotifyHub::new()),
            Arc::new(InMemoryApplications::new()),
        )
        .unwrap(),
    );

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
    /// Events that arrived while waiting for a reply.
    pending_events: Vec<Value>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
            pending_events: Vec::new(),
        }
    }

    /// Next line from the server; `None` on timeout, EOF or reset.
    async fn next_line(&mut self) -> Option<Value> {
        match tokio::time::timeout(Duration::from_secs(5), self.framed.next()).await {
            Ok(Some(Ok(line))) => Some(serde_json::from_str(&line).unwrap()),
            _ => None,
        }
    }

    async fn call(&mut self, request: Value) -> Value {
        self.call_raw(&request.to_string()).await
    }

    async fn call_raw(&mut self, line: &str) -> Value {
        self.framed.send(line.to_string()).await.unwrap();
        loop {
            let msg = self.next_line().await.expect("no reply");
            if msg.get("event").is_some() {
                self.pending_events.push(msg);
            } else {
                return msg;
            }
        }
    }

    /// Call and unwrap `data`, failing on an error reply.
    async fn ok(&mut self, request: Value) -> Value {
        let reply = self.call(request).await;
        assert_eq!(reply["ok"], true, "unexpected error reply: {reply}");
        reply["data"].clone()
    }

    async fn next_event(&mut self) -> Option<Value> {
        if !self.pending_events.is_empty() {
            return Some(self.pending_events.remove(0)["event"].clone());
        }
        self.next_line().await.map(|v| v["event"].clone())
    }
}

fn error_kind(reply: &Value) -> &str {
    assert_eq!(reply["ok"], false, "expected error reply: {reply}");
    reply["error"]["kind"].as_str().unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn active_layout_and_booths_over_tcp() {
    let addr = start_test_server().await;
    let mut c = Client::connect(addr).await;

    let layout = c.ok(json!({"op": "get_active_layout"})).await;
    assert_eq!(layout["name"], "Main Floor");
    assert_eq!(layout["grid_width"], 60);
    assert_eq!(layout["is_active"], true);

    // layout_id omitted: goes to the active layout.
    let booth = c
        .ok(json!({"op": "add_booth", "booth": {"x": 0, "y": 0, "width": 4, "height": 4, "label": "A1"}}))
        .await;
    assert_eq!(booth["label"], "A1");
    assert_eq!(booth["is_occupied"], false);

    let overlap = c
        .call(json!({"op": "add_booth", "booth": {"x": 2, "y": 2, "width": 2, "height": 2}}))
        .await;
    assert_eq!(error_kind(&overlap), "bad_request");

    let free = c.ok(json!({"op": "find_available_locations", "width": 4, "height": 4})).await;
    let free = free.as_array().unwrap();
    assert_eq!(free[0], json!({"x": 4, "y": 0}));
    assert!(!free.contains(&json!({"x": 0, "y": 0})));

    let listed = c.ok(json!({"op": "list_layouts"})).await;
    assert_eq!(listed[0]["booth_count"], 1);
}

#[tokio::test]
async fn reservation_flow_over_tcp() {
    let addr = start_test_server().await;
    let mut c = Client::connect(addr).await;

    let layout_id = c.ok(json!({"op": "get_active_layout"})).await["id"].clone();
    let booth = c
        .ok(json!({"op": "add_booth", "layout_id": layout_id, "booth": {"x": 0, "y": 0, "width": 2, "height": 2}}))
        .await;
    let booth_id = booth["id"].clone();

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    let app_id = Ulid::new().to_string();
    let submitted = c
        .ok(json!({"op": "submit_application", "application": {
            "id": app_id, "kind": "platform", "booth_id": booth_id,
            "company": "Shawarma Stop", "start": now, "duration_weeks": 2
        }}))
        .await;
    assert_eq!(submitted["status"], "pending");

    let check = c
        .ok(json!({"op": "check_reservation_conflict", "booth_id": booth_id, "start": now, "duration_weeks": 1}))
        .await;
    assert_eq!(check["conflict"], true);
    assert_eq!(check["details"]["label"], "pending approval");
    assert_eq!(check["details"]["company"], "Shawarma Stop");

    let bad_duration = c
        .call(json!({"op": "check_reservation_conflict", "booth_id": booth_id, "start": now, "duration_weeks": 9}))
        .await;
    assert_eq!(error_kind(&bad_duration), "bad_request");

    c.ok(json!({"op": "approve_application", "application_id": app_id})).await;
    let layout = c.ok(json!({"op": "get_layout", "layout_id": layout_id})).await;
    assert_eq!(layout["booths"][0]["is_occupied"], true);
    assert_eq!(layout["booths"][0]["application_id"], app_id.as_str());

    let blocked = c
        .call(json!({"op": "remove_booth", "layout_id": layout_id, "booth_id": booth_id}))
        .await;
    assert_eq!(error_kind(&blocked), "conflict");

    c.ok(json!({"op": "cancel_application", "application_id": app_id})).await;
    c.ok(json!({"op": "remove_booth", "booth_id": booth_id})).await;
}

#[tokio::test]
async fn watch_streams_events_to_other_connections() {
    let addr = start_test_server().await;
    let mut watcher = Client::connect(addr).await;
    let mut editor = Client::connect(addr).await;

    let layout_id = watcher.ok(json!({"op": "get_active_layout"})).await["id"].clone();
    let subscribed = watcher.ok(json!({"op": "watch"})).await;
    assert_eq!(subscribed["layout_id"], layout_id);

    let booth = editor
        .ok(json!({"op": "add_booth", "booth": {"x": 1, "y": 1, "width": 3, "height": 2}}))
        .await;

    let event = watcher.next_event().await.expect("no event");
    assert_eq!(event["BoothAdded"]["layout_id"], layout_id);
    assert_eq!(event["BoothAdded"]["booth"]["id"], booth["id"]);

    let stopped = watcher.ok(json!({"op": "unwatch"})).await;
    assert_eq!(stopped["stopped"], 1);
}

#[tokio::test]
async fn protocol_errors() {
    let addr = start_test_server().await;
    let mut c = Client::connect(addr).await;

    let garbage = c.call_raw("this is not json").await;
    assert_eq!(error_kind(&garbage), "bad_request");

    let unknown_op = c.call(json!({"op": "format_disk"})).await;
    assert_eq!(error_kind(&unknown_op), "bad_request");

    let missing = c.call(json!({"op": "get_layout", "layout_id": Ulid::new().to_string()})).await;
    assert_eq!(error_kind(&missing), "not_found");

    // Connection still usable after errors.
    c.ok(json!({"op": "list_layouts"})).await;
}

#[tokio::test]
async fn oversized_line_closes_connection() {
    let addr = start_test_server().await;
    let mut c = Client::connect(addr).await;

    let huge = format!("{{\"op\":\"list_layouts\",\"pad\":\"{}\"}}", "x".repeat(2 * 1024 * 1024));
    // The server may reset mid-write; only the missing reply matters.
    let _ = c.framed.send(huge).await;
    assert!(c.next_line().await.is_none());
}
