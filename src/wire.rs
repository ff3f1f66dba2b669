use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError, ErrorKind};
use crate::limits::{MAX_LINE_LEN, WATCH_CHANNEL_CAPACITY};
use crate::model::*;
use crate::observability::{self, request_label};

/// One request line: `{"op": "<name>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetActiveLayout,
    SetActiveLayout {
        layout_id: Ulid,
    },
    CreateLayout {
        layout: LayoutSpec,
    },
    GetLayout {
        layout_id: Ulid,
    },
    ListLayouts,
    UpdateLayout {
        layout_id: Ulid,
        update: LayoutUpdate,
    },
    DeleteLayout {
        layout_id: Ulid,
    },
    /// `layout_id` defaults to the active layout.
    AddBooth {
        #[serde(default)]
        layout_id: Option<Ulid>,
        booth: BoothDraft,
    },
    RemoveBooth {
        #[serde(default)]
        layout_id: Option<Ulid>,
        booth_id: Ulid,
    },
    FindAvailableLocations {
        width: i32,
        height: i32,
    },
    CheckReservationConflict {
        booth_id: Ulid,
        start: Ms,
        duration_weeks: u32,
    },
    SubmitApplication {
        application: VendorApplication,
    },
    ApproveApplication {
        application_id: Ulid,
    },
    RejectApplication {
        application_id: Ulid,
    },
    CancelApplication {
        application_id: Ulid,
    },
    LinkOccupancy {
        application_id: Ulid,
    },
    UnlinkOccupancy {
        application_id: Ulid,
    },
    /// Stream the layout's events on this connection.
    Watch {
        #[serde(default)]
        layout_id: Option<Ulid>,
    },
    /// Stop one feed, or every feed when `layout_id` is absent.
    Unwatch {
        #[serde(default)]
        layout_id: Option<Ulid>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// `{"ok": true, "data": ...}` or `{"ok": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn ok(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self { ok: true, data: Some(data), error: None },
            Err(e) => Self::error(ErrorKind::Internal, format!("encoding reply: {e}")),
        }
    }

    pub fn error(kind: ErrorKind, message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody { kind: kind.as_str().to_string(), message }),
        }
    }
}

impl From<&EngineError> for Reply {
    fn from(e: &EngineError) -> Self {
        Reply::error(e.kind(), e.to_string())
    }
}

/// Pushed to watching connections: `{"event": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: Event,
}

/// Per-connection watch state. Forwarding tasks die with the session.
struct Session {
    events: mpsc::Sender<Event>,
    watches: HashMap<Ulid, JoinHandle<()>>,
}

impl Session {
    fn watch(&mut self, engine: &Engine, layout_id: Ulid) {
        if self.watches.contains_key(&layout_id) {
            return;
        }
        let mut rx = engine.notify.subscribe(layout_id);
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("watcher on layout {layout_id} skipped {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.watches.insert(layout_id, handle);
    }

    fn unwatch(&mut self, layout_id: Option<Ulid>) -> usize {
        let ids: Vec<Ulid> = match layout_id {
            Some(id) => vec![id],
            None => self.watches.keys().copied().collect(),
        };
        let mut stopped = 0;
        for id in ids {
            if let Some(handle) = self.watches.remove(&id) {
                handle.abort();
                stopped += 1;
            }
        }
        stopped
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for handle in self.watches.values() {
            handle.abort();
        }
    }
}

async fn execute(engine: &Engine, request: Request, session: &mut Session) -> Result<Reply, EngineError> {
    let reply = match request {
        Request::GetActiveLayout => Reply::ok(engine.get_active_layout().await?),
        Request::SetActiveLayout { layout_id } => Reply::ok(engine.set_active_layout(layout_id).await?),
        Request::CreateLayout { layout } => Reply::ok(engine.create_layout(layout).await?),
        Request::GetLayout { layout_id } => Reply::ok(engine.get_layout(layout_id).await?),
        Request::ListLayouts => Reply::ok(engine.list_layouts().await),
        Request::UpdateLayout { layout_id, update } => {
            Reply::ok(engine.update_layout(layout_id, update).await?)
        }
        Request::DeleteLayout { layout_id } => {
            engine.delete_layout(layout_id).await?;
            Reply::ok(serde_json::json!({ "layout_id": layout_id }))
        }
        Request::AddBooth { layout_id, booth } => {
            let layout_id = engine.resolve_layout_id(layout_id).await?;
            Reply::ok(engine.add_booth(layout_id, booth).await?)
        }
        Request::RemoveBooth { layout_id, booth_id } => {
            let layout_id = engine.resolve_layout_id(layout_id).await?;
            engine.remove_booth(layout_id, booth_id).await?;
            Reply::ok(serde_json::json!({ "layout_id": layout_id, "booth_id": booth_id }))
        }
        Request::FindAvailableLocations { width, height } => {
            Reply::ok(engine.find_available_locations(width, height).await?)
        }
        Request::CheckReservationConflict { booth_id, start, duration_weeks } => {
            Reply::ok(engine.check_reservation_conflict(booth_id, start, duration_weeks).await?)
        }
        Request::SubmitApplication { application } => {
            Reply::ok(engine.submit_application(application).await?)
        }
        Request::ApproveApplication { application_id } => {
            Reply::ok(engine.approve_application(application_id).await?)
        }
        Request::RejectApplication { application_id } => {
            Reply::ok(engine.reject_application(application_id).await?)
        }
        Request::CancelApplication { application_id } => {
            Reply::ok(engine.cancel_application(application_id).await?)
        }
        Request::LinkOccupancy { application_id } => {
            let linked = engine.link_occupancy(application_id).await?;
            Reply::ok(serde_json::json!({ "linked": linked }))
        }
        Request::UnlinkOccupancy { application_id } => {
            let unlinked = engine.unlink_occupancy(application_id).await?;
            Reply::ok(serde_json::json!({ "unlinked": unlinked }))
        }
        Request::Watch { layout_id } => {
            let layout_id = engine.resolve_layout_id(layout_id).await?;
            // Existence check before subscribing.
            engine.get_layout(layout_id).await?;
            session.watch(engine, layout_id);
            Reply::ok(serde_json::json!({ "layout_id": layout_id }))
        }
        Request::Unwatch { layout_id } => {
            let stopped = session.unwatch(layout_id);
            Reply::ok(serde_json::json!({ "stopped": stopped }))
        }
    };
    Ok(reply)
}

async fn handle_line(engine: &Engine, line: &str, session: &mut Session) -> Reply {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => "invalid", "status" => "error")
                .increment(1);
            return Reply::error(ErrorKind::BadRequest, format!("malformed request: {e}"));
        }
    };

    let op = request_label(&request);
    let started = Instant::now();
    let reply = match execute(engine, request, session).await {
        Ok(reply) => reply,
        Err(e) => {
            debug!("{op} failed: {e}");
            Reply::from(&e)
        }
    };
    let status = if reply.ok { "ok" } else { "error" };
    metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    reply
}

fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::other(other),
    }
}

fn encode(value: &impl Serialize) -> io::Result<String> {
    serde_json::to_string(value).map_err(io::Error::other)
}

/// Serve one client until it disconnects or sends an oversized line.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> io::Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    let (events_tx, mut events_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
    let mut session = Session { events: events_tx, watches: HashMap::new() };

    loop {
        tokio::select! {
            line = lines.next() => {
                let line = match line {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!("request line over {MAX_LINE_LEN} bytes, closing connection");
                        break;
                    }
                    Some(Err(e)) => return Err(codec_err(e)),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(&engine, &line, &mut session).await;
                sink.send(encode(&reply)?).await.map_err(codec_err)?;
            }
            Some(event) = events_rx.recv() => {
                sink.send(encode(&Notification { event })?).await.map_err(codec_err)?;
            }
        }
    }
    Ok(())
}
