use std::net::SocketAddr;

use crate::model::Event;
use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "boothgrid_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "boothgrid_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "boothgrid_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "boothgrid_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "boothgrid_connections_rejected_total";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: committed layout events. Labels: event.
pub const LAYOUT_EVENTS_TOTAL: &str = "boothgrid_layout_events_total";

/// Counter: reservation overlaps found by checks, submissions and approvals.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "boothgrid_reservation_conflicts_total";

/// Counter: approved applications whose booth was missing from the active layout.
pub const OCCUPANCY_LINK_MISSES_TOTAL: &str = "boothgrid_occupancy_link_misses_total";

/// Histogram: WAL append + fsync duration in seconds.
pub const WAL_APPEND_DURATION_SECONDS: &str = "boothgrid_wal_append_duration_seconds";

/// Counter: inline WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "boothgrid_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

pub fn event_label(event: &Event) -> &'static str {
    match event {
        Event::LayoutCreated { .. } => "layout_created",
        Event::LayoutUpdated { .. } => "layout_updated",
        Event::LayoutDeleted { .. } => "layout_deleted",
        Event::ActiveLayoutSet { .. } => "active_layout_set",
        Event::BoothAdded { .. } => "booth_added",
        Event::BoothRemoved { .. } => "booth_removed",
        Event::OccupancyLinked { .. } => "occupancy_linked",
        Event::OccupancyCleared { .. } => "occupancy_cleared",
    }
}

/// Map a Request variant to a short label for metrics.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::GetActiveLayout => "get_active_layout",
        Request::SetActiveLayout { .. } => "set_active_layout",
        Request::CreateLayout { .. } => "create_layout",
        Request::GetLayout { .. } => "get_layout",
        Request::ListLayouts => "list_layouts",
        Request::UpdateLayout { .. } => "update_layout",
        Request::DeleteLayout { .. } => "delete_layout",
        Request::AddBooth { .. } => "add_booth",
        Request::RemoveBooth { .. } => "remove_booth",
        Request::FindAvailableLocations { .. } => "find_available_locations",
        Request::CheckReservationConflict { .. } => "check_reservation_conflict",
        Request::SubmitApplication { .. } => "submit_application",
        Request::ApproveApplication { .. } => "approve_application",
        Request::RejectApplication { .. } => "reject_application",
        Request::CancelApplication { .. } => "cancel_application",
        Request::LinkOccupancy { .. } => "link_occupancy",
        Request::UnlinkOccupancy { .. } => "unlink_occupancy",
        Request::Watch { .. } => "watch",
        Request::Unwatch { .. } => "unwatch",
    }
}
