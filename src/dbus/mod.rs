// SPDX-License-Identifier: GPL-3.0-only

//! Session-bus client for the keyboard-layouts service.
//!
//! The desktop's layout manager owns the configured layout list and the
//! active index, exposed at `org.kde.keyboard` `/Layouts` as
//! `org.kde.KeyboardLayouts`:
//!
//! - `getLayoutsList() -> a(sss)` — ordered (short id, name, variant)
//!   triples
//! - `getLayout() -> u` — the active index
//! - signals `layoutChanged` / `layoutListChanged`, delivered with no
//!   payload; the receiver must re-query
//!
//! [`run_layout_bridge`] converts those signals into engine commands
//! carrying the freshly re-queried payload. A missing or broken service
//! is recoverable: the engine keeps running on its placeholder layout
//! and the next signal retries naturally — no retry loop here.

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use crate::app_settings::{LAYOUTS_INTERFACE, LAYOUTS_PATH, LAYOUTS_SERVICE};
use crate::engine::EngineCommand;
use crate::layout::Layout;

/// Result type for layout-service operations.
pub type DbusResult<T> = Result<T, DbusError>;

/// Errors that can occur while talking to the layout service.
#[derive(Debug, Clone)]
pub enum DbusError {
    /// Failed to connect to the session bus.
    ConnectionFailed(String),
    /// Failed to call a method on the service.
    MethodCallFailed(String),
}

impl std::fmt::Display for DbusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbusError::ConnectionFailed(msg) => write!(f, "D-Bus connection failed: {}", msg),
            DbusError::MethodCallFailed(msg) => write!(f, "D-Bus method call failed: {}", msg),
        }
    }
}

impl std::error::Error for DbusError {}

#[zbus::proxy(
    interface = "org.kde.KeyboardLayouts",
    default_service = "org.kde.keyboard",
    default_path = "/Layouts"
)]
trait KeyboardLayouts {
    /// Ordered list of configured layouts as (shortId, name, variant).
    #[zbus(name = "getLayoutsList")]
    fn get_layouts_list(&self) -> zbus::Result<Vec<(String, String, String)>>;

    /// Index of the active layout.
    #[zbus(name = "getLayout")]
    fn get_layout(&self) -> zbus::Result<u32>;

    /// The active layout changed; re-query `getLayout`.
    #[zbus(signal, name = "layoutChanged")]
    fn layout_changed(&self) -> zbus::Result<()>;

    /// The configured set changed; re-query `getLayoutsList`.
    #[zbus(signal, name = "layoutListChanged")]
    fn layout_list_changed(&self) -> zbus::Result<()>;
}

/// Converts the wire triples into [`Layout`] records.
fn layouts_from_wire(wire: Vec<(String, String, String)>) -> Vec<Layout> {
    wire.into_iter()
        .map(|(short_id, name, variant)| Layout {
            short_id,
            name,
            variant,
        })
        .collect()
}

/// Client handle for the layout-management service.
pub struct LayoutService {
    proxy: KeyboardLayoutsProxy<'static>,
}

impl std::fmt::Debug for LayoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutService").finish_non_exhaustive()
    }
}

impl LayoutService {
    /// Connects to the session bus and binds the layouts proxy.
    pub async fn connect() -> DbusResult<Self> {
        let connection = zbus::Connection::session()
            .await
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?;

        let proxy = KeyboardLayoutsProxy::new(&connection)
            .await
            .map_err(|e| DbusError::ConnectionFailed(e.to_string()))?;

        tracing::info!(
            service = LAYOUTS_SERVICE,
            path = LAYOUTS_PATH,
            interface = LAYOUTS_INTERFACE,
            "connected to layout service"
        );
        Ok(Self { proxy })
    }

    /// Re-queries the configured layout list.
    pub async fn fetch_layouts(&self) -> DbusResult<Vec<Layout>> {
        self.proxy
            .get_layouts_list()
            .await
            .map(layouts_from_wire)
            .map_err(|e| DbusError::MethodCallFailed(e.to_string()))
    }

    /// Re-queries the active layout index. `None` on failure; the
    /// registry turns that into its placeholder fallback.
    pub async fn fetch_active(&self) -> Option<u32> {
        match self.proxy.get_layout().await {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("active layout query failed: {}", e);
                None
            }
        }
    }
}

/// Forwards layout-service signals to the engine as commands.
///
/// Performs the initial list + active-index fetch on entry, then
/// re-queries on every payload-free change signal. Returns when the
/// engine's command channel closes.
pub async fn run_layout_bridge(
    service: LayoutService,
    mut commands: mpsc::Sender<EngineCommand>,
) {
    let mut list_changed = match service.proxy.receive_layout_list_changed().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("cannot subscribe to layoutListChanged: {}", e);
            return;
        }
    };
    let mut layout_changed = match service.proxy.receive_layout_changed().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("cannot subscribe to layoutChanged: {}", e);
            return;
        }
    };

    if refresh_all(&service, &mut commands).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            signal = list_changed.next() => {
                if signal.is_none() {
                    tracing::debug!("layoutListChanged stream ended");
                    return;
                }
                if refresh_all(&service, &mut commands).await.is_err() {
                    return;
                }
            }
            signal = layout_changed.next() => {
                if signal.is_none() {
                    tracing::debug!("layoutChanged stream ended");
                    return;
                }
                let active = service.fetch_active().await;
                if commands.send(EngineCommand::ActiveLayoutChanged(active)).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Re-queries list and active index and forwards both. Errors mean the
/// engine side hung up.
async fn refresh_all(
    service: &LayoutService,
    commands: &mut mpsc::Sender<EngineCommand>,
) -> Result<(), ()> {
    match service.fetch_layouts().await {
        Ok(layouts) => {
            commands
                .send(EngineCommand::LayoutListChanged(layouts))
                .await
                .map_err(|_| ())?;
        }
        Err(e) => {
            // Degraded mode: force the placeholder, retry on the next
            // signal.
            tracing::warn!("layout list query failed: {}", e);
            commands
                .send(EngineCommand::ActiveLayoutChanged(None))
                .await
                .map_err(|_| ())?;
            return Ok(());
        }
    }

    let active = service.fetch_active().await;
    commands
        .send(EngineCommand::ActiveLayoutChanged(active))
        .await
        .map_err(|_| ())
}

// ============================================================================
// Tests
// ============================================================================
