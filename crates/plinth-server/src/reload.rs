//! Live reload over a WebSocket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// WebSocket endpoint served by the reload bridge.
pub const SOCKET_PATH: &str = "/__plinth/reload";

/// Path of the client script injected into pages.
pub const SCRIPT_PATH: &str = "/__plinth/reload.js";

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Re-fetch a stylesheet without reloading
    Css {
        /// URL path of the rebuilt stylesheet
        path: String,
    },

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected browsers.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to every connected browser.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected browsers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes for the reload socket and its client script.
pub fn routes<S>(hub: ReloadHub) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(SOCKET_PATH, get(socket_handler))
        .route(SCRIPT_PATH, get(script_handler))
        .with_state(hub)
}

async fn socket_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward(socket, hub))
}

async fn forward(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Reload client lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        client_script(),
    )
}

/// The browser side of live reload.
pub fn client_script() -> String {
    format!(
        r#"(function() {{
  'use strict';

  var scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(scheme + location.host + '{socket}');

  function refreshStylesheet(path) {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var found = false;
    links.forEach(function(link) {{
      var url = new URL(link.href, location.href);
      if (url.pathname === path) {{
        url.searchParams.set('plinth', Date.now());
        link.href = url.toString();
        found = true;
      }}
    }});
    if (!found) {{
      location.reload();
    }}
  }}

  ws.onmessage = function(event) {{
    var msg = JSON.parse(event.data);
    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;
      case 'css':
        refreshStylesheet(msg.path);
        break;
      case 'connected':
        console.log('[plinth] Live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[plinth] Live reload disconnected');
    setTimeout(function() {{ location.reload(); }}, 1000);
  }};
}})();
"#,
        socket = SOCKET_PATH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        assert_eq!(first.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(second.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn send_without_browsers_is_harmless() {
        let hub = ReloadHub::new();
        hub.send(ReloadMessage::Connected);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::Css {
            path: "/assets/main.css".to_string(),
        })
        .unwrap();

        assert_eq!(json, r#"{"type":"css","path":"/assets/main.css"}"#);
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
    }

    #[test]
    fn client_script_connects_to_socket_path() {
        let script = client_script();

        assert!(script.contains("location.host + '/__plinth/reload'"));
        assert!(script.contains("case 'css':"));
    }
}
