//! Best-effort `newHeads` listener for the EVM source.
//!
//! Observational only: announced heads are logged, nothing is stored and the
//! scheduler never waits on this. Any failure ends the listener; there is no
//! reconnect.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::evm::parse_hex_u64;
use crate::request::JsonRpcRequest;

/// One announced head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadAnnouncement {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
}

#[derive(Deserialize)]
struct Notification {
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Deserialize)]
struct NotificationParams {
    #[serde(default)]
    result: Option<Head>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Head {
    #[serde(default)]
    number: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    parent_hash: String,
}

/// Extract a head from a notification frame, keyed on `params.result` alone.
///
/// Returns `Ok(None)` for frames without one (such as the subscription
/// confirmation).
pub fn parse_head_notification(text: &str) -> Result<Option<HeadAnnouncement>, serde_json::Error> {
    let msg: Notification = serde_json::from_str(text)?;
    Ok(msg.params.and_then(|p| p.result).map(|head| HeadAnnouncement {
        number: parse_hex_u64(&head.number).unwrap_or(0),
        hash: head.hash,
        parent_hash: head.parent_hash,
    }))
}

/// Websocket subscriber that logs every new EVM head.
pub struct HeadsListener {
    url: Option<String>,
}

impl HeadsListener {
    /// An empty URL disables the listener.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: (!url.is_empty()).then_some(url),
        }
    }

    /// Run until cancellation, socket close or the first error.
    /// Returns the number of heads logged.
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let Some(url) = self.url.as_deref() else {
            debug!("no websocket url configured; heads listener disabled");
            return 0;
        };

        let conn = tokio::select! {
            _ = cancel.cancelled() => return 0,
            conn = tokio_tungstenite::connect_async(url) => conn,
        };
        let ws = match conn {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(url, error = %e, "evm ws dial failed");
                return 0;
            }
        };
        let (mut sink, mut stream) = ws.split();

        let subscribe = JsonRpcRequest::new("eth_subscribe", vec![json!("newHeads")]);
        let frame = match serde_json::to_string(&subscribe) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "encode subscribe request failed");
                return 0;
            }
        };
        if let Err(e) = sink.send(Message::Text(frame)).await {
            warn!(url, error = %e, "evm ws subscribe failed");
            return 0;
        }

        let mut seen = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                msg = stream.next() => match msg {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(e)) => {
                        warn!(url, error = %e, "evm ws read failed");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => match parse_head_notification(&text) {
                        Ok(Some(head)) => {
                            seen += 1;
                            info!(
                                number = head.number,
                                hash = %head.hash,
                                parent = %head.parent_hash,
                                "evm head"
                            );
                        }
                        Ok(None) => {
                            if let Some(id) = subscription_id(&text) {
                                debug!(%id, "subscribed to newHeads");
                            }
                        }
                        Err(e) => warn!(error = %e, "evm ws decode failed"),
                    },
                    Some(Ok(_)) => {}
                },
            }
        }
        seen
    }
}

/// Subscription id carried by an `eth_subscribe` confirmation frame.
pub fn subscription_id(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()?
        .get("result")?
        .as_str()
        .map(str::to_owned)
}
