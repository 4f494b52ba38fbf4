//! In-process mock gateway for integration tests.
//!
//! Binds `127.0.0.1:0`, accepts one WebSocket client, records every
//! request and answers through a pluggable responder. Tests can also
//! push unsolicited frames or drop the socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing_subscriber::EnvFilter;

/// Maps one request to the frames sent back, in order.
pub type Responder = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

enum Push {
    Frame(Value),
    Drop,
}

pub struct MockGateway {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    subprotocol: Arc<Mutex<Option<String>>>,
    push: mpsc::UnboundedSender<Push>,
}

impl MockGateway {
    /// Starts a gateway that answers like Janus does.
    pub async fn start() -> anyhow::Result<Self> {
        Self::with_responder(janus_like()).await
    }

    /// Starts a gateway answering through `responder`.
    pub async fn with_responder(responder: Responder) -> anyhow::Result<Self> {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let subprotocol = Arc::new(Mutex::new(None));
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        tokio::spawn(serve(
            listener,
            responder,
            Arc::clone(&received),
            Arc::clone(&subprotocol),
            push_rx,
        ));

        Ok(Self {
            addr,
            received,
            subprotocol,
            push: push_tx,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Requests received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Requests received so far whose `janus` is `kind`.
    pub fn received_of(&self, kind: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter(|request| request["janus"] == kind)
            .cloned()
            .collect()
    }

    /// Subprotocol the client asked for.
    pub fn subprotocol(&self) -> Option<String> {
        self.subprotocol.lock().clone()
    }

    /// Sends an unsolicited frame to the client.
    pub fn push(&self, frame: Value) {
        let _ = self.push.send(Push::Frame(frame));
    }

    /// Drops the socket without a close handshake.
    pub fn drop_connection(&self) {
        let _ = self.push.send(Push::Drop);
    }
}

async fn serve(
    listener: TcpListener,
    responder: Responder,
    received: Arc<Mutex<Vec<Value>>>,
    subprotocol: Arc<Mutex<Option<String>>>,
    mut push_rx: mpsc::UnboundedReceiver<Push>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };

    let seen_protocol = Arc::clone(&subprotocol);
    let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        if let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            *seen_protocol.lock() = protocol.to_str().ok().map(str::to_string);
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(response)
    };

    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            message = read.next() => {
                let Some(Ok(Message::Text(text))) = message else {
                    break;
                };
                let Ok(request) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                received.lock().push(request.clone());
                for reply in responder(&request) {
                    if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }

            push = push_rx.recv() => {
                match push {
                    Some(Push::Frame(frame)) => {
                        if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                    Some(Push::Drop) | None => return,
                }
            }
        }
    }
}

/// Answers `create`/`attach` with sequential ids, `keepalive` with an
/// ack, `info` with server info, and `message` with an ack then an event.
pub fn janus_like() -> Responder {
    let sessions = Arc::new(AtomicU64::new(0));
    let handles = Arc::new(AtomicU64::new(0));

    Arc::new(move |request| {
        let transaction = request["transaction"].clone();
        match request["janus"].as_str() {
            Some("info") => vec![json!({
                "janus": "server_info",
                "transaction": transaction,
                "name": "Janus WebRTC Server",
                "version": 1403,
            })],
            Some("create") => {
                let n = sessions.fetch_add(1, Ordering::SeqCst) + 1;
                vec![json!({
                    "janus": "success",
                    "transaction": transaction,
                    "data": {"id": format!("sess{n}")},
                })]
            }
            Some("attach") => {
                let n = handles.fetch_add(1, Ordering::SeqCst) + 1;
                vec![json!({
                    "janus": "success",
                    "session_id": request["session_id"],
                    "transaction": transaction,
                    "data": {"id": format!("handle{n}")},
                })]
            }
            Some("keepalive") => vec![json!({
                "janus": "ack",
                "session_id": request["session_id"],
                "transaction": transaction,
            })],
            Some("message") => vec![
                json!({
                    "janus": "ack",
                    "session_id": request["session_id"],
                    "transaction": transaction,
                }),
                json!({
                    "janus": "event",
                    "session_id": request["session_id"],
                    "sender": request["handle_id"],
                    "transaction": transaction,
                    "plugindata": {"plugin": "janus.plugin.echotest", "data": {"result": "ok"}},
                }),
            ],
            _ => Vec::new(),
        }
    })
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
