//! TCP accept loop and WebSocket upgrade.

use std::net::SocketAddr;
use std::sync::Arc;

use cmdrun_common::ConnectionId;
use cmdrun_runner::SessionRunner;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::connection::{handle_connection, ProtocolConfig};
use crate::route::{parse_route, CommandRoute};

/// Everything a connection needs, cloned into each connection task.
#[derive(Clone)]
pub struct ServerState {
    pub runner: SessionRunner,
    pub protocol: ProtocolConfig,
    pub path_prefix: Arc<str>,
}

impl ServerState {
    pub fn new(runner: SessionRunner, protocol: ProtocolConfig, path_prefix: &str) -> Self {
        Self {
            runner,
            protocol,
            path_prefix: Arc::from(path_prefix),
        }
    }
}

/// Accept connections forever, one task each.
pub async fn serve(listener: TcpListener, state: ServerState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(accept_connection(stream, addr, state));
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

async fn accept_connection(stream: TcpStream, addr: SocketAddr, state: ServerState) {
    let conn = ConnectionId::new();
    let mut route: Option<CommandRoute> = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match parse_route(&state.path_prefix, request.uri().path()) {
            Some(found) => {
                route = Some(found);
                Ok(response)
            }
            None => {
                let mut refusal = ErrorResponse::new(Some("not found".to_string()));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = %addr, conn = %conn, error = %e, "WS handshake failed");
            return;
        }
    };
    let Some(route) = route else {
        return;
    };

    tracing::info!(peer = %addr, conn = %conn, route = ?route, "client connected");
    handle_connection(ws, route, state.runner, state.protocol, conn.clone()).await;
    tracing::info!(peer = %addr, conn = %conn, "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cmdrun_common::{CommandDefinition, CommandId};
    use cmdrun_pty::scripted::ScriptedSpawner;
    use cmdrun_runner::RunnerConfig;
    use cmdrun_store::MemoryStore;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    const PREFIX: &str = "/api/v1/ws/commands";

    async fn start_server() -> SocketAddr {
        let dir = std::env::temp_dir();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_command(CommandDefinition::new(CommandId(1), "greet", "echo hi").with_dir(&dir))
            .await;
        let config = RunnerConfig {
            default_dir: dir,
            env: Vec::new(),
            input_queue_capacity: 8,
            output_queue_capacity: 64,
        };
        let runner = SessionRunner::new(
            config,
            store.clone(),
            store,
            Arc::new(ScriptedSpawner::new("hi\r\n")),
        );
        let protocol = ProtocolConfig {
            flush_interval: Duration::from_millis(20),
            handshake_timeout: Duration::from_secs(5),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, ServerState::new(runner, protocol, PREFIX)));
        addr
    }

    #[tokio::test]
    async fn serves_a_command_over_tcp() {
        let addr = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}{PREFIX}/1")).await.unwrap();
        ws.send(Message::Text(
            r#"{"message-type":"options","options":{"rows":24,"cols":80}}"#
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

        let mut output = String::new();
        let mut close_code = None;
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let message: crate::OutboundMessage = serde_json::from_str(&text).unwrap();
                    output.push_str(&message.data);
                }
                Message::Close(frame) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(output, "hi\r\n");
        assert_eq!(close_code, Some(1000));
    }

    #[tokio::test]
    async fn foreign_path_is_refused_with_404() {
        let addr = start_server().await;
        let err = connect_async(format!("ws://{addr}/elsewhere/1"))
            .await
            .unwrap_err();
        match err {
            WsError::Http(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            other => panic!("unexpected error: {other}"),
        }
    }
}
