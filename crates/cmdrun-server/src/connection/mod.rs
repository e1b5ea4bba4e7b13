//! Per-connection handler: handshake, session start, then three tasks.
//!
//! - collector: session output queue → [`OutputBuffer`]
//! - flusher: every `flush_interval`, buffer → one `data` frame; once output
//!   has ended and the buffer is empty, close with 1000
//! - input loop (this task): client frames → session input queue
//!
//! All three share one cancellation token. The session runs under a child of
//! it, so any exit path here also stops the process.

mod output;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use cmdrun_common::{CommandId, ConnectionId, TerminalOptions};
use cmdrun_config::ServerConfig;
use cmdrun_runner::{RunnerError, SessionRunner};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::protocol::{CloseKind, Inbound, InboundMessage, OutboundMessage, ProtocolError};
use crate::route::CommandRoute;

pub(crate) use output::{FrameWriter, OutputBuffer};

/// How long to wait for the client's reply to our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Timing knobs for the handler.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Period of the output flush timer.
    pub flush_interval: Duration,
    /// How long the client has to send its `options` message.
    pub handshake_timeout: Duration,
}

impl ProtocolConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            flush_interval: config.flush_interval(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::from_server_config(&ServerConfig::default())
    }
}

/// Drive one client connection to completion.
pub async fn handle_connection<S>(
    ws: WebSocketStream<S>,
    route: CommandRoute,
    runner: SessionRunner,
    config: ProtocolConfig,
    conn: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let writer = Arc::new(FrameWriter::new(sink));

    let id = match route {
        CommandRoute::Command(id) => id,
        CommandRoute::BadId(raw) => {
            tracing::warn!(conn = %conn, id = %raw, "bad command id");
            reject(&writer, &ProtocolError::BadCommandId).await;
            finish(&mut stream).await;
            return;
        }
    };

    let options = match read_options(&mut stream, config.handshake_timeout).await {
        Ok(options) => options,
        Err(e) => {
            tracing::warn!(conn = %conn, command_id = %id, error = %e, "handshake failed");
            reject(&writer, &e).await;
            finish(&mut stream).await;
            return;
        }
    };

    let cancel = CancellationToken::new();
    let session = match runner.run(&cancel, id, &options).await {
        Ok(session) => session,
        Err(e) => {
            let (kind, reason) = start_failure(&e);
            tracing::warn!(conn = %conn, command_id = %id, error = %e, "command failed to start");
            writer.close(kind, reason).await;
            finish(&mut stream).await;
            return;
        }
    };
    tracing::info!(conn = %conn, command_id = %id, "command running");

    let (input, output, _session_cancel) = session.into_parts();
    let buffer = Arc::new(OutputBuffer::default());

    tokio::spawn(collect_output(output, buffer.clone()));
    let flusher = tokio::spawn(flush_output(
        writer.clone(),
        buffer,
        config.flush_interval,
        cancel.clone(),
        conn.clone(),
    ));

    pump_input(&mut stream, &writer, input, &cancel, &conn, id).await;

    cancel.cancel();
    if let Err(e) = flusher.await {
        tracing::warn!(conn = %conn, error = %e, "flush task failed");
    }
    writer.close(CloseKind::Finished, "session ended").await;
    finish(&mut stream).await;
    let code = writer.closed_with().await.map(CloseKind::code);
    tracing::info!(conn = %conn, command_id = %id, close_code = ?code, "session closed");
}

/// Wait for the first message, which must be `options`.
async fn read_options<S>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    timeout: Duration,
) -> Result<TerminalOptions, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = tokio::time::timeout(timeout, stream.next())
        .await
        .map_err(|_| ProtocolError::HandshakeTimeout)?;

    match frame {
        Some(Ok(Message::Text(text))) => match InboundMessage::parse(&text)?.classify() {
            Inbound::Options(options) => Ok(options),
            _ => Err(ProtocolError::NotOptions),
        },
        Some(Ok(Message::Close(_))) | None => Err(ProtocolError::ClosedEarly),
        Some(Ok(_)) => Err(ProtocolError::WrongFrameKind),
        Some(Err(e)) => Err(ProtocolError::Transport(e.to_string())),
    }
}

fn start_failure(err: &RunnerError) -> (CloseKind, &'static str) {
    match err {
        RunnerError::EmptyCommand(_) => (CloseKind::EmptyCommand, "empty command"),
        RunnerError::NotFound(_) => (CloseKind::Internal, "command not found"),
        _ => (
            CloseKind::Internal,
            "unexpected error while starting command",
        ),
    }
}

async fn reject<S>(writer: &FrameWriter<S>, err: &ProtocolError)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    writer.close(err.close_kind(), err.reason()).await;
}

/// Read until the peer finishes the closing handshake or the grace period
/// runs out.
async fn finish<S>(stream: &mut SplitStream<WebSocketStream<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = stream.next().await {}
    })
    .await;
}

/// Session output queue → batch buffer.
async fn collect_output(mut output: mpsc::Receiver<char>, buffer: Arc<OutputBuffer>) {
    let mut batch = String::new();
    while let Some(ch) = output.recv().await {
        batch.push(ch);
        while let Ok(ch) = output.try_recv() {
            batch.push(ch);
        }
        buffer.append(&batch);
        batch.clear();
    }
    buffer.finish();
}

/// Batch buffer → `data` frames on a fixed timer.
async fn flush_output<S>(
    writer: Arc<FrameWriter<S>>,
    buffer: Arc<OutputBuffer>,
    period: Duration,
    cancel: CancellationToken,
    conn: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let (batch, ended) = buffer.take();
        if !batch.is_empty() {
            let json = match OutboundMessage::data(batch).to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::debug!(conn = %conn, error = %e, "dropping unencodable batch");
                    continue;
                }
            };
            if let Err(e) = writer.send_text(json).await {
                tracing::warn!(conn = %conn, error = %e, "data frame not delivered");
                writer.close(CloseKind::Internal, "error writing message").await;
                cancel.cancel();
                return;
            }
        } else if ended {
            writer.close(CloseKind::Finished, "command run finished").await;
            cancel.cancel();
            return;
        }
    }
}

/// Client frames → session input queue, until the client leaves, breaks
/// the protocol, or the session is cancelled.
async fn pump_input<S>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    writer: &FrameWriter<S>,
    input: mpsc::Sender<String>,
    cancel: &CancellationToken,
    conn: &ConnectionId,
    id: CommandId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(Message::Text(text))) => InboundMessage::parse(&text),
            Some(Ok(Message::Binary(_))) => Err(ProtocolError::WrongFrameKind),
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(conn = %conn, command_id = %id, "client closed");
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => Err(ProtocolError::Transport(e.to_string())),
        };

        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(conn = %conn, command_id = %id, error = %e, "closing on bad frame");
                reject(writer, &e).await;
                return;
            }
        };

        if let Inbound::TerminalInput(data) = message.classify() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                sent = input.send(data) => {
                    if sent.is_err() {
                        // The process is gone; output delivery is still
                        // finishing, so keep the connection.
                        tracing::trace!(conn = %conn, "input after session end dropped");
                    }
                }
            }
        }
    }
}
