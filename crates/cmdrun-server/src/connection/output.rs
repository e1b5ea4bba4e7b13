//! Shared state between the connection's tasks: the output batch buffer and
//! the serialized frame writer.

use std::sync::Mutex;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::protocol::CloseKind;

#[derive(Default)]
struct BufferState {
    data: String,
    eof: bool,
}

/// Output accumulated between flushes.
#[derive(Default)]
pub(crate) struct OutputBuffer {
    state: Mutex<BufferState>,
}

impl OutputBuffer {
    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn append(&self, text: &str) {
        self.lock().data.push_str(text);
    }

    /// The output queue has closed; nothing more will be appended.
    pub(crate) fn finish(&self) {
        self.lock().eof = true;
    }

    /// Take the pending batch, reporting whether output has ended.
    pub(crate) fn take(&self) -> (String, bool) {
        let mut state = self.lock();
        (std::mem::take(&mut state.data), state.eof)
    }
}

struct WriterState<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    closed_with: Option<CloseKind>,
}

/// All transport writes go through here, one at a time. The close frame
/// is sent at most once; nothing is written after it.
pub(crate) struct FrameWriter<S> {
    state: tokio::sync::Mutex<WriterState<S>>,
}

impl<S> FrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(WriterState {
                sink,
                closed_with: None,
            }),
        }
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), WsError> {
        let mut state = self.state.lock().await;
        if state.closed_with.is_some() {
            return Err(WsError::AlreadyClosed);
        }
        state.sink.send(Message::Text(text.into())).await
    }

    /// Send the close frame. Returns `false` if the connection was already
    /// closed by an earlier call.
    pub(crate) async fn close(&self, kind: CloseKind, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.closed_with.is_some() {
            return false;
        }
        state.closed_with = Some(kind);

        let frame = CloseFrame {
            code: CloseCode::from(kind.code()),
            reason: reason.to_string().into(),
        };
        if let Err(e) = state.sink.send(Message::Close(Some(frame))).await {
            tracing::debug!(code = kind.code(), error = %e, "close frame not delivered");
        }
        true
    }

    /// The kind of the close frame sent, if any.
    pub(crate) async fn closed_with(&self) -> Option<CloseKind> {
        self.state.lock().await.closed_with
    }
}
