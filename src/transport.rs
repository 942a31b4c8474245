//! Thin, type-isolated wrapper around the WebSocket transport.
//!
//! Mirrors the shape of a typical WS client wrapper: a single concrete
//! adapter hides the upgrade library's stream type from the session pumps,
//! and gives tests a seam to drive the pumps without a real socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

/// An event read off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// A UTF-8 text frame.
    Text(String),
    /// A pong, carrying the liveness-refresh signal; payload is ignored.
    Pong,
    /// A peer-initiated close.
    Close,
}

/// Read half of a session's transport.
#[async_trait]
pub trait WsReader: Send {
    /// Read the next event, or `None`/`Err` on any transport failure
    /// (timeout is applied by the caller, not this trait).
    async fn recv(&mut self) -> Option<anyhow::Result<WsEvent>>;
}

/// Write half of a session's transport.
#[async_trait]
pub trait WsWriter: Send {
    /// Send a UTF-8 text frame.
    async fn send_text(&mut self, data: String) -> anyhow::Result<()>;
    /// Send a ping control frame.
    async fn send_ping(&mut self) -> anyhow::Result<()>;
    /// Send a close frame and flush.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Adapts axum's split WebSocket stream to [`WsReader`].
pub struct AxumWsReader(pub SplitStream<WebSocket>);

#[async_trait]
impl WsReader for AxumWsReader {
    async fn recv(&mut self) -> Option<anyhow::Result<WsEvent>> {
        loop {
            return match self.0.next().await {
                None => None,
                Some(Err(e)) => Some(Err(e.into())),
                Some(Ok(Message::Text(text))) => Some(Ok(WsEvent::Text(text.to_string()))),
                Some(Ok(Message::Binary(_))) => {
                    // Not a location frame; keep reading rather than tearing
                    // the session down over a frame type we simply ignore.
                    continue;
                }
                Some(Ok(Message::Pong(_))) => Some(Ok(WsEvent::Pong)),
                Some(Ok(Message::Ping(_))) => continue,
                Some(Ok(Message::Close(_))) => Some(Ok(WsEvent::Close)),
            };
        }
    }
}

/// Adapts axum's split WebSocket sink to [`WsWriter`].
pub struct AxumWsWriter(pub SplitSink<WebSocket, Message>);

#[async_trait]
impl WsWriter for AxumWsWriter {
    async fn send_text(&mut self, data: String) -> anyhow::Result<()> {
        self.0.send(Message::Text(data.into())).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> anyhow::Result<()> {
        self.0.send(Message::Ping(Vec::new().into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        let _ = self.0.send(Message::Close(None)).await;
        self.0.close().await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory transport used by pump-level tests.

    use super::{WsEvent, WsReader, WsWriter};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Mock reader that yields a pre-programmed sequence of events, then
    /// ends the stream (returns `None`) once exhausted.
    pub struct MockReader {
        pub rx: mpsc::UnboundedReceiver<anyhow::Result<WsEvent>>,
    }

    #[async_trait]
    impl WsReader for MockReader {
        async fn recv(&mut self) -> Option<anyhow::Result<WsEvent>> {
            self.rx.recv().await
        }
    }

    /// Mock writer that records every frame sent, for assertions.
    pub struct MockWriter {
        pub tx: mpsc::UnboundedSender<String>,
        pub fail_after: Option<usize>,
        pub sent: usize,
    }

    #[async_trait]
    impl WsWriter for MockWriter {
        async fn send_text(&mut self, data: String) -> anyhow::Result<()> {
            if self.fail_after == Some(self.sent) {
                anyhow::bail!("simulated write failure");
            }
            self.sent += 1;
            let _ = self.tx.send(data);
            Ok(())
        }

        async fn send_ping(&mut self) -> anyhow::Result<()> {
            if self.fail_after == Some(self.sent) {
                anyhow::bail!("simulated write failure");
            }
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
