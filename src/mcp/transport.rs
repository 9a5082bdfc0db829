//! MCP transport layer implementations.
//!
//! A transport turns a byte channel (or an in-process channel) into a stream
//! of [`TransportEvent`]s and accepts outgoing [`Message`]s through an
//! [`Outbound`] handle. Outgoing messages are funnelled into a single writer
//! task, so frames from concurrent handlers never interleave.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::mcp::codec::{Frame, FrameError, McpCodec};
use crate::mcp::protocol::{JsonRpcNotification, Message};

/// Capacity of the inbound and outbound queues.
const CHANNEL_CAPACITY: usize = 100;

/// Something that happened on the inbound side of a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete, well-formed message arrived.
    Message(Message),
    /// A frame arrived but could not be decoded; the channel is still usable.
    Malformed(FrameError),
    /// The channel failed and cannot deliver more frames.
    Error(String),
    /// The peer closed the channel.
    Closed,
}

/// Handle for enqueueing outgoing messages.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Message>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Enqueue one message for the writer.
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.tx
            .send(message.into())
            .await
            .map_err(|_| Error::Transport("Outbound channel closed".to_string()))
    }

    /// Enqueue a notification.
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        self.send(JsonRpcNotification::new(method, params)).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send {
    /// Start delivering inbound events. Returns the event stream and the
    /// handle for outgoing messages.
    async fn start(&mut self) -> Result<(mpsc::Receiver<TransportEvent>, Outbound)>;

    /// Stop the transport, flushing whatever was already queued.
    async fn close(&mut self) -> Result<()>;
}

/// Newline-delimited JSON over any async byte stream pair.
pub struct StreamTransport<R, W> {
    io: Option<(R, W)>,
    max_frame_length: usize,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// Stdio transport for MCP.
pub type StdioTransport = StreamTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    /// Create a transport over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::stdio()
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Create a transport over the given reader and writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Some((reader, writer)),
            max_frame_length: crate::mcp::codec::DEFAULT_MAX_FRAME_LENGTH,
            reader: None,
            writer: None,
        }
    }

    /// Limit the size of a single inbound frame.
    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn start(&mut self) -> Result<(mpsc::Receiver<TransportEvent>, Outbound)> {
        let (reader, writer) = self
            .io
            .take()
            .ok_or_else(|| Error::Transport("Transport already started".to_string()))?;

        // Channel for incoming events (from the reader)
        let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);
        // Channel for outgoing messages (to the writer)
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

        let codec = McpCodec::with_max_length(self.max_frame_length);
        self.reader = Some(tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, codec);
            loop {
                let event = match frames.next().await {
                    Some(Ok(Frame::Message(msg))) => {
                        trace!("Received: {:?}", msg.method());
                        TransportEvent::Message(msg)
                    }
                    Some(Ok(Frame::Malformed(err))) => TransportEvent::Malformed(err),
                    Some(Err(e)) => {
                        error!("Error reading transport: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        debug!("EOF on input, stopping transport");
                        let _ = incoming_tx.send(TransportEvent::Closed).await;
                        break;
                    }
                };
                if incoming_tx.send(event).await.is_err() {
                    break;
                }
            }
        }));

        self.writer = Some(tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, McpCodec::new());
            while let Some(msg) = outgoing_rx.recv().await {
                // `send` flushes, so each frame reaches the peer whole.
                if let Err(e) = sink.send(msg).await {
                    error!("Error writing message: {}", e);
                    if matches!(e, Error::Io(_)) {
                        break;
                    }
                }
            }
        }));

        Ok((incoming_rx, Outbound::new(outgoing_tx)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // The writer exits once every Outbound handle is dropped.
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                if !e.is_cancelled() {
                    return Err(Error::Transport(e.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Transport over in-process channels.
///
/// The owner keeps the other ends: it pushes [`TransportEvent`]s in and
/// receives the server's outgoing messages. Used by the HTTP transport for
/// each session.
pub struct ChannelTransport {
    inbound: Option<mpsc::Receiver<TransportEvent>>,
    outbound: Option<mpsc::Sender<Message>>,
}

impl ChannelTransport {
    /// Create a transport plus the peer-side handles.
    pub fn pair() -> (Self, mpsc::Sender<TransportEvent>, mpsc::Receiver<Message>) {
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                inbound: Some(in_rx),
                outbound: Some(out_tx),
            },
            in_tx,
            out_rx,
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn start(&mut self) -> Result<(mpsc::Receiver<TransportEvent>, Outbound)> {
        match (self.inbound.take(), self.outbound.take()) {
            (Some(inbound), Some(outbound)) => Ok((inbound, Outbound::new(outbound))),
            _ => Err(Error::Transport("Transport already started".to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
