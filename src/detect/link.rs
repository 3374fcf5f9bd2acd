//! WebSocket channel to the inference service.
//!
//! One link per detection session. Sampled frames go out as binary JPEG
//! messages; results come back as JSON text. The reader and writer run as
//! separate tasks and only post tagged inputs back to the session, which
//! parses and applies them in arrival order.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SessionError;
use crate::session::{GuardToken, InputSender, SessionInput};

/// Give up on the handshake after this long and fall back.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of encoded frames allowed in flight.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 8;

/// Outcome of queueing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Outbound buffer full, frame dropped.
    Dropped,
}

pub struct InferenceLink {
    endpoint: String,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl InferenceLink {
    pub(crate) async fn open(
        endpoint: &str,
        capacity: usize,
        token: GuardToken,
        inputs: InputSender,
    ) -> Result<Self, SessionError> {
        log::info!("connecting to inference service at {}", endpoint);
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(endpoint))
            .await
            .map_err(|_| SessionError::Transport(format!("connect to {} timed out", endpoint)))?
            .map_err(|e| SessionError::Transport(format!("connect to {}: {}", endpoint, e)))?;
        log::info!("inference link open (generation {})", token.generation());

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(capacity.max(1));

        let writer_token = token.clone();
        let writer_inputs = inputs.clone();
        let writer = tokio::spawn(async move {
            while let Some(jpeg) = rx.recv().await {
                if let Err(e) = sink.send(Message::Binary(jpeg)).await {
                    post(
                        &writer_inputs,
                        &writer_token,
                        SessionInput::LinkLost(format!("send failed: {}", e)),
                    );
                    return;
                }
            }
            if let Err(e) = sink.send(Message::Close(None)).await {
                log::debug!("inference link close frame not sent: {}", e);
            }
        });

        let reader = tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if !post(&inputs, &token, SessionInput::Inbound(text)) {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break format!("closed by service ({:?})", frame);
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong carry no results.
                    }
                    Some(Err(e)) => break format!("receive failed: {}", e),
                    None => break "stream ended".to_string(),
                }
            };
            post(&inputs, &token, SessionInput::LinkLost(reason));
        });

        Ok(Self {
            endpoint: endpoint.to_string(),
            outbound: Some(tx),
            writer,
            reader,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Queue one encoded frame without waiting.
    pub fn send_frame(&self, jpeg: Vec<u8>) -> Result<SendOutcome, SessionError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| SessionError::Transport("link closed".into()))?;
        match outbound.try_send(jpeg) {
            Ok(()) => Ok(SendOutcome::Queued),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(SendOutcome::Dropped),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SessionError::Transport("outbound channel closed".into()))
            }
        }
    }

    /// Outbound queue occupancy in percent.
    pub fn buffer_fullness(&self) -> f64 {
        match &self.outbound {
            Some(tx) => {
                let max = tx.max_capacity() as f64;
                (max - tx.capacity() as f64) / max * 100.0
            }
            None => 0.0,
        }
    }

    /// Close the channel. The reader stops immediately; the writer flushes a
    /// close frame and exits.
    pub fn close(mut self) {
        self.outbound.take();
        self.reader.abort();
        log::info!("inference link to {} closed", self.endpoint);
    }
}

impl Drop for InferenceLink {
    fn drop(&mut self) {
        self.reader.abort();
        if self.outbound.is_some() {
            self.writer.abort();
        }
    }
}

/// Post an input tagged with the token's generation. Returns false once the
/// token is stale or the session is gone.
fn post(inputs: &InputSender, token: &GuardToken, input: SessionInput) -> bool {
    if !token.is_valid() {
        return false;
    }
    inputs.send(token.tag(input)).is_ok()
}
