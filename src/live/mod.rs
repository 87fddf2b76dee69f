//! # Live Voice Transport
//!
//! The bidirectional stream to the remote conversational model.
//!
//! ## Flow:
//! 1. `LiveTransport::connect` opens the socket and sends the setup message
//! 2. The transport posts `TransportEvent::Open` once the stream can take input
//! 3. Server messages arrive as `TransportEvent::Message`, in order
//! 4. The stream ends with exactly one `Error` or `Close` event (or with `LiveStream::close`)
//!
//! Events go into a channel owned by one session; when that session is torn down the receiver
//! is dropped and late events simply vanish.

pub mod gemini;
pub mod protocol;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::codec::MediaBlob;

pub use protocol::{LiveSetup, Modality, ServerMessage};

/// Lifecycle and data notifications from an open stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The handshake finished; input can be sent.
    Open,
    Message(ServerMessage),
    /// Socket-level failure. The stream is unusable afterwards.
    Error(String),
    /// The remote side closed, with its reason if it gave one.
    Close(Option<String>),
}

/// Opens streams to the remote model.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Resolves once the stream is established (the handshake); events start flowing after.
    async fn connect(
        &self,
        setup: LiveSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn LiveStream>>;
}

/// An established stream.
#[async_trait]
pub trait LiveStream: Send {
    /// Queue one realtime media chunk. Does not wait for the network.
    fn send_realtime_input(&mut self, blob: MediaBlob) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
