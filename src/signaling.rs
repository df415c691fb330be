use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, ServerMessage};

const CHANNEL_CAPACITY: usize = 100;

/// Client end of the signaling channel. Reading and writing each run on
/// their own task; dropping the sender half closes the socket.
pub struct SignalingClient {
    tx: mpsc::Sender<ClientMessage>,
    rx: mpsc::Receiver<ServerMessage>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;
        tracing::info!("signaling connected to {}", url);
        let (mut write, mut read) = ws_stream.split();

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);

        // Handle outgoing messages
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::error!("failed to encode {:?}: {}", msg, err);
                        continue;
                    }
                };
                if let Err(err) = write.send(Message::Text(json)).await {
                    tracing::warn!("signaling write failed: {}", err);
                    return;
                }
            }
            let _ = write.close().await;
            tracing::debug!("signaling writer finished");
        });

        // Handle incoming messages
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::warn!("signaling read failed: {}", err);
                        break;
                    }
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(signal) => {
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!("dropping unreadable server message: {}", err),
                }
            }
            tracing::debug!("signaling reader finished");
        });

        Ok(Self {
            tx: outgoing_tx,
            rx,
        })
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::ChannelClosed)
    }

    /// `None` once the server side is gone.
    pub async fn receive(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }

    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.tx.clone()
    }

    pub fn into_parts(self) -> (mpsc::Sender<ClientMessage>, mpsc::Receiver<ServerMessage>) {
        (self.tx, self.rx)
    }
}
