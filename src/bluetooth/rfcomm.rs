// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth RFCOMM transport to a paired brick.

use async_trait::async_trait;
use bluer::rfcomm::stream::{OwnedReadHalf, OwnedWriteHalf};
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::Address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::nxt_constants::SPP_UUID;
use super::transport::{Transport, TransportEvent};
use crate::error::TransportError;

/// Size of one socket read.
const READ_BUFFER_SIZE: usize = 256;

/// RFCOMM client connection.
pub struct RfcommTransport {
    channel: u8,
    event_tx: mpsc::Sender<TransportEvent>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: Arc<AtomicBool>,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RfcommTransport {
    /// Create a transport that will connect on `channel` and push received
    /// bytes to `event_tx`.
    pub fn new(channel: u8, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            channel,
            event_tx,
            writer: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            reader_task: parking_lot::Mutex::new(None),
        }
    }

    /// Make sure the default adapter is powered before dialing out.
    async fn power_adapter() -> bluer::Result<()> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }
        Ok(())
    }

    /// Read loop forwarding raw bytes until the stream ends.
    async fn read_loop(
        mut reader: OwnedReadHalf,
        connected: Arc<AtomicBool>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    info!("Connection closed by brick");
                    break;
                }
                Ok(n) => {
                    debug!("Received {} bytes: {}", n, hex::encode(&buf[..n]));
                    if event_tx.send(TransportEvent::Data(buf[..n].to_vec())).await.is_err() {
                        warn!("Transport event receiver dropped");
                        break;
                    }
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Closed).await;
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    async fn connect(&self, peripheral: &str) -> Result<(), TransportError> {
        let address: Address = peripheral
            .parse()
            .map_err(|_| TransportError::InvalidAddress(peripheral.to_string()))?;

        Self::power_adapter()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!(
            "Connecting to {} on RFCOMM channel {} (SPP {})",
            address, self.channel, SPP_UUID
        );
        let stream = Stream::connect(SocketAddr::new(address, self.channel))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        let task = tokio::spawn(Self::read_loop(
            reader,
            self.connected.clone(),
            self.event_tx.clone(),
        ));
        if let Some(old) = self.reader_task.lock().replace(task) {
            old.abort();
        }

        info!("Connected to {}", address);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        debug!("Sending: {}", hex::encode(frame));
        writer
            .write_all(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                warn!("Error closing RFCOMM stream: {}", e);
            }
        }

        info!("Disconnected");
    }
}
