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

//! Byte-stream transport abstraction.

use async_trait::async_trait;

use crate::error::TransportError;

/// Notifications pushed by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw bytes, not aligned to frame boundaries.
    Data(Vec<u8>),
    /// The stream closed, locally or by the peer.
    Closed,
}

/// A byte stream to one brick.
///
/// Implementations push received bytes and closure through the
/// `TransportEvent` channel they were constructed with.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream to the given peripheral.
    async fn connect(&self, peripheral: &str) -> Result<(), TransportError>;

    /// Send one complete frame.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Whether the stream is currently open.
    fn is_connected(&self) -> bool;

    /// Close the stream. Closing an already closed stream is a no-op.
    async fn disconnect(&self);
}
