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

//! Length-prefixed frame encoding and stream reassembly.
//!
//! ```text
//! +--------+--------+---------+---------+------+--------+---------+
//! | len_lo | len_hi | cnt_lo  | cnt_hi  | type | opcode | args... |
//! +--------+--------+---------+---------+------+--------+---------+
//! ```
//!
//! `len` counts every byte after the two length bytes.

use tracing::{debug, warn};

use super::nxt_constants::limits;
use crate::error::CommandError;

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 2;

/// Encode one outgoing frame. Fails when the body does not fit the 16-bit
/// length field.
pub fn encode_frame(telegram_type: u8, opcode: u8, args: &[u8]) -> Result<Vec<u8>, CommandError> {
    let body = args.len() + 4;
    let len = u16::try_from(body).map_err(|_| CommandError::FrameTooLarge {
        len: body,
        max: u16::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + len as usize);
    frame.extend_from_slice(&len.to_le_bytes());
    // Message counter, unused by the brick.
    frame.push(0);
    frame.push(0);
    frame.push(telegram_type);
    frame.push(opcode);
    frame.extend_from_slice(args);
    Ok(frame)
}

/// Reassembles frames from a byte stream with arbitrary chunk boundaries.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default frame length bound.
    pub fn new() -> Self {
        Self::with_max_frame_len(limits::DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a decoder that rejects declared lengths above `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_frame_len + LENGTH_PREFIX),
            max_frame_len,
        }
    }

    /// Append received bytes and return every frame completed by them.
    ///
    /// Returned frames exclude the length prefix. Bytes of an incomplete
    /// frame stay buffered until the next call.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while self.buffer.len() >= LENGTH_PREFIX {
            let declared = u16::from_le_bytes([self.buffer[0], self.buffer[1]]) as usize;

            if declared == 0 || declared > self.max_frame_len {
                warn!(
                    "Implausible frame length {} (max {}), resyncing",
                    declared, self.max_frame_len
                );
                self.buffer.remove(0);
                continue;
            }

            if self.buffer.len() < declared + LENGTH_PREFIX {
                break;
            }

            let frame = self.buffer[LENGTH_PREFIX..LENGTH_PREFIX + declared].to_vec();
            self.buffer.drain(..LENGTH_PREFIX + declared);
            debug!("Frame decoded: {}", hex::encode(&frame));
            frames.push(frame);
        }

        frames
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
