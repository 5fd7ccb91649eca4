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

//! Error types for the driver.
//!
//! None of these are fatal to the process: each one aborts the step that
//! produced it and nothing else.

use thiserror::Error;

use crate::bluetooth::{status_description, Opcode};

/// Failure of the underlying byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid peripheral address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// A reply carried a non-success status byte.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{opcode:?} failed with status 0x{status:02X} ({reason})")]
pub struct ProtocolError {
    pub opcode: Opcode,
    pub status: u8,
    pub reason: &'static str,
}

impl ProtocolError {
    pub fn new(opcode: Opcode, status: u8) -> Self {
        Self {
            opcode,
            status,
            reason: status_description(status),
        }
    }
}

/// A command could not be built from the given arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("File name must be ASCII and at most {max} bytes: {name:?}")]
    InvalidFileName { name: String, max: usize },

    #[error("Mailbox text must be ASCII and at most {max} bytes: {text:?}")]
    InvalidMailboxText { text: String, max: usize },

    #[error("Write chunk of {len} bytes exceeds {max}")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("Image of {0} bytes does not fit a 32-bit size field")]
    ImageTooLarge(usize),

    #[error("Frame of {len} bytes exceeds the {max} byte length field")]
    FrameTooLarge { len: usize, max: usize },
}

/// Top-level driver error.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Firmware image error: {0}")]
    Firmware(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;
