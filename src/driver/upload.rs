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

//! Program upload state machine.
//!
//! Each step sends one command and waits for its acknowledgment before the
//! next one is produced:
//!
//! ```text
//! CLOSED --OPEN_WRITE--> OPEN --WRITE*--> OPEN --CLOSE--> CLOSED
//! ```

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bluetooth::nxt_constants::limits;
use crate::bluetooth::Command;
use crate::error::{CommandError, DriverError};

/// A program file to install on the brick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    name: String,
    bytes: Arc<[u8]>,
}

impl FirmwareImage {
    /// Wrap an in-memory image. The name must be a valid brick filename.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<Self, CommandError> {
        let name = name.into();
        let bytes = bytes.into();
        // Validates both name and size.
        Command::open_write(&name, bytes.len())?;
        Ok(Self { name, bytes })
    }

    /// Load an image from disk.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, DriverError> {
        let bytes = std::fs::read(path)?;
        info!("Loaded program image {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, bytes)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Whether a file handle is open on the brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Closed,
    Open { handle: u8 },
}

/// The command the session is waiting to see acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStep {
    Open,
    Write { len: usize },
    Close,
}

/// Sequential transfer of one image.
#[derive(Debug)]
pub struct UploadSession {
    image: FirmwareImage,
    offset: usize,
    state: UploadState,
    pending: Option<PendingStep>,
}

impl UploadSession {
    pub fn new(image: FirmwareImage) -> Self {
        Self {
            image,
            offset: 0,
            state: UploadState::Closed,
            pending: None,
        }
    }

    /// Start a transfer from offset zero and return the OPEN_WRITE command.
    pub fn begin(&mut self) -> Command {
        if self.pending.is_some() || self.state != UploadState::Closed {
            warn!("Restarting upload from the beginning");
        }
        self.offset = 0;
        self.state = UploadState::Closed;
        self.pending = Some(PendingStep::Open);
        info!(
            "Uploading {} ({} bytes)",
            self.image.name(),
            self.image.len()
        );
        Command::OpenWrite {
            filename: self.image.name().to_string(),
            size: self.image.len() as u32,
        }
    }

    /// OPEN_WRITE succeeded with `handle`. Returns the first WRITE or the
    /// CLOSE for an empty image.
    pub fn on_opened(&mut self, handle: u8) -> Option<Command> {
        if self.pending != Some(PendingStep::Open) {
            warn!("Unexpected OPEN_WRITE acknowledgment ({:?})", self.pending);
            return None;
        }
        debug!("File opened with handle {}", handle);
        self.state = UploadState::Open { handle };
        Some(self.next_step(handle))
    }

    /// WRITE succeeded. Returns the next WRITE, or CLOSE once everything is
    /// on the brick.
    pub fn on_written(&mut self) -> Option<Command> {
        let (Some(PendingStep::Write { len }), UploadState::Open { handle }) =
            (self.pending, self.state)
        else {
            warn!("Unexpected WRITE acknowledgment ({:?})", self.pending);
            return None;
        };
        self.offset += len;
        Some(self.next_step(handle))
    }

    /// CLOSE succeeded. Returns true when a complete transfer just finished.
    pub fn on_closed(&mut self) -> bool {
        if self.pending != Some(PendingStep::Close) {
            warn!("Unexpected CLOSE acknowledgment ({:?})", self.pending);
            return false;
        }
        info!("Upload of {} complete", self.image.name());
        self.reset();
        true
    }

    /// Give up on the step in flight. The session stays where it was and
    /// sends nothing further until `begin` is called again.
    pub fn abandon(&mut self) {
        if let Some(step) = self.pending.take() {
            warn!("Upload step {:?} abandoned at offset {}", step, self.offset);
        }
    }

    /// Back to CLOSED with the full image queued.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.state = UploadState::Closed;
        self.pending = None;
    }

    fn next_step(&mut self, handle: u8) -> Command {
        let remaining = self.remaining();
        if remaining.is_empty() {
            self.pending = Some(PendingStep::Close);
            return Command::Close { handle };
        }

        let len = remaining.len().min(limits::MAX_WRITE_CHUNK);
        let chunk = remaining[..len].to_vec();
        self.pending = Some(PendingStep::Write { len });
        Command::Write { handle, chunk }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn pending(&self) -> Option<PendingStep> {
        self.pending
    }

    /// Whether a step is waiting for its acknowledgment.
    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    /// Bytes not yet acknowledged by the brick.
    pub fn remaining(&self) -> &[u8] {
        &self.image.bytes()[self.offset..]
    }

    /// Acknowledged bytes and total image size.
    pub fn progress(&self) -> (usize, usize) {
        (self.offset, self.image.len())
    }

    pub fn image(&self) -> &FirmwareImage {
        &self.image
    }
}
