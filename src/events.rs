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

//! Driver events and their delivery to the host.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use tracing::{error, info, warn};

use crate::state::Snapshot;

/// Events raised by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DriverEvent {
    /// Transport connected.
    Connected { peripheral: String },
    /// Connection closed and state reset.
    Disconnected,
    /// The steering program started on the brick.
    ProgramExists,
    /// The steering program is not on the brick; an upload follows.
    ProgramMissing,
    /// Bytes acknowledged so far.
    UploadProgress { sent: usize, total: usize },
    /// The program file was written and closed.
    UploadComplete,
    /// A step failed and was abandoned.
    Error { message: String },
}

impl DriverEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One JSON line describing the current device state.
pub fn status_line(snapshot: &Snapshot) -> Result<String> {
    let json = serde_json::to_string(snapshot)?;
    Ok(format!("{}\n", json))
}

/// Reports driver events to the host as JSON lines.
pub struct EventProcessor<W: Write> {
    out: W,
}

impl<W: Write> EventProcessor<W> {
    /// Create a new event processor writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: &DriverEvent) -> Result<()> {
        match event {
            DriverEvent::Connected { peripheral } => {
                info!("Brick connected: {}", peripheral);
            }
            DriverEvent::Disconnected => {
                info!("Brick disconnected");
            }
            DriverEvent::ProgramExists => {
                info!("Steering program running, ready to drive");
            }
            DriverEvent::ProgramMissing => {
                warn!("Steering program missing, uploading");
            }
            DriverEvent::UploadProgress { sent, total } => {
                info!("Upload progress: {}/{} bytes", sent, total);
            }
            DriverEvent::UploadComplete => {
                info!("Upload complete");
            }
            DriverEvent::Error { message } => {
                error!("Driver error: {}", message);
            }
        }

        let json = serde_json::to_string(event)?;
        writeln!(self.out, "{}", json)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
