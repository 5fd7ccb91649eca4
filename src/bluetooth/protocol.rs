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

//! NXT command definitions and reply parsing.

use serde::{Deserialize, Serialize};

use super::codec::encode_frame;
use super::nxt_constants::{limits, telegram, SensorMode, SensorType};
use crate::error::CommandError;

/// Opcodes the driver sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    StartProgram,
    PlayTone,
    SetInputMode,
    GetInputValues,
    MessageWrite,
    StopSoundPlayback,
    OpenWrite,
    Write,
    Close,
}

impl Opcode {
    /// Parse from the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::StartProgram),
            0x03 => Some(Self::PlayTone),
            0x05 => Some(Self::SetInputMode),
            0x07 => Some(Self::GetInputValues),
            0x09 => Some(Self::MessageWrite),
            0x0C => Some(Self::StopSoundPlayback),
            0x81 => Some(Self::OpenWrite),
            0x83 => Some(Self::Write),
            0x84 => Some(Self::Close),
            _ => None,
        }
    }

    /// Convert to the wire byte.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::StartProgram => 0x00,
            Self::PlayTone => 0x03,
            Self::SetInputMode => 0x05,
            Self::GetInputValues => 0x07,
            Self::MessageWrite => 0x09,
            Self::StopSoundPlayback => 0x0C,
            Self::OpenWrite => 0x81,
            Self::Write => 0x83,
            Self::Close => 0x84,
        }
    }

    /// System commands handle files; everything else is a direct command.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::OpenWrite | Self::Write | Self::Close)
    }
}

/// Whether the brick should answer a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Reply,
    NoReply,
}

/// Vehicle layout. Decides the power sign and the onboard control script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringMode {
    /// Port B swivels the front wheels, port C drives.
    #[default]
    FrontSteering,
    /// Port B is the left track, port C the right.
    Tank,
}

impl SteeringMode {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(|c: char| c == '-' || c == ' ', "_").as_str() {
            "front_steering" | "front" | "car" => Some(Self::FrontSteering),
            "tank" => Some(Self::Tank),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontSteering => "front_steering",
            Self::Tank => "tank",
        }
    }

    /// Mailbox text that switches the onboard program to this layout.
    pub fn config_message(&self) -> &'static str {
        match self {
            Self::FrontSteering => "B025",
            Self::Tank => "B123",
        }
    }

    /// Sign applied to the requested power; front steering bricks have the
    /// drive motor wired in reverse.
    pub fn power_sign(&self) -> i32 {
        match self {
            Self::FrontSteering => -1,
            Self::Tank => 1,
        }
    }
}

/// A command to the brick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetInputValues { port: u8 },
    MessageWrite { mailbox: u8, text: String },
    OpenWrite { filename: String, size: u32 },
    Write { handle: u8, chunk: Vec<u8> },
    Close { handle: u8 },
    StartProgram { filename: String },
    SetInputMode { port: u8, sensor: SensorType, mode: SensorMode },
    PlayTone { frequency: u16, duration_ms: u16 },
    StopSoundPlayback,
}

impl Command {
    /// Mailbox write to the default mailbox, validating the text.
    pub fn message(text: impl Into<String>) -> Result<Self, CommandError> {
        let text = text.into();
        if !text.is_ascii() || text.len() > limits::MAX_MAILBOX_TEXT {
            return Err(CommandError::InvalidMailboxText {
                text,
                max: limits::MAX_MAILBOX_TEXT,
            });
        }
        Ok(Self::MessageWrite { mailbox: 0, text })
    }

    /// Motor command for the onboard steering program.
    pub fn motor(angle: i32, power: i32) -> Self {
        Self::MessageWrite {
            mailbox: 0,
            text: motor_message(angle, power),
        }
    }

    /// Open a file for writing, validating name and size.
    pub fn open_write(filename: &str, size: usize) -> Result<Self, CommandError> {
        validate_filename(filename)?;
        let size = u32::try_from(size).map_err(|_| CommandError::ImageTooLarge(size))?;
        Ok(Self::OpenWrite {
            filename: filename.to_string(),
            size,
        })
    }

    /// Write one chunk to an open file handle.
    pub fn write(handle: u8, chunk: &[u8]) -> Result<Self, CommandError> {
        if chunk.len() > limits::MAX_WRITE_CHUNK {
            return Err(CommandError::ChunkTooLarge {
                len: chunk.len(),
                max: limits::MAX_WRITE_CHUNK,
            });
        }
        Ok(Self::Write {
            handle,
            chunk: chunk.to_vec(),
        })
    }

    /// Start an onboard program, validating the name.
    pub fn start_program(filename: &str) -> Result<Self, CommandError> {
        validate_filename(filename)?;
        Ok(Self::StartProgram {
            filename: filename.to_string(),
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Self::GetInputValues { .. } => Opcode::GetInputValues,
            Self::MessageWrite { .. } => Opcode::MessageWrite,
            Self::OpenWrite { .. } => Opcode::OpenWrite,
            Self::Write { .. } => Opcode::Write,
            Self::Close { .. } => Opcode::Close,
            Self::StartProgram { .. } => Opcode::StartProgram,
            Self::SetInputMode { .. } => Opcode::SetInputMode,
            Self::PlayTone { .. } => Opcode::PlayTone,
            Self::StopSoundPlayback => Opcode::StopSoundPlayback,
        }
    }

    /// Commands whose replies drive the dispatcher ask for one; the rest
    /// are fire-and-forget.
    pub fn response_mode(&self) -> ResponseMode {
        match self {
            Self::GetInputValues { .. }
            | Self::OpenWrite { .. }
            | Self::Write { .. }
            | Self::Close { .. }
            | Self::StartProgram { .. } => ResponseMode::Reply,
            Self::MessageWrite { .. }
            | Self::SetInputMode { .. }
            | Self::PlayTone { .. }
            | Self::StopSoundPlayback => ResponseMode::NoReply,
        }
    }

    /// Telegram type byte for this command.
    pub fn telegram_type(&self) -> u8 {
        match (self.opcode().is_system(), self.response_mode()) {
            (false, ResponseMode::Reply) => telegram::DIRECT_COMMAND_REPLY,
            (false, ResponseMode::NoReply) => telegram::DIRECT_COMMAND_NO_REPLY,
            (true, ResponseMode::Reply) => telegram::SYSTEM_COMMAND_REPLY,
            (true, ResponseMode::NoReply) => telegram::SYSTEM_COMMAND_NO_REPLY,
        }
    }

    /// Argument bytes following the opcode.
    pub fn args(&self) -> Vec<u8> {
        match self {
            Self::GetInputValues { port } => vec![*port],
            Self::MessageWrite { mailbox, text } => {
                let mut args = vec![*mailbox, (text.len() + 1) as u8];
                args.extend(ascii_z(text));
                args
            }
            Self::OpenWrite { filename, size } => {
                let mut args = padded_filename(filename);
                args.extend_from_slice(&size.to_le_bytes());
                args
            }
            Self::Write { handle, chunk } => {
                let mut args = Vec::with_capacity(chunk.len() + 1);
                args.push(*handle);
                args.extend_from_slice(chunk);
                args
            }
            Self::Close { handle } => vec![*handle],
            Self::StartProgram { filename } => padded_filename(filename),
            Self::SetInputMode { port, sensor, mode } => vec![*port, *sensor as u8, *mode as u8],
            Self::PlayTone {
                frequency,
                duration_ms,
            } => {
                let mut args = frequency.to_le_bytes().to_vec();
                args.extend_from_slice(&duration_ms.to_le_bytes());
                args
            }
            Self::StopSoundPlayback => Vec::new(),
        }
    }

    /// Check the limits the constructors enforce. Variants built directly
    /// bypass them.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::MessageWrite { text, .. } => {
                Self::message(text.as_str())?;
            }
            Self::OpenWrite { filename, .. } | Self::StartProgram { filename } => {
                validate_filename(filename)?;
            }
            Self::Write { handle, chunk } => {
                Self::write(*handle, chunk)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Complete length-prefixed frame ready for the transport.
    pub fn to_frame(&self) -> Result<Vec<u8>, CommandError> {
        self.validate()?;
        encode_frame(self.telegram_type(), self.opcode().as_byte(), &self.args())
    }
}

fn validate_filename(filename: &str) -> Result<(), CommandError> {
    if filename.is_empty() || !filename.is_ascii() || filename.len() > limits::FILENAME_LEN {
        return Err(CommandError::InvalidFileName {
            name: filename.to_string(),
            max: limits::FILENAME_LEN,
        });
    }
    Ok(())
}

/// ASCII bytes followed by a single zero terminator.
pub fn ascii_z(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}

/// Filename padded with zeros to 19 bytes, then terminated.
fn padded_filename(filename: &str) -> Vec<u8> {
    let mut bytes = filename.as_bytes().to_vec();
    bytes.resize(limits::FILENAME_LEN, 0);
    bytes.push(0);
    bytes
}

/// Encode a signed value for the onboard mailbox parser.
///
/// The sign is `-` or `0`, followed by the rounded magnitude padded to at
/// least three digits. Larger magnitudes are not truncated.
pub fn encode_signed(value: f64) -> String {
    let sign = if value < 0.0 { '-' } else { '0' };
    let magnitude = value.round().abs() as u64;
    format!("{}{:03}", sign, magnitude)
}

/// Mailbox text carrying one angle/power pair.
pub fn motor_message(angle: i32, power: i32) -> String {
    format!(
        "A{}{}",
        encode_signed(f64::from(angle)),
        encode_signed(f64::from(power))
    )
}

/// A decoded reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub opcode: u8,
    pub status: u8,
    pub body: Vec<u8>,
}

impl Reply {
    /// Parse a decoded frame.
    ///
    /// Returns `None` for frames that are not replies or are too short to
    /// carry an opcode and status.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        match frame {
            [telegram::REPLY, opcode, status, body @ ..] => Some(Self {
                opcode: *opcode,
                status: *status,
                body: body.to_vec(),
            }),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Byte at `offset` from the start of the frame.
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        offset.checked_sub(3).and_then(|i| self.body.get(i).copied())
    }

    /// Little-endian u16 at `offset` from the start of the frame.
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        Some(u16::from_le_bytes([
            self.byte_at(offset)?,
            self.byte_at(offset + 1)?,
        ]))
    }
}
