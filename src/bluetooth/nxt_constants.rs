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

//! NXT wire constants: telegram types, sensor types and modes, limits.

use uuid::Uuid;

/// Serial Port Profile UUID the brick exposes on its RFCOMM channel.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel the brick listens on.
pub const RFCOMM_CHANNEL: u8 = 1;

/// Telegram type bytes (first byte after the header).
pub mod telegram {
    pub const DIRECT_COMMAND_REPLY: u8 = 0x00;
    pub const SYSTEM_COMMAND_REPLY: u8 = 0x01;
    pub const REPLY: u8 = 0x02;
    pub const DIRECT_COMMAND_NO_REPLY: u8 = 0x80;
    pub const SYSTEM_COMMAND_NO_REPLY: u8 = 0x81;
}

/// Sensor type codes for SET_INPUT_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorType {
    NoSensor = 0x00,
    Touch = 0x01,
    Temperature = 0x02,
    Reflection = 0x03,
    Angle = 0x04,
    LightActive = 0x05,
    LightInactive = 0x06,
    SoundDb = 0x07,
    SoundDba = 0x08,
    Custom = 0x09,
    LowSpeed = 0x0A,
    LowSpeed9v = 0x0B,
}

/// Sensor mode codes for SET_INPUT_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorMode {
    Raw = 0x00,
    Boolean = 0x20,
}

/// Fixed port layout the steering program expects.
pub const PORT_LAYOUT: [(u8, SensorType, SensorMode); 3] = [
    (0, SensorType::SoundDba, SensorMode::Raw),
    (1, SensorType::Reflection, SensorMode::Raw),
    (2, SensorType::Touch, SensorMode::Boolean),
];

/// Number of polled input ports.
pub const SENSOR_PORTS: usize = 3;

/// Protocol limits.
pub mod limits {
    /// Largest chunk carried by one WRITE command.
    pub const MAX_WRITE_CHUNK: usize = 64;

    /// Filenames are padded to this many bytes before the zero terminator.
    pub const FILENAME_LEN: usize = 19;

    /// Longest mailbox text, excluding the terminator.
    pub const MAX_MAILBOX_TEXT: usize = 58;

    /// Default upper bound on a declared frame length.
    pub const DEFAULT_MAX_FRAME_LEN: usize = 512;

    /// Byte offset of the scaled value in a GET_INPUT_VALUES reply.
    pub const INPUT_SCALED_OFFSET: usize = 12;
}

/// Human-readable description of an NXT status byte.
pub fn status_description(status: u8) -> &'static str {
    match status {
        0x00 => "success",
        0x20 => "pending communication transaction in progress",
        0x40 => "specified mailbox queue is empty",
        0x81 => "no more handles",
        0x82 => "no space",
        0x83 => "no more files",
        0x84 => "end of file expected",
        0x85 => "end of file",
        0x86 => "not a linear file",
        0x87 => "file not found",
        0x88 => "handle already closed",
        0x89 => "no linear space",
        0x8A => "undefined error",
        0x8B => "file is busy",
        0x8C => "no write buffers",
        0x8D => "append not possible",
        0x8E => "file is full",
        0x8F => "file exists",
        0x90 => "module not found",
        0x91 => "out of boundary",
        0x92 => "illegal file name",
        0x93 => "illegal handle",
        0xBD => "request failed",
        0xBE => "unknown command opcode",
        0xBF => "insane packet",
        0xC0 => "data contains out-of-range values",
        0xDD => "communication bus error",
        0xDE => "no free memory in communication buffer",
        0xDF => "specified channel or connection is not valid",
        0xE0 => "specified channel or connection not configured or busy",
        0xEC => "no active program",
        0xED => "illegal size specified",
        0xEE => "illegal mailbox queue id specified",
        0xEF => "attempted to access invalid field of a structure",
        0xF0 => "bad input or output specified",
        0xFB => "insufficient memory available",
        0xFF => "bad arguments",
        _ => "unknown status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SPP_UUID.to_string().to_lowercase(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_port_layout() {
        assert_eq!(PORT_LAYOUT.len(), SENSOR_PORTS);
        assert_eq!(PORT_LAYOUT[2].1 as u8, 0x01);
        assert_eq!(PORT_LAYOUT[2].2 as u8, 0x20);
        assert_eq!(PORT_LAYOUT[0].1 as u8, 0x08);
    }

    #[test]
    fn test_status_description() {
        assert_eq!(status_description(0x00), "success");
        assert_eq!(status_description(0x87), "file not found");
        assert_eq!(status_description(0x42), "unknown status");
    }
}
