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

//! Bluetooth communication module.
//!
//! Frames NXT commands, reassembles replies from the byte stream and
//! provides the RFCOMM transport to the brick.

pub mod codec;
pub mod mock;
pub mod nxt_constants;
pub mod protocol;
mod rfcomm;
mod transport;

pub use codec::{encode_frame, FrameDecoder};
pub use mock::MockTransport;
pub use nxt_constants::{status_description, SensorMode, SensorType};
pub use protocol::{encode_signed, motor_message, Command, Opcode, Reply, ResponseMode, SteeringMode};
pub use rfcomm::RfcommTransport;
pub use transport::{Transport, TransportEvent};
