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

//! Reply dispatch.

use tracing::{debug, error, info, warn};

use super::upload::UploadSession;
use crate::bluetooth::nxt_constants::{limits, PORT_LAYOUT};
use crate::bluetooth::{Command, Opcode, Reply};
use crate::error::ProtocolError;
use crate::events::DriverEvent;
use crate::state::DeviceState;

/// Something the driver must do in response to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(Command),
    Emit(DriverEvent),
    StartPolling,
}

/// Turns decoded reply frames into state changes and follow-up commands.
#[derive(Debug, Default)]
pub struct ResponseDispatcher {
    /// Set once an upload finished on this connection, so a program that
    /// still fails to start is reported instead of uploaded again.
    installed: bool,
}

impl ResponseDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget per-connection history.
    pub fn reset(&mut self) {
        self.installed = false;
    }

    /// Handle one decoded frame.
    pub fn dispatch(
        &mut self,
        frame: &[u8],
        state: &DeviceState,
        upload: &mut UploadSession,
    ) -> Vec<Effect> {
        if !state.is_connected() {
            debug!("Dropping frame received while disconnected");
            return Vec::new();
        }

        let Some(reply) = Reply::parse(frame) else {
            debug!("Ignoring non-reply frame: {}", hex::encode(frame));
            return Vec::new();
        };

        let Some(opcode) = Opcode::from_byte(reply.opcode) else {
            debug!("Ignoring reply to opcode 0x{:02X}", reply.opcode);
            return Vec::new();
        };

        match opcode {
            Opcode::StartProgram => self.handle_start_program(&reply, state, upload),
            Opcode::OpenWrite | Opcode::Write | Opcode::Close if !reply.is_success() => {
                Self::protocol_error(opcode, reply.status, state, upload)
            }
            Opcode::OpenWrite => Self::handle_opened(&reply, state, upload),
            Opcode::Write => Self::handle_written(state, upload),
            Opcode::Close => self.handle_closed(state, upload),
            Opcode::GetInputValues => {
                Self::handle_input_values(&reply, state);
                Vec::new()
            }
            Opcode::PlayTone
            | Opcode::SetInputMode
            | Opcode::MessageWrite
            | Opcode::StopSoundPlayback => {
                debug!("Ignoring reply to {:?}", opcode);
                Vec::new()
            }
        }
    }

    fn handle_start_program(
        &mut self,
        reply: &Reply,
        state: &DeviceState,
        upload: &mut UploadSession,
    ) -> Vec<Effect> {
        if reply.is_success() {
            info!("Program {} is running", upload.image().name());
            let mut effects = vec![Effect::Emit(DriverEvent::ProgramExists)];
            effects.extend(PORT_LAYOUT.iter().map(|(port, sensor, mode)| {
                Effect::Send(Command::SetInputMode {
                    port: *port,
                    sensor: *sensor,
                    mode: *mode,
                })
            }));
            effects.push(Effect::StartPolling);
            return effects;
        }

        if self.installed {
            return Self::protocol_error(Opcode::StartProgram, reply.status, state, upload);
        }

        info!(
            "Program {} missing (status 0x{:02X}), uploading",
            upload.image().name(),
            reply.status
        );
        let open = upload.begin();
        state.set_upload_progress(Some(upload.progress()));
        vec![
            Effect::Emit(DriverEvent::ProgramMissing),
            Effect::Send(open),
        ]
    }

    fn handle_opened(reply: &Reply, state: &DeviceState, upload: &mut UploadSession) -> Vec<Effect> {
        let Some(handle) = reply.byte_at(3) else {
            warn!("OPEN_WRITE reply without handle");
            upload.abandon();
            return Vec::new();
        };

        match upload.on_opened(handle) {
            Some(next) => {
                state.set_upload_progress(Some(upload.progress()));
                vec![Effect::Send(next)]
            }
            None => Vec::new(),
        }
    }

    fn handle_written(state: &DeviceState, upload: &mut UploadSession) -> Vec<Effect> {
        let Some(next) = upload.on_written() else {
            return Vec::new();
        };

        let (sent, total) = upload.progress();
        state.set_upload_progress(Some((sent, total)));
        debug!("Uploaded {}/{} bytes", sent, total);
        vec![
            Effect::Emit(DriverEvent::UploadProgress { sent, total }),
            Effect::Send(next),
        ]
    }

    fn handle_closed(&mut self, state: &DeviceState, upload: &mut UploadSession) -> Vec<Effect> {
        if !upload.on_closed() {
            return Vec::new();
        }

        self.installed = true;
        state.set_upload_progress(None);
        vec![
            Effect::Emit(DriverEvent::UploadComplete),
            Effect::Send(Command::StartProgram {
                filename: upload.image().name().to_string(),
            }),
        ]
    }

    fn handle_input_values(reply: &Reply, state: &DeviceState) {
        if !reply.is_success() {
            debug!("GET_INPUT_VALUES failed with status 0x{:02X}", reply.status);
            return;
        }

        let (Some(port), Some(value)) = (
            reply.byte_at(3),
            reply.u16_at(limits::INPUT_SCALED_OFFSET),
        ) else {
            warn!("Truncated GET_INPUT_VALUES reply: {} bytes", reply.body.len() + 3);
            return;
        };

        if !state.set_sensor(port as usize, i32::from(value)) {
            warn!("Reading for unpolled port {}", port);
        }
    }

    /// Abandon the step the reply belongs to. No retry.
    fn protocol_error(
        opcode: Opcode,
        status: u8,
        state: &DeviceState,
        upload: &mut UploadSession,
    ) -> Vec<Effect> {
        let err = ProtocolError::new(opcode, status);
        error!("{}", err);
        upload.abandon();
        if opcode == Opcode::StartProgram {
            state.set_upload_progress(None);
        }
        vec![Effect::Emit(DriverEvent::error(err.to_string()))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::upload::{FirmwareImage, UploadState};

    fn connected_state() -> std::sync::Arc<DeviceState> {
        let state = DeviceState::new();
        state.set_connected("test".to_string());
        state
    }

    fn session(len: usize) -> UploadSession {
        UploadSession::new(FirmwareImage::new("SteeringControl.rxe", vec![0xAB; len]).unwrap())
    }

    fn input_reply(port: u8, value: u16) -> Vec<u8> {
        let [lo, hi] = value.to_le_bytes();
        vec![0x02, 0x07, 0x00, port, 1, 0, 0x03, 0x00, 0, 0, 0, 0, lo, hi, 0, 0]
    }

    fn sends(effects: &[Effect]) -> Vec<Command> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_program_exists() {
        let state = connected_state();
        let mut upload = session(10);
        let mut dispatcher = ResponseDispatcher::new();

        let effects = dispatcher.dispatch(&[0x02, 0x00, 0x00], &state, &mut upload);

        assert_eq!(effects[0], Effect::Emit(DriverEvent::ProgramExists));
        assert_eq!(sends(&effects).len(), 3);
        assert_eq!(effects.last(), Some(&Effect::StartPolling));
        assert!(!upload.is_active());
    }

    #[test]
    fn test_program_missing_starts_upload() {
        let state = connected_state();
        let mut upload = session(10);
        let mut dispatcher = ResponseDispatcher::new();

        let effects = dispatcher.dispatch(&[0x02, 0x00, 0x87], &state, &mut upload);

        assert_eq!(effects[0], Effect::Emit(DriverEvent::ProgramMissing));
        assert!(matches!(sends(&effects)[0], Command::OpenWrite { size: 10, .. }));
        assert_eq!(state.upload_progress(), Some((0, 10)));
    }

    #[test]
    fn test_full_upload_handshake() {
        let state = connected_state();
        let mut upload = session(70);
        let mut dispatcher = ResponseDispatcher::new();

        dispatcher.dispatch(&[0x02, 0x00, 0x87], &state, &mut upload);
        let effects = dispatcher.dispatch(&[0x02, 0x81, 0x00, 0x04], &state, &mut upload);
        assert!(matches!(&sends(&effects)[0], Command::Write { handle: 4, chunk } if chunk.len() == 64));

        let effects = dispatcher.dispatch(&[0x02, 0x83, 0x00, 0x04, 0x40, 0x00], &state, &mut upload);
        assert_eq!(
            effects[0],
            Effect::Emit(DriverEvent::UploadProgress { sent: 64, total: 70 })
        );
        assert!(matches!(&sends(&effects)[0], Command::Write { chunk, .. } if chunk.len() == 6));

        let effects = dispatcher.dispatch(&[0x02, 0x83, 0x00, 0x04, 0x06, 0x00], &state, &mut upload);
        assert_eq!(sends(&effects), vec![Command::Close { handle: 4 }]);

        let effects = dispatcher.dispatch(&[0x02, 0x84, 0x00, 0x04], &state, &mut upload);
        assert_eq!(effects[0], Effect::Emit(DriverEvent::UploadComplete));
        assert_eq!(
            sends(&effects),
            vec![Command::StartProgram {
                filename: "SteeringControl.rxe".to_string()
            }]
        );
        assert_eq!(upload.state(), UploadState::Closed);
        assert_eq!(state.upload_progress(), None);
    }

    #[test]
    fn test_write_error_abandons() {
        let state = connected_state();
        let mut upload = session(100);
        let mut dispatcher = ResponseDispatcher::new();

        dispatcher.dispatch(&[0x02, 0x00, 0x87], &state, &mut upload);
        dispatcher.dispatch(&[0x02, 0x81, 0x00, 0x01], &state, &mut upload);
        let effects = dispatcher.dispatch(&[0x02, 0x83, 0x8E], &state, &mut upload);

        assert!(sends(&effects).is_empty());
        assert!(matches!(effects[0], Effect::Emit(DriverEvent::Error { .. })));
        assert!(!upload.is_active());

        // A late success for the abandoned step does nothing.
        let effects = dispatcher.dispatch(&[0x02, 0x83, 0x00, 0x01, 0x40, 0x00], &state, &mut upload);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_start_failure_after_upload_is_reported() {
        let state = connected_state();
        let mut upload = session(0);
        let mut dispatcher = ResponseDispatcher::new();

        dispatcher.dispatch(&[0x02, 0x00, 0x87], &state, &mut upload);
        dispatcher.dispatch(&[0x02, 0x81, 0x00, 0x01], &state, &mut upload);
        dispatcher.dispatch(&[0x02, 0x84, 0x00, 0x01], &state, &mut upload);

        let effects = dispatcher.dispatch(&[0x02, 0x00, 0xEC], &state, &mut upload);
        assert!(sends(&effects).is_empty());
        assert!(matches!(effects[0], Effect::Emit(DriverEvent::Error { .. })));
    }

    #[test]
    fn test_sensor_replies_out_of_order() {
        let state = connected_state();
        let mut upload = session(1);
        let mut dispatcher = ResponseDispatcher::new();

        for (port, value) in [(2u8, 1u16), (0, 612), (1, 345)] {
            let effects = dispatcher.dispatch(&input_reply(port, value), &state, &mut upload);
            assert!(effects.is_empty());
        }

        assert_eq!(*state.sensors.read(), [612, 345, 1]);
    }

    #[test]
    fn test_bad_sensor_replies_ignored() {
        let state = connected_state();
        let mut upload = session(1);
        let mut dispatcher = ResponseDispatcher::new();

        dispatcher.dispatch(&input_reply(3, 99), &state, &mut upload);
        dispatcher.dispatch(&[0x02, 0x07, 0x00, 0x01, 0x01], &state, &mut upload);
        let mut failed = input_reply(1, 50);
        failed[2] = 0xC0;
        dispatcher.dispatch(&failed, &state, &mut upload);

        assert_eq!(*state.sensors.read(), [0, 0, 0]);
    }

    #[test]
    fn test_frames_dropped_when_disconnected() {
        let state = DeviceState::new();
        let mut upload = session(1);
        let mut dispatcher = ResponseDispatcher::new();

        let effects = dispatcher.dispatch(&[0x02, 0x00, 0x87], &state, &mut upload);
        assert!(effects.is_empty());
        dispatcher.dispatch(&input_reply(0, 10), &state, &mut upload);
        assert_eq!(state.sensor(0), Some(0));
    }

    #[test]
    fn test_non_reply_frames_ignored() {
        let state = connected_state();
        let mut upload = session(1);
        let mut dispatcher = ResponseDispatcher::new();

        assert!(dispatcher.dispatch(&[0x00, 0x00, 0x00], &state, &mut upload).is_empty());
        assert!(dispatcher.dispatch(&[0x02, 0x88, 0x00], &state, &mut upload).is_empty());
    }
}
