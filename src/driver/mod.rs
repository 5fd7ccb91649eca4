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

//! Driver for one NXT brick.
//!
//! Owns the frame decoder, the upload session and the poll task, and turns
//! host requests into device state changes and brick commands.

pub mod dispatcher;
pub mod poll;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::nxt_constants::limits;
use crate::bluetooth::{Command, FrameDecoder, Opcode, SteeringMode, Transport, TransportEvent};
use crate::error::{DriverError, Result, TransportError};
use crate::events::DriverEvent;
use crate::state::{ConnectionStatus, DeviceState};

use dispatcher::{Effect, ResponseDispatcher};
use poll::PollHandle;
use upload::{FirmwareImage, UploadSession};

/// Steering angle used by the turn requests.
pub const TURN_ANGLE: i32 = 45;

/// Lowest and highest playable note (MIDI numbering).
pub const MIN_NOTE: f64 = 47.0;
pub const MAX_NOTE: f64 = 99.0;

/// Longest tone the brick is asked to play.
pub const MAX_BEEP_MS: f64 = 3000.0;

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub poll_interval: Duration,
    pub max_frame_len: usize,
    pub steering: SteeringMode,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: poll::DEFAULT_POLL_INTERVAL,
            max_frame_len: limits::DEFAULT_MAX_FRAME_LEN,
            steering: SteeringMode::default(),
        }
    }
}

/// Tone frequency in Hz for a note, one octave above MIDI pitch.
pub fn note_frequency(note: f64) -> f64 {
    2f64.powf((note - 69.0 + 12.0) / 12.0) * 440.0
}

pub struct Driver {
    transport: Arc<dyn Transport>,
    state: Arc<DeviceState>,
    decoder: FrameDecoder,
    upload: UploadSession,
    dispatcher: ResponseDispatcher,
    poll: Option<PollHandle>,
    poll_interval: Duration,
    event_tx: mpsc::Sender<DriverEvent>,
}

impl Driver {
    pub fn new(
        transport: Arc<dyn Transport>,
        image: FirmwareImage,
        event_tx: mpsc::Sender<DriverEvent>,
        options: DriverOptions,
    ) -> Self {
        Self {
            transport,
            state: DeviceState::with_steering(options.steering),
            decoder: FrameDecoder::with_max_frame_len(options.max_frame_len),
            upload: UploadSession::new(image),
            dispatcher: ResponseDispatcher::new(),
            poll: None,
            poll_interval: options.poll_interval,
            event_tx,
        }
    }

    pub fn state(&self) -> &Arc<DeviceState> {
        &self.state
    }

    pub fn upload(&self) -> &UploadSession {
        &self.upload
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Connect to `peripheral` and ask the brick to start the steering
    /// program. The reply decides between driving and uploading.
    pub async fn connect(&mut self, peripheral: &str) -> Result<()> {
        info!("Connecting to {}", peripheral);
        self.state.set_connecting();

        if let Err(e) = self.transport.connect(peripheral).await {
            error!("Connection to {} failed: {}", peripheral, e);
            self.state.set_error();
            self.emit(DriverEvent::error(e.to_string())).await;
            return Err(e.into());
        }

        self.state.set_connected(peripheral.to_string());
        self.emit(DriverEvent::Connected {
            peripheral: peripheral.to_string(),
        })
        .await;

        let start = Command::start_program(self.upload.image().name())?;
        self.send(&start).await
    }

    /// Feed a notification from the transport.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Data(bytes) => self.handle_bytes(&bytes).await,
            TransportEvent::Closed => {
                info!("Transport closed by peer");
                self.stop_polling();
                self.transport.disconnect().await;
                self.teardown().await;
            }
        }
    }

    /// Reassemble `bytes` into frames and act on each reply.
    pub async fn handle_bytes(&mut self, bytes: &[u8]) {
        for frame in self.decoder.push(bytes) {
            let effects = self
                .dispatcher
                .dispatch(&frame, &self.state, &mut self.upload);
            self.apply(effects).await;
        }
    }

    /// Close the connection and reset everything tied to it.
    pub async fn disconnect(&mut self) {
        info!("Disconnecting");
        self.stop_polling();
        self.transport.disconnect().await;
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.stop_polling();
        self.decoder.reset();
        self.upload.reset();
        self.dispatcher.reset();
        let was_active = self.state.get_status() != ConnectionStatus::Disconnected;
        self.state.set_disconnected();
        if was_active {
            self.emit(DriverEvent::Disconnected).await;
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(command) => {
                    if let Err(e) = self.send(&command).await {
                        self.send_failed(&command, e).await;
                    }
                }
                Effect::Emit(event) => self.emit(event).await,
                Effect::StartPolling => self.start_polling(),
            }
        }
    }

    /// A step that never reached the brick is abandoned and reported, with
    /// no retry.
    async fn send_failed(&mut self, command: &Command, err: DriverError) {
        if matches!(
            command.opcode(),
            Opcode::OpenWrite | Opcode::Write | Opcode::Close
        ) {
            self.upload.abandon();
            self.state.set_upload_progress(None);
        }
        self.emit(DriverEvent::error(format!(
            "{:?} not sent: {}",
            command.opcode(),
            err
        )))
        .await;
    }

    fn start_polling(&mut self) {
        self.stop_polling();
        self.poll = Some(poll::spawn(
            self.state.clone(),
            self.transport.clone(),
            self.poll_interval,
        ));
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.stop();
            debug!("Polling stopped");
        }
    }

    /// Send one command. Nothing is sent while disconnected.
    pub async fn send(&self, command: &Command) -> Result<()> {
        if !self.transport.is_connected() {
            debug!("Not connected, dropping {:?}", command.opcode());
            return Err(TransportError::NotConnected.into());
        }

        let frame = command.to_frame()?;
        debug!("TX {}", hex::encode(&frame));
        if let Err(e) = self.transport.send(&frame).await {
            warn!("Send of {:?} failed: {}", command.opcode(), e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn emit(&self, event: DriverEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            debug!("Event receiver gone: {}", e);
        }
    }

    /// Set drive power. The value also becomes the cruise power used by the
    /// drive and turn requests.
    pub fn set_power(&self, power: i32) -> i32 {
        let power = self.state.set_power(power);
        self.state.set_cruise_power(power);
        power
    }

    pub fn set_angle(&self, angle: i32) -> i32 {
        self.state.set_angle(angle)
    }

    pub fn drive_forward(&self) {
        self.drive(1);
    }

    pub fn drive_backward(&self) {
        self.drive(-1);
    }

    fn drive(&self, direction: i32) {
        self.state.set_power(direction * self.state.cruise_power().abs());
        if self.state.steering() == SteeringMode::Tank {
            self.state.set_angle(0);
        }
    }

    pub fn turn_left(&self) {
        self.turn(-TURN_ANGLE);
    }

    pub fn turn_right(&self) {
        self.turn(TURN_ANGLE);
    }

    fn turn(&self, angle: i32) {
        self.state.set_angle(angle);
        if self.state.steering() == SteeringMode::Tank {
            self.state.set_power(self.state.cruise_power());
        }
    }

    pub fn stop(&self) {
        self.state.set_power(0);
    }

    /// Stop the motors and any tone.
    pub async fn stop_all(&self) -> Result<()> {
        self.stop();
        self.send(&Command::StopSoundPlayback).await
    }

    /// Switch the vehicle layout and tell the onboard program.
    pub async fn set_steering(&self, mode: SteeringMode) -> Result<()> {
        info!("Steering mode: {}", mode.as_str());
        self.state.set_steering(mode);
        let command = Command::message(mode.config_message())?;
        self.send(&command).await
    }

    /// Play `note` for `seconds`. Returns how long the tone lasts.
    pub async fn beep(&self, note: f64, seconds: f64) -> Result<Duration> {
        let note = note.clamp(MIN_NOTE, MAX_NOTE);
        let duration_ms = (seconds * 1000.0).clamp(0.0, MAX_BEEP_MS).round();
        if duration_ms <= 0.0 || duration_ms.is_nan() {
            return Ok(Duration::ZERO);
        }

        let frequency = note_frequency(note).round() as u16;
        let duration_ms = duration_ms as u16;
        debug!("Tone {} Hz for {} ms", frequency, duration_ms);
        self.send(&Command::PlayTone {
            frequency,
            duration_ms,
        })
        .await?;
        Ok(Duration::from_millis(u64::from(duration_ms)))
    }

    /// Sound level reading.
    pub fn volume(&self) -> i32 {
        self.state.sensor(0).unwrap_or_default()
    }

    /// Reflected light reading.
    pub fn brightness(&self) -> i32 {
        self.state.sensor(1).unwrap_or_default()
    }

    pub fn is_bumper_pressed(&self) -> bool {
        self.state.sensor(2) == Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::MockTransport;
    use crate::driver::upload::UploadState;

    fn driver(len: usize) -> (Driver, Arc<MockTransport>, mpsc::Receiver<DriverEvent>) {
        let transport = Arc::new(MockTransport::new());
        let (tx, rx) = mpsc::channel(64);
        let image = FirmwareImage::new("SteeringControl.rxe", vec![7u8; len]).unwrap();
        let driver = Driver::new(transport.clone(), image, tx, DriverOptions::default());
        (driver, transport, rx)
    }

    fn reply(opcode: Opcode, status: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![0x02, opcode.as_byte(), status];
        payload.extend_from_slice(body);
        let mut frame = (payload.len() as u16).to_le_bytes().to_vec();
        frame.extend_from_slice(&payload);
        frame
    }

    fn drain(rx: &mut mpsc::Receiver<DriverEvent>) -> Vec<DriverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_connect_starts_program() {
        let (mut driver, transport, mut rx) = driver(10);
        driver.connect("00:16:53:0A:0B:0C").await.unwrap();

        assert!(driver.state().is_connected());
        assert!(transport.has_sent(&Command::StartProgram {
            filename: "SteeringControl.rxe".to_string()
        }));
        assert_eq!(
            drain(&mut rx),
            vec![DriverEvent::Connected {
                peripheral: "00:16:53:0A:0B:0C".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_exists_starts_polling() {
        let (mut driver, transport, mut rx) = driver(10);
        driver.connect("brick").await.unwrap();
        transport.take_sent();

        driver.handle_bytes(&reply(Opcode::StartProgram, 0x00, &[])).await;

        assert!(driver.is_polling());
        assert_eq!(transport.take_sent().len(), 3);
        assert!(drain(&mut rx).contains(&DriverEvent::ProgramExists));

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_upload_then_start() {
        let (mut driver, transport, mut rx) = driver(130);
        driver.connect("brick").await.unwrap();
        transport.take_sent();

        driver.handle_bytes(&reply(Opcode::StartProgram, 0x87, &[])).await;
        driver.handle_bytes(&reply(Opcode::OpenWrite, 0x00, &[0x02])).await;
        driver.handle_bytes(&reply(Opcode::Write, 0x00, &[0x02, 64, 0])).await;
        driver.handle_bytes(&reply(Opcode::Write, 0x00, &[0x02, 64, 0])).await;
        driver.handle_bytes(&reply(Opcode::Write, 0x00, &[0x02, 2, 0])).await;
        driver.handle_bytes(&reply(Opcode::Close, 0x00, &[0x02])).await;

        let opcodes: Vec<u8> = transport.sent().iter().map(|f| f[5]).collect();
        assert_eq!(opcodes, vec![0x81, 0x83, 0x83, 0x83, 0x84, 0x00]);

        let events = drain(&mut rx);
        assert!(events.contains(&DriverEvent::ProgramMissing));
        assert!(events.contains(&DriverEvent::UploadProgress { sent: 130, total: 130 }));
        assert!(events.contains(&DriverEvent::UploadComplete));
    }

    #[tokio::test]
    async fn test_disconnect_mid_upload() {
        let (mut driver, transport, mut rx) = driver(130);
        driver.connect("brick").await.unwrap();
        driver.handle_bytes(&reply(Opcode::StartProgram, 0x87, &[])).await;
        driver.handle_bytes(&reply(Opcode::OpenWrite, 0x00, &[0x01])).await;
        assert!(driver.upload().is_active());

        driver.disconnect().await;
        transport.take_sent();

        driver.handle_bytes(&reply(Opcode::Write, 0x00, &[0x01, 64, 0])).await;

        assert!(transport.sent().is_empty());
        assert_eq!(driver.upload().state(), UploadState::Closed);
        assert_eq!(driver.upload().remaining().len(), 130);
        assert_eq!(driver.state().upload_progress(), None);
        assert!(drain(&mut rx).contains(&DriverEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_peer_close_resets() {
        let (mut driver, transport, mut rx) = driver(10);
        driver.connect("brick").await.unwrap();
        driver.set_power(40);
        transport.set_connected(false);

        driver.handle_transport_event(TransportEvent::Closed).await;

        assert!(!driver.state().is_connected());
        assert_eq!(driver.state().power(), 0);
        assert_eq!(drain(&mut rx).last(), Some(&DriverEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_failed_upload_send_abandons_step() {
        let (mut driver, transport, mut rx) = driver(130);
        driver.connect("brick").await.unwrap();
        driver.handle_bytes(&reply(Opcode::StartProgram, 0x87, &[])).await;
        transport.take_sent();
        drain(&mut rx);

        transport.set_fail_sends(true);
        driver.handle_bytes(&reply(Opcode::OpenWrite, 0x00, &[0x03])).await;

        assert!(transport.sent().is_empty());
        assert!(!driver.upload().is_active());
        assert_eq!(driver.state().upload_progress(), None);
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [DriverEvent::Error { .. }]));

        // The ack for the write that never went out is ignored.
        transport.set_fail_sends(false);
        driver.handle_bytes(&reply(Opcode::Write, 0x00, &[0x03, 64, 0])).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_releases_transport() {
        let (mut driver, transport, _rx) = driver(10);
        driver.connect("brick").await.unwrap();
        assert!(transport.is_connected());

        driver.handle_transport_event(TransportEvent::Closed).await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (driver, transport, _rx) = driver(10);
        let result = driver.send(&Command::StopSoundPlayback).await;
        assert!(matches!(
            result,
            Err(DriverError::Transport(TransportError::NotConnected))
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_drive_requests() {
        let (driver, _transport, _rx) = driver(10);
        driver.state().set_steering(SteeringMode::Tank);
        driver.set_power(60);
        driver.turn_left();
        assert_eq!(driver.state().angle(), -45);

        driver.drive_backward();
        assert_eq!(driver.state().power(), -60);
        assert_eq!(driver.state().angle(), 0);

        driver.turn_right();
        assert_eq!(driver.state().angle(), 45);
        assert_eq!(driver.state().power(), 60);

        driver.stop();
        assert_eq!(driver.state().power(), 0);

        driver.drive_forward();
        assert_eq!(driver.state().power(), 60);
    }

    #[tokio::test]
    async fn test_front_steering_keeps_angle_on_drive() {
        let (driver, _transport, _rx) = driver(10);
        driver.set_angle(30);
        driver.drive_forward();
        assert_eq!(driver.state().angle(), 30);
        assert_eq!(driver.state().power(), 100);

        driver.turn_left();
        assert_eq!(driver.state().power(), 100);
    }

    #[tokio::test]
    async fn test_set_steering_sends_config() {
        let (mut driver, transport, _rx) = driver(10);
        driver.connect("brick").await.unwrap();
        driver.set_steering(SteeringMode::Tank).await.unwrap();

        assert_eq!(driver.state().steering(), SteeringMode::Tank);
        assert!(transport.has_sent(&Command::MessageWrite {
            mailbox: 0,
            text: "B123".to_string()
        }));
    }

    #[tokio::test]
    async fn test_beep() {
        let (mut driver, transport, _rx) = driver(10);
        driver.connect("brick").await.unwrap();
        transport.take_sent();

        assert_eq!(driver.beep(60.0, 0.0).await.unwrap(), Duration::ZERO);
        assert!(transport.sent().is_empty());

        let played = driver.beep(57.0, 10.0).await.unwrap();
        assert_eq!(played, Duration::from_millis(3000));
        assert!(transport.has_sent(&Command::PlayTone {
            frequency: 440,
            duration_ms: 3000
        }));

        driver.beep(10.0, 0.2).await.unwrap();
        let low = note_frequency(MIN_NOTE).round() as u16;
        assert!(transport.has_sent(&Command::PlayTone {
            frequency: low,
            duration_ms: 200
        }));
    }

    #[tokio::test]
    async fn test_sensor_accessors() {
        let (driver, _transport, _rx) = driver(10);
        driver.state().set_sensor(0, 55);
        driver.state().set_sensor(1, 420);
        driver.state().set_sensor(2, 1);

        assert_eq!(driver.volume(), 55);
        assert_eq!(driver.brightness(), 420);
        assert!(driver.is_bumper_pressed());

        driver.state().set_sensor(2, 0);
        assert!(!driver.is_bumper_pressed());
    }

    #[test]
    fn test_note_frequency() {
        assert_eq!(note_frequency(57.0), 440.0);
        assert_eq!(note_frequency(69.0), 880.0);
    }
}
