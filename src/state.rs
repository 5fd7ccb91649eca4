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

//! Device state shared between the driver and its poll task.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::bluetooth::nxt_constants::SENSOR_PORTS;
use crate::bluetooth::SteeringMode;

pub const MAX_POWER: i32 = 100;
pub const MAX_ANGLE: i32 = 90;
pub const DEFAULT_CRUISE_POWER: i32 = 100;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

/// Point-in-time copy of the device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub peripheral: Option<String>,
    pub sensors: [i32; SENSOR_PORTS],
    pub power: i32,
    pub angle: i32,
    pub steering: SteeringMode,
    pub upload: Option<(usize, usize)>,
}

/// State of one brick, owned by its driver.
#[derive(Debug)]
pub struct DeviceState {
    /// Current connection status.
    pub connection_status: RwLock<ConnectionStatus>,

    /// Connected peripheral id.
    pub peripheral: RwLock<Option<String>>,

    /// Last scaled reading per input port.
    pub sensors: RwLock<[i32; SENSOR_PORTS]>,

    /// Requested drive power, -100..=100.
    pub power: RwLock<i32>,

    /// Power magnitude used by drive and turn requests.
    pub cruise_power: RwLock<i32>,

    /// Requested steering angle, -90..=90.
    pub angle: RwLock<i32>,

    pub steering: RwLock<SteeringMode>,

    /// Bytes acknowledged and total size while an upload runs.
    pub upload_progress: RwLock<Option<(usize, usize)>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(ConnectionStatus::Disconnected),
            peripheral: RwLock::new(None),
            sensors: RwLock::new([0; SENSOR_PORTS]),
            power: RwLock::new(0),
            cruise_power: RwLock::new(DEFAULT_CRUISE_POWER),
            angle: RwLock::new(0),
            steering: RwLock::new(SteeringMode::default()),
            upload_progress: RwLock::new(None),
        }
    }
}

impl DeviceState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_steering(steering: SteeringMode) -> Arc<Self> {
        let state = Self::default();
        *state.steering.write() = steering;
        Arc::new(state)
    }

    pub fn set_connecting(&self) {
        *self.connection_status.write() = ConnectionStatus::Connecting;
    }

    pub fn set_connected(&self, peripheral: String) {
        *self.connection_status.write() = ConnectionStatus::Connected;
        *self.peripheral.write() = Some(peripheral);
    }

    /// Back to initial values. The steering choice and cruise power are host
    /// preferences and survive a disconnect.
    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionStatus::Disconnected;
        *self.peripheral.write() = None;
        *self.sensors.write() = [0; SENSOR_PORTS];
        *self.power.write() = 0;
        *self.angle.write() = 0;
        *self.upload_progress.write() = None;
    }

    pub fn set_error(&self) {
        *self.connection_status.write() = ConnectionStatus::Error;
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.connection_status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.get_status() == ConnectionStatus::Connected
    }

    /// Store a sensor reading. Returns false for ports that are not polled.
    pub fn set_sensor(&self, port: usize, value: i32) -> bool {
        match self.sensors.write().get_mut(port) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn sensor(&self, port: usize) -> Option<i32> {
        self.sensors.read().get(port).copied()
    }

    /// Set drive power, clamped to -100..=100.
    pub fn set_power(&self, power: i32) -> i32 {
        let power = power.clamp(-MAX_POWER, MAX_POWER);
        *self.power.write() = power;
        power
    }

    pub fn power(&self) -> i32 {
        *self.power.read()
    }

    pub fn set_cruise_power(&self, power: i32) {
        *self.cruise_power.write() = power.clamp(-MAX_POWER, MAX_POWER);
    }

    pub fn cruise_power(&self) -> i32 {
        *self.cruise_power.read()
    }

    /// Set steering angle, clamped to -90..=90.
    pub fn set_angle(&self, angle: i32) -> i32 {
        let angle = angle.clamp(-MAX_ANGLE, MAX_ANGLE);
        *self.angle.write() = angle;
        angle
    }

    pub fn angle(&self) -> i32 {
        *self.angle.read()
    }

    pub fn set_steering(&self, steering: SteeringMode) {
        *self.steering.write() = steering;
    }

    pub fn steering(&self) -> SteeringMode {
        *self.steering.read()
    }

    pub fn set_upload_progress(&self, progress: Option<(usize, usize)>) {
        *self.upload_progress.write() = progress;
    }

    pub fn upload_progress(&self) -> Option<(usize, usize)> {
        *self.upload_progress.read()
    }

    /// Angle and power as sent to the brick; power is sign-corrected for
    /// the steering layout.
    pub fn motor_output(&self) -> (i32, i32) {
        let sign = self.steering().power_sign();
        (self.angle(), sign * self.power())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.get_status(),
            peripheral: self.peripheral.read().clone(),
            sensors: *self.sensors.read(),
            power: self.power(),
            angle: self.angle(),
            steering: self.steering(),
            upload: self.upload_progress(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let state = DeviceState::new();
        assert_eq!(state.set_power(150), 100);
        assert_eq!(state.set_power(-250), -100);
        assert_eq!(state.set_angle(120), 90);
        assert_eq!(state.set_angle(-91), -90);
    }

    #[test]
    fn test_sensor_bounds() {
        let state = DeviceState::new();
        assert!(state.set_sensor(2, 1));
        assert!(!state.set_sensor(3, 7));
        assert_eq!(state.sensor(2), Some(1));
        assert_eq!(state.sensor(3), None);
    }

    #[test]
    fn test_motor_output_inverts_for_front_steering() {
        let state = DeviceState::with_steering(SteeringMode::FrontSteering);
        state.set_power(60);
        state.set_angle(-45);
        assert_eq!(state.motor_output(), (-45, -60));

        state.set_steering(SteeringMode::Tank);
        assert_eq!(state.motor_output(), (-45, 60));
    }

    #[test]
    fn test_disconnect_resets() {
        let state = DeviceState::with_steering(SteeringMode::Tank);
        state.set_connected("00:16:53:01:02:03".to_string());
        state.set_sensor(0, 512);
        state.set_power(40);
        state.set_angle(30);
        state.set_upload_progress(Some((64, 130)));

        state.set_disconnected();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.peripheral, None);
        assert_eq!(snapshot.sensors, [0; SENSOR_PORTS]);
        assert_eq!(snapshot.power, 0);
        assert_eq!(snapshot.angle, 0);
        assert_eq!(snapshot.upload, None);
        assert_eq!(snapshot.steering, SteeringMode::Tank);
    }
}
