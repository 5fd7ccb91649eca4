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

//! Fixed-interval sensor and motor polling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bluetooth::nxt_constants::SENSOR_PORTS;
use crate::bluetooth::{Command, Transport};
use crate::state::DeviceState;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Commands sent on every tick: one read per sensor port, then the motor
/// state.
pub fn tick_commands(state: &DeviceState) -> Vec<Command> {
    let mut commands: Vec<Command> = (0..SENSOR_PORTS as u8)
        .map(|port| Command::GetInputValues { port })
        .collect();
    let (angle, power) = state.motor_output();
    commands.push(Command::motor(angle, power));
    commands
}

/// Handle to a running poll task. Dropping it stops the task.
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the loop. No frame is sent after this returns, other than one
    /// already handed to the transport.
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        self.task.abort();
    }
}

/// Start polling. Sends are fire-and-forget; the loop never waits for
/// replies and ends on its own once the transport reports disconnected.
pub fn spawn(
    state: Arc<DeviceState>,
    transport: Arc<dyn Transport>,
    interval: Duration,
) -> PollHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(state, transport, interval, stop_rx));
    PollHandle { stop_tx, task }
}

async fn run(
    state: Arc<DeviceState>,
    transport: Arc<dyn Transport>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!("Polling every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => break,
        }

        if *stop_rx.borrow() {
            break;
        }
        if !transport.is_connected() {
            info!("Transport disconnected, polling stopped");
            break;
        }

        for command in tick_commands(&state) {
            let frame = match command.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping poll command: {}", e);
                    continue;
                }
            };
            if let Err(e) = transport.send(&frame).await {
                warn!("Poll send failed: {}", e);
            }
        }
        debug!("Poll tick sent");
    }
}
