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

//! Host command execution module.
//!
//! Maps text commands from the host to driver requests.

use anyhow::Result;
use tracing::debug;

use crate::bluetooth::SteeringMode;
use crate::driver::Driver;

/// Host command types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    /// Stop motors and sound.
    StopAll,
    Power(i32),
    Angle(i32),
    Steering(SteeringMode),
    /// Note number and seconds.
    Beep(f64, f64),
    /// Print the device state.
    Status,
    Quit,
}

fn number(arg: Option<&str>) -> Option<f64> {
    arg?.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl HostCommand {
    /// Parse one line, e.g. `power 60` or `beep 72 0.5`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?.to_lowercase();
        let arg = words.next();

        let command = match name.as_str() {
            "forward" | "f" => Self::Forward,
            "backward" | "b" => Self::Backward,
            "left" | "l" => Self::Left,
            "right" | "r" => Self::Right,
            "stop" | "s" => Self::Stop,
            "stop_all" | "halt" => Self::StopAll,
            "power" => Self::Power(number(arg)?.round() as i32),
            "angle" => Self::Angle(number(arg)?.round() as i32),
            "steering" => Self::Steering(SteeringMode::parse(arg?)?),
            "beep" => Self::Beep(number(arg)?, number(words.next())?),
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Get command name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
            Self::StopAll => "stop_all",
            Self::Power(_) => "power",
            Self::Angle(_) => "angle",
            Self::Steering(_) => "steering",
            Self::Beep(..) => "beep",
            Self::Status => "status",
            Self::Quit => "quit",
        }
    }
}

/// Execute a host command on the driver. `Status` and `Quit` are left to
/// the caller.
pub async fn execute(command: &HostCommand, driver: &Driver) -> Result<()> {
    debug!("Executing command: {:?}", command);

    match *command {
        HostCommand::Forward => driver.drive_forward(),
        HostCommand::Backward => driver.drive_backward(),
        HostCommand::Left => driver.turn_left(),
        HostCommand::Right => driver.turn_right(),
        HostCommand::Stop => driver.stop(),
        HostCommand::StopAll => driver.stop_all().await?,
        HostCommand::Power(power) => {
            driver.set_power(power);
        }
        HostCommand::Angle(angle) => {
            driver.set_angle(angle);
        }
        HostCommand::Steering(mode) => driver.set_steering(mode).await?,
        HostCommand::Beep(note, seconds) => {
            driver.beep(note, seconds).await?;
        }
        HostCommand::Status | HostCommand::Quit => {
            debug!("{} handled by caller", command.as_str());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{Command, MockTransport};
    use crate::driver::upload::FirmwareImage;
    use crate::driver::DriverOptions;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn test_host_command_parse() {
        assert_eq!(HostCommand::parse("forward"), Some(HostCommand::Forward));
        assert_eq!(HostCommand::parse("  LEFT "), Some(HostCommand::Left));
        assert_eq!(HostCommand::parse("power 60"), Some(HostCommand::Power(60)));
        assert_eq!(HostCommand::parse("power -20.6"), Some(HostCommand::Power(-21)));
        assert_eq!(HostCommand::parse("angle 30"), Some(HostCommand::Angle(30)));
        assert_eq!(
            HostCommand::parse("steering tank"),
            Some(HostCommand::Steering(SteeringMode::Tank))
        );
        assert_eq!(HostCommand::parse("beep 72 0.5"), Some(HostCommand::Beep(72.0, 0.5)));
        assert_eq!(HostCommand::parse("status"), Some(HostCommand::Status));
    }

    #[test]
    fn test_host_command_parse_rejects() {
        assert_eq!(HostCommand::parse(""), None);
        assert_eq!(HostCommand::parse("jump"), None);
        assert_eq!(HostCommand::parse("power"), None);
        assert_eq!(HostCommand::parse("power fast"), None);
        assert_eq!(HostCommand::parse("beep 60"), None);
        assert_eq!(HostCommand::parse("steering boat"), None);
        assert_eq!(HostCommand::parse("angle NaN"), None);
    }

    #[tokio::test]
    async fn test_execute() {
        let transport = Arc::new(MockTransport::new());
        let (tx, _rx) = mpsc::channel(16);
        let image = FirmwareImage::new("SteeringControl.rxe", vec![1, 2, 3]).unwrap();
        let mut driver = Driver::new(transport.clone(), image, tx, DriverOptions::default());
        driver.connect("brick").await.unwrap();

        execute(&HostCommand::Power(70), &driver).await.unwrap();
        execute(&HostCommand::Backward, &driver).await.unwrap();
        assert_eq!(driver.state().power(), -70);

        execute(&HostCommand::Right, &driver).await.unwrap();
        assert_eq!(driver.state().angle(), 45);

        execute(&HostCommand::StopAll, &driver).await.unwrap();
        assert_eq!(driver.state().power(), 0);
        assert!(transport.has_sent(&Command::StopSoundPlayback));
    }
}
