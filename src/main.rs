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

//! NXT Bridge command line driver.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nxt_bridge::bluetooth::{RfcommTransport, TransportEvent};
use nxt_bridge::commands::{self, HostCommand};
use nxt_bridge::config::Config;
use nxt_bridge::driver::upload::FirmwareImage;
use nxt_bridge::driver::Driver;
use nxt_bridge::events::{status_line, DriverEvent, EventProcessor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("nxt_bridge=info".parse()?))
        .init();

    info!("Starting NXT Bridge v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let address = std::env::args()
        .nth(1)
        .or_else(|| config.bluetooth.address.clone())
        .ok_or_else(|| anyhow!("No brick address given; pass one or set [bluetooth].address"))?;

    let image = FirmwareImage::load(&config.driver.program_name, &config.driver.firmware_path)?;

    let (transport_tx, mut transport_rx) = mpsc::channel::<TransportEvent>(64);
    let transport = Arc::new(RfcommTransport::new(config.bluetooth.channel, transport_tx));

    let (event_tx, mut event_rx) = mpsc::channel::<DriverEvent>(64);
    let mut driver = Driver::new(transport, image, event_tx, config.driver.options());

    // Report driver events
    tokio::spawn(async move {
        let mut processor = EventProcessor::new(std::io::stdout());
        while let Some(event) = event_rx.recv().await {
            if let Err(e) = processor.process_event(&event) {
                error!("Error reporting event: {}", e);
            }
        }
    });

    driver.connect(&address).await?;
    info!("Ready. Reading commands from stdin.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = transport_rx.recv() => {
                let closed = event == TransportEvent::Closed;
                driver.handle_transport_event(event).await;
                if closed {
                    warn!("Connection to brick lost");
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Error reading input: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                match HostCommand::parse(&line) {
                    Some(HostCommand::Quit) => {
                        info!("Quit requested");
                        break;
                    }
                    Some(HostCommand::Status) => match status_line(&driver.state().snapshot()) {
                        Ok(line) => print!("{}", line),
                        Err(e) => error!("Error building status: {}", e),
                    },
                    Some(command) => {
                        if let Err(e) = commands::execute(&command, &driver).await {
                            warn!("{} failed: {}", command.as_str(), e);
                        }
                    }
                    None => warn!("Unknown command: {}", line.trim()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    driver.disconnect().await;
    info!("NXT Bridge stopped");
    Ok(())
}
