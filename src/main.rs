// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod audio;
mod config;
mod dispatcher;
mod pitch;
mod registry;
mod samples;
mod sensor;
mod shutdown;
#[cfg(test)]
mod testutil;
mod util;
mod voice;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::dispatcher::Dispatcher;
use crate::registry::VoiceRegistry;
use crate::samples::{SampleBank, KICK_CHANNEL, SNARE_CHANNEL};
use crate::shutdown::ShutdownHandle;

/// The number of sensor channels, and so the number of voices.
pub const CHANNEL_COUNT: usize = 6;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=sensor triggered sample player

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/sensorpad
ExecStart=/usr/local/bin/sensorpad start "$SENSORPAD_CONFIG_FILE"

[Install]
WantedBy=multi-user.target
Alias=sensorpad.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample player triggered by analog sensors."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will read the sensor feed and play samples until interrupted.
    Start {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available serial ports.
    Ports {},
    /// Loads the samples in the given config and describes the resulting sample bank.
    Bank {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => start(PathBuf::from(config_path)).await?,
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Ports {} => {
            let ports = sensor::list_ports()?;

            if ports.is_empty() {
                println!("No serial ports found.");
                return Ok(());
            }

            println!("Serial ports:");
            for port in ports {
                println!("- {}", port);
            }
        }
        Commands::Bank { config_path } => {
            let instrument = config::Instrument::deserialize(&PathBuf::from(config_path))?;
            let semitones = instrument.samples().semitones()?;
            let bank = SampleBank::load(
                instrument.samples(),
                instrument.base_path(),
                semitones,
                instrument.audio().sample_rate(),
            )?;

            println!("Sample bank ({}Hz):", bank.sample_rate());
            for channel in 0..CHANNEL_COUNT {
                let label = match channel {
                    KICK_CHANNEL => "kick".to_string(),
                    SNARE_CHANNEL => "snare".to_string(),
                    note => format!("note {:+} semitones", semitones[note]),
                };
                println!(
                    "- Channel {} ({}): {} samples, {:.3}s",
                    channel,
                    label,
                    bank.len(channel).unwrap_or_default(),
                    bank.duration(channel).unwrap_or_default().as_secs_f64(),
                );
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

/// Runs the instrument until the sensor feed fails or the process is interrupted.
async fn start(config_path: PathBuf) -> Result<(), Box<dyn Error>> {
    let instrument = config::Instrument::deserialize(&config_path)?;

    let device = audio::get_device(instrument.audio())?;
    let bank = Arc::new(SampleBank::load(
        instrument.samples(),
        instrument.base_path(),
        instrument.samples().semitones()?,
        device.sample_rate(),
    )?);

    let serial = instrument.serial();
    let source = sensor::open_source(serial.port(), serial.baud_rate(), serial.read_timeout()?)?;

    let shutdown = ShutdownHandle::new();
    let dispatcher = Dispatcher::new(
        source,
        VoiceRegistry::new(bank, device),
        instrument.threshold(),
        shutdown.clone(),
    );
    let control = tokio::task::spawn_blocking(move || dispatcher.run());
    shutdown::supervise(control, tokio::signal::ctrl_c(), &shutdown).await??;

    info!("Goodbye.");
    Ok(())
}
