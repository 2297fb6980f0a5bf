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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

mod audio;
mod error;
mod samples;
mod serial;

pub use audio::{Audio, DEFAULT_AUDIO_DEVICE};
pub use error::ConfigError;
pub use samples::Samples;
pub use serial::Serial;

/// Default gate threshold. Readings strictly below it are active.
pub const DEFAULT_THRESHOLD: i64 = 150;

/// Prefix for environment variables that override the configuration file,
/// e.g. `SENSORPAD_SERIAL__PORT=/dev/ttyUSB0`.
const ENV_PREFIX: &str = "SENSORPAD";

/// The configuration for the instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct Instrument {
    /// The serial sensor feed.
    #[serde(default)]
    serial: Serial,

    /// The audio output.
    #[serde(default)]
    audio: Audio,

    /// Readings below this value gate their channel on.
    threshold: Option<i64>,

    /// The sample files and how they are prepared.
    samples: Samples,

    /// The directory that relative sample paths are resolved against.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Instrument {
    /// Loads the instrument configuration from a YAML file, applying any environment overrides.
    pub fn deserialize(path: &Path) -> Result<Instrument, ConfigError> {
        let mut instrument = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Instrument>()?;

        instrument.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        instrument.validate()?;
        Ok(instrument)
    }

    /// Checks the values that serde cannot.
    fn validate(&self) -> Result<(), ConfigError> {
        self.serial.read_timeout()?;
        self.samples.semitones()?;
        if self.audio.sample_rate() == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        Ok(())
    }

    /// Gets the serial configuration.
    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    /// Gets the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Gets the gate threshold.
    pub fn threshold(&self) -> i64 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Gets the samples configuration.
    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// Gets the directory relative sample paths are resolved against.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
