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

use serde::Deserialize;

use super::error::ConfigError;
use crate::pitch;
use crate::samples::NOTE_COUNT;

/// Semitone offsets of the pitched channels from the base note.
pub const DEFAULT_SEMITONES: [f32; NOTE_COUNT] = [0.0, 4.0, 7.0, 9.0];

/// Gain applied to the snare sample. This is close enough to zero that the snare is inaudible, and
/// the bank warns about it at load time.
pub const DEFAULT_SNARE_ATTENUATION: f32 = 0.00001;

/// A YAML representation of the sample files.
#[derive(Deserialize, Clone, Debug)]
pub struct Samples {
    /// The base note that the pitched channels are derived from.
    base: String,

    /// The kick drum sample, played unmodified.
    kick: String,

    /// The snare drum sample, scaled by the snare attenuation.
    snare: String,

    /// Semitone offsets for the four pitched channels.
    semitones: Option<Vec<f32>>,

    /// Gain applied to the snare sample.
    snare_attenuation: Option<f32>,
}

impl Samples {
    /// Returns the base note path, resolved against the given directory.
    pub fn base_path(&self, base_path: &Path) -> PathBuf {
        resolve(base_path, &self.base)
    }

    /// Returns the kick path, resolved against the given directory.
    pub fn kick_path(&self, base_path: &Path) -> PathBuf {
        resolve(base_path, &self.kick)
    }

    /// Returns the snare path, resolved against the given directory.
    pub fn snare_path(&self, base_path: &Path) -> PathBuf {
        resolve(base_path, &self.snare)
    }

    /// Returns the semitone offsets of the pitched channels.
    pub fn semitones(&self) -> Result<[f32; NOTE_COUNT], ConfigError> {
        let semitones: [f32; NOTE_COUNT] = match &self.semitones {
            Some(semitones) => semitones.as_slice().try_into().map_err(|_| {
                ConfigError::Invalid(format!(
                    "expected {} semitone offsets, found {}",
                    NOTE_COUNT,
                    semitones.len()
                ))
            })?,
            None => DEFAULT_SEMITONES,
        };

        if let Some(offset) = semitones.iter().find(|&&offset| !pitch::in_range(offset)) {
            return Err(ConfigError::Invalid(format!(
                "semitone offset {} is outside -{max}..={max}",
                offset,
                max = pitch::MAX_SEMITONES
            )));
        }
        Ok(semitones)
    }

    /// Returns the snare attenuation.
    pub fn snare_attenuation(&self) -> f32 {
        self.snare_attenuation.unwrap_or(DEFAULT_SNARE_ATTENUATION)
    }
}

fn resolve(base_path: &Path, file: &str) -> PathBuf {
    if Path::new(file).is_absolute() {
        PathBuf::from(file)
    } else {
        base_path.join(file)
    }
}
