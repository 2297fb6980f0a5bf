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
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::loader::{LoadError, SampleLoader};
use crate::config;
use crate::pitch;
use crate::CHANNEL_COUNT;

/// Number of pitched channels derived from the base note. These are channels 0 through 3.
pub const NOTE_COUNT: usize = 4;

/// Channel that plays the kick sample.
pub const KICK_CHANNEL: usize = 4;

/// Channel that plays the snare sample.
pub const SNARE_CHANNEL: usize = 5;

/// Snare attenuations below this are effectively silent.
const AUDIBLE_ATTENUATION: f32 = 0.001;

/// The six immutable buffers voices play from. Buffers are shared with playing voices and are
/// never modified after the bank is built.
#[derive(Debug)]
pub struct SampleBank {
    buffers: [Arc<[f32]>; CHANNEL_COUNT],
    sample_rate: u32,
}

impl SampleBank {
    /// Loads the configured samples and builds the bank at the given sample rate.
    pub fn load(
        config: &config::Samples,
        base_path: &Path,
        semitones: [f32; NOTE_COUNT],
        sample_rate: u32,
    ) -> Result<SampleBank, LoadError> {
        let loader = SampleLoader::new(sample_rate);
        let base = loader.load(&config.base_path(base_path))?;
        let kick = loader.load(&config.kick_path(base_path))?;
        let snare = loader.load(&config.snare_path(base_path))?;

        Ok(SampleBank::build(
            &base,
            kick,
            snare,
            semitones,
            config.snare_attenuation(),
            sample_rate,
        ))
    }

    /// Builds the bank from decoded samples. Channels 0 to 3 are the base note shifted by the
    /// given semitones, channel 4 is the kick as-is and channel 5 is the snare scaled by the
    /// attenuation.
    pub fn build(
        base: &[f32],
        kick: Vec<f32>,
        snare: Vec<f32>,
        semitones: [f32; NOTE_COUNT],
        snare_attenuation: f32,
        sample_rate: u32,
    ) -> SampleBank {
        if snare_attenuation < AUDIBLE_ATTENUATION {
            warn!(
                snare_attenuation,
                "Snare attenuation is low enough that the snare will be inaudible"
            );
        }

        let mut kick = Some(kick);
        let mut snare = Some(snare);
        let buffers: [Arc<[f32]>; CHANNEL_COUNT] = std::array::from_fn(|channel| match channel {
            KICK_CHANNEL => Arc::from(kick.take().unwrap_or_default()),
            SNARE_CHANNEL => snare
                .take()
                .unwrap_or_default()
                .into_iter()
                .map(|s| s * snare_attenuation)
                .collect(),
            note => Arc::from(pitch::shift(base, semitones[note])),
        });

        let bank = SampleBank {
            buffers,
            sample_rate,
        };
        info!(
            sample_rate,
            memory_kb = bank.memory_size() / 1024,
            "Sample bank ready"
        );
        bank
    }

    /// Returns the buffer for the given channel.
    pub fn buffer(&self, channel: usize) -> Option<&Arc<[f32]>> {
        self.buffers.get(channel)
    }

    /// Returns the number of samples in the given channel's buffer.
    pub fn len(&self, channel: usize) -> Option<usize> {
        self.buffer(channel).map(|b| b.len())
    }

    /// Returns how long the given channel's buffer plays for.
    pub fn duration(&self, channel: usize) -> Option<Duration> {
        self.buffer(channel)
            .map(|b| Duration::from_secs_f64(b.len() as f64 / self.sample_rate as f64))
    }

    /// Returns the sample rate of every buffer in the bank.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the total size of the buffers in bytes.
    pub fn memory_size(&self) -> usize {
        self.buffers
            .iter()
            .map(|b| b.len() * std::mem::size_of::<f32>())
            .sum()
    }
}
