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

//! Sample loading for triggered samples.
//!
//! Samples are decoded entirely into memory at startup, downmixed to mono and converted to the
//! output sample rate, so that voices only ever copy from a ready buffer.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use crate::util::filename_display;

/// Errors raised while loading a sample file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to open sample {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode sample {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: SymphoniaError,
    },

    #[error("sample {} has no audio track", .0.display())]
    NoAudioTrack(PathBuf),

    #[error("sample {} does not specify a sample rate", .0.display())]
    UnknownSampleRate(PathBuf),

    #[error("sample {} contains no audio", .0.display())]
    Empty(PathBuf),
}

impl LoadError {
    fn decode(path: &Path, source: SymphoniaError) -> LoadError {
        LoadError::Decode {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Decoded audio before it is brought into the bank's format.
struct Decoded {
    /// Interleaved samples.
    samples: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
}

/// Loads sample files as mono f32 at a fixed sample rate.
#[derive(Debug)]
pub struct SampleLoader {
    /// Target sample rate for transcoding (matches audio output).
    target_sample_rate: u32,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Loads a sample from a file into memory.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>, LoadError> {
        info!(path = ?path, "Loading sample into memory");

        let decoded = Self::decode(path)?;
        if decoded.samples.is_empty() {
            return Err(LoadError::Empty(path.to_path_buf()));
        }

        let mono = downmix(&decoded.samples, decoded.channel_count);
        let samples = if decoded.sample_rate != self.target_sample_rate {
            info!(
                file = filename_display(path),
                source_rate = decoded.sample_rate,
                target_rate = self.target_sample_rate,
                "Transcoding sample"
            );
            transcode(&mono, decoded.sample_rate, self.target_sample_rate)
        } else {
            mono
        };

        let duration =
            Duration::from_secs_f64(samples.len() as f64 / self.target_sample_rate as f64);
        info!(
            file = filename_display(path),
            channels = decoded.channel_count,
            sample_rate = self.target_sample_rate,
            duration_ms = duration.as_millis(),
            memory_kb = samples.len() * std::mem::size_of::<f32>() / 1024,
            "Sample loaded"
        );

        Ok(samples)
    }

    /// Decodes the first audio track of the file into interleaved f32 samples.
    fn decode(path: &Path) -> Result<Decoded, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::decode(path, e))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoadError::NoAudioTrack(path.to_path_buf()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| LoadError::UnknownSampleRate(path.to_path_buf()))?;
        let mut channel_count = params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| LoadError::decode(path, e))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(LoadError::decode(path, e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet only costs us that packet.
                    warn!(file = filename_display(path), err = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(LoadError::decode(path, e)),
            };

            let spec = *decoded.spec();
            channel_count = spec.channels.count();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        debug!(
            file = filename_display(path),
            samples = samples.len(),
            channel_count,
            sample_rate,
            "Decoded sample"
        );

        Ok(Decoded {
            samples,
            channel_count: channel_count.max(1),
            sample_rate,
        })
    }
}

/// Averages interleaved channels down to one.
fn downmix(samples: &[f32], channel_count: usize) -> Vec<f32> {
    if channel_count <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channel_count)
        .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
        .collect()
}

/// Transcodes mono samples from one sample rate to another using linear interpolation.
fn transcode(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..target_len)
        .map(|target_index| {
            let source_pos = target_index as f64 / ratio;
            let source_index = source_pos.floor() as usize;
            let frac = source_pos.fract() as f32;

            let s0 = samples.get(source_index).copied().unwrap_or(0.0);
            let s1 = samples.get(source_index + 1).copied().unwrap_or(s0);
            s0 + (s1 - s0) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_transcode_samples() {
        let source_rate = 44100;
        let target_rate = 48000;
        let source_samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = transcode(&source_samples, source_rate, target_rate);

        // Should have more samples at higher rate
        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.len(), expected_len);
        assert!((result[0] - source_samples[0]).abs() < 1e-6);
    }

    #[test]
    fn test_transcode_interpolates() {
        let result = transcode(&[0.0, 1.0], 1, 2);
        assert_eq!(vec![0.0, 0.5, 1.0, 1.0], result);
    }

    #[test]
    fn test_downmix() {
        let stereo = vec![1.0f32, -1.0, 0.5, 0.5, 0.0, 1.0];
        assert_eq!(vec![0.0, 0.5, 0.5], downmix(&stereo, 2));
        assert_eq!(stereo, downmix(&stereo, 1));
    }

    #[test]
    fn test_load_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(path.clone(), vec![vec![0.25f32; 1000]], 44100).unwrap();

        let samples = SampleLoader::new(44100).load(&path).unwrap();
        assert_eq!(1000, samples.len());
        assert!(samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_load_int_wav_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        write_wav(path.clone(), vec![vec![i16::MAX / 2; 100]], 44100).unwrap();

        let samples = SampleLoader::new(44100).load(&path).unwrap();
        assert_eq!(100, samples.len());
        assert!(samples.iter().all(|&s| (s - 0.5).abs() < 0.001));
    }

    #[test]
    fn test_load_stereo_wav_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(
            path.clone(),
            vec![vec![1.0f32; 500], vec![0.0f32; 500]],
            44100,
        )
        .unwrap();

        let samples = SampleLoader::new(44100).load(&path).unwrap();
        assert_eq!(500, samples.len());
        assert!(samples.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_load_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("low.wav");
        write_wav(path.clone(), vec![vec![0.1f32; 22050]], 22050).unwrap();

        let samples = SampleLoader::new(44100).load(&path).unwrap();
        assert_eq!(44100, samples.len());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SampleLoader::new(44100).load(&dir.path().join("nope.wav"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not a wav file").unwrap();

        let result = SampleLoader::new(44100).load(&path);
        assert!(matches!(result, Err(LoadError::Decode { .. })));
    }
}
