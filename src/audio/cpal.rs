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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use crate::audio::{AudioError, OutputStream, Pull, RenderCallback};
use crate::config;

/// A small wrapper around a cpal::Device along with the stream configuration that every voice
/// stream on it uses.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The stream configuration shared by all voice streams.
    stream_config: cpal::StreamConfig,
    /// The native sample format of the stream.
    sample_format: cpal::SampleFormat,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.stream_config.channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal output devices as printable descriptions.
    pub fn list() -> Result<Vec<String>, AudioError> {
        // Suppress noisy backend output here.
        let _shh_stdout = shh::stdout().map_err(|e| AudioError::Backend(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| AudioError::Backend(e.to_string()))?;

        let mut devices: Vec<String> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Backend(e.to_string()))?;
            let host_devices = match host.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = match device.supported_output_configs() {
                    Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
                    Err(_) => continue,
                };

                if max_channels > 0 {
                    let name = device_name(&device).unwrap_or_else(|| "unknown".to_string());
                    devices.push(format!(
                        "{} (Channels={}) ({})",
                        name,
                        max_channels,
                        host_id.name()
                    ));
                }
            }
        }

        devices.sort();
        Ok(devices)
    }

    /// Gets the cpal device named in the configuration and settles on the stream configuration
    /// for it.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let name = config.device();
        let (host_id, device) = if name == config::DEFAULT_AUDIO_DEVICE {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(AudioError::NoDefaultDevice)?;
            (host.id(), device)
        } else {
            Device::find(name)?
        };

        let supported = Device::choose_config(&device, name, config.sample_rate())?;
        let sample_format = supported.sample_format();
        if !matches!(
            sample_format,
            cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::I32
        ) {
            return Err(AudioError::UnsupportedSampleFormat {
                device: name.to_string(),
                format: format!("{:?}", sample_format),
            });
        }

        let mut stream_config = supported.config();
        if let Some(buffer_size) = config.buffer_size() {
            stream_config.buffer_size = cpal::BufferSize::Fixed(buffer_size);
        }

        let device = Device {
            name: device_name(&device).unwrap_or_else(|| name.to_string()),
            host_id,
            device,
            stream_config,
            sample_format,
        };
        info!(
            device = %device,
            sample_rate = config.sample_rate(),
            format = ?sample_format,
            "Audio device ready."
        );

        Ok(device)
    }

    /// Finds a device by name across all hosts.
    fn find(name: &str) -> Result<(cpal::HostId, cpal::Device), AudioError> {
        let _shh_stderr = shh::stderr().map_err(|e| AudioError::Backend(e.to_string()))?;

        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id).map_err(|e| AudioError::Backend(e.to_string()))?;
            let Ok(devices) = host.devices() else {
                continue;
            };
            for device in devices {
                if device_name(&device).is_some_and(|device_name| device_name.trim() == name) {
                    return Ok((host_id, device));
                }
            }
        }

        Err(AudioError::DeviceNotFound(name.to_string()))
    }

    /// Picks an output configuration at the requested rate, preferring mono, then f32.
    fn choose_config(
        device: &cpal::Device,
        name: &str,
        sample_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, AudioError> {
        let rate: cpal::SampleRate = sample_rate;
        device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?
            .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
            .min_by_key(|range| {
                (
                    range.channels(),
                    range.sample_format() != cpal::SampleFormat::F32,
                )
            })
            .map(|range| range.with_sample_rate(rate))
            .ok_or_else(|| AudioError::UnsupportedSampleRate {
                device: name.to_string(),
                sample_rate,
            })
    }

    fn build_stream<T>(
        &self,
        mut adapter: MonoAdapter,
        failed: Arc<AtomicBool>,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let name = self.name.clone();
        Ok(self.device.build_output_stream(
            &self.stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| adapter.fill(data),
            move |err| {
                error!(device = name, err = %err, "CPAL output stream error");
                failed.store(true, Ordering::Release);
            },
            None,
        )?)
    }
}

impl super::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    fn open_stream(&self, render: RenderCallback) -> Result<Box<dyn OutputStream>, AudioError> {
        let failed = Arc::new(AtomicBool::new(false));
        let adapter = MonoAdapter::new(render, self.stream_config.channels as usize);

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(adapter, failed.clone())?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(adapter, failed.clone())?,
            cpal::SampleFormat::I32 => self.build_stream::<i32>(adapter, failed.clone())?,
            format => {
                return Err(AudioError::UnsupportedSampleFormat {
                    device: self.name.clone(),
                    format: format!("{:?}", format),
                })
            }
        };
        stream.play()?;
        debug!(device = self.name, "Output stream started.");

        Ok(Box::new(Stream { stream, failed }))
    }
}

/// Returns the human readable name of a cpal device.
fn device_name(device: &cpal::Device) -> Option<String> {
    device
        .description()
        .ok()
        .map(|description| description.name().to_string())
}

/// A playing cpal stream.
struct Stream {
    stream: cpal::Stream,
    failed: Arc<AtomicBool>,
}

impl OutputStream for Stream {
    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            debug!(err = %e, "Unable to pause stream before release");
        }
        // Dropping the stream releases the device.
    }
}

/// Adapts a mono render callback to an interleaved device buffer of any channel count and
/// sample type. Once the callback reports end of stream it is never called again and the
/// adapter plays silence.
struct MonoAdapter {
    render: RenderCallback,
    channels: usize,
    scratch: Vec<f32>,
    finished: bool,
}

impl MonoAdapter {
    fn new(render: RenderCallback, channels: usize) -> MonoAdapter {
        MonoAdapter {
            render,
            channels: channels.max(1),
            scratch: Vec::new(),
            finished: false,
        }
    }

    fn fill<T: cpal::Sample + cpal::FromSample<f32>>(&mut self, data: &mut [T]) {
        let frames = data.len() / self.channels;
        self.scratch.resize(frames, 0.0);

        if self.finished {
            self.scratch.fill(0.0);
        } else if (self.render)(&mut self.scratch) == Pull::EndOfStream {
            self.finished = true;
        }

        for (frame, &sample) in data.chunks_mut(self.channels).zip(self.scratch.iter()) {
            frame.fill(T::from_sample(sample));
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_render(total: usize, calls: Arc<AtomicUsize>) -> RenderCallback {
        let mut played = 0;
        Box::new(move |out: &mut [f32]| {
            calls.fetch_add(1, Ordering::Relaxed);
            for sample in out.iter_mut() {
                *sample = if played < total { 0.5 } else { 0.0 };
                played += 1;
            }
            if played >= total {
                Pull::EndOfStream
            } else {
                Pull::Continue
            }
        })
    }

    #[test]
    fn test_mono_fans_out_to_all_channels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = MonoAdapter::new(counting_render(100, calls.clone()), 2);

        let mut data = vec![0.0f32; 8];
        adapter.fill(&mut data);
        assert_eq!(vec![0.5; 8], data);
        assert_eq!(1, calls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_silence_after_end_of_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = MonoAdapter::new(counting_render(3, calls.clone()), 1);

        let mut data = vec![1.0f32; 4];
        adapter.fill(&mut data);
        assert_eq!(vec![0.5, 0.5, 0.5, 0.0], data);

        let mut data = vec![1.0f32; 4];
        adapter.fill(&mut data);
        assert_eq!(vec![0.0; 4], data);

        // The render callback is not pulled again once it has finished.
        assert_eq!(1, calls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_integer_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = MonoAdapter::new(counting_render(100, calls), 1);

        let mut data = vec![0i16; 4];
        adapter.fill(&mut data);
        assert!(data.iter().all(|&sample| (16_000..17_000).contains(&sample)));
    }
}
