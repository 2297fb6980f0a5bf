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
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{AudioError, OutputStream, Pull, RenderCallback};

/// Default number of frames pulled per chunk.
const DEFAULT_CHUNK_FRAMES: usize = 512;

/// A mock device. Pulls audio on its own thread at roughly real-time pace and discards it.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    chunk_frames: usize,
    tick: Duration,
    /// Number of streams opened.
    opened: Arc<AtomicUsize>,
    /// Number of streams released.
    closed: Arc<AtomicUsize>,
    /// When set, every running stream reports a backend failure.
    failing: Arc<AtomicBool>,
    /// When set, opening a stream fails.
    refusing: Arc<AtomicBool>,
    /// How long releasing a stream takes.
    close_delay: Arc<Mutex<Duration>>,
}

impl Device {
    /// Gets the given mock device, pulling chunks at the pace the sample rate implies.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        let tick = Duration::from_secs_f64(DEFAULT_CHUNK_FRAMES as f64 / sample_rate.max(1) as f64);
        Device::with_timing(name, sample_rate, DEFAULT_CHUNK_FRAMES, tick)
    }

    /// Gets a mock device with an explicit chunk size and pull interval.
    pub fn with_timing(name: &str, sample_rate: u32, chunk_frames: usize, tick: Duration) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            chunk_frames,
            tick,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            refusing: Arc::new(AtomicBool::new(false)),
            close_delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Returns the number of streams opened so far.
    #[cfg(test)]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    /// Returns the number of streams released so far.
    #[cfg(test)]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Acquire)
    }

    /// Makes every running stream report a backend failure.
    #[cfg(test)]
    pub fn fail_streams(&self) {
        self.failing.store(true, Ordering::Release);
    }

    /// Makes opening a stream fail until the switch is turned off again.
    #[cfg(test)]
    pub fn fail_open(&self, refuse: bool) {
        self.refusing.store(refuse, Ordering::Release);
    }

    /// Makes releasing a stream take at least the given time.
    #[cfg(test)]
    pub fn slow_close(&self, delay: Duration) {
        *self.close_delay.lock() = delay;
    }
}

impl super::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn open_stream(&self, mut render: RenderCallback) -> Result<Box<dyn OutputStream>, AudioError> {
        if self.refusing.load(Ordering::Acquire) {
            return Err(AudioError::Backend(format!("{} refused the stream", self.name)));
        }

        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        let failed = Arc::new(AtomicBool::new(false));

        let join_handle = {
            let chunk_frames = self.chunk_frames;
            let tick = self.tick;
            let failing = self.failing.clone();
            let failed = failed.clone();
            thread::Builder::new()
                .name(format!("{}-stream", self.name))
                .spawn(move || {
                    let mut chunk = vec![0.0f32; chunk_frames];
                    let mut finished = false;
                    loop {
                        match stop_rx.recv_timeout(tick) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                        }

                        if failing.load(Ordering::Acquire) {
                            failed.store(true, Ordering::Release);
                            continue;
                        }
                        if !finished {
                            finished = render(&mut chunk) == Pull::EndOfStream;
                        }
                    }
                })
                .map_err(|e| AudioError::Backend(e.to_string()))?
        };

        self.opened.fetch_add(1, Ordering::AcqRel);
        debug!(device = self.name, "Mock stream opened.");

        Ok(Box::new(Stream {
            stop_tx,
            join_handle: Some(join_handle),
            failed,
            closed: self.closed.clone(),
            close_delay: *self.close_delay.lock(),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A mock stream backed by a pump thread.
struct Stream {
    stop_tx: Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
    failed: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
    close_delay: Duration,
}

impl OutputStream for Stream {
    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                info!("Mock stream thread panicked.");
            }
        }
        if !self.close_delay.is_zero() {
            thread::sleep(self.close_delay);
        }
        self.closed.fetch_add(1, Ordering::AcqRel);
    }
}
