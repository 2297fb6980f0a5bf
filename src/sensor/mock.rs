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
use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::{LineSource, SensorError};
use crate::shutdown::ShutdownHandle;

/// One scripted step of a mock sensor feed.
pub enum Step {
    /// A line arrives.
    Line(String),
    /// The read times out.
    Timeout,
    /// The transport fails.
    Fail(SensorError),
    /// Runs a check against the world between reads.
    Check(Box<dyn FnOnce() + Send>),
}

/// A sensor feed that plays back a script. Once the script runs out it requests shutdown, or
/// reports the feed closed if it has no shutdown handle.
pub struct Source {
    steps: VecDeque<Step>,
    shutdown: Option<ShutdownHandle>,
    /// Number of reads made so far, shared with the test.
    reads: Arc<Mutex<usize>>,
}

impl Source {
    pub fn new(steps: Vec<Step>) -> Source {
        Source {
            steps: steps.into(),
            shutdown: None,
            reads: Arc::new(Mutex::new(0)),
        }
    }

    /// Requests shutdown once the script is exhausted.
    pub fn shutdown_when_done(mut self, shutdown: ShutdownHandle) -> Source {
        self.shutdown = Some(shutdown);
        self
    }

    /// Returns a counter of the reads made.
    pub fn reads(&self) -> Arc<Mutex<usize>> {
        self.reads.clone()
    }
}

/// Shorthand for a line step.
pub fn line(line: &str) -> Step {
    Step::Line(line.to_string())
}

impl LineSource for Source {
    fn next_line(&mut self) -> Result<Option<String>, SensorError> {
        *self.reads.lock() += 1;
        loop {
            return match self.steps.pop_front() {
                Some(Step::Line(line)) => Ok(Some(line)),
                Some(Step::Timeout) => Ok(None),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Check(check)) => {
                    check();
                    continue;
                }
                None => match &self.shutdown {
                    Some(shutdown) => {
                        shutdown.request();
                        Ok(None)
                    }
                    None => Err(SensorError::Closed),
                },
            };
        }
    }
}
