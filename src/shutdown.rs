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
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// A shutdown handle is shared between the interrupt handler and the control loop. It's the control
/// loop's responsibility to check it between reads and wind down when it's set.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Creates a new shutdown handle.
    pub fn new() -> ShutdownHandle {
        ShutdownHandle::default()
    }

    /// Requests shutdown. Requesting more than once has no further effect.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns true if shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Waits for the control loop, requesting shutdown if the interrupt fires first. A failure to
/// listen for interrupts leaves the control loop running.
pub async fn supervise<T, F>(
    mut control: JoinHandle<T>,
    interrupt: F,
    shutdown: &ShutdownHandle,
) -> Result<T, JoinError>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        result = &mut control => return result,
        signal = interrupt => match signal {
            Ok(()) => {
                info!("Interrupted, shutting down.");
                shutdown.request();
            }
            Err(e) => error!(
                err = %e,
                "Unable to listen for interrupts, running until the sensor feed ends."
            ),
        },
    }

    control.await
}

#[cfg(test)]
mod test {
    use std::{future, thread, time::Duration};

    use super::*;

    #[test]
    fn test_shutdown_handle() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());

        let join = {
            let handle = handle.clone();
            thread::spawn(move || handle.request())
        };
        assert!(join.join().is_ok());

        assert!(handle.is_requested());
        handle.request();
        assert!(handle.is_requested());
    }

    fn wait_for_shutdown(handle: &ShutdownHandle) -> JoinHandle<bool> {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..200 {
                if handle.is_requested() {
                    return true;
                }
                thread::sleep(Duration::from_millis(5));
            }
            false
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interrupt_requests_shutdown() {
        let handle = ShutdownHandle::new();
        let control = wait_for_shutdown(&handle);

        let stopped = supervise(control, async { io::Result::Ok(()) }, &handle).await.unwrap();
        assert!(stopped);
        assert!(handle.is_requested());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_listener_failure_keeps_running() {
        let handle = ShutdownHandle::new();
        let control = wait_for_shutdown(&handle);

        let stopped = supervise(
            control,
            async { io::Result::<()>::Err(io::Error::other("no signal support")) },
            &handle,
        )
        .await
        .unwrap();
        assert!(!stopped);
        assert!(!handle.is_requested());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_control_finishing_first() {
        let handle = ShutdownHandle::new();
        let control = tokio::task::spawn_blocking(|| 7);

        assert_eq!(7, supervise(control, future::pending::<io::Result<()>>(), &handle).await.unwrap());
        assert!(!handle.is_requested());
    }
}
