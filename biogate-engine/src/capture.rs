//! Capture devices: one worker thread owns each device handle, so concurrent
//! requests are served one at a time.

use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{EngineError, EngineResult};

/// Camera or scanner backend producing raw capture buffers.
pub trait CaptureSource: Send + 'static {
    /// Acquires the underlying handle. Called lazily before the first capture.
    fn open(&mut self) -> anyhow::Result<()>;

    /// Blocks until one capture buffer is available.
    fn capture(&mut self) -> anyhow::Result<Vec<u8>>;

    fn release(&mut self) {}
}

enum Request {
    Capture {
        reply: Sender<EngineResult<Vec<u8>>>,
        deadline: Instant,
    },
    Release,
    Shutdown,
}

pub struct CaptureDevice {
    name: String,
    timeout: Duration,
    requests: Sender<Request>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Disconnects once the worker thread has returned.
    done: Receiver<()>,
}

impl CaptureDevice {
    /// Starts the device worker. The source is not opened until the first capture.
    pub fn new(
        name: impl Into<String>,
        source: impl CaptureSource,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let name = name.into();
        let (requests, inbox) = unbounded();
        let (exited, done) = bounded::<()>(0);
        let worker_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || {
                let _exited = exited;
                run_worker(worker_name, Box::new(source), inbox)
            })
            .map_err(|err| EngineError::DeviceUnavailable {
                device: name.clone(),
                reason: format!("spawning capture worker: {err}"),
            })?;

        Ok(Self {
            name,
            timeout,
            requests,
            worker: Mutex::new(Some(worker)),
            done,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Captures one buffer, waiting at most the configured timeout (queueing
    /// behind other requests included).
    pub fn capture(&self) -> EngineResult<Vec<u8>> {
        let (reply, answer) = bounded(1);
        let deadline = Instant::now() + self.timeout;
        self.requests
            .send(Request::Capture { reply, deadline })
            .map_err(|_| self.unavailable("device has been shut down"))?;

        match answer.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::CaptureFailed {
                device: self.name.clone(),
                reason: format!("no capture within {} ms", self.timeout.as_millis()),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.unavailable("capture worker stopped"))
            }
        }
    }

    /// Releases the handle; the next capture reopens it.
    pub fn release(&self) {
        let _ = self.requests.send(Request::Release);
    }

    /// Releases the handle and stops the worker. Later captures fail with
    /// `DeviceUnavailable`.
    ///
    /// Waits at most the capture timeout for the worker to finish. A worker
    /// stuck inside the source is detached and releases on its own once the
    /// source returns.
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        match self.done.recv_timeout(self.timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "capture worker for {} still busy after {} ms, detaching",
                    self.name,
                    self.timeout.as_millis()
                );
            }
            _ => {
                if handle.join().is_err() {
                    log::warn!("capture worker for {} panicked", self.name);
                }
            }
        }
    }

    fn unavailable(&self, reason: &str) -> EngineError {
        EngineError::DeviceUnavailable {
            device: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(name: String, mut source: Box<dyn CaptureSource>, inbox: Receiver<Request>) {
    let mut open = false;
    for request in inbox.iter() {
        match request {
            Request::Capture { reply, deadline } => {
                if Instant::now() >= deadline {
                    log::debug!("{name}: dropping capture request that already timed out");
                    continue;
                }
                let result = capture_once(&name, source.as_mut(), &mut open);
                // The requester may have given up waiting.
                let _ = reply.send(result);
            }
            Request::Release => {
                if open {
                    source.release();
                    open = false;
                    log::info!("released capture device {name}");
                }
            }
            Request::Shutdown => break,
        }
    }
    if open {
        source.release();
        log::info!("released capture device {name}");
    }
}

fn capture_once(
    name: &str,
    source: &mut dyn CaptureSource,
    open: &mut bool,
) -> EngineResult<Vec<u8>> {
    if !*open {
        source.open().map_err(|err| EngineError::DeviceUnavailable {
            device: name.to_string(),
            reason: format!("{err:#}"),
        })?;
        *open = true;
        log::info!("opened capture device {name}");
    }
    let buffer = source.capture().map_err(|err| EngineError::CaptureFailed {
        device: name.to_string(),
        reason: format!("{err:#}"),
    })?;
    if buffer.is_empty() {
        return Err(EngineError::CaptureFailed {
            device: name.to_string(),
            reason: "empty capture buffer".into(),
        });
    }
    log::debug!("{name}: captured {} bytes", buffer.len());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        releases: AtomicUsize,
        in_flight: AtomicUsize,
        overlap: AtomicUsize,
    }

    struct SlowSource {
        counters: Arc<Counters>,
        delay: Duration,
        fail_open: bool,
    }

    impl CaptureSource for SlowSource {
        fn open(&mut self) -> anyhow::Result<()> {
            if self.fail_open {
                anyhow::bail!("no such device");
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn capture(&mut self) -> anyhow::Result<Vec<u8>> {
            if self.counters.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.counters.overlap.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }

        fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(counters: &Arc<Counters>, delay_ms: u64) -> SlowSource {
        SlowSource {
            counters: counters.clone(),
            delay: Duration::from_millis(delay_ms),
            fail_open: false,
        }
    }

    #[test]
    fn opens_lazily_and_releases_on_shutdown() {
        let counters = Arc::new(Counters::default());
        let device =
            CaptureDevice::new("scanner", source(&counters, 0), Duration::from_secs(2)).unwrap();
        assert_eq!(counters.opens.load(Ordering::SeqCst), 0);

        assert_eq!(device.capture().unwrap(), vec![1, 2, 3]);
        assert_eq!(device.capture().unwrap(), vec![1, 2, 3]);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);

        device.shutdown();
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            device.capture().unwrap_err().kind(),
            ErrorKind::DeviceUnavailable
        );
    }

    #[test]
    fn concurrent_requests_are_serialised() {
        let counters = Arc::new(Counters::default());
        let device = Arc::new(
            CaptureDevice::new("camera", source(&counters, 20), Duration::from_secs(5)).unwrap(),
        );
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let device = device.clone();
                std::thread::spawn(move || device.capture())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(counters.overlap.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stuck_device_times_out_as_capture_failure() {
        let counters = Arc::new(Counters::default());
        let device =
            CaptureDevice::new("camera", source(&counters, 300), Duration::from_millis(50))
                .unwrap();
        assert_eq!(device.capture().unwrap_err().kind(), ErrorKind::CaptureFailed);
    }

    #[test]
    fn shutdown_does_not_wait_for_a_stuck_device() {
        let counters = Arc::new(Counters::default());
        let device =
            CaptureDevice::new("scanner", source(&counters, 3000), Duration::from_millis(100))
                .unwrap();
        assert_eq!(device.capture().unwrap_err().kind(), ErrorKind::CaptureFailed);

        let started = Instant::now();
        drop(device);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn open_failure_is_device_unavailable() {
        let counters = Arc::new(Counters::default());
        let mut broken = source(&counters, 0);
        broken.fail_open = true;
        let device = CaptureDevice::new("camera", broken, Duration::from_secs(1)).unwrap();
        let err = device.capture().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert!(err.to_string().contains("no such device"));
        // Still unavailable on retry rather than crashing.
        assert_eq!(
            device.capture().unwrap_err().kind(),
            ErrorKind::DeviceUnavailable
        );
    }
}
