//! Runs a `PcmStream` on its own OS thread for async callers.
//!
//! Uses std::thread (NOT tokio tasks) because every read, write and drain
//! blocks on the hardware. Commands arrive over an mpsc channel consumed
//! with `blocking_recv`; each carries a oneshot for its reply.
//!
//! A close raises a shared abort flag before it queues, so a drain already
//! in progress stops waiting and the close is served right after it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use super::driver::PcmHandle;
use super::error::{PcmError, Result};
use super::stream::PcmStream;
use super::types::{Direction, PcmConfig, PcmState, PollDescriptor, ReadResult, StreamInfo};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Read(Reply<ReadResult>),
    Write(Vec<u8>, Reply<usize>),
    Configure(PcmConfig, Reply<PcmConfig>),
    Pause(bool, Reply<()>),
    Drop(Reply<()>),
    Drain(Reply<bool>),
    State(Reply<PcmState>),
    PollDescriptors(Reply<Vec<PollDescriptor>>),
    Info(Reply<StreamInfo>),
    Close(Reply<()>),
}

/// Async front end for one stream. Calls are served in order, one at a time.
pub struct PcmWorker {
    tx: Option<mpsc::Sender<Command>>,
    thread: Option<JoinHandle<()>>,
    abort: Arc<AtomicBool>,
    device: String,
    direction: Direction,
    config: PcmConfig,
    frame_size: usize,
}

/// Closes a worker's stream from another task.
///
/// Does not keep the worker alive: once the worker is gone, `close` is a
/// no-op.
#[derive(Clone)]
pub struct CloseHandle {
    tx: mpsc::WeakSender<Command>,
    abort: Arc<AtomicBool>,
}

impl CloseHandle {
    /// Cut short any drain in progress, then close the stream.
    pub async fn close(&self) -> Result<()> {
        self.abort.store(true, Ordering::SeqCst);
        let Some(tx) = self.tx.upgrade() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = tx.send(Command::Close(reply_tx)).await;
        drop(tx);
        if sent.is_err() {
            return Ok(());
        }
        // A dropped reply means an earlier close already finished the thread
        reply_rx.await.unwrap_or(Ok(()))
    }
}

impl PcmWorker {
    /// Move `stream` onto a thread named `pcm-playback` or `pcm-capture`.
    pub fn spawn<H: PcmHandle + 'static>(stream: PcmStream<H>) -> Result<Self> {
        let device = stream.device().to_string();
        let direction = stream.direction();
        let config = stream.config();
        let frame_size = stream.frame_size();
        let abort = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel::<Command>(8);
        let thread = {
            let abort = abort.clone();
            thread::Builder::new()
                .name(format!("pcm-{}", direction))
                .spawn(move || serve(stream, rx, &abort))
                .map_err(|e| PcmError::Device {
                    device: device.clone(),
                    message: format!("failed to start worker thread: {}", e),
                })?
        };

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            abort,
            device,
            direction,
            config,
            frame_size,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Resolved configuration as of the last successful `configure`.
    pub fn config(&self) -> PcmConfig {
        self.config
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn period_bytes(&self) -> usize {
        self.config.period_size * self.frame_size
    }

    /// Handle for closing the stream while a call on this worker is pending.
    pub fn close_handle(&self) -> Result<CloseHandle> {
        let tx = self.tx.as_ref().ok_or_else(|| self.gone())?;
        Ok(CloseHandle {
            tx: tx.downgrade(),
            abort: self.abort.clone(),
        })
    }

    pub async fn read(&self) -> Result<ReadResult> {
        self.call(Command::Read).await
    }

    pub async fn write(&self, data: Vec<u8>) -> Result<usize> {
        self.call(|reply| Command::Write(data, reply)).await
    }

    pub async fn configure(&mut self, request: PcmConfig) -> Result<PcmConfig> {
        let resolved = self
            .call(|reply| Command::Configure(request, reply))
            .await?;
        self.config = resolved;
        self.frame_size = resolved
            .format
            .frame_bytes(resolved.channels)
            .unwrap_or(self.frame_size);
        Ok(resolved)
    }

    pub async fn pause(&self, enable: bool) -> Result<()> {
        self.call(|reply| Command::Pause(enable, reply)).await
    }

    /// Discard buffered frames.
    pub async fn drop_buffer(&self) -> Result<()> {
        self.call(Command::Drop).await
    }

    /// Wait for buffered frames to play out.
    ///
    /// Returns `false` when a close cut the wait short and the remaining
    /// frames were discarded.
    pub async fn drain(&self) -> Result<bool> {
        self.call(Command::Drain).await
    }

    pub async fn state(&self) -> Result<PcmState> {
        self.call(Command::State).await
    }

    pub async fn poll_descriptors(&self) -> Result<Vec<PollDescriptor>> {
        self.call(Command::PollDescriptors).await
    }

    pub async fn info(&self) -> Result<StreamInfo> {
        self.call(Command::Info).await
    }

    /// Close the stream and wait for the thread to exit.
    ///
    /// A drain still running from an abandoned call is cut short. Closing
    /// twice, or after a `CloseHandle` closed the stream, is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.tx.is_none() {
            return Ok(());
        }
        self.abort.store(true, Ordering::SeqCst);
        let result = self.call(Command::Close).await;
        self.shutdown();
        match result {
            Err(PcmError::InvalidState { .. }) => Ok(()),
            other => other,
        }
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let tx = self.tx.as_ref().ok_or_else(|| self.gone())?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(command(reply_tx)).await.map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> PcmError {
        PcmError::InvalidState {
            device: self.device.clone(),
        }
    }

    fn shutdown(&mut self) {
        // The thread exits once the channel closes
        self.tx.take();
        if let Some(h) = self.thread.take() {
            if h.join().is_err() {
                log::error!("PCM {}: worker thread panicked", self.device);
            }
        }
    }
}

impl Drop for PcmWorker {
    fn drop(&mut self) {
        // Stop any drain in flight so the join below waits at most one call
        self.abort.store(true, Ordering::SeqCst);
        self.shutdown();
    }
}

fn serve<H: PcmHandle>(mut stream: PcmStream<H>, mut rx: mpsc::Receiver<Command>, abort: &AtomicBool) {
    log::debug!("PCM {}: worker started", stream.device());
    while let Some(command) = rx.blocking_recv() {
        // A caller that gave up on its reply is not an error
        match command {
            Command::Read(reply) => {
                let _ = reply.send(stream.read());
            }
            Command::Write(data, reply) => {
                let _ = reply.send(stream.write(&data));
            }
            Command::Configure(request, reply) => {
                let _ = reply.send(stream.configure(request));
            }
            Command::Pause(enable, reply) => {
                let _ = reply.send(stream.pause(enable));
            }
            Command::Drop(reply) => {
                let _ = reply.send(stream.drop());
            }
            Command::Drain(reply) => {
                let _ = reply.send(stream.drain_or_abort(abort));
            }
            Command::State(reply) => {
                let _ = reply.send(stream.state());
            }
            Command::PollDescriptors(reply) => {
                let _ = reply.send(stream.poll_descriptors());
            }
            Command::Info(reply) => {
                let _ = reply.send(stream.info());
            }
            Command::Close(reply) => {
                let _ = reply.send(stream.close());
                break;
            }
        }
    }
    log::debug!("PCM {}: worker stopped", stream.device());
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pcm::fake::{Call, FakeDriver, CAPTURE_FILL};
    use crate::pcm::types::Mode;

    fn spawn(driver: &FakeDriver, direction: Direction) -> PcmWorker {
        let stream =
            PcmStream::open(driver, direction, Mode::Normal, None, PcmConfig::default()).unwrap();
        PcmWorker::spawn(stream).unwrap()
    }

    #[tokio::test]
    async fn test_playback_round_trip() {
        let driver = FakeDriver::new();
        let mut worker = spawn(&driver, Direction::Playback);
        assert_eq!(worker.frame_size(), 4);

        assert_eq!(worker.write(vec![0u8; 16]).await.unwrap(), 4);
        worker.pause(true).await.unwrap();
        assert_eq!(worker.info().await.unwrap().state, PcmState::Paused);
        worker.pause(false).await.unwrap();
        worker.drop_buffer().await.unwrap();
        assert!(worker.drain().await.unwrap());

        worker.close().await.unwrap();
        assert_eq!(driver.count(&Call::Close), 1);
        assert!(matches!(
            worker.write(vec![0u8; 4]).await,
            Err(PcmError::InvalidState { .. })
        ));
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_and_poll_descriptors() {
        let driver = FakeDriver::new();
        let worker = spawn(&driver, Direction::Playback);
        assert_eq!(worker.state().await.unwrap(), PcmState::Prepared);
        worker.write(vec![0u8; 16]).await.unwrap();
        assert_eq!(worker.state().await.unwrap(), PcmState::Running);
        let fds = worker.poll_descriptors().await.unwrap();
        assert_eq!(fds, vec![PollDescriptor { fd: 7, events: libc::POLLOUT }]);
    }

    #[tokio::test]
    async fn test_close_cuts_blocked_drain_short() {
        let driver = FakeDriver::new();
        driver.lock().stall_drain = true;
        let mut worker = spawn(&driver, Direction::Playback);
        worker.write(vec![0u8; 64]).await.unwrap();
        let closer = worker.close_handle().unwrap();

        let both = async {
            tokio::join!(worker.drain(), async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                closer.close().await
            })
        };
        let (drained, closed) = tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("drain was not interrupted by close");

        assert!(!drained.unwrap());
        closed.unwrap();
        let calls = driver.calls();
        assert_eq!(&calls[calls.len() - 2..], &[Call::Drop, Call::Close]);
        assert_eq!(driver.count(&Call::Drain), 0);

        assert!(matches!(worker.state().await, Err(PcmError::InvalidState { .. })));
        worker.close().await.unwrap();
        closer.close().await.unwrap();
        assert_eq!(driver.count(&Call::Close), 1);
    }

    #[tokio::test]
    async fn test_configure_updates_cached_config() {
        let driver = FakeDriver::new();
        let mut worker = spawn(&driver, Direction::Playback);
        let resolved = worker
            .configure(PcmConfig {
                channels: 1,
                rate: 47000,
                ..PcmConfig::default()
            })
            .await
            .unwrap();
        assert_eq!(resolved.rate, 48000);
        assert_eq!(worker.config(), resolved);
        assert_eq!(worker.frame_size(), 2);
        assert_eq!(worker.period_bytes(), 64);
    }

    #[tokio::test]
    async fn test_capture_read() {
        let driver = FakeDriver::new();
        let worker = spawn(&driver, Direction::Capture);
        let result = worker.read().await.unwrap();
        assert_eq!(result.frames, 32);
        assert!(result.data.iter().all(|b| *b == CAPTURE_FILL));
        assert!(matches!(
            worker.write(vec![0u8; 4]).await,
            Err(PcmError::Direction { .. })
        ));
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let driver = FakeDriver::new();
        let worker = spawn(&driver, Direction::Playback);
        assert!(matches!(
            worker.write(vec![0u8; 3]).await,
            Err(PcmError::Alignment { len: 3, frame_size: 4 })
        ));
    }

    #[test]
    fn test_drop_closes_stream() {
        let driver = FakeDriver::new();
        let worker = spawn(&driver, Direction::Capture);
        assert_eq!(worker.device(), "default");
        assert_eq!(worker.direction(), Direction::Capture);
        drop(worker);
        assert_eq!(driver.count(&Call::Close), 1);
    }
}
