//! PCM stream manager: parameter negotiation and frame transfer.
//!
//! `PcmStream` owns one driver handle. Every (re)configuration reads the
//! installed parameters back from the driver, so the accessors always report
//! what the hardware granted rather than what was asked for.
//!
//! Transfer policy:
//! - capture overrun: prepare, return an empty read; the next call proceeds
//! - playback underrun: driver recovery, then exactly one retry
//! - would-block: zero frames, not an error

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use super::driver::{PcmHandle, SoundDriver};
use super::error::{PcmError, Result};
use super::types::{
    Capabilities, Direction, Endpoint, Mode, PcmConfig, PcmState, PollDescriptor, ReadResult,
    SampleFormat, StreamInfo, DEFAULT_DEVICE,
};

/// Interval between buffer checks in `drain_or_abort`.
const DRAIN_POLL: Duration = Duration::from_millis(10);

fn closed(device: &str) -> PcmError {
    PcmError::InvalidState {
        device: device.to_string(),
    }
}

/// PCM endpoints the driver offers for `direction`.
pub fn list_endpoints<D: SoundDriver>(
    driver: &D,
    direction: Option<Direction>,
) -> Result<Vec<Endpoint>> {
    driver
        .list_endpoints(direction)
        .map_err(|e| PcmError::device("pcm hints", e))
}

/// One open playback or capture stream.
pub struct PcmStream<H: PcmHandle> {
    handle: Option<H>,
    direction: Direction,
    mode: Mode,
    device: String,
    /// Last configuration the driver accepted
    config: PcmConfig,
    /// Bytes per frame for `config`; 0 until the first negotiation succeeds
    frame_size: usize,
}

impl<H: PcmHandle> PcmStream<H> {
    /// Open `device` (or `"default"`) and configure it with `config`.
    ///
    /// The returned stream reports the values the hardware granted, which may
    /// differ from `config`. If configuration fails the handle is closed
    /// again before the error is returned.
    pub fn open<D>(
        driver: &D,
        direction: Direction,
        mode: Mode,
        device: Option<&str>,
        config: PcmConfig,
    ) -> Result<Self>
    where
        D: SoundDriver<Handle = H>,
    {
        let device = device.unwrap_or(DEFAULT_DEVICE);
        if device.is_empty() {
            return Err(PcmError::InvalidArgument("device name is empty".to_string()));
        }
        config.validate()?;

        let handle = driver
            .open(device, direction, mode)
            .map_err(|e| PcmError::device(device, e))?;

        let mut stream = Self {
            handle: Some(handle),
            direction,
            mode,
            device: device.to_string(),
            config,
            frame_size: 0,
        };

        if let Err(e) = stream.check_format(&config).and_then(|_| stream.negotiate(&config)) {
            stream.release();
            return Err(e);
        }

        log::info!(
            "PCM {}: device={}, format={}, rate={}, channels={}, period_size={}, periods={}",
            direction,
            stream.device,
            stream.config.format,
            stream.config.rate,
            stream.config.channels,
            stream.config.period_size,
            stream.config.periods,
        );

        Ok(stream)
    }

    /// Re-negotiate all parameters.
    ///
    /// The resolved values stay as they were on failure. A request rejected
    /// before it reaches the driver leaves the hardware untouched; one the
    /// driver refused gets the previous configuration re-applied.
    pub fn configure(&mut self, request: PcmConfig) -> Result<PcmConfig> {
        request.validate()?;
        if self.handle.is_none() {
            return Err(closed(&self.device));
        }
        self.check_format(&request)?;
        match self.negotiate(&request) {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                self.restore();
                Err(e)
            }
        }
    }

    pub fn set_channels(&mut self, channels: u32) -> Result<u32> {
        let request = PcmConfig {
            channels,
            ..self.config
        };
        Ok(self.configure(request)?.channels)
    }

    pub fn set_rate(&mut self, rate: u32) -> Result<u32> {
        let request = PcmConfig { rate, ..self.config };
        Ok(self.configure(request)?.rate)
    }

    pub fn set_format(&mut self, format: SampleFormat) -> Result<SampleFormat> {
        let request = PcmConfig {
            format,
            ..self.config
        };
        Ok(self.configure(request)?.format)
    }

    pub fn set_period_size(&mut self, period_size: usize) -> Result<usize> {
        let request = PcmConfig {
            period_size,
            ..self.config
        };
        Ok(self.configure(request)?.period_size)
    }

    pub fn set_periods(&mut self, periods: u32) -> Result<u32> {
        let request = PcmConfig {
            periods,
            ..self.config
        };
        Ok(self.configure(request)?.periods)
    }

    /// Reject a format outside the device's capability space.
    fn check_format(&self, request: &PcmConfig) -> Result<()> {
        let handle = self.handle.as_ref().ok_or_else(|| closed(&self.device))?;
        let caps = handle
            .query_capabilities()
            .map_err(|e| PcmError::configuration(&self.device, e.to_string()))?;
        if !caps.supports_format(request.format) {
            return Err(PcmError::configuration(
                &self.device,
                format!("sample format {} is not supported", request.format),
            ));
        }
        Ok(())
    }

    /// Apply `request`, then read back what the driver installed.
    fn negotiate(&mut self, request: &PcmConfig) -> Result<PcmConfig> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;

        handle
            .apply_params(request)
            .map_err(|e| PcmError::configuration(&self.device, e.to_string()))?;

        let resolved = handle
            .current_params()
            .map_err(|e| PcmError::configuration(&self.device, e.to_string()))?
            .config();
        let frame_size = resolved
            .format
            .frame_bytes(resolved.channels)
            .ok_or_else(|| {
                PcmError::configuration(
                    &self.device,
                    format!(
                        "{} with {} channel(s) has no whole-byte frame size",
                        resolved.format, resolved.channels
                    ),
                )
            })?;

        if resolved != *request {
            log::debug!(
                "PCM {}: requested {:?}, granted {:?}",
                self.device,
                request,
                resolved
            );
        }

        self.config = resolved;
        self.frame_size = frame_size;
        Ok(resolved)
    }

    /// Put the last good parameters back after a failed negotiation.
    fn restore(&mut self) {
        if self.frame_size == 0 {
            return;
        }
        let good = self.config;
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.apply_params(&good) {
                log::warn!(
                    "PCM {}: failed to restore previous configuration: {}",
                    self.device,
                    e
                );
            }
        }
    }

    /// Read one period of interleaved frames from a capture stream.
    ///
    /// Returns zero frames on overrun (after preparing the device) and when a
    /// non-blocking stream has nothing ready.
    pub fn read(&mut self) -> Result<ReadResult> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        if self.direction != Direction::Capture {
            return Err(PcmError::Direction {
                op: "read from",
                direction: self.direction,
            });
        }

        if handle.state().needs_prepare() {
            handle
                .prepare()
                .map_err(|e| PcmError::device(&self.device, e))?;
        }

        let period = self.config.period_size;
        let mut buf = vec![0u8; period * self.frame_size];
        match handle.read_frames(&mut buf) {
            Ok(frames) => {
                let frames = frames.min(period);
                buf.truncate(frames * self.frame_size);
                Ok(ReadResult { frames, data: buf })
            }
            Err(e) if e.is_xrun() => {
                log::warn!("PCM {}: capture overrun, preparing", self.device);
                handle
                    .prepare()
                    .map_err(|e| PcmError::device(&self.device, e))?;
                Ok(ReadResult::empty())
            }
            Err(e) if e.would_block() => Ok(ReadResult::empty()),
            Err(e) => Err(PcmError::device(&self.device, e)),
        }
    }

    /// Write interleaved frames to a playback stream.
    ///
    /// `data` must hold whole frames. Returns the frames the driver accepted,
    /// which is 0 when a non-blocking stream is full.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        if self.direction != Direction::Playback {
            return Err(PcmError::Direction {
                op: "write to",
                direction: self.direction,
            });
        }
        if data.len() % self.frame_size != 0 {
            return Err(PcmError::Alignment {
                len: data.len(),
                frame_size: self.frame_size,
            });
        }
        if data.is_empty() {
            return Ok(0);
        }

        if handle.state().needs_prepare() {
            handle
                .prepare()
                .map_err(|e| PcmError::device(&self.device, e))?;
        }

        match handle.write_frames(data) {
            Ok(frames) => Ok(frames),
            Err(e) if e.would_block() => Ok(0),
            Err(e) if e.is_xrun() => {
                log::warn!("PCM {}: playback underrun, recovering", self.device);
                handle
                    .recover(&e)
                    .map_err(|e| PcmError::device(&self.device, e))?;
                match handle.write_frames(data) {
                    Ok(frames) => Ok(frames),
                    Err(e) if e.would_block() => Ok(0),
                    Err(e) => Err(PcmError::device(&self.device, e)),
                }
            }
            Err(e) => Err(PcmError::device(&self.device, e)),
        }
    }

    pub fn pause(&mut self, enable: bool) -> Result<()> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        handle
            .pause(enable)
            .map_err(|e| PcmError::device(&self.device, e))
    }

    /// Stop immediately and discard buffered frames.
    pub fn drop(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        handle
            .drop_frames()
            .map_err(|e| PcmError::device(&self.device, e))
    }

    /// Block until every buffered frame has been played.
    pub fn drain(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        handle
            .drain()
            .map_err(|e| PcmError::device(&self.device, e))
    }

    /// Play out buffered frames unless `abort` is raised first.
    ///
    /// Polls the driver instead of blocking in it, so another thread can cut
    /// the wait short; on abort the remaining frames are dropped. Returns
    /// whether the buffer played out. Capture streams drain directly.
    pub fn drain_or_abort(&mut self, abort: &AtomicBool) -> Result<bool> {
        let handle = self.handle.as_mut().ok_or_else(|| closed(&self.device))?;
        if self.direction == Direction::Capture {
            handle
                .drain()
                .map_err(|e| PcmError::device(&self.device, e))?;
            return Ok(true);
        }

        if handle.state() == PcmState::Prepared {
            let pending = handle
                .pending_frames()
                .map_err(|e| PcmError::device(&self.device, e))?;
            if pending > 0 {
                handle
                    .start()
                    .map_err(|e| PcmError::device(&self.device, e))?;
            }
        }

        let mut played_out = true;
        while matches!(handle.state(), PcmState::Running | PcmState::Draining) {
            if abort.load(Ordering::SeqCst) {
                log::info!("PCM {}: drain aborted", self.device);
                played_out = false;
                break;
            }
            let pending = handle
                .pending_frames()
                .map_err(|e| PcmError::device(&self.device, e))?;
            if pending == 0 {
                break;
            }
            thread::sleep(DRAIN_POLL);
        }

        // Nothing audible is left, or the caller gave up on it
        handle
            .drop_frames()
            .map_err(|e| PcmError::device(&self.device, e))?;
        Ok(played_out)
    }

    /// Drain (playback) and release the device. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        if self.direction == Direction::Playback && handle.state().holds_frames() {
            if let Err(e) = handle.drain() {
                log::warn!("PCM {}: drain before close failed: {}", self.device, e);
            }
        }
        handle
            .close()
            .map_err(|e| PcmError::device(&self.device, e))?;
        log::info!("PCM {}: closed", self.device);
        Ok(())
    }

    /// Close without draining; used when the stream never became usable.
    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                log::warn!("PCM {}: close failed: {}", self.device, e);
            }
        }
    }

    pub fn state(&self) -> Result<PcmState> {
        let handle = self.handle.as_ref().ok_or_else(|| closed(&self.device))?;
        Ok(handle.state())
    }

    pub fn capabilities(&self) -> Result<Capabilities> {
        let handle = self.handle.as_ref().ok_or_else(|| closed(&self.device))?;
        handle
            .query_capabilities()
            .map_err(|e| PcmError::device(&self.device, e))
    }

    pub fn poll_descriptors(&self) -> Result<Vec<PollDescriptor>> {
        let handle = self.handle.as_ref().ok_or_else(|| closed(&self.device))?;
        handle
            .poll_descriptors()
            .map_err(|e| PcmError::device(&self.device, e))
    }

    /// Current hardware parameters, queried fresh from the driver.
    pub fn info(&self) -> Result<StreamInfo> {
        let handle = self.handle.as_ref().ok_or_else(|| closed(&self.device))?;
        let params = handle
            .current_params()
            .map_err(|e| PcmError::device(&self.device, e))?;
        Ok(StreamInfo {
            device: self.device.clone(),
            direction: self.direction,
            mode: self.mode,
            state: handle.state(),
            frame_size: self.frame_size,
            params,
        })
    }

    /// `info()` as a multi-line `key = value` listing.
    pub fn dump_info(&self) -> Result<String> {
        Ok(self.info()?.to_string())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn config(&self) -> PcmConfig {
        self.config
    }

    pub fn channels(&self) -> u32 {
        self.config.channels
    }

    pub fn rate(&self) -> u32 {
        self.config.rate
    }

    pub fn format(&self) -> SampleFormat {
        self.config.format
    }

    pub fn period_size(&self) -> usize {
        self.config.period_size
    }

    pub fn periods(&self) -> u32 {
        self.config.periods
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes in one period.
    pub fn period_bytes(&self) -> usize {
        self.config.period_size * self.frame_size
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl<H: PcmHandle> Drop for PcmStream<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("PCM {}: {}", self.device, e);
        }
    }
}
