//! Scripted sound driver for unit tests.
//!
//! Records every call, rounds requests to a configurable parameter space and
//! replays queued read/write results. Unscripted transfers succeed in full.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::driver::{PcmHandle, SoundDriver};
use super::error::{DriverError, DriverResult};
use super::types::{
    Capabilities, Direction, Endpoint, HwParamsInfo, Mode, PcmConfig, PcmState, PollDescriptor,
    SampleFormat,
};

/// Byte pattern written into read buffers.
pub const CAPTURE_FILL: u8 = 0x5a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Capabilities,
    Apply(PcmConfig),
    Current,
    Read,
    Write(usize),
    Prepare,
    Recover,
    Pause(bool),
    Drop,
    Drain,
    Start,
    Close,
}

pub fn xrun() -> DriverError {
    DriverError::new(libc::EPIPE, "Broken pipe")
}

pub fn would_block() -> DriverError {
    DriverError::new(libc::EAGAIN, "Resource temporarily unavailable")
}

pub fn io_error() -> DriverError {
    DriverError::new(libc::EIO, "Input/output error")
}

pub struct FakeState {
    pub caps: Capabilities,
    /// Discrete rates the fake hardware runs at
    pub rates: Vec<u32>,
    pub periods: std::ops::RangeInclusive<u32>,
    pub calls: Vec<Call>,
    pub reads: VecDeque<DriverResult<usize>>,
    pub writes: VecDeque<DriverResult<usize>>,
    pub state: PcmState,
    pub params: Option<HwParamsInfo>,
    pub open_error: Option<DriverError>,
    pub reject: Option<fn(&PcmConfig) -> bool>,
    pub can_pause: bool,
    /// Frames queued for playback; only reported while `stall_drain` is set
    pub pending: usize,
    /// Keep queued frames from ever playing out
    pub stall_drain: bool,
}

#[derive(Clone)]
pub struct FakeDriver {
    shared: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    /// A device that takes nearly anything.
    pub fn new() -> Self {
        Self::with_caps(
            Capabilities {
                formats: SampleFormat::ALL.to_vec(),
                channels: 1..=32,
                rates: 4000..=192000,
                period_sizes: 16..=65536,
            },
            vec![8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 192000],
        )
    }

    /// A small stereo codec: S16_LE/U8, 1-2 channels, 8 kHz or 48 kHz.
    pub fn restricted() -> Self {
        Self::with_caps(
            Capabilities {
                formats: vec![SampleFormat::S16LE, SampleFormat::U8],
                channels: 1..=2,
                rates: 8000..=48000,
                period_sizes: 64..=1024,
            },
            vec![8000, 48000],
        )
    }

    fn with_caps(caps: Capabilities, rates: Vec<u32>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(FakeState {
                caps,
                rates,
                periods: 2..=16,
                calls: Vec::new(),
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                state: PcmState::Open,
                params: None,
                open_error: None,
                reject: None,
                can_pause: true,
                pending: 0,
                stall_drain: false,
            })),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.shared.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.lock().calls.iter().filter(|c| *c == wanted).count()
    }

    pub fn count_writes(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Write(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn script_reads(&self, results: impl IntoIterator<Item = DriverResult<usize>>) {
        self.lock().reads.extend(results);
    }

    pub fn script_writes(&self, results: impl IntoIterator<Item = DriverResult<usize>>) {
        self.lock().writes.extend(results);
    }

    pub fn set_state(&self, state: PcmState) {
        self.lock().state = state;
    }
}

impl SoundDriver for FakeDriver {
    type Handle = FakeHandle;

    fn list_endpoints(&self, direction: Option<Direction>) -> DriverResult<Vec<Endpoint>> {
        let all = vec![
            Endpoint {
                name: "default".to_string(),
                description: Some("Default Audio Device".to_string()),
                direction: None,
            },
            Endpoint {
                name: "hw:0,0".to_string(),
                description: Some("Speakers".to_string()),
                direction: Some(Direction::Playback),
            },
            Endpoint {
                name: "hw:1,0".to_string(),
                description: Some("Microphone".to_string()),
                direction: Some(Direction::Capture),
            },
        ];
        Ok(all
            .into_iter()
            .filter(|e| match (direction, e.direction) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            })
            .collect())
    }

    fn open(&self, name: &str, direction: Direction, _mode: Mode) -> DriverResult<FakeHandle> {
        let mut s = self.lock();
        s.calls.push(Call::Open(name.to_string()));
        if let Some(err) = s.open_error.clone() {
            return Err(err);
        }
        s.state = PcmState::Open;
        s.params = None;
        Ok(FakeHandle {
            shared: self.shared.clone(),
            direction,
        })
    }
}

pub struct FakeHandle {
    shared: Arc<Mutex<FakeState>>,
    direction: Direction,
}

impl FakeHandle {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.shared.lock().unwrap()
    }
}

fn frame_size(params: &Option<HwParamsInfo>) -> usize {
    params
        .as_ref()
        .and_then(|p| p.format.frame_bytes(p.channels))
        .unwrap_or(1)
}

impl PcmHandle for FakeHandle {
    fn query_capabilities(&self) -> DriverResult<Capabilities> {
        let mut s = self.lock();
        s.calls.push(Call::Capabilities);
        Ok(s.caps.clone())
    }

    fn apply_params(&mut self, request: &PcmConfig) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Apply(*request));
        if s.reject.is_some_and(|reject| reject(request)) || !s.caps.supports_format(request.format) {
            return Err(DriverError::new(libc::EINVAL, "Invalid argument"));
        }
        let rate = s
            .rates
            .iter()
            .copied()
            .min_by_key(|r| r.abs_diff(request.rate))
            .unwrap_or(request.rate);
        let channels = request
            .channels
            .clamp(*s.caps.channels.start(), *s.caps.channels.end());
        let period_size = request
            .period_size
            .clamp(*s.caps.period_sizes.start(), *s.caps.period_sizes.end());
        let periods = request.periods.clamp(*s.periods.start(), *s.periods.end());
        let can_pause = s.can_pause;
        s.params = Some(HwParamsInfo {
            format: request.format,
            channels,
            rate,
            period_size,
            periods,
            buffer_size: period_size * periods as usize,
            can_pause,
            can_resume: false,
        });
        s.state = PcmState::Prepared;
        Ok(())
    }

    fn current_params(&self) -> DriverResult<HwParamsInfo> {
        let mut s = self.lock();
        s.calls.push(Call::Current);
        s.params
            .clone()
            .ok_or_else(|| DriverError::new(libc::EBADFD, "File descriptor in bad state"))
    }

    fn read_frames(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        let mut s = self.lock();
        s.calls.push(Call::Read);
        let fs = frame_size(&s.params);
        let capacity = buf.len() / fs;
        let result = s.reads.pop_front().unwrap_or(Ok(capacity));
        match result {
            Ok(n) => {
                let n = n.min(capacity);
                buf[..n * fs].fill(CAPTURE_FILL);
                s.state = PcmState::Running;
                Ok(n)
            }
            Err(e) => {
                if e.is_xrun() {
                    s.state = PcmState::XRun;
                }
                Err(e)
            }
        }
    }

    fn write_frames(&mut self, buf: &[u8]) -> DriverResult<usize> {
        let mut s = self.lock();
        let fs = frame_size(&s.params);
        let frames = buf.len() / fs;
        s.calls.push(Call::Write(frames));
        let result = s.writes.pop_front().unwrap_or(Ok(frames));
        match result {
            Ok(n) => {
                let n = n.min(frames);
                s.state = PcmState::Running;
                s.pending += n;
                Ok(n)
            }
            Err(e) => {
                if e.is_xrun() {
                    s.state = PcmState::XRun;
                }
                Err(e)
            }
        }
    }

    fn state(&self) -> PcmState {
        self.lock().state
    }

    fn prepare(&mut self) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Prepare);
        if s.params.is_none() {
            return Err(DriverError::new(libc::EBADFD, "File descriptor in bad state"));
        }
        s.state = PcmState::Prepared;
        Ok(())
    }

    fn recover(&mut self, err: &DriverError) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Recover);
        if !err.is_xrun() {
            return Err(err.clone());
        }
        s.state = PcmState::Prepared;
        Ok(())
    }

    fn pause(&mut self, enable: bool) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Pause(enable));
        if !s.can_pause {
            return Err(DriverError::new(libc::ENOSYS, "Function not implemented"));
        }
        s.state = if enable {
            PcmState::Paused
        } else {
            PcmState::Running
        };
        Ok(())
    }

    fn drop_frames(&mut self) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Drop);
        s.state = PcmState::Setup;
        s.pending = 0;
        Ok(())
    }

    fn drain(&mut self) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Drain);
        s.state = PcmState::Setup;
        s.pending = 0;
        Ok(())
    }

    fn pending_frames(&self) -> DriverResult<usize> {
        let s = self.lock();
        Ok(if s.stall_drain { s.pending } else { 0 })
    }

    fn start(&mut self) -> DriverResult<()> {
        let mut s = self.lock();
        s.calls.push(Call::Start);
        s.state = PcmState::Running;
        Ok(())
    }

    fn poll_descriptors(&self) -> DriverResult<Vec<PollDescriptor>> {
        let events = match self.direction {
            Direction::Playback => libc::POLLOUT,
            Direction::Capture => libc::POLLIN,
        };
        Ok(vec![PollDescriptor { fd: 7, events }])
    }

    fn close(self) -> DriverResult<()> {
        self.lock().calls.push(Call::Close);
        Ok(())
    }
}
