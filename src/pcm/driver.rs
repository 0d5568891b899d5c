//! Sound driver abstraction
//!
//! `PcmStream` talks to hardware only through these two traits. The ALSA
//! implementation lives in `alsa_device`; tests substitute a scripted fake.
//!
//! All calls are thin: a driver does no retrying and no recovery of its own.
//! Retry and recovery policy belongs to the stream manager.

use super::error::{DriverError, DriverResult};
use super::types::{
    Capabilities, Direction, Endpoint, HwParamsInfo, Mode, PcmConfig, PcmState, PollDescriptor,
};

/// Opens PCM handles.
pub trait SoundDriver {
    type Handle: PcmHandle;

    /// PCM endpoints usable in `direction` (all of them for `None`).
    fn list_endpoints(&self, direction: Option<Direction>) -> DriverResult<Vec<Endpoint>>;

    /// Open `name` for `direction`. The handle is unconfigured.
    fn open(&self, name: &str, direction: Direction, mode: Mode) -> DriverResult<Self::Handle>;
}

/// One open hardware stream.
///
/// The handle is released exactly once, either by `close` or when dropped.
pub trait PcmHandle: Send {
    /// Full parameter space of the device.
    fn query_capabilities(&self) -> DriverResult<Capabilities>;

    /// Apply interleaved access plus `request`, letting the driver round
    /// channels, rate, period size and period count to the nearest values
    /// it supports. Either the whole set is installed or none of it.
    fn apply_params(&mut self, request: &PcmConfig) -> DriverResult<()>;

    /// Parameters actually installed.
    fn current_params(&self) -> DriverResult<HwParamsInfo>;

    /// Interleaved read filling at most `buf`; returns frames read.
    fn read_frames(&mut self, buf: &mut [u8]) -> DriverResult<usize>;

    /// Interleaved write of all of `buf`; returns frames written.
    fn write_frames(&mut self, buf: &[u8]) -> DriverResult<usize>;

    fn state(&self) -> PcmState;

    fn prepare(&mut self) -> DriverResult<()>;

    /// Driver recovery primitive for `err` (xrun, suspend), silent.
    fn recover(&mut self, err: &DriverError) -> DriverResult<()>;

    fn pause(&mut self, enable: bool) -> DriverResult<()>;

    /// Stop immediately, discarding pending frames.
    fn drop_frames(&mut self) -> DriverResult<()>;

    /// Block until pending frames have been played.
    fn drain(&mut self) -> DriverResult<()>;

    /// Frames written but not yet heard.
    fn pending_frames(&self) -> DriverResult<usize>;

    /// Start a prepared stream explicitly.
    fn start(&mut self) -> DriverResult<()>;

    fn poll_descriptors(&self) -> DriverResult<Vec<PollDescriptor>>;

    fn close(self) -> DriverResult<()>
    where
        Self: Sized;
}
