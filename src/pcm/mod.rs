//! pcm - ALSA PCM stream management
//!
//! Opens playback and capture streams, negotiates hardware parameters
//! (the values granted by the driver are what the stream reports), moves
//! interleaved frames and recovers from overruns and underruns.
//! `PcmWorker` runs a stream on its own thread for async callers.

mod alsa_device;
mod driver;
mod error;
mod stream;
mod types;
mod worker;

#[cfg(test)]
mod fake;

pub use alsa_device::{AlsaDriver, AlsaHandle};
pub use driver::{PcmHandle, SoundDriver};
pub use error::{DriverError, DriverResult, PcmError, Result};
pub use stream::{list_endpoints, PcmStream};
pub use types::{
    Capabilities, Direction, Endpoint, HwParamsInfo, Mode, PcmConfig, PcmState, PollDescriptor,
    ReadResult, SampleFormat, StreamInfo, DEFAULT_DEVICE,
};
pub use worker::{CloseHandle, PcmWorker};

/// A stream on real ALSA hardware.
pub type AlsaPcm = PcmStream<AlsaHandle>;
