//! alsapcm - PCM playback and capture on ALSA
//!
//! ```no_run
//! use alsapcm::{AlsaDriver, AlsaPcm, Direction, Mode, PcmConfig};
//!
//! let mut pcm = AlsaPcm::open(&AlsaDriver, Direction::Playback, Mode::Normal, None, PcmConfig::default())?;
//! let silence = vec![0u8; pcm.period_bytes()];
//! pcm.write(&silence)?;
//! pcm.close()?;
//! # Ok::<(), alsapcm::PcmError>(())
//! ```

pub mod config;
pub mod pcm;

pub use pcm::{
    list_endpoints, AlsaDriver, AlsaPcm, Capabilities, CloseHandle, Direction, Endpoint, Mode,
    PcmConfig, PcmError, PcmState, PcmStream, PcmWorker, ReadResult, SampleFormat, StreamInfo,
};
