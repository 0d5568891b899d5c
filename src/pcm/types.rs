//! Value types shared by the stream manager and every driver.
//!
//! Nothing in here touches ALSA directly; conversions to and from the `alsa`
//! crate live in `alsa_device`.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PcmError;

/// Endpoint used when the caller does not name one.
pub const DEFAULT_DEVICE: &str = "default";

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Playback,
    Capture,
}

impl TryFrom<i32> for Direction {
    type Error = PcmError;

    /// ALSA stream codes: 0 = playback, 1 = capture.
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Playback),
            1 => Ok(Self::Capture),
            other => Err(PcmError::InvalidArgument(format!(
                "PCM type must be playback (0) or capture (1), got {}",
                other
            ))),
        }
    }
}

impl FromStr for Direction {
    type Err = PcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playback" => Ok(Self::Playback),
            "capture" => Ok(Self::Capture),
            other => Err(PcmError::InvalidArgument(format!("unknown PCM direction '{}'", other))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => f.write_str("playback"),
            Self::Capture => f.write_str("capture"),
        }
    }
}

/// Open mode of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Blocking I/O.
    #[default]
    Normal,
    /// Reads and writes return immediately when the device is not ready.
    NonBlocking,
    /// Signal-driven notification.
    ///
    /// `AlsaDriver` cannot deliver the signal and opens such a handle in
    /// blocking mode (see `AlsaDriver::opened_mode`); the stream still
    /// reports `Async` as its requested mode.
    Async,
}

impl Mode {
    pub fn is_nonblocking(self) -> bool {
        self == Self::NonBlocking
    }
}

impl TryFrom<i32> for Mode {
    type Error = PcmError;

    /// ALSA open flags: 0 = normal, 1 = `SND_PCM_NONBLOCK`, 2 = `SND_PCM_ASYNC`.
    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Normal),
            1 => Ok(Self::NonBlocking),
            2 => Ok(Self::Async),
            other => Err(PcmError::InvalidArgument(format!("invalid PCM mode {}", other))),
        }
    }
}

impl FromStr for Mode {
    type Err = PcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "nonblock" | "nonblocking" => Ok(Self::NonBlocking),
            "async" => Ok(Self::Async),
            other => Err(PcmError::InvalidArgument(format!("unknown PCM mode '{}'", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::NonBlocking => f.write_str("nonblocking"),
            Self::Async => f.write_str("async"),
        }
    }
}

/// Sample encodings, named and numbered as in `snd_pcm_format_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    #[serde(rename = "S8")]
    S8,
    #[serde(rename = "U8")]
    U8,
    #[serde(rename = "S16_LE")]
    S16LE,
    #[serde(rename = "S16_BE")]
    S16BE,
    #[serde(rename = "U16_LE")]
    U16LE,
    #[serde(rename = "U16_BE")]
    U16BE,
    #[serde(rename = "S24_LE")]
    S24LE,
    #[serde(rename = "S24_BE")]
    S24BE,
    #[serde(rename = "U24_LE")]
    U24LE,
    #[serde(rename = "U24_BE")]
    U24BE,
    #[serde(rename = "S32_LE")]
    S32LE,
    #[serde(rename = "S32_BE")]
    S32BE,
    #[serde(rename = "U32_LE")]
    U32LE,
    #[serde(rename = "U32_BE")]
    U32BE,
    #[serde(rename = "FLOAT_LE")]
    FloatLE,
    #[serde(rename = "FLOAT_BE")]
    FloatBE,
    #[serde(rename = "FLOAT64_LE")]
    Float64LE,
    #[serde(rename = "FLOAT64_BE")]
    Float64BE,
    #[serde(rename = "MU_LAW")]
    MuLaw,
    #[serde(rename = "A_LAW")]
    ALaw,
    #[serde(rename = "IMA_ADPCM")]
    ImaAdpcm,
    #[serde(rename = "MPEG")]
    Mpeg,
    #[serde(rename = "GSM")]
    Gsm,
    #[serde(rename = "S24_3LE")]
    S24_3LE,
    #[serde(rename = "S24_3BE")]
    S24_3BE,
    #[serde(rename = "U24_3LE")]
    U24_3LE,
    #[serde(rename = "U24_3BE")]
    U24_3BE,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 27] = [
        Self::S8,
        Self::U8,
        Self::S16LE,
        Self::S16BE,
        Self::U16LE,
        Self::U16BE,
        Self::S24LE,
        Self::S24BE,
        Self::U24LE,
        Self::U24BE,
        Self::S32LE,
        Self::S32BE,
        Self::U32LE,
        Self::U32BE,
        Self::FloatLE,
        Self::FloatBE,
        Self::Float64LE,
        Self::Float64BE,
        Self::MuLaw,
        Self::ALaw,
        Self::ImaAdpcm,
        Self::Mpeg,
        Self::Gsm,
        Self::S24_3LE,
        Self::S24_3BE,
        Self::U24_3LE,
        Self::U24_3BE,
    ];

    /// Numeric `SND_PCM_FORMAT_*` value.
    pub fn code(self) -> i32 {
        match self {
            Self::S8 => 0,
            Self::U8 => 1,
            Self::S16LE => 2,
            Self::S16BE => 3,
            Self::U16LE => 4,
            Self::U16BE => 5,
            Self::S24LE => 6,
            Self::S24BE => 7,
            Self::U24LE => 8,
            Self::U24BE => 9,
            Self::S32LE => 10,
            Self::S32BE => 11,
            Self::U32LE => 12,
            Self::U32BE => 13,
            Self::FloatLE => 14,
            Self::FloatBE => 15,
            Self::Float64LE => 16,
            Self::Float64BE => 17,
            Self::MuLaw => 20,
            Self::ALaw => 21,
            Self::ImaAdpcm => 22,
            Self::Mpeg => 23,
            Self::Gsm => 24,
            Self::S24_3LE => 32,
            Self::S24_3BE => 33,
            Self::U24_3LE => 34,
            Self::U24_3BE => 35,
        }
    }

    /// ALSA format name, e.g. `S16_LE`.
    pub fn name(self) -> &'static str {
        match self {
            Self::S8 => "S8",
            Self::U8 => "U8",
            Self::S16LE => "S16_LE",
            Self::S16BE => "S16_BE",
            Self::U16LE => "U16_LE",
            Self::U16BE => "U16_BE",
            Self::S24LE => "S24_LE",
            Self::S24BE => "S24_BE",
            Self::U24LE => "U24_LE",
            Self::U24BE => "U24_BE",
            Self::S32LE => "S32_LE",
            Self::S32BE => "S32_BE",
            Self::U32LE => "U32_LE",
            Self::U32BE => "U32_BE",
            Self::FloatLE => "FLOAT_LE",
            Self::FloatBE => "FLOAT_BE",
            Self::Float64LE => "FLOAT64_LE",
            Self::Float64BE => "FLOAT64_BE",
            Self::MuLaw => "MU_LAW",
            Self::ALaw => "A_LAW",
            Self::ImaAdpcm => "IMA_ADPCM",
            Self::Mpeg => "MPEG",
            Self::Gsm => "GSM",
            Self::S24_3LE => "S24_3LE",
            Self::S24_3BE => "S24_3BE",
            Self::U24_3LE => "U24_3LE",
            Self::U24_3BE => "U24_3BE",
        }
    }

    /// Bits one sample occupies in memory, padding included.
    ///
    /// `None` for the compressed stream formats, which have no fixed frame size.
    pub fn physical_bits(self) -> Option<u32> {
        match self {
            Self::ImaAdpcm => Some(4),
            Self::S8 | Self::U8 | Self::MuLaw | Self::ALaw => Some(8),
            Self::S16LE | Self::S16BE | Self::U16LE | Self::U16BE => Some(16),
            Self::S24_3LE | Self::S24_3BE | Self::U24_3LE | Self::U24_3BE => Some(24),
            Self::S24LE
            | Self::S24BE
            | Self::U24LE
            | Self::U24BE
            | Self::S32LE
            | Self::S32BE
            | Self::U32LE
            | Self::U32BE
            | Self::FloatLE
            | Self::FloatBE => Some(32),
            Self::Float64LE | Self::Float64BE => Some(64),
            Self::Mpeg | Self::Gsm => None,
        }
    }

    /// Bytes per interleaved frame, or `None` when the format/channel pair
    /// does not produce whole bytes.
    pub fn frame_bytes(self, channels: u32) -> Option<usize> {
        let bits = self.physical_bits()? * channels;
        if bits == 0 || bits % 8 != 0 {
            return None;
        }
        Some((bits / 8) as usize)
    }
}

impl TryFrom<i32> for SampleFormat {
    type Error = PcmError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.code() == code)
            .ok_or_else(|| PcmError::InvalidArgument(format!("unsupported PCM format code {}", code)))
    }
}

impl FromStr for SampleFormat {
    type Err = PcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| PcmError::InvalidArgument(format!("unknown PCM format '{}'", s)))
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware parameters requested from, or granted by, the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmConfig {
    pub format: SampleFormat,
    pub channels: u32,
    /// Sample rate in Hz
    pub rate: u32,
    /// Frames per period
    pub period_size: usize,
    /// Periods per ring buffer
    pub periods: u32,
}

impl Default for PcmConfig {
    fn default() -> Self {
        Self {
            format: SampleFormat::S16LE,
            channels: 2,
            rate: 44100,
            period_size: 32,
            periods: 4,
        }
    }
}

impl PcmConfig {
    /// Reject zero-valued fields before they reach a driver.
    pub fn validate(&self) -> Result<(), PcmError> {
        let zero = if self.channels == 0 {
            Some("channels")
        } else if self.rate == 0 {
            Some("rate")
        } else if self.period_size == 0 {
            Some("period size")
        } else if self.periods == 0 {
            Some("period count")
        } else {
            None
        };
        match zero {
            Some(field) => Err(PcmError::InvalidArgument(format!("{} must be positive", field))),
            None => Ok(()),
        }
    }
}

/// State reported by the driver for an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmState {
    Open,
    Setup,
    Prepared,
    Running,
    XRun,
    Draining,
    Paused,
    Suspended,
    Disconnected,
}

impl PcmState {
    /// States in which I/O needs a prepare first.
    pub fn needs_prepare(self) -> bool {
        matches!(self, Self::Open | Self::Setup | Self::XRun)
    }

    /// States in which the ring buffer may still hold frames.
    pub fn holds_frames(self) -> bool {
        matches!(self, Self::Prepared | Self::Running | Self::Paused | Self::Draining)
    }
}

impl fmt::Display for PcmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Setup => "SETUP",
            Self::Prepared => "PREPARED",
            Self::Running => "RUNNING",
            Self::XRun => "XRUN",
            Self::Draining => "DRAINING",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// Current hardware parameters as read back from the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwParamsInfo {
    pub format: SampleFormat,
    pub channels: u32,
    pub rate: u32,
    pub period_size: usize,
    pub periods: u32,
    /// Ring buffer size in frames
    pub buffer_size: usize,
    pub can_pause: bool,
    pub can_resume: bool,
}

impl HwParamsInfo {
    pub fn period_time_us(&self) -> u64 {
        frames_to_us(self.period_size, self.rate)
    }

    pub fn buffer_time_us(&self) -> u64 {
        frames_to_us(self.buffer_size, self.rate)
    }

    pub fn config(&self) -> PcmConfig {
        PcmConfig {
            format: self.format,
            channels: self.channels,
            rate: self.rate,
            period_size: self.period_size,
            periods: self.periods,
        }
    }
}

fn frames_to_us(frames: usize, rate: u32) -> u64 {
    if rate == 0 {
        return 0;
    }
    frames as u64 * 1_000_000 / rate as u64
}

/// Parameter space a device advertises before configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub formats: Vec<SampleFormat>,
    pub channels: RangeInclusive<u32>,
    pub rates: RangeInclusive<u32>,
    pub period_sizes: RangeInclusive<usize>,
}

impl Capabilities {
    pub fn supports_format(&self, format: SampleFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Whether a resolved configuration lies inside this space.
    pub fn accepts(&self, config: &PcmConfig) -> bool {
        self.supports_format(config.format)
            && self.channels.contains(&config.channels)
            && self.rates.contains(&config.rate)
            && self.period_sizes.contains(&config.period_size)
    }
}

/// A PCM endpoint the driver can open by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub description: Option<String>,
    /// `None` when the endpoint serves both directions
    pub direction: Option<Direction>,
}

/// One descriptor to poll for readiness, as `(fd, events)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDescriptor {
    pub fd: i32,
    pub events: i16,
}

/// Result of one capture read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResult {
    pub frames: usize,
    /// Exactly `frames * frame_size` bytes of interleaved samples
    pub data: Vec<u8>,
}

impl ReadResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Snapshot used by `info()` and `dump_info()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub device: String,
    pub direction: Direction,
    pub mode: Mode,
    pub state: PcmState,
    pub frame_size: usize,
    pub params: HwParamsInfo,
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.params;
        writeln!(f, "PCM handle name = '{}'", self.device)?;
        writeln!(f, "PCM type = {}", self.direction)?;
        writeln!(f, "PCM mode = {}", self.mode)?;
        writeln!(f, "PCM state = {}", self.state)?;
        writeln!(f, "access type = RW_INTERLEAVED")?;
        writeln!(f, "format = '{}'", p.format)?;
        writeln!(f, "channels = {}", p.channels)?;
        writeln!(f, "rate = {} bps", p.rate)?;
        writeln!(f, "period time = {} us", p.period_time_us())?;
        writeln!(f, "period size = {} frames", p.period_size)?;
        writeln!(f, "buffer time = {} us", p.buffer_time_us())?;
        writeln!(f, "buffer size = {} frames", p.buffer_size)?;
        writeln!(f, "periods per buffer = {}", p.periods)?;
        writeln!(f, "frame size = {} bytes", self.frame_size)?;
        writeln!(f, "can pause = {}", p.can_pause as u8)?;
        write!(f, "can resume = {}", p.can_resume as u8)
    }
}
