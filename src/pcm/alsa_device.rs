//! ALSA implementation of the sound driver traits.

use alsa::device_name::HintIter;
use alsa::pcm::{Access, Format, Frames, HwParams, PCM, State};
use alsa::poll::Descriptors;
use alsa::ValueOr;

use super::driver::{PcmHandle, SoundDriver};
use super::error::{DriverError, DriverResult};
use super::types::{
    Capabilities, Direction, Endpoint, HwParamsInfo, Mode, PcmConfig, PcmState, PollDescriptor,
    SampleFormat,
};

impl From<alsa::Error> for DriverError {
    fn from(e: alsa::Error) -> Self {
        DriverError::new(e.errno(), e.to_string())
    }
}

fn to_alsa_direction(direction: Direction) -> alsa::Direction {
    match direction {
        Direction::Playback => alsa::Direction::Playback,
        Direction::Capture => alsa::Direction::Capture,
    }
}

fn to_alsa_format(format: SampleFormat) -> Format {
    match format {
        SampleFormat::S8 => Format::S8,
        SampleFormat::U8 => Format::U8,
        SampleFormat::S16LE => Format::S16LE,
        SampleFormat::S16BE => Format::S16BE,
        SampleFormat::U16LE => Format::U16LE,
        SampleFormat::U16BE => Format::U16BE,
        SampleFormat::S24LE => Format::S24LE,
        SampleFormat::S24BE => Format::S24BE,
        SampleFormat::U24LE => Format::U24LE,
        SampleFormat::U24BE => Format::U24BE,
        SampleFormat::S32LE => Format::S32LE,
        SampleFormat::S32BE => Format::S32BE,
        SampleFormat::U32LE => Format::U32LE,
        SampleFormat::U32BE => Format::U32BE,
        SampleFormat::FloatLE => Format::FloatLE,
        SampleFormat::FloatBE => Format::FloatBE,
        SampleFormat::Float64LE => Format::Float64LE,
        SampleFormat::Float64BE => Format::Float64BE,
        SampleFormat::MuLaw => Format::MuLaw,
        SampleFormat::ALaw => Format::ALaw,
        SampleFormat::ImaAdpcm => Format::ImaAdPCM,
        SampleFormat::Mpeg => Format::MPEG,
        SampleFormat::Gsm => Format::GSM,
        SampleFormat::S24_3LE => Format::S243LE,
        SampleFormat::S24_3BE => Format::S243BE,
        SampleFormat::U24_3LE => Format::U243LE,
        SampleFormat::U24_3BE => Format::U243BE,
    }
}

fn from_alsa_format(format: Format) -> Option<SampleFormat> {
    SampleFormat::ALL
        .iter()
        .copied()
        .find(|f| to_alsa_format(*f) == format)
}

#[allow(unreachable_patterns)]
fn from_alsa_state(state: State) -> PcmState {
    match state {
        State::Open => PcmState::Open,
        State::Setup => PcmState::Setup,
        State::Prepared => PcmState::Prepared,
        State::Running => PcmState::Running,
        State::XRun => PcmState::XRun,
        State::Draining => PcmState::Draining,
        State::Paused => PcmState::Paused,
        State::Suspended => PcmState::Suspended,
        State::Disconnected => PcmState::Disconnected,
        _ => PcmState::Disconnected,
    }
}

/// Sound driver backed by alsa-lib.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlsaDriver;

impl AlsaDriver {
    /// Mode a handle requested with `mode` is actually opened in.
    ///
    /// The `alsa` crate has no `SND_PCM_ASYNC` signal support, so `Async`
    /// opens blocking.
    pub fn opened_mode(mode: Mode) -> Mode {
        match mode {
            Mode::Async => Mode::Normal,
            other => other,
        }
    }
}

impl SoundDriver for AlsaDriver {
    type Handle = AlsaHandle;

    fn list_endpoints(&self, direction: Option<Direction>) -> DriverResult<Vec<Endpoint>> {
        let hints = HintIter::new_str(None, "pcm")?;
        let endpoints = hints
            .filter_map(|hint| {
                let name = hint.name?;
                let hint_direction = hint.direction.map(|d| match d {
                    alsa::Direction::Playback => Direction::Playback,
                    alsa::Direction::Capture => Direction::Capture,
                });
                // Hints without a direction serve both
                if let (Some(wanted), Some(actual)) = (direction, hint_direction) {
                    if wanted != actual {
                        return None;
                    }
                }
                Some(Endpoint {
                    name,
                    description: hint.desc,
                    direction: hint_direction,
                })
            })
            .collect();
        Ok(endpoints)
    }

    fn open(&self, name: &str, direction: Direction, mode: Mode) -> DriverResult<AlsaHandle> {
        let opened = Self::opened_mode(mode);
        if opened != mode {
            log::warn!(
                "PCM '{}': {} mode is not available, opening in {} mode",
                name,
                mode,
                opened
            );
        }
        let pcm = PCM::new(name, to_alsa_direction(direction), opened.is_nonblocking())?;
        log::debug!("ALSA {}: opened device={} mode={}", direction, name, opened);
        Ok(AlsaHandle {
            pcm,
            name: name.to_string(),
        })
    }
}

/// An open alsa-lib PCM. Dropping it closes the device.
pub struct AlsaHandle {
    pcm: PCM,
    name: String,
}

impl PcmHandle for AlsaHandle {
    fn query_capabilities(&self) -> DriverResult<Capabilities> {
        let hwp = HwParams::any(&self.pcm)?;
        let formats = SampleFormat::ALL
            .iter()
            .copied()
            .filter(|f| hwp.test_format(to_alsa_format(*f)).is_ok())
            .collect();
        Ok(Capabilities {
            formats,
            channels: hwp.get_channels_min()?..=hwp.get_channels_max()?,
            rates: hwp.get_rate_min()?..=hwp.get_rate_max()?,
            period_sizes: hwp.get_period_size_min()? as usize..=hwp.get_period_size_max()? as usize,
        })
    }

    fn apply_params(&mut self, request: &PcmConfig) -> DriverResult<()> {
        // The hardware only takes new parameters while stopped
        if !matches!(self.pcm.state(), State::Open | State::Setup | State::Prepared) {
            self.pcm.drop()?;
        }

        let hwp = HwParams::any(&self.pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(to_alsa_format(request.format))?;
        hwp.set_channels_near(request.channels)?;
        hwp.set_rate_near(request.rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(request.period_size as Frames, ValueOr::Nearest)?;
        if let Err(e) = hwp.set_periods(request.periods, ValueOr::Nearest) {
            log::warn!(
                "ALSA {}: {} periods not supported ({}), keeping the driver's choice",
                self.name,
                request.periods,
                e
            );
        }
        self.pcm.hw_params(&hwp)?;
        Ok(())
    }

    fn current_params(&self) -> DriverResult<HwParamsInfo> {
        let hwp = self.pcm.hw_params_current()?;
        let format = hwp.get_format()?;
        let format = from_alsa_format(format).ok_or_else(|| {
            DriverError::new(libc::EINVAL, format!("unsupported sample format {:?}", format))
        })?;
        Ok(HwParamsInfo {
            format,
            channels: hwp.get_channels()?,
            rate: hwp.get_rate()?,
            period_size: hwp.get_period_size()? as usize,
            periods: hwp.get_periods()?,
            buffer_size: hwp.get_buffer_size()? as usize,
            can_pause: hwp.can_pause(),
            can_resume: hwp.can_resume(),
        })
    }

    fn read_frames(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        Ok(self.pcm.io_bytes().readi(buf)?)
    }

    fn write_frames(&mut self, buf: &[u8]) -> DriverResult<usize> {
        Ok(self.pcm.io_bytes().writei(buf)?)
    }

    fn state(&self) -> PcmState {
        from_alsa_state(self.pcm.state())
    }

    fn prepare(&mut self) -> DriverResult<()> {
        Ok(self.pcm.prepare()?)
    }

    fn recover(&mut self, err: &DriverError) -> DriverResult<()> {
        // snd_pcm_recover takes the negative error code
        Ok(self.pcm.recover(-err.errno, true)?)
    }

    fn pause(&mut self, enable: bool) -> DriverResult<()> {
        Ok(self.pcm.pause(enable)?)
    }

    fn drop_frames(&mut self) -> DriverResult<()> {
        Ok(self.pcm.drop()?)
    }

    fn drain(&mut self) -> DriverResult<()> {
        Ok(self.pcm.drain()?)
    }

    fn pending_frames(&self) -> DriverResult<usize> {
        // snd_pcm_delay can go negative right after an underrun
        Ok(self.pcm.delay()?.max(0) as usize)
    }

    fn start(&mut self) -> DriverResult<()> {
        Ok(self.pcm.start()?)
    }

    fn poll_descriptors(&self) -> DriverResult<Vec<PollDescriptor>> {
        let fds = Descriptors::get(&self.pcm)?;
        Ok(fds
            .iter()
            .map(|p| PollDescriptor {
                fd: p.fd,
                events: p.events,
            })
            .collect())
    }

    fn close(self) -> DriverResult<()> {
        log::debug!("ALSA: closing device={}", self.name);
        // snd_pcm_close runs in PCM's Drop
        drop(self.pcm);
        Ok(())
    }
}
