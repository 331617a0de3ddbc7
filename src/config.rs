//! Output configuration: pin, sample rate and volume.

use crate::error::ConfigError;
use core::num::NonZeroU32;
use fixed::types::U0F8;

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Identifier of the analog output the sink writes to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalogPin(pub u8);

impl AnalogPin {
    pub const P0: Self = Self(0);
    pub const P1: Self = Self(1);
    pub const P2: Self = Self(2);
}

/// Playback rate in samples per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRate(NonZeroU32);

impl SampleRate {
    pub const DEFAULT: Self = match NonZeroU32::new(8000) {
        Some(rate) => Self(rate),
        None => unreachable!(),
    };

    /// # Errors
    ///
    /// * `ConfigError::ZeroSampleRate` - `hz` is zero.
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        NonZeroU32::new(hz)
            .map(Self)
            .ok_or(ConfigError::ZeroSampleRate)
    }

    #[must_use]
    pub fn hz(&self) -> u32 {
        self.0.get()
    }

    /// Wait between two samples, truncated to whole microseconds.
    /// Rates above 1 MHz give 0.
    #[must_use]
    pub fn period_micros(&self) -> u32 {
        MICROS_PER_SECOND / self.0.get()
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = ConfigError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Self::new(hz)
    }
}

/// Output gain as a fixed-point multiplier out of 256.
///
/// The full level of 255 is slightly below unity, so even at full volume a decoded
/// sample is attenuated by one part in 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(U0F8);

impl Volume {
    pub const MUTE: Self = Self(U0F8::from_bits(0));
    pub const FULL: Self = Self(U0F8::from_bits(u8::MAX));

    /// Any integer is accepted and clamped to [0, 255].
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self(U0F8::from_bits(level.clamp(0, u8::MAX as i32) as u8))
    }

    #[must_use]
    pub fn level(&self) -> u8 {
        self.0.to_bits()
    }

    /// The multiplier as a fixed-point fraction.
    #[must_use]
    pub fn gain(&self) -> U0F8 {
        self.0
    }

    /// `(sample * volume) >> 8`
    #[must_use]
    pub fn scale(&self, sample: u8) -> u8 {
        ((sample as u16 * self.level() as u16) >> 8) as u8
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::FULL
    }
}

impl From<u8> for Volume {
    fn from(level: u8) -> Self {
        Self(U0F8::from_bits(level))
    }
}

/// Everything that shapes how decoded samples reach the sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub output_pin: AnalogPin,
    pub sample_rate: SampleRate,
    pub volume: Volume,
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output_pin(mut self, pin: AnalogPin) -> Self {
        self.output_pin = pin;
        self
    }

    #[must_use]
    pub fn with_sample_rate(mut self, rate: SampleRate) -> Self {
        self.sample_rate = rate;
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volume = volume;
        self
    }
}
