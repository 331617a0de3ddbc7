//! kaas decodes 4-bit KAAS ADPCM streams into 8-bit PCM and paces the samples out to an
//! analog output.
//!
//! The codec, buffer queue and playback state machine are `no_std` and only need
//! `alloc`, so they run on a microcontroller driven by a hardware timer. With the
//! `player` feature (enabled by default) a [`player::Player`] runs the same engine as a
//! background tokio task controlled through messages.
//!
//! # Examples
//!
//! Decode a buffer.
//! ```
//! use kaas::Decoder;
//!
//! let mut decoder = Decoder::new();
//! let pcm = decoder.decode_buffer(&[0x08, 0x80]);
//! assert_eq!(pcm.len(), 4);
//! for sample in pcm {
//!     println!("{sample}");
//! }
//! ```
#![cfg_attr(not(any(test, feature = "player")), no_std)]
extern crate alloc;

pub mod config;
pub mod decoder;
pub mod engine;
mod error;
#[cfg(feature = "player")]
pub mod player;
pub mod queue;

pub use config::{AnalogPin, PlayerConfig, SampleRate, Volume};
pub use decoder::{pcm_to_q15, Decoder, DecoderState, NibbleCursor, I1F15};
pub use engine::{OutputSink, PlaybackEngine, PlaybackState, Timer};
#[cfg(feature = "player")]
pub use error::PlayerError;
pub use error::{ConfigError, DecodeError};
pub use queue::BufferQueue;
