//! Playback engine.
//!
//! [`PlaybackEngine`] turns queued KAAS buffers into a paced stream of 8-bit levels.
//! It does no waiting of its own: [`PlaybackEngine::next_sample`] writes one sample and
//! reports how long the caller must wait before the next one. That keeps the engine
//! usable from a bare-metal loop ([`PlaybackEngine::run_until_idle`]) as well as from
//! the async worker in [`crate::player`].
//!
//! # Examples
//!
//! ```
//! use kaas::{AnalogPin, OutputSink, PlaybackEngine, PlayerConfig, Timer};
//!
//! struct Levels(Vec<u8>);
//!
//! impl OutputSink for Levels {
//!     fn write(&mut self, _pin: AnalogPin, level: u8) {
//!         self.0.push(level);
//!     }
//! }
//!
//! struct NoWait;
//!
//! impl Timer for NoWait {
//!     fn wait_micros(&mut self, _micros: u32) {}
//! }
//!
//! let mut engine = PlaybackEngine::new(Levels(Vec::new()), PlayerConfig::default());
//! engine.play(vec![0x00, 0xFF]);
//! assert_eq!(engine.run_until_idle(&mut NoWait), 4);
//! assert_eq!(engine.sink().0.len(), 4);
//! ```

use crate::config::{AnalogPin, PlayerConfig, SampleRate, Volume};
use crate::decoder::{Decoder, DecoderState, NibbleCursor};
use crate::queue::BufferQueue;
use alloc::vec::Vec;
use arbitrary_int::u4;
use tracing::{debug, trace};

/// Destination of the paced output levels.
pub trait OutputSink {
    /// Set the instantaneous analog level of `pin`. Must not block.
    fn write(&mut self, pin: AnalogPin, level: u8);
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write(&mut self, pin: AnalogPin, level: u8) {
        (**self).write(pin, level)
    }
}

/// Blocking microsecond delay.
pub trait Timer {
    fn wait_micros(&mut self, micros: u32);
}

impl<T: Timer + ?Sized> Timer for &mut T {
    fn wait_micros(&mut self, micros: u32) {
        (**self).wait_micros(micros)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing is being played. The queue may still hold buffers.
    #[default]
    Idle,
    /// Samples are being produced.
    Playing,
    /// Suspended mid-stream; playhead and decoder state are kept.
    Paused,
}

/// The buffer currently being played and how far into it we are.
#[derive(Debug)]
struct Playhead {
    buffer: Vec<u8>,
    cursor: NibbleCursor,
}

impl Playhead {
    fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            cursor: NibbleCursor::new(),
        }
    }

    fn next_nibble(&mut self) -> Option<u4> {
        self.cursor.next_nibble(&self.buffer)
    }
}

/// Queue, decoder and output state of one audio session.
#[derive(Debug)]
pub struct PlaybackEngine<S> {
    sink: S,
    decoder: Decoder,
    queue: BufferQueue,
    playhead: Option<Playhead>,
    state: PlaybackState,
    config: PlayerConfig,
}

impl<S: OutputSink> PlaybackEngine<S> {
    pub fn new(sink: S, config: PlayerConfig) -> Self {
        Self {
            sink,
            decoder: Decoder::new(),
            queue: BufferQueue::new(),
            playhead: None,
            state: PlaybackState::Idle,
            config,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Buffers not yet started. The buffer being played is not counted.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Queue `buffer` and start playing if idle.
    pub fn play(&mut self, buffer: impl Into<Vec<u8>>) {
        self.queue(buffer);
    }

    /// Append `buffer` to the queue. An idle engine starts playing; a paused one stays paused.
    pub fn queue(&mut self, buffer: impl Into<Vec<u8>>) {
        let buffer = buffer.into();
        trace!(len = buffer.len(), queued = self.queue.len(), "buffer queued");
        self.queue.enqueue(buffer);
        if self.state == PlaybackState::Idle {
            self.transition(PlaybackState::Playing);
        }
    }

    /// Suspend playback. Only effective while playing.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.transition(PlaybackState::Paused);
        }
    }

    /// Continue from the next unplayed nibble. Only effective while paused.
    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        if self.playhead.is_some() || !self.queue.is_empty() {
            self.transition(PlaybackState::Playing);
        } else {
            self.transition(PlaybackState::Idle);
        }
    }

    /// Drop everything, silence the output and reset the decoder.
    pub fn stop(&mut self) {
        let discarded = self.queue.clear();
        self.playhead = None;
        self.sink.write(self.config.output_pin, 0);
        self.decoder.reset();
        debug!(discarded, "playback stopped");
        self.transition(PlaybackState::Idle);
    }

    /// Discard pending buffers. The buffer being played is not affected.
    pub fn clear_queue(&mut self) -> usize {
        let discarded = self.queue.clear();
        debug!(discarded, "queue cleared");
        discarded
    }

    pub fn set_output_pin(&mut self, pin: AnalogPin) {
        self.config.output_pin = pin;
    }

    pub fn set_sample_rate(&mut self, rate: SampleRate) {
        self.config.sample_rate = rate;
    }

    /// `volume` is clamped to [0, 255].
    pub fn set_volume(&mut self, volume: i32) {
        self.config.volume = Volume::new(volume);
    }

    /// Decode `buffer` with the session decoder.
    ///
    /// The decoder is shared with playback, so decoding here shifts the state the
    /// next played sample starts from.
    pub fn decode_buffer(&mut self, buffer: &[u8]) -> Vec<u8> {
        self.decoder.decode_buffer(buffer)
    }

    /// Write the next sample to the sink.
    ///
    /// Returns the wait in microseconds before the following sample, or `None` when not
    /// playing. Running out of buffers moves the engine to [`PlaybackState::Idle`].
    pub fn next_sample(&mut self) -> Option<u32> {
        if self.state != PlaybackState::Playing {
            return None;
        }

        let nibble = loop {
            if let Some(playhead) = self.playhead.as_mut() {
                if let Some(nibble) = playhead.next_nibble() {
                    break nibble;
                }
                trace!(len = playhead.buffer.len(), "buffer finished");
                self.playhead = None;
            }

            match self.queue.dequeue() {
                Some(buffer) => {
                    trace!(len = buffer.len(), remaining = self.queue.len(), "buffer started");
                    self.playhead = Some(Playhead::new(buffer));
                }
                None => {
                    debug!("queue drained");
                    self.transition(PlaybackState::Idle);
                    return None;
                }
            }
        };

        let sample = self.decoder.decode_nibble(nibble);
        let level = self.config.volume.scale(sample);
        self.sink.write(self.config.output_pin, level);
        Some(self.config.sample_rate.period_micros())
    }

    /// Play until the engine stops playing, waiting one sample period after each sample.
    ///
    /// Returns the number of samples written.
    pub fn run_until_idle<T: Timer>(&mut self, mut timer: T) -> usize {
        let mut written = 0;
        while let Some(micros) = self.next_sample() {
            written += 1;
            timer.wait_micros(micros);
        }
        written
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "playback state");
            self.state = next;
        }
    }
}
