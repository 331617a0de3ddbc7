//! Background playback on a tokio task.
//!
//! A [`Player`] owns exactly one worker task, and that task owns the [`PlaybackEngine`].
//! Control calls are sent to the worker as messages and applied between two samples,
//! so a pause or stop takes effect within one sample period.
//!
//! # Examples
//!
//! ```
//! use kaas::player::{Player, TokioTimer};
//! use kaas::{AnalogPin, OutputSink, PlayerConfig};
//!
//! struct Levels(Vec<u8>);
//!
//! impl OutputSink for Levels {
//!     fn write(&mut self, _pin: AnalogPin, level: u8) {
//!         self.0.push(level);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> anyhow::Result<()> {
//! let player = Player::spawn(Levels(Vec::new()), TokioTimer::new(), PlayerConfig::default());
//! player.play(vec![0x7F, 0x12])?;
//! player.wait_until_idle().await?;
//! let sink = player.shutdown().await?;
//! assert_eq!(sink.0.len(), 4);
//! # Ok(())
//! # }
//! ```

use crate::config::{AnalogPin, PlayerConfig, SampleRate};
use crate::decoder::DecoderState;
use crate::engine::{OutputSink, PlaybackEngine, PlaybackState};
use crate::error::PlayerError;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

/// Falling further behind the pacing deadline than this restarts the schedule from now.
const MAX_LAG: Duration = Duration::from_millis(20);

/// Cooperative microsecond delay. Other tasks run while it waits.
#[async_trait]
pub trait AsyncTimer: Send {
    async fn wait_micros(&mut self, micros: u32);

    /// Forget any pacing schedule. Called whenever output stops (pause, stop, idle),
    /// so the next run starts its first period from the moment it resumes.
    fn reset(&mut self) {}
}

/// Paces samples against an absolute deadline on the tokio clock.
///
/// tokio timers resolve to about a millisecond, far coarser than a sample period. Each
/// wait therefore advances a deadline by the requested period and only sleeps when
/// that deadline is in the future, so the average rate stays exact while individual
/// samples are written in short bursts.
#[derive(Debug, Default)]
pub struct TokioTimer {
    deadline: Option<Instant>,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AsyncTimer for TokioTimer {
    async fn wait_micros(&mut self, micros: u32) {
        let now = Instant::now();
        let start = match self.deadline {
            Some(deadline) if now.saturating_duration_since(deadline) < MAX_LAG => deadline,
            _ => now,
        };
        let deadline = start + Duration::from_micros(micros.into());
        self.deadline = Some(deadline);

        if deadline > now {
            tokio::time::sleep_until(deadline).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    fn reset(&mut self) {
        self.deadline = None;
    }
}

/// Snapshot of the worker's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Buffers not yet started.
    pub queued: usize,
    pub decoder: DecoderState,
    pub config: PlayerConfig,
}

#[derive(Debug)]
enum Command {
    Play(Vec<u8>),
    Queue(Vec<u8>),
    Pause,
    Resume,
    Stop,
    ClearQueue,
    SetOutputPin(AnalogPin),
    SetSampleRate(SampleRate),
    SetVolume(i32),
    Decode(Vec<u8>, oneshot::Sender<Vec<u8>>),
    Status(oneshot::Sender<PlaybackStatus>),
    Shutdown,
}

/// Handle to a background playback worker.
#[derive(Debug)]
pub struct Player<S> {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PlaybackState>,
    worker: JoinHandle<S>,
}

impl<S> Player<S>
where
    S: OutputSink + Send + 'static,
{
    /// Start the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<T>(sink: S, timer: T, config: PlayerConfig) -> Self
    where
        T: AsyncTimer + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(PlaybackState::Idle);
        let engine = PlaybackEngine::new(sink, config);
        let worker = tokio::spawn(run_worker(engine, timer, receiver, state_tx));

        Self {
            commands,
            state,
            worker,
        }
    }

    fn send(&self, command: Command) -> Result<(), PlayerError> {
        self.commands
            .send(command)
            .map_err(|_| PlayerError::WorkerGone)
    }

    /// Queue `buffer` and start playing if idle.
    pub fn play(&self, buffer: impl Into<Vec<u8>>) -> Result<(), PlayerError> {
        self.send(Command::Play(buffer.into()))
    }

    pub fn queue(&self, buffer: impl Into<Vec<u8>>) -> Result<(), PlayerError> {
        self.send(Command::Queue(buffer.into()))
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), PlayerError> {
        self.send(Command::Resume)
    }

    pub fn stop(&self) -> Result<(), PlayerError> {
        self.send(Command::Stop)
    }

    pub fn clear_queue(&self) -> Result<(), PlayerError> {
        self.send(Command::ClearQueue)
    }

    pub fn set_output_pin(&self, pin: AnalogPin) -> Result<(), PlayerError> {
        self.send(Command::SetOutputPin(pin))
    }

    /// # Errors
    ///
    /// * `PlayerError::Config` - `hz` is zero. Nothing is sent to the worker.
    pub fn set_sample_rate(&self, hz: u32) -> Result<(), PlayerError> {
        let rate = SampleRate::new(hz)?;
        self.send(Command::SetSampleRate(rate))
    }

    /// `volume` is clamped to [0, 255].
    pub fn set_volume(&self, volume: i32) -> Result<(), PlayerError> {
        self.send(Command::SetVolume(volume))
    }

    /// Decode `buffer` with the session decoder, in line with playback.
    pub async fn decode_buffer(&self, buffer: impl Into<Vec<u8>>) -> Result<Vec<u8>, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Decode(buffer.into(), reply))?;
        response.await.map_err(|_| PlayerError::WorkerGone)
    }

    /// State after every command sent so far has been applied.
    pub async fn status(&self) -> Result<PlaybackStatus, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Status(reply))?;
        response.await.map_err(|_| PlayerError::WorkerGone)
    }

    /// Last state published by the worker.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Wait for the worker to run out of buffers or be stopped.
    /// A paused player does not become idle on its own.
    pub async fn wait_until_idle(&self) -> Result<(), PlayerError> {
        // Make sure earlier commands are reflected in the published state.
        self.status().await?;
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == PlaybackState::Idle)
            .await
            .map(|_| ())
            .map_err(|_| PlayerError::WorkerGone)
    }

    /// Stop the worker and hand back the sink.
    pub async fn shutdown(self) -> Result<S, PlayerError> {
        // The worker may already be gone; the join below reports how it ended.
        let _ = self.commands.send(Command::Shutdown);
        self.worker.await.map_err(|_| PlayerError::WorkerPanicked)
    }
}

enum Flow {
    Continue,
    Exit,
}

fn apply<S: OutputSink>(engine: &mut PlaybackEngine<S>, command: Command) -> Flow {
    match command {
        Command::Play(buffer) => engine.play(buffer),
        Command::Queue(buffer) => engine.queue(buffer),
        Command::Pause => engine.pause(),
        Command::Resume => engine.resume(),
        Command::Stop => engine.stop(),
        Command::ClearQueue => {
            engine.clear_queue();
        }
        Command::SetOutputPin(pin) => engine.set_output_pin(pin),
        Command::SetSampleRate(rate) => engine.set_sample_rate(rate),
        Command::SetVolume(volume) => engine.set_volume(volume),
        Command::Decode(buffer, reply) => {
            let _ = reply.send(engine.decode_buffer(&buffer));
        }
        Command::Status(reply) => {
            let _ = reply.send(PlaybackStatus {
                state: engine.state(),
                queued: engine.queued(),
                decoder: engine.decoder_state(),
                config: *engine.config(),
            });
        }
        Command::Shutdown => return Flow::Exit,
    }
    Flow::Continue
}

fn publish(state: &watch::Sender<PlaybackState>, current: PlaybackState) {
    state.send_if_modified(|published| {
        if *published == current {
            false
        } else {
            *published = current;
            true
        }
    });
}

async fn run_worker<S, T>(
    mut engine: PlaybackEngine<S>,
    mut timer: T,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<PlaybackState>,
) -> S
where
    S: OutputSink,
    T: AsyncTimer,
{
    info!("playback worker started");

    'worker: loop {
        // Apply whatever arrived during the last wait before touching the output.
        while let Ok(command) = commands.try_recv() {
            let flow = apply(&mut engine, command);
            publish(&state, engine.state());
            if let Flow::Exit = flow {
                break 'worker;
            }
        }

        match engine.next_sample() {
            Some(micros) => timer.wait_micros(micros).await,
            None => {
                publish(&state, engine.state());
                timer.reset();
                // Nothing to play: sleep until told otherwise.
                let Some(command) = commands.recv().await else {
                    debug!("all player handles dropped");
                    break 'worker;
                };
                let flow = apply(&mut engine, command);
                publish(&state, engine.state());
                if let Flow::Exit = flow {
                    break 'worker;
                }
            }
        }
    }

    info!("playback worker stopped");
    engine.into_sink()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;

    #[derive(Debug, Default)]
    struct RecordingSink {
        levels: Vec<u8>,
    }

    impl OutputSink for RecordingSink {
        fn write(&mut self, _pin: AnalogPin, level: u8) {
            self.levels.push(level);
        }
    }

    fn spawn() -> Player<RecordingSink> {
        Player::spawn(
            RecordingSink::default(),
            TokioTimer::new(),
            PlayerConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn timer_keeps_average_rate() {
        let mut timer = TokioTimer::new();
        let start = Instant::now();
        for _ in 0..800 {
            timer.wait_micros(125).await;
        }
        let elapsed = Instant::now() - start;
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(102));
    }

    #[tokio::test(start_paused = true)]
    async fn plays_queue_to_completion() {
        let player = spawn();
        player.play(vec![0x7F, 0x12]).unwrap();
        player.queue(vec![0xC4]).unwrap();
        player.wait_until_idle().await.unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);

        let sink = player.shutdown().await.unwrap();
        let expected: Vec<u8> = Decoder::new()
            .decode_buffer(&[0x7F, 0x12, 0xC4])
            .into_iter()
            .map(|s| ((s as u16 * 255) >> 8) as u8)
            .collect();
        assert_eq!(sink.levels, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_position() {
        let player = spawn();
        player.play(vec![0x55; 4000]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.pause().unwrap();

        let paused = player.status().await.unwrap();
        assert_eq!(paused.state, PlaybackState::Paused);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.status().await.unwrap(), paused);

        player.resume().unwrap();
        player.wait_until_idle().await.unwrap();
        let sink = player.shutdown().await.unwrap();
        assert_eq!(sink.levels.len(), 8000);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_session() {
        let player = spawn();
        player.play(vec![0x9E; 1000]).unwrap();
        player.queue(vec![0x11; 10]).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        player.stop().unwrap();

        let status = player.status().await.unwrap();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.queued, 0);
        assert_eq!(status.decoder, DecoderState::default());

        let sink = player.shutdown().await.unwrap();
        assert_eq!(sink.levels.last(), Some(&0));
        assert!(sink.levels.len() < 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sample_rate_is_rejected() {
        let player = spawn();
        assert_eq!(
            player.set_sample_rate(0),
            Err(PlayerError::Config(crate::ConfigError::ZeroSampleRate))
        );
        player.set_sample_rate(16000).unwrap();
        player.set_volume(-3).unwrap();
        let status = player.status().await.unwrap();
        assert_eq!(status.config.sample_rate.hz(), 16000);
        assert_eq!(status.config.volume.level(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_fail_after_shutdown() {
        let player = spawn();
        let commands = player.commands.clone();
        player.shutdown().await.unwrap();
        assert!(commands.send(Command::Pause).is_err());
    }

    #[derive(Debug, Default)]
    struct TimedSink {
        written_at: Vec<Instant>,
    }

    impl OutputSink for TimedSink {
        fn write(&mut self, _pin: AnalogPin, _level: u8) {
            self.written_at.push(Instant::now());
        }
    }

    fn written_right_after(sink: &TimedSink, from: Instant) -> usize {
        sink.written_at
            .iter()
            .filter(|&&t| t >= from && t - from <= Duration::from_micros(1))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reset_restarts_schedule() {
        let mut timer = TokioTimer::new();
        timer.wait_micros(125).await;
        tokio::time::sleep(Duration::from_millis(15)).await;

        timer.reset();
        let start = Instant::now();
        timer.wait_micros(125).await;
        assert!(Instant::now() - start >= Duration::from_micros(125));
    }

    #[tokio::test(start_paused = true)]
    async fn short_pause_does_not_burst_on_resume() {
        let player = Player::spawn(TimedSink::default(), TokioTimer::new(), PlayerConfig::default());
        player.play(vec![0x11; 4000]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.pause().unwrap();
        assert_eq!(player.status().await.unwrap().state, PlaybackState::Paused);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let resumed = Instant::now();
        player.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sink = player.shutdown().await.unwrap();
        assert!(written_right_after(&sink, resumed) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_after_short_idle_does_not_burst() {
        let player = Player::spawn(TimedSink::default(), TokioTimer::new(), PlayerConfig::default());
        player.play(vec![0x11; 40]).unwrap();
        player.wait_until_idle().await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        let replayed = Instant::now();
        player.play(vec![0x11; 400]).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sink = player.shutdown().await.unwrap();
        assert!(sink.written_at.len() > 80);
        assert!(written_right_after(&sink, replayed) <= 2);
    }
}
