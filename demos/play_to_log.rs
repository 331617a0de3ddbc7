//! Play a few buffers through a sink that logs every level.
//!
//! `RUST_LOG=trace cargo run --example play_to_log`

use kaas::player::{Player, TokioTimer};
use kaas::{AnalogPin, OutputSink, PlayerConfig, SampleRate, Volume};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct LogSink;

impl OutputSink for LogSink {
    fn write(&mut self, pin: AnalogPin, level: u8) {
        tracing::trace!(pin = pin.0, level, "analog write");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = PlayerConfig::default()
        .with_sample_rate(SampleRate::new(2000)?)
        .with_volume(Volume::new(200));
    let player = Player::spawn(LogSink, TokioTimer::new(), config);

    player.play(vec![0x44; 200])?;
    player.queue(vec![0xCC; 200])?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    player.pause()?;
    info!(status = ?player.status().await?, "paused");

    tokio::time::sleep(Duration::from_millis(100)).await;
    player.resume()?;
    player.wait_until_idle().await?;
    info!(status = ?player.status().await?, "finished");

    player.shutdown().await?;
    Ok(())
}
