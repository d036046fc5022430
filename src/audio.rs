//! Audio capture plumbing (SPEC_FULL §5/§6). Capture itself runs on a
//! dedicated thread "owned by the external audio subsystem"; this module
//! defines that seam (`AudioSource`) and the spawn glue around the shared
//! `AudioQueue`, so the queue's FIFO/wake contract is exercised end to end
//! even though no concrete hardware backend ships in this crate.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::AudioConfig;
use crate::core::{AudioBlock, AudioQueue};

/// A dedicated-thread audio capture backend. The main loop never drives or
/// cancels this thread directly — it only polls the queue's wake pipe
/// (SPEC_FULL §5) — so `capture` owns its own lifetime.
pub trait AudioSource: Send + 'static {
    fn capture(self: Box<Self>, queue: Arc<AudioQueue>);
}

/// No real ALSA/PulseAudio backend is wired into this crate; actual audio
/// hardware capture is the external subsystem SPEC_FULL §5 describes. This
/// produces silence at the configured rate/channel count so a configured
/// session still has a live producer driving the queue and the wire's
/// audio-data packets.
pub struct SilentAudioSource {
    config: AudioConfig,
}

impl SilentAudioSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn block_bytes(&self) -> usize {
        const BLOCK_MS: usize = 10;
        self.config.bytes_per_frame() * (self.config.rate.as_hz() as usize * BLOCK_MS / 1000)
    }
}

impl AudioSource for SilentAudioSource {
    fn capture(self: Box<Self>, queue: Arc<AudioQueue>) {
        let silence = vec![0u8; self.block_bytes()];
        loop {
            std::thread::sleep(Duration::from_millis(10));
            queue.push(AudioBlock { pcm: silence.clone(), latency_ms: 10 });
        }
    }
}

/// Spawns the configured source's capture thread, returning its handle.
/// Nothing joins this handle during normal operation; the thread outlives
/// every client session.
pub fn spawn(config: AudioConfig, queue: Arc<AudioQueue>) -> JoinHandle<()> {
    let source: Box<dyn AudioSource> = Box::new(SilentAudioSource::new(config));
    std::thread::spawn(move || source.capture(queue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelPosition, SampleRate};

    #[test]
    fn block_bytes_matches_ten_milliseconds_of_stereo_pcm() {
        let config = AudioConfig { rate: SampleRate::Hz48000, channels: vec![ChannelPosition::Fl, ChannelPosition::Fr] };
        let source = SilentAudioSource::new(config);
        // 48_000 Hz * 10ms = 480 frames, 4 bytes/frame (2 ch * S16LE).
        assert_eq!(source.block_bytes(), 480 * 4);
    }
}
