//! # Configuration
//!
//! CLI parsing (via `clap`'s derive API) and the validated [`StreamConfig`]
//! it's converted into. Mirrors the shape of a small, hand-validated config
//! struct: a `clap::Parser` for argv, a plain struct for the validated form,
//! and a `validate`/`from_args` pair connecting them.

use clap::Parser;
use std::fmt;

use crate::error::StreamError;

/// Low-latency framebuffer streaming server.
#[derive(Parser, Debug)]
#[command(name = "streamer")]
#[command(about = "Stream the screen as HEVC over a single TCP connection")]
struct RawArgs {
    /// TCP port to listen on.
    port: u16,

    /// Disable synthetic HID input injection (the client's input events are
    /// accepted and discarded instead of being injected into the kernel).
    #[arg(long)]
    disable_uhid: bool,

    /// Enable audio capture, formatted as `<rate>:<channels>`, e.g.
    /// `48000:FL,FR`. `<rate>` is 44100 or 48000; `<channels>` is a
    /// comma-separated channel-position list.
    #[arg(long)]
    audio: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
}

impl SampleRate {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "44100" => Some(SampleRate::Hz44100),
            "48000" => Some(SampleRate::Hz48000),
            _ => None,
        }
    }

    pub fn as_hz(self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44_100,
            SampleRate::Hz48000 => 48_000,
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hz())
    }
}

/// The fixed channel-position set the wire protocol's audio-config message
/// may name (SPEC_FULL §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPosition {
    Fl, Fr, Fc, Lfe, Sl, Sr, Flc, Frc, Rc, Rl, Rr, Tc,
    Tfl, Tfc, Tfr, Trl, Trc, Trr, Rlc, Rrc, Flw, Frw, Lfe2,
    Flh, Fch, Frh, Tflc, Tfrc, Tsl, Tsr, Llfe, Rlfe, Bc, Blc, Brc,
}

impl ChannelPosition {
    const ALL: &'static [(&'static str, ChannelPosition)] = &[
        ("FL", ChannelPosition::Fl), ("FR", ChannelPosition::Fr), ("FC", ChannelPosition::Fc),
        ("LFE", ChannelPosition::Lfe), ("SL", ChannelPosition::Sl), ("SR", ChannelPosition::Sr),
        ("FLC", ChannelPosition::Flc), ("FRC", ChannelPosition::Frc), ("RC", ChannelPosition::Rc),
        ("RL", ChannelPosition::Rl), ("RR", ChannelPosition::Rr), ("TC", ChannelPosition::Tc),
        ("TFL", ChannelPosition::Tfl), ("TFC", ChannelPosition::Tfc), ("TFR", ChannelPosition::Tfr),
        ("TRL", ChannelPosition::Trl), ("TRC", ChannelPosition::Trc), ("TRR", ChannelPosition::Trr),
        ("RLC", ChannelPosition::Rlc), ("RRC", ChannelPosition::Rrc), ("FLW", ChannelPosition::Flw),
        ("FRW", ChannelPosition::Frw), ("LFE2", ChannelPosition::Lfe2), ("FLH", ChannelPosition::Flh),
        ("FCH", ChannelPosition::Fch), ("FRH", ChannelPosition::Frh), ("TFLC", ChannelPosition::Tflc),
        ("TFRC", ChannelPosition::Tfrc), ("TSL", ChannelPosition::Tsl), ("TSR", ChannelPosition::Tsr),
        ("LLFE", ChannelPosition::Llfe), ("RLFE", ChannelPosition::Rlfe), ("BC", ChannelPosition::Bc),
        ("BLC", ChannelPosition::Blc), ("BRC", ChannelPosition::Brc),
    ];

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().find(|(name, _)| *name == s).map(|(_, pos)| *pos)
    }

    fn as_str(self) -> &'static str {
        Self::ALL.iter().find(|(_, pos)| *pos == self).map(|(name, _)| *name).unwrap()
    }
}

impl fmt::Display for ChannelPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio sink configuration, sent verbatim (as `rate:channels`) in the
/// session's first server-to-client frame.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub rate: SampleRate,
    pub channels: Vec<ChannelPosition>,
}

impl AudioConfig {
    /// Parses `<rate>:<channels>`, e.g. `"48000:FL,FR"`.
    fn parse(s: &str) -> std::result::Result<Self, String> {
        let (rate_str, channels_str) = s
            .split_once(':')
            .ok_or_else(|| format!("--audio expects `<rate>:<channels>`, got {s:?}"))?;

        let rate = SampleRate::parse(rate_str)
            .ok_or_else(|| format!("unsupported audio rate {rate_str:?}, expected 44100 or 48000"))?;

        if channels_str.is_empty() {
            return Err("--audio channel list must not be empty".to_string());
        }
        let mut channels = Vec::new();
        for name in channels_str.split(',') {
            let pos = ChannelPosition::parse(name)
                .ok_or_else(|| format!("unknown channel position {name:?}"))?;
            channels.push(pos);
        }
        if channels.len() > 64 {
            return Err(format!("audio channel count {} exceeds the 64-channel limit", channels.len()));
        }

        Ok(AudioConfig { rate, channels })
    }

    /// The ASCII body of the wire protocol's audio-config message.
    pub fn wire_body(&self) -> String {
        let channels = self.channels.iter().map(ChannelPosition::to_string).collect::<Vec<_>>().join(",");
        format!("{}:{}", self.rate, channels)
    }

    /// Bytes per interleaved PCM sample frame (S16LE).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels.len() * 2
    }
}

/// Validated server configuration, parsed from argv.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub port: u16,
    pub disable_uhid: bool,
    pub audio: Option<AudioConfig>,
}

impl StreamConfig {
    pub fn from_args() -> crate::error::Result<Self> {
        let raw = RawArgs::parse();
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawArgs) -> crate::error::Result<Self> {
        let audio = raw
            .audio
            .as_deref()
            .map(AudioConfig::parse)
            .transpose()
            .map_err(StreamError::Config)?;

        if raw.port == 0 {
            return Err(StreamError::Config("port must be nonzero".to_string()));
        }

        Ok(StreamConfig { port: raw.port, disable_uhid: raw.disable_uhid, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_config_parses_rate_and_channels() {
        let cfg = AudioConfig::parse("48000:FL,FR").unwrap();
        assert_eq!(cfg.rate, SampleRate::Hz48000);
        assert_eq!(cfg.channels, vec![ChannelPosition::Fl, ChannelPosition::Fr]);
        assert_eq!(cfg.wire_body(), "48000:FL,FR");
        assert_eq!(cfg.bytes_per_frame(), 4);
    }

    #[test]
    fn audio_config_rejects_bad_rate() {
        assert!(AudioConfig::parse("22050:FL,FR").is_err());
    }

    #[test]
    fn audio_config_rejects_unknown_channel() {
        assert!(AudioConfig::parse("44100:XX").is_err());
    }

    #[test]
    fn audio_config_rejects_missing_colon() {
        assert!(AudioConfig::parse("44100").is_err());
    }

    #[test]
    fn from_raw_rejects_zero_port() {
        let raw = RawArgs { port: 0, disable_uhid: false, audio: None };
        assert!(StreamConfig::from_raw(raw).is_err());
    }

    #[test]
    fn from_raw_accepts_minimal_config() {
        let raw = RawArgs { port: 9000, disable_uhid: true, audio: None };
        let cfg = StreamConfig::from_raw(raw).unwrap();
        assert_eq!(cfg.port, 9000);
        assert!(cfg.disable_uhid);
        assert!(cfg.audio.is_none());
    }
}
