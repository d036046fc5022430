//! Typed-message wire format: an 8-byte header (`size`, `type`, `flags`,
//! `latency_ms`) followed by `size` body bytes, all little-endian.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Misc = 0,
    Video = 1,
    Audio = 2,
}

impl PacketType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PacketType::Misc),
            1 => Some(PacketType::Video),
            2 => Some(PacketType::Audio),
            _ => None,
        }
    }
}

pub const HEADER_LEN: usize = 8;
const KEYFRAME_BIT: u8 = 0b0000_0001;

/// An owned, header-prefixed packet ready to write to the wire, or just read
/// back off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub keyframe: bool,
    pub latency_ms: u16,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn video(body: Vec<u8>, keyframe: bool, latency_ms: u16) -> Self {
        Packet { kind: PacketType::Video, keyframe, latency_ms, body }
    }

    pub fn audio_config(body: String) -> Self {
        Packet { kind: PacketType::Audio, keyframe: true, latency_ms: 0, body: body.into_bytes() }
    }

    pub fn audio_data(body: Vec<u8>, latency_ms: u16) -> Self {
        Packet { kind: PacketType::Audio, keyframe: false, latency_ms, body }
    }

    pub fn input_event(body: Vec<u8>) -> Self {
        Packet { kind: PacketType::Misc, keyframe: false, latency_ms: 0, body }
    }

    pub fn encode_header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&(self.body.len() as u32).to_le_bytes());
        header[4] = self.kind as u8;
        header[5] = if self.keyframe { KEYFRAME_BIT } else { 0 };
        header[6..8].copy_from_slice(&self.latency_ms.to_le_bytes());
        header
    }

    /// Parses an 8-byte header into `(body_size, kind, keyframe, latency_ms)`.
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Option<(u32, PacketType, bool, u16)> {
        let size = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let kind = PacketType::from_byte(header[4])?;
        let keyframe = header[5] & KEYFRAME_BIT != 0;
        let latency_ms = u16::from_le_bytes(header[6..8].try_into().unwrap());
        Some((size, kind, keyframe, latency_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_all_fields() {
        let pkt = Packet::video(vec![1, 2, 3, 4, 5], true, 12);
        let header = pkt.encode_header();
        let (size, kind, keyframe, latency) = Packet::decode_header(&header).unwrap();
        assert_eq!(size, 5);
        assert_eq!(kind, PacketType::Video);
        assert!(keyframe);
        assert_eq!(latency, 12);
    }

    #[test]
    fn decode_header_rejects_unknown_type() {
        let mut header = [0u8; HEADER_LEN];
        header[4] = 0xff;
        assert!(Packet::decode_header(&header).is_none());
    }

    #[test]
    fn audio_config_is_keyframe_flagged() {
        let pkt = Packet::audio_config("48000:FL,FR".to_string());
        assert!(pkt.keyframe);
        assert_eq!(pkt.kind, PacketType::Audio);
        assert_eq!(pkt.body, b"48000:FL,FR");
    }
}
