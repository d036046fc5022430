//! Length-prefixed wire protocol and the framer that drains it to a socket.

pub mod framer;
pub mod wire;

pub use framer::{read_framed, write_framed};
pub use wire::{Packet, PacketType, HEADER_LEN};
