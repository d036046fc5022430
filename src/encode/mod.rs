//! VA-API HEVC encoding: one input NV12 surface, a two-slot reconstruction
//! ring, and (capability permitting) self-packed VPS/SPS/PPS/slice headers
//! (SPEC_FULL §4.4).

mod encoder;
pub mod params;

pub use encoder::{Encoder, EncodedFrame};
