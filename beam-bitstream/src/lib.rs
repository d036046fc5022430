// SPDX-License-Identifier: MIT
//! Bit-level Exp-Golomb writer and a hand-built HEVC VPS/SPS/PPS/slice-segment-header
//! packer, kept free of any VA-API or hardware dependency so it can be exercised with
//! plain synthetic fixtures.

pub mod hevc;
pub mod writer;

pub use hevc::{Colorspace, NalUnitType, PicParams, Range, ReconPic, SeqParams, SliceParams, SliceType};
pub use writer::{inflate_into, BitWriter};
