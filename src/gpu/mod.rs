//! EGL/GLES colorspace conversion: import a captured DMA-BUF as RGB, render
//! it down to NV12 luma/chroma planes on the GPU.

mod context;
mod frame;
pub mod shaders;

pub use beam_bitstream::{Colorspace, Range};
pub use context::GpuContext;
pub use frame::{GpuFrame, FOURCC_NV12};
