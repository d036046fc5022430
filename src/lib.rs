//! Low-latency framebuffer streaming server.
//!
//! Captures the current KMS/DRM scanout framebuffer, converts it to NV12 on
//! the GPU via EGL/GLES, encodes it as HEVC through VA-API with self-packed
//! VPS/SPS/PPS/slice headers, and streams the result to a single TCP client
//! over a length-prefixed wire protocol. Client input events are forwarded
//! to an external HID injector; audio, if configured, is interleaved on the
//! same connection.
//!
//! ## Module map
//!
//! - [`error`] — the `StreamError` kind hierarchy and startup/session-fatal
//!   severity split that the session loop's catch point relies on.
//! - [`config`] — CLI parsing and the validated [`config::StreamConfig`].
//! - [`core`] — pure data types and concurrency primitives (plane
//!   descriptors, the reconstruction ring, the audio queue) kept free of
//!   EGL/VA-API/DRM handles so they're unit-testable in isolation.
//! - [`gpu`] — the EGL/GLES context that imports DMA-BUFs and converts RGB
//!   to NV12.
//! - [`capture`] — KMS/DRM scanout capture.
//! - [`encode`] — the VA-API HEVC encoder and its `beam_bitstream` parameter
//!   translation.
//! - [`protocol`] — the wire frame format and its async framer.
//! - [`session`] — the `Listening`/`Serving`/`Terminating` state machine
//!   tying every other module together.
//! - [`input`] / [`audio`] — the external-collaborator seams for HID
//!   injection and audio capture.

pub mod audio;
pub mod capture;
pub mod config;
pub mod core;
pub mod encode;
pub mod error;
pub mod gpu;
pub mod input;
pub mod protocol;
pub mod session;
