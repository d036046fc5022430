//! KMS/DRM screen capture: find a scanned-out framebuffer and hand its
//! planes to the GPU context as DMA-BUF imports (SPEC_FULL §4.3).

mod drm_capture;

pub use drm_capture::Capture;
