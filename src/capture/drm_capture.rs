//! DRM-only half of capture: everything downstream of this module sees a
//! `GpuFrame`, never a raw handle.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use drm::control::Device as ControlDevice;
use drm::Device as BasicDevice;

use crate::core::{PlaneDescriptor, PlaneSet};
use crate::error::{ErrorContext, Result, StreamError};
use crate::gpu::GpuContext;
use crate::gpu::GpuFrame;

/// Render/card node stems probed in order; the first that opens and exposes
/// a CRTC with a live framebuffer wins.
const NODE_PROBE_ORDER: &[&str] = &["i915", "amdgpu", "nouveau", "radeon", "vc4", "vkms"];

struct DrmHandle(File);

impl AsRawFd for DrmHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
impl BasicDevice for DrmHandle {}
impl ControlDevice for DrmHandle {}

pub struct Capture {
    handle: DrmHandle,
    crtc: drm::control::crtc::Handle,
}

impl Capture {
    /// Opens the first DRM node, in driver-name priority order, whose
    /// current CRTC has a non-null framebuffer with at least one valid
    /// plane handle.
    pub fn new() -> Result<Self> {
        let mut candidates: Vec<(usize, DrmHandle)> = Vec::new();
        for entry in std::fs::read_dir("/dev/dri").map_err(|e| no_display(format!("read /dev/dri: {e}")))? {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("card") {
                continue;
            }
            let Ok(file) = OpenOptions::new().read(true).write(true).open(entry.path()) else { continue };
            let handle = DrmHandle(file);
            let priority = handle
                .get_driver()
                .ok()
                .and_then(|d| NODE_PROBE_ORDER.iter().position(|&s| d.name().to_string_lossy() == s))
                .unwrap_or(NODE_PROBE_ORDER.len());
            candidates.push((priority, handle));
        }
        candidates.sort_by_key(|(priority, _)| *priority);

        for (_, handle) in candidates {
            let Ok(resources) = handle.resource_handles() else { continue };
            for &crtc in resources.crtcs() {
                let Ok(info) = handle.get_crtc(crtc) else { continue };
                if info.framebuffer().is_some() {
                    return Ok(Self { handle, crtc });
                }
            }
        }
        Err(no_display("no CRTC has a usable framebuffer on any probed node"))
    }

    /// Captures the CRTC's current framebuffer, imports it into `gpu`, and
    /// returns the resulting RGB `GpuFrame`. PRIME fds are closed after
    /// import; the returned frame owns its own duped descriptors.
    pub fn next_frame(&self, gpu: &GpuContext) -> Result<GpuFrame> {
        let info = self
            .handle
            .get_crtc(self.crtc)
            .map_err(|e| no_display(format!("GETCRTC: {e}")))?;
        let fb_handle = info.framebuffer().ok_or_else(|| no_display("CRTC framebuffer became null"))?;

        let fb = get_framebuffer2(&self.handle, fb_handle)?;

        let mut planes = PlaneSet::new();
        for plane in &fb.planes {
            let fd = prime_handle_to_fd(&self.handle, plane.handle)?;
            planes.push(PlaneDescriptor { fd, offset: plane.offset, pitch: plane.pitch, modifier: fb.modifier });
        }

        gpu.import_frame(planes, fb.width, fb.height, fb.fourcc)
    }
}

/// One plane of a `DRM_IOCTL_MODE_GETFB2` reply.
struct Fb2Plane {
    handle: u32,
    offset: u32,
    pitch: u32,
}

struct Fb2 {
    width: u32,
    height: u32,
    fourcc: u32,
    modifier: u64,
    planes: Vec<Fb2Plane>,
}

/// `drm-rs` 0.14 doesn't wrap `GETFB2`/modifiers; we issue the ioctl
/// directly, the same way wl-screenrec and similar low-level capture tools
/// do for the same reason.
fn get_framebuffer2(device: &DrmHandle, fb: drm::control::framebuffer::Handle) -> Result<Fb2> {
    use drm::control::ResourceHandle;

    #[repr(C)]
    #[derive(Default)]
    struct DrmModeFb2 {
        fb_id: u32,
        width: u32,
        height: u32,
        pixel_format: u32,
        flags: u32,
        handles: [u32; 4],
        pitches: [u32; 4],
        offsets: [u32; 4],
        modifier: [u64; 4],
    }

    const DRM_IOCTL_MODE_GETFB2: u64 = 0xc06864ce;

    let mut arg = DrmModeFb2 { fb_id: fb.into(), ..Default::default() };
    let ret = unsafe {
        libc::ioctl(device.as_raw_fd(), DRM_IOCTL_MODE_GETFB2 as _, &mut arg as *mut DrmModeFb2)
    };
    if ret != 0 {
        return Err(no_display(format!("GETFB2 ioctl failed: {}", std::io::Error::last_os_error())));
    }

    let has_modifiers = arg.flags & 0x2 /* DRM_MODE_FB_MODIFIERS */ != 0;
    let plane_count = arg.handles.iter().take_while(|&&h| h != 0).count().max(1);
    let planes = (0..plane_count)
        .map(|i| Fb2Plane { handle: arg.handles[i], offset: arg.offsets[i], pitch: arg.pitches[i] })
        .collect();

    Ok(Fb2 {
        width: arg.width,
        height: arg.height,
        fourcc: arg.pixel_format,
        modifier: if has_modifiers { arg.modifier[0] } else { 0 },
        planes,
    })
}

fn prime_handle_to_fd(device: &DrmHandle, handle: u32) -> Result<OwnedFd> {
    #[repr(C)]
    struct DrmPrimeHandle {
        handle: u32,
        flags: u32,
        fd: i32,
    }

    const DRM_IOCTL_PRIME_HANDLE_TO_FD: u64 = 0xc00c642d;
    const DRM_CLOEXEC: u32 = libc::O_CLOEXEC as u32;

    let mut arg = DrmPrimeHandle { handle, flags: DRM_CLOEXEC, fd: -1 };
    let ret = unsafe {
        libc::ioctl(device.as_raw_fd(), DRM_IOCTL_PRIME_HANDLE_TO_FD as _, &mut arg as *mut DrmPrimeHandle)
    };
    if ret != 0 {
        return Err(no_display(format!("PRIME_HANDLE_TO_FD failed: {}", std::io::Error::last_os_error())));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(arg.fd) })
}

fn no_display(detail: impl Into<String>) -> StreamError {
    StreamError::NoDisplay(ErrorContext::new("drm", detail.into()))
}
