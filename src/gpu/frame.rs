//! A captured image imported into the GPU: one EGLImage/GL texture per
//! DMA-BUF plane, or one per NV12 subplane when the destination surface is
//! imported for direct rendering.

use drm_fourcc::DrmFourcc;
use khronos_egl as egl;

use crate::core::PlaneSet;
use crate::error::{ErrorContext, Result, StreamError};
use crate::gpu::context::TEXTURE_EXTERNAL_OES;

pub const FOURCC_NV12: u32 = DrmFourcc::Nv12 as u32;

struct Image {
    texture: glow::NativeTexture,
    image: egl::Image,
}

/// An imported DMA-BUF surface. NV12 destinations carry two images, one per
/// subplane (R8 luma, GR88 chroma, at half resolution); anything else is a
/// single multi-plane image sized `width`x`height`.
pub struct GpuFrame {
    pub width: u32,
    pub height: u32,
    images: Vec<Image>,
    display: egl::Display,
    gl: std::rc::Rc<glow::Context>,
    egl_instance: std::rc::Rc<egl::DynamicInstance<egl::EGL1_5>>,
    // Held only to keep the DMA-BUF fds alive for the image's lifetime;
    // SPEC_FULL's per-role single-ownership invariant requires this frame
    // to hold the canonical owner even though EGL dup's the fd internally.
    _planes: PlaneSet,
}

impl GpuFrame {
    pub(super) fn new(
        egl_instance: std::rc::Rc<egl::DynamicInstance<egl::EGL1_5>>,
        display: egl::Display,
        gl: std::rc::Rc<glow::Context>,
        planes: PlaneSet,
        width: u32,
        height: u32,
        fourcc: u32,
    ) -> Result<Self> {
        if planes.is_empty() {
            return Err(import_error("plane set is empty"));
        }

        // NV12 destination subplanes are FBO render targets (the conversion
        // shaders write into them), and `TEXTURE_EXTERNAL_OES` can never be
        // attached to a framebuffer per `OES_EGL_image_external` — bind them
        // as plain `TEXTURE_2D` via `GL_OES_EGL_image` instead. The RGB
        // source import is only ever sampled, never a render target, so it
        // keeps the external-image path.
        let images = if fourcc == FOURCC_NV12 {
            if planes.len() < 2 {
                return Err(import_error("NV12 import requires two planes"));
            }
            vec![
                create_image(&egl_instance, &gl, display, &planes, 0, 1, width, height, FOURCC_R8, glow::TEXTURE_2D)?,
                create_image(&egl_instance, &gl, display, &planes, 1, 1, width / 2, height / 2, FOURCC_GR88, glow::TEXTURE_2D)?,
            ]
        } else {
            vec![create_image(
                &egl_instance, &gl, display, &planes, 0, planes.len(), width, height, fourcc, TEXTURE_EXTERNAL_OES,
            )?]
        };

        Ok(Self { width, height, images, display, gl, egl_instance, _planes: planes })
    }

    /// Texture for plane `index` (0 for RGB/luma, 1 for chroma on NV12).
    pub fn texture(&self, index: usize) -> glow::NativeTexture {
        self.images[index].texture
    }

    pub fn plane_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for GpuFrame {
    fn drop(&mut self) {
        use glow::HasContext;
        for image in &self.images {
            unsafe { self.gl.delete_texture(image.texture) };
            let _ = self.egl_instance.destroy_image(self.display, image.image);
        }
    }
}

const FOURCC_R8: u32 = DrmFourcc::R8 as u32;
const FOURCC_GR88: u32 = DrmFourcc::Gr88 as u32;

#[allow(clippy::too_many_arguments)]
fn create_image(
    egl_instance: &egl::DynamicInstance<egl::EGL1_5>,
    gl: &glow::Context,
    display: egl::Display,
    planes: &PlaneSet,
    first_plane: usize,
    plane_count: usize,
    width: u32,
    height: u32,
    fourcc: u32,
    target: u32,
) -> Result<Image> {
    use glow::HasContext;

    let mut attribs: Vec<egl::Int> = vec![
        egl::WIDTH as egl::Int, width as egl::Int,
        egl::HEIGHT as egl::Int, height as egl::Int,
        0x3271 /* EGL_LINUX_DRM_FOURCC_EXT */, fourcc as egl::Int,
    ];
    for i in 0..plane_count {
        let plane = &planes.as_slice()[first_plane + i];
        let (fd_key, offset_key, pitch_key, mod_lo_key, mod_hi_key) = plane_keys(i)?;
        attribs.push(fd_key);
        attribs.push(plane.fd.as_raw_fd_value());
        attribs.push(offset_key);
        attribs.push(plane.offset as egl::Int);
        attribs.push(pitch_key);
        attribs.push(plane.pitch as egl::Int);
        if plane.modifier != 0 {
            attribs.push(mod_lo_key);
            attribs.push((plane.modifier & 0xffff_ffff) as egl::Int);
            attribs.push(mod_hi_key);
            attribs.push((plane.modifier >> 32) as egl::Int);
        }
    }
    attribs.push(egl::NONE as egl::Int);

    let image = egl_instance
        .create_image(
            display,
            unsafe { egl::Context::from_ptr(egl::NO_CONTEXT) },
            0x3270, /* EGL_LINUX_DMA_BUF_EXT */
            egl::ClientBuffer::from_ptr(std::ptr::null_mut()),
            &attribs,
        )
        .map_err(|e| import_error(format!("eglCreateImage: {e}")))?;

    let texture = unsafe { gl.create_texture() }.map_err(|e| gl_error(format!("create_texture: {e}")))?;
    unsafe {
        gl.bind_texture(target, Some(texture));
        gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
        gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        super::context::image_target_texture_2d_oes(egl_instance, image, target)?;
        gl.bind_texture(target, None);
    }

    Ok(Image { texture, image })
}

trait RawFdValue {
    fn as_raw_fd_value(&self) -> egl::Int;
}

impl RawFdValue for std::os::fd::OwnedFd {
    fn as_raw_fd_value(&self) -> egl::Int {
        use std::os::fd::AsRawFd;
        self.as_raw_fd()
    }
}

/// `EGL_DMA_BUF_PLANE{n}_FD/OFFSET/PITCH/MODIFIER_{LO,HI}_EXT` for plane `n`.
fn plane_keys(index: usize) -> Result<(egl::Int, egl::Int, egl::Int, egl::Int, egl::Int)> {
    const FD: [egl::Int; 4] = [0x3272, 0x3275, 0x3278, 0x327B];
    const OFFSET: [egl::Int; 4] = [0x3273, 0x3276, 0x3279, 0x327C];
    const PITCH: [egl::Int; 4] = [0x3274, 0x3277, 0x327A, 0x327D];
    const MOD_LO: [egl::Int; 4] = [0x3443, 0x3445, 0x3447, 0x3449];
    const MOD_HI: [egl::Int; 4] = [0x3444, 0x3446, 0x3448, 0x344A];
    if index >= 4 {
        return Err(import_error("more than 4 planes"));
    }
    Ok((FD[index], OFFSET[index], PITCH[index], MOD_LO[index], MOD_HI[index]))
}

fn import_error(detail: impl Into<String>) -> StreamError {
    StreamError::ImportError {
        context: ErrorContext::new("eglCreateImage", detail.into()),
        supported_fourccs: Vec::new(),
    }
}

fn gl_error(detail: impl Into<String>) -> StreamError {
    StreamError::GlError(ErrorContext::new("gl", detail.into()))
}
