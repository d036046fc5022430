//! EGL display/context setup and the luma/chroma render passes that turn an
//! imported RGB `GpuFrame` into an NV12 `GpuFrame`'s planes (SPEC_FULL §4.2).

use std::rc::Rc;

use glow::HasContext;
use khronos_egl as egl;

use crate::core::PlaneSet;
use crate::error::{ErrorContext, Result, StreamError};
use beam_bitstream::{Colorspace, Range};

use crate::gpu::frame::GpuFrame;
use crate::gpu::shaders::{self, CHROMA_FRAGMENT_SHADER, LUMA_FRAGMENT_SHADER, VERTEX_SHADER};

/// Not part of glow's core GLES constant table; defined by `OES_EGL_image_external`.
pub(super) const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Fullscreen quad, positions interleaved with UVs.
const QUAD: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, 0.0, 1.0,
     1.0,  1.0, 1.0, 1.0,
];

pub struct GpuContext {
    egl: Rc<egl::DynamicInstance<egl::EGL1_5>>,
    display: egl::Display,
    context: egl::Context,
    gl: Rc<glow::Context>,
    luma_program: glow::NativeProgram,
    chroma_program: glow::NativeProgram,
    vao: glow::NativeVertexArray,
    fbo: glow::NativeFramebuffer,
}

impl GpuContext {
    /// `colorspace`/`range` select the numeric matrix baked into the two
    /// programs' uniforms once at link time; a context only ever converts
    /// into one colorspace for its lifetime.
    pub fn new(render_node: &std::path::Path, colorspace: Colorspace, range: Range) -> Result<Self> {
        let egl = unsafe { egl::DynamicInstance::<egl::EGL1_5>::load_required() }
            .map_err(|e| no_display(format!("egl load: {e}")))?;

        let gbm_fd = std::fs::File::open(render_node)
            .map_err(|e| no_display(format!("open {}: {e}", render_node.display())))?;
        let platform_display = unsafe {
            egl.get_platform_display(
                0x31D7, /* EGL_PLATFORM_SURFACELESS_MESA, falls back below */
                egl::DEFAULT_DISPLAY,
                &[egl::NONE as egl::Attrib],
            )
        };
        let display = platform_display
            .or_else(|_| egl.get_display(egl::DEFAULT_DISPLAY).ok_or(egl::Error::BadDisplay))
            .map_err(|e| no_display(format!("eglGetDisplay: {e}")))?;
        drop(gbm_fd);

        egl.initialize(display).map_err(|e| no_display(format!("eglInitialize: {e}")))?;
        require_extensions(&egl, display)?;
        egl.bind_api(egl::OPENGL_ES_API).map_err(|e| no_display(format!("eglBindAPI: {e}")))?;

        let config_attribs = [
            egl::SURFACE_TYPE, egl::PBUFFER_BIT as egl::Int,
            egl::RENDERABLE_TYPE, 0x0040, /* EGL_OPENGL_ES3_BIT */
            egl::NONE,
        ];
        let config = egl
            .choose_config(display, &config_attribs, 1)
            .map_err(|e| no_display(format!("eglChooseConfig: {e}")))?
            .ok_or_else(|| no_display("no matching EGL config"))?;

        let context_attribs = [egl::CONTEXT_MAJOR_VERSION, 3, egl::CONTEXT_MINOR_VERSION, 1, egl::NONE];
        let context = egl
            .create_context(display, config, None, &context_attribs)
            .map_err(|e| no_display(format!("eglCreateContext: {e}")))?;
        egl.make_current(display, None, None, Some(context))
            .map_err(|e| no_display(format!("eglMakeCurrent: {e}")))?;

        let egl_for_loader = egl.clone();
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                egl_for_loader.get_proc_address(name).map(|p| p as *const _).unwrap_or(std::ptr::null())
            })
        };
        let gl = Rc::new(gl);

        let (matrix, offset) = shaders::matrix(colorspace, range);
        let luma_program = compile_program(&gl, VERTEX_SHADER, LUMA_FRAGMENT_SHADER)?;
        let chroma_program = compile_program(&gl, VERTEX_SHADER, CHROMA_FRAGMENT_SHADER)?;
        set_color_uniforms(&gl, luma_program, &matrix, &offset);
        set_color_uniforms(&gl, chroma_program, &matrix, &offset);

        let vao = make_quad_vao(&gl)?;
        let fbo = unsafe { gl.create_framebuffer() }.map_err(gl_error)?;

        Ok(Self { egl: Rc::new(egl), display, context, gl, luma_program, chroma_program, vao, fbo })
    }

    /// Imports a DMA-BUF plane set. `fourcc == NV12` imports two subplanes
    /// (luma R8, chroma GR88); anything else imports one multi-plane RGB image.
    pub fn import_frame(&self, planes: PlaneSet, width: u32, height: u32, fourcc: u32) -> Result<GpuFrame> {
        GpuFrame::new(self.egl.clone(), self.display, self.gl.clone(), planes, width, height, fourcc)
    }

    /// Renders `from_rgb_frame` into `to_nv12_frame`'s luma and chroma planes.
    pub fn convert(&self, from_rgb_frame: &GpuFrame, to_nv12_frame: &GpuFrame) -> Result<()> {
        if to_nv12_frame.plane_count() < 2 {
            return Err(gl_error("convert target is not an NV12 frame"));
        }

        self.render_pass(
            to_nv12_frame.texture(0),
            self.luma_program,
            from_rgb_frame,
            to_nv12_frame.width,
            to_nv12_frame.height,
            None,
        )?;

        let w = to_nv12_frame.width as f32;
        let h = to_nv12_frame.height as f32;
        let sample_offsets = [0.0, 0.0, 1.0 / w, 0.0, 0.0, 1.0 / h, 1.0 / w, 1.0 / h];
        self.render_pass(
            to_nv12_frame.texture(1),
            self.chroma_program,
            from_rgb_frame,
            to_nv12_frame.width / 2,
            to_nv12_frame.height / 2,
            Some(&sample_offsets),
        )?;

        self.sync()
    }

    fn render_pass(
        &self,
        target_texture: glow::NativeTexture,
        program: glow::NativeProgram,
        frame: &GpuFrame,
        vp_w: u32,
        vp_h: u32,
        sample_offsets: Option<&[f32; 8]>,
    ) -> Result<()> {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(target_texture), 0,
            );
            self.gl.viewport(0, 0, vp_w as i32, vp_h as i32);
            self.gl.use_program(Some(program));
            self.gl.bind_vertex_array(Some(self.vao));

            self.gl.active_texture(glow::TEXTURE0);
            self.gl.bind_texture(TEXTURE_EXTERNAL_OES, Some(frame.texture(0)));
            if let Some(loc) = self.gl.get_uniform_location(program, "u_rgb") {
                self.gl.uniform_1_i32(Some(&loc), 0);
            }
            if let Some(offsets) = sample_offsets {
                if let Some(loc) = self.gl.get_uniform_location(program, "u_sample_offsets") {
                    self.gl.uniform_2_f32_slice(Some(&loc), offsets);
                }
            }

            self.gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);

            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            let gl_err = self.gl.get_error();
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(gl_error(format!("framebuffer incomplete: 0x{status:x}")));
            }
            if gl_err != glow::NO_ERROR {
                return Err(gl_error(format!("glGetError: 0x{gl_err:x}")));
            }
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        unsafe {
            let fence = self
                .gl
                .fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0)
                .ok_or_else(|| gl_error("fence_sync returned null"))?;
            self.gl.client_wait_sync(fence, glow::SYNC_FLUSH_COMMANDS_BIT, 1_000_000_000);
            self.gl.delete_sync(fence);
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_framebuffer(self.fbo);
            self.gl.delete_vertex_array(self.vao);
            self.gl.delete_program(self.luma_program);
            self.gl.delete_program(self.chroma_program);
        }
        let _ = self.egl.destroy_context(self.display, self.context);
        let _ = self.egl.terminate(self.display);
    }
}

/// `EGL_KHR_surfaceless_context`, `EGL_KHR_no_config_context`,
/// `EGL_EXT_image_dma_buf_import`/`_modifiers` must all be present.
fn require_extensions(egl: &egl::DynamicInstance<egl::EGL1_5>, display: egl::Display) -> Result<()> {
    let extensions = egl.query_string(Some(display), egl::EXTENSIONS).map_err(|e| no_display(format!("{e}")))?;
    let extensions = extensions.to_string_lossy();
    for required in [
        "EGL_KHR_surfaceless_context",
        "EGL_KHR_no_config_context",
        "EGL_EXT_image_dma_buf_import",
    ] {
        if !extensions.contains(required) {
            return Err(no_display(format!("missing required EGL extension {required}")));
        }
    }
    Ok(())
}

fn set_color_uniforms(gl: &glow::Context, program: glow::NativeProgram, matrix: &[f32; 9], offset: &[f32; 3]) {
    unsafe {
        gl.use_program(Some(program));
        if let Some(loc) = gl.get_uniform_location(program, "u_color_matrix") {
            gl.uniform_matrix_3_f32_slice(Some(&loc), false, matrix);
        }
        if let Some(loc) = gl.get_uniform_location(program, "u_color_offset") {
            gl.uniform_3_f32(Some(&loc), offset[0], offset[1], offset[2]);
        }
        gl.use_program(None);
    }
}

fn compile_shader(gl: &glow::Context, kind: u32, source: &str) -> Result<glow::NativeShader> {
    unsafe {
        let shader = gl.create_shader(kind).map_err(gl_error)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(gl_error(format!("shader compile failed: {log}")));
        }
        Ok(shader)
    }
}

fn compile_program(gl: &glow::Context, vs_src: &str, fs_src: &str) -> Result<glow::NativeProgram> {
    unsafe {
        let vs = compile_shader(gl, glow::VERTEX_SHADER, vs_src)?;
        let fs = compile_shader(gl, glow::FRAGMENT_SHADER, fs_src)?;
        let program = gl.create_program().map_err(gl_error)?;
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(gl_error(format!("program link failed: {log}")));
        }
        Ok(program)
    }
}

fn make_quad_vao(gl: &glow::Context) -> Result<glow::NativeVertexArray> {
    unsafe {
        let vao = gl.create_vertex_array().map_err(gl_error)?;
        let vbo = gl.create_buffer().map_err(gl_error)?;
        gl.bind_vertex_array(Some(vao));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        let bytes: Vec<u8> = QUAD.iter().flat_map(|f| f.to_ne_bytes()).collect();
        gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);
        gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 16, 0);
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, 16, 8);
        gl.enable_vertex_attrib_array(1);
        gl.bind_vertex_array(None);
        Ok(vao)
    }
}

type ImageTargetTexture2dOes = unsafe extern "system" fn(target: u32, image: *mut std::ffi::c_void);

/// `glEGLImageTargetTexture2DOES` isn't in the core GLES table glow exposes;
/// it's resolved through `eglGetProcAddress` like the rest of `GL_OES_EGL_image`.
/// `target` must match whatever the texture was bound as: `TEXTURE_EXTERNAL_OES`
/// for `GL_OES_EGL_image_external` imports, `TEXTURE_2D` for plain
/// `GL_OES_EGL_image` imports (the latter is required for anything later
/// attached to an FBO, since `TEXTURE_EXTERNAL_OES` can never be a render
/// target).
pub(super) unsafe fn image_target_texture_2d_oes(
    egl: &egl::DynamicInstance<egl::EGL1_5>,
    image: egl::Image,
    target: u32,
) -> Result<()> {
    let proc_name = "glEGLImageTargetTexture2DOES";
    let ptr = egl.get_proc_address(proc_name).ok_or_else(|| gl_error(format!("{proc_name} not available")))?;
    let func: ImageTargetTexture2dOes = std::mem::transmute(ptr);
    func(target, image.as_ptr() as *mut _);
    Ok(())
}

fn no_display(detail: impl Into<String>) -> StreamError {
    StreamError::NoDisplay(ErrorContext::new("egl", detail.into()))
}

fn gl_error(detail: impl std::fmt::Display) -> StreamError {
    StreamError::GlError(ErrorContext::new("gl", detail.to_string()))
}
