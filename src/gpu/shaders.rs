//! GLSL ES 3.1 source for the luma and chroma RGB→NV12 conversion passes,
//! plus the numeric colorspace matrices they're parameterized by.

use beam_bitstream::{Colorspace, Range};

use crate::config::StreamConfig;

/// Row-major 3x3 RGB->YCbCr matrix plus a constant offset, as used by the
/// luma/chroma fragment shaders' `u_color_matrix`/`u_color_offset` uniforms.
/// Kept alongside the shader source rather than on `beam_bitstream::Colorspace`
/// itself, since that crate stays free of any GPU-facing concern.
pub fn matrix(colorspace: Colorspace, range: Range) -> ([f32; 9], [f32; 3]) {
    let (kr, kb) = match colorspace {
        Colorspace::Bt601 => (0.299f32, 0.114f32),
        Colorspace::Bt709 => (0.2126f32, 0.0722f32),
    };
    let kg = 1.0 - kr - kb;

    let (y_scale, y_offset, c_scale) = match range {
        Range::Narrow => (219.0f32 / 255.0, 16.0f32 / 255.0, 224.0f32 / 255.0),
        Range::Full => (1.0f32, 0.0f32, 1.0f32),
    };

    let matrix = [
        kr * y_scale, kg * y_scale, kb * y_scale,
        -0.5 * kr / (1.0 - kb) * c_scale, -0.5 * kg / (1.0 - kb) * c_scale, 0.5 * c_scale,
        0.5 * c_scale, -0.5 * kg / (1.0 - kr) * c_scale, -0.5 * kb / (1.0 - kr) * c_scale,
    ];
    let offset = [y_offset, 0.5, 0.5];
    (matrix, offset)
}

pub fn resolve(config: &StreamConfig) -> (Colorspace, Range) {
    // No CLI surface for colorspace/range selection is specified; BT.709
    // narrow range is the conventional default for desktop capture.
    let _ = config;
    (Colorspace::Bt709, Range::Narrow)
}

pub const VERTEX_SHADER: &str = r#"#version 310 es
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;
out vec2 v_uv;
void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

pub const LUMA_FRAGMENT_SHADER: &str = r#"#version 310 es
#extension GL_OES_EGL_image_external_essl3 : require
precision highp float;
in vec2 v_uv;
out vec4 frag_color;
uniform samplerExternalOES u_rgb;
uniform mat3 u_color_matrix;
uniform vec3 u_color_offset;
void main() {
    vec3 rgb = texture(u_rgb, v_uv).rgb;
    float y = dot(u_color_matrix[0], rgb) + u_color_offset.x;
    frag_color = vec4(y, 0.0, 0.0, 1.0);
}
"#;

pub const CHROMA_FRAGMENT_SHADER: &str = r#"#version 310 es
#extension GL_OES_EGL_image_external_essl3 : require
precision highp float;
in vec2 v_uv;
out vec4 frag_color;
uniform samplerExternalOES u_rgb;
uniform mat3 u_color_matrix;
uniform vec3 u_color_offset;
uniform vec2 u_sample_offsets[4];
void main() {
    vec3 cb_cr = vec3(0.0);
    for (int i = 0; i < 4; i++) {
        vec3 rgb = texture(u_rgb, v_uv + u_sample_offsets[i]).rgb;
        cb_cr.y += dot(u_color_matrix[1], rgb);
        cb_cr.z += dot(u_color_matrix[2], rgb);
    }
    cb_cr.yz = cb_cr.yz * 0.25 + u_color_offset.yz;
    frag_color = vec4(cb_cr.y, cb_cr.z, 0.0, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bt601_and_bt709_narrow_range_produce_distinct_matrices() {
        let (m601, _) = matrix(Colorspace::Bt601, Range::Narrow);
        let (m709, _) = matrix(Colorspace::Bt709, Range::Narrow);
        assert_ne!(m601, m709);
    }

    #[test]
    fn full_range_uses_unit_luma_scale() {
        let (_, offset) = matrix(Colorspace::Bt709, Range::Full);
        assert_eq!(offset[0], 0.0);
    }
}
