use std::borrow::Cow;

use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::ShaderStage;

use crate::error::RenderError;
use crate::types::FrameSampling;

/// Parses and validates GLSL with naga so compile failures carry a readable log.
pub(crate) fn validate_glsl(source: &str, stage: ShaderStage) -> Result<(), RenderError> {
    let stage_name = stage_name(stage);
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(stage), source)
        .map_err(|errors| RenderError::ShaderCompile {
            stage: stage_name,
            log: errors.emit_to_string(source),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| RenderError::ShaderCompile {
            stage: stage_name,
            log: error.emit_to_string(source),
        })?;
    Ok(())
}

/// Validates `source` and builds a shader module from it.
pub(crate) fn compile_shader(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, RenderError> {
    validate_glsl(source, stage)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ShaderCompile {
            stage: stage_name(stage),
            log: error.to_string(),
        });
    }
    Ok(module)
}

/// Fragment program matching how the adapter can read the frame texture.
pub(crate) fn fragment_source(sampling: FrameSampling) -> &'static str {
    match sampling {
        FrameSampling::Filtered => FRAGMENT_SHADER_FILTERED,
        FrameSampling::Nearest => FRAGMENT_SHADER_NEAREST,
    }
}

fn stage_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::Fragment => "fragment",
        _ => "compute",
    }
}

/// Full-screen quad vertex shader.
///
/// The uniform block layout must match `BlurUniforms` in `gpu/uniforms.rs`.
pub(crate) const VERTEX_SHADER: &str = r"#version 450
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec2 a_texCoord;
layout(location = 0) out vec2 v_texCoord;

layout(std140, set = 0, binding = 0) uniform BlurParams {
    mat4 u_vertexMatrix;
    mat4 u_textureMatrix;
    vec2 u_radius;
} params;

void main() {
    v_texCoord = (params.u_textureMatrix * vec4(a_texCoord, 0.0, 1.0)).xy;
    gl_Position = params.u_vertexMatrix * vec4(a_position, 1.0);
}
";

/// Radial blur: 32 directions, 40 samples each at `radius * i / 40`.
pub(crate) const FRAGMENT_SHADER_FILTERED: &str = r"#version 450
layout(location = 0) in vec2 v_texCoord;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform BlurParams {
    mat4 u_vertexMatrix;
    mat4 u_textureMatrix;
    vec2 u_radius;
} params;

layout(set = 1, binding = 0) uniform texture2D s_baseMap;
layout(set = 1, binding = 1) uniform sampler s_baseSampler;

const float TAU = 6.28318530718;
const int DIRECTIONS = 32;
const int SAMPLES = 40;

void main() {
    vec4 color = vec4(0.0);
    for (int d = 0; d < DIRECTIONS; d++) {
        float angle = TAU * float(d) / float(DIRECTIONS);
        vec2 direction = vec2(cos(angle), sin(angle));
        for (int i = 1; i <= SAMPLES; i++) {
            vec2 offset = direction * params.u_radius * (float(i) / float(SAMPLES));
            color += textureLod(sampler2D(s_baseMap, s_baseSampler), v_texCoord + offset, 0.0);
        }
    }
    outColor = color / float(DIRECTIONS * SAMPLES);
}
";

/// Same blur through nearest texel fetches, for frame formats the adapter
/// cannot filter.
pub(crate) const FRAGMENT_SHADER_NEAREST: &str = r"#version 450
layout(location = 0) in vec2 v_texCoord;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform BlurParams {
    mat4 u_vertexMatrix;
    mat4 u_textureMatrix;
    vec2 u_radius;
} params;

layout(set = 1, binding = 0) uniform texture2D s_baseMap;
layout(set = 1, binding = 1) uniform sampler s_baseSampler;

const float TAU = 6.28318530718;
const int DIRECTIONS = 32;
const int SAMPLES = 40;

void main() {
    ivec2 size = textureSize(sampler2D(s_baseMap, s_baseSampler), 0);
    ivec2 last = size - ivec2(1);
    vec4 color = vec4(0.0);
    for (int d = 0; d < DIRECTIONS; d++) {
        float angle = TAU * float(d) / float(DIRECTIONS);
        vec2 direction = vec2(cos(angle), sin(angle));
        for (int i = 1; i <= SAMPLES; i++) {
            vec2 offset = direction * params.u_radius * (float(i) / float(SAMPLES));
            vec2 uv = clamp(v_texCoord + offset, vec2(0.0), vec2(1.0));
            ivec2 texel = clamp(ivec2(uv * vec2(size)), ivec2(0), last);
            color += texelFetch(sampler2D(s_baseMap, s_baseSampler), texel, 0);
        }
    }
    outColor = color / float(DIRECTIONS * SAMPLES);
}
";
