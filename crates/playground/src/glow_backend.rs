//! [`GraphicsBackend`] over a live `glow` context.
//!
//! Shaders are GLSL ES 1.00, so the context should be GLES 2.0/3.0.

use glow::HasContext;
use tracing::debug;

use crate::backend::{BackendError, GraphicsBackend};
use crate::types::ShaderStage;

const POSITION_ATTRIBUTE: u32 = 0;

/// Two triangles covering clip space.
const QUAD: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, //
    -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

pub struct GlowBackend {
    gl: glow::Context,
    vertex_array: Option<glow::NativeVertexArray>,
    quad: glow::NativeBuffer,
}

impl GlowBackend {
    /// Creates the quad geometry. The context must be current.
    pub fn new(gl: glow::Context) -> Result<Self, BackendError> {
        unsafe {
            // GLES 2.0 has no vertex array objects; fall back to the default state.
            let vertex_array = gl.create_vertex_array().ok();
            if let Some(vao) = vertex_array {
                gl.bind_vertex_array(Some(vao));
            }
            let quad = gl.create_buffer().map_err(BackendError::Other)?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(quad));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&QUAD),
                glow::STATIC_DRAW,
            );
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            debug!(vao = vertex_array.is_some(), "created full-screen quad");
            Ok(Self {
                gl,
                vertex_array,
                quad,
            })
        }
    }

    /// Deletes the quad geometry. The context must still be current.
    pub fn destroy(self) {
        unsafe {
            self.gl.delete_buffer(self.quad);
            if let Some(vao) = self.vertex_array {
                self.gl.delete_vertex_array(vao);
            }
        }
    }
}

impl GraphicsBackend for GlowBackend {
    type Shader = glow::NativeShader;
    type Program = glow::NativeProgram;
    type Location = glow::NativeUniformLocation;
    type Texture = glow::NativeTexture;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, BackendError> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(kind) }.map_err(|_| BackendError::CreateShader(stage))
    }

    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> Result<(), String> {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&mut self) -> Result<Self::Program, BackendError> {
        unsafe { self.gl.create_program() }.map_err(BackendError::CreateProgram)
    }

    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&mut self, program: Self::Program) -> Result<(), String> {
        unsafe {
            self.gl
                .bind_attrib_location(program, POSITION_ATTRIBUTE, "a_position");
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&mut self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Location> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn set_uniform_1f(&mut self, location: &Self::Location, x: f32) {
        unsafe { self.gl.uniform_1_f32(Some(location), x) }
    }

    fn set_uniform_2f(&mut self, location: &Self::Location, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(location), x, y) }
    }

    fn set_uniform_3f(&mut self, location: &Self::Location, x: f32, y: f32, z: f32) {
        unsafe { self.gl.uniform_3_f32(Some(location), x, y, z) }
    }

    fn set_uniform_4f(&mut self, location: &Self::Location, x: f32, y: f32, z: f32, w: f32) {
        unsafe { self.gl.uniform_4_f32(Some(location), x, y, z, w) }
    }

    fn set_uniform_1i(&mut self, location: &Self::Location, x: i32) {
        unsafe { self.gl.uniform_1_i32(Some(location), x) }
    }

    fn set_uniform_1iv(&mut self, location: &Self::Location, values: &[i32]) {
        unsafe { self.gl.uniform_1_i32_slice(Some(location), values) }
    }

    fn create_texture(&mut self) -> Result<Self::Texture, BackendError> {
        unsafe {
            let texture = self.gl.create_texture().map_err(BackendError::CreateTexture)?;
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            for (parameter, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                self.gl
                    .tex_parameter_i32(glow::TEXTURE_2D, parameter, value as i32);
            }
            self.gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn upload_texture_row(&mut self, texture: Self::Texture, data: &[u8]) {
        let Ok(width) = i32::try_from(data.len()) else {
            return;
        };
        if width == 0 {
            return;
        }
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::LUMINANCE as i32,
                width,
                1,
                0,
                glow::LUMINANCE,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(data)),
            );
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<Self::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn begin_frame(&mut self, width: u32, height: u32) {
        let width = i32::try_from(width).unwrap_or(i32::MAX);
        let height = i32::try_from(height).unwrap_or(i32::MAX);
        unsafe {
            self.gl.viewport(0, 0, width, height);
            self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw_fullscreen_quad(&mut self) {
        unsafe {
            if let Some(vao) = self.vertex_array {
                self.gl.bind_vertex_array(Some(vao));
            }
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.quad));
            self.gl.enable_vertex_attrib_array(POSITION_ATTRIBUTE);
            self.gl
                .vertex_attrib_pointer_f32(POSITION_ATTRIBUTE, 2, glow::FLOAT, false, 0, 0);
            self.gl.draw_arrays(glow::TRIANGLES, 0, 6);
        }
    }

    fn read_pixel(&mut self, x: u32, y: u32) -> [u8; 4] {
        let mut pixel = [0u8; 4];
        unsafe {
            self.gl.read_pixels(
                x as i32,
                y as i32,
                1,
                1,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut pixel[..])),
            );
        }
        pixel
    }
}
