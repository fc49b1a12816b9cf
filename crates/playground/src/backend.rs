//! Abstraction over the graphics API used to compile and draw shaders.
//!
//! The session only speaks this trait, which keeps the pipeline testable
//! with an in-memory backend and lets the binary plug in `glow`.

use std::fmt::Debug;

use thiserror::Error;

use crate::types::ShaderStage;

/// Failures of the backend itself, as opposed to rejected shader source.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to create {0} shader object")]
    CreateShader(ShaderStage),
    #[error("failed to create program object: {0}")]
    CreateProgram(String),
    #[error("failed to create texture: {0}")]
    CreateTexture(String),
    #[error("graphics backend error: {0}")]
    Other(String),
}

/// Minimal set of GL-style calls the playground needs.
///
/// Handles are opaque associated types; `compile_shader` and `link_program`
/// return the driver's info log on failure.
pub trait GraphicsBackend {
    type Shader: Copy + Debug;
    type Program: Copy + Debug + PartialEq;
    type Location: Clone + Debug;
    type Texture: Copy + Debug;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, BackendError>;
    fn compile_shader(&mut self, shader: Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Result<Self::Program, BackendError>;
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn link_program(&mut self, program: Self::Program) -> Result<(), String>;
    fn delete_program(&mut self, program: Self::Program);
    fn use_program(&mut self, program: Option<Self::Program>);

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::Location>;
    fn set_uniform_1f(&mut self, location: &Self::Location, x: f32);
    fn set_uniform_2f(&mut self, location: &Self::Location, x: f32, y: f32);
    fn set_uniform_3f(&mut self, location: &Self::Location, x: f32, y: f32, z: f32);
    fn set_uniform_4f(&mut self, location: &Self::Location, x: f32, y: f32, z: f32, w: f32);
    fn set_uniform_1i(&mut self, location: &Self::Location, x: i32);
    fn set_uniform_1iv(&mut self, location: &Self::Location, values: &[i32]);

    fn create_texture(&mut self) -> Result<Self::Texture, BackendError>;
    /// Uploads `data` as a single-row, single-channel texture.
    fn upload_texture_row(&mut self, texture: Self::Texture, data: &[u8]);
    fn bind_texture(&mut self, unit: u32, texture: Option<Self::Texture>);
    fn delete_texture(&mut self, texture: Self::Texture);

    /// Sets the viewport and clears the surface.
    fn begin_frame(&mut self, width: u32, height: u32);
    fn draw_fullscreen_quad(&mut self);
    /// Reads back one RGBA8 pixel, origin at the bottom-left.
    fn read_pixel(&mut self, x: u32, y: u32) -> [u8; 4];
}
