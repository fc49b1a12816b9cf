//! In-memory backend used by the unit tests.
//!
//! Compilation fails on any line containing `syntax_error` (reporting that
//! line in ANGLE format) and linking fails when the fragment stage has no
//! `void main(`. Every handle is tracked so leaks show up as live counts.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::backend::{BackendError, GraphicsBackend};
use crate::types::ShaderStage;

#[derive(Debug, Default)]
pub struct FakeBackend {
    next_id: u32,
    shaders: HashMap<u32, (ShaderStage, String)>,
    programs: HashMap<u32, Vec<u32>>,
    linked_sources: HashMap<u32, String>,
    textures: HashSet<u32>,
    pub current: Option<u32>,
    pub uniforms: BTreeMap<String, Vec<f32>>,
    pub uniform_writes: usize,
    pub texture_uploads: Vec<Vec<u8>>,
    pub bound_textures: HashMap<u32, Option<u32>>,
    pub pixels: HashMap<(u32, u32), [u8; 4]>,
    pub frames: usize,
    pub draws: usize,
    pub viewport: (u32, u32),
}

impl FakeBackend {
    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn uniform(&self, name: &str) -> Option<&[f32]> {
        self.uniforms.get(name).map(Vec::as_slice)
    }

    fn write(&mut self, location: &(u32, String), values: Vec<f32>) {
        self.uniform_writes += 1;
        self.uniforms.insert(location.1.clone(), values);
    }
}

impl GraphicsBackend for FakeBackend {
    type Shader = u32;
    type Program = u32;
    type Location = (u32, String);
    type Texture = u32;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32, BackendError> {
        let id = self.id();
        self.shaders.insert(id, (stage, String::new()));
        Ok(id)
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<(), String> {
        if let Some(entry) = self.shaders.get_mut(&shader) {
            entry.1 = source.to_string();
        }
        match source.lines().position(|line| line.contains("syntax_error")) {
            Some(index) => Err(format!(
                "ERROR: 0:{}: 'syntax_error' : syntax error\n",
                index + 1
            )),
            None => Ok(()),
        }
    }

    fn delete_shader(&mut self, shader: u32) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Result<u32, BackendError> {
        let id = self.id();
        self.programs.insert(id, Vec::new());
        Ok(id)
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        if let Some(attached) = self.programs.get_mut(&program) {
            attached.push(shader);
        }
    }

    fn detach_shader(&mut self, program: u32, shader: u32) {
        if let Some(attached) = self.programs.get_mut(&program) {
            attached.retain(|id| *id != shader);
        }
    }

    fn link_program(&mut self, program: u32) -> Result<(), String> {
        let attached = self.programs.get(&program).cloned().unwrap_or_default();
        let fragment = attached
            .iter()
            .filter_map(|id| self.shaders.get(id))
            .find(|(stage, _)| *stage == ShaderStage::Fragment)
            .map(|(_, source)| source.clone())
            .unwrap_or_default();
        if !fragment.contains("void main(") {
            return Err("ERROR: Missing main()\n".into());
        }
        self.linked_sources.insert(program, fragment);
        Ok(())
    }

    fn delete_program(&mut self, program: u32) {
        self.programs.remove(&program);
        self.linked_sources.remove(&program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: Option<u32>) {
        self.current = program;
    }

    fn uniform_location(&mut self, program: u32, name: &str) -> Option<(u32, String)> {
        let source = self.linked_sources.get(&program)?;
        let declared = source.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with("uniform ")
                && line
                    .split(';')
                    .next()
                    .and_then(|declaration| declaration.split_whitespace().last())
                    .map(|declared| declared.split('[').next().unwrap_or(declared))
                    == Some(name)
        });
        declared.then(|| (program, name.to_string()))
    }

    fn set_uniform_1f(&mut self, location: &(u32, String), x: f32) {
        self.write(location, vec![x]);
    }

    fn set_uniform_2f(&mut self, location: &(u32, String), x: f32, y: f32) {
        self.write(location, vec![x, y]);
    }

    fn set_uniform_3f(&mut self, location: &(u32, String), x: f32, y: f32, z: f32) {
        self.write(location, vec![x, y, z]);
    }

    fn set_uniform_4f(&mut self, location: &(u32, String), x: f32, y: f32, z: f32, w: f32) {
        self.write(location, vec![x, y, z, w]);
    }

    fn set_uniform_1i(&mut self, location: &(u32, String), x: i32) {
        self.write(location, vec![x as f32]);
    }

    fn set_uniform_1iv(&mut self, location: &(u32, String), values: &[i32]) {
        self.write(location, values.iter().map(|&x| x as f32).collect());
    }

    fn create_texture(&mut self) -> Result<u32, BackendError> {
        let id = self.id();
        self.textures.insert(id);
        Ok(id)
    }

    fn upload_texture_row(&mut self, _texture: u32, data: &[u8]) {
        self.texture_uploads.push(data.to_vec());
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<u32>) {
        self.bound_textures.insert(unit, texture);
    }

    fn delete_texture(&mut self, texture: u32) {
        self.textures.remove(&texture);
    }

    fn begin_frame(&mut self, width: u32, height: u32) {
        self.frames += 1;
        self.viewport = (width, height);
    }

    fn draw_fullscreen_quad(&mut self) {
        self.draws += 1;
    }

    fn read_pixel(&mut self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get(&(x, y)).copied().unwrap_or([0; 4])
    }
}
