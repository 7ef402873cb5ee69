//! GPU path of the compositor (glow, drawn through an egui paint callback)
//!
//! One program, one texture and an empty vertex array: the vertex shader
//! builds a full-screen triangle from `gl_VertexID`, so there is no vertex
//! data to upload. The texture is re-uploaded only when a new frame has been
//! taken from the exchange; every other repaint samples the previous upload.

use eframe::glow::{self, HasContext};
use image::RgbaImage;

use super::crt::{CrtParams, FRAGMENT_SHADER, VERTEX_SHADER};
use super::CompositorError;

const SHADER_VERSION: &str = "#version 330\n";

/// GL objects plus the front image they sample
pub struct GpuCompositor {
    program: glow::Program,
    vertex_array: glow::VertexArray,
    texture: glow::Texture,
    /// Last frame taken from the exchange
    front: RgbaImage,
    upload_pending: bool,
    uploads: u64,
}

impl GpuCompositor {
    /// Compile the CRT program and allocate the texture
    pub fn new(gl: &glow::Context, front: RgbaImage) -> Result<Self, CompositorError> {
        unsafe {
            let program = gl.create_program().map_err(CompositorError::Resource)?;

            let sources = [
                (glow::VERTEX_SHADER, VERTEX_SHADER),
                (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
            ];
            let mut shaders = Vec::with_capacity(sources.len());
            for (kind, source) in sources {
                let shader = match gl.create_shader(kind) {
                    Ok(shader) => shader,
                    Err(e) => {
                        gl.delete_program(program);
                        return Err(CompositorError::Resource(e));
                    }
                };
                gl.shader_source(shader, &format!("{}{}", SHADER_VERSION, source));
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let info = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    for shader in shaders {
                        gl.delete_shader(shader);
                    }
                    gl.delete_program(program);
                    return Err(CompositorError::ShaderCompile(info));
                }
                gl.attach_shader(program, shader);
                shaders.push(shader);
            }

            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            for shader in shaders {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }
            if !linked {
                let info = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(CompositorError::ProgramLink(info));
            }

            let vertex_array = match gl.create_vertex_array() {
                Ok(vao) => vao,
                Err(e) => {
                    gl.delete_program(program);
                    return Err(CompositorError::Resource(e));
                }
            };

            let texture = match gl.create_texture() {
                Ok(texture) => texture,
                Err(e) => {
                    gl.delete_vertex_array(vertex_array);
                    gl.delete_program(program);
                    return Err(CompositorError::Resource(e));
                }
            };
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.bind_texture(glow::TEXTURE_2D, None);

            log::info!("CRT compositor initialized on the GPU");

            Ok(Self {
                program,
                vertex_array,
                texture,
                front,
                upload_pending: true,
                uploads: 0,
            })
        }
    }

    /// The image the next paint samples
    pub fn front(&self) -> &RgbaImage {
        &self.front
    }

    pub fn front_mut(&mut self) -> &mut RgbaImage {
        &mut self.front
    }

    /// Schedule a texture upload for the next paint
    pub fn mark_dirty(&mut self) {
        self.upload_pending = true;
    }

    /// Texture uploads performed so far
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Draw the CRT surface into the current viewport
    pub fn paint(&mut self, gl: &glow::Context, params: &CrtParams) {
        let (width, height) = self.front.dimensions();
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));

            if self.upload_pending {
                gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    glow::RGBA8 as i32,
                    width as i32,
                    height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    Some(self.front.as_raw()),
                );
                self.upload_pending = false;
                self.uploads += 1;
            }

            gl.use_program(Some(self.program));
            let uniform = |name: &str| gl.get_uniform_location(self.program, name);
            gl.uniform_1_i32(uniform("u_frame").as_ref(), 0);
            gl.uniform_2_f32(
                uniform("u_texel").as_ref(),
                1.0 / width.max(1) as f32,
                1.0 / height.max(1) as f32,
            );
            gl.uniform_1_f32(uniform("u_threshold").as_ref(), params.threshold);
            gl.uniform_1_f32(uniform("u_strength").as_ref(), params.strength);
            gl.uniform_1_f32(uniform("u_vignette").as_ref(), params.vignette);
            gl.uniform_1_f32(uniform("u_glow").as_ref(), params.glow);

            gl.bind_vertex_array(Some(self.vertex_array));
            gl.draw_arrays(glow::TRIANGLES, 0, 3);

            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    }

    /// Release the GL objects
    pub fn destroy(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_texture(self.texture);
            gl.delete_vertex_array(self.vertex_array);
            gl.delete_program(self.program);
        }
    }
}
