// Immediate-style draw helpers shared by every pass
use crate::face::Face;
use crate::shader::ShaderProgram;
use crate::texture::Texture;

use cgmath::{Matrix4, Vector2, Vector3};

/// Draw `face` scaled to `size` at `pos` under `view`. The face mesh is
/// normalized to the unit square, so the model transform is a scale
/// plus a translate. The program must already be active.
pub fn draw_rect(
    program: &ShaderProgram,
    view: &Matrix4<f32>,
    face: &Face,
    pos: Vector3<f32>,
    size: Vector2<f32>,
) {
    let model = Matrix4::from_translation(pos)
        * Matrix4::from_nonuniform_scale(size.x, size.y, 1.0);
    let mvp = view * model;
    program.set_mvp(&mvp);

    unsafe {
        gl::EnableVertexAttribArray(0);
        gl::BindBuffer(gl::ARRAY_BUFFER, face.gl_vertex);
        gl::VertexAttribPointer(0, 3, gl::FLOAT, gl::FALSE, 0, std::ptr::null());
        gl::EnableVertexAttribArray(1);
        gl::BindBuffer(gl::ARRAY_BUFFER, face.gl_uv);
        gl::VertexAttribPointer(1, 2, gl::FLOAT, gl::FALSE, 0, std::ptr::null());

        gl::DrawArrays(gl::TRIANGLES, 0, face.vertex_count as i32);

        gl::DisableVertexAttribArray(1);
        gl::DisableVertexAttribArray(0);
    }
}

/// Draw a texture through the passthrough program.
pub fn draw_tex(
    program: &mut ShaderProgram,
    view: &Matrix4<f32>,
    face: &Face,
    texture: &Texture,
    pos: Vector3<f32>,
    size: Vector2<f32>,
) {
    program.set_future_bool("flip", texture.flipped);
    program.set_future_float("opacity", 1.0);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    texture.bind(gl::TEXTURE0);
    draw_rect(program, view, face, pos, size);
}

/// The orthographic projection every offscreen pass uses: x/y in the
/// given extent, z in [-1, 1] with larger z nearer.
pub fn ortho_view(left: f32, right: f32, bottom: f32, top: f32) -> Matrix4<f32> {
    cgmath::ortho(left, right, bottom, top, -1.0, 1.0)
}
