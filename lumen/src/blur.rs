// Dual-Kawase blur
//
// N downsample passes each halving the covered area, then N upsample
// passes doubling it back, ping-ponging between two equally sized
// textures. Every pass samples with a half-pixel tap offset in the
// shader and clamps its UVs at the live content extent so shrunken
// intermediate levels never bleed garbage from the unused texture area.
use crate::face::Face;
use crate::framebuffer::Framebuffer;
use crate::renderutil::{draw_rect, ortho_view};
use crate::shader::ShaderProgram;
use crate::texture::Texture;
use crate::Result;

use cgmath::{ElementWise, Vector2, Vector3};

/// The inputs one blur works on. `tex` holds the source on entry and
/// the blurred result on return; `swap` is scratch of the same size.
pub struct TextureBlurData<'a> {
    pub tex: &'a mut Texture,
    pub swap: &'a mut Texture,
}

fn set_pass_uniforms(
    program: &mut ShaderProgram,
    pixeluv: Vector2<f32>,
    source_size: Vector2<f32>,
    target_size: Vector2<f32>,
) -> Vector2<f32> {
    let round_target = Vector2::new(target_size.x.ceil(), target_size.y.ceil());
    let scale = pixeluv.mul_element_wise(round_target);

    let uv_max = pixeluv.mul_element_wise(source_size) - pixeluv;

    program.set_vec2("extent", uv_max);
    program.set_vec2("uvscale", pixeluv.mul_element_wise(Vector2::new(
        source_size.x.ceil(),
        source_size.y.ceil(),
    )));

    scale
}

/// Blur `data.tex` in place at the given level.
///
/// The pass count is even, so the result always lands back in the
/// texture the caller handed in.
pub fn texture_blur(
    data: &mut TextureBlurData,
    fbo: &mut Framebuffer,
    face: &Face,
    downsample: &mut ShaderProgram,
    upsample: &mut ShaderProgram,
    level: u32,
    transparent: bool,
) -> Result<()> {
    assert!(data.tex.initialized());
    assert!(data.swap.initialized());

    let full_size = data.tex.size;
    let pixeluv = Vector2::new(1.0 / full_size.x, 1.0 / full_size.y);
    let view = ortho_view(0.0, 1.0, 0.0, 1.0);

    unsafe {
        gl::Disable(gl::STENCIL_TEST);
        gl::Disable(gl::SCISSOR_TEST);
    }

    let mut src: &mut Texture = &mut *data.tex;
    let mut dst: &mut Texture = &mut *data.swap;

    // Downscale
    downsample.set_future_bool("flip", false);
    downsample.set_future_sampler("tex_scr", 0);
    downsample.set_future_vec2("pixeluv", pixeluv);
    downsample.use_program();

    for i in 0..level {
        let source_size = full_size / 2f32.powi(i as i32);
        let target_size = source_size / 2.0;

        fbo.reset_target();
        fbo.target_texture(dst);
        fbo.bind()?;

        unsafe {
            gl::Viewport(0, 0, full_size.x as i32, full_size.y as i32);
        }

        src.bind(gl::TEXTURE0);

        if transparent {
            unsafe {
                gl::ClearColor(0.0, 0.0, 0.0, 0.0);
                gl::Clear(gl::COLOR_BUFFER_BIT);
            }
        }

        downsample.set_vec2("pixeluv", pixeluv);
        downsample.set_sampler("tex_scr", 0);
        let scale = set_pass_uniforms(downsample, pixeluv, source_size, target_size);
        draw_rect(downsample, &view, face, Vector3::new(0.0, 0.0, 0.0), scale);

        std::mem::swap(&mut src, &mut dst);
    }

    // Upscale
    upsample.set_future_bool("flip", false);
    upsample.set_future_sampler("tex_scr", 0);
    upsample.set_future_vec2("pixeluv", pixeluv);
    upsample.use_program();

    for i in 0..level {
        let source_size = full_size / 2f32.powi((level - i) as i32);
        let target_size = source_size * 2.0;

        fbo.reset_target();
        fbo.target_texture(dst);
        fbo.bind()?;

        unsafe {
            gl::Viewport(0, 0, full_size.x as i32, full_size.y as i32);
            gl::ClearColor(0.0, 0.0, 0.0, 0.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }

        src.bind(gl::TEXTURE0);

        upsample.set_vec2("pixeluv", pixeluv);
        upsample.set_sampler("tex_scr", 0);
        let scale = set_pass_uniforms(upsample, pixeluv, source_size, target_size);
        draw_rect(upsample, &view, face, Vector3::new(0.0, 0.0, 0.0), scale);

        std::mem::swap(&mut src, &mut dst);
    }

    Ok(())
}
