// GL texture wrapper
//
// Allocation is split from storage assignment so that externally backed
// textures (window pixmaps) and special formats can pick their own
// storage after the name exists.
use crate::{LumenError, Result};

use cgmath::Vector2;
use gl::types::{GLenum, GLuint};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub struct Texture {
    pub gl_texture: GLuint,
    pub target: GLenum,
    pub size: Vector2<f32>,
    /// Whether the content is y-inverted relative to GL conventions.
    /// Pixmap-backed textures set this from GLX_Y_INVERTED_EXT.
    pub flipped: bool,
}

fn generate_texture(target: GLenum) -> GLuint {
    let mut tex: GLuint = 0;
    unsafe {
        gl::GenTextures(1, &mut tex);
        if tex == 0 {
            return 0;
        }

        gl::BindTexture(target, tex);
        gl::TexParameteri(target, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
        gl::TexParameteri(target, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
        gl::TexParameteri(target, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
        gl::TexParameteri(target, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
    }
    tex
}

impl Texture {
    /// Allocate a texture with RGBA8 storage of the given size.
    pub fn new(target: GLenum, size: Vector2<f32>) -> Result<Texture> {
        let mut tex = Self::new_nospace(target)?;
        unsafe {
            gl::TexImage2D(
                target,
                0,
                gl::RGBA8 as i32,
                size.x as i32,
                size.y as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
        }
        tex.size = size;
        Ok(tex)
    }

    /// Allocate only the texture name. Storage comes later, either from
    /// a resize or from an external bind.
    pub fn new_nospace(target: GLenum) -> Result<Texture> {
        let gl_texture = generate_texture(target);
        if gl_texture == 0 {
            return Err(LumenError::AllocFailed);
        }

        Ok(Texture {
            gl_texture,
            target,
            size: Vector2::new(0.0, 0.0),
            flipped: false,
        })
    }

    /// Allocate a tiled RGB noise texture. Used as the dither source in
    /// the post-shadow pass.
    pub fn new_noise(target: GLenum) -> Result<Texture> {
        const NOISE_TILE: usize = 128;

        let mut tex = Self::new_nospace(target)?;

        let mut rng = StdRng::seed_from_u64(0x6e6f6973);
        let mut pixels = vec![0u8; NOISE_TILE * NOISE_TILE * 3];
        rng.fill(pixels.as_mut_slice());

        unsafe {
            gl::BindTexture(target, tex.gl_texture);
            gl::TexParameteri(target, gl::TEXTURE_WRAP_S, gl::REPEAT as i32);
            gl::TexParameteri(target, gl::TEXTURE_WRAP_T, gl::REPEAT as i32);
            gl::TexImage2D(
                target,
                0,
                gl::RGB as i32,
                NOISE_TILE as i32,
                NOISE_TILE as i32,
                0,
                gl::RGB,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const _,
            );
        }
        tex.size = Vector2::new(NOISE_TILE as f32, NOISE_TILE as f32);
        Ok(tex)
    }

    pub fn initialized(&self) -> bool {
        self.gl_texture != 0
    }

    pub fn resize(&mut self, size: Vector2<f32>) {
        assert!(self.initialized());
        unsafe {
            gl::BindTexture(self.target, self.gl_texture);
            gl::TexImage2D(
                self.target,
                0,
                gl::RGBA as i32,
                size.x as i32,
                size.y as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                std::ptr::null(),
            );
            gl::BindTexture(self.target, 0);
        }
        self.size = size;
    }

    pub fn bind(&self, unit: GLenum) {
        unsafe {
            gl::ActiveTexture(unit);
            gl::BindTexture(self.target, self.gl_texture);
        }
    }

    /// Attach to the currently bound draw framebuffer at `attachment`.
    pub fn bind_to_framebuffer(&self, attachment: GLenum) {
        unsafe {
            gl::FramebufferTexture2D(
                gl::DRAW_FRAMEBUFFER,
                attachment,
                self.target,
                self.gl_texture,
                0,
            );
        }
    }

    /// Copy a region of `buffer` in `framebuffer` into this texture.
    pub fn read_from(
        &mut self,
        framebuffer: GLuint,
        buffer: GLenum,
        pos: Vector2<f32>,
        size: Vector2<f32>,
    ) -> Result<()> {
        if self.size.x < size.x || self.size.y < size.y {
            return Err(LumenError::AllocFailed);
        }
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, framebuffer);
            gl::ReadBuffer(buffer);

            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(self.target, self.gl_texture);
            gl::CopyTexSubImage2D(
                self.target,
                0,
                0,
                0,
                pos.x as i32,
                pos.y as i32,
                size.x as i32,
                size.y as i32,
            );
        }
        Ok(())
    }

    /// Release the GL name. The context must still be current; textures
    /// are deleted explicitly by the systems that own them.
    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteTextures(1, &self.gl_texture);
        }
        self.gl_texture = 0;
        self.target = 0;
        self.size = Vector2::new(0.0, 0.0);
    }
}
