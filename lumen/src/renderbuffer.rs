// GL renderbuffer wrapper, color or depth-stencil flavored
use crate::{LumenError, Result};

use cgmath::Vector2;
use gl::types::{GLenum, GLuint};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BufferType {
    Color,
    Stencil,
}

pub struct RenderBuffer {
    pub gl_buffer: GLuint,
    pub buffer_type: BufferType,
    pub size: Vector2<f32>,
}

fn generate_buffer(size: Vector2<f32>, format: GLenum) -> GLuint {
    let mut b: GLuint = 0;
    unsafe {
        gl::GenRenderbuffers(1, &mut b);
        if b == 0 {
            return 0;
        }

        gl::BindRenderbuffer(gl::RENDERBUFFER, b);
        gl::RenderbufferStorage(gl::RENDERBUFFER, format, size.x as i32, size.y as i32);
        gl::BindRenderbuffer(gl::RENDERBUFFER, 0);
    }
    b
}

impl RenderBuffer {
    pub fn new(size: Vector2<f32>) -> Result<RenderBuffer> {
        let gl_buffer = generate_buffer(size, gl::RGBA);
        if gl_buffer == 0 {
            return Err(LumenError::AllocFailed);
        }
        Ok(RenderBuffer {
            gl_buffer,
            buffer_type: BufferType::Color,
            size,
        })
    }

    pub fn new_stencil(size: Vector2<f32>) -> Result<RenderBuffer> {
        let gl_buffer = generate_buffer(size, gl::DEPTH24_STENCIL8);
        if gl_buffer == 0 {
            return Err(LumenError::AllocFailed);
        }
        Ok(RenderBuffer {
            gl_buffer,
            buffer_type: BufferType::Stencil,
            size,
        })
    }

    pub fn initialized(&self) -> bool {
        self.gl_buffer != 0
    }

    pub fn resize(&mut self, size: Vector2<f32>) {
        assert!(self.initialized());
        let format = match self.buffer_type {
            BufferType::Color => gl::RGBA,
            BufferType::Stencil => gl::DEPTH24_STENCIL8,
        };
        unsafe {
            gl::BindRenderbuffer(gl::RENDERBUFFER, self.gl_buffer);
            gl::RenderbufferStorage(gl::RENDERBUFFER, format, size.x as i32, size.y as i32);
            gl::BindRenderbuffer(gl::RENDERBUFFER, 0);
        }
        self.size = size;
    }

    /// Attach to the currently bound draw framebuffer at `attachment`.
    pub fn bind_to_framebuffer(&self, attachment: GLenum) {
        unsafe {
            gl::FramebufferRenderbuffer(
                gl::DRAW_FRAMEBUFFER,
                attachment,
                gl::RENDERBUFFER,
                self.gl_buffer,
            );
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteRenderbuffers(1, &self.gl_buffer);
        }
        self.gl_buffer = 0;
        self.size = Vector2::new(0.0, 0.0);
    }
}
