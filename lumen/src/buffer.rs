// Streaming GL buffer object
use crate::{LumenError, Result};
use utils::log;

use gl::types::GLuint;

pub struct BufferObject {
    pub gl_buffer: GLuint,
    bo_size: usize,
}

impl BufferObject {
    pub fn new(size: usize) -> Result<BufferObject> {
        let mut b: GLuint = 0;
        unsafe {
            gl::GenBuffers(1, &mut b);
        }
        if b == 0 {
            log::error!("Failed generating bufferobject");
            return Err(LumenError::AllocFailed);
        }

        unsafe {
            gl::BindBuffer(gl::TEXTURE_BUFFER, b);
            gl::BufferData(
                gl::TEXTURE_BUFFER,
                size as isize,
                std::ptr::null(),
                gl::STREAM_DRAW,
            );
        }

        Ok(BufferObject {
            gl_buffer: b,
            bo_size: size,
        })
    }

    pub fn initialized(&self) -> bool {
        self.gl_buffer != 0
    }

    pub fn size(&self) -> usize {
        self.bo_size
    }

    pub fn update(&mut self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.bo_size);
        unsafe {
            gl::BindBuffer(gl::TEXTURE_BUFFER, self.gl_buffer);
            gl::BufferSubData(
                gl::TEXTURE_BUFFER,
                offset as isize,
                data.len() as isize,
                data.as_ptr() as *const _,
            );
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteBuffers(1, &self.gl_buffer);
        }
        self.gl_buffer = 0;
    }
}
