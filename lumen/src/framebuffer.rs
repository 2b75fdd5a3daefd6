// A single FBO reconfigured per pass
//
// There is one framebuffer per render subsystem, retargeted with a
// bitmask of attachments before each pass. Rebinding an attachment is
// much cheaper than cycling FBO objects, so do not create one per
// binding.
use crate::renderbuffer::RenderBuffer;
use crate::texture::Texture;
use crate::{LumenError, Result};
use utils::log;

use bitflags::bitflags;
use gl::types::{GLenum, GLuint};

bitflags! {
    pub struct FbTarget: u32 {
        const BACKBUFFER          = 0b0001;
        const TEXTURE             = 0b0010;
        const RENDERBUFFER        = 0b0100;
        const RENDERBUFFER_STENCIL = 0b1000;
    }
}

/// An attachment remembered by GL name, so targeting does not hold a
/// borrow on the texture between retarget and rebind.
#[derive(Copy, Clone, Default)]
struct Attachment {
    a_gl: GLuint,
    a_target: GLenum,
}

pub struct Framebuffer {
    pub gl_fbo: GLuint,
    fb_target: FbTarget,
    fb_texture: Attachment,
    fb_buffer: Attachment,
    fb_buffer_stencil: Attachment,
}

impl Framebuffer {
    pub fn new() -> Result<Framebuffer> {
        let mut fbo: GLuint = 0;
        unsafe {
            gl::GenFramebuffers(1, &mut fbo);
        }
        if fbo == 0 {
            return Err(LumenError::AllocFailed);
        }
        Ok(Framebuffer {
            gl_fbo: fbo,
            fb_target: FbTarget::empty(),
            fb_texture: Attachment::default(),
            fb_buffer: Attachment::default(),
            fb_buffer_stencil: Attachment::default(),
        })
    }

    pub fn initialized(&self) -> bool {
        self.gl_fbo != 0
    }

    pub fn reset_target(&mut self) {
        assert!(self.gl_fbo != 0);
        self.fb_target = FbTarget::empty();
    }

    pub fn target_texture(&mut self, texture: &Texture) {
        assert!(self.gl_fbo != 0);
        assert!(texture.initialized());
        if self.fb_target.contains(FbTarget::TEXTURE) {
            log::error!("Framebuffer is already targeting a texture");
            return;
        }
        self.fb_target |= FbTarget::TEXTURE;
        self.fb_texture = Attachment {
            a_gl: texture.gl_texture,
            a_target: texture.target,
        };
    }

    pub fn target_renderbuffer(&mut self, buffer: &RenderBuffer) {
        assert!(self.gl_fbo != 0);
        assert!(buffer.initialized());
        if self.fb_target.contains(FbTarget::RENDERBUFFER) {
            log::error!("Framebuffer is already targeting a renderbuffer");
            return;
        }
        self.fb_target |= FbTarget::RENDERBUFFER;
        self.fb_buffer = Attachment {
            a_gl: buffer.gl_buffer,
            a_target: gl::RENDERBUFFER,
        };
    }

    pub fn target_renderbuffer_stencil(&mut self, buffer: &RenderBuffer) {
        assert!(self.gl_fbo != 0);
        assert!(buffer.initialized());
        if self.fb_target.contains(FbTarget::RENDERBUFFER_STENCIL) {
            log::error!("Framebuffer is already targeting a renderbuffer stencil");
            return;
        }
        self.fb_target |= FbTarget::RENDERBUFFER_STENCIL;
        self.fb_buffer_stencil = Attachment {
            a_gl: buffer.gl_buffer,
            a_target: gl::RENDERBUFFER,
        };
    }

    pub fn target_back(&mut self) {
        self.fb_target |= FbTarget::BACKBUFFER;
    }

    /// Bind for drawing and rebind the current targets, if any.
    pub fn bind(&mut self) -> Result<()> {
        unsafe {
            gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, self.gl_fbo);
        }

        if self.fb_target.is_empty() {
            return Ok(());
        }
        self.rebind()
    }

    /// Reattach the current targets and select draw buffers. Fails when
    /// the resulting framebuffer is incomplete.
    pub fn rebind(&mut self) -> Result<()> {
        let mut drawbufs: [GLenum; 4] = [0; 4];
        let mut i = 0;

        unsafe {
            if self.fb_target.contains(FbTarget::BACKBUFFER) {
                drawbufs[i] = gl::BACK_LEFT;
                i += 1;
            }
            if self.fb_target.contains(FbTarget::TEXTURE) {
                gl::FramebufferTexture2D(
                    gl::DRAW_FRAMEBUFFER,
                    gl::COLOR_ATTACHMENT1,
                    self.fb_texture.a_target,
                    self.fb_texture.a_gl,
                    0,
                );
                drawbufs[i] = gl::COLOR_ATTACHMENT1;
                i += 1;
            }
            if self.fb_target.contains(FbTarget::RENDERBUFFER) {
                gl::FramebufferRenderbuffer(
                    gl::DRAW_FRAMEBUFFER,
                    gl::COLOR_ATTACHMENT0,
                    gl::RENDERBUFFER,
                    self.fb_buffer.a_gl,
                );
                drawbufs[i] = gl::COLOR_ATTACHMENT0;
                i += 1;
            }
            if self.fb_target.contains(FbTarget::RENDERBUFFER_STENCIL) {
                gl::FramebufferRenderbuffer(
                    gl::DRAW_FRAMEBUFFER,
                    gl::DEPTH_STENCIL_ATTACHMENT,
                    gl::RENDERBUFFER,
                    self.fb_buffer_stencil.a_gl,
                );
            }

            if gl::CheckFramebufferStatus(gl::DRAW_FRAMEBUFFER) != gl::FRAMEBUFFER_COMPLETE {
                return Err(LumenError::IncompleteFramebuffer);
            }

            gl::DrawBuffers(i.max(1) as i32, drawbufs.as_ptr());
        }
        Ok(())
    }

    pub fn bind_read(&self) {
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.gl_fbo);
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteFramebuffers(1, &self.gl_fbo);
        }
        self.fb_target = FbTarget::empty();
        self.gl_fbo = 0;
    }
}
