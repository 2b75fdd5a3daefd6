// The Lumen GL render primitives
//
// Everything GPU-side the compositor touches goes through this crate:
// textures, renderbuffers, the retargetable framebuffer, buffer objects,
// face meshes, shader programs with their uniform reflection, the asset
// cache and the dual-Kawase blur. The GL context itself is owned by the
// caller; every call here assumes it is current on this thread.

pub mod assets;
pub mod blur;
pub mod buffer;
pub mod face;
pub mod framebuffer;
pub mod renderbuffer;
pub mod renderutil;
pub mod shader;
pub mod texture;

pub use assets::AssetCache;
pub use blur::{texture_blur, TextureBlurData};
pub use buffer::BufferObject;
pub use face::Face;
pub use framebuffer::{FbTarget, Framebuffer};
pub use renderbuffer::RenderBuffer;
pub use renderutil::{draw_rect, draw_tex};
pub use shader::{ShaderProgram, UniformType, UniformValue};
pub use texture::Texture;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LumenError {
    #[error("gl would not allocate an object name")]
    AllocFailed,
    #[error("framebuffer is incomplete")]
    IncompleteFramebuffer,
    #[error("failed compiling shader {0}: {1}")]
    ShaderCompile(String, String),
    #[error("failed linking shader program: {0}")]
    ShaderLink(String),
    #[error("malformed asset {0}: {1}")]
    BadAsset(String, String),
    #[error("uniform \"{0}\" is not declared in shader {1}")]
    MissingUniform(String, String),
    #[error("no asset named {0} on the search paths")]
    NoSuchAsset(String),
    #[error("io error reading asset")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LumenError>;
