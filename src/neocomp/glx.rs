// The GL context and pixmap-backed window textures
//
// GLX goes through Xlib, on its own connection to the same server the
// protocol work runs on; the ids (windows, pixmaps) are server-side
// and shared. We need a 3.2 core context on the overlay window plus
// GLX_EXT_texture_from_pixmap to sample window contents directly.
use crate::neocomp::CompError;
use utils::log;

use cgmath::Vector2;
use lumen::texture::Texture;
use x11_dl::glx::{self, Glx};
use x11_dl::xlib::{self, Xlib};

use std::ffi::CString;
use std::os::raw::{c_int, c_ulong, c_void};

// GLX_EXT_texture_from_pixmap tokens, not covered by the x11-dl consts
const GLX_BIND_TO_TEXTURE_RGBA_EXT: c_int = 0x20D1;
const GLX_BIND_TO_TEXTURE_RGB_EXT: c_int = 0x20D0;
const GLX_Y_INVERTED_EXT: c_int = 0x20D4;
const GLX_TEXTURE_FORMAT_EXT: c_int = 0x20D5;
const GLX_TEXTURE_TARGET_EXT: c_int = 0x20D6;
const GLX_TEXTURE_2D_EXT: c_int = 0x20DC;
const GLX_TEXTURE_FORMAT_RGB_EXT: c_int = 0x20D9;
const GLX_TEXTURE_FORMAT_RGBA_EXT: c_int = 0x20DA;
const GLX_FRONT_LEFT_EXT: c_int = 0x20DE;

const GLX_CONTEXT_MAJOR_VERSION_ARB: c_int = 0x2091;
const GLX_CONTEXT_MINOR_VERSION_ARB: c_int = 0x2092;
const GLX_CONTEXT_PROFILE_MASK_ARB: c_int = 0x9126;
const GLX_CONTEXT_CORE_PROFILE_BIT_ARB: c_int = 0x0001;

type GlXCreateContextAttribsArb = unsafe extern "C" fn(
    *mut xlib::Display,
    glx::GLXFBConfig,
    glx::GLXContext,
    c_int,
    *const c_int,
) -> glx::GLXContext;
type GlXBindTexImageExt =
    unsafe extern "C" fn(*mut xlib::Display, glx::GLXDrawable, c_int, *const c_int);
type GlXReleaseTexImageExt =
    unsafe extern "C" fn(*mut xlib::Display, glx::GLXDrawable, c_int);
type GlXSwapIntervalExt =
    unsafe extern "C" fn(*mut xlib::Display, glx::GLXDrawable, c_int);

/// A GLX framebuffer config a window visual can bind through.
#[derive(Copy, Clone)]
pub struct WinVis {
    pub visual_id: c_ulong,
    pub rgb: bool,
    pub rgba: bool,
    config: glx::GLXFBConfig,
}

pub struct GlxContext {
    xlib: Xlib,
    glx: Glx,
    pub display: *mut xlib::Display,
    context: glx::GLXContext,
    /// The drawable the final composite lands on (the overlay window)
    target: c_ulong,
    /// Pixmap-bindable configs, sorted by visual id
    configs: Vec<WinVis>,
    bind_tex_image: GlXBindTexImageExt,
    release_tex_image: GlXReleaseTexImageExt,
    swap_interval: Option<GlXSwapIntervalExt>,
}

fn load_proc(glx: &Glx, name: &str) -> Option<*mut c_void> {
    let cname = CString::new(name).unwrap();
    let addr = unsafe { (glx.glXGetProcAddress)(cname.as_ptr() as *const u8) };
    addr.map(|f| f as *mut c_void)
}

impl GlxContext {
    /// Build the 3.2 core context on the overlay window and load the
    /// texture-from-pixmap entry points.
    pub fn new(overlay: u32, screen_num: usize) -> Result<GlxContext, CompError> {
        let xlib = Xlib::open().map_err(|e| CompError::GpuError(e.to_string()))?;
        let glx = Glx::open().map_err(|e| CompError::GpuError(e.to_string()))?;

        unsafe {
            let display = (xlib.XOpenDisplay)(std::ptr::null());
            if display.is_null() {
                return Err(CompError::GpuError("failed opening the display".to_string()));
            }
            let screen = screen_num as c_int;

            // Check GLX_EXT_texture_from_pixmap before anything else
            let exts = (glx.glXQueryExtensionsString)(display, screen);
            if exts.is_null() {
                return Err(CompError::GpuError(
                    "failed getting the GLX extension list".to_string(),
                ));
            }
            let exts = std::ffi::CStr::from_ptr(exts).to_string_lossy();
            if !exts
                .split_whitespace()
                .any(|e| e == "GLX_EXT_texture_from_pixmap")
            {
                return Err(CompError::GpuError(
                    "missing GLX_EXT_texture_from_pixmap".to_string(),
                ));
            }

            // Collect the configs window pixmaps can bind through, and
            // find a double-buffered one with stencil for the target
            let mut num_configs: c_int = 0;
            let raw_configs = (glx.glXGetFBConfigs)(display, screen, &mut num_configs);
            if raw_configs.is_null() {
                return Err(CompError::GpuError(
                    "failed retrieving the fbconfigs".to_string(),
                ));
            }

            let mut configs = Vec::new();
            let mut target_config: Option<glx::GLXFBConfig> = None;

            for i in 0..num_configs as isize {
                let config = *raw_configs.offset(i);
                let mut value: c_int = 0;

                (glx.glXGetFBConfigAttrib)(
                    display,
                    config,
                    GLX_BIND_TO_TEXTURE_RGB_EXT,
                    &mut value,
                );
                let rgb = value != 0;
                (glx.glXGetFBConfigAttrib)(
                    display,
                    config,
                    GLX_BIND_TO_TEXTURE_RGBA_EXT,
                    &mut value,
                );
                let rgba = value != 0;

                let mut visual_id: c_int = 0;
                (glx.glXGetFBConfigAttrib)(display, config, glx::GLX_VISUAL_ID, &mut visual_id);

                if rgb || rgba {
                    configs.push(WinVis {
                        visual_id: visual_id as c_ulong,
                        rgb,
                        rgba,
                        config,
                    });
                }

                if target_config.is_none() {
                    let mut doublebuffer: c_int = 0;
                    let mut stencil: c_int = 0;
                    let mut renderable: c_int = 0;
                    (glx.glXGetFBConfigAttrib)(
                        display,
                        config,
                        glx::GLX_DOUBLEBUFFER,
                        &mut doublebuffer,
                    );
                    (glx.glXGetFBConfigAttrib)(
                        display,
                        config,
                        glx::GLX_STENCIL_SIZE,
                        &mut stencil,
                    );
                    (glx.glXGetFBConfigAttrib)(
                        display,
                        config,
                        glx::GLX_X_RENDERABLE,
                        &mut renderable,
                    );
                    if doublebuffer != 0 && stencil > 0 && renderable != 0 {
                        target_config = Some(config);
                    }
                }
            }
            (xlib.XFree)(raw_configs as *mut c_void);

            configs.sort_by_key(|vis| vis.visual_id);

            let target_config = target_config.ok_or_else(|| {
                CompError::GpuError(
                    "no double-buffered fbconfig with a stencil buffer".to_string(),
                )
            })?;

            // 3.2 core via glXCreateContextAttribsARB
            let create_context = load_proc(&glx, "glXCreateContextAttribsARB").ok_or_else(
                || CompError::GpuError("failed to get glXCreateContextAttribsARB".to_string()),
            )?;
            let create_context: GlXCreateContextAttribsArb = std::mem::transmute(create_context);

            let attribs = [
                GLX_CONTEXT_MAJOR_VERSION_ARB,
                3,
                GLX_CONTEXT_MINOR_VERSION_ARB,
                2,
                GLX_CONTEXT_PROFILE_MASK_ARB,
                GLX_CONTEXT_CORE_PROFILE_BIT_ARB,
                0,
            ];
            let context = create_context(
                display,
                target_config,
                std::ptr::null_mut(),
                1,
                attribs.as_ptr(),
            );
            if context.is_null() {
                return Err(CompError::GpuError("failed to get a GLX context".to_string()));
            }

            let target = overlay as c_ulong;
            if (glx.glXMakeCurrent)(display, target, context) == 0 {
                return Err(CompError::GpuError(
                    "failed to attach the GLX context".to_string(),
                ));
            }

            // Load GL itself through GLX
            gl::load_with(|name| {
                load_proc(&glx, name).unwrap_or(std::ptr::null_mut()) as *const _
            });

            let version = gl::GetString(gl::VERSION);
            if !version.is_null() {
                log::debug!(
                    "OpenGL version {}",
                    std::ffi::CStr::from_ptr(version as *const _).to_string_lossy()
                );
            }

            let bind_tex_image = load_proc(&glx, "glXBindTexImageEXT")
                .map(|f| std::mem::transmute::<_, GlXBindTexImageExt>(f))
                .ok_or_else(|| {
                    CompError::GpuError("failed to acquire glXBindTexImageEXT".to_string())
                })?;
            let release_tex_image = load_proc(&glx, "glXReleaseTexImageEXT")
                .map(|f| std::mem::transmute::<_, GlXReleaseTexImageExt>(f))
                .ok_or_else(|| {
                    CompError::GpuError("failed to acquire glXReleaseTexImageEXT".to_string())
                })?;
            let swap_interval = load_proc(&glx, "glXSwapIntervalEXT")
                .map(|f| std::mem::transmute::<_, GlXSwapIntervalExt>(f));

            // Core profile wants a VAO bound for any draw
            let mut vao = 0;
            gl::GenVertexArrays(1, &mut vao);
            gl::BindVertexArray(vao);

            Ok(GlxContext {
                xlib,
                glx,
                display,
                context,
                target,
                configs,
                bind_tex_image,
                release_tex_image,
                swap_interval,
            })
        }
    }

    /// Pick the pixmap-bindable config for a visual.
    pub fn select_config(&self, visual_id: u32) -> Option<WinVis> {
        self.configs
            .binary_search_by_key(&(visual_id as c_ulong), |vis| vis.visual_id)
            .ok()
            .map(|i| self.configs[i])
    }

    pub fn set_swap_interval(&self, interval: i32) {
        if let Some(swap_interval) = self.swap_interval {
            unsafe {
                swap_interval(self.display, self.target, interval);
            }
        }
    }

    pub fn swap_buffers(&self) {
        unsafe {
            (self.glx.glXSwapBuffers)(self.display, self.target);
        }
    }

    pub fn finish(&self) {
        unsafe {
            gl::Finish();
        }
    }

    pub fn destroy(&mut self) {
        unsafe {
            (self.glx.glXMakeCurrent)(self.display, 0, std::ptr::null_mut());
            (self.glx.glXDestroyContext)(self.display, self.context);
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}

/// A window's live contents: an X pixmap bound to a GL texture.
pub struct WindowDrawable {
    pub xid: u32,
    pub texture: Texture,
    pixmap: c_ulong,
    glx_pixmap: glx::GLXDrawable,
    bound: bool,
    config: Option<WinVis>,
}

impl WindowDrawable {
    pub fn new(glx: &GlxContext, xid: u32, visual_id: u32) -> Result<WindowDrawable, CompError> {
        let texture = Texture::new_nospace(gl::TEXTURE_2D)
            .map_err(|e| CompError::GpuError(e.to_string()))?;

        Ok(WindowDrawable {
            xid,
            texture,
            pixmap: 0,
            glx_pixmap: 0,
            bound: false,
            config: glx.select_config(visual_id),
        })
    }

    /// Bind the named window pixmap to our texture. The pixmap must be
    /// fresh, from composite NameWindowPixmap after the latest resize.
    pub fn bind(
        &mut self,
        glx: &GlxContext,
        pixmap: u32,
        size: Vector2<f32>,
    ) -> Result<(), CompError> {
        assert!(!self.bound);

        let config = match self.config {
            Some(config) => config,
            None => {
                return Err(CompError::GpuError(format!(
                    "no fbconfig for window {:#010x}",
                    self.xid
                )))
            }
        };

        unsafe {
            let mut y_inverted: c_int = 0;
            (glx.glx.glXGetFBConfigAttrib)(
                glx.display,
                config.config,
                GLX_Y_INVERTED_EXT,
                &mut y_inverted,
            );
            self.texture.flipped = y_inverted != 0;

            // Prefer RGBA so alpha channels survive
            let format = if config.rgba {
                GLX_TEXTURE_FORMAT_RGBA_EXT
            } else {
                GLX_TEXTURE_FORMAT_RGB_EXT
            };

            let attribs = [
                GLX_TEXTURE_TARGET_EXT,
                GLX_TEXTURE_2D_EXT,
                GLX_TEXTURE_FORMAT_EXT,
                format,
                0,
            ];
            self.glx_pixmap = (glx.glx.glXCreatePixmap)(
                glx.display,
                config.config,
                pixmap as c_ulong,
                attribs.as_ptr(),
            );
            self.pixmap = pixmap as c_ulong;
            self.texture.size = size;

            self.texture.bind(gl::TEXTURE0);
            (glx.bind_tex_image)(
                glx.display,
                self.glx_pixmap,
                GLX_FRONT_LEFT_EXT,
                std::ptr::null(),
            );
        }

        self.bound = true;
        Ok(())
    }

    pub fn unbind(&mut self, glx: &GlxContext) {
        if !self.bound {
            return;
        }
        unsafe {
            self.texture.bind(gl::TEXTURE0);
            (glx.release_tex_image)(glx.display, self.glx_pixmap, GLX_FRONT_LEFT_EXT);
            (glx.glx.glXDestroyPixmap)(glx.display, self.glx_pixmap);
            (glx.xlib.XFreePixmap)(glx.display, self.pixmap);
        }
        self.pixmap = 0;
        self.bound = false;
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn delete(&mut self, glx: &GlxContext) {
        self.unbind(glx);
        self.texture.delete();
    }
}
