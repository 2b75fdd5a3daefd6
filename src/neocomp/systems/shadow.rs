// Drop shadows
//
// Each shadowed window owns a shadow texture sized to its geometry
// plus a fixed 64px border on every side. The silhouette is rendered
// from the window texture through its shape face with the stencil
// counting writes, blurred at a fixed level, then noise-modulated and
// clipped so the window never sees its own shadow through itself.
use crate::neocomp::config::Options;
use crate::neocomp::windows::{ShadowCache, WinList, WindowState, CK};
use utils::log;

use cgmath::{Vector2, Vector3};
use lumen::assets::AssetCache;
use lumen::blur::{texture_blur, TextureBlurData};
use lumen::framebuffer::Framebuffer;
use lumen::renderbuffer::RenderBuffer;
use lumen::renderutil::{draw_rect, ortho_view};
use lumen::texture::Texture;
use swiss::{EntityId, Query, QueryCursor};

/// The fixed shadow radius around the window.
const SHADOW_RADIUS: f32 = 64.0;

/// The fixed dual-Kawase level shadows blur at.
const SHADOW_BLUR_LEVEL: u32 = 4;

fn new_cache() -> Result<ShadowCache, lumen::LumenError> {
    let border = Vector2::new(SHADOW_RADIUS, SHADOW_RADIUS);

    let mut texture = Texture::new_nospace(gl::TEXTURE_2D)?;
    let mut effect = match Texture::new_nospace(gl::TEXTURE_2D) {
        Ok(effect) => effect,
        Err(e) => {
            texture.delete();
            return Err(e);
        }
    };
    let mut noise = match Texture::new_noise(gl::TEXTURE_2D) {
        Ok(noise) => noise,
        Err(e) => {
            texture.delete();
            effect.delete();
            return Err(e);
        }
    };
    let stencil = match RenderBuffer::new_stencil(Vector2::new(1.0, 1.0)) {
        Ok(stencil) => stencil,
        Err(e) => {
            texture.delete();
            effect.delete();
            noise.delete();
            return Err(e);
        }
    };

    Ok(ShadowCache {
        texture,
        effect,
        noise,
        stencil,
        border,
        window_size: Vector2::new(0.0, 0.0),
    })
}

fn resize_cache(cache: &mut ShadowCache, size: Vector2<f32>) {
    cache.window_size = size;
    let overflow = size + cache.border * 2.0;
    cache.texture.resize(overflow);
    cache.effect.resize(overflow);
    cache.stencil.resize(overflow);
}

fn delete_cache(cache: &mut ShadowCache) {
    cache.texture.delete();
    cache.effect.delete();
    cache.noise.delete();
    cache.stencil.delete();
}

/// Cache lifecycle, no GL work beyond allocation and release.
pub fn tick(list: &mut WinList, options: &Options) {
    // Resizing invalidates the rendered silhouette
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Resize)
            .has(CK::Shadow)
            .has(CK::ContentsDamaged),
    );
    while let Some(id) = cursor.next(&list.em) {
        let new_size = list.resize.get(id).unwrap().new_size;
        resize_cache(list.shadow.get_mut(id).unwrap(), new_size);
        list.em.ensure(CK::ShadowDamaged, id);
    }

    // Hidden and destroyed windows lose their shadow
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Shadow));
    while let Some(id) = cursor.next(&list.em) {
        let state = list.state(id);
        if state == Some(WindowState::Destroyed) || state == Some(WindowState::Invisible) {
            if let Some(mut cache) = list.shadow.take(id) {
                delete_cache(&mut cache);
            }
            list.em.remove_component(CK::Shadow, id);
        }
    }

    // Bypassed windows never cast shadows
    let mut cursor = QueryCursor::new(Query::new().has(CK::Bypass).has(CK::Shadow));
    while let Some(id) = cursor.next(&list.em) {
        if let Some(mut cache) = list.shadow.take(id) {
            delete_cache(&mut cache);
        }
        list.em.remove_component(CK::Shadow, id);
    }

    // Mapped, textured windows that may shadow grow a cache
    let wants_shadow: Vec<EntityId> = list
        .em
        .iter(
            &Query::new()
                .has(CK::Mud)
                .has(CK::Map)
                .has(CK::Textured)
                .not(CK::Shadow)
                .not(CK::Bypass),
        )
        .collect();
    for id in wants_shadow {
        let mud = list.mud.get(id).unwrap();
        // The per-window flag plus the wintype table gate shadowing;
        // the shadow-exclude rule already cleared the flag
        if !(mud.shadow && options.wintype_shadow[mud.window_type as usize]) {
            continue;
        }
        match new_cache() {
            Ok(cache) => {
                list.em.add(CK::Shadow, id);
                list.shadow.set(id, cache);
            }
            Err(e) => log::error!("Failed initializing window shadow: {}", e),
        }
    }

    // Mapping sizes the cache and forces a redraw
    let mut cursor = QueryCursor::new(
        Query::new().has(CK::Map).has(CK::Physical).has(CK::Shadow),
    );
    while let Some(id) = cursor.next(&list.em) {
        let size = list.physical.get(id).unwrap().size;
        resize_cache(list.shadow.get_mut(id).unwrap(), size);
        list.em.ensure(CK::ShadowDamaged, id);
    }
}

pub struct ShadowSystem {
    fbo: Framebuffer,
}

impl ShadowSystem {
    pub fn new() -> Result<ShadowSystem, lumen::LumenError> {
        Ok(ShadowSystem {
            fbo: Framebuffer::new()?,
        })
    }

    /// Re-render every ShadowDamaged shadow texture.
    pub fn update_shadows(&mut self, list: &mut WinList, assets: &mut AssetCache) {
        let query = Query::new()
            .has(CK::Mud)
            .has(CK::Textured)
            .has(CK::Physical)
            .has(CK::ShadowDamaged)
            .has(CK::Shadow);

        let damaged: Vec<EntityId> = list.em.iter(&query).collect();
        if damaged.is_empty() {
            return;
        }

        let shadow_program = match assets.load_shader("shadow.shader") {
            Ok(program) => program,
            Err(e) => {
                log::error!("Failed loading the shadow shader: {}", e);
                return;
            }
        };
        let postshadow_program = match assets.load_shader("postshadow.shader") {
            Ok(program) => program,
            Err(e) => {
                log::error!("Failed loading the postshadow shader: {}", e);
                return;
            }
        };
        let downsample = match assets.load_shader("downsample.shader") {
            Ok(program) => program,
            Err(e) => {
                log::error!("Failed loading the downsample shader: {}", e);
                return;
            }
        };
        let upsample = match assets.load_shader("upsample.shader") {
            Ok(program) => program,
            Err(e) => {
                log::error!("Failed loading the upsample shader: {}", e);
                return;
            }
        };
        let plain_face = match assets.load_face("window.face") {
            Ok(face) => face,
            Err(e) => {
                log::error!("Failed loading the window face: {}", e);
                return;
            }
        };

        unsafe {
            gl::Disable(gl::BLEND);
            gl::Disable(gl::SCISSOR_TEST);
            gl::StencilMask(0xFF);
            gl::ClearColor(0.0, 0.0, 0.0, 0.0);
            gl::ClearStencil(0);
        }

        // Clear all the shadow textures we are about to render into
        for id in damaged.iter().copied() {
            let cache = list.shadow.get(id).unwrap();
            self.fbo.reset_target();
            self.fbo.target_texture(&cache.texture);
            self.fbo.target_renderbuffer_stencil(&cache.stencil);
            if self.fbo.rebind().is_err() {
                continue;
            }
            unsafe {
                gl::Viewport(0, 0, cache.texture.size.x as i32, cache.texture.size.y as i32);
                gl::Clear(gl::STENCIL_BUFFER_BIT | gl::COLOR_BUFFER_BIT);
            }
        }

        // Render the silhouettes, stencil counting every write
        {
            let mut program = shadow_program.borrow_mut();
            program.set_future_sampler("tex_scr", 0);

            for id in damaged.iter().copied() {
                let size = list.physical.get(id).unwrap().size;
                let flipped = list.textured.get(id).unwrap().texture.flipped;
                let cache = list.shadow.get(id).unwrap();

                self.fbo.reset_target();
                self.fbo.target_texture(&cache.texture);
                self.fbo.target_renderbuffer_stencil(&cache.stencil);
                if self.fbo.rebind().is_err() {
                    log::error!("Failed binding the shadow framebuffer");
                    continue;
                }

                let view = ortho_view(0.0, cache.texture.size.x, 0.0, cache.texture.size.y);
                unsafe {
                    gl::Viewport(
                        0,
                        0,
                        cache.texture.size.x as i32,
                        cache.texture.size.y as i32,
                    );
                    gl::Enable(gl::STENCIL_TEST);
                    gl::StencilFunc(gl::EQUAL, 0, 0xFF);
                    gl::StencilOp(gl::KEEP, gl::KEEP, gl::INCR);
                }

                program.set_future_bool("flip", flipped);
                program.use_program();

                list.textured.get(id).unwrap().texture.bind(gl::TEXTURE0);

                let face = match list.shaped.get(id) {
                    Some(shaped) => &shaped.face,
                    None => plain_face.as_ref(),
                };
                let pos = Vector3::new(cache.border.x, cache.border.y, 0.0);
                draw_rect(&program, &view, face, pos, size);

                unsafe {
                    gl::Disable(gl::STENCIL_TEST);
                }
            }
        }

        // Blur each silhouette into its effect texture
        for id in damaged.iter().copied() {
            let cache = list.shadow.get_mut(id).unwrap();
            let mut blur_data = TextureBlurData {
                tex: &mut cache.texture,
                swap: &mut cache.effect,
            };
            if let Err(e) = texture_blur(
                &mut blur_data,
                &mut self.fbo,
                &plain_face,
                &mut downsample.borrow_mut(),
                &mut upsample.borrow_mut(),
                SHADOW_BLUR_LEVEL,
                false,
            ) {
                log::error!("Failed blurring the shadow texture: {}", e);
                return;
            }
        }

        // Noise-modulate and clip out the original footprint. Only
        // stencil-zero pixels survive, so the window shape stays clear.
        {
            let mut program = postshadow_program.borrow_mut();
            program.set_future_sampler("tex_scr", 0);
            program.set_future_sampler("noise_scr", 1);

            for id in damaged.iter().copied() {
                let cache = list.shadow.get(id).unwrap();

                self.fbo.reset_target();
                self.fbo.target_texture(&cache.effect);
                self.fbo.target_renderbuffer_stencil(&cache.stencil);
                if self.fbo.rebind().is_err() {
                    log::error!("Failed binding framebuffer to clip shadow");
                    continue;
                }

                let view = ortho_view(0.0, cache.effect.size.x, 0.0, cache.effect.size.y);
                unsafe {
                    gl::Viewport(
                        0,
                        0,
                        cache.effect.size.x as i32,
                        cache.effect.size.y as i32,
                    );
                    gl::Clear(gl::COLOR_BUFFER_BIT);

                    gl::Enable(gl::STENCIL_TEST);
                    gl::StencilMask(0);
                    gl::StencilFunc(gl::EQUAL, 0, 0xFF);
                    gl::StencilOp(gl::KEEP, gl::KEEP, gl::KEEP);
                }

                program.set_future_bool("flip", cache.texture.flipped);
                program.use_program();

                cache.texture.bind(gl::TEXTURE0);
                cache.noise.bind(gl::TEXTURE1);

                draw_rect(
                    &program,
                    &view,
                    &plain_face,
                    Vector3::new(0.0, 0.0, 0.0),
                    cache.effect.size,
                );

                unsafe {
                    gl::StencilMask(0xFF);
                    gl::Disable(gl::STENCIL_TEST);
                }
            }
        }

        list.em.reset_component(CK::ShadowDamaged);
    }
}
