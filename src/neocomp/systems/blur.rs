// Behind-window blur
//
// Each translucent window caches a blurred copy of everything behind
// it. Fades dirty the caches of the windows they shine through, and
// resizes dirty everything above; the update pass then redraws each
// dirty cache back-to-front and runs the dual-Kawase ping-pong on it.
use crate::neocomp::render;
use crate::neocomp::systems::order::{fetch_sorted_windows, Order};
use crate::neocomp::windows::{win_overlap, BlurCache, WinList, WindowState, CK};
use utils::log;

use cgmath::Vector2;
use lumen::assets::AssetCache;
use lumen::blur::{texture_blur, TextureBlurData};
use lumen::framebuffer::Framebuffer;
use lumen::renderbuffer::RenderBuffer;
use lumen::renderutil::{draw_rect, ortho_view};
use lumen::texture::Texture;
use swiss::{EntityId, Query, QueryCursor};

/// Mark BlurDamaged on every window a mid-flight fade shines through:
/// anything below the fading window in the order that overlaps it.
fn damage_blur_over_fade(list: &mut WinList, order: &Order) {
    let mut changed: Vec<EntityId> = Vec::new();

    for kind in [CK::FadesOpacity, CK::FadesBgOpacity, CK::FadesDim] {
        let mut cursor = QueryCursor::new(Query::new().has(kind));
        while let Some(id) = cursor.next(&list.em) {
            let fade_done = match kind {
                CK::FadesOpacity => list.fades_opacity.get(id).unwrap().fade.done(),
                CK::FadesBgOpacity => list.fades_bgopacity.get(id).unwrap().fade.done(),
                _ => list.fades_dim.get(id).unwrap().fade.done(),
            };
            if !fade_done && !changed.contains(&id) {
                changed.push(id);
            }
        }
    }

    for id in changed {
        let slot = match order.position(id) {
            Some(slot) => slot,
            None => continue,
        };
        for below in order.order[..slot].iter().copied() {
            if win_overlap(list, id, below) {
                list.em.ensure(CK::BlurDamaged, below);
            }
        }
    }
}

/// The CPU half of the blur system: damage propagation and cache
/// lifecycle. Runs every frame even when nothing ends up redrawn.
pub fn damage_tick(list: &mut WinList, order: &Order) {
    damage_blur_over_fade(list, order);

    // Damage all windows on top of windows that resize. Windows that
    // used to be behind the resized one may now peek out, so the safe
    // set is everything above.
    let resized: Vec<EntityId> = list.em.iter(&Query::new().has(CK::Resize)).collect();
    for id in resized {
        let slot = match order.position(id) {
            Some(slot) => slot,
            None => continue,
        };
        for above in order.order[slot + 1..].iter().copied() {
            list.em.ensure(CK::BlurDamaged, above);
        }
    }

    // Windows leaving the visible set drop their caches
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Blur));
    while let Some(id) = cursor.next(&list.em) {
        let state = list.state(id);
        if state == Some(WindowState::Destroyed) || state == Some(WindowState::Invisible) {
            if let Some(mut cache) = list.blur.take(id) {
                delete_cache(&mut cache);
            }
            list.em.remove_component(CK::Blur, id);
        }
    }

    // Resized caches reallocate and have to refill
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Resize)
            .has(CK::Blur)
            .has(CK::ContentsDamaged),
    );
    while let Some(id) = cursor.next(&list.em) {
        let new_size = list.resize.get(id).unwrap().new_size;
        let cache = list.blur.get_mut(id).unwrap();
        resize_cache(cache, new_size);
        list.em.ensure(CK::BlurDamaged, id);
    }
}

fn new_cache(size: Vector2<f32>) -> Result<BlurCache, lumen::LumenError> {
    let texture0 = Texture::new(gl::TEXTURE_2D, size)?;
    let texture1 = match Texture::new(gl::TEXTURE_2D, size) {
        Ok(texture) => texture,
        Err(e) => {
            let mut texture0 = texture0;
            texture0.delete();
            return Err(e);
        }
    };
    let stencil = match RenderBuffer::new_stencil(size) {
        Ok(stencil) => stencil,
        Err(e) => {
            let mut texture0 = texture0;
            let mut texture1 = texture1;
            texture0.delete();
            texture1.delete();
            return Err(e);
        }
    };
    Ok(BlurCache {
        textures: [texture0, texture1],
        stencil,
        size,
    })
}

fn resize_cache(cache: &mut BlurCache, size: Vector2<f32>) {
    cache.textures[0].resize(size);
    cache.textures[1].resize(size);
    cache.stencil.resize(size);
    cache.size = size;
}

fn delete_cache(cache: &mut BlurCache) {
    cache.textures[0].delete();
    cache.textures[1].delete();
    cache.stencil.delete();
}

pub struct BlurSystem {
    fbo: Framebuffer,
}

impl BlurSystem {
    pub fn new() -> Result<BlurSystem, lumen::LumenError> {
        Ok(BlurSystem {
            fbo: Framebuffer::new()?,
        })
    }

    /// Redraw every BlurDamaged cache, most distant first.
    #[allow(clippy::too_many_arguments)]
    pub fn update_blur(
        &mut self,
        list: &mut WinList,
        _order: &Order,
        assets: &mut AssetCache,
        root_size: Vector2<f32>,
        root_texture: Option<&Texture>,
        level: u32,
    ) {
        // Translucency-capable mapped windows grow a cache
        let wants_cache: Vec<EntityId> = list
            .em
            .iter(
                &Query::new()
                    .has(CK::Mud)
                    .has(CK::Map)
                    .has(CK::Textured)
                    .not(CK::Blur),
            )
            .collect();
        for id in wants_cache {
            if !list.mud.get(id).unwrap().blur_background {
                continue;
            }
            let size = list.physical.get(id).map(|p| p.size).unwrap_or_else(|| {
                Vector2::new(1.0, 1.0)
            });
            match new_cache(size) {
                Ok(cache) => {
                    list.em.add(CK::Blur, id);
                    list.blur.set(id, cache);
                }
                Err(e) => log::error!("Failed initializing window blur: {}", e),
            }
        }

        // Mapping resizes the cache to the mapped geometry
        let mut cursor = QueryCursor::new(Query::new().has(CK::Map).has(CK::Blur));
        while let Some(id) = cursor.next(&list.em) {
            let size = list.physical.get(id).unwrap().size;
            resize_cache(list.blur.get_mut(id).unwrap(), size);
            list.em.ensure(CK::BlurDamaged, id);
        }

        let to_blur = fetch_sorted_windows(
            list,
            &Query::new()
                .has(CK::Mud)
                .has(CK::Blur)
                .has(CK::BlurDamaged)
                .has(CK::Z)
                .has(CK::Physical),
        );
        let opaque = fetch_sorted_windows(
            list,
            &Query::new()
                .has(CK::Mud)
                .has(CK::Textured)
                .has(CK::Z)
                .has(CK::Physical)
                .not(CK::Opacity),
        );
        let shadowed = fetch_sorted_windows(
            list,
            &Query::new()
                .has(CK::Mud)
                .has(CK::Shadow)
                .has(CK::Z)
                .has(CK::Physical)
                .not(CK::Opacity),
        );
        let transparent = fetch_sorted_windows(
            list,
            &Query::new()
                .has(CK::Mud)
                .has(CK::Textured)
                .has(CK::Z)
                .has(CK::Physical)
                .has(CK::Opacity),
        );

        unsafe {
            gl::Disable(gl::STENCIL_TEST);
            gl::Disable(gl::SCISSOR_TEST);
        }

        // Blurring is a strange process, because every window depends
        // on the blurs behind it. Render them individually, starting
        // from the back.
        for target in to_blur.iter().copied() {
            let (glpos, size, target_z) = {
                let physical = list.physical.get(target).unwrap();
                (
                    render::x11_rectpos_to_gl(root_size, physical.position, physical.size),
                    physical.size,
                    list.z.get(target).copied().unwrap_or(0.5),
                )
            };

            {
                let cache = list.blur.get(target).unwrap();
                self.fbo.reset_target();
                self.fbo.target_renderbuffer_stencil(&cache.stencil);
                self.fbo.target_texture(&cache.textures[1]);
            }
            if let Err(e) = self.fbo.bind() {
                log::error!("Failed binding the blur framebuffer: {}", e);
                continue;
            }

            let view = ortho_view(glpos.x, glpos.x + size.x, glpos.y, glpos.y + size.y);

            unsafe {
                gl::Viewport(0, 0, size.x as i32, size.y as i32);

                gl::Enable(gl::DEPTH_TEST);
                gl::Enable(gl::BLEND);

                gl::ClearColor(1.0, 0.0, 1.0, 0.0);
                gl::ClearDepth(1.0);
                gl::DepthMask(gl::TRUE);
                gl::DepthFunc(gl::LESS);
                gl::ClearStencil(0);
                gl::StencilMask(0xFF);
                gl::Clear(
                    gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT,
                );
            }

            // Everything behind this window, in depth order: opaque
            // contents, their shadows, the wallpaper, transparents
            for id in opaque.iter().copied() {
                if behind(list, id, target_z) && win_overlap(list, id, target) {
                    let z = list.z.get(id).copied().unwrap_or(1.0);
                    render::draw_window(list, assets, &view, root_size, id, z);
                }
            }
            for id in shadowed.iter().copied() {
                if behind(list, id, target_z) && win_overlap(list, id, target) {
                    let z = list.z.get(id).copied().unwrap_or(1.0);
                    render::draw_shadow(list, assets, &view, root_size, id, z);
                }
            }

            if let Some(root_texture) = root_texture {
                unsafe {
                    gl::Enable(gl::DEPTH_TEST);
                }
                render::draw_root(assets, &view, root_texture, root_size);
                unsafe {
                    gl::Disable(gl::DEPTH_TEST);
                }
            }

            for id in transparent.iter().copied() {
                if behind(list, id, target_z) && win_overlap(list, id, target) {
                    let z = list.z.get(id).copied().unwrap_or(1.0);
                    render::draw_window(list, assets, &view, root_size, id, z);
                }
            }

            // Mark the window's own footprint in the stencil so the
            // final flip clips the blur to its shape
            write_shape_stencil(list, assets, &view, root_size, target);

            unsafe {
                gl::Disable(gl::BLEND);
                gl::Disable(gl::DEPTH_TEST);
            }

            // Dual-Kawase the scene into a blur
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
            let face = match assets.load_face("window.face") {
                Ok(face) => face,
                Err(e) => {
                    log::error!("Failed loading the window face: {}", e);
                    return;
                }
            };

            let cache = list.blur.get_mut(target).unwrap();
            let [ref mut texture0, ref mut texture1] = cache.textures;
            let mut blur_data = TextureBlurData {
                tex: texture1,
                swap: texture0,
            };
            if let Err(e) = texture_blur(
                &mut blur_data,
                &mut self.fbo,
                &face,
                &mut downsample.borrow_mut(),
                &mut upsample.borrow_mut(),
                level,
                false,
            ) {
                log::error!("Failed blurring the background texture: {}", e);
                return;
            }

            // Flip the blur back into texture[0], clipped to the shape
            // recorded in the stencil
            let cache = list.blur.get(target).unwrap();
            self.fbo.reset_target();
            self.fbo.target_texture(&cache.textures[0]);
            self.fbo.target_renderbuffer_stencil(&cache.stencil);
            if self.fbo.rebind().is_err() {
                log::error!("Failed binding framebuffer to clip blur");
                return;
            }

            let flip_view = ortho_view(0.0, size.x, 0.0, size.y);
            unsafe {
                gl::Viewport(0, 0, size.x as i32, size.y as i32);
                gl::ClearColor(0.0, 0.0, 0.0, 0.0);
                gl::Clear(gl::COLOR_BUFFER_BIT);

                gl::Enable(gl::STENCIL_TEST);
                gl::StencilMask(0);
                gl::StencilFunc(gl::EQUAL, 1, 0xFF);
            }

            let program = match assets.load_shader("passthrough.shader") {
                Ok(program) => program,
                Err(e) => {
                    log::error!("Failed loading the passthrough shader: {}", e);
                    return;
                }
            };
            {
                let mut program = program.borrow_mut();
                program.set_future_bool("flip", false);
                program.set_future_float("opacity", 1.0);
                program.set_future_sampler("tex_scr", 0);
                program.use_program();

                let cache = list.blur.get(target).unwrap();
                cache.textures[1].bind(gl::TEXTURE0);
                draw_rect(
                    &program,
                    &flip_view,
                    &face,
                    cgmath::Vector3::new(0.0, 0.0, 0.0),
                    size,
                );
            }

            unsafe {
                gl::Disable(gl::STENCIL_TEST);
            }
        }

        list.em.reset_component(CK::BlurDamaged);
    }
}

fn behind(list: &WinList, id: EntityId, target_z: f32) -> bool {
    match list.z.get(id) {
        Some(z) => *z > target_z,
        None => false,
    }
}

/// Write 1 into the stencil wherever the window's shape covers,
/// without touching color.
fn write_shape_stencil(
    list: &WinList,
    assets: &mut AssetCache,
    view: &cgmath::Matrix4<f32>,
    root_size: Vector2<f32>,
    id: EntityId,
) {
    let physical = match list.physical.get(id) {
        Some(physical) => physical,
        None => return,
    };

    let program = match assets.load_shader("passthrough.shader") {
        Ok(program) => program,
        Err(e) => {
            log::error!("Failed loading the passthrough shader: {}", e);
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
        gl::Enable(gl::STENCIL_TEST);
        gl::StencilMask(0xFF);
        gl::StencilFunc(gl::ALWAYS, 1, 0xFF);
        gl::StencilOp(gl::KEEP, gl::KEEP, gl::REPLACE);
        gl::ColorMask(gl::FALSE, gl::FALSE, gl::FALSE, gl::FALSE);
        gl::Disable(gl::DEPTH_TEST);
    }

    let mut program = program.borrow_mut();
    program.set_future_bool("flip", false);
    program.set_future_float("opacity", 1.0);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    let face = match list.shaped.get(id) {
        Some(shaped) => &shaped.face,
        None => plain_face.as_ref(),
    };
    let gl_pos = render::x11_rectpos_to_gl(root_size, physical.position, physical.size);
    draw_rect(
        &program,
        view,
        face,
        cgmath::Vector3::new(gl_pos.x, gl_pos.y, 0.0),
        physical.size,
    );

    unsafe {
        gl::ColorMask(gl::TRUE, gl::TRUE, gl::TRUE, gl::TRUE);
        gl::StencilMask(0);
        gl::Disable(gl::STENCIL_TEST);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neocomp::fade::Fade;
    use crate::neocomp::windows::{Fading, Physical};

    fn window(list: &mut WinList, order: &mut Order, pos: (f32, f32)) -> EntityId {
        let id = list.em.allocate();
        list.em.add(CK::Physical, id);
        list.physical.set(
            id,
            Physical {
                position: Vector2::new(pos.0, pos.1),
                size: Vector2::new(100.0, 100.0),
            },
        );
        list.em.add(CK::FadesOpacity, id);
        list.fades_opacity.set(id, Fading { fade: Fade::new(100.0) });
        order.add(id);
        id
    }

    #[test]
    fn fading_window_damages_overlapped_windows_below() {
        let mut list = WinList::new();
        let mut order = Order::new();
        let below = window(&mut list, &mut order, (0.0, 0.0));
        let detached = window(&mut list, &mut order, (500.0, 500.0));
        let above = window(&mut list, &mut order, (50.0, 50.0));

        // Start a fade on the topmost window
        list.fades_opacity
            .get_mut(above)
            .unwrap()
            .fade
            .keyframe(0.0, 100.0);

        damage_tick(&mut list, &order);
        assert!(list.em.has(CK::BlurDamaged, below));
        assert!(!list.em.has(CK::BlurDamaged, detached));
        assert!(!list.em.has(CK::BlurDamaged, above));
    }

    #[test]
    fn damage_repeats_until_the_fade_is_done() {
        let mut list = WinList::new();
        let mut order = Order::new();
        let below = window(&mut list, &mut order, (0.0, 0.0));
        let above = window(&mut list, &mut order, (50.0, 50.0));

        list.fades_opacity
            .get_mut(above)
            .unwrap()
            .fade
            .keyframe(0.0, 100.0);

        damage_tick(&mut list, &order);
        assert!(list.em.has(CK::BlurDamaged, below));

        // Fade still running: damaged again next frame
        list.em.reset_component(CK::BlurDamaged);
        list.fades_opacity.get_mut(above).unwrap().fade.tick(50.0);
        damage_tick(&mut list, &order);
        assert!(list.em.has(CK::BlurDamaged, below));

        // Fade finished: quiet
        list.em.reset_component(CK::BlurDamaged);
        list.fades_opacity.get_mut(above).unwrap().fade.tick(100.0);
        damage_tick(&mut list, &order);
        assert!(!list.em.has(CK::BlurDamaged, below));
    }

    #[test]
    fn resize_damages_every_window_above() {
        let mut list = WinList::new();
        let mut order = Order::new();
        let bottom = window(&mut list, &mut order, (0.0, 0.0));
        let middle = window(&mut list, &mut order, (500.0, 0.0));
        let top = window(&mut list, &mut order, (900.0, 0.0));

        list.em.ensure(CK::Resize, bottom);
        list.resize.set(
            bottom,
            crate::neocomp::windows::ResizeIntent {
                new_size: Vector2::new(50.0, 50.0),
            },
        );

        damage_tick(&mut list, &order);
        // Overlap does not matter for resize damage
        assert!(list.em.has(CK::BlurDamaged, middle));
        assert!(list.em.has(CK::BlurDamaged, top));
        assert!(!list.em.has(CK::BlurDamaged, bottom));
    }
}
