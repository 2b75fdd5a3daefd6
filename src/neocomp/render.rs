// Drawing windows
//
// The helpers here draw one thing each under a caller-provided view;
// the paint() entry runs the full frame: opaque pass front-to-back
// with depth writes, shadows, then transparents back-to-front with
// blending. X geometry is y-down, GL is y-up, so every screen-space
// position goes through the flip.
use crate::neocomp::systems::order::{fetch_sorted_windows, Order};
use crate::neocomp::windows::{WinList, WindowState, CK};
use utils::log;

use cgmath::{Matrix4, Vector2, Vector3};
use lumen::assets::AssetCache;
use lumen::renderutil::{draw_rect, ortho_view};
use lumen::texture::Texture;
use swiss::{EntityId, Query};

/// The root background draws just behind the bottom-most window.
pub const ROOT_Z: f32 = 0.99999;

pub fn x11_rectpos_to_gl(
    root_size: Vector2<f32>,
    pos: Vector2<f32>,
    size: Vector2<f32>,
) -> Vector2<f32> {
    Vector2::new(pos.x, root_size.y - pos.y - size.y)
}

/// Whether this window participates in drawing at all.
pub fn win_is_drawable(list: &WinList, id: EntityId) -> bool {
    matches!(
        list.state(id),
        Some(WindowState::Destroying)
            | Some(WindowState::Hiding)
            | Some(WindowState::Activating)
            | Some(WindowState::Deactivating)
            | Some(WindowState::Active)
            | Some(WindowState::Inactive)
    )
}

/// Draw a window's contents through the global shader.
pub fn draw_window(
    list: &WinList,
    assets: &mut AssetCache,
    view: &Matrix4<f32>,
    root_size: Vector2<f32>,
    id: EntityId,
    z: f32,
) {
    let physical = match list.physical.get(id) {
        Some(physical) => physical,
        None => return,
    };
    let textured = match list.textured.get(id) {
        Some(textured) => textured,
        None => return,
    };
    let mud = match list.mud.get(id) {
        Some(mud) => mud,
        None => return,
    };

    let program = match assets.load_shader("global.shader") {
        Ok(program) => program,
        Err(e) => {
            log::error!("Failed loading the global shader: {}", e);
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

    let opacity = list
        .opacity
        .get(id)
        .map(|scalar| scalar.value / 100.0)
        .unwrap_or(1.0);
    let dim = list
        .dim
        .get(id)
        .map(|scalar| (100.0 - scalar.value) / 100.0)
        .unwrap_or(0.0);

    let mut program = program.borrow_mut();
    program.set_future_bool("invert", mud.invert_color);
    program.set_future_bool("flip", textured.texture.flipped);
    program.set_future_float("opacity", opacity as f32);
    program.set_future_float("dim", dim as f32);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    textured.texture.bind(gl::TEXTURE0);

    // X Render hands us premultiplied ARGB
    unsafe {
        gl::BlendFunc(gl::ONE, gl::ONE_MINUS_SRC_ALPHA);
    }

    let gl_pos = x11_rectpos_to_gl(root_size, physical.position, physical.size);
    // A shaped window draws only its sub-rectangles
    let face = match list.shaped.get(id) {
        Some(shaped) => &shaped.face,
        None => face.as_ref(),
    };
    draw_rect(
        &program,
        view,
        face,
        Vector3::new(gl_pos.x, gl_pos.y, z),
        physical.size,
    );
}

/// Draw the blurred backdrop cached for a translucent window.
pub fn draw_window_blur_layer(
    list: &WinList,
    assets: &mut AssetCache,
    view: &Matrix4<f32>,
    root_size: Vector2<f32>,
    id: EntityId,
    z: f32,
) {
    let physical = match list.physical.get(id) {
        Some(physical) => physical,
        None => return,
    };
    let blur = match list.blur.get(id) {
        Some(blur) => blur,
        None => return,
    };

    let program = match assets.load_shader("passthrough.shader") {
        Ok(program) => program,
        Err(e) => {
            log::error!("Failed loading the passthrough shader: {}", e);
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

    let bg_opacity = list
        .bgopacity
        .get(id)
        .map(|scalar| scalar.value / 100.0)
        .unwrap_or(1.0);

    let mut program = program.borrow_mut();
    program.set_future_bool("flip", blur.textures[0].flipped);
    program.set_future_float("opacity", bg_opacity as f32);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    blur.textures[0].bind(gl::TEXTURE0);

    let gl_pos = x11_rectpos_to_gl(root_size, physical.position, physical.size);
    draw_rect(
        &program,
        view,
        &face,
        // Just behind the window contents
        Vector3::new(gl_pos.x, gl_pos.y, z + 0.00001),
        physical.size,
    );
}

/// Draw a window's shadow texture, offset out by the border.
pub fn draw_shadow(
    list: &WinList,
    assets: &mut AssetCache,
    view: &Matrix4<f32>,
    root_size: Vector2<f32>,
    id: EntityId,
    z: f32,
) {
    let physical = match list.physical.get(id) {
        Some(physical) => physical,
        None => return,
    };
    let shadow = match list.shadow.get(id) {
        Some(shadow) => shadow,
        None => return,
    };

    let program = match assets.load_shader("passthrough.shader") {
        Ok(program) => program,
        Err(e) => {
            log::error!("Failed loading the passthrough shader: {}", e);
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

    let overflow = physical.size + shadow.border * 2.0;
    let gl_pos =
        x11_rectpos_to_gl(root_size, physical.position, physical.size) - shadow.border;

    let mut program = program.borrow_mut();
    program.set_future_bool("flip", shadow.effect.flipped);
    program.set_future_float("opacity", 1.0);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    shadow.effect.bind(gl::TEXTURE0);
    draw_rect(
        &program,
        view,
        &face,
        Vector3::new(gl_pos.x, gl_pos.y, z + 0.00001),
        overflow,
    );
}

/// Draw the root background texture across the whole canvas.
pub fn draw_root(
    assets: &mut AssetCache,
    view: &Matrix4<f32>,
    root_texture: &Texture,
    root_size: Vector2<f32>,
) {
    let program = match assets.load_shader("passthrough.shader") {
        Ok(program) => program,
        Err(e) => {
            log::error!("Failed loading the passthrough shader: {}", e);
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

    let mut program = program.borrow_mut();
    program.set_future_bool("flip", root_texture.flipped);
    program.set_future_float("opacity", 1.0);
    program.set_future_sampler("tex_scr", 0);
    program.use_program();

    root_texture.bind(gl::TEXTURE0);
    draw_rect(
        &program,
        view,
        &face,
        Vector3::new(0.0, 0.0, ROOT_Z),
        root_size,
    );
}

/// One full composite: opaque, shadows, then transparents.
pub fn paint(
    list: &WinList,
    _order: &Order,
    assets: &mut AssetCache,
    root_texture: Option<&Texture>,
    root_size: Vector2<f32>,
) {
    let view = ortho_view(0.0, root_size.x, 0.0, root_size.y);

    unsafe {
        gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, 0);
        let bufs = [gl::BACK_LEFT];
        gl::DrawBuffers(1, bufs.as_ptr());
        gl::Viewport(0, 0, root_size.x as i32, root_size.y as i32);

        gl::ClearColor(0.0, 0.0, 0.0, 1.0);
        gl::ClearDepth(1.0);
        gl::DepthMask(gl::TRUE);
        gl::DepthFunc(gl::LESS);
        gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
    }

    // Opaque pass: depth on, both color and depth written
    let opaque = fetch_sorted_windows(
        list,
        &Query::new()
            .has(CK::Mud)
            .has(CK::Textured)
            .has(CK::Z)
            .has(CK::Physical)
            .not(CK::Opacity),
    );
    unsafe {
        gl::Enable(gl::DEPTH_TEST);
        gl::Enable(gl::BLEND);
    }
    for id in opaque.iter() {
        if win_is_drawable(list, *id) {
            let z = list.z.get(*id).copied().unwrap_or(0.5);
            draw_window(list, assets, &view, root_size, *id, z);
        }
    }

    // The wallpaper sits behind everything
    if let Some(root_texture) = root_texture {
        draw_root(assets, &view, root_texture, root_size);
    }

    // Shadow pass
    let shadowed = fetch_sorted_windows(
        list,
        &Query::new()
            .has(CK::Mud)
            .has(CK::Shadow)
            .has(CK::Z)
            .has(CK::Physical),
    );
    for id in shadowed.iter() {
        if win_is_drawable(list, *id) {
            let z = list.z.get(*id).copied().unwrap_or(0.5);
            draw_shadow(list, assets, &view, root_size, *id, z);
        }
    }

    // Transparent pass: depth tested but not written, blended,
    // back-to-front
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
        gl::DepthMask(gl::FALSE);
    }
    for id in transparent.iter() {
        if win_is_drawable(list, *id) {
            let z = list.z.get(*id).copied().unwrap_or(0.5);
            draw_window_blur_layer(list, assets, &view, root_size, *id, z);
            draw_window(list, assets, &view, root_size, *id, z);
        }
    }

    unsafe {
        gl::DepthMask(gl::TRUE);
        gl::Disable(gl::BLEND);
        gl::Disable(gl::DEPTH_TEST);
    }
}

/// Refresh the offscreen content copies of damaged windows from their
/// bound pixmaps.
pub fn update_window_contents(
    list: &mut WinList,
    assets: &mut AssetCache,
    fbo: &mut lumen::framebuffer::Framebuffer,
) {
    let damaged: Vec<EntityId> = list
        .em
        .iter(
            &Query::new()
                .has(CK::ContentsDamaged)
                .has(CK::Textured)
                .has(CK::BindsTexture),
        )
        .collect();

    for id in damaged {
        let size = list.textured.get(id).unwrap().texture.size;

        fbo.reset_target();
        fbo.target_texture(&list.textured.get(id).unwrap().texture);
        if let Err(e) = fbo.bind() {
            log::error!("Failed binding the content copy framebuffer: {}", e);
            continue;
        }

        unsafe {
            gl::Viewport(0, 0, size.x as i32, size.y as i32);
            gl::Disable(gl::BLEND);
            gl::Disable(gl::DEPTH_TEST);
        }

        let program = match assets.load_shader("passthrough.shader") {
            Ok(program) => program,
            Err(e) => {
                log::error!("Failed loading the passthrough shader: {}", e);
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

        let binds = list.binds_texture.get(id).unwrap();
        let view = ortho_view(0.0, size.x, 0.0, size.y);

        let mut program = program.borrow_mut();
        program.set_future_bool("flip", binds.drawable.texture.flipped);
        program.set_future_float("opacity", 1.0);
        program.set_future_sampler("tex_scr", 0);
        program.use_program();

        binds.drawable.texture.bind(gl::TEXTURE0);
        draw_rect(
            &program,
            &view,
            &face,
            Vector3::new(0.0, 0.0, 0.0),
            size,
        );

        // The copy is flipped upright by the draw
        list.textured.get_mut(id).unwrap().texture.flipped = false;
    }
}
