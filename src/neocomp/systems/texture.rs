// Window content textures
//
// Every redirected window gets an offscreen copy texture (plus a
// stencil) sized to its geometry, and a live pixmap-bound texture the
// copy is refreshed from on damage. New or resized textures mean the
// contents must be recaptured.
use crate::neocomp::glx::{GlxContext, WindowDrawable};
use crate::neocomp::windows::{Textured, BindsTexture, WinList, WindowState, CK};
use crate::neocomp::xorg::X11Context;
use utils::log;

use lumen::renderbuffer::RenderBuffer;
use lumen::texture::Texture;
use swiss::{Query, QueryCursor};
use x11rb::protocol::xproto::ConnectionExt as _;

pub fn tick(list: &mut WinList, xcontext: &X11Context, glx: &GlxContext) {
    // Resize textures when mapping a window that already has one
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Map)
            .has(CK::Physical)
            .has(CK::Redirected)
            .has(CK::Textured),
    );
    while let Some(id) = cursor.next(&list.em) {
        let size = list.physical.get(id).unwrap().size;
        let textured = list.textured.get_mut(id).unwrap();
        textured.texture.resize(size);
        textured.stencil.resize(size);
    }

    // Create a texture when mapping windows without one
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Map)
            .has(CK::Redirected)
            .has(CK::Physical)
            .not(CK::Textured),
    );
    while let Some(id) = cursor.next(&list.em) {
        let size = list.physical.get(id).unwrap().size;

        let texture = match Texture::new(gl::TEXTURE_2D, size) {
            Ok(texture) => texture,
            Err(e) => {
                log::error!("Failed initializing window contents texture: {}", e);
                continue;
            }
        };
        let stencil = match RenderBuffer::new_stencil(size) {
            Ok(stencil) => stencil,
            Err(e) => {
                log::error!("Failed initializing window contents stencil: {}", e);
                continue;
            }
        };

        list.em.add(CK::Textured, id);
        list.textured.set(id, Textured { texture, stencil });
    }

    // Rebind the window pixmap for freshly mapped windows. The named
    // pixmap changes identity across map and resize.
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Map)
            .has(CK::Redirected)
            .has(CK::TracksWindow)
            .has(CK::Physical),
    );
    while let Some(id) = cursor.next(&list.em) {
        let xid = list.tracks_window.get(id).unwrap().xid;
        let size = list.physical.get(id).unwrap().size;

        if !list.em.has(CK::BindsTexture, id) {
            // The fbconfig has to match the window's own visual
            let visual = xcontext
                .conn
                .get_window_attributes(xid)
                .ok()
                .and_then(|c| c.reply().ok())
                .map(|attribs| attribs.visual)
                .unwrap_or(0);
            match WindowDrawable::new(glx, xid, visual) {
                Ok(drawable) => {
                    list.em.add(CK::BindsTexture, id);
                    list.binds_texture.set(id, BindsTexture { drawable });
                }
                Err(e) => {
                    log::error!("Failed creating drawable for {:#010x}: {}", xid, e);
                    continue;
                }
            }
        }

        let binds = list.binds_texture.get_mut(id).unwrap();
        if binds.drawable.is_bound() {
            binds.drawable.unbind(glx);
        }
        match xcontext.name_window_pixmap(xid) {
            Some(pixmap) => {
                if let Err(e) = binds.drawable.bind(glx, pixmap, size) {
                    log::error!("Failed binding window pixmap: {}", e);
                }
            }
            None => log::error!("Failed naming a pixmap for {:#010x}", xid),
        }
    }

    // Resizes invalidate the bound pixmap
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Resize)
            .has(CK::BindsTexture)
            .has(CK::TracksWindow)
            .has(CK::Physical),
    );
    while let Some(id) = cursor.next(&list.em) {
        let xid = list.tracks_window.get(id).unwrap().xid;
        let size = list.resize.get(id).unwrap().new_size;

        let binds = list.binds_texture.get_mut(id).unwrap();
        binds.drawable.unbind(glx);
        if let Some(pixmap) = xcontext.name_window_pixmap(xid) {
            if let Err(e) = binds.drawable.bind(glx, pixmap, size) {
                log::error!("Failed rebinding window pixmap: {}", e);
            }
        }

        if let Some(textured) = list.textured.get_mut(id) {
            textured.texture.resize(size);
            textured.stencil.resize(size);
        }
        list.em.ensure(CK::ContentsDamaged, id);
    }

    // We just added or refreshed a texture, so it has to be refilled
    list.em.ensure_where(
        CK::ContentsDamaged,
        &Query::new()
            .has(CK::Map)
            .has(CK::Textured)
            .has(CK::BindsTexture),
    );

    // Windows leaving the visible set drop their GPU state
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Textured));
    while let Some(id) = cursor.next(&list.em) {
        let state = list.state(id);
        if state == Some(WindowState::Destroyed) || state == Some(WindowState::Invisible) {
            if let Some(mut textured) = list.textured.take(id) {
                textured.texture.delete();
                textured.stencil.delete();
            }
            list.em.remove_component(CK::Textured, id);

            if let Some(mut binds) = list.binds_texture.take(id) {
                binds.drawable.delete(glx);
            }
            list.em.remove_component(CK::BindsTexture, id);

            if let Some(mut shaped) = list.shaped.take(id) {
                shaped.face.delete();
            }
            list.em.remove_component(CK::Shaped, id);
        }
    }
}
