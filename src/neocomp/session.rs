// The session: one connection, one GL context, one frame loop
//
// Everything runs on this thread. A frame drains the normalized event
// stream into intents, advances the systems in their fixed order,
// paints, and drops the transients. The only global is the reset flag
// the SIGUSR1 handler flips.
use crate::neocomp::config::{Options, VsyncMode};
use crate::neocomp::fade::Fade;
use crate::neocomp::glx::{GlxContext, WindowDrawable};
use crate::neocomp::render;
use crate::neocomp::rules::{MatchTarget, Predef};
use crate::neocomp::systems::blur::{self, BlurSystem};
use crate::neocomp::systems::order::Order;
use crate::neocomp::systems::shadow::{self, ShadowSystem};
use crate::neocomp::systems::{fullscreen, opacity, physical, shape, state, texture, xorg as xorg_system};
use crate::neocomp::windows::{
    Fading, FocusChange, HasClient, MapIntent, Mud, Physical, Stateful, TracksWindow, WinList,
    WindowState, CK,
};
use crate::neocomp::wintypes::WinType;
use crate::neocomp::xorg::events::{Event, RestackLocation, XWindow};
use crate::neocomp::xorg::X11Context;
use crate::neocomp::CompError;
use utils::fdwatch::FdWatch;
use utils::log;
use utils::timing::Stopwatch;

use cgmath::Vector2;
use lumen::assets::{add_xdg_asset_paths, AssetCache};
use lumen::framebuffer::Framebuffer;
use swiss::{EntityId, Query, QueryCursor};

use std::sync::atomic::{AtomicBool, Ordering};

/// Set from the SIGUSR1 handler; checked after every paint.
static RESET_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_reset(_signal: libc::c_int) {
    RESET_REQUESTED.store(true, Ordering::Release);
}

pub fn install_reset_handler() {
    unsafe {
        libc::signal(libc::SIGUSR1, request_reset as libc::sighandler_t);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// SIGUSR1 asked for a teardown and re-create
    Reset,
    /// Benchmark finished or the connection went away
    Exit,
}

pub struct Session {
    pub options: Options,
    xcontext: X11Context,
    glx: GlxContext,
    assets: AssetCache,
    list: WinList,
    order: Order,
    blur_system: BlurSystem,
    shadow_system: ShadowSystem,
    content_fbo: Framebuffer,
    root_drawable: Option<WindowDrawable>,
    root_size: Vector2<f32>,
    active_win: Option<EntityId>,
    stopwatch: Stopwatch,
}

/// The window view the match engine evaluates rules against.
struct WinMatchView<'a> {
    list: &'a WinList,
    xcontext: &'a X11Context,
    id: EntityId,
    focused: bool,
}

impl<'a> WinMatchView<'a> {
    fn property_window(&self, on_client: bool) -> Option<XWindow> {
        if on_client {
            self.list.has_client.get(self.id).map(|client| client.xid)
        } else {
            self.list.tracks_window.get(self.id).map(|tracks| tracks.xid)
        }
    }
}

impl<'a> MatchTarget for WinMatchView<'a> {
    fn predef_int(&self, predef: Predef) -> Option<i64> {
        let mud = self.list.mud.get(self.id)?;
        let physical = self.list.physical.get(self.id);
        match predef {
            Predef::Id => Some(mud.xid as i64),
            Predef::X => physical.map(|p| p.position.x as i64),
            Predef::Y => physical.map(|p| p.position.y as i64),
            Predef::X2 => physical.map(|p| (p.position.x + p.size.x) as i64),
            Predef::Y2 => physical.map(|p| (p.position.y + p.size.y) as i64),
            Predef::Width | Predef::WidthB => physical.map(|p| p.size.x as i64),
            Predef::Height | Predef::HeightB => physical.map(|p| p.size.y as i64),
            Predef::BorderWidth => Some(mud.border_width as i64),
            Predef::Fullscreen => Some(mud.fullscreen as i64),
            Predef::OverrideRedirect => Some(mud.override_redirect as i64),
            Predef::Focused => Some(self.focused as i64),
            Predef::Wmwin => Some(mud.wmwin as i64),
            Predef::Client => Some(
                self.list
                    .has_client
                    .get(self.id)
                    .map(|client| client.xid as i64)
                    .unwrap_or(0),
            ),
            _ => None,
        }
    }

    fn predef_str(&self, predef: Predef) -> Option<String> {
        let mud = self.list.mud.get(self.id)?;
        match predef {
            Predef::WindowType => Some(mud.window_type.name().to_string()),
            Predef::Name => mud.name.clone(),
            Predef::ClassG => mud.class_general.clone(),
            Predef::ClassI => mud.class_instance.clone(),
            Predef::Role => mud.role.clone(),
            _ => None,
        }
    }

    fn property_int(&self, name: &str, on_client: bool, index: usize, format: u32) -> Option<i64> {
        let xid = self.property_window(on_client)?;
        let atom = self.xcontext.conn_intern_atom(name)?;
        self.xcontext.fetch_property_int(xid, atom, index, format)
    }

    fn property_str(&self, name: &str, on_client: bool, index: usize) -> Option<String> {
        let xid = self.property_window(on_client)?;
        let atom = self.xcontext.conn_intern_atom(name)?;
        self.xcontext.fetch_property_str(xid, atom, index)
    }

    fn property_atom_name(&self, name: &str, on_client: bool, index: usize) -> Option<String> {
        let xid = self.property_window(on_client)?;
        let atom = self.xcontext.conn_intern_atom(name)?;
        let value = self.xcontext.fetch_property_int(xid, atom, index, 32)?;
        self.xcontext.atom_name(value as u32)
    }
}

impl Session {
    pub fn new(options: Options) -> Result<Session, CompError> {
        let mut xcontext = X11Context::new()?;
        let glx = GlxContext::new(xcontext.overlay, xcontext.screen)?;

        glx.set_swap_interval(match options.vsync {
            VsyncMode::OpenGlSwc => 1,
            VsyncMode::None => 0,
        });

        let mut assets = AssetCache::new();
        add_xdg_asset_paths(&mut assets);

        // Track the atoms the rules reference so property changes on
        // them reach the cache invalidation path
        for name in options.tracking.tracked_atoms.iter() {
            if let Some(atom) = xcontext.conn_intern_atom(name) {
                xcontext.atoms.track(atom);
            }
        }

        let root_size = Vector2::new(
            xcontext.root_size.0 as f32,
            xcontext.root_size.1 as f32,
        );

        let blur_system = BlurSystem::new().map_err(|e| CompError::GpuError(e.to_string()))?;
        let shadow_system =
            ShadowSystem::new().map_err(|e| CompError::GpuError(e.to_string()))?;
        let content_fbo =
            Framebuffer::new().map_err(|e| CompError::GpuError(e.to_string()))?;

        xcontext.bootstrap();

        Ok(Session {
            options,
            xcontext,
            glx,
            assets,
            list: WinList::new(),
            order: Order::new(),
            blur_system,
            shadow_system,
            content_fbo,
            root_drawable: None,
            root_size,
            active_win: None,
            stopwatch: Stopwatch::new(),
        })
    }

    /// Create a fresh entity for a newly known X window.
    fn add_window(&mut self, xid: XWindow, pos: Vector2<f32>, size: Vector2<f32>, border: f32) {
        if self.list.find(xid).is_some() {
            return;
        }

        let list = &mut self.list;
        let id = list.em.allocate();

        let mut mud = Mud::new(xid);
        mud.position = pos;
        mud.size = size;
        mud.border_width = border;
        list.em.add(CK::Mud, id);
        list.mud.set(id, mud);

        list.em.add(CK::TracksWindow, id);
        list.tracks_window.set(id, TracksWindow { xid });

        list.em.add(CK::Stateful, id);
        list.stateful.set(
            id,
            Stateful {
                state: WindowState::Waiting,
            },
        );

        for (kind, table) in [
            (CK::FadesOpacity, &mut list.fades_opacity),
            (CK::FadesBgOpacity, &mut list.fades_bgopacity),
            (CK::FadesDim, &mut list.fades_dim),
        ] {
            list.em.add(kind, id);
            table.set(
                id,
                Fading {
                    fade: Fade::new(100.0),
                },
            );
        }

        self.order.add(id);
        self.refresh_window_metadata(id);
    }

    /// Refetch type, name, class, role and flags for a window.
    fn refresh_window_metadata(&mut self, id: EntityId) {
        let frame_xid = match self.list.tracks_window.get(id) {
            Some(tracks) => tracks.xid,
            None => return,
        };
        // Properties live on the client where one exists
        let prop_xid = self
            .list
            .has_client
            .get(id)
            .map(|client| client.xid)
            .unwrap_or(frame_xid);

        let window_type = self
            .xcontext
            .fetch_window_type_atom(prop_xid)
            .and_then(|atom| {
                self.xcontext
                    .atoms
                    .wintype_atoms
                    .iter()
                    .position(|a| *a == atom)
            })
            .and_then(WinType::from_index)
            .unwrap_or(WinType::Unknown);

        let track_wdata = self.options.tracking.track_wdata;
        let name = if track_wdata {
            self.xcontext.fetch_name(prop_xid)
        } else {
            None
        };
        let class = if track_wdata {
            self.xcontext.fetch_class(prop_xid)
        } else {
            None
        };
        let role = if track_wdata {
            self.xcontext.fetch_role(prop_xid)
        } else {
            None
        };
        let leader = self.xcontext.fetch_leader(prop_xid).unwrap_or(0);
        let shadow_override = self.xcontext.fetch_shadow_override(frame_xid);
        let has_client = self.list.em.has(CK::HasClient, id);

        if let Some(mud) = self.list.mud.get_mut(id) {
            mud.window_type = window_type;
            if let Some(name) = name {
                mud.name = Some(name);
            }
            if let Some((instance, general)) = class {
                mud.class_instance = Some(instance);
                mud.class_general = Some(general);
            }
            if let Some(role) = role {
                mud.role = Some(role);
            }
            mud.leader = leader;
            mud.wmwin = !has_client && !mud.override_redirect;
            if let Some(shadow) = shadow_override {
                mud.shadow = shadow;
            }
        }

        self.list.em.ensure(CK::WintypeChanged, id);
    }

    /// Re-run the per-window rules for entities whose inputs changed.
    fn apply_rules(&mut self) {
        let changed: Vec<EntityId> = self
            .list
            .em
            .iter(&Query::new().has(CK::WintypeChanged).has(CK::Mud))
            .collect();

        for id in changed {
            let focused = self.active_win == Some(id);
            let view = WinMatchView {
                list: &self.list,
                xcontext: &self.xcontext,
                id,
                focused,
            };

            let shadow_excluded = self.options.shadow_exclude.matches(&view).is_some();
            let fade_excluded = self.options.fade_exclude.matches(&view).is_some();
            let focus_forced = self.options.focus_exclude.matches(&view).is_some();
            let inverted = self.options.invert_color_include.matches(&view).is_some();
            let blur_excluded = self
                .options
                .blur_background_exclude
                .matches(&view)
                .is_some();

            let (wintype_fade, wintype_focus);
            {
                let mud = self.list.mud.get(id).unwrap();
                wintype_fade = self.options.wintype_fade[mud.window_type as usize];
                wintype_focus = self.options.wintype_focus[mud.window_type as usize];
            }

            let blur_enabled = self.options.blur_background;
            let mud = self.list.mud.get_mut(id).unwrap();
            if shadow_excluded {
                mud.shadow = false;
            }
            mud.fade = wintype_fade && !fade_excluded;
            mud.focused_force = wintype_focus || focus_forced;
            mud.invert_color = inverted;
            mud.blur_background = blur_enabled && !blur_excluded;
        }
    }

    /// Evaluate opacity rules for windows with a pending focus change.
    fn apply_opacity_rules(&mut self) {
        if self.options.opacity_rules.is_empty() {
            return;
        }

        let pending: Vec<EntityId> = self
            .list
            .em
            .iter(&Query::new().has(CK::FocusChange).has(CK::Mud))
            .collect();

        for id in pending {
            let view = WinMatchView {
                list: &self.list,
                xcontext: &self.xcontext,
                id,
                focused: self.active_win == Some(id),
            };
            if let Some(target) = self.options.opacity_rules.matches(&view) {
                opacity::apply_opacity_rule(&mut self.list, id, target as f64);
            }
        }
    }

    /// Every window re-resolves its targets when the focus moves.
    fn broadcast_focus_change(&mut self) {
        let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful));
        while let Some(id) = cursor.next(&self.list.em) {
            self.list.em.ensure(CK::FocusChange, id);
            self.list.focus_change.set(
                id,
                FocusChange {
                    new_opacity: 100.0,
                    new_dim: 100.0,
                },
            );
            self.list.em.ensure(CK::FocusChanged, id);
        }
    }

    fn process_events(&mut self) {
        while let Some(event) = self.xcontext.next_event() {
            match event {
                Event::Add {
                    xid,
                    pos,
                    size,
                    border,
                    mapped,
                    ..
                } => {
                    self.add_window(xid, pos, size, border);
                    if mapped {
                        if let Some(id) = self.list.find(xid) {
                            self.mark_map(id);
                        }
                    }
                }
                Event::Destroy { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.list.em.ensure(CK::Destroy, id);
                    }
                }
                Event::Client { xid, client_xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.list.em.ensure(CK::HasClient, id);
                        self.list.has_client.set(id, HasClient { xid: client_xid });
                        self.refresh_window_metadata(id);
                    }
                }
                Event::Map { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        if self.list.em.has(CK::Bypass, id) {
                            self.list.em.remove_component(CK::Bypass, id);
                            self.list.em.ensure(CK::ContentsDamaged, id);
                        }
                        self.mark_map(id);
                    }
                }
                Event::Unmap { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        if !self.list.em.has(CK::Destroy, id) {
                            self.list.em.ensure(CK::Unmap, id);
                        }
                    }
                }
                Event::Bypass { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.list.em.ensure(CK::Bypass, id);
                        self.mark_map(id);
                    }
                }
                Event::Mandr {
                    xid,
                    pos,
                    size,
                    border,
                    override_redirect,
                } => {
                    if let Some(id) = self.list.find(xid) {
                        if let Some(mud) = self.list.mud.get_mut(id) {
                            mud.position = pos;
                            mud.size = size;
                            mud.border_width = border;
                            mud.override_redirect = override_redirect;
                        }
                        if self.list.em.has(CK::Physical, id) {
                            physical::move_window(&mut self.list, id, pos, size);
                        }
                    }
                }
                Event::Restack { xid, loc } => {
                    if let Some(id) = self.list.find(xid) {
                        let above = match loc {
                            RestackLocation::Below(above_xid) => self.list.find(above_xid),
                            _ => None,
                        };
                        self.order.restack(id, loc, above);
                    }
                }
                Event::Focus { xid } => {
                    // The hint may point at the client; resolve the
                    // frame it belongs to
                    let frame = self.xcontext.ingest.index.find_root(xid);
                    self.active_win = self.list.find(frame).or_else(|| self.list.find(xid));
                    self.broadcast_focus_change();
                }
                Event::NewRoot { pixmap } => {
                    self.rebind_root(pixmap);
                }
                Event::CanvasChange { size } => {
                    self.root_size = size;
                }
                Event::Damage { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.list.em.ensure(CK::ContentsDamaged, id);
                    }
                }
                Event::Shape { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.list.em.ensure(CK::ShapeDamaged, id);
                    }
                }
                Event::Wintype { xid } | Event::WinClass { xid } => {
                    if let Some(id) = self.list.find(xid) {
                        self.refresh_window_metadata(id);
                        self.options.shadow_exclude.invalidate_cache();
                        self.options.fade_exclude.invalidate_cache();
                        self.options.focus_exclude.invalidate_cache();
                        self.options.invert_color_include.invalidate_cache();
                        self.options.blur_background_exclude.invalidate_cache();
                        self.options.opacity_rules.invalidate_cache();
                    }
                }
            }
        }
    }

    fn mark_map(&mut self, id: EntityId) {
        let (pos, size) = match self.list.mud.get(id) {
            Some(mud) => (mud.position, mud.size),
            None => return,
        };

        self.list.em.ensure(CK::Map, id);
        self.list.map.set(
            id,
            MapIntent {
                position: pos,
                size,
            },
        );

        if !self.list.em.has(CK::Physical, id) {
            self.list.em.add(CK::Physical, id);
            self.list.physical.set(
                id,
                Physical {
                    position: pos,
                    size,
                },
            );
        }

        // The window resolves its targets on its first frame
        self.list.em.ensure(CK::FocusChange, id);
        self.list.focus_change.set(
            id,
            FocusChange {
                new_opacity: 100.0,
                new_dim: 100.0,
            },
        );
    }

    fn rebind_root(&mut self, pixmap: u32) {
        if let Some(mut drawable) = self.root_drawable.take() {
            drawable.delete(&self.glx);
        }

        let root_visual = self.xcontext.root_visual();
        match WindowDrawable::new(&self.glx, self.xcontext.root, root_visual) {
            Ok(mut drawable) => {
                if let Err(e) = drawable.bind(&self.glx, pixmap, self.root_size) {
                    log::error!("Failed binding the root pixmap: {}", e);
                    drawable.delete(&self.glx);
                    return;
                }
                self.root_drawable = Some(drawable);
            }
            Err(e) => log::error!("Failed wrapping the root pixmap: {}", e),
        }
    }

    /// One full frame: events, systems, fades, render, cleanup.
    fn frame(&mut self, dt: f64) {
        self.process_events();

        state::tick(&mut self.list, self.active_win);
        physical::tick(&mut self.list);
        self.order.tick(&mut self.list);
        fullscreen::tick(&mut self.list, self.root_size);
        xorg_system::tick(&mut self.list, &self.xcontext);
        texture::tick(&mut self.list, &self.xcontext, &self.glx);
        shape::tick(&mut self.list, &self.xcontext);

        self.apply_rules();
        opacity::calculate_window_opacity(&mut self.list, &self.options, self.active_win);
        self.apply_opacity_rules();
        opacity::schedule_fades(&mut self.list, &self.options);
        opacity::commit_unmap(&mut self.list, &self.options);

        opacity::tick_fades(&mut self.list, dt);
        opacity::commit_fades(&mut self.list);

        render::update_window_contents(&mut self.list, &mut self.assets, &mut self.content_fbo);

        blur::damage_tick(&mut self.list, &self.order);
        self.blur_system.update_blur(
            &mut self.list,
            &self.order,
            &mut self.assets,
            self.root_size,
            self.root_drawable.as_ref().map(|d| &d.texture),
            self.options.blur_level,
        );

        shadow::tick(&mut self.list, &self.options);
        self.shadow_system
            .update_shadows(&mut self.list, &mut self.assets);

        render::paint(
            &self.list,
            &self.order,
            &mut self.assets,
            self.root_drawable.as_ref().map(|d| &d.texture),
            self.root_size,
        );
        self.glx.swap_buffers();

        // Drop the transients
        for kind in [
            CK::Map,
            CK::Unmap,
            CK::Destroy,
            CK::Move,
            CK::Resize,
            CK::FocusChange,
            CK::ContentsDamaged,
            CK::ShapeDamaged,
            CK::FocusChanged,
            CK::WintypeChanged,
        ] {
            self.list.em.reset_component(kind);
        }
    }

    fn animating(&self) -> bool {
        self.list
            .em
            .count_where(&Query::new().has(CK::Transitioning))
            > 0
    }

    /// Run frames until a reset is requested or the benchmark ends.
    pub fn run(&mut self) -> RunOutcome {
        let mut watch = FdWatch::new();
        watch.add_fd(self.xcontext.fd());

        let mut benchmark_cycles = 0u32;
        self.stopwatch.restart();

        loop {
            // Block for input when nothing is animating; keep pumping
            // frames while fades are in flight
            if !self.animating() && self.options.benchmark == 0 {
                watch.wait_for_events(Some(16));
            }

            let dt = self.stopwatch.restart();
            self.frame(dt);
            self.glx.finish();

            if self.options.benchmark > 0 {
                benchmark_cycles += 1;
                if benchmark_cycles >= self.options.benchmark {
                    return RunOutcome::Exit;
                }
            }

            if RESET_REQUESTED.swap(false, Ordering::AcqRel) {
                return RunOutcome::Reset;
            }
        }
    }

    pub fn destroy(&mut self) {
        // Release every GPU-backed component so the store's safe mode
        // stays satisfied
        let ids: Vec<EntityId> = self.list.em.iter(&Query::new()).collect();
        for id in ids {
            if let Some(mut textured) = self.list.textured.take(id) {
                textured.texture.delete();
                textured.stencil.delete();
            }
            self.list.em.remove_component(CK::Textured, id);
            if let Some(mut binds) = self.list.binds_texture.take(id) {
                binds.drawable.delete(&self.glx);
            }
            self.list.em.remove_component(CK::BindsTexture, id);
            if let Some(mut shadow_cache) = self.list.shadow.take(id) {
                shadow_cache.texture.delete();
                shadow_cache.effect.delete();
                shadow_cache.noise.delete();
                shadow_cache.stencil.delete();
            }
            self.list.em.remove_component(CK::Shadow, id);
            if let Some(mut blur_cache) = self.list.blur.take(id) {
                blur_cache.textures[0].delete();
                blur_cache.textures[1].delete();
                blur_cache.stencil.delete();
            }
            self.list.em.remove_component(CK::Blur, id);
        }

        if let Some(mut drawable) = self.root_drawable.take() {
            drawable.delete(&self.glx);
        }
        self.glx.destroy();
    }
}
