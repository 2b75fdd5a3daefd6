// The X server connection
//
// Owns the protocol connection, the extension capability table, the
// compositor registration window and the selection claim, and feeds the
// ingestion pipeline from the raw event queue. Every other subsystem
// talks to X through this.
pub mod events;

use crate::neocomp::atoms::Atoms;
use crate::neocomp::CompError;
use events::{Event, Ingest, PropKind, RawEvent, WinAttribs, XOps, XWindow};
use utils::log;

use x11rb::connection::Connection;
use x11rb::connection::RequestConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::protocol::composite::{self, ConnectionExt as _};
use x11rb::protocol::damage::{self, ConnectionExt as _};
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::render::ConnectionExt as _;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateWindowAux, EventMask,
    MapState, Place, PropMode, Property, WindowClass,
};
use x11rb::protocol::Event as ProtoEvent;
use x11rb::rust_connection::RustConnection;

use std::os::unix::io::{AsRawFd, RawFd};

const REGISTER_PROP: &str = "_NET_WM_CM_S";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtVersion {
    No,
    NoOptional,
    Yes,
    /// Composite at or above 0.2, needed for GetOverlayWindow
    Composite02,
}

impl ExtVersion {
    fn name(&self) -> &'static str {
        match self {
            ExtVersion::No => "NO",
            ExtVersion::NoOptional => "NO (OPTIONAL)",
            ExtVersion::Yes => "YES",
            ExtVersion::Composite02 => "0.2+",
        }
    }
}

/// Which protocol extensions the server offers. Shape and Xinerama are
/// optional; everything else is required to start.
pub struct Capabilities {
    entries: Vec<(&'static str, ExtVersion)>,
}

const OPTIONAL_EXTENSIONS: [&str; 2] = ["SHAPE", "XINERAMA"];

const EXTENSIONS: [&str; 10] = [
    "Composite",
    "XFIXES",
    "DAMAGE",
    "RENDER",
    "SHAPE",
    "RANDR",
    "GLX",
    "XINERAMA",
    "SYNC",
    "X-Resource",
];

impl Capabilities {
    pub fn has(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, v)| *n == name && *v != ExtVersion::No && *v != ExtVersion::NoOptional)
    }

    /// Print the feature table; error when a required extension is
    /// missing.
    pub fn ensure(&self) -> Result<(), CompError> {
        let mut missing = false;
        println!("Xorg Features:");
        for (name, version) in self.entries.iter() {
            println!("    {}: {}", name, version.name());
            if *version == ExtVersion::No {
                missing = true;
            }
        }

        if missing {
            return Err(CompError::XError(
                "a required X extension is missing".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct X11Context {
    pub conn: RustConnection,
    pub screen: usize,
    pub root: XWindow,
    pub root_size: (u16, u16),
    pub overlay: XWindow,
    pub reg: XWindow,
    pub atoms: Atoms,
    pub capabilities: Capabilities,
    pub ingest: Ingest,
}

fn query_capabilities(conn: &RustConnection) -> Result<Capabilities, CompError> {
    let mut entries = Vec::new();
    for name in EXTENSIONS.iter().copied() {
        let present = conn
            .extension_information(name)
            .map_err(|e| CompError::XError(e.to_string()))?
            .is_some();
        let version = if present {
            ExtVersion::Yes
        } else if OPTIONAL_EXTENSIONS.contains(&name) {
            ExtVersion::NoOptional
        } else {
            ExtVersion::No
        };
        entries.push((name, version));
    }

    // The docs say to always fetch the version as part of
    // initialization, even where we don't branch on it
    if let Ok(reply) = conn.composite_query_version(0, 4) {
        if let Ok(version) = reply.reply() {
            if version.major_version > 0 || version.minor_version >= 2 {
                for entry in entries.iter_mut() {
                    if entry.0 == "Composite" {
                        entry.1 = ExtVersion::Composite02;
                    }
                }
            }
        }
    }
    let _ = conn.xfixes_query_version(5, 0).map(|c| c.reply());
    let _ = conn.damage_query_version(1, 1).map(|c| c.reply());
    let _ = conn.render_query_version(0, 11).map(|c| c.reply());
    let _ = conn.shape_query_version().map(|c| c.reply());
    let _ = conn.randr_query_version(1, 4).map(|c| c.reply());
    let _ = conn.sync_initialize(3, 1).map(|c| c.reply());

    Ok(Capabilities { entries })
}

/// Create the 1x1 registration window and acquire the compositor
/// selection for this screen. A held selection means another
/// compositor is running, which is fatal.
fn register_cm(
    conn: &RustConnection,
    screen: usize,
    root: XWindow,
) -> Result<XWindow, CompError> {
    let win = conn
        .generate_id()
        .map_err(|e| CompError::XError(e.to_string()))?;
    conn.create_window(
        x11rb::COPY_DEPTH_FROM_PARENT,
        win,
        root,
        0,
        0,
        1,
        1,
        0,
        WindowClass::INPUT_OUTPUT,
        x11rb::COPY_FROM_PARENT,
        &CreateWindowAux::new(),
    )
    .map_err(|e| CompError::XError(e.to_string()))?;

    let net_wm_pid = conn
        .intern_atom(false, b"_NET_WM_PID")
        .map_err(|e| CompError::XError(e.to_string()))?
        .reply()
        .map_err(|e| CompError::XError(e.to_string()))?
        .atom;
    let pid = std::process::id();
    conn.change_property32(
        PropMode::REPLACE,
        win,
        net_wm_pid,
        AtomEnum::CARDINAL,
        &[pid],
    )
    .map_err(|e| CompError::XError(e.to_string()))?;

    let version_atom = conn
        .intern_atom(false, b"NEOCOMP_VERSION")
        .map_err(|e| CompError::XError(e.to_string()))?
        .reply()
        .map_err(|e| CompError::XError(e.to_string()))?
        .atom;
    conn.change_property8(
        PropMode::REPLACE,
        win,
        version_atom,
        AtomEnum::STRING,
        VERSION.as_bytes(),
    )
    .map_err(|e| CompError::XError(e.to_string()))?;

    // Acquire the compositing selection for this screen
    let selection_name = format!("{}{}", REGISTER_PROP, screen);
    let selection = conn
        .intern_atom(false, selection_name.as_bytes())
        .map_err(|e| CompError::XError(e.to_string()))?
        .reply()
        .map_err(|e| CompError::XError(e.to_string()))?
        .atom;

    let owner = conn
        .get_selection_owner(selection)
        .map_err(|e| CompError::XError(e.to_string()))?
        .reply()
        .map_err(|e| CompError::XError(e.to_string()))?
        .owner;
    if owner != x11rb::NONE {
        return Err(CompError::XError(
            "another composite manager is already running".to_string(),
        ));
    }

    conn.set_selection_owner(win, selection, x11rb::CURRENT_TIME)
        .map_err(|e| CompError::XError(e.to_string()))?;

    Ok(win)
}

impl X11Context {
    pub fn new() -> Result<X11Context, CompError> {
        let (conn, screen) =
            x11rb::connect(None).map_err(|e| CompError::XError(e.to_string()))?;

        let capabilities = query_capabilities(&conn)?;
        capabilities.ensure()?;

        let setup = conn.setup();
        let screen_info = &setup.roots[screen];
        let root = screen_info.root;
        let root_size = (screen_info.width_in_pixels, screen_info.height_in_pixels);

        let atoms = Atoms::new(&conn).map_err(|e| CompError::XError(e.to_string()))?;

        let reg = register_cm(&conn, screen, root)?;

        let overlay = conn
            .composite_get_overlay_window(root)
            .map_err(|e| CompError::XError(e.to_string()))?
            .reply()
            .map_err(|e| CompError::XError(e.to_string()))?
            .overlay_win;
        log::debug!("Using composite overlay window {:#010x}", overlay);

        // Everything structural on the whole tree, properties on the
        // root itself
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::PROPERTY_CHANGE,
            ),
        )
        .map_err(|e| CompError::XError(e.to_string()))?;

        conn.flush().map_err(|e| CompError::XError(e.to_string()))?;

        let ingest = Ingest::new(root, overlay, reg);

        Ok(X11Context {
            conn,
            screen,
            root,
            root_size,
            overlay,
            reg,
            atoms,
            capabilities,
            ingest,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }

    /// Walk the existing window tree and synthesize the bootstrap
    /// event stream.
    pub fn bootstrap(&mut self) {
        let mut ingest = std::mem::replace(&mut self.ingest, Ingest::new(0, 0, 0));
        ingest.begin_events(self);
        self.ingest = ingest;
    }

    fn classify_atom(&self, atom: u32) -> PropKind {
        let atoms = &self.atoms;
        if atom == atoms.ewmh_active_win {
            PropKind::ActiveWindow
        } else if atom == atoms.xrootpmap_id || atom == atoms.xsetroot_id {
            PropKind::RootPixmap
        } else if atom == atoms.client {
            PropKind::WmState
        } else if atom == atoms.win_type || atom == atoms.name || atom == atoms.name_ewmh {
            PropKind::WinType
        } else if atom == atoms.role {
            PropKind::Role
        } else if atom == atoms.class {
            PropKind::Class
        } else if atom == atoms.bypass {
            PropKind::Bypass
        } else if atoms.is_tracked(atom) {
            PropKind::Tracked
        } else {
            PropKind::Other
        }
    }

    fn to_raw(&self, event: ProtoEvent) -> Option<RawEvent> {
        match event {
            ProtoEvent::CreateNotify(ev) => Some(RawEvent::Create {
                window: ev.window,
                parent: ev.parent,
                x: ev.x,
                y: ev.y,
                width: ev.width,
                height: ev.height,
                border: ev.border_width,
            }),
            ProtoEvent::DestroyNotify(ev) => Some(RawEvent::Destroy { window: ev.window }),
            ProtoEvent::ReparentNotify(ev) => Some(RawEvent::Reparent {
                window: ev.window,
                parent: ev.parent,
            }),
            ProtoEvent::ConfigureNotify(ev) => Some(RawEvent::Configure {
                window: ev.window,
                x: ev.x,
                y: ev.y,
                width: ev.width,
                height: ev.height,
                border: ev.border_width,
                above: ev.above_sibling,
                override_redirect: ev.override_redirect,
            }),
            ProtoEvent::CirculateNotify(ev) => Some(RawEvent::Circulate {
                window: ev.window,
                place_on_top: ev.place == Place::ON_TOP,
            }),
            ProtoEvent::MapNotify(ev) => Some(RawEvent::Map { window: ev.window }),
            ProtoEvent::UnmapNotify(ev) => Some(RawEvent::Unmap {
                window: ev.window,
                // The send_event bit rides on the response type
                send_event: ev.response_type & 0x80 != 0,
            }),
            ProtoEvent::PropertyNotify(ev) => Some(RawEvent::Property {
                window: ev.window,
                kind: self.classify_atom(ev.atom),
                deleted: ev.state == Property::DELETE,
            }),
            ProtoEvent::DamageNotify(ev) => Some(RawEvent::DamageNotify {
                drawable: ev.drawable,
            }),
            ProtoEvent::ShapeNotify(ev) => Some(RawEvent::ShapeNotify {
                window: ev.affected_window,
            }),
            ProtoEvent::Error(err) => {
                // Recoverable; decode and keep the frame going
                log::error!("X error: {:?}", err);
                None
            }
            _ => None,
        }
    }

    /// Pull the next normalized event, preprocessing raw events as
    /// needed. Non-blocking; None means the frame can start.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.ingest.next_event() {
                return Some(event);
            }

            match self.conn.poll_for_event() {
                Ok(Some(proto)) => {
                    if let Some(raw) = self.to_raw(proto) {
                        let mut ingest =
                            std::mem::replace(&mut self.ingest, Ingest::new(0, 0, 0));
                        ingest.handle_raw(self, raw);
                        self.ingest = ingest;
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    log::error!("Lost the X connection: {}", e);
                    return None;
                }
            }
        }
    }

    pub fn redirect_window(&self, xid: XWindow) {
        if let Err(e) = self
            .conn
            .composite_redirect_window(xid, composite::Redirect::MANUAL)
        {
            log::error!("Failed redirecting {:#010x}: {}", xid, e);
        }
    }

    pub fn unredirect_window(&self, xid: XWindow) {
        if let Err(e) = self
            .conn
            .composite_unredirect_window(xid, composite::Redirect::MANUAL)
        {
            log::error!("Failed unredirecting {:#010x}: {}", xid, e);
        }
    }

    pub fn name_window_pixmap(&self, xid: XWindow) -> Option<u32> {
        let pixmap = self.conn.generate_id().ok()?;
        self.conn
            .composite_name_window_pixmap(xid, pixmap)
            .ok()?
            .check()
            .ok()?;
        Some(pixmap)
    }

    /// Fetch the bounding shape as rectangles, clipped to the window
    /// extent.
    pub fn fetch_shape_rects(&self, xid: XWindow) -> Option<Vec<(i16, i16, u16, u16)>> {
        let region = self.conn.generate_id().ok()?;
        self.conn
            .xfixes_create_region_from_window(region, xid, shape::SK::BOUNDING)
            .ok()?;
        let reply = self
            .conn
            .xfixes_fetch_region(region)
            .ok()
            .and_then(|c| c.reply().ok());
        let _ = self.conn.xfixes_destroy_region(region);

        reply.map(|r| {
            r.rectangles
                .iter()
                .map(|rect| (rect.x, rect.y, rect.width, rect.height))
                .collect()
        })
    }

    pub fn conn_intern_atom(&self, name: &str) -> Option<u32> {
        self.conn
            .intern_atom(false, name.as_bytes())
            .ok()?
            .reply()
            .ok()
            .map(|reply| reply.atom)
    }

    pub fn atom_name(&self, atom: u32) -> Option<String> {
        let reply = self.conn.get_atom_name(atom).ok()?.reply().ok()?;
        Some(String::from_utf8_lossy(&reply.name).to_string())
    }

    pub fn root_visual(&self) -> u32 {
        self.conn
            .setup()
            .roots
            .get(self.screen)
            .map(|screen| screen.root_visual)
            .unwrap_or(0)
    }

    // Property helpers for window metadata

    fn get_text_property(&self, xid: XWindow, atom: u32) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, xid, atom, AtomEnum::ANY, 0, 256)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            return None;
        }
        // Null-separated lists keep only the first element here
        let end = reply
            .value
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(reply.value.len());
        Some(String::from_utf8_lossy(&reply.value[..end]).to_string())
    }

    pub fn fetch_name(&self, xid: XWindow) -> Option<String> {
        self.get_text_property(xid, self.atoms.name_ewmh)
            .or_else(|| self.get_text_property(xid, self.atoms.name))
    }

    pub fn fetch_role(&self, xid: XWindow) -> Option<String> {
        self.get_text_property(xid, self.atoms.role)
    }

    /// WM_CLASS is two null-terminated strings: instance, then class.
    pub fn fetch_class(&self, xid: XWindow) -> Option<(String, String)> {
        let reply = self
            .conn
            .get_property(false, xid, self.atoms.class, AtomEnum::STRING, 0, 256)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            return None;
        }

        let mut parts = reply.value.split(|b| *b == 0);
        let instance = String::from_utf8_lossy(parts.next()?).to_string();
        let general = String::from_utf8_lossy(parts.next()?).to_string();
        Some((instance, general))
    }

    /// The first _NET_WM_WINDOW_TYPE atom, raw.
    pub fn fetch_window_type_atom(&self, xid: XWindow) -> Option<u32> {
        let reply = self
            .conn
            .get_property(false, xid, self.atoms.win_type, AtomEnum::ATOM, 0, 32)
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next();
        value
    }

    pub fn fetch_leader(&self, xid: XWindow) -> Option<XWindow> {
        let reply = self
            .conn
            .get_property(
                false,
                xid,
                self.atoms.client_leader,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next();
        value
    }

    /// The _COMPTON_SHADOW override: Some(false) disables the shadow.
    pub fn fetch_shadow_override(&self, xid: XWindow) -> Option<bool> {
        let reply = self
            .conn
            .get_property(
                false,
                xid,
                self.atoms.compton_shadow,
                AtomEnum::CARDINAL,
                0,
                1,
            )
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next().map(|v| v != 0);
        value
    }

    pub fn fetch_property_int(
        &self,
        xid: XWindow,
        atom: u32,
        index: usize,
        format: u32,
    ) -> Option<i64> {
        let reply = self
            .conn
            .get_property(false, xid, atom, AtomEnum::ANY, 0, index as u32 + 1)
            .ok()?
            .reply()
            .ok()?;
        match format {
            8 => reply.value8()?.nth(index).map(|v| v as i64),
            16 => reply.value16()?.nth(index).map(|v| v as i64),
            _ => reply.value32()?.nth(index).map(|v| v as i64),
        }
    }

    pub fn fetch_property_str(&self, xid: XWindow, atom: u32, index: usize) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, xid, atom, AtomEnum::ANY, 0, 256)
            .ok()?
            .reply()
            .ok()?;
        if reply.format != 8 {
            return None;
        }
        reply
            .value
            .split(|b| *b == 0)
            .nth(index)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).to_string())
    }
}

impl XOps for X11Context {
    fn create_damage(&self, xid: XWindow) -> u32 {
        let damage = match self.conn.generate_id() {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed allocating a damage id: {}", e);
                return 0;
            }
        };
        if let Err(e) = self
            .conn
            .damage_create(damage, xid, damage::ReportLevel::NON_EMPTY)
        {
            log::error!("Failed creating damage for {:#010x}: {}", xid, e);
        }
        damage
    }

    fn destroy_damage(&self, damage: u32) {
        let _ = self.conn.damage_destroy(damage);
    }

    fn damage_subtract(&self, damage: u32) {
        let _ = self
            .conn
            .damage_subtract(damage, x11rb::NONE, x11rb::NONE);
    }

    fn select_property_input(&self, xid: XWindow) {
        let _ = self.conn.change_window_attributes(
            xid,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        );
    }

    fn select_shape_input(&self, xid: XWindow) {
        if self.capabilities.has("SHAPE") {
            let _ = self.conn.shape_select_input(xid, true);
        }
    }

    fn get_attributes(&self, xid: XWindow) -> Option<WinAttribs> {
        let attribs = self
            .conn
            .get_window_attributes(xid)
            .ok()?
            .reply()
            .ok()?;
        let geometry = self.conn.get_geometry(xid).ok()?.reply().ok()?;

        Some(WinAttribs {
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            border: geometry.border_width,
            viewable: attribs.map_state == MapState::VIEWABLE,
            input_only: attribs.class == WindowClass::INPUT_ONLY,
            override_redirect: attribs.override_redirect,
        })
    }

    fn bypass_state(&self, xid: XWindow) -> i32 {
        let reply = match self
            .conn
            .get_property(false, xid, self.atoms.bypass, AtomEnum::CARDINAL, 0, 1)
            .ok()
            .and_then(|c| c.reply().ok())
        {
            Some(reply) => reply,
            None => return -1,
        };
        match reply.value32().and_then(|mut v| v.next()) {
            Some(value) => value as i32,
            None => -1,
        }
    }

    fn has_wm_state(&self, xid: XWindow) -> bool {
        self.conn
            .get_property(false, xid, self.atoms.client, AtomEnum::ANY, 0, 1)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|reply| reply.type_ != x11rb::NONE)
            .unwrap_or(false)
    }

    fn active_window(&self) -> Option<XWindow> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.ewmh_active_win,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next().filter(|w| *w != 0);
        value
    }

    fn root_pixmap(&self) -> Option<u32> {
        for atom in [self.atoms.xrootpmap_id, self.atoms.xsetroot_id] {
            let reply = self
                .conn
                .get_property(false, self.root, atom, AtomEnum::PIXMAP, 0, 1)
                .ok()
                .and_then(|c| c.reply().ok());
            if let Some(reply) = reply {
                if let Some(pixmap) = reply.value32().and_then(|mut v| v.next()) {
                    return Some(pixmap);
                }
            }
        }
        None
    }

    fn query_children(&self, xid: XWindow) -> Vec<XWindow> {
        self.conn
            .query_tree(xid)
            .ok()
            .and_then(|c| c.reply().ok())
            .map(|reply| reply.children)
            .unwrap_or_default()
    }
}
