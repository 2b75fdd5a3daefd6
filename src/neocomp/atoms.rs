// The atoms the compositor watches
use crate::neocomp::wintypes::NUM_WINTYPES;

use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt};

pub struct Atoms {
    /// _NET_FRAME_EXTENTS. Fetched nowhere at present, tracked so the
    /// property list stays complete.
    pub frame_extents: Atom,
    /// Property identifying top-level client windows: WM_STATE
    pub client: Atom,
    pub name: Atom,
    pub name_ewmh: Atom,
    pub class: Atom,
    pub role: Atom,
    pub transient: Atom,
    pub client_leader: Atom,
    pub ewmh_active_win: Atom,
    pub compton_shadow: Atom,
    pub bypass: Atom,
    pub win_type: Atom,
    pub xrootpmap_id: Atom,
    pub xsetroot_id: Atom,
    pub wintype_atoms: [Atom; NUM_WINTYPES],
    /// Atoms referenced by match rules, watched for cache invalidation
    pub extra: Vec<Atom>,
}

const WINTYPE_ATOM_NAMES: [&str; NUM_WINTYPES] = [
    "", // unknown has no atom
    "_NET_WM_WINDOW_TYPE_DESKTOP",
    "_NET_WM_WINDOW_TYPE_DOCK",
    "_NET_WM_WINDOW_TYPE_TOOLBAR",
    "_NET_WM_WINDOW_TYPE_MENU",
    "_NET_WM_WINDOW_TYPE_UTILITY",
    "_NET_WM_WINDOW_TYPE_SPLASH",
    "_NET_WM_WINDOW_TYPE_DIALOG",
    "_NET_WM_WINDOW_TYPE_NORMAL",
    "_NET_WM_WINDOW_TYPE_DROPDOWN_MENU",
    "_NET_WM_WINDOW_TYPE_POPUP_MENU",
    "_NET_WM_WINDOW_TYPE_TOOLTIP",
    "_NET_WM_WINDOW_TYPE_NOTIFICATION",
    "_NET_WM_WINDOW_TYPE_COMBO",
    "_NET_WM_WINDOW_TYPE_DND",
];

fn intern<C: Connection>(conn: &C, name: &str) -> Result<Atom, ReplyError> {
    Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
}

impl Atoms {
    pub fn new<C: Connection>(conn: &C) -> Result<Atoms, ReplyError> {
        let mut wintype_atoms = [0; NUM_WINTYPES];
        for (i, name) in WINTYPE_ATOM_NAMES.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            wintype_atoms[i] = intern(conn, name)?;
        }

        Ok(Atoms {
            frame_extents: intern(conn, "_NET_FRAME_EXTENTS")?,
            client: intern(conn, "WM_STATE")?,
            name: AtomEnum::WM_NAME.into(),
            name_ewmh: intern(conn, "_NET_WM_NAME")?,
            class: AtomEnum::WM_CLASS.into(),
            role: intern(conn, "WM_WINDOW_ROLE")?,
            transient: AtomEnum::WM_TRANSIENT_FOR.into(),
            client_leader: intern(conn, "WM_CLIENT_LEADER")?,
            ewmh_active_win: intern(conn, "_NET_ACTIVE_WINDOW")?,
            compton_shadow: intern(conn, "_COMPTON_SHADOW")?,
            bypass: intern(conn, "_NET_WM_BYPASS_COMPOSITOR")?,
            win_type: intern(conn, "_NET_WM_WINDOW_TYPE")?,
            xrootpmap_id: intern(conn, "_XROOTPMAP_ID")?,
            xsetroot_id: intern(conn, "_XSETROOT_ID")?,
            wintype_atoms,
            extra: Vec::new(),
        })
    }

    /// Remember an atom referenced by a match rule, so property changes
    /// on it can invalidate rule caches.
    pub fn track(&mut self, atom: Atom) {
        if !self.extra.contains(&atom) {
            self.extra.push(atom);
        }
    }

    pub fn is_tracked(&self, atom: Atom) -> bool {
        self.extra.contains(&atom)
    }
}
