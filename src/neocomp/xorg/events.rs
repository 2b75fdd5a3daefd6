// X event ingestion
//
// Raw protocol events are preprocessed into a normalized event stream
// while the window indices (parent pointers, active top-levels, mapped
// set, clients, bypassed) are kept current. The index maintenance is
// pure: everything the server would have to answer goes through the
// XOps trait, so tests can drive this with a fake.
use utils::log;

use cgmath::Vector2;

use std::collections::{HashMap, HashSet, VecDeque};

pub type XWindow = u32;
pub type XPixmap = u32;
pub type XDamageHandle = u32;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RestackLocation {
    Below(XWindow),
    Highest,
    Lowest,
}

/// The normalized event stream the tick loop consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Add {
        xid: XWindow,
        pos: Vector2<f32>,
        size: Vector2<f32>,
        border: f32,
        mapped: bool,
        override_redirect: bool,
    },
    Destroy {
        xid: XWindow,
    },
    Client {
        xid: XWindow,
        client_xid: XWindow,
    },
    Map {
        xid: XWindow,
    },
    Unmap {
        xid: XWindow,
    },
    Bypass {
        xid: XWindow,
    },
    /// A geometry/restack configure
    Mandr {
        xid: XWindow,
        pos: Vector2<f32>,
        size: Vector2<f32>,
        border: f32,
        override_redirect: bool,
    },
    Restack {
        xid: XWindow,
        loc: RestackLocation,
    },
    Focus {
        xid: XWindow,
    },
    NewRoot {
        pixmap: XPixmap,
    },
    CanvasChange {
        size: Vector2<f32>,
    },
    Damage {
        xid: XWindow,
    },
    Shape {
        xid: XWindow,
    },
    Wintype {
        xid: XWindow,
    },
    WinClass {
        xid: XWindow,
    },
}

/// Which property a PropertyNotify touched, pre-resolved from the atom.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PropKind {
    ActiveWindow,
    RootPixmap,
    WmState,
    WinType,
    Name,
    Role,
    Class,
    Bypass,
    /// An atom a match rule references
    Tracked,
    Other,
}

/// The subset of raw X events the preprocessor consumes, with atoms
/// already classified.
#[derive(Copy, Clone, Debug)]
pub enum RawEvent {
    Create {
        window: XWindow,
        parent: XWindow,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border: u16,
    },
    Destroy {
        window: XWindow,
    },
    Reparent {
        window: XWindow,
        parent: XWindow,
    },
    Configure {
        window: XWindow,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border: u16,
        above: XWindow,
        override_redirect: bool,
    },
    Circulate {
        window: XWindow,
        place_on_top: bool,
    },
    Map {
        window: XWindow,
    },
    Unmap {
        window: XWindow,
        send_event: bool,
    },
    Property {
        window: XWindow,
        kind: PropKind,
        deleted: bool,
    },
    DamageNotify {
        drawable: XWindow,
    },
    ShapeNotify {
        window: XWindow,
    },
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WinAttribs {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border: u16,
    pub viewable: bool,
    pub input_only: bool,
    pub override_redirect: bool,
}

/// Everything the preprocessor asks the server. The live implementation
/// wraps the connection; tests substitute a fake.
pub trait XOps {
    fn create_damage(&self, xid: XWindow) -> XDamageHandle;
    fn destroy_damage(&self, damage: XDamageHandle);
    /// Subtract all damage so further reports keep coming
    fn damage_subtract(&self, damage: XDamageHandle);
    fn select_property_input(&self, xid: XWindow);
    fn select_shape_input(&self, xid: XWindow);
    fn get_attributes(&self, xid: XWindow) -> Option<WinAttribs>;
    /// The value of _NET_WM_BYPASS_COMPOSITOR, -1 when absent
    fn bypass_state(&self, xid: XWindow) -> i32;
    fn has_wm_state(&self, xid: XWindow) -> bool;
    fn active_window(&self) -> Option<XWindow>;
    fn root_pixmap(&self) -> Option<XPixmap>;
    fn query_children(&self, xid: XWindow) -> Vec<XWindow>;
}

/// The window-tree and membership indices.
#[derive(Default)]
pub struct WinIndex {
    /// Child to immediate parent, for every known sub-window
    parent: HashMap<XWindow, XWindow>,
    /// Active top-level windows
    active: HashSet<XWindow>,
    /// Windows currently mapped
    mapped: HashSet<XWindow>,
    /// Windows carrying WM_STATE
    clients: HashSet<XWindow>,
    /// Windows with _NET_WM_BYPASS_COMPOSITOR=1
    bypassed: HashSet<XWindow>,
    /// Damage handles per active window
    damage: HashMap<XWindow, XDamageHandle>,
}

impl WinIndex {
    pub fn is_active(&self, xid: XWindow) -> bool {
        self.active.contains(&xid)
    }

    pub fn is_mapped(&self, xid: XWindow) -> bool {
        self.mapped.contains(&xid)
    }

    pub fn is_client(&self, xid: XWindow) -> bool {
        self.clients.contains(&xid)
    }

    pub fn is_bypassed(&self, xid: XWindow) -> bool {
        self.bypassed.contains(&xid)
    }

    /// Walk the parent map to the topmost known ancestor.
    pub fn find_root(&self, xid: XWindow) -> XWindow {
        let mut current = xid;
        while let Some(parent) = self.parent.get(&current) {
            current = *parent;
        }
        current
    }

    /// Breadth-first search down the parent map for the nearest
    /// descendant carrying WM_STATE.
    pub fn find_closest_client(&self, top: XWindow) -> Option<XWindow> {
        let mut current: HashSet<XWindow> = HashSet::new();
        current.insert(top);

        while !current.is_empty() {
            let mut next: HashSet<XWindow> = HashSet::new();

            for (child, parent) in self.parent.iter() {
                if !current.contains(parent) {
                    continue;
                }
                if self.clients.contains(child) {
                    return Some(*child);
                }
                next.insert(*child);
            }

            current = next;
        }
        None
    }

    fn attach_subtree(&mut self, parent: XWindow, child: XWindow) {
        if self.parent.insert(child, parent).is_some() {
            log::error!("Client {:#010x} already had a frame?", child);
        }
    }

    /// Returns whether the window was attached somewhere.
    fn detach_subtree(&mut self, xid: XWindow) -> bool {
        self.parent.remove(&xid).is_some()
    }
}

/// The ingestion pipeline: indices plus the normalized event buffer.
pub struct Ingest {
    pub index: WinIndex,
    i_buffer: VecDeque<Event>,
    /// Our own windows, ignored in the stream
    i_overlay: XWindow,
    i_reg: XWindow,
    i_root: XWindow,
}

impl Ingest {
    pub fn new(root: XWindow, overlay: XWindow, reg: XWindow) -> Ingest {
        Ingest {
            index: WinIndex::default(),
            i_buffer: VecDeque::new(),
            i_overlay: overlay,
            i_reg: reg,
            i_root: root,
        }
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.i_buffer.pop_front()
    }

    fn push(&mut self, event: Event) {
        self.i_buffer.push_back(event)
    }

    /// Whether a frame or its closest client asked to bypass the
    /// compositor.
    fn is_frame_bypassed(&self, xid: XWindow) -> bool {
        if self.index.is_bypassed(xid) {
            return true;
        }
        match self.index.find_closest_client(xid) {
            Some(client) => self.index.is_bypassed(client),
            None => false,
        }
    }

    fn window_create(
        &mut self,
        ops: &dyn XOps,
        xid: XWindow,
        x: i16,
        y: i16,
        border: u16,
        width: u16,
        height: u16,
    ) {
        if !self.index.active.insert(xid) {
            // During bootstrap someone might create a window between
            // our event subscription and the tree walk
            return;
        }

        let damage = ops.create_damage(xid);
        self.index.damage.insert(xid, damage);

        ops.select_shape_input(xid);

        let border = border as f32;
        self.push(Event::Add {
            xid,
            mapped: false,
            pos: Vector2::new(x as f32 - border, y as f32 - border),
            size: Vector2::new(
                width as f32 + border * 2.0,
                height as f32 + border * 2.0,
            ),
            border,
            override_redirect: false,
        });
    }

    fn window_map(&mut self, xid: XWindow) {
        self.index.mapped.insert(xid);

        if !self.index.is_active(xid) {
            return;
        }

        if self.is_frame_bypassed(xid) {
            self.push(Event::Bypass { xid });
        } else {
            self.push(Event::Map { xid });
        }
    }

    fn create_destroy(&mut self, ops: &dyn XOps, xid: XWindow) {
        if self.index.detach_subtree(xid) {
            // Window was framed which means it won't be active
            return;
        }

        if !self.index.active.remove(&xid) {
            // The window wasn't active, so we swallow the destroy
            return;
        }

        match self.index.damage.remove(&xid) {
            Some(damage) => ops.destroy_damage(damage),
            None => log::error!("Window {:#010x} didn't have damage", xid),
        }

        // Framed window destroy causes all the subwindows to be
        // destroyed, which drops the client from the client set
        self.push(Event::Destroy { xid });
    }

    fn create_gets_client(&mut self, xid: XWindow, client_xid: XWindow) {
        assert!(self.index.is_active(xid));
        self.push(Event::Client { xid, client_xid });
    }

    fn refresh_focus(&mut self, ops: &dyn XOps) {
        match ops.active_window() {
            Some(xid) => self.push(Event::Focus { xid }),
            None => (),
        }
    }

    fn refresh_root(&mut self, ops: &dyn XOps) {
        if let Some(pixmap) = ops.root_pixmap() {
            self.push(Event::NewRoot { pixmap });
        }
    }

    /// The frame a property change on `win` affects, if any: the window
    /// itself when it is a top-level, or its frame when the window is
    /// that frame's current client.
    fn find_affected_window(&self, win: XWindow) -> Option<XWindow> {
        let frame = self.index.find_root(win);
        if !self.index.is_active(frame) {
            return None;
        }

        if frame == win {
            return Some(frame);
        }

        if !self.index.is_client(win) {
            return None;
        }

        match self.index.find_closest_client(frame) {
            Some(client) if client == win => Some(frame),
            _ => None,
        }
    }

    /// Preprocess one raw event into zero or more normalized events.
    pub fn handle_raw(&mut self, ops: &dyn XOps, raw: RawEvent) {
        match raw {
            RawEvent::Create {
                window,
                parent,
                x,
                y,
                width,
                height,
                border,
            } => {
                // Ignore our overlay and reg window
                if window == self.i_overlay || window == self.i_reg {
                    return;
                }
                if parent == self.i_root {
                    self.window_create(ops, window, x, y, border, width, height);
                    ops.select_property_input(window);
                } else {
                    self.index.attach_subtree(parent, window);
                    // Watch for possible WM_STATE
                    ops.select_property_input(window);
                }
            }
            RawEvent::Destroy { window } => {
                let frame = self.index.find_root(window);
                let old_bypassed = self.is_frame_bypassed(frame);

                self.index.mapped.remove(&window);
                self.index.clients.remove(&window);
                self.index.bypassed.remove(&window);

                self.create_destroy(ops, window);

                // Losing a bypassed client can flip the frame back to
                // composited
                let bypassed = self.is_frame_bypassed(frame);
                if frame != window && old_bypassed != bypassed {
                    // A destroy can't make a window suddenly bypassed
                    assert!(!bypassed);
                    if self.index.is_mapped(frame) {
                        self.push(Event::Map { xid: frame });
                    }
                }
            }
            RawEvent::Reparent { window, parent } => {
                if parent == self.i_root {
                    // We only composite top level windows, so a
                    // reparent to the root looks like a new window
                    let attribs = match ops.get_attributes(window) {
                        Some(attribs) => attribs,
                        None => return,
                    };
                    self.window_create(
                        ops,
                        window,
                        attribs.x,
                        attribs.y,
                        attribs.border,
                        attribs.width,
                        attribs.height,
                    );

                    if self.index.is_mapped(window) {
                        if self.is_frame_bypassed(window) {
                            self.push(Event::Bypass { xid: window });
                        } else {
                            self.push(Event::Map { xid: window });
                        }
                    }

                    self.index.detach_subtree(window);
                } else {
                    // Destroy expects the damage to already be freed
                    if let Some(damage) = self.index.damage.get(&window) {
                        ops.destroy_damage(*damage);
                    }

                    self.create_destroy(ops, window);
                    let frame = self.index.find_root(parent);

                    let old_client = self.index.find_closest_client(frame);

                    self.index.attach_subtree(parent, window);

                    if let Some(client) = self.index.find_closest_client(frame) {
                        if old_client != Some(client) && self.index.is_active(frame) {
                            self.create_gets_client(frame, client);
                            if self.index.is_bypassed(client) {
                                self.push(Event::Bypass { xid: frame });
                            }
                        }
                    }
                }
            }
            RawEvent::Configure {
                window,
                x,
                y,
                width,
                height,
                border,
                above,
                override_redirect,
            } => {
                if window == self.i_root {
                    // Root changes change the rendering canvas
                    self.push(Event::CanvasChange {
                        size: Vector2::new(width as f32, height as f32),
                    });
                } else {
                    if !self.index.is_active(window) {
                        return;
                    }
                    let border = border as f32;
                    self.push(Event::Mandr {
                        xid: window,
                        pos: Vector2::new(x as f32 - border, y as f32 - border),
                        size: Vector2::new(
                            width as f32 + border * 2.0,
                            height as f32 + border * 2.0,
                        ),
                        border,
                        override_redirect,
                    });
                    self.push(Event::Restack {
                        xid: window,
                        loc: RestackLocation::Below(above),
                    });
                }
            }
            RawEvent::Circulate { window, place_on_top } => {
                if !self.index.is_active(window) {
                    return;
                }
                self.push(Event::Restack {
                    xid: window,
                    loc: if place_on_top {
                        RestackLocation::Highest
                    } else {
                        RestackLocation::Lowest
                    },
                });
            }
            RawEvent::Map { window } => {
                self.window_map(window);
            }
            RawEvent::Unmap { window, send_event } => {
                // Some applications (firefox) send their own unmap
                // events. If it's actually unmapped Xorg will tell us.
                if send_event {
                    return;
                }

                self.index.mapped.remove(&window);

                if !self.index.is_active(window) {
                    return;
                }
                self.push(Event::Unmap { xid: window });
            }
            RawEvent::Property {
                window,
                kind,
                deleted,
            } => {
                self.handle_property(ops, window, kind, deleted);
            }
            RawEvent::DamageNotify { drawable } => {
                // We need to subtract the damage even if we aren't
                // mapped, or we won't be notified of any new damage
                match self.index.damage.get(&drawable) {
                    Some(damage) => ops.damage_subtract(*damage),
                    None => return,
                }

                if self.index.is_bypassed(drawable) {
                    return;
                }
                if !self.index.is_mapped(drawable) {
                    return;
                }

                self.push(Event::Damage { xid: drawable });
            }
            RawEvent::ShapeNotify { window } => {
                if !self.index.is_active(window) {
                    return;
                }
                self.push(Event::Shape { xid: window });
            }
        }
    }

    fn handle_property(&mut self, ops: &dyn XOps, window: XWindow, kind: PropKind, deleted: bool) {
        if window == self.i_root {
            match kind {
                PropKind::ActiveWindow => self.refresh_focus(ops),
                PropKind::RootPixmap => self.refresh_root(ops),
                _ => (),
            }
            return;
        }

        match kind {
            PropKind::WmState => {
                let frame = self.index.find_root(window);
                let old_client = self.index.find_closest_client(frame);

                if !deleted {
                    if !self.index.clients.insert(window) {
                        // The window was already a client
                        return;
                    }
                } else if !self.index.clients.remove(&window) {
                    return;
                }

                if self.index.is_active(window) {
                    // The window is a frame; frames can't be clients.
                    // We still track client status in case it gets
                    // parented down.
                    return;
                }

                if let Some(client) = self.index.find_closest_client(frame) {
                    if old_client != Some(client) && self.index.is_active(frame) {
                        self.create_gets_client(frame, client);
                    }
                }
            }
            PropKind::WinType | PropKind::Name | PropKind::Role => {
                if let Some(affected) = self.find_affected_window(window) {
                    self.push(Event::Wintype { xid: affected });
                }
            }
            PropKind::Class => {
                if let Some(affected) = self.find_affected_window(window) {
                    self.push(Event::Wintype { xid: affected });
                    self.push(Event::WinClass { xid: affected });
                }
            }
            PropKind::Bypass => {
                let affected = match self.find_affected_window(window) {
                    Some(affected) => affected,
                    None => return,
                };

                if !deleted && ops.bypass_state(window) == 1 {
                    if !self.index.bypassed.insert(window) {
                        return;
                    }
                    if self.index.is_mapped(affected) {
                        self.push(Event::Bypass { xid: affected });
                    }
                } else {
                    // Any other value, or a delete, composites again
                    if self.index.bypassed.remove(&window) && self.index.is_mapped(affected) {
                        self.push(Event::Map { xid: affected });
                    }
                }
            }
            PropKind::Tracked => {
                if let Some(affected) = self.find_affected_window(window) {
                    self.push(Event::Wintype { xid: affected });
                }
            }
            _ => (),
        }
    }

    // Bootstrap: synthesize events for the state that existed before we
    // started listening, in the order the live stream would have
    // produced them.

    fn begin_sub_window(&mut self, ops: &dyn XOps, xid: XWindow, parent: XWindow) {
        self.index.attach_subtree(parent, xid);
        ops.select_property_input(xid);

        let attribs = match ops.get_attributes(xid) {
            Some(attribs) => attribs,
            None => return, // probably gone already
        };
        if attribs.input_only {
            return;
        }

        self.recurse_window(ops, xid);

        if attribs.viewable {
            self.window_map(xid);
        }

        if ops.has_wm_state(xid) {
            self.index.clients.insert(xid);
        }
    }

    fn recurse_window(&mut self, ops: &dyn XOps, xid: XWindow) {
        for child in ops.query_children(xid) {
            self.begin_sub_window(ops, child, xid);
        }
    }

    fn begin_top_window(&mut self, ops: &dyn XOps, xid: XWindow) {
        if xid == self.i_overlay || xid == self.i_reg {
            return;
        }

        let attribs = match ops.get_attributes(xid) {
            Some(attribs) => attribs,
            None => return,
        };
        if attribs.input_only {
            return;
        }

        self.window_create(
            ops,
            xid,
            attribs.x,
            attribs.y,
            attribs.border,
            attribs.width,
            attribs.height,
        );
        ops.select_property_input(xid);

        self.recurse_window(ops, xid);

        let client = match self.index.find_closest_client(xid) {
            Some(client) => {
                self.create_gets_client(xid, client);
                client
            }
            None => xid,
        };

        if ops.bypass_state(client) == 1 {
            self.index.bypassed.insert(client);
        }

        if attribs.viewable {
            self.window_map(xid);
        }
    }

    /// Walk the existing tree and synthesize Add/Client/Map/Bypass,
    /// then Focus and NewRoot from the current root properties.
    pub fn begin_events(&mut self, ops: &dyn XOps) {
        let root = self.i_root;
        for child in ops.query_children(root) {
            self.begin_top_window(ops, child);
        }

        self.refresh_focus(ops);
        self.refresh_root(ops);
    }
}

#[cfg(test)]
mod tests;
