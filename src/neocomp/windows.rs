// The component registry
//
// One entity per top-level window. The swiss store tracks presence; the
// typed tables here hold the payloads, one column per component kind.
use crate::neocomp::fade::Fade;
use crate::neocomp::glx::WindowDrawable;
use crate::neocomp::wintypes::WinType;

use cgmath::{Vector2, Vector3};
use lumen::face::Face;
use lumen::renderbuffer::RenderBuffer;
use lumen::texture::Texture;
use swiss::{EntityId, EntityStore, Query, Table};
use utils::region::Rect;

/// Every component kind in the system, in declaration order. The
/// numeric value is the kind index in the swiss store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum CK {
    /// Presence implies the entity exists
    Meta = 0,
    /// The heavyweight per-window record
    Mud,
    /// The X window this entity mirrors
    TracksWindow,
    /// The client window distinct from the frame
    HasClient,
    /// Position and size in screen coordinates
    Physical,
    /// Rendered depth, derived from the order vector
    Z,
    // One-shot intents from event ingestion
    Map,
    Unmap,
    Destroy,
    Move,
    Resize,
    /// The window has a GL texture mirroring its pixmap
    Textured,
    BindsTexture,
    Shadow,
    Blur,
    Shaped,
    // Animated values, present only while not at the opaque default
    Opacity,
    BgOpacity,
    Dim,
    FadesOpacity,
    FadesBgOpacity,
    FadesDim,
    /// Transient target values produced when focus changes
    FocusChange,
    /// Present while any fade is mid-flight
    Transitioning,
    Stateful,
    // Per-frame damage flags
    BlurDamaged,
    ShadowDamaged,
    ContentsDamaged,
    ShapeDamaged,
    FocusChanged,
    WintypeChanged,
    // Feature flags
    Tint,
    Redirected,
    Bypass,
    Debugged,
}

pub const NUM_COMPONENT_KINDS: usize = CK::Debugged as usize + 1;

impl From<CK> for usize {
    fn from(kind: CK) -> usize {
        kind as usize
    }
}

pub const STATE_NAMES: [&str; 9] = [
    "Hiding",
    "Invisible",
    "Waiting",
    "Activating",
    "Active",
    "Deactivating",
    "Inactive",
    "Destroying",
    "Destroyed",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WindowState {
    Hiding,
    Invisible,
    /// Waiting for focus assignment
    Waiting,
    Activating,
    Active,
    Deactivating,
    Inactive,
    Destroying,
    Destroyed,
}

impl WindowState {
    pub fn name(&self) -> &'static str {
        STATE_NAMES[*self as usize]
    }
}

/// The large per-window record carrying fields that have not been
/// decomposed into fine-grained components.
#[derive(Debug)]
pub struct Mud {
    pub xid: u32,
    pub window_type: WinType,
    pub border_width: f32,
    /// Geometry last reported by X, applied to Physical on map
    pub position: Vector2<f32>,
    pub size: Vector2<f32>,
    pub override_redirect: bool,

    pub name: Option<String>,
    pub class_instance: Option<String>,
    pub class_general: Option<String>,
    pub role: Option<String>,
    pub leader: u32,

    /// Whether it looks like a WM window: no descendant with WM_STATE
    /// and not override-redirected itself
    pub wmwin: bool,
    pub fullscreen: bool,
    pub solid: bool,
    /// Always considered focused, from the wintype table or the
    /// focus-exclude rules
    pub focused_force: bool,

    /// The _COMPTON_SHADOW override plus shadow-exclude result
    pub shadow: bool,
    pub invert_color: bool,
    pub blur_background: bool,
    pub fade: bool,
}

impl Mud {
    pub fn new(xid: u32) -> Mud {
        Mud {
            xid,
            window_type: WinType::Unknown,
            border_width: 0.0,
            position: Vector2::new(0.0, 0.0),
            size: Vector2::new(0.0, 0.0),
            override_redirect: false,
            name: None,
            class_instance: None,
            class_general: None,
            role: None,
            leader: 0,
            wmwin: false,
            fullscreen: false,
            solid: false,
            focused_force: false,
            shadow: true,
            invert_color: false,
            blur_background: true,
            fade: true,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TracksWindow {
    pub xid: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct HasClient {
    pub xid: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct Physical {
    pub position: Vector2<f32>,
    pub size: Vector2<f32>,
}

#[derive(Copy, Clone, Debug)]
pub struct MapIntent {
    pub position: Vector2<f32>,
    pub size: Vector2<f32>,
}

#[derive(Copy, Clone, Debug)]
pub struct MoveIntent {
    pub new_position: Vector2<f32>,
}

#[derive(Copy, Clone, Debug)]
pub struct ResizeIntent {
    pub new_size: Vector2<f32>,
}

/// The offscreen copy of the window contents plus its stencil.
pub struct Textured {
    pub texture: Texture,
    pub stencil: RenderBuffer,
}

/// The GLX-pixmap-backed live window texture.
pub struct BindsTexture {
    pub drawable: WindowDrawable,
}

pub struct ShadowCache {
    pub texture: Texture,
    pub effect: Texture,
    pub noise: Texture,
    pub stencil: RenderBuffer,
    pub border: Vector2<f32>,
    pub window_size: Vector2<f32>,
}

pub struct BlurCache {
    pub textures: [Texture; 2],
    pub stencil: RenderBuffer,
    pub size: Vector2<f32>,
}

/// Last-known bounding shape: normalized sub-rectangles plus the
/// prebuilt face covering them.
pub struct Shaped {
    pub rects: Vec<Rect<f32>>,
    pub face: Face,
}

#[derive(Copy, Clone, Debug)]
pub struct Scalar {
    pub value: f64,
}

#[derive(Copy, Clone, Debug)]
pub struct Fading {
    pub fade: Fade,
}

#[derive(Copy, Clone, Debug)]
pub struct FocusChange {
    pub new_opacity: f64,
    pub new_dim: f64,
}

#[derive(Copy, Clone, Debug)]
pub struct Transitioning {
    pub time: f64,
    pub duration: f64,
}

#[derive(Copy, Clone, Debug)]
pub struct Stateful {
    pub state: WindowState,
}

#[derive(Copy, Clone, Debug)]
pub struct Tint {
    pub color: Vector3<f32>,
}

/// The store plus one payload column per kind that carries data.
pub struct WinList {
    pub em: EntityStore,

    pub mud: Table<Mud>,
    pub tracks_window: Table<TracksWindow>,
    pub has_client: Table<HasClient>,
    pub physical: Table<Physical>,
    pub z: Table<f32>,
    pub map: Table<MapIntent>,
    pub moves: Table<MoveIntent>,
    pub resize: Table<ResizeIntent>,
    pub textured: Table<Textured>,
    pub binds_texture: Table<BindsTexture>,
    pub shadow: Table<ShadowCache>,
    pub blur: Table<BlurCache>,
    pub shaped: Table<Shaped>,
    pub opacity: Table<Scalar>,
    pub bgopacity: Table<Scalar>,
    pub dim: Table<Scalar>,
    pub fades_opacity: Table<Fading>,
    pub fades_bgopacity: Table<Fading>,
    pub fades_dim: Table<Fading>,
    pub focus_change: Table<FocusChange>,
    pub transitioning: Table<Transitioning>,
    pub stateful: Table<Stateful>,
    pub shape_damaged_rects: Table<Vec<Rect<f32>>>,
    pub tint: Table<Tint>,
}

impl WinList {
    pub fn new() -> WinList {
        let mut em = EntityStore::new(NUM_COMPONENT_KINDS, 64);
        // GPU-backed components must be released by the system that
        // owns them, never implicitly
        em.disable_auto_remove(CK::Textured);
        em.disable_auto_remove(CK::BindsTexture);
        em.disable_auto_remove(CK::Shadow);
        em.disable_auto_remove(CK::Blur);

        WinList {
            em,
            mud: Table::new(),
            tracks_window: Table::new(),
            has_client: Table::new(),
            physical: Table::new(),
            z: Table::new(),
            map: Table::new(),
            moves: Table::new(),
            resize: Table::new(),
            textured: Table::new(),
            binds_texture: Table::new(),
            shadow: Table::new(),
            blur: Table::new(),
            shaped: Table::new(),
            opacity: Table::new(),
            bgopacity: Table::new(),
            dim: Table::new(),
            fades_opacity: Table::new(),
            fades_bgopacity: Table::new(),
            fades_dim: Table::new(),
            focus_change: Table::new(),
            transitioning: Table::new(),
            stateful: Table::new(),
            shape_damaged_rects: Table::new(),
            tint: Table::new(),
        }
    }

    /// Find the entity mirroring an X window id.
    pub fn find(&self, xid: u32) -> Option<EntityId> {
        let query = Query::new().has(CK::TracksWindow);
        self.em
            .iter(&query)
            .find(|id| self.tracks_window.get(*id).map(|t| t.xid) == Some(xid))
    }

    pub fn state(&self, id: EntityId) -> Option<WindowState> {
        if !self.em.has(CK::Stateful, id) {
            return None;
        }
        self.stateful.get(id).map(|s| s.state)
    }

    pub fn set_state(&mut self, id: EntityId, state: WindowState) {
        if let Some(stateful) = self.stateful.get_mut(id) {
            stateful.state = state;
        }
    }
}

/// Whether two windows' rectangles overlap, borders included.
pub fn win_overlap(list: &WinList, a: EntityId, b: EntityId) -> bool {
    let (pa, pb) = match (list.physical.get(a), list.physical.get(b)) {
        (Some(pa), Some(pb)) => (pa, pb),
        _ => return false,
    };

    // Horizontal separation
    if pa.position.x > pb.position.x + pb.size.x || pb.position.x > pa.position.x + pa.size.x {
        return false;
    }
    // Vertical separation
    if pa.position.y > pb.position.y + pb.size.y || pb.position.y > pa.position.y + pa.size.y {
        return false;
    }
    true
}

/// A window is solid when nothing about it needs blending.
pub fn win_is_solid(list: &WinList, id: EntityId) -> bool {
    !list.em.has(CK::Opacity, id) && list.mud.get(id).map(|m| m.solid).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_window(list: &mut WinList, xid: u32, pos: (f32, f32), size: (f32, f32)) -> EntityId {
        let id = list.em.allocate();
        list.em.add(CK::TracksWindow, id);
        list.tracks_window.set(id, TracksWindow { xid });
        list.em.add(CK::Physical, id);
        list.physical.set(
            id,
            Physical {
                position: Vector2::new(pos.0, pos.1),
                size: Vector2::new(size.0, size.1),
            },
        );
        id
    }

    #[test]
    fn find_resolves_xids() {
        let mut list = WinList::new();
        let a = add_window(&mut list, 0x100, (0.0, 0.0), (10.0, 10.0));
        let b = add_window(&mut list, 0x200, (0.0, 0.0), (10.0, 10.0));

        assert_eq!(list.find(0x100), Some(a));
        assert_eq!(list.find(0x200), Some(b));
        assert_eq!(list.find(0x300), None);
    }

    #[test]
    fn overlap_detects_intersection() {
        let mut list = WinList::new();
        let a = add_window(&mut list, 1, (0.0, 0.0), (100.0, 100.0));
        let b = add_window(&mut list, 2, (50.0, 50.0), (100.0, 100.0));
        let c = add_window(&mut list, 3, (500.0, 500.0), (10.0, 10.0));

        assert!(win_overlap(&list, a, b));
        assert!(win_overlap(&list, b, a));
        assert!(!win_overlap(&list, a, c));
    }

    #[test]
    fn touching_edges_count_as_overlap() {
        let mut list = WinList::new();
        let a = add_window(&mut list, 1, (0.0, 0.0), (100.0, 100.0));
        let b = add_window(&mut list, 2, (100.0, 0.0), (100.0, 100.0));

        assert!(win_overlap(&list, a, b));
    }
}
