// Ingestion tests against a fake server
use super::*;

use std::cell::RefCell;

const ROOT: XWindow = 1;
const OVERLAY: XWindow = 2;
const REG: XWindow = 3;

/// A stand-in X server: property state plus call recording.
#[derive(Default)]
struct FakeXOps {
    attributes: RefCell<HashMap<XWindow, WinAttribs>>,
    bypass: RefCell<HashMap<XWindow, i32>>,
    wm_state: RefCell<HashSet<XWindow>>,
    children: RefCell<HashMap<XWindow, Vec<XWindow>>>,
    active_window: RefCell<Option<XWindow>>,
    root_pixmap: RefCell<Option<XPixmap>>,
    subtracted: RefCell<Vec<XDamageHandle>>,
    next_damage: RefCell<XDamageHandle>,
}

impl FakeXOps {
    fn set_attribs(&self, xid: XWindow, attribs: WinAttribs) {
        self.attributes.borrow_mut().insert(xid, attribs);
    }

    fn set_bypass(&self, xid: XWindow, value: i32) {
        self.bypass.borrow_mut().insert(xid, value);
    }
}

impl XOps for FakeXOps {
    fn create_damage(&self, _xid: XWindow) -> XDamageHandle {
        let mut next = self.next_damage.borrow_mut();
        *next += 1;
        *next
    }

    fn destroy_damage(&self, _damage: XDamageHandle) {}

    fn damage_subtract(&self, damage: XDamageHandle) {
        self.subtracted.borrow_mut().push(damage);
    }

    fn select_property_input(&self, _xid: XWindow) {}
    fn select_shape_input(&self, _xid: XWindow) {}

    fn get_attributes(&self, xid: XWindow) -> Option<WinAttribs> {
        self.attributes.borrow().get(&xid).copied()
    }

    fn bypass_state(&self, xid: XWindow) -> i32 {
        *self.bypass.borrow().get(&xid).unwrap_or(&-1)
    }

    fn has_wm_state(&self, xid: XWindow) -> bool {
        self.wm_state.borrow().contains(&xid)
    }

    fn active_window(&self) -> Option<XWindow> {
        *self.active_window.borrow()
    }

    fn root_pixmap(&self) -> Option<XPixmap> {
        *self.root_pixmap.borrow()
    }

    fn query_children(&self, xid: XWindow) -> Vec<XWindow> {
        self.children
            .borrow()
            .get(&xid)
            .cloned()
            .unwrap_or_default()
    }
}

fn ingest() -> (Ingest, FakeXOps) {
    (Ingest::new(ROOT, OVERLAY, REG), FakeXOps::default())
}

fn drain(ingest: &mut Ingest) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = ingest.next_event() {
        events.push(event);
    }
    events
}

fn create_toplevel(ingest: &mut Ingest, ops: &FakeXOps, xid: XWindow) {
    ingest.handle_raw(
        ops,
        RawEvent::Create {
            window: xid,
            parent: ROOT,
            x: 10,
            y: 10,
            width: 640,
            height: 480,
            border: 0,
        },
    );
}

#[test]
fn create_on_root_emits_add() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);

    let events = drain(&mut ingest);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Add { xid, pos, size, mapped, .. } => {
            assert_eq!(*xid, 0x100);
            assert_eq!(*pos, Vector2::new(10.0, 10.0));
            assert_eq!(*size, Vector2::new(640.0, 480.0));
            assert!(!mapped);
        }
        other => panic!("expected Add, got {:?}", other),
    }
}

#[test]
fn create_includes_the_border_in_geometry() {
    let (mut ingest, ops) = ingest();
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x100,
            parent: ROOT,
            x: 10,
            y: 10,
            width: 640,
            height: 480,
            border: 2,
        },
    );

    match &drain(&mut ingest)[0] {
        Event::Add { pos, size, border, .. } => {
            assert_eq!(*pos, Vector2::new(8.0, 8.0));
            assert_eq!(*size, Vector2::new(644.0, 484.0));
            assert_eq!(*border, 2.0);
        }
        other => panic!("expected Add, got {:?}", other),
    }
}

#[test]
fn mapped_set_tracks_map_and_unmap() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);

    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    assert!(ingest.index.is_mapped(0x100));

    ingest.handle_raw(
        &ops,
        RawEvent::Unmap {
            window: 0x100,
            send_event: false,
        },
    );
    assert!(!ingest.index.is_mapped(0x100));

    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    assert!(ingest.index.is_mapped(0x100));

    let events = drain(&mut ingest);
    assert_eq!(
        events[events.len() - 3..],
        [
            Event::Map { xid: 0x100 },
            Event::Unmap { xid: 0x100 },
            Event::Map { xid: 0x100 },
        ]
    );
}

#[test]
fn synthetic_unmaps_are_ignored() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });

    ingest.handle_raw(
        &ops,
        RawEvent::Unmap {
            window: 0x100,
            send_event: true,
        },
    );
    assert!(ingest.index.is_mapped(0x100));

    let events = drain(&mut ingest);
    assert!(!events.contains(&Event::Unmap { xid: 0x100 }));
}

#[test]
fn wm_state_makes_a_frame_gain_its_client() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    // A decoration window between the frame and the client
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x101,
            parent: 0x100,
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            border: 0,
        },
    );
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x102,
            parent: 0x101,
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            border: 0,
        },
    );
    drain(&mut ingest);

    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x102,
            kind: PropKind::WmState,
            deleted: false,
        },
    );

    assert_eq!(
        drain(&mut ingest),
        vec![Event::Client {
            xid: 0x100,
            client_xid: 0x102
        }]
    );
}

#[test]
fn client_follows_reparent_deeper_into_the_frame() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x101,
            parent: 0x100,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            border: 0,
        },
    );
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x102,
            parent: 0x100,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            border: 0,
        },
    );
    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x102,
            kind: PropKind::WmState,
            deleted: false,
        },
    );
    drain(&mut ingest);

    // Move the client below the decoration window
    ingest.handle_raw(
        &ops,
        RawEvent::Reparent {
            window: 0x102,
            parent: 0x101,
        },
    );
    drain(&mut ingest);

    assert_eq!(ingest.index.find_closest_client(0x100), Some(0x102));
}

#[test]
fn damage_on_unmapped_window_subtracts_but_stays_silent() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    drain(&mut ingest);

    ingest.handle_raw(&ops, RawEvent::DamageNotify { drawable: 0x100 });

    assert_eq!(ops.subtracted.borrow().len(), 1);
    assert_eq!(drain(&mut ingest), vec![]);
}

#[test]
fn damage_on_mapped_window_is_reported() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    drain(&mut ingest);

    ingest.handle_raw(&ops, RawEvent::DamageNotify { drawable: 0x100 });

    assert_eq!(ops.subtracted.borrow().len(), 1);
    assert_eq!(drain(&mut ingest), vec![Event::Damage { xid: 0x100 }]);
}

#[test]
fn bypass_property_swaps_map_for_bypass() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    drain(&mut ingest);

    ops.set_bypass(0x100, 1);
    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x100,
            kind: PropKind::Bypass,
            deleted: false,
        },
    );
    assert_eq!(drain(&mut ingest), vec![Event::Bypass { xid: 0x100 }]);

    // A remap while bypassed keeps bypassing
    ingest.handle_raw(
        &ops,
        RawEvent::Unmap {
            window: 0x100,
            send_event: false,
        },
    );
    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    assert_eq!(
        drain(&mut ingest),
        vec![Event::Unmap { xid: 0x100 }, Event::Bypass { xid: 0x100 }]
    );

    // Any other value composites again
    ops.set_bypass(0x100, 0);
    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x100,
            kind: PropKind::Bypass,
            deleted: false,
        },
    );
    assert_eq!(drain(&mut ingest), vec![Event::Map { xid: 0x100 }]);
}

#[test]
fn configure_emits_mandr_then_restack() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    drain(&mut ingest);

    ingest.handle_raw(
        &ops,
        RawEvent::Configure {
            window: 0x100,
            x: 50,
            y: 60,
            width: 320,
            height: 240,
            border: 0,
            above: 0x99,
            override_redirect: false,
        },
    );

    let events = drain(&mut ingest);
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::Mandr { xid, pos, size, .. } => {
            assert_eq!(*xid, 0x100);
            assert_eq!(*pos, Vector2::new(50.0, 60.0));
            assert_eq!(*size, Vector2::new(320.0, 240.0));
        }
        other => panic!("expected Mandr, got {:?}", other),
    }
    assert_eq!(
        events[1],
        Event::Restack {
            xid: 0x100,
            loc: RestackLocation::Below(0x99)
        }
    );
}

#[test]
fn configure_on_the_root_changes_the_canvas() {
    let (mut ingest, ops) = ingest();
    ingest.handle_raw(
        &ops,
        RawEvent::Configure {
            window: ROOT,
            x: 0,
            y: 0,
            width: 2560,
            height: 1440,
            border: 0,
            above: 0,
            override_redirect: false,
        },
    );
    assert_eq!(
        drain(&mut ingest),
        vec![Event::CanvasChange {
            size: Vector2::new(2560.0, 1440.0)
        }]
    );
}

#[test]
fn circulate_emits_extreme_restacks() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    drain(&mut ingest);

    ingest.handle_raw(
        &ops,
        RawEvent::Circulate {
            window: 0x100,
            place_on_top: true,
        },
    );
    ingest.handle_raw(
        &ops,
        RawEvent::Circulate {
            window: 0x100,
            place_on_top: false,
        },
    );
    assert_eq!(
        drain(&mut ingest),
        vec![
            Event::Restack {
                xid: 0x100,
                loc: RestackLocation::Highest
            },
            Event::Restack {
                xid: 0x100,
                loc: RestackLocation::Lowest
            },
        ]
    );
}

#[test]
fn shape_events_only_fire_for_active_windows() {
    let (mut ingest, ops) = ingest();
    ingest.handle_raw(&ops, RawEvent::ShapeNotify { window: 0x500 });
    assert_eq!(drain(&mut ingest), vec![]);

    create_toplevel(&mut ingest, &ops, 0x100);
    drain(&mut ingest);
    ingest.handle_raw(&ops, RawEvent::ShapeNotify { window: 0x100 });
    assert_eq!(drain(&mut ingest), vec![Event::Shape { xid: 0x100 }]);
}

#[test]
fn bootstrap_synthesizes_the_existing_tree() {
    let (mut ingest, ops) = ingest();

    // One mapped top-level with a client child, one unmapped one
    ops.children.borrow_mut().insert(ROOT, vec![0x100, 0x200]);
    ops.children.borrow_mut().insert(0x100, vec![0x101]);
    ops.set_attribs(
        0x100,
        WinAttribs {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
            viewable: true,
            ..Default::default()
        },
    );
    ops.set_attribs(
        0x101,
        WinAttribs {
            width: 800,
            height: 600,
            viewable: true,
            ..Default::default()
        },
    );
    ops.set_attribs(
        0x200,
        WinAttribs {
            width: 100,
            height: 100,
            viewable: false,
            ..Default::default()
        },
    );
    ops.wm_state.borrow_mut().insert(0x101);
    *ops.active_window.borrow_mut() = Some(0x100);
    *ops.root_pixmap.borrow_mut() = Some(0x700);

    ingest.begin_events(&ops);

    let events = drain(&mut ingest);
    assert_eq!(
        events,
        vec![
            Event::Add {
                xid: 0x100,
                pos: Vector2::new(0.0, 0.0),
                size: Vector2::new(800.0, 600.0),
                border: 0.0,
                mapped: false,
                override_redirect: false,
            },
            Event::Client {
                xid: 0x100,
                client_xid: 0x101
            },
            Event::Map { xid: 0x100 },
            Event::Add {
                xid: 0x200,
                pos: Vector2::new(0.0, 0.0),
                size: Vector2::new(100.0, 100.0),
                border: 0.0,
                mapped: false,
                override_redirect: false,
            },
            Event::Focus { xid: 0x100 },
            Event::NewRoot { pixmap: 0x700 },
        ]
    );
}

#[test]
fn overlay_and_reg_windows_are_invisible_to_the_stream() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, OVERLAY);
    create_toplevel(&mut ingest, &ops, REG);
    assert_eq!(drain(&mut ingest), vec![]);
}

#[test]
fn destroying_a_bypassed_client_remaps_the_frame() {
    let (mut ingest, ops) = ingest();
    create_toplevel(&mut ingest, &ops, 0x100);
    ingest.handle_raw(
        &ops,
        RawEvent::Create {
            window: 0x101,
            parent: 0x100,
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            border: 0,
        },
    );
    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x101,
            kind: PropKind::WmState,
            deleted: false,
        },
    );
    ingest.handle_raw(&ops, RawEvent::Map { window: 0x100 });
    drain(&mut ingest);

    // The client asks to bypass, then goes away
    ops.set_bypass(0x101, 1);
    ingest.handle_raw(
        &ops,
        RawEvent::Property {
            window: 0x101,
            kind: PropKind::Bypass,
            deleted: false,
        },
    );
    assert_eq!(drain(&mut ingest), vec![Event::Bypass { xid: 0x100 }]);

    ingest.handle_raw(&ops, RawEvent::Destroy { window: 0x101 });
    assert_eq!(drain(&mut ingest), vec![Event::Map { xid: 0x100 }]);
}
