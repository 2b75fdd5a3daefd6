// Position and size
//
// The Physical component is only ever written here, from Map geometry
// and Move/Resize intents.
use crate::neocomp::windows::{MoveIntent, Physical, ResizeIntent, WinList, CK};

use cgmath::Vector2;
use swiss::{EntityId, Query, QueryCursor};

/// Record a configure: intents are added only when the geometry
/// actually changed, and a pending intent is overridden in place.
pub fn move_window(list: &mut WinList, id: EntityId, pos: Vector2<f32>, size: Vector2<f32>) {
    let physical = match list.physical.get(id) {
        Some(physical) => *physical,
        None => return,
    };

    if list.em.has(CK::Move, id) {
        let intent = list.moves.get_mut(id).unwrap();
        intent.new_position = pos;
    } else if physical.position != pos {
        list.em.add(CK::Move, id);
        list.moves.set(id, MoveIntent { new_position: pos });
    }

    if list.em.has(CK::Resize, id) {
        let intent = list.resize.get_mut(id).unwrap();
        intent.new_size = size;
    } else if physical.size != size {
        list.em.add(CK::Resize, id);
        list.resize.set(id, ResizeIntent { new_size: size });
    }
}

pub fn tick(list: &mut WinList) {
    // Mapping applies the geometry the map carried
    let mut cursor = QueryCursor::new(Query::new().has(CK::Map).has(CK::Physical));
    while let Some(id) = cursor.next(&list.em) {
        let map = *list.map.get(id).unwrap();
        let physical = list.physical.get_mut(id).unwrap();
        physical.position = map.position;
        physical.size = map.size;
    }

    let mut cursor = QueryCursor::new(Query::new().has(CK::Move).has(CK::Physical));
    while let Some(id) = cursor.next(&list.em) {
        let intent = *list.moves.get(id).unwrap();
        list.physical.get_mut(id).unwrap().position = intent.new_position;
    }

    let mut cursor = QueryCursor::new(Query::new().has(CK::Resize).has(CK::Physical));
    while let Some(id) = cursor.next(&list.em) {
        let intent = *list.resize.get(id).unwrap();
        list.physical.get_mut(id).unwrap().size = intent.new_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(list: &mut WinList) -> EntityId {
        let id = list.em.allocate();
        list.em.add(CK::Physical, id);
        list.physical.set(
            id,
            Physical {
                position: Vector2::new(0.0, 0.0),
                size: Vector2::new(100.0, 100.0),
            },
        );
        id
    }

    #[test]
    fn move_and_resize_apply_at_tick() {
        let mut list = WinList::new();
        let id = window(&mut list);

        move_window(
            &mut list,
            id,
            Vector2::new(10.0, 20.0),
            Vector2::new(300.0, 400.0),
        );
        // Nothing moves until the physical system runs
        assert_eq!(list.physical.get(id).unwrap().position, Vector2::new(0.0, 0.0));

        tick(&mut list);
        let physical = list.physical.get(id).unwrap();
        assert_eq!(physical.position, Vector2::new(10.0, 20.0));
        assert_eq!(physical.size, Vector2::new(300.0, 400.0));
    }

    #[test]
    fn unchanged_geometry_adds_no_intents() {
        let mut list = WinList::new();
        let id = window(&mut list);

        move_window(
            &mut list,
            id,
            Vector2::new(0.0, 0.0),
            Vector2::new(100.0, 100.0),
        );
        assert!(!list.em.has(CK::Move, id));
        assert!(!list.em.has(CK::Resize, id));
    }

    #[test]
    fn later_configures_override_pending_intents() {
        let mut list = WinList::new();
        let id = window(&mut list);

        move_window(&mut list, id, Vector2::new(10.0, 0.0), Vector2::new(100.0, 100.0));
        move_window(&mut list, id, Vector2::new(50.0, 0.0), Vector2::new(100.0, 100.0));

        tick(&mut list);
        assert_eq!(list.physical.get(id).unwrap().position, Vector2::new(50.0, 0.0));
    }
}
