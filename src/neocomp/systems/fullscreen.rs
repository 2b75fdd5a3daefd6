// Fullscreen detection
use crate::neocomp::windows::{WinList, CK};

use cgmath::Vector2;
use swiss::{Query, QueryCursor};

fn rect_is_fullscreen(root_size: Vector2<f32>, pos: Vector2<f32>, size: Vector2<f32>) -> bool {
    pos.x <= 0.0
        && pos.y <= 0.0
        && pos.x + size.x >= root_size.x
        && pos.y + size.y >= root_size.y
}

pub fn tick(list: &mut WinList, root_size: Vector2<f32>) {
    let mut cursor = QueryCursor::new(Query::new().has(CK::Mud).has(CK::Physical));
    while let Some(id) = cursor.next(&list.em) {
        let physical = *list.physical.get(id).unwrap();
        let mud = list.mud.get_mut(id).unwrap();
        mud.fullscreen = rect_is_fullscreen(root_size, physical.position, physical.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_covering_windows_count() {
        let root = Vector2::new(1920.0, 1080.0);
        assert!(rect_is_fullscreen(
            root,
            Vector2::new(0.0, 0.0),
            Vector2::new(1920.0, 1080.0)
        ));
        assert!(rect_is_fullscreen(
            root,
            Vector2::new(-10.0, -10.0),
            Vector2::new(2000.0, 1100.0)
        ));
        assert!(!rect_is_fullscreen(
            root,
            Vector2::new(0.0, 0.0),
            Vector2::new(1920.0, 1000.0)
        ));
        assert!(!rect_is_fullscreen(
            root,
            Vector2::new(10.0, 0.0),
            Vector2::new(1920.0, 1080.0)
        ));
    }
}
