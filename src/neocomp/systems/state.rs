// The per-window state machine
//
// Intents flow in from ingestion, the focus system marks transitions,
// and fades run them to completion. The only irreversible edge is
// Destroying.
use crate::neocomp::windows::{WinList, WindowState, CK};

use swiss::{Query, QueryCursor};

/// Advance the state machine one tick.
///
/// `active` is the entity holding the focus this frame, if any.
pub fn tick(list: &mut WinList, active: Option<swiss::EntityId>) {
    // Entities that finished Destroyed last frame leave the store now,
    // after the render systems have released their caches
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful));
    while let Some(id) = cursor.next(&list.em) {
        if list.state(id) == Some(WindowState::Destroyed) {
            // Payload columns drop lazily; the GPU components were
            // released by their systems or we would trip safe mode
            list.em.remove(id);
        }
    }

    // Transition-complete edges: no fade in flight
    let settled = Query::new().has(CK::Stateful).not(CK::Transitioning);
    let mut cursor = QueryCursor::new(settled);
    while let Some(id) = cursor.next(&list.em) {
        let next = match list.state(id) {
            Some(WindowState::Activating) => Some(WindowState::Active),
            Some(WindowState::Deactivating) => Some(WindowState::Inactive),
            Some(WindowState::Hiding) => Some(WindowState::Invisible),
            Some(WindowState::Destroying) => Some(WindowState::Destroyed),
            _ => None,
        };
        if let Some(next) = next {
            list.set_state(id, next);
        }
    }

    // Map pulls windows back from hiding
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Map));
    while let Some(id) = cursor.next(&list.em) {
        if list.state(id) == Some(WindowState::Invisible) {
            list.set_state(id, WindowState::Waiting);
        }
    }

    // Focus resolution. Some windows are always considered focused,
    // from the wintype table or the focus-exclude rules.
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::FocusChange));
    while let Some(id) = cursor.next(&list.em) {
        let focused = active == Some(id)
            || list.mud.get(id).map(|mud| mud.focused_force).unwrap_or(false);
        let next = match (list.state(id), focused) {
            (Some(WindowState::Waiting), true) => Some(WindowState::Activating),
            (Some(WindowState::Waiting), false) => Some(WindowState::Deactivating),
            (Some(WindowState::Inactive), true) => Some(WindowState::Activating),
            (Some(WindowState::Active), false) => Some(WindowState::Deactivating),
            _ => None,
        };
        if let Some(next) = next {
            list.set_state(id, next);
        }
    }

    // Unmap hides, unless the window is already on its way out
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Unmap));
    while let Some(id) = cursor.next(&list.em) {
        if list.state(id) != Some(WindowState::Destroying) {
            list.set_state(id, WindowState::Hiding);
        }
    }

    // Destroy wins over everything
    let mut cursor = QueryCursor::new(Query::new().has(CK::Stateful).has(CK::Destroy));
    while let Some(id) = cursor.next(&list.em) {
        list.set_state(id, WindowState::Destroying);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neocomp::windows::{Stateful, Transitioning, FocusChange};

    fn window(list: &mut WinList, state: WindowState) -> swiss::EntityId {
        let id = list.em.allocate();
        list.em.add(CK::Stateful, id);
        list.stateful.set(id, Stateful { state });
        id
    }

    fn begin_transition(list: &mut WinList, id: swiss::EntityId) {
        list.em.ensure(CK::Transitioning, id);
        list.transitioning.set(
            id,
            Transitioning {
                time: 0.0,
                duration: 100.0,
            },
        );
    }

    #[test]
    fn destroy_dominates_unmap() {
        let mut list = WinList::new();
        let id = window(&mut list, WindowState::Active);
        list.em.ensure(CK::Unmap, id);
        list.em.ensure(CK::Destroy, id);

        tick(&mut list, None);
        assert_eq!(list.state(id), Some(WindowState::Destroying));
    }

    #[test]
    fn unmap_hides_but_not_while_destroying() {
        let mut list = WinList::new();
        let hiding = window(&mut list, WindowState::Active);
        let doomed = window(&mut list, WindowState::Destroying);
        list.em.ensure(CK::Unmap, hiding);
        list.em.ensure(CK::Unmap, doomed);
        begin_transition(&mut list, doomed);

        tick(&mut list, None);
        assert_eq!(list.state(hiding), Some(WindowState::Hiding));
        assert_eq!(list.state(doomed), Some(WindowState::Destroying));
    }

    #[test]
    fn focus_change_activates_and_deactivates() {
        let mut list = WinList::new();
        let focused = window(&mut list, WindowState::Waiting);
        let blurred = window(&mut list, WindowState::Active);
        for id in [focused, blurred] {
            list.em.ensure(CK::FocusChange, id);
            list.focus_change.set(
                id,
                FocusChange {
                    new_opacity: 100.0,
                    new_dim: 100.0,
                },
            );
        }

        tick(&mut list, Some(focused));
        assert_eq!(list.state(focused), Some(WindowState::Activating));
        assert_eq!(list.state(blurred), Some(WindowState::Deactivating));
    }

    #[test]
    fn transitions_complete_when_the_fade_clears() {
        let mut list = WinList::new();
        let activating = window(&mut list, WindowState::Activating);
        let hiding = window(&mut list, WindowState::Hiding);
        let destroying = window(&mut list, WindowState::Destroying);
        let blocked = window(&mut list, WindowState::Activating);
        begin_transition(&mut list, blocked);

        tick(&mut list, None);
        assert_eq!(list.state(activating), Some(WindowState::Active));
        assert_eq!(list.state(hiding), Some(WindowState::Invisible));
        assert_eq!(list.state(destroying), Some(WindowState::Destroyed));
        assert_eq!(list.state(blocked), Some(WindowState::Activating));
    }

    #[test]
    fn destroyed_entities_are_removed_next_tick() {
        let mut list = WinList::new();
        let id = window(&mut list, WindowState::Destroyed);

        tick(&mut list, None);
        assert!(!list.em.has(CK::Meta, id));
    }

    #[test]
    fn map_returns_invisible_windows_to_waiting() {
        let mut list = WinList::new();
        let id = window(&mut list, WindowState::Invisible);
        list.em.ensure(CK::Map, id);

        tick(&mut list, None);
        assert_eq!(list.state(id), Some(WindowState::Waiting));
    }
}
