// Z-order maintenance
//
// The order vector runs bottom-most first. Restacks circulate entries,
// and the Z component is reassigned from vector position every tick so
// the render passes can sort by a plain float.
use crate::neocomp::windows::{WinList, WindowState, CK};
use crate::neocomp::xorg::events::RestackLocation;

use swiss::{EntityId, Query};

/// The spacing between adjacent windows in depth. The root texture
/// draws at 0.99999, just behind the bottom-most window.
const Z_STEP: f32 = 1.0 / 10000.0;

#[derive(Default)]
pub struct Order {
    pub order: Vec<EntityId>,
}

impl Order {
    pub fn new() -> Order {
        Order { order: Vec::new() }
    }

    /// New windows stack on top.
    pub fn add(&mut self, id: EntityId) {
        self.order.push(id);
    }

    pub fn restack(&mut self, id: EntityId, loc: RestackLocation, above: Option<EntityId>) {
        let current = match self.order.iter().position(|entry| *entry == id) {
            Some(current) => current,
            None => return,
        };

        let new_loc = match loc {
            RestackLocation::Below(_) => {
                let above_loc = match above.and_then(|a| {
                    self.order.iter().position(|entry| *entry == a)
                }) {
                    Some(above_loc) => above_loc,
                    None => return,
                };
                // Circulating moves the windows between source and
                // target, so moving backwards lands one past the target
                if above_loc < current {
                    above_loc + 1
                } else {
                    above_loc
                }
            }
            RestackLocation::Highest => self.order.len() - 1,
            RestackLocation::Lowest => 0,
        };

        if current == new_loc {
            return;
        }

        let entry = self.order.remove(current);
        self.order.insert(new_loc, entry);
    }

    /// Drop destroyed entities from the vector and reassign Z: the
    /// bottom-most window sits just in front of the root, each window
    /// above steps nearer.
    pub fn tick(&mut self, list: &mut WinList) {
        for id in list
            .em
            .iter(&Query::new().has(CK::Stateful))
            .collect::<Vec<_>>()
        {
            if list.state(id) == Some(WindowState::Destroyed) {
                self.order.retain(|entry| *entry != id);
            }
        }

        for (i, id) in self.order.iter().enumerate() {
            let z = 1.0 - (i as f32 + 1.0) * Z_STEP;
            if list.em.has(CK::Z, *id) {
                list.z.set(*id, z);
            } else if list.em.has(CK::Meta, *id) {
                list.em.add(CK::Z, *id);
                list.z.set(*id, z);
            }
        }
    }

    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.order.iter().position(|entry| *entry == id)
    }
}

/// Ids matching `query`, sorted back-to-front (farthest first).
pub fn fetch_sorted_windows(list: &WinList, query: &Query) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = list.em.iter(query).collect();
    ids.sort_by(|a, b| {
        let za = list.z.get(*a).copied().unwrap_or(1.0);
        let zb = list.z.get(*b).copied().unwrap_or(1.0);
        zb.partial_cmp(&za).unwrap()
    });
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neocomp::windows::Stateful;

    fn list_with(n: usize) -> (WinList, Vec<EntityId>, Order) {
        let mut list = WinList::new();
        let mut order = Order::new();
        let ids = (0..n)
            .map(|_| {
                let id = list.em.allocate();
                list.em.add(CK::Stateful, id);
                list.stateful.set(
                    id,
                    Stateful {
                        state: WindowState::Waiting,
                    },
                );
                order.add(id);
                id
            })
            .collect();
        (list, ids, order)
    }

    #[test]
    fn restack_to_highest_and_lowest() {
        let (_list, ids, mut order) = list_with(3);

        order.restack(ids[0], RestackLocation::Highest, None);
        assert_eq!(order.order, vec![ids[1], ids[2], ids[0]]);

        order.restack(ids[2], RestackLocation::Lowest, None);
        assert_eq!(order.order, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn restack_below_moves_above_the_reference() {
        let (_list, ids, mut order) = list_with(4);

        // X reports "above" as the sibling the window now sits above
        order.restack(ids[0], RestackLocation::Below(0), Some(ids[2]));
        assert_eq!(order.order, vec![ids[1], ids[2], ids[0], ids[3]]);
    }

    #[test]
    fn destroyed_entities_leave_the_order() {
        let (mut list, ids, mut order) = list_with(3);
        list.set_state(ids[1], WindowState::Destroyed);

        order.tick(&mut list);
        assert_eq!(order.order, vec![ids[0], ids[2]]);
    }

    #[test]
    fn z_descends_from_one_toward_zero() {
        let (mut list, ids, mut order) = list_with(3);
        order.tick(&mut list);

        let z0 = *list.z.get(ids[0]).unwrap();
        let z1 = *list.z.get(ids[1]).unwrap();
        let z2 = *list.z.get(ids[2]).unwrap();

        // Bottom-most is farthest; each step above comes nearer
        assert!(z0 > z1 && z1 > z2);
        assert!((z0 - (1.0 - Z_STEP)).abs() < 1e-6);
        assert!(z0 < 1.0);
    }
}
