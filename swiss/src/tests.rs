/// Swiss tests
use crate::{EntityStore, Query, Table, META};

const FLAG_A: usize = 1;
const FLAG_B: usize = 2;
const FLAG_C: usize = 3;

fn store() -> EntityStore {
    EntityStore::new(4, 8)
}

#[test]
fn allocate_starts_fresh() {
    let mut em = store();
    let id = em.allocate();

    assert!(em.has(META, id));
    for kind in [FLAG_A, FLAG_B, FLAG_C] {
        assert!(!em.has(kind, id));
    }
}

#[test]
fn allocate_reuses_lowest_free_id() {
    let mut em = store();
    let a = em.allocate();
    let b = em.allocate();
    let c = em.allocate();
    assert_eq!((a, b, c), (0, 1, 2));

    em.remove(b);
    assert_eq!(em.allocate(), 1);
    assert_eq!(em.allocate(), 3);
}

#[test]
fn capacity_grows_when_full() {
    let mut em = EntityStore::new(2, 4);
    for _ in 0..4 {
        em.allocate();
    }
    assert_eq!(em.capacity(), 4);

    let id = em.allocate();
    assert_eq!(id, 4);
    assert_eq!(em.capacity(), 8);
    assert_eq!(em.size(), 5);
}

#[test]
fn remove_clears_all_components() {
    let mut em = store();
    let id = em.allocate();
    em.add(FLAG_A, id);
    em.add(FLAG_B, id);

    em.remove(id);

    // The slot is recycled clean
    let id2 = em.allocate();
    assert_eq!(id2, id);
    assert!(!em.has(FLAG_A, id2));
    assert!(!em.has(FLAG_B, id2));
}

#[test]
fn densification_bounds_holes() {
    let mut em = store();
    // Churn allocate/remove cycles at a stable population of 4
    let mut live: Vec<usize> = (0..4).map(|_| em.allocate()).collect();
    for round in 0..32 {
        let victim = live.remove(round % live.len());
        em.remove(victim);
        live.push(em.allocate());
        assert!(em.count_holes() <= live.len());
    }
}

#[test]
fn query_yields_exactly_the_matching_set() {
    let mut em = EntityStore::new(4, 256);
    let mut expected = Vec::new();
    for i in 0..200 {
        let id = em.allocate();
        if i % 2 == 0 {
            em.add(FLAG_A, id);
        }
        if i % 3 == 0 {
            em.add(FLAG_B, id);
        }
        if i % 2 == 0 && i % 3 != 0 {
            expected.push(id);
        }
    }

    let q = Query::new().has(FLAG_A).not(FLAG_B);
    let got: Vec<usize> = em.iter(&q).collect();
    assert_eq!(got, expected);
}

#[test]
fn query_crosses_bucket_boundaries() {
    let mut em = EntityStore::new(2, 64);
    let mut ids = Vec::new();
    for _ in 0..130 {
        ids.push(em.allocate());
    }
    em.add(FLAG_A, ids[0]);
    em.add(FLAG_A, ids[63]);
    em.add(FLAG_A, ids[64]);
    em.add(FLAG_A, ids[129]);

    let q = Query::new().has(FLAG_A);
    let got: Vec<usize> = em.iter(&q).collect();
    assert_eq!(got, vec![0, 63, 64, 129]);
}

#[test]
fn cursor_sees_later_additions_only() {
    let mut em = EntityStore::new(2, 256);
    let ids: Vec<usize> = (0..200).map(|_| em.allocate()).collect();
    em.add(FLAG_A, ids[10]);
    em.add(FLAG_A, ids[150]);

    let mut cursor = crate::QueryCursor::new(Query::new().has(FLAG_A));
    assert_eq!(cursor.next(&em), Some(10));

    // The cursor is inside bucket 0, whose word was captured. An
    // addition behind the cursor in the same bucket is invisible; one
    // in a later bucket is picked up.
    em.add(FLAG_A, ids[5]);
    em.add(FLAG_A, ids[180]);

    let mut rest = Vec::new();
    while let Some(id) = cursor.next(&em) {
        rest.push(id);
    }
    assert_eq!(rest, vec![150, 180]);
}

#[test]
fn cursor_allows_removal_of_current_id() {
    let mut em = store();
    let a = em.allocate();
    let b = em.allocate();
    em.add(FLAG_A, a);
    em.add(FLAG_A, b);

    let mut cursor = crate::QueryCursor::new(Query::new().has(FLAG_A));
    while let Some(id) = cursor.next(&em) {
        em.remove_component(FLAG_A, id);
    }
    assert_eq!(em.count_where(&Query::new().has(FLAG_A)), 0);
}

#[test]
fn set_where_mirrors_the_query() {
    let mut em = store();
    let a = em.allocate();
    let b = em.allocate();
    let c = em.allocate();
    em.add(FLAG_A, a);
    em.add(FLAG_A, c);
    em.add(FLAG_B, b);

    em.set_where(FLAG_C, &Query::new().has(FLAG_A));
    assert!(em.has(FLAG_C, a));
    assert!(!em.has(FLAG_C, b));
    assert!(em.has(FLAG_C, c));
}

#[test]
fn remove_where_and_ensure_where() {
    let mut em = store();
    let a = em.allocate();
    let b = em.allocate();
    em.add(FLAG_A, a);
    em.add(FLAG_B, a);
    em.add(FLAG_B, b);

    em.remove_where(FLAG_B, &Query::new().has(FLAG_A));
    assert!(!em.has(FLAG_B, a));
    assert!(em.has(FLAG_B, b));

    em.ensure_where(FLAG_C, &Query::new().has(FLAG_B));
    assert!(em.has(FLAG_C, b));
    assert!(!em.has(FLAG_C, a));
}

#[test]
fn count_where_matches_iteration() {
    let mut em = EntityStore::new(4, 128);
    for i in 0..100 {
        let id = em.allocate();
        if i % 5 == 0 {
            em.add(FLAG_A, id);
        }
    }
    let q = Query::new().has(FLAG_A);
    assert_eq!(em.count_where(&q), em.iter(&q).count());
}

#[test]
fn reset_component_drops_every_bit() {
    let mut em = store();
    for _ in 0..6 {
        let id = em.allocate();
        em.add(FLAG_A, id);
    }
    em.reset_component(FLAG_A);
    assert_eq!(em.count_where(&Query::new().has(FLAG_A)), 0);
    assert_eq!(em.size(), 6);
}

#[test]
fn table_set_get_take() {
    let mut table: Table<String> = Table::new();
    table.set(3, "three".to_string());

    assert_eq!(table.get(3).map(|s| s.as_str()), Some("three"));
    assert_eq!(table.get(2), None);
    assert_eq!(table.take(3), Some("three".to_string()));
    assert_eq!(table.get(3), None);
}

#[test]
#[should_panic]
fn double_add_panics() {
    let mut em = store();
    let id = em.allocate();
    em.add(FLAG_A, id);
    em.add(FLAG_A, id);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn safe_mode_catches_leaks() {
    let mut em = store();
    em.disable_auto_remove(FLAG_C);
    let id = em.allocate();
    em.add(FLAG_C, id);
    em.remove(id);
}
