use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug)]
struct Item {
    coords: Vec<i64>,
    id: u32,
}

impl Entry for Item {
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        self.coords.value_at_dimension(dimension)
    }
}

fn validate_tree<E>(t: &RangeTree<E>) {
    fn walk<E>(list: &NodeList<E>, dimension: usize, dimensions: usize, leaves: &mut usize) {
        let mut prev: Option<i64> = None;
        for node in list.iter() {
            if let Some(prev) = prev {
                assert!(
                    prev < node.value(),
                    "values must be strictly increasing (dimension={dimension})"
                );
            }
            prev = Some(node.value());

            if dimension == dimensions {
                assert!(
                    node.is_last_dimension(),
                    "last dimension node must hold an entry"
                );
                *leaves += 1;
                continue;
            }

            let children = node
                .children()
                .expect("node above the last dimension must hold children");
            assert!(!children.is_empty(), "children list must not be empty");
            walk(children, dimension + 1, dimensions, leaves);
        }
    }

    let mut leaves = 0usize;
    walk(&t.top, 1, t.dimensions, &mut leaves);
    assert_eq!(leaves, t.count, "reachable leaf count must match RangeTree::len");
}

fn ids<'a>(entries: impl IntoIterator<Item = &'a Arc<Item>>) -> Vec<u32> {
    entries.into_iter().map(|e| e.id).collect()
}

#[derive(Clone, Debug)]
enum Op {
    Add(Vec<Vec<i64>>),
    Delete(Vec<Vec<i64>>),
    Shift(usize, i64, i64),
    Query(Vec<(i64, i64)>),
}

fn point_strategy(dimensions: usize) -> impl Strategy<Value = Vec<i64>> + Clone {
    // A narrow coordinate range keeps collisions and shared prefixes frequent.
    prop::collection::vec(-4i64..4, dimensions)
}

fn ops_strategy(dimensions: usize) -> impl Strategy<Value = Vec<Op>> {
    let point = point_strategy(dimensions);
    let op = prop_oneof![
        40 => prop::collection::vec(point.clone(), 0..8).prop_map(Op::Add),
        25 => prop::collection::vec(point, 0..4).prop_map(Op::Delete),
        10 => (0..=dimensions + 1, -5i64..5, -3i64..=3)
            .prop_map(|(dimension, index, delta)| Op::Shift(dimension, index, delta)),
        25 => prop::collection::vec((-5i64..5, -5i64..5), dimensions).prop_map(Op::Query),
    ];
    prop::collection::vec(op, 0..=200)
}

fn tree_and_ops() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=3).prop_flat_map(|dimensions| (Just(dimensions), ops_strategy(dimensions)))
}

/// Applies a shift to the reference model. Returns `(moved, removed)` ids.
fn shift_model(
    model: &mut BTreeMap<Vec<i64>, u32>,
    dimensions: usize,
    dimension: usize,
    index: i64,
    delta: i64,
) -> (Vec<u32>, Vec<u32>) {
    let mut moved = Vec::new();
    let mut removed = Vec::new();
    if dimension == 0 || dimension > dimensions || delta == 0 {
        return (moved, removed);
    }

    let mut next = BTreeMap::new();
    for (key, &id) in model.iter() {
        let value = key[dimension - 1];
        if value < index {
            next.insert(key.clone(), id);
            continue;
        }
        match value.checked_add(delta).filter(|v| *v >= index) {
            Some(value) => {
                let mut key = key.clone();
                key[dimension - 1] = value;
                next.insert(key, id);
                moved.push(id);
            }
            None => removed.push(id),
        }
    }
    *model = next;
    (moved, removed)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence((dimensions, ops) in tree_and_ops()) {
        let mut t: RangeTree<Item> = RangeTree::new(dimensions).unwrap();
        let mut m: BTreeMap<Vec<i64>, u32> = BTreeMap::new();
        let mut next_id = 0u32;
        // Every tree ever produced, with the ids it held when it was produced.
        let mut history: Vec<(RangeTree<Item>, Vec<u32>)> = Vec::new();

        for op in ops {
            match op {
                Op::Add(points) => {
                    let mut batch = Vec::with_capacity(points.len());
                    for coords in points {
                        m.insert(coords.clone(), next_id);
                        batch.push(Item { coords, id: next_id });
                        next_id += 1;
                    }
                    t = t.add(batch);
                }
                Op::Delete(points) => {
                    for coords in &points {
                        m.remove(coords);
                    }
                    t = t.delete(points.iter());
                }
                Op::Shift(dimension, index, delta) => {
                    let (mut moved_m, mut removed_m) =
                        shift_model(&mut m, dimensions, dimension, index, delta);
                    let shift = t.insert_at_dimension(dimension, index, delta);

                    let mut moved_t = ids(&shift.moved);
                    let mut removed_t = ids(&shift.removed);
                    moved_t.sort_unstable();
                    removed_t.sort_unstable();
                    moved_m.sort_unstable();
                    removed_m.sort_unstable();
                    prop_assert_eq!(&moved_t, &moved_m);
                    prop_assert_eq!(&removed_t, &removed_m);
                    prop_assert!(moved_t.iter().all(|id| !removed_t.contains(id)));
                    prop_assert_eq!(t.len() - shift.tree.len(), removed_t.len());
                    t = shift.tree;
                }
                Op::Query(bounds) => {
                    let interval: Vec<RangeInclusive<i64>> =
                        bounds.iter().map(|&(low, high)| low..=high).collect();
                    let got = ids(&t.query(&interval));
                    let expected: Vec<u32> = m
                        .iter()
                        .filter(|(key, _)| {
                            key.iter()
                                .zip(&bounds)
                                .all(|(v, &(low, high))| low <= *v && *v <= high)
                        })
                        .map(|(_, &id)| id)
                        .collect();
                    prop_assert_eq!(got, expected);
                }
            }

            prop_assert_eq!(t.len(), m.len());
            history.push((t.clone(), m.values().copied().collect()));
        }

        validate_tree(&t);
        for (tree, expected) in &history {
            validate_tree(tree);
            prop_assert_eq!(tree.len(), expected.len());
            prop_assert_eq!(&ids(tree.iter()), expected);
        }
    }

    #[test]
    fn prop_add_delete_inverse(
        points in prop::collection::btree_set(point_strategy(2), 0..30),
        extra in point_strategy(2),
    ) {
        prop_assume!(!points.contains(&extra));
        let base: RangeTree<Vec<i64>> = RangeTree::new(2).unwrap().add(points.iter().cloned());
        let round_trip = base.add([extra.clone()]).delete([&extra]);
        prop_assert_eq!(round_trip.len(), base.len());
        let everything = vec![i64::MIN..=i64::MAX; 2];
        let got: Vec<Vec<i64>> = round_trip.query(&everything).iter().map(|e| (**e).clone()).collect();
        let expected: Vec<Vec<i64>> = points.into_iter().collect();
        prop_assert_eq!(got, expected);
        validate_tree(&round_trip);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_set() -> Vec<[i64; 2]> {
    vec![[1, 1], [1, 2], [2, 1], [2, 2], [3, 1], [1, 3]]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let mut expected = small_set();
    expected.sort_unstable();

    for_each_permutation(&small_set(), |perm| {
        // One entry per call, then all at once.
        let mut t: RangeTree<[i64; 2]> = RangeTree::new(2).unwrap();
        for p in &perm {
            t = t.add([*p]);
        }
        let batched = RangeTree::new(2).unwrap().add(perm);

        for tree in [&t, &batched] {
            validate_tree(tree);
            let got: Vec<[i64; 2]> = tree.iter().map(|e| **e).collect();
            assert_eq!(got, expected);
        }
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let base: RangeTree<[i64; 2]> = RangeTree::new(2).unwrap().add(small_set());
    validate_tree(&base);

    for_each_permutation(&small_set(), |perm| {
        let mut t = base.clone();
        let mut remaining = small_set().len();
        for p in &perm {
            t = t.delete([p]);
            remaining -= 1;
            assert_eq!(t.len(), remaining);
            validate_tree(&t);
        }
        assert!(t.is_empty());
        assert!(t.top.is_empty());
        // Every removal left the shared base alone.
        assert_eq!(base.len(), small_set().len());
    });
    validate_tree(&base);
}
