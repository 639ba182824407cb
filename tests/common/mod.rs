//! Shared helpers for the clustering integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use mesh_cluster::prelude::*;

pub fn bx(block: u32, lo: [i32; 2], hi: [i32; 2]) -> IndexBox {
    IndexBox::new(
        BlockId(block),
        IntVec::from_slice(&lo),
        IntVec::from_slice(&hi),
    )
}

/// A zero-filled patch covering `bounds`.
pub fn blank_patch(bounds: IndexBox) -> TagPatch {
    TagPatch::filled(bounds, 0)
}

/// Tag every cell of `patch` for which `pred(x, y)` holds.
pub fn tag_where(patch: &mut TagPatch, pred: impl Fn(i32, i32) -> bool) {
    let bounds = *patch.bounds();
    for x in bounds.lo()[0]..=bounds.hi()[0] {
        for y in bounds.lo()[1]..=bounds.hi()[1] {
            if pred(x, y) {
                patch.set_value(&[x, y], 1);
            }
        }
    }
}

/// Single-rank tag level with one patch over `bounds`.
pub fn serial_level(bounds: IndexBox, pred: impl Fn(i32, i32) -> bool) -> TagLevel {
    let mut patch = blank_patch(bounds);
    tag_where(&mut patch, pred);
    let mut level = TagLevel::new(2);
    level.add_patch(patch);
    level
}

pub fn run_serial(
    params: &ClusterParams,
    level: &TagLevel,
    bounds: &[IndexBox],
) -> ClusterOutput {
    BergerRigoutsos::new(params.clone())
        .cluster(Arc::new(NoComm), level, bounds)
        .expect("serial clustering failed")
}

/// Run one rank per thread over an isolated in-process universe. The result
/// vector is indexed by rank.
pub fn run_parallel(
    params: &ClusterParams,
    levels: Vec<TagLevel>,
    bounds: Vec<IndexBox>,
) -> Vec<ClusterOutput> {
    let comms = ThreadComm::universe(levels.len());
    let handles: Vec<_> = comms
        .into_iter()
        .zip(levels)
        .map(|(comm, level)| {
            let params = params.clone();
            let bounds = bounds.clone();
            std::thread::spawn(move || {
                BergerRigoutsos::new(params)
                    .cluster(Arc::new(comm), &level, &bounds)
                    .expect("parallel clustering failed")
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// All accepted boxes across ranks, keyed by id; panics on duplicate ids.
pub fn global_boxes(outputs: &[ClusterOutput]) -> BTreeMap<BoxId, IndexBox> {
    let mut all = BTreeMap::new();
    for out in outputs {
        for (id, b) in out.new_box_level.iter() {
            let prev = all.insert(*id, *b);
            assert!(prev.is_none(), "box id {id:?} owned by two ranks");
        }
    }
    all
}

/// The accepted box extents, ignoring ownership, sorted for comparison.
pub fn box_extents(outputs: &[ClusterOutput]) -> Vec<(i32, i32, i32, i32)> {
    let mut v: Vec<_> = global_boxes(outputs)
        .values()
        .map(|b| (b.lo()[0], b.lo()[1], b.hi()[0], b.hi()[1]))
        .collect();
    v.sort_unstable();
    v
}

pub fn total_tags(levels: &[&TagLevel], bounds: &[IndexBox]) -> i64 {
    levels
        .iter()
        .flat_map(|l| bounds.iter().map(|b| l.count_tags_in(b, 1)))
        .sum()
}

/// The quantified invariants of the clustering output: containment,
/// pairwise disjointness, tag conservation, the efficiency floor, and the
/// max-size ceiling.
pub fn assert_invariants(
    outputs: &[ClusterOutput],
    levels: &[&TagLevel],
    bounds: &[IndexBox],
    params: &ClusterParams,
) {
    let all = global_boxes(outputs);
    let boxes: Vec<IndexBox> = all.values().copied().collect();

    for b in &boxes {
        let enclosing: Vec<_> = bounds.iter().filter(|bb| bb.contains_box(b)).collect();
        assert_eq!(enclosing.len(), 1, "box {b:?} not inside exactly one block");
        for d in 0..2 {
            assert!(
                b.cells(d) <= params.max_box_size[d],
                "box {b:?} exceeds max_box_size"
            );
        }
    }
    for (i, a) in boxes.iter().enumerate() {
        for b in &boxes[i + 1..] {
            assert!(a.intersect(b).is_none(), "boxes {a:?} and {b:?} overlap");
        }
    }

    let covered: i64 = boxes
        .iter()
        .map(|b| levels.iter().map(|l| l.count_tags_in(b, 1)).sum::<i64>())
        .sum();
    assert_eq!(covered, total_tags(levels, bounds), "tags not conserved");

    // With unit min_box the efficiency floor is strict (a 1x1 box is fully
    // efficient anyway). Larger minimum sizes exempt boxes grown to the
    // minimum and boxes too small to cut legally.
    let strict = (0..2).all(|d| params.min_box[d] == 1);
    for b in &boxes {
        let tags: i64 = levels.iter().map(|l| l.count_tags_in(b, 1)).sum();
        let eff = tags as f64 / b.volume() as f64;
        let at_min = (0..2).all(|d| b.cells(d) <= params.min_box[d]);
        let exempt = if strict {
            at_min
        } else {
            (0..2).any(|d| b.cells(d) <= params.min_box[d])
                || (0..2).all(|d| b.cells(d) < 2 * params.min_box[d])
        };
        assert!(
            eff >= params.efficiency_tol || exempt,
            "box {b:?} inefficient: {eff}"
        );
    }
}
