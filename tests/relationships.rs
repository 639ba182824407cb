//! Neighbor-relationship computation: tag-to-new edges and the
//! bidirectional reverse exchange.

mod common;

use std::collections::BTreeSet;

use common::*;
use mesh_cluster::prelude::*;

#[test]
fn relationship_mode_none_yields_no_connectors() {
    let bounds = vec![bx(0, [0, 0], [7, 7])];
    let level = serial_level(bounds[0], |x, y| x <= 1 && y <= 1);
    let mut params = ClusterParams::new(2);
    params.efficiency_tol = 0.5;
    params.relationships = RelationshipMode::None;

    let out = run_serial(&params, &level, &bounds);
    assert!(out.tag_to_new.is_none());
    assert!(out.new_to_tag.is_none());
}

#[test]
fn tag_to_new_mode_skips_the_reverse_set() {
    let bounds = vec![bx(0, [0, 0], [7, 7])];
    let level = serial_level(bounds[0], |x, y| x <= 1 && y <= 1);
    let mut params = ClusterParams::new(2);
    params.efficiency_tol = 0.5;
    params.relationships = RelationshipMode::TagToNew;

    let out = run_serial(&params, &level, &bounds);
    assert!(out.tag_to_new.is_some());
    assert!(out.new_to_tag.is_none());
}

#[test]
fn serial_edges_connect_patch_to_every_nearby_box() {
    let bounds = vec![bx(0, [0, 0], [15, 15])];
    let level = serial_level(bounds[0], |x, y| {
        (x <= 3 && y <= 3) || (x >= 12 && y >= 12)
    });
    let params = ClusterParams::new(2);

    let out = run_serial(&params, &level, &bounds);
    let boxes = global_boxes(&[out.clone()]);
    assert_eq!(boxes.len(), 2);
    let forward = out.tag_to_new.as_ref().unwrap();
    let reverse = out.new_to_tag.as_ref().unwrap();

    // The single local patch covers the whole block, so it neighbors both
    // boxes, and both reverse edges come back to it.
    let patch_id = BoxId::new(0, 0);
    let targets: BTreeSet<BoxId> = forward.neighbors(&patch_id).copied().collect();
    assert_eq!(targets, boxes.keys().copied().collect());
    for new_id in boxes.keys() {
        assert!(reverse.contains(new_id, &patch_id));
    }
}

#[test]
fn bidirectional_round_trip_on_four_ranks() {
    let bounds = vec![bx(0, [0, 0], [7, 7])];
    let levels: Vec<TagLevel> = (0..4)
        .map(|r| {
            let slab = bx(0, [2 * r, 0], [2 * r + 1, 7]);
            let mut patch = blank_patch(slab);
            tag_where(&mut patch, |x, y| y <= 3 || x <= 3);
            let mut level = TagLevel::new(2);
            level.add_patch(patch);
            level
        })
        .collect();
    let params = ClusterParams::new(2);
    let outputs = run_parallel(&params, levels.clone(), bounds.clone());
    let boxes = global_boxes(&outputs);

    // Global forward and reverse edge sets.
    let mut forward: BTreeSet<(BoxId, BoxId)> = BTreeSet::new();
    let mut reverse: BTreeSet<(BoxId, BoxId)> = BTreeSet::new();
    for out in &outputs {
        forward.extend(out.tag_to_new.as_ref().unwrap().iter());
        reverse.extend(out.new_to_tag.as_ref().unwrap().iter());
    }

    // Round trip: (t, n) exists iff (n, t) exists.
    let flipped: BTreeSet<(BoxId, BoxId)> = reverse.iter().map(|&(n, t)| (t, n)).collect();
    assert_eq!(forward, flipped);

    // Forward edges match a brute-force proximity check.
    let gcw = params.ghost_cell_width;
    let mut expected: BTreeSet<(BoxId, BoxId)> = BTreeSet::new();
    for (rank, level) in levels.iter().enumerate() {
        for (i, patch) in level.patches().iter().enumerate() {
            for (new_id, b) in &boxes {
                if patch.bounds().grown(gcw).intersect(b).is_some() {
                    expected.insert((BoxId::new(rank, i as u32), *new_id));
                }
            }
        }
    }
    assert_eq!(forward, expected);

    // Reverse edges live on the rank that owns the new box.
    for (rank, out) in outputs.iter().enumerate() {
        for (n, _) in out.new_to_tag.as_ref().unwrap().iter() {
            assert_eq!(n.owner as usize, rank);
        }
    }
}

#[test]
fn edges_stop_outside_the_ghost_width() {
    let bounds = vec![bx(0, [0, 0], [15, 15])];
    // Two patches: one hugging the tagged corner, one far away.
    let mut level = TagLevel::new(2);
    let mut near = blank_patch(bx(0, [0, 0], [3, 3]));
    tag_where(&mut near, |x, y| x <= 1 && y <= 1);
    level.add_patch(near);
    level.add_patch(blank_patch(bx(0, [12, 0], [15, 3])));
    let mut params = ClusterParams::new(2);
    params.efficiency_tol = 0.5;

    let out = run_serial(&params, &level, &bounds);
    let boxes = global_boxes(&[out.clone()]);
    assert_eq!(boxes.len(), 1);
    let forward = out.tag_to_new.as_ref().unwrap();
    let near_id = BoxId::new(0, 0);
    let far_id = BoxId::new(0, 1);
    assert_eq!(forward.neighbors(&near_id).count(), 1);
    assert_eq!(forward.neighbors(&far_id).count(), 0);
}
