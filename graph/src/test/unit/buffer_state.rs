//! Distributed buffer-validity bookkeeping.

use crate::buffer_state::BufferState;
use crate::test::helpers::{box1, nodes, region1};

#[test]
fn test_host_initialized_buffer_is_valid_everywhere() {
    let state = BufferState::new([100, 1, 1], true, 3);
    let cover = state.get_source_nodes(&region1(0, 100));
    assert_eq!(cover, vec![(box1(0, 100), nodes([0, 1, 2]))]);
}

#[test]
fn test_uninitialized_buffer_covers_nothing() {
    let mut state = BufferState::new([100, 1, 1], false, 2);
    state.update_region(&region1(0, 40), &nodes([1]));

    // Only the written prefix is covered.
    let cover = state.get_source_nodes(&region1(0, 40));
    assert_eq!(cover, vec![(box1(0, 40), nodes([1]))]);
}

#[test]
#[should_panic(expected = "never produced")]
fn test_reading_unwritten_region_panics() {
    let mut state = BufferState::new([100, 1, 1], false, 2);
    state.update_region(&region1(0, 40), &nodes([1]));
    state.get_source_nodes(&region1(30, 50));
}

#[test]
fn test_latest_writer_owns_validity() {
    let mut state = BufferState::new([100, 1, 1], true, 3);
    state.update_region(&region1(20, 60), &nodes([2]));

    let cover = state.get_source_nodes(&region1(0, 100));
    assert_eq!(
        cover,
        vec![
            (box1(0, 20), nodes([0, 1, 2])),
            (box1(20, 60), nodes([2])),
            (box1(60, 100), nodes([0, 1, 2])),
        ]
    );
}

#[test]
fn test_overwrite_replaces_previous_writer() {
    let mut state = BufferState::new([50, 1, 1], false, 3);
    state.update_region(&region1(0, 50), &nodes([1]));
    state.update_region(&region1(0, 50), &nodes([2]));

    let cover = state.get_source_nodes(&region1(0, 50));
    assert_eq!(cover, vec![(box1(0, 50), nodes([2]))]);
}

#[test]
fn test_partial_overwrite_splits_fragments() {
    let mut state = BufferState::new([100, 1, 1], false, 3);
    state.update_region(&region1(0, 100), &nodes([1]));
    state.update_region(&region1(25, 75), &nodes([2]));

    let cover = state.get_source_nodes(&region1(0, 100));
    assert_eq!(
        cover,
        vec![
            (box1(0, 25), nodes([1])),
            (box1(25, 75), nodes([2])),
            (box1(75, 100), nodes([1])),
        ]
    );
}

#[test]
fn test_broadcast_keeps_multiple_copies() {
    let mut state = BufferState::new([10, 1, 1], false, 4);
    state.update_region(&region1(0, 10), &nodes([1, 3]));

    let cover = state.get_source_nodes(&region1(0, 10));
    assert_eq!(cover, vec![(box1(0, 10), nodes([1, 3]))]);
}

#[test]
fn test_adjacent_fragments_with_equal_owners_merge() {
    let mut state = BufferState::new([100, 1, 1], false, 2);
    state.update_region(&region1(0, 50), &nodes([1]));
    state.update_region(&region1(50, 100), &nodes([1]));

    let cover = state.get_source_nodes(&region1(0, 100));
    assert_eq!(cover, vec![(box1(0, 100), nodes([1]))]);
}

#[test]
fn test_source_query_is_clipped_to_the_request() {
    let mut state = BufferState::new([100, 1, 1], false, 2);
    state.update_region(&region1(0, 100), &nodes([1]));

    let cover = state.get_source_nodes(&region1(10, 20));
    assert_eq!(cover, vec![(box1(10, 20), nodes([1]))]);
}
