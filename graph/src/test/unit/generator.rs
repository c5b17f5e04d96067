//! Lowering scenarios: chunking, node assignment, transfer emission and
//! buffer-state evolution.

use chorus_grid::Subrange;

use crate::command::CommandKind;
use crate::error::Error;
use crate::generator::GraphGenerator;
use crate::ids::{BufferId, CommandId, NodeId};
use crate::task::{AccessMode, MasterBufferAccess, RangeMapper, Task, TaskGraph};
use crate::test::helpers::{box1, count_kind, nodes, region1, sr1, transfer_pairs};

const B: BufferId = BufferId(0);

/// Write mapper producing `[0, extent)` only for the chunk starting at
/// `pin`; other chunks write nothing. Pins a whole-region write to a
/// single chunk (and thereby to a single node).
fn pinned_write(pin: usize, extent: usize) -> RangeMapper {
    RangeMapper::Three {
        mode: AccessMode::Write,
        map: Box::new(move |chunk, _| {
            if chunk.offset[0] == pin {
                sr1(0, extent, extent)
            } else {
                Subrange::new([0, 0, 0], [0, 1, 1], [extent, 1, 1])
            }
        }),
    }
}

fn master_read(lo: usize, hi: usize) -> Task {
    Task::master_access(vec![MasterBufferAccess {
        bid: B,
        mode: AccessMode::Read,
        offset: [lo, 0, 0],
        range: [hi - lo, 1, 1],
    }])
}

#[test]
fn test_single_node_identity() {
    // 1 node, writer then reader: two compute commands, one dependency,
    // zero transfers.
    let mut gen_ = GraphGenerator::new(1);
    gen_.register_buffer(B, [100, 1, 1], false);

    let mut tg = TaskGraph::new();
    let a = tg.add_task(
        Task::compute(1, [100, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    tg.add_task(
        Task::compute(1, [100, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Read)),
        &[a],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(cdag.command_count(), 2);
    assert_eq!(count_kind(cdag, "compute"), 2);
    assert_eq!(count_kind(cdag, "push"), 0);
    assert_eq!(count_kind(cdag, "await_push"), 0);

    let reader = cdag.get(CommandId(1));
    assert_eq!(reader.nid(), NodeId(0));
    assert_eq!(reader.dependencies().len(), 1);
    assert_eq!(reader.dependencies()[0].cid, CommandId(0));
}

#[test]
fn test_producer_consumer_across_two_nodes() {
    // Task A writes on node 1; a master access reads on node 0. The
    // read is satisfied by a push/await-push pair matched by the push's
    // command id.
    let mut gen_ = GraphGenerator::new(2);
    gen_.register_buffer(B, [100, 1, 1], false);

    let mut tg = TaskGraph::new();
    let a = tg.add_task(
        Task::compute(1, [100, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    tg.add_task(master_read(0, 100), &[a]);
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(count_kind(cdag, "compute"), 1);
    assert_eq!(count_kind(cdag, "push"), 1);
    assert_eq!(count_kind(cdag, "await_push"), 1);
    assert_eq!(count_kind(cdag, "master_access"), 1);

    let compute = cdag.get(CommandId(0));
    assert_eq!(compute.nid(), NodeId(1));

    let push = cdag.get(CommandId(1));
    assert_eq!(push.nid(), NodeId(1));
    let CommandKind::Push { target, region_box, .. } = push.kind() else {
        panic!("expected a push");
    };
    assert_eq!(*target, NodeId(0));
    assert_eq!(*region_box, box1(0, 100));
    // The push is anchored to the write that produced the data.
    assert_eq!(push.dependencies()[0].cid, CommandId(0));

    let await_push = cdag.get(CommandId(2));
    assert_eq!(await_push.nid(), NodeId(0));
    let CommandKind::AwaitPush { source_cid, .. } = await_push.kind() else {
        panic!("expected an await_push");
    };
    assert_eq!(*source_cid, CommandId(1));

    let master = cdag.get(CommandId(3));
    assert_eq!(master.nid(), NodeId(0));
    assert_eq!(master.dependencies()[0].cid, CommandId(2));
}

#[test]
fn test_fan_out_read_pushes_only_to_non_holders() {
    // Three chunks produce three bands; three consumer chunks each read
    // the whole buffer, so every consumer pulls the two bands it does
    // not already hold.
    let mut gen_ = GraphGenerator::new(4);
    gen_.register_buffer(B, [90, 1, 1], false);

    let mut tg = TaskGraph::new();
    let a = tg.add_task(
        Task::compute(1, [90, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    tg.add_task(
        Task::compute(1, [90, 1, 1])
            .with_mapper(B, RangeMapper::fixed(AccessMode::Read, sr1(0, 90, 90))),
        &[a],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(count_kind(cdag, "compute"), 6);
    assert_eq!(count_kind(cdag, "push"), 6);
    assert_eq!(count_kind(cdag, "await_push"), 6);

    // Every await-push pairs with exactly one push whose target is the
    // awaiting node, and vice versa.
    let pairs = transfer_pairs(cdag);
    assert_eq!(pairs.len(), count_kind(cdag, "push"));
    for (push_cid, await_cid) in pairs {
        let push = cdag.get(push_cid);
        let await_push = cdag.get(await_cid);
        let CommandKind::Push { target, region_box: push_box, bid: push_bid } = push.kind() else {
            panic!("mismatched pair");
        };
        let CommandKind::AwaitPush { region_box: await_box, bid: await_bid, .. } = await_push.kind()
        else {
            panic!("mismatched pair");
        };
        assert_eq!(*target, await_push.nid());
        assert_eq!(push_box, await_box);
        assert_eq!(push_bid, await_bid);
        assert_ne!(push.nid(), await_push.nid());
    }

    // Reads do not add replicas: each band still lists its writer only.
    let state = gen_.buffer_state(B).unwrap();
    assert_eq!(
        state.get_source_nodes(&region1(0, 90)),
        vec![
            (box1(0, 30), nodes([1])),
            (box1(30, 60), nodes([2])),
            (box1(60, 90), nodes([3])),
        ]
    );
}

#[test]
fn test_overwrite_invalidates_previous_writer() {
    // A writes [0,50) on node 1, C overwrites it on node 2; a reader on
    // node 0 must be fed by node 2.
    let mut gen_ = GraphGenerator::new(3);
    gen_.register_buffer(B, [50, 1, 1], false);

    let mut tg = TaskGraph::new();
    // Chunks are [0,50) on node 1 and [50,100) on node 2; the write
    // mappers pin the whole-buffer write to one chunk each.
    let a = tg.add_task(
        Task::compute(1, [100, 1, 1]).with_mapper(B, pinned_write(0, 50)),
        &[],
    );
    let c = tg.add_task(
        Task::compute(1, [100, 1, 1]).with_mapper(B, pinned_write(50, 50)),
        &[a],
    );
    tg.add_task(master_read(0, 50), &[c]);
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(count_kind(cdag, "push"), 1);

    let push = cdag
        .all_commands()
        .find(|cmd| matches!(cmd.kind(), CommandKind::Push { .. }))
        .unwrap();
    assert_eq!(push.nid(), NodeId(2));
    // Anchored to C's compute on node 2, not A's.
    assert_eq!(push.dependencies()[0].cid, CommandId(3));

    let state = gen_.buffer_state(B).unwrap();
    assert_eq!(state.get_source_nodes(&region1(0, 50)), vec![(box1(0, 50), nodes([2]))]);
}

#[test]
fn test_mixed_modes_on_host_initialized_buffer() {
    // One chunk reads and writes the same region; the read resolves
    // locally (host-initialised), the write claims exclusive validity.
    let mut gen_ = GraphGenerator::new(2);
    gen_.register_buffer(B, [10, 1, 1], true);

    let mut tg = TaskGraph::new();
    tg.add_task(
        Task::compute(1, [10, 1, 1])
            .with_mapper(B, RangeMapper::one_to_one(AccessMode::Read))
            .with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(cdag.command_count(), 1);
    assert_eq!(count_kind(cdag, "push"), 0);

    let state = gen_.buffer_state(B).unwrap();
    assert_eq!(state.get_source_nodes(&region1(0, 10)), vec![(box1(0, 10), nodes([1]))]);
}

#[test]
fn test_mixed_modes_with_transfer_before_compute() {
    // The second consumer chunk needs a push before it may run: the
    // compute command depends on its await-push.
    let mut gen_ = GraphGenerator::new(3);
    gen_.register_buffer(B, [10, 1, 1], false);

    let mut tg = TaskGraph::new();
    let a = tg.add_task(
        Task::compute(1, [10, 1, 1]).with_mapper(B, pinned_write(0, 10)),
        &[],
    );
    tg.add_task(
        Task::compute(1, [10, 1, 1])
            .with_mapper(B, RangeMapper::fixed(AccessMode::Read, sr1(0, 10, 10)))
            .with_mapper(B, RangeMapper::fixed(AccessMode::Write, sr1(0, 10, 10))),
        &[a],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(count_kind(cdag, "push"), 1);
    assert_eq!(count_kind(cdag, "await_push"), 1);

    let await_push = cdag
        .all_commands()
        .find(|cmd| matches!(cmd.kind(), CommandKind::AwaitPush { .. }))
        .unwrap();
    let consumer = cdag
        .all_commands()
        .find(|cmd| {
            cmd.nid() == await_push.nid()
                && matches!(cmd.kind(), CommandKind::Compute { .. })
                && cmd.tid() == await_push.tid()
        })
        .unwrap();
    assert!(consumer.dependencies().iter().any(|d| d.cid == await_push.cid()));

    // Both consumer chunks wrote [0,10); the last writer in node order
    // ends up the sole owner.
    let state = gen_.buffer_state(B).unwrap();
    assert_eq!(state.get_source_nodes(&region1(0, 10)), vec![(box1(0, 10), nodes([2]))]);
}

#[test]
fn test_task_without_accesses_emits_compute_only() {
    let mut gen_ = GraphGenerator::new(3);
    let mut tg = TaskGraph::new();
    tg.add_task(Task::compute(1, [30, 1, 1]), &[]);
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    assert_eq!(cdag.command_count(), 2);
    assert_eq!(count_kind(cdag, "compute"), 2);

    // Chunks partition the task's range exactly, on distinct nodes.
    let mut covered = 0;
    let mut nids = Vec::new();
    for cmd in cdag.commands_in_creation_order() {
        let CommandKind::Compute { subrange } = cmd.kind() else { unreachable!() };
        covered += subrange.range[0];
        nids.push(cmd.nid());
    }
    assert_eq!(covered, 30);
    assert_eq!(nids, vec![NodeId(1), NodeId(2)]);
}

#[test]
fn test_two_dimensional_tasks_split_by_rows() {
    let mut gen_ = GraphGenerator::new(3);
    gen_.register_buffer(B, [6, 9, 1], false);

    let mut tg = TaskGraph::new();
    tg.add_task(
        Task::compute(2, [6, 9, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let state = gen_.buffer_state(B).unwrap();
    let cover = state.get_source_nodes(&Subrange::whole([6, 9, 1]).to_region());
    assert_eq!(cover.len(), 2);
    let total: usize = cover.iter().map(|(b, _)| b.area()).sum();
    assert_eq!(total, 54);
}

#[test]
fn test_three_dimensional_split_fails_loudly() {
    let mut gen_ = GraphGenerator::new(2);
    let mut tg = TaskGraph::new();
    tg.add_task(Task::compute(3, [4, 4, 4]), &[]);

    let err = gen_.build_command_graph(&mut tg).unwrap_err();
    assert!(matches!(err, Error::UnsupportedSplit { dimensions: 3 }));
}

#[test]
fn test_unregistered_buffer_is_an_error() {
    let mut gen_ = GraphGenerator::new(2);
    let mut tg = TaskGraph::new();
    tg.add_task(
        Task::compute(1, [10, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );

    let err = gen_.build_command_graph(&mut tg).unwrap_err();
    assert!(matches!(err, Error::UnknownBuffer { bid } if bid == B));
}

#[test]
fn test_graph_invariants_hold_after_lowering() {
    // Built over the fan-out scenario: dependency endpoints share a
    // node, dependencies target lower ids, and the execution fronts are
    // exactly the commands with no dependents.
    let mut gen_ = GraphGenerator::new(4);
    gen_.register_buffer(B, [90, 1, 1], false);

    let mut tg = TaskGraph::new();
    let a = tg.add_task(
        Task::compute(1, [90, 1, 1]).with_mapper(B, RangeMapper::one_to_one(AccessMode::Write)),
        &[],
    );
    tg.add_task(
        Task::compute(1, [90, 1, 1])
            .with_mapper(B, RangeMapper::fixed(AccessMode::Read, sr1(0, 90, 90))),
        &[a],
    );
    gen_.build_command_graph(&mut tg).unwrap();

    let cdag = gen_.command_graph();
    let mut has_dependents: std::collections::HashSet<CommandId> = Default::default();
    for cmd in cdag.all_commands() {
        for dep in cmd.dependencies() {
            assert_eq!(cmd.nid(), cdag.get(dep.cid).nid());
            assert!(dep.cid < cmd.cid(), "dependencies target lower command ids");
            assert!(!dep.is_anti, "the generator never emits anti-dependencies");
            has_dependents.insert(dep.cid);
        }
    }
    for nid in (0..4).map(NodeId) {
        let front: Vec<CommandId> = cdag
            .commands_in_creation_order()
            .iter()
            .filter(|c| c.nid() == nid && !has_dependents.contains(&c.cid()))
            .map(|c| c.cid())
            .collect();
        assert_eq!(cdag.execution_front(nid), front);
    }
}
