mod common;

use common::{RankTrace, files, uniform, write_run};
use mpitrace::codec::{Call, CollectiveKind, RecordCodec};
use mpitrace::emitter::{EventEmitter, EventSink, ResolvedCall, Target};
use mpitrace::error::{MissingState, ResolveError, SinkError};
use mpitrace::meta::TraceMeta;
use mpitrace::resolver::PendingKey;
use mpitrace::scheduler::{ConvertOptions, resolve};
use mpitrace::sinks::{AsciiSink, RewriteSink, StatsSink};
use mpitrace::types::{COMM_SELF, COMM_WORLD, ClockTime, CommId, CommKind, GROUP_EMPTY, Rank, Tick};

fn split(color: i32, key: i32, newcomm: i32) -> Call {
    Call::CommSplit {
        comm: COMM_WORLD,
        color,
        key,
        newcomm,
    }
}

/// Collects the communicator each call ran on
#[derive(Default)]
struct CommLog(Vec<(Rank, Tick, &'static str, Option<CommId>)>);

impl EventSink for CommLog {
    fn emit(&mut self, rank: Rank, _: Option<ClockTime>, _: Option<ClockTime>, call: &ResolvedCall<'_>) -> Result<(), SinkError> {
        self.0.push((rank, call.tick, call.record.call.name(), call.communicator()));
        Ok(())
    }
}

#[test]
fn four_rank_split_end_to_end() {
    let ranks = uniform(4, |r| {
        vec![
            Call::Init,
            split((r % 2) as i32, r as i32, 3),
            Call::Barrier { comm: 3 },
            Call::CommFree { comm: 3 },
            Call::Finalize,
        ]
    });
    let run = resolve(files(&ranks), &ConvertOptions::default()).unwrap();

    // Ids 0..=4 are the world and the four self communicators
    let n = 5;
    let created: Vec<_> = run.ids.communicators.iter().filter(|c| c.kind == CommKind::Split).collect();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].id, CommId(n));
    assert_eq!(created[0].members, vec![0, 2]);
    assert_eq!(created[0].color, Some(0));
    assert_eq!(created[1].id, CommId(n + 1));
    assert_eq!(created[1].members, vec![1, 3]);

    for (rank, id, local) in [(0, n, 0), (2, n, 1), (1, n + 1, 0), (3, n + 1, 1)] {
        let comm = run.rank(rank).unwrap().comms.get_at(3, Tick(3)).unwrap();
        assert_eq!(comm.global_id, CommId(id), "rank {rank}");
        assert_eq!(comm.local_rank, local, "rank {rank}");
    }

    let mut log = CommLog::default();
    EventEmitter::new(&run).emit_all(files(&ranks), &mut log).unwrap();
    let barriers: Vec<_> = log
        .0
        .iter()
        .filter(|(_, _, name, _)| *name == "MPI_Barrier")
        .map(|(rank, _, _, comm)| (*rank, comm.unwrap()))
        .collect();
    assert_eq!(
        barriers,
        vec![(0, CommId(n)), (1, CommId(n + 1)), (2, CommId(n)), (3, CommId(n + 1))]
    );
}

#[test]
fn resolution_is_deterministic() {
    let build = || {
        uniform(5, |r| {
            vec![
                split((r % 2) as i32, 4 - r as i32, 3),
                Call::CommDup { comm: 3, newcomm: 4 },
                Call::CommGroup { comm: 4, group: 6 },
                Call::GroupExcl { group: 6, ranks: vec![0], newgroup: 7 },
                Call::CommCreate { comm: 4, group: 7, newcomm: 8 },
            ]
        })
    };
    let first = resolve(files(&build()), &ConvertOptions::default()).unwrap();
    let second = resolve(files(&build()), &ConvertOptions::default()).unwrap();
    assert_eq!(first.ids, second.ids);
    assert_eq!(
        serde_json::to_string(&first.ids).unwrap(),
        serde_json::to_string(&second.ids).unwrap()
    );
}

#[test]
fn missing_rank_deadlocks_with_its_key() {
    let ranks = vec![
        RankTrace::new(0).call(split(0, 0, 3)),
        RankTrace::new(1).call(split(1, 0, 3)),
        RankTrace::new(2).call(Call::Init).call(Call::Finalize),
    ];
    let err = resolve(files(&ranks), &ConvertOptions::default()).unwrap_err();
    let message = err.to_string();
    let ResolveError::Deadlock { stalled } = err else {
        panic!("expected deadlock");
    };
    let key = PendingKey {
        parent: CommId::WORLD,
        kind: CollectiveKind::Split,
    };
    assert_eq!(stalled[0].key, key);
    assert_eq!(stalled[0].missing, vec![(2, MissingState::Finished)]);
    assert!(message.contains("rank 2 finished without joining"), "{message}");
    assert!(message.contains("MPI_Comm_split on comm#0"), "{message}");
}

#[test]
fn blocked_rank_is_named_in_deadlock() {
    let ranks = vec![
        RankTrace::new(0).call(split(0, 0, 3)),
        RankTrace::new(1).call(split(0, 1, 3)),
        RankTrace::new(2).call(Call::CommDup { comm: COMM_WORLD, newcomm: 3 }),
    ];
    let err = resolve(files(&ranks), &ConvertOptions::default()).unwrap_err();
    let ResolveError::Deadlock { stalled } = err else {
        panic!("expected deadlock");
    };
    let split_key = PendingKey {
        parent: CommId::WORLD,
        kind: CollectiveKind::Split,
    };
    let dup_key = PendingKey {
        parent: CommId::WORLD,
        kind: CollectiveKind::Dup,
    };
    let split = stalled.iter().find(|s| s.key == split_key).unwrap();
    assert_eq!(split.missing, vec![(2, MissingState::Blocked(dup_key))]);
}

#[test]
fn reused_handle_maps_to_distinct_ids() {
    let ranks = uniform(2, |r| {
        vec![
            split(0, r as i32, 3),
            Call::Barrier { comm: 3 },
            Call::CommFree { comm: 3 },
            Call::CommDup { comm: COMM_WORLD, newcomm: 3 },
            Call::Barrier { comm: 3 },
        ]
    });
    let run = resolve(files(&ranks), &ConvertOptions::default()).unwrap();
    let history = run.rank(0).unwrap().comms.history(3);
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].payload.global_id, history[1].payload.global_id);

    let mut log = CommLog::default();
    EventEmitter::new(&run).emit_all(files(&ranks), &mut log).unwrap();
    let rank0: Vec<_> = log.0.iter().filter(|e| e.0 == 0 && e.2 == "MPI_Barrier").map(|e| e.3).collect();
    assert_eq!(rank0, vec![Some(CommId(3)), Some(CommId(4))]);
}

#[test]
fn comm_create_excludes_non_members() {
    // Rank 1 is outside the group and records a null communicator
    let ranks = uniform(3, |r| {
        vec![
            Call::CommGroup { comm: COMM_WORLD, group: 5 },
            Call::GroupRangeIncl { group: 5, ranges: vec![[2, 0, -2]], newgroup: 6 },
            Call::CommCreate { comm: COMM_WORLD, group: 6, newcomm: if r == 1 { 0 } else { 7 } },
        ]
    });
    let run = resolve(files(&ranks), &ConvertOptions::default()).unwrap();
    let created = run.ids.communicators.last().unwrap();
    assert_eq!(created.kind, CommKind::Create);
    assert_eq!(created.members, vec![2, 0]);

    let on0 = run.rank(0).unwrap().comms.get_at(7, Tick(3)).unwrap();
    assert_eq!(on0.local_rank, 1);
    assert!(run.rank(1).unwrap().comms.history(7).is_empty());

    // Group 6 is the same global group on every rank
    let g0 = run.rank(0).unwrap().groups.get_at(6, Tick(2)).unwrap().global_id;
    let g1 = run.rank(1).unwrap().groups.get_at(6, Tick(2)).unwrap().global_id;
    assert_eq!(g0, g1);
}

#[test]
fn unmatched_collective_is_fatal() {
    let ranks = vec![
        RankTrace::new(0).calls([
            Call::CommGroup { comm: COMM_WORLD, group: 5 },
            Call::GroupIncl { group: 5, ranks: vec![0], newgroup: 6 },
            Call::CommCreate { comm: COMM_WORLD, group: 6, newcomm: 7 },
        ]),
        RankTrace::new(1).calls([
            Call::CommGroup { comm: COMM_WORLD, group: 5 },
            Call::GroupIncl { group: 5, ranks: vec![1], newgroup: 6 },
            Call::CommCreate { comm: COMM_WORLD, group: 6, newcomm: 7 },
        ]),
    ];
    let err = resolve(files(&ranks), &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, ResolveError::CollectiveMismatch { rank: 1, .. }), "{err}");
}

#[test]
fn file_backed_run_through_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let ranks = uniform(2, |r| {
        vec![
            Call::Init,
            split(0, -(r as i32), 3),
            Call::Send { dest: 1 - r as i32, tag: 0, count: 4, datatype: 12, comm: 3 },
            Call::Allreduce { count: 2, datatype: 7, op: 1, comm: COMM_WORLD },
            Call::Finalize,
        ]
    });
    let meta_path = write_run(dir.path(), &ranks);
    let meta = TraceMeta::load(&meta_path).unwrap();
    let traces = meta.open_traces().unwrap();
    let run = resolve(traces.iter().collect::<Vec<_>>(), &ConvertOptions::default()).unwrap();
    let emitter = EventEmitter::new(&run);

    let bins = vec![("p2p".to_string(), "Send|Recv".to_string())];
    let mut stats = StatsSink::new(&bins).unwrap();
    emitter.emit_all(&traces, &mut stats).unwrap();
    let report = stats.report();
    assert_eq!(report.total_calls, 10);
    assert_eq!(report.bins[0].name, "p2p");
    assert_eq!(report.bins[0].stats.bytes, 2 * 4 * 8);
    assert_eq!(report.total_bytes, 2 * 4 * 8 + 2 * 2 * 4);
    assert!(report.communicators.iter().any(|c| c.id == CommId(3) && c.calls == 2));

    let mut ascii = AsciiSink::new(termcolor::Buffer::no_color()).with_filter("Send");
    emitter.emit_all(&traces, &mut ascii).unwrap();
    let text = String::from_utf8(ascii.into_inner().into_inner()).unwrap();
    // Rank 1 has the lower key, so it is local rank 0 in the new communicator
    assert!(text.contains("[0:3] MPI_Send entering"), "{text}");
    assert!(text.contains("communicator 3 -> comm#3 (rank 1 of 2)"), "{text}");
    assert!(text.contains("communicator 3 -> comm#3 (rank 0 of 2)"), "{text}");

    let out = dir.path().join("global");
    let mut rewrite = RewriteSink::create(&out, "global", &meta).unwrap();
    emitter.emit_all(&traces, &mut rewrite).unwrap();
    let rewritten = TraceMeta::load(rewrite.meta_path()).unwrap().open_traces().unwrap();
    let second = rewritten[1].read_next(rewritten[1].first_position()).unwrap().unwrap().1;
    let (record, _) = rewritten[1].read_next(second).unwrap().unwrap();
    assert_eq!(record.call, split(0, -1, 3));
    assert_eq!(record.thread, Some(0));
}

#[test]
fn rewritten_run_resolves_again() {
    let dir = tempfile::tempdir().unwrap();
    let ranks = uniform(3, |r| {
        vec![
            Call::Init,
            Call::CommGroup { comm: COMM_WORLD, group: 10 },
            Call::GroupIncl { group: 10, ranks: vec![0, 2], newgroup: 11 },
            Call::CommCreate { comm: COMM_WORLD, group: 11, newcomm: if r == 1 { 0 } else { 5 } },
            Call::GroupIncl { group: 10, ranks: vec![r as i32], newgroup: 12 },
            Call::Barrier { comm: COMM_SELF },
            split((r % 2) as i32, 0, 6),
            Call::CommDup { comm: 6, newcomm: 7 },
            Call::GroupFree { group: 12 },
            Call::GroupFree { group: 11 },
            Call::GroupFree { group: 10 },
            Call::CommGroup { comm: COMM_WORLD, group: 10 },
            Call::GroupDifference { group1: 10, group2: 10, newgroup: 13 },
            Call::GroupFree { group: 13 },
            Call::CommFree { comm: 7 },
            Call::Finalize,
        ]
    });
    let meta_path = write_run(dir.path(), &ranks);
    let meta = TraceMeta::load(&meta_path).unwrap();
    let traces = meta.open_traces().unwrap();
    let run = resolve(traces.iter().collect::<Vec<_>>(), &ConvertOptions::default()).unwrap();

    let out = dir.path().join("global");
    let mut rewrite = RewriteSink::create(&out, "global", &meta).unwrap();
    EventEmitter::new(&run).emit_all(&traces, &mut rewrite).unwrap();

    let rewritten = TraceMeta::load(rewrite.meta_path()).unwrap().open_traces().unwrap();
    let again = resolve(rewritten.iter().collect::<Vec<_>>(), &ConvertOptions::default()).unwrap();
    let summary = |run: &mpitrace::scheduler::ResolvedRun| {
        run.ids
            .communicators
            .iter()
            .map(|c| (c.id, c.kind, c.members.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&again), summary(&run));

    let mut log = CommLog::default();
    let emitted = EventEmitter::new(&again).emit_all(&rewritten, &mut log).unwrap();
    assert_eq!(emitted.calls, 3 * 16);

    // Self groups and the empty group keep their predefined identities
    let mut calls = Vec::new();
    let mut pos = rewritten[2].first_position();
    while let Some((record, next)) = rewritten[2].read_next(pos).unwrap() {
        calls.push(record.call);
        pos = next;
    }
    assert_eq!(calls.len(), 16);
    assert_eq!(calls[4], Call::GroupIncl { group: 2, ranks: vec![2], newgroup: 5 });
    assert_eq!(calls[5], Call::Barrier { comm: COMM_SELF });
    assert_eq!(calls[12], Call::GroupDifference { group1: 2, group2: 2, newgroup: GROUP_EMPTY });
    assert_eq!(calls[13], Call::GroupFree { group: GROUP_EMPTY });
}

#[test]
fn emission_covers_every_resolved_call() {
    let ranks = uniform(3, |r| {
        vec![
            Call::TypeVector { count: 2, blocklength: 2, stride: 4, oldtype: 7, newtype: 20 },
            Call::TypeCommit { datatype: 20 },
            split(if r == 1 { mpitrace::types::UNDEFINED } else { 0 }, 0, if r == 1 { 0 } else { 3 }),
            Call::Bcast { root: 0, count: 1, datatype: 20, comm: COMM_WORLD },
            Call::TypeFree { datatype: 20 },
        ]
    });
    let run = resolve(files(&ranks), &ConvertOptions::default()).unwrap();
    let mut log = CommLog::default();
    let summary = EventEmitter::new(&run).emit_all(files(&ranks), &mut log).unwrap();
    assert_eq!(summary.calls, 15);
    let split_on_1 = log.0.iter().find(|e| e.0 == 1 && e.2 == "MPI_Comm_split").unwrap();
    assert_eq!(split_on_1.3, Some(CommId::WORLD));

    let record = mpitrace::codec::CallRecord::new(Call::Bcast { root: 0, count: 3, datatype: 20, comm: COMM_WORLD });
    let resolved = EventEmitter::new(&run).resolve(2, Tick(4), &record).unwrap();
    assert_eq!(resolved.payload_bytes(), Some(3 * 16));
    assert!(matches!(resolved.handles[0].target, Target::Datatype { size: 16, committed: true }));
}
