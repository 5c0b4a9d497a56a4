//! First-pass driving loop.
//!
//! Ready actors run until they block or finish. Once nothing is ready, the
//! oldest completed collective releases its participants back into the queue.
//! Blocked actors with nothing left to release mean the run is deadlocked.

use crate::actor::{ActorState, RankActor, RankTables, Truncation};
use crate::codec::RecordCodec;
use crate::error::{MissingState, ResolveError, StalledCollective};
use crate::resolver::{CollectiveResolver, CommSummary};
use crate::types::{GroupId, Rank};
use serde::Serialize;
use std::collections::VecDeque;

/// Knobs shared by both passes
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub truncation: Option<Truncation>,
    /// `(name, pattern)` bins for statistics, first match wins
    pub bins: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub size: usize,
    pub members: Vec<Rank>,
}

/// Global identity table, in id order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdTable {
    pub communicators: Vec<CommSummary>,
    pub groups: Vec<GroupSummary>,
}

/// Output of the first pass
#[derive(Debug)]
pub struct ResolvedRun {
    /// Indexed by rank
    pub ranks: Vec<RankTables>,
    pub ids: IdTable,
}

impl ResolvedRun {
    pub fn nranks(&self) -> usize {
        self.ranks.len()
    }

    pub fn rank(&self, rank: Rank) -> Option<&RankTables> {
        self.ranks.get(rank as usize)
    }
}

/// Run the first pass over every rank's stream.
///
/// `codecs[i]` must hold rank `i`.
pub fn resolve<C: RecordCodec>(codecs: Vec<C>, options: &ConvertOptions) -> Result<ResolvedRun, ResolveError> {
    for (index, codec) in codecs.iter().enumerate() {
        if codec.rank() as usize != index {
            return Err(ResolveError::RankMismatch {
                index,
                found: codec.rank(),
            });
        }
    }

    let nranks = codecs.len() as u32;
    let mut resolver = CollectiveResolver::new(nranks);
    let mut actors: Vec<RankActor<C>> = codecs
        .into_iter()
        .map(|codec| RankActor::new(codec, resolver.groups(), options.truncation))
        .collect();

    tracing::info!(nranks, "starting first pass");

    let mut ready: VecDeque<usize> = (0..actors.len()).collect();
    let mut blocked = 0usize;

    loop {
        while let Some(idx) = ready.pop_front() {
            match actors[idx].advance(&mut resolver)? {
                ActorState::Ready => ready.push_back(idx),
                ActorState::Blocked(_) => blocked += 1,
                ActorState::Done => {}
            }
        }

        if blocked == 0 {
            break;
        }

        if !resolver.has_progress() {
            let stalled = stalled_collectives(&resolver, &actors);
            tracing::error!(stalled = stalled.len(), blocked, "first pass deadlocked");
            return Err(ResolveError::Deadlock { stalled });
        }

        while let Some(resolution) = resolver.release_next() {
            for (rank, outcome) in resolution.outcomes {
                let idx = rank as usize;
                actors[idx].resume(outcome)?;
                blocked -= 1;
                ready.push_back(idx);
            }
        }
    }

    let ids = IdTable {
        communicators: resolver.communicators().to_vec(),
        groups: resolver
            .groups()
            .iter()
            .map(|g| GroupSummary {
                id: g.global_id,
                size: g.size(),
                members: g.members.clone(),
            })
            .collect(),
    };
    tracing::info!(
        communicators = ids.communicators.len(),
        groups = ids.groups.len(),
        "first pass complete"
    );

    Ok(ResolvedRun {
        ranks: actors.into_iter().map(RankActor::into_tables).collect(),
        ids,
    })
}

fn stalled_collectives<C: RecordCodec>(resolver: &CollectiveResolver, actors: &[RankActor<C>]) -> Vec<StalledCollective> {
    resolver
        .pending()
        .map(|pending| StalledCollective {
            key: pending.key,
            expected: pending.expected,
            arrived: pending.arrived(),
            missing: pending
                .missing()
                .into_iter()
                .map(|rank| {
                    let state = match actors.get(rank as usize).map(RankActor::state) {
                        Some(ActorState::Blocked(key)) => MissingState::Blocked(*key),
                        _ => MissingState::Finished,
                    };
                    (rank, state)
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Call, CallRecord, CollectiveKind, TraceFile, TraceWriter};
    use crate::resolver::PendingKey;
    use crate::types::{COMM_NULL, COMM_WORLD, CommId, Tick};

    fn trace(rank: Rank, calls: &[Call]) -> TraceFile {
        let mut writer = TraceWriter::new(Vec::new(), rank).unwrap();
        for call in calls {
            writer.write(&CallRecord::new(call.clone())).unwrap();
        }
        TraceFile::from_bytes(writer.into_inner().unwrap()).unwrap()
    }

    fn split(color: i32, key: i32, newcomm: i32) -> Call {
        Call::CommSplit {
            comm: COMM_WORLD,
            color,
            key,
            newcomm,
        }
    }

    #[test]
    fn test_nested_collectives_resolve() {
        // Split the world in halves, then dup each half
        let traces: Vec<_> = (0..4)
            .map(|r| {
                trace(
                    r,
                    &[
                        Call::Init,
                        split((r / 2) as i32, 0, 3),
                        Call::CommDup { comm: 3, newcomm: 4 },
                        Call::Barrier { comm: 4 },
                        Call::Finalize,
                    ],
                )
            })
            .collect();
        let run = resolve(traces, &ConvertOptions::default()).unwrap();

        assert_eq!(run.nranks(), 4);
        let ids: Vec<_> = run.ids.communicators.iter().map(|c| c.id).collect();
        assert_eq!(ids, (0..9).map(CommId).collect::<Vec<_>>());

        let half0 = run.rank(0).unwrap().comms.get_at(3, Tick(2)).unwrap();
        let half1 = run.rank(2).unwrap().comms.get_at(3, Tick(2)).unwrap();
        assert_eq!(half0.global_id, CommId(5));
        assert_eq!(half1.global_id, CommId(6));
        let dup0 = run.rank(1).unwrap().comms.get_at(4, Tick(4)).unwrap();
        assert_eq!(dup0.group.members, vec![0, 1]);
        assert_eq!(dup0.parent_id(), Some(CommId(5)));
    }

    #[test]
    fn test_missing_contribution_deadlocks() {
        let traces = vec![
            trace(0, &[split(0, 0, 3)]),
            trace(1, &[split(0, 1, 3)]),
            trace(2, &[Call::Init, Call::Finalize]),
        ];
        let err = resolve(traces, &ConvertOptions::default()).unwrap_err();
        let ResolveError::Deadlock { stalled } = err else {
            panic!("expected deadlock");
        };
        assert_eq!(stalled.len(), 1);
        assert_eq!(
            stalled[0],
            StalledCollective {
                key: PendingKey {
                    parent: CommId::WORLD,
                    kind: CollectiveKind::Split,
                },
                expected: 3,
                arrived: vec![0, 1],
                missing: vec![(2, MissingState::Finished)],
            }
        );
    }

    #[test]
    fn test_crossed_collectives_deadlock() {
        let traces = vec![
            trace(0, &[split(0, 0, 3)]),
            trace(1, &[Call::CommDup { comm: COMM_WORLD, newcomm: 3 }]),
        ];
        let err = resolve(traces, &ConvertOptions::default()).unwrap_err();
        let ResolveError::Deadlock { stalled } = err else {
            panic!("expected deadlock");
        };
        assert_eq!(stalled.len(), 2);
        // Pending keys are reported in key order: dup before split
        assert_eq!(stalled[0].key.kind, CollectiveKind::Dup);
        assert_eq!(stalled[0].missing, vec![(0, MissingState::Blocked(stalled[1].key))]);
        assert_eq!(stalled[1].missing, vec![(1, MissingState::Blocked(stalled[0].key))]);
    }

    #[test]
    fn test_truncation_can_deadlock() {
        let calls = [Call::Init, Call::Barrier { comm: COMM_WORLD }, split(0, 0, 3)];
        let traces = vec![trace(0, &calls), trace(1, &calls)];
        let half = ConvertOptions {
            truncation: Some(Truncation::Percent(50.0)),
            ..Default::default()
        };
        // Both ranks stop before the split, so nothing is pending
        let run = resolve(traces, &half).unwrap();
        assert_eq!(run.rank(0).unwrap().records, 2);

        // Rank 0 splits early, rank 1 only after the cut
        let barriers = vec![Call::Barrier { comm: COMM_WORLD }; 5];
        let mut early = vec![split(0, 0, 3)];
        early.extend(barriers.iter().cloned());
        let mut late = barriers;
        late.push(split(0, 1, 3));
        let traces = vec![trace(0, &early), trace(1, &late)];
        let err = resolve(traces, &half).unwrap_err();
        let ResolveError::Deadlock { stalled } = err else {
            panic!("expected deadlock");
        };
        assert_eq!(stalled[0].arrived, vec![0]);
        assert_eq!(stalled[0].missing, vec![(1, MissingState::Finished)]);
    }

    #[test]
    fn test_undefined_color_gets_null() {
        let traces = vec![
            trace(0, &[split(0, 0, 3)]),
            trace(1, &[split(crate::types::UNDEFINED, 0, COMM_NULL)]),
        ];
        let run = resolve(traces, &ConvertOptions::default()).unwrap();
        assert_eq!(run.ids.communicators.last().unwrap().members, vec![0]);
        assert!(run.rank(1).unwrap().comms.history(COMM_NULL).is_empty());
    }

    #[test]
    fn test_rank_order_is_checked() {
        let traces = vec![trace(1, &[]), trace(0, &[])];
        assert!(matches!(
            resolve(traces, &ConvertOptions::default()),
            Err(ResolveError::RankMismatch { index: 0, found: 1 })
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || -> Vec<TraceFile> {
            (0..6)
                .map(|r| trace(r, &[split((r % 3) as i32, -(r as i32), 3), Call::CommDup { comm: 3, newcomm: 4 }]))
                .collect()
        };
        let a = resolve(build(), &ConvertOptions::default()).unwrap();
        let b = resolve(build(), &ConvertOptions::default()).unwrap();
        assert_eq!(a.ids, b.ids);
    }
}
