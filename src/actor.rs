//! First-pass replay of one rank.
//!
//! A [`RankActor`] streams its rank's records and applies their effect on the
//! communicator, group and datatype tables. It stops at every collective
//! communicator creation, hands its side of the call to the
//! [`CollectiveResolver`] and stays [`ActorState::Blocked`] until the
//! scheduler delivers the outcome through [`RankActor::resume`].

use crate::codec::{Call, CallRecord, RecordCodec, StreamPosition};
use crate::error::{HandleError, RankFault, ResolveError};
use crate::group::{self, GroupTable};
use crate::registry::HandleRegistry;
use crate::resolver::{CollectiveResolver, Contribution, ContributionData, PendingKey};
use crate::types::{
    COMM_NULL, COMM_SELF, COMM_WORLD, Color, Communicator, Datatype, GROUP_EMPTY, Group, Handle,
    HandleKind, PREDEFINED_TYPES, Rank, Tick, TimeSpan,
};
use std::rc::Rc;

/// Where an actor stands in its stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorState {
    Ready,
    Blocked(PendingKey),
    Done,
}

/// Early stop point applied to every rank
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Truncation {
    /// Absolute byte offset into each trace file
    Offset(u64),
    /// Percentage of each trace file's size
    Percent(f64),
}

impl Truncation {
    pub fn stop_offset(&self, len: u64) -> u64 {
        match *self {
            Truncation::Offset(offset) => offset.min(len),
            Truncation::Percent(p) => {
                let p = p.clamp(0.0, 100.0);
                ((len as f64) * p / 100.0).round() as u64
            }
        }
    }
}

/// Everything the first pass learned about one rank
#[derive(Debug)]
pub struct RankTables {
    pub rank: Rank,
    pub comms: HandleRegistry<Rc<Communicator>>,
    pub groups: HandleRegistry<Rc<Group>>,
    pub types: HandleRegistry<Datatype>,
    /// Records consumed before the rank finished
    pub records: u64,
    pub stop_at: u64,
    /// Earliest entry and latest exit wall time seen
    pub wall_bounds: Option<TimeSpan>,
}

impl RankTables {
    fn new(rank: Rank, groups: &GroupTable, stop_at: u64) -> Self {
        let world = groups.world();
        let own = groups.self_of(rank).unwrap_or_else(|| groups.empty());

        let mut comms = HandleRegistry::new();
        comms.predefine(COMM_WORLD, Rc::new(Communicator::world(world, rank)));
        comms.predefine(COMM_SELF, Rc::new(Communicator::self_comm(own, rank)));

        let mut group_table = HandleRegistry::new();
        group_table.predefine(GROUP_EMPTY, groups.empty());

        let mut types = HandleRegistry::new();
        for &(handle, _, size) in PREDEFINED_TYPES {
            types.predefine(handle, Datatype::predefined(size));
        }

        Self {
            rank,
            comms,
            groups: group_table,
            types,
            records: 0,
            stop_at,
            wall_bounds: None,
        }
    }

    fn observe(&mut self, record: &CallRecord) {
        if let Some(wall) = record.wall {
            self.wall_bounds = Some(match self.wall_bounds {
                None => wall,
                Some(b) => TimeSpan {
                    start: b.start.min(wall.start),
                    stop: b.stop.max(wall.stop),
                },
            });
        }
    }
}

/// A collective the actor is waiting on
#[derive(Debug)]
struct Parked {
    key: PendingKey,
    tick: Tick,
    offset: StreamPosition,
    newcomm: Handle,
}

fn comm_fault(source: HandleError) -> RankFault {
    RankFault::Handle {
        kind: HandleKind::Comm,
        source,
    }
}

fn group_fault(source: HandleError) -> RankFault {
    RankFault::Handle {
        kind: HandleKind::Group,
        source,
    }
}

fn type_fault(source: HandleError) -> RankFault {
    RankFault::Handle {
        kind: HandleKind::Datatype,
        source,
    }
}

fn non_negative(value: i64, what: &str) -> Result<u64, RankFault> {
    u64::try_from(value).map_err(|_| RankFault::InvalidTypeArgs(format!("negative {what}: {value}")))
}

fn sum_lengths(lengths: &[i32]) -> Result<u64, RankFault> {
    lengths.iter().try_fold(0u64, |total, &l| {
        checked_add(total, non_negative(l.into(), "block length")?)
    })
}

/// Product of datatype size factors, rejecting sizes that do not fit in `u64`
fn checked_product(factors: &[u64]) -> Result<u64, RankFault> {
    factors.iter().try_fold(1u64, |acc, &f| {
        acc.checked_mul(f)
            .ok_or_else(|| RankFault::InvalidTypeArgs(format!("datatype size overflows: {acc} * {f}")))
    })
}

fn checked_add(a: u64, b: u64) -> Result<u64, RankFault> {
    a.checked_add(b)
        .ok_or_else(|| RankFault::InvalidTypeArgs(format!("datatype size overflows: {a} + {b}")))
}

pub struct RankActor<C> {
    rank: Rank,
    codec: C,
    position: StreamPosition,
    tick: Tick,
    state: ActorState,
    parked: Option<Parked>,
    main_thread: Option<u16>,
    tables: RankTables,
}

impl<C: RecordCodec> RankActor<C> {
    pub fn new(codec: C, groups: &GroupTable, truncation: Option<Truncation>) -> Self {
        let rank = codec.rank();
        let len = codec.len();
        let stop_at = truncation.map_or(len, |t| t.stop_offset(len));
        let position = codec.first_position();
        Self {
            rank,
            codec,
            position,
            tick: Tick::ORIGIN,
            state: ActorState::Ready,
            parked: None,
            main_thread: None,
            tables: RankTables::new(rank, groups, stop_at),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn state(&self) -> &ActorState {
        &self.state
    }

    pub fn position(&self) -> StreamPosition {
        self.position
    }

    pub fn tables(&self) -> &RankTables {
        &self.tables
    }

    pub fn into_tables(self) -> RankTables {
        self.tables
    }

    fn corrupt(&self, offset: StreamPosition, fault: impl Into<RankFault>) -> ResolveError {
        ResolveError::RankCorrupt {
            rank: self.rank,
            offset,
            fault: fault.into(),
        }
    }

    /// Replay records until the rank blocks on a collective or runs out of stream
    pub fn advance(&mut self, resolver: &mut CollectiveResolver) -> Result<ActorState, ResolveError> {
        if self.state != ActorState::Ready {
            return Ok(self.state.clone());
        }

        loop {
            let offset = self.position;
            if offset >= self.tables.stop_at {
                return Ok(self.finish());
            }
            let next = self
                .codec
                .read_next(offset)
                .map_err(|e| self.corrupt(offset, e))?;
            let Some((record, next)) = next else {
                return Ok(self.finish());
            };

            self.position = next;
            self.tick = self.tick.next();
            self.tables.records += 1;
            self.tables.observe(&record);
            if self.main_thread.is_none() {
                self.main_thread = record.thread;
            }

            let contribution = self
                .apply(&record, resolver.groups_mut())
                .map_err(|fault| self.corrupt(offset, fault))?;

            if let Some((contribution, newcomm)) = contribution {
                let key = contribution.key();
                self.parked = Some(Parked {
                    key,
                    tick: self.tick,
                    offset,
                    newcomm,
                });
                self.state = ActorState::Blocked(key);
                tracing::trace!(rank = self.rank, %key, tick = %self.tick, "blocked");
                resolver.submit(contribution)?;
                return Ok(self.state.clone());
            }
        }
    }

    /// Deliver the outcome of the collective this actor is blocked on
    pub fn resume(&mut self, outcome: Option<Rc<Communicator>>) -> Result<(), ResolveError> {
        let Some(parked) = self.parked.take() else {
            return Ok(());
        };

        match outcome {
            Some(comm) if parked.newcomm != COMM_NULL => {
                self.tables
                    .comms
                    .create(parked.newcomm, comm, parked.tick)
                    .map_err(|e| self.corrupt(parked.offset, comm_fault(e)))?;
            }
            Some(comm) => tracing::warn!(
                rank = self.rank,
                key = %parked.key,
                id = %comm.global_id,
                "rank joined a communicator but recorded MPI_COMM_NULL"
            ),
            None if parked.newcomm != COMM_NULL => tracing::warn!(
                rank = self.rank,
                key = %parked.key,
                handle = parked.newcomm,
                "rank got no communicator but recorded a handle"
            ),
            None => {}
        }

        self.state = ActorState::Ready;
        Ok(())
    }

    fn finish(&mut self) -> ActorState {
        tracing::debug!(rank = self.rank, records = self.tables.records, "rank finished first pass");
        self.state = ActorState::Done;
        ActorState::Done
    }

    fn active_comm(&self, handle: Handle) -> Result<Rc<Communicator>, RankFault> {
        self.tables.comms.get_active(handle).cloned().map_err(comm_fault)
    }

    fn active_group(&self, handle: Handle) -> Result<Rc<Group>, RankFault> {
        self.tables.groups.get_active(handle).cloned().map_err(group_fault)
    }

    fn type_size(&self, handle: Handle) -> Result<u64, RankFault> {
        self.tables
            .types
            .get_active(handle)
            .map(|t| t.size)
            .map_err(type_fault)
    }

    fn register_group(&mut self, handle: Handle, members: Vec<Rank>, groups: &mut GroupTable) -> Result<(), RankFault> {
        if handle == GROUP_EMPTY && members.is_empty() {
            return Ok(());
        }
        let group = groups.intern(members);
        self.tables
            .groups
            .create(handle, group, self.tick)
            .map_err(group_fault)
    }

    fn register_type(&mut self, handle: Handle, size: u64) -> Result<(), RankFault> {
        self.tables
            .types
            .create(handle, Datatype::derived(size), self.tick)
            .map_err(type_fault)
    }

    fn check_thread(&self, record: &CallRecord) -> Result<(), RankFault> {
        match (record.thread, self.main_thread) {
            (Some(thread), Some(main)) if thread != main => {
                Err(RankFault::MultiThreadedCollective { thread, main })
            }
            _ => Ok(()),
        }
    }

    /// Apply one record; collective creations return this rank's contribution
    /// and the handle the new communicator will live under
    fn apply(&mut self, record: &CallRecord, groups: &mut GroupTable) -> Result<Option<(Contribution, Handle)>, RankFault> {
        let tick = self.tick;
        match &record.call {
            Call::CommDup { comm, newcomm } => {
                self.check_thread(record)?;
                let parent = self.active_comm(*comm)?;
                return Ok(Some((
                    Contribution {
                        rank: self.rank,
                        parent,
                        data: ContributionData::Dup,
                    },
                    *newcomm,
                )));
            }
            Call::CommCreate { comm, group, newcomm } => {
                self.check_thread(record)?;
                let parent = self.active_comm(*comm)?;
                let group = self.active_group(*group)?;
                return Ok(Some((
                    Contribution {
                        rank: self.rank,
                        parent,
                        data: ContributionData::Create { group },
                    },
                    *newcomm,
                )));
            }
            Call::CommSplit { comm, color, key, newcomm } => {
                self.check_thread(record)?;
                let parent = self.active_comm(*comm)?;
                return Ok(Some((
                    Contribution {
                        rank: self.rank,
                        parent,
                        data: ContributionData::Split {
                            color: Color(*color),
                            key: *key,
                        },
                    },
                    *newcomm,
                )));
            }
            Call::CommFree { comm } => self.tables.comms.close(*comm, tick).map_err(comm_fault)?,
            Call::CommGroup { comm, group } => {
                let members = self.active_comm(*comm)?.group.members.clone();
                self.register_group(*group, members, groups)?;
            }
            Call::CommSetName { comm, name } => self.active_comm(*comm)?.set_name(name),

            Call::GroupUnion { group1, group2, newgroup } => {
                let (a, b) = (self.active_group(*group1)?, self.active_group(*group2)?);
                self.register_group(*newgroup, group::union(&a.members, &b.members), groups)?;
            }
            Call::GroupIntersection { group1, group2, newgroup } => {
                let (a, b) = (self.active_group(*group1)?, self.active_group(*group2)?);
                self.register_group(*newgroup, group::intersection(&a.members, &b.members), groups)?;
            }
            Call::GroupDifference { group1, group2, newgroup } => {
                let (a, b) = (self.active_group(*group1)?, self.active_group(*group2)?);
                self.register_group(*newgroup, group::difference(&a.members, &b.members), groups)?;
            }
            Call::GroupIncl { group, ranks, newgroup } => {
                let members = group::include(&self.active_group(*group)?.members, ranks)?;
                self.register_group(*newgroup, members, groups)?;
            }
            Call::GroupExcl { group, ranks, newgroup } => {
                let members = group::exclude(&self.active_group(*group)?.members, ranks)?;
                self.register_group(*newgroup, members, groups)?;
            }
            Call::GroupRangeIncl { group, ranges, newgroup } => {
                let members = group::range_include(&self.active_group(*group)?.members, ranges)?;
                self.register_group(*newgroup, members, groups)?;
            }
            Call::GroupRangeExcl { group, ranges, newgroup } => {
                let members = group::range_exclude(&self.active_group(*group)?.members, ranges)?;
                self.register_group(*newgroup, members, groups)?;
            }
            // The predefined empty group survives frees
            Call::GroupFree { group: GROUP_EMPTY } => {}
            Call::GroupFree { group } => self.tables.groups.close(*group, tick).map_err(group_fault)?,

            Call::TypeContiguous { count, oldtype, newtype } => {
                let size = checked_product(&[non_negative((*count).into(), "count")?, self.type_size(*oldtype)?])?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeVector { count, blocklength, oldtype, newtype, .. }
            | Call::TypeHvector { count, blocklength, oldtype, newtype, .. } => {
                let size = checked_product(&[
                    non_negative((*count).into(), "count")?,
                    non_negative((*blocklength).into(), "block length")?,
                    self.type_size(*oldtype)?,
                ])?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeIndexed { blocklengths, oldtype, newtype, .. }
            | Call::TypeHindexed { blocklengths, oldtype, newtype, .. } => {
                let size = checked_product(&[sum_lengths(blocklengths)?, self.type_size(*oldtype)?])?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeStruct { blocklengths, types, newtype, .. } => {
                if blocklengths.len() != types.len() {
                    return Err(RankFault::InvalidTypeArgs(format!(
                        "{} block lengths for {} types",
                        blocklengths.len(),
                        types.len()
                    )));
                }
                let mut size = 0;
                for (&len, &ty) in blocklengths.iter().zip(types) {
                    let block = checked_product(&[non_negative(len.into(), "block length")?, self.type_size(ty)?])?;
                    size = checked_add(size, block)?;
                }
                self.register_type(*newtype, size)?;
            }
            Call::TypeDup { oldtype, newtype } | Call::TypeCreateResized { oldtype, newtype, .. } => {
                let size = self.type_size(*oldtype)?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeCreateIndexedBlock { blocklength, displacements, oldtype, newtype } => {
                let size = checked_product(&[
                    displacements.len() as u64,
                    non_negative((*blocklength).into(), "block length")?,
                    self.type_size(*oldtype)?,
                ])?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeCreateSubarray { subsizes, oldtype, newtype, .. } => {
                let mut factors = subsizes
                    .iter()
                    .map(|&s| non_negative(s.into(), "subsize"))
                    .collect::<Result<Vec<_>, _>>()?;
                factors.push(self.type_size(*oldtype)?);
                let size = checked_product(&factors)?;
                self.register_type(*newtype, size)?;
            }
            Call::TypeCommit { datatype } => self.tables.types.commit(*datatype, tick).map_err(type_fault)?,
            Call::TypeFree { datatype } => self.tables.types.close(*datatype, tick).map_err(type_fault)?,

            Call::Init
            | Call::Finalize
            | Call::Send { .. }
            | Call::Isend { .. }
            | Call::Recv { .. }
            | Call::Irecv { .. }
            | Call::Wait { .. }
            | Call::Waitall { .. }
            | Call::Barrier { .. }
            | Call::Bcast { .. }
            | Call::Reduce { .. }
            | Call::Allreduce { .. }
            | Call::Gather { .. }
            | Call::Allgather { .. }
            | Call::Alltoall { .. }
            | Call::CommRank { .. }
            | Call::CommSize { .. }
            | Call::GroupSize { .. }
            | Call::GroupRank { .. }
            | Call::TypeSize { .. } => {}
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{TraceFile, TraceWriter};
    use crate::error::GroupError;
    use crate::types::{ClockTime, CommId};

    fn trace(rank: Rank, calls: Vec<Call>) -> TraceFile {
        let mut writer = TraceWriter::new(Vec::new(), rank).unwrap();
        for (i, call) in calls.into_iter().enumerate() {
            let t = i as u32;
            let record = CallRecord::new(call).with_wall(ClockTime::new(t, 0), ClockTime::new(t, 500));
            writer.write(&record).unwrap();
        }
        TraceFile::from_bytes(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_local_calls_update_tables() {
        let file = trace(
            0,
            vec![
                Call::Init,
                Call::CommGroup { comm: COMM_WORLD, group: 10 },
                Call::GroupIncl { group: 10, ranks: vec![1, 0], newgroup: 11 },
                Call::TypeContiguous { count: 4, oldtype: 12, newtype: 30 },
                Call::TypeVector { count: 2, blocklength: 3, stride: 8, oldtype: 30, newtype: 31 },
                Call::TypeCommit { datatype: 31 },
                Call::GroupFree { group: 10 },
                Call::Finalize,
            ],
        );
        let mut resolver = CollectiveResolver::new(2);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Done);

        let tables = actor.into_tables();
        assert_eq!(tables.records, 8);
        assert_eq!(tables.groups.get_at(11, Tick(3)).unwrap().members, vec![1, 0]);
        assert!(tables.groups.get_active(10).is_err());
        assert_eq!(tables.groups.get_at(10, Tick(7)).unwrap().members, vec![0, 1]);

        let vector = tables.types.get_active(31).unwrap();
        assert_eq!(vector.size, 2 * 3 * 32);
        assert_eq!(vector.committed, Some(Tick(6)));
        assert_eq!(tables.types.get_active(30).unwrap().committed, None);

        let bounds = tables.wall_bounds.unwrap();
        assert_eq!(bounds.start, ClockTime::new(0, 0));
        assert_eq!(bounds.stop, ClockTime::new(7, 500));
    }

    #[test]
    fn test_blocks_on_collective_and_resumes() {
        let file = trace(
            1,
            vec![
                Call::Barrier { comm: COMM_WORLD },
                Call::CommSplit { comm: COMM_WORLD, color: 0, key: 0, newcomm: 5 },
                Call::Barrier { comm: 5 },
                Call::CommFree { comm: 5 },
            ],
        );
        let mut resolver = CollectiveResolver::new(2);
        let mut actor = RankActor::new(&file, resolver.groups(), None);

        let state = actor.advance(&mut resolver).unwrap();
        let ActorState::Blocked(key) = state else {
            panic!("expected to block");
        };
        assert_eq!(key.parent, CommId::WORLD);
        let parked_at = actor.position();

        // Advancing while blocked does not consume anything
        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Blocked(key));
        assert_eq!(actor.position(), parked_at);

        let world0 = Rc::new(Communicator::world(resolver.groups().world(), 0));
        resolver
            .submit(Contribution {
                rank: 0,
                parent: world0,
                data: ContributionData::Split { color: Color(0), key: 0 },
            })
            .unwrap();
        let resolution = resolver.release_next().unwrap();
        let outcome = resolution.outcomes[1].1.clone();
        actor.resume(outcome).unwrap();

        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Done);
        let tables = actor.into_tables();
        let comm = tables.comms.get_at(5, Tick(3)).unwrap();
        assert_eq!(comm.global_id, CommId(3));
        assert_eq!(comm.local_rank, 1);
        assert_eq!(tables.comms.history(5)[0].freed, Some(Tick(4)));
    }

    #[test]
    fn test_empty_group_stays_predefined() {
        let file = trace(
            0,
            vec![
                Call::CommGroup { comm: COMM_WORLD, group: 8 },
                Call::GroupDifference { group1: 8, group2: 8, newgroup: GROUP_EMPTY },
                Call::GroupFree { group: GROUP_EMPTY },
                Call::GroupFree { group: GROUP_EMPTY },
                Call::GroupSize { group: GROUP_EMPTY, size: 0 },
            ],
        );
        let mut resolver = CollectiveResolver::new(2);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Done);
        let empty = actor.tables().groups.get_active(GROUP_EMPTY).unwrap();
        assert!(Rc::ptr_eq(empty, &resolver.groups().empty()));
    }

    #[test]
    fn test_double_free_is_corrupt() {
        let file = trace(
            0,
            vec![
                Call::CommGroup { comm: COMM_WORLD, group: 8 },
                Call::GroupFree { group: 8 },
                Call::GroupFree { group: 8 },
            ],
        );
        let mut resolver = CollectiveResolver::new(1);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        match actor.advance(&mut resolver) {
            Err(ResolveError::RankCorrupt { rank: 0, offset, fault }) => {
                assert!(offset > crate::codec::HEADER_LEN);
                assert!(matches!(
                    fault,
                    RankFault::Handle {
                        kind: HandleKind::Group,
                        source: HandleError::AlreadyClosed(8)
                    }
                ));
            }
            other => panic!("expected corrupt rank, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_group_rank_is_corrupt() {
        let file = trace(
            0,
            vec![
                Call::CommGroup { comm: COMM_WORLD, group: 8 },
                Call::GroupIncl { group: 8, ranks: vec![5], newgroup: 9 },
            ],
        );
        let mut resolver = CollectiveResolver::new(2);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        let err = actor.advance(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::RankCorrupt {
                fault: RankFault::Group(GroupError::RankOutOfRange { rank: 5, size: 2 }),
                ..
            }
        ));
    }

    #[test]
    fn test_struct_size() {
        let file = trace(
            0,
            vec![
                Call::TypeStruct {
                    blocklengths: vec![2, 1],
                    displacements: vec![0, 8],
                    types: vec![7, 12],
                    newtype: 40,
                },
                Call::TypeCreateSubarray {
                    sizes: vec![10, 10],
                    subsizes: vec![2, 3],
                    starts: vec![0, 0],
                    order: 0,
                    oldtype: 40,
                    newtype: 41,
                },
            ],
        );
        let mut resolver = CollectiveResolver::new(1);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        actor.advance(&mut resolver).unwrap();
        assert_eq!(actor.tables().types.get_active(40).unwrap().size, 16);
        assert_eq!(actor.tables().types.get_active(41).unwrap().size, 96);
    }

    #[test]
    fn test_datatype_size_overflow_is_corrupt() {
        let file = trace(
            0,
            vec![
                Call::TypeVector {
                    count: i32::MAX,
                    blocklength: i32::MAX,
                    stride: 1,
                    oldtype: 12,
                    newtype: 30,
                },
                Call::TypeContiguous { count: i32::MAX, oldtype: 30, newtype: 31 },
            ],
        );
        let mut resolver = CollectiveResolver::new(1);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        let err = actor.advance(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::RankCorrupt { fault: RankFault::InvalidTypeArgs(_), .. }
        ));

        let file = trace(
            0,
            vec![Call::TypeCreateSubarray {
                sizes: vec![i32::MAX; 3],
                subsizes: vec![i32::MAX; 3],
                starts: vec![0; 3],
                order: 0,
                oldtype: 12,
                newtype: 30,
            }],
        );
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        let err = actor.advance(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::RankCorrupt { fault: RankFault::InvalidTypeArgs(_), .. }
        ));
    }

    #[test]
    fn test_multithreaded_collective_is_rejected() {
        let mut writer = TraceWriter::new(Vec::new(), 0).unwrap();
        writer.write(&CallRecord::new(Call::Init).with_thread(0)).unwrap();
        writer
            .write(&CallRecord::new(Call::CommDup { comm: COMM_WORLD, newcomm: 4 }).with_thread(3))
            .unwrap();
        let file = TraceFile::from_bytes(writer.into_inner().unwrap()).unwrap();
        let mut resolver = CollectiveResolver::new(1);
        let mut actor = RankActor::new(&file, resolver.groups(), None);
        let err = actor.advance(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::RankCorrupt {
                fault: RankFault::MultiThreadedCollective { thread: 3, main: 0 },
                ..
            }
        ));
    }

    #[test]
    fn test_truncation_stops_early() {
        let calls = vec![Call::Barrier { comm: COMM_WORLD }; 10];
        let file = trace(0, calls);
        let mut resolver = CollectiveResolver::new(1);
        let half = Truncation::Percent(50.0);
        let mut actor = RankActor::new(&file, resolver.groups(), Some(half));
        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Done);
        let records = actor.tables().records;
        assert!(records > 0 && records < 10, "read {records} records");

        let mut actor = RankActor::new(&file, resolver.groups(), Some(Truncation::Offset(0)));
        assert_eq!(actor.advance(&mut resolver).unwrap(), ActorState::Done);
        assert_eq!(actor.tables().records, 0);
    }

    #[test]
    fn test_stop_offset() {
        assert_eq!(Truncation::Offset(50).stop_offset(40), 40);
        assert_eq!(Truncation::Offset(10).stop_offset(40), 10);
        assert_eq!(Truncation::Percent(25.0).stop_offset(200), 50);
        assert_eq!(Truncation::Percent(150.0).stop_offset(200), 200);
    }
}
