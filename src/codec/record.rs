use crate::types::{ClockTime, Handle, HandleKind, Key, TimeSpan};
use serde::Serialize;
use std::fmt;

/// Completion status captured for receive and wait calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub source: i32,
    pub tag: i32,
    pub count: i32,
    pub cancelled: bool,
    pub error: i32,
}

/// Hardware counter reading taken around one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerfCounter {
    pub name: String,
    pub start: u64,
    pub stop: u64,
}

/// One decoded call with its optional captured fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub call: Call,
    pub thread: Option<u16>,
    pub wall: Option<TimeSpan>,
    pub cpu: Option<TimeSpan>,
    pub perf: Vec<PerfCounter>,
    pub status: Option<Status>,
}

impl CallRecord {
    pub fn new(call: Call) -> Self {
        Self {
            call,
            thread: None,
            wall: None,
            cpu: None,
            perf: Vec::new(),
            status: None,
        }
    }

    pub fn with_wall(mut self, start: ClockTime, stop: ClockTime) -> Self {
        self.wall = Some(TimeSpan { start, stop });
        self
    }

    pub fn with_cpu(mut self, start: ClockTime, stop: ClockTime) -> Self {
        self.cpu = Some(TimeSpan { start, stop });
        self
    }

    pub fn with_thread(mut self, thread: u16) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_perf(mut self, name: &str, start: u64, stop: u64) -> Self {
        self.perf.push(PerfCounter {
            name: name.to_string(),
            start,
            stop,
        });
        self
    }
}

/// Every traced MPI call the toolkit understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    Init,
    Finalize,

    Send { dest: i32, tag: i32, count: i32, datatype: Handle, comm: Handle },
    Isend { dest: i32, tag: i32, count: i32, datatype: Handle, comm: Handle, request: i32 },
    Recv { source: i32, tag: i32, count: i32, datatype: Handle, comm: Handle },
    Irecv { source: i32, tag: i32, count: i32, datatype: Handle, comm: Handle, request: i32 },
    Wait { request: i32 },
    Waitall { requests: Vec<i32> },

    Barrier { comm: Handle },
    Bcast { root: i32, count: i32, datatype: Handle, comm: Handle },
    Reduce { root: i32, count: i32, datatype: Handle, op: i32, comm: Handle },
    Allreduce { count: i32, datatype: Handle, op: i32, comm: Handle },
    Gather { root: i32, sendcount: i32, sendtype: Handle, recvcount: i32, recvtype: Handle, comm: Handle },
    Allgather { sendcount: i32, sendtype: Handle, recvcount: i32, recvtype: Handle, comm: Handle },
    Alltoall { sendcount: i32, sendtype: Handle, recvcount: i32, recvtype: Handle, comm: Handle },

    CommRank { comm: Handle, rank: i32 },
    CommSize { comm: Handle, size: i32 },
    CommDup { comm: Handle, newcomm: Handle },
    CommCreate { comm: Handle, group: Handle, newcomm: Handle },
    CommSplit { comm: Handle, color: i32, key: Key, newcomm: Handle },
    CommFree { comm: Handle },
    CommGroup { comm: Handle, group: Handle },
    CommSetName { comm: Handle, name: String },

    GroupSize { group: Handle, size: i32 },
    GroupRank { group: Handle, rank: i32 },
    GroupUnion { group1: Handle, group2: Handle, newgroup: Handle },
    GroupIntersection { group1: Handle, group2: Handle, newgroup: Handle },
    GroupDifference { group1: Handle, group2: Handle, newgroup: Handle },
    GroupIncl { group: Handle, ranks: Vec<i32>, newgroup: Handle },
    GroupExcl { group: Handle, ranks: Vec<i32>, newgroup: Handle },
    GroupRangeIncl { group: Handle, ranges: Vec<[i32; 3]>, newgroup: Handle },
    GroupRangeExcl { group: Handle, ranges: Vec<[i32; 3]>, newgroup: Handle },
    GroupFree { group: Handle },

    TypeContiguous { count: i32, oldtype: Handle, newtype: Handle },
    TypeVector { count: i32, blocklength: i32, stride: i32, oldtype: Handle, newtype: Handle },
    TypeHvector { count: i32, blocklength: i32, stride: i64, oldtype: Handle, newtype: Handle },
    TypeIndexed { blocklengths: Vec<i32>, displacements: Vec<i32>, oldtype: Handle, newtype: Handle },
    TypeHindexed { blocklengths: Vec<i32>, displacements: Vec<i64>, oldtype: Handle, newtype: Handle },
    TypeStruct { blocklengths: Vec<i32>, displacements: Vec<i64>, types: Vec<Handle>, newtype: Handle },
    TypeDup { oldtype: Handle, newtype: Handle },
    TypeCreateIndexedBlock { blocklength: i32, displacements: Vec<i32>, oldtype: Handle, newtype: Handle },
    TypeCreateSubarray { sizes: Vec<i32>, subsizes: Vec<i32>, starts: Vec<i32>, order: i32, oldtype: Handle, newtype: Handle },
    TypeCreateResized { oldtype: Handle, lb: i64, extent: i64, newtype: Handle },
    TypeCommit { datatype: Handle },
    TypeFree { datatype: Handle },
    TypeSize { datatype: Handle, size: i32 },
}

/// The three collective creation calls that need cross-rank resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectiveKind {
    Dup,
    Create,
    Split,
}

impl fmt::Display for CollectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectiveKind::Dup => f.write_str("MPI_Comm_dup"),
            CollectiveKind::Create => f.write_str("MPI_Comm_create"),
            CollectiveKind::Split => f.write_str("MPI_Comm_split"),
        }
    }
}

impl Call {
    /// Wire tag of this call kind
    pub fn tag(&self) -> u16 {
        match self {
            Call::Init => 0x0001,
            Call::Finalize => 0x0002,
            Call::Send { .. } => 0x0010,
            Call::Isend { .. } => 0x0011,
            Call::Recv { .. } => 0x0012,
            Call::Irecv { .. } => 0x0013,
            Call::Wait { .. } => 0x0014,
            Call::Waitall { .. } => 0x0015,
            Call::Barrier { .. } => 0x0020,
            Call::Bcast { .. } => 0x0021,
            Call::Reduce { .. } => 0x0022,
            Call::Allreduce { .. } => 0x0023,
            Call::Gather { .. } => 0x0024,
            Call::Allgather { .. } => 0x0025,
            Call::Alltoall { .. } => 0x0026,
            Call::CommRank { .. } => 0x0030,
            Call::CommSize { .. } => 0x0031,
            Call::CommDup { .. } => 0x0032,
            Call::CommCreate { .. } => 0x0033,
            Call::CommSplit { .. } => 0x0034,
            Call::CommFree { .. } => 0x0035,
            Call::CommGroup { .. } => 0x0036,
            Call::CommSetName { .. } => 0x0037,
            Call::GroupSize { .. } => 0x0040,
            Call::GroupRank { .. } => 0x0041,
            Call::GroupUnion { .. } => 0x0042,
            Call::GroupIntersection { .. } => 0x0043,
            Call::GroupDifference { .. } => 0x0044,
            Call::GroupIncl { .. } => 0x0045,
            Call::GroupExcl { .. } => 0x0046,
            Call::GroupRangeIncl { .. } => 0x0047,
            Call::GroupRangeExcl { .. } => 0x0048,
            Call::GroupFree { .. } => 0x0049,
            Call::TypeContiguous { .. } => 0x0050,
            Call::TypeVector { .. } => 0x0051,
            Call::TypeHvector { .. } => 0x0052,
            Call::TypeIndexed { .. } => 0x0053,
            Call::TypeHindexed { .. } => 0x0054,
            Call::TypeStruct { .. } => 0x0055,
            Call::TypeDup { .. } => 0x0056,
            Call::TypeCreateIndexedBlock { .. } => 0x0057,
            Call::TypeCreateSubarray { .. } => 0x0058,
            Call::TypeCreateResized { .. } => 0x0059,
            Call::TypeCommit { .. } => 0x005a,
            Call::TypeFree { .. } => 0x005b,
            Call::TypeSize { .. } => 0x005c,
        }
    }

    /// MPI function name
    pub fn name(&self) -> &'static str {
        match self {
            Call::Init => "MPI_Init",
            Call::Finalize => "MPI_Finalize",
            Call::Send { .. } => "MPI_Send",
            Call::Isend { .. } => "MPI_Isend",
            Call::Recv { .. } => "MPI_Recv",
            Call::Irecv { .. } => "MPI_Irecv",
            Call::Wait { .. } => "MPI_Wait",
            Call::Waitall { .. } => "MPI_Waitall",
            Call::Barrier { .. } => "MPI_Barrier",
            Call::Bcast { .. } => "MPI_Bcast",
            Call::Reduce { .. } => "MPI_Reduce",
            Call::Allreduce { .. } => "MPI_Allreduce",
            Call::Gather { .. } => "MPI_Gather",
            Call::Allgather { .. } => "MPI_Allgather",
            Call::Alltoall { .. } => "MPI_Alltoall",
            Call::CommRank { .. } => "MPI_Comm_rank",
            Call::CommSize { .. } => "MPI_Comm_size",
            Call::CommDup { .. } => "MPI_Comm_dup",
            Call::CommCreate { .. } => "MPI_Comm_create",
            Call::CommSplit { .. } => "MPI_Comm_split",
            Call::CommFree { .. } => "MPI_Comm_free",
            Call::CommGroup { .. } => "MPI_Comm_group",
            Call::CommSetName { .. } => "MPI_Comm_set_name",
            Call::GroupSize { .. } => "MPI_Group_size",
            Call::GroupRank { .. } => "MPI_Group_rank",
            Call::GroupUnion { .. } => "MPI_Group_union",
            Call::GroupIntersection { .. } => "MPI_Group_intersection",
            Call::GroupDifference { .. } => "MPI_Group_difference",
            Call::GroupIncl { .. } => "MPI_Group_incl",
            Call::GroupExcl { .. } => "MPI_Group_excl",
            Call::GroupRangeIncl { .. } => "MPI_Group_range_incl",
            Call::GroupRangeExcl { .. } => "MPI_Group_range_excl",
            Call::GroupFree { .. } => "MPI_Group_free",
            Call::TypeContiguous { .. } => "MPI_Type_contiguous",
            Call::TypeVector { .. } => "MPI_Type_vector",
            Call::TypeHvector { .. } => "MPI_Type_hvector",
            Call::TypeIndexed { .. } => "MPI_Type_indexed",
            Call::TypeHindexed { .. } => "MPI_Type_hindexed",
            Call::TypeStruct { .. } => "MPI_Type_struct",
            Call::TypeDup { .. } => "MPI_Type_dup",
            Call::TypeCreateIndexedBlock { .. } => "MPI_Type_create_indexed_block",
            Call::TypeCreateSubarray { .. } => "MPI_Type_create_subarray",
            Call::TypeCreateResized { .. } => "MPI_Type_create_resized",
            Call::TypeCommit { .. } => "MPI_Type_commit",
            Call::TypeFree { .. } => "MPI_Type_free",
            Call::TypeSize { .. } => "MPI_Type_size",
        }
    }

    /// Which collective creation this is, if any
    pub fn collective_kind(&self) -> Option<CollectiveKind> {
        match self {
            Call::CommDup { .. } => Some(CollectiveKind::Dup),
            Call::CommCreate { .. } => Some(CollectiveKind::Create),
            Call::CommSplit { .. } => Some(CollectiveKind::Split),
            _ => None,
        }
    }

    /// Element count and datatype of the data this call moves
    pub fn payload(&self) -> Option<(i32, Handle)> {
        match *self {
            Call::Send { count, datatype, .. }
            | Call::Isend { count, datatype, .. }
            | Call::Recv { count, datatype, .. }
            | Call::Irecv { count, datatype, .. }
            | Call::Bcast { count, datatype, .. }
            | Call::Reduce { count, datatype, .. }
            | Call::Allreduce { count, datatype, .. } => Some((count, datatype)),
            Call::Gather { sendcount, sendtype, .. }
            | Call::Allgather { sendcount, sendtype, .. }
            | Call::Alltoall { sendcount, sendtype, .. } => Some((sendcount, sendtype)),
            _ => None,
        }
    }

    /// Every handle argument, inputs before outputs
    pub fn handles(&self) -> Vec<(HandleKind, Handle)> {
        use HandleKind::{Comm, Datatype, Group};
        match self {
            Call::Init | Call::Finalize | Call::Wait { .. } | Call::Waitall { .. } => Vec::new(),
            Call::Send { datatype, comm, .. }
            | Call::Isend { datatype, comm, .. }
            | Call::Recv { datatype, comm, .. }
            | Call::Irecv { datatype, comm, .. }
            | Call::Bcast { datatype, comm, .. }
            | Call::Reduce { datatype, comm, .. }
            | Call::Allreduce { datatype, comm, .. } => vec![(Datatype, *datatype), (Comm, *comm)],
            Call::Gather { sendtype, recvtype, comm, .. }
            | Call::Allgather { sendtype, recvtype, comm, .. }
            | Call::Alltoall { sendtype, recvtype, comm, .. } => {
                vec![(Datatype, *sendtype), (Datatype, *recvtype), (Comm, *comm)]
            }
            Call::Barrier { comm }
            | Call::CommRank { comm, .. }
            | Call::CommSize { comm, .. }
            | Call::CommFree { comm }
            | Call::CommSetName { comm, .. } => vec![(Comm, *comm)],
            Call::CommDup { comm, newcomm } | Call::CommSplit { comm, newcomm, .. } => {
                vec![(Comm, *comm), (Comm, *newcomm)]
            }
            Call::CommCreate { comm, group, newcomm } => {
                vec![(Comm, *comm), (Group, *group), (Comm, *newcomm)]
            }
            Call::CommGroup { comm, group } => vec![(Comm, *comm), (Group, *group)],
            Call::GroupSize { group, .. }
            | Call::GroupRank { group, .. }
            | Call::GroupFree { group } => vec![(Group, *group)],
            Call::GroupUnion { group1, group2, newgroup }
            | Call::GroupIntersection { group1, group2, newgroup }
            | Call::GroupDifference { group1, group2, newgroup } => {
                vec![(Group, *group1), (Group, *group2), (Group, *newgroup)]
            }
            Call::GroupIncl { group, newgroup, .. }
            | Call::GroupExcl { group, newgroup, .. }
            | Call::GroupRangeIncl { group, newgroup, .. }
            | Call::GroupRangeExcl { group, newgroup, .. } => {
                vec![(Group, *group), (Group, *newgroup)]
            }
            Call::TypeContiguous { oldtype, newtype, .. }
            | Call::TypeVector { oldtype, newtype, .. }
            | Call::TypeHvector { oldtype, newtype, .. }
            | Call::TypeIndexed { oldtype, newtype, .. }
            | Call::TypeHindexed { oldtype, newtype, .. }
            | Call::TypeDup { oldtype, newtype }
            | Call::TypeCreateIndexedBlock { oldtype, newtype, .. }
            | Call::TypeCreateSubarray { oldtype, newtype, .. }
            | Call::TypeCreateResized { oldtype, newtype, .. } => {
                vec![(Datatype, *oldtype), (Datatype, *newtype)]
            }
            Call::TypeStruct { types, newtype, .. } => {
                let mut out: Vec<_> = types.iter().map(|&t| (Datatype, t)).collect();
                out.push((Datatype, *newtype));
                out
            }
            Call::TypeCommit { datatype }
            | Call::TypeFree { datatype }
            | Call::TypeSize { datatype, .. } => vec![(Datatype, *datatype)],
        }
    }

    /// Mutable access to every handle argument, in the same order as [`Call::handles`]
    pub fn handles_mut(&mut self) -> Vec<(HandleKind, &mut Handle)> {
        use HandleKind::{Comm, Datatype, Group};
        match self {
            Call::Init | Call::Finalize | Call::Wait { .. } | Call::Waitall { .. } => Vec::new(),
            Call::Send { datatype, comm, .. }
            | Call::Isend { datatype, comm, .. }
            | Call::Recv { datatype, comm, .. }
            | Call::Irecv { datatype, comm, .. }
            | Call::Bcast { datatype, comm, .. }
            | Call::Reduce { datatype, comm, .. }
            | Call::Allreduce { datatype, comm, .. } => vec![(Datatype, datatype), (Comm, comm)],
            Call::Gather { sendtype, recvtype, comm, .. }
            | Call::Allgather { sendtype, recvtype, comm, .. }
            | Call::Alltoall { sendtype, recvtype, comm, .. } => {
                vec![(Datatype, sendtype), (Datatype, recvtype), (Comm, comm)]
            }
            Call::Barrier { comm }
            | Call::CommRank { comm, .. }
            | Call::CommSize { comm, .. }
            | Call::CommFree { comm }
            | Call::CommSetName { comm, .. } => vec![(Comm, comm)],
            Call::CommDup { comm, newcomm } | Call::CommSplit { comm, newcomm, .. } => {
                vec![(Comm, comm), (Comm, newcomm)]
            }
            Call::CommCreate { comm, group, newcomm } => {
                vec![(Comm, comm), (Group, group), (Comm, newcomm)]
            }
            Call::CommGroup { comm, group } => vec![(Comm, comm), (Group, group)],
            Call::GroupSize { group, .. }
            | Call::GroupRank { group, .. }
            | Call::GroupFree { group } => vec![(Group, group)],
            Call::GroupUnion { group1, group2, newgroup }
            | Call::GroupIntersection { group1, group2, newgroup }
            | Call::GroupDifference { group1, group2, newgroup } => {
                vec![(Group, group1), (Group, group2), (Group, newgroup)]
            }
            Call::GroupIncl { group, newgroup, .. }
            | Call::GroupExcl { group, newgroup, .. }
            | Call::GroupRangeIncl { group, newgroup, .. }
            | Call::GroupRangeExcl { group, newgroup, .. } => {
                vec![(Group, group), (Group, newgroup)]
            }
            Call::TypeContiguous { oldtype, newtype, .. }
            | Call::TypeVector { oldtype, newtype, .. }
            | Call::TypeHvector { oldtype, newtype, .. }
            | Call::TypeIndexed { oldtype, newtype, .. }
            | Call::TypeHindexed { oldtype, newtype, .. }
            | Call::TypeDup { oldtype, newtype }
            | Call::TypeCreateIndexedBlock { oldtype, newtype, .. }
            | Call::TypeCreateSubarray { oldtype, newtype, .. }
            | Call::TypeCreateResized { oldtype, newtype, .. } => {
                vec![(Datatype, oldtype), (Datatype, newtype)]
            }
            Call::TypeStruct { types, newtype, .. } => {
                let mut out: Vec<_> = types.iter_mut().map(|t| (Datatype, t)).collect();
                out.push((Datatype, newtype));
                out
            }
            Call::TypeCommit { datatype }
            | Call::TypeFree { datatype }
            | Call::TypeSize { datatype, .. } => vec![(Datatype, datatype)],
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        match self {
            Call::Init | Call::Finalize => {}
            Call::Send { dest, tag, count, datatype, comm } => write!(
                f,
                "count={count}, datatype={datatype}, dest={dest}, tag={tag}, comm={comm}"
            )?,
            Call::Isend { dest, tag, count, datatype, comm, request } => write!(
                f,
                "count={count}, datatype={datatype}, dest={dest}, tag={tag}, comm={comm}, request={request}"
            )?,
            Call::Recv { source, tag, count, datatype, comm } => write!(
                f,
                "count={count}, datatype={datatype}, source={source}, tag={tag}, comm={comm}"
            )?,
            Call::Irecv { source, tag, count, datatype, comm, request } => write!(
                f,
                "count={count}, datatype={datatype}, source={source}, tag={tag}, comm={comm}, request={request}"
            )?,
            Call::Wait { request } => write!(f, "request={request}")?,
            Call::Waitall { requests } => write!(f, "requests=[{}]", join(requests))?,
            Call::Barrier { comm } => write!(f, "comm={comm}")?,
            Call::Bcast { root, count, datatype, comm } => {
                write!(f, "count={count}, datatype={datatype}, root={root}, comm={comm}")?
            }
            Call::Reduce { root, count, datatype, op, comm } => write!(
                f,
                "count={count}, datatype={datatype}, op={op}, root={root}, comm={comm}"
            )?,
            Call::Allreduce { count, datatype, op, comm } => {
                write!(f, "count={count}, datatype={datatype}, op={op}, comm={comm}")?
            }
            Call::Gather { root, sendcount, sendtype, recvcount, recvtype, comm } => write!(
                f,
                "sendcount={sendcount}, sendtype={sendtype}, recvcount={recvcount}, recvtype={recvtype}, root={root}, comm={comm}"
            )?,
            Call::Allgather { sendcount, sendtype, recvcount, recvtype, comm }
            | Call::Alltoall { sendcount, sendtype, recvcount, recvtype, comm } => write!(
                f,
                "sendcount={sendcount}, sendtype={sendtype}, recvcount={recvcount}, recvtype={recvtype}, comm={comm}"
            )?,
            Call::CommRank { comm, rank } => write!(f, "comm={comm}, rank={rank}")?,
            Call::CommSize { comm, size } => write!(f, "comm={comm}, size={size}")?,
            Call::CommDup { comm, newcomm } => write!(f, "comm={comm}, newcomm={newcomm}")?,
            Call::CommCreate { comm, group, newcomm } => {
                write!(f, "comm={comm}, group={group}, newcomm={newcomm}")?
            }
            Call::CommSplit { comm, color, key, newcomm } => {
                write!(f, "comm={comm}, color={color}, key={key}, newcomm={newcomm}")?
            }
            Call::CommFree { comm } => write!(f, "comm={comm}")?,
            Call::CommGroup { comm, group } => write!(f, "comm={comm}, group={group}")?,
            Call::CommSetName { comm, name } => write!(f, "comm={comm}, name={name:?}")?,
            Call::GroupSize { group, size } => write!(f, "group={group}, size={size}")?,
            Call::GroupRank { group, rank } => write!(f, "group={group}, rank={rank}")?,
            Call::GroupUnion { group1, group2, newgroup }
            | Call::GroupIntersection { group1, group2, newgroup }
            | Call::GroupDifference { group1, group2, newgroup } => {
                write!(f, "group1={group1}, group2={group2}, newgroup={newgroup}")?
            }
            Call::GroupIncl { group, ranks, newgroup } | Call::GroupExcl { group, ranks, newgroup } => {
                write!(f, "group={group}, ranks=[{}], newgroup={newgroup}", join(ranks))?
            }
            Call::GroupRangeIncl { group, ranges, newgroup }
            | Call::GroupRangeExcl { group, ranges, newgroup } => {
                let ranges: Vec<String> = ranges
                    .iter()
                    .map(|[a, b, s]| format!("{a}:{b}:{s}"))
                    .collect();
                write!(f, "group={group}, ranges=[{}], newgroup={newgroup}", ranges.join(","))?
            }
            Call::GroupFree { group } => write!(f, "group={group}")?,
            Call::TypeContiguous { count, oldtype, newtype } => {
                write!(f, "count={count}, oldtype={oldtype}, newtype={newtype}")?
            }
            Call::TypeVector { count, blocklength, stride, oldtype, newtype } => write!(
                f,
                "count={count}, blocklength={blocklength}, stride={stride}, oldtype={oldtype}, newtype={newtype}"
            )?,
            Call::TypeHvector { count, blocklength, stride, oldtype, newtype } => write!(
                f,
                "count={count}, blocklength={blocklength}, stride={stride}, oldtype={oldtype}, newtype={newtype}"
            )?,
            Call::TypeIndexed { blocklengths, displacements, oldtype, newtype } => write!(
                f,
                "blocklengths=[{}], displacements=[{}], oldtype={oldtype}, newtype={newtype}",
                join(blocklengths),
                join(displacements)
            )?,
            Call::TypeHindexed { blocklengths, displacements, oldtype, newtype } => write!(
                f,
                "blocklengths=[{}], displacements=[{}], oldtype={oldtype}, newtype={newtype}",
                join(blocklengths),
                join(displacements)
            )?,
            Call::TypeStruct { blocklengths, displacements, types, newtype } => write!(
                f,
                "blocklengths=[{}], displacements=[{}], types=[{}], newtype={newtype}",
                join(blocklengths),
                join(displacements),
                join(types)
            )?,
            Call::TypeDup { oldtype, newtype } => write!(f, "oldtype={oldtype}, newtype={newtype}")?,
            Call::TypeCreateIndexedBlock { blocklength, displacements, oldtype, newtype } => write!(
                f,
                "blocklength={blocklength}, displacements=[{}], oldtype={oldtype}, newtype={newtype}",
                join(displacements)
            )?,
            Call::TypeCreateSubarray { sizes, subsizes, starts, order, oldtype, newtype } => write!(
                f,
                "sizes=[{}], subsizes=[{}], starts=[{}], order={order}, oldtype={oldtype}, newtype={newtype}",
                join(sizes),
                join(subsizes),
                join(starts)
            )?,
            Call::TypeCreateResized { oldtype, lb, extent, newtype } => {
                write!(f, "oldtype={oldtype}, lb={lb}, extent={extent}, newtype={newtype}")?
            }
            Call::TypeCommit { datatype } | Call::TypeFree { datatype } => {
                write!(f, "datatype={datatype}")?
            }
            Call::TypeSize { datatype, size } => write!(f, "datatype={datatype}, size={size}")?,
        }
        write!(f, ")")
    }
}
