use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Position of a process in the world communicator
pub type Rank = u32;

/// Rank-local integer handle as recorded in a trace
pub type Handle = i32;

/// A key used when ordering processes inside a split color
pub type Key = i32;

pub const COMM_NULL: Handle = 0;
pub const COMM_WORLD: Handle = 1;
pub const COMM_SELF: Handle = 2;

pub const GROUP_NULL: Handle = 0;
pub const GROUP_EMPTY: Handle = 1;

pub const DATATYPE_NULL: Handle = 0;

/// Value of `MPI_UNDEFINED` as stored in split colors
pub const UNDEFINED: i32 = -32766;

/// Predefined datatypes: (handle, name, size in bytes)
pub const PREDEFINED_TYPES: &[(Handle, &str, u64)] = &[
    (1, "MPI_CHAR", 1),
    (2, "MPI_SIGNED_CHAR", 1),
    (3, "MPI_UNSIGNED_CHAR", 1),
    (4, "MPI_BYTE", 1),
    (5, "MPI_SHORT", 2),
    (6, "MPI_UNSIGNED_SHORT", 2),
    (7, "MPI_INT", 4),
    (8, "MPI_UNSIGNED", 4),
    (9, "MPI_LONG", 8),
    (10, "MPI_UNSIGNED_LONG", 8),
    (11, "MPI_FLOAT", 4),
    (12, "MPI_DOUBLE", 8),
    (13, "MPI_LONG_DOUBLE", 16),
    (14, "MPI_LONG_LONG", 8),
    (15, "MPI_UNSIGNED_LONG_LONG", 8),
    (16, "MPI_PACKED", 1),
    (17, "MPI_2INT", 8),
];

/// Logical time on one rank: the ordinal of a call record in that rank's stream.
///
/// Tick 0 is reserved for handles that exist before the first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub const ORIGIN: Tick = Tick(0);

    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock or CPU time captured by the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ClockTime {
    pub sec: u32,
    pub nsec: u32,
}

impl ClockTime {
    pub fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / 1e9
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

/// Entry and exit time of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: ClockTime,
    pub stop: ClockTime,
}

impl TimeSpan {
    pub fn seconds(&self) -> f64 {
        (self.stop.as_secs_f64() - self.start.as_secs_f64()).max(0.0)
    }
}

/// Global communicator identifier, comparable across ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommId(pub u32);

impl CommId {
    pub const WORLD: CommId = CommId(0);

    pub fn self_of(rank: Rank) -> CommId {
        CommId(1 + rank)
    }
}

impl fmt::Display for CommId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "comm#{}", self.0)
    }
}

/// Global group identifier, comparable across ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// A color used in a communicator split
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Color(pub i32);

impl Color {
    pub fn undefined() -> Color {
        Color(UNDEFINED)
    }

    pub fn is_undefined(&self) -> bool {
        self.0 == UNDEFINED
    }
}

/// An ordered set of world ranks.
///
/// The order defines the local-rank to world-rank mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub global_id: GroupId,
    pub members: Vec<Rank>,
    pub is_world: bool,
    pub is_self: bool,
}

impl Group {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Local rank of `world_rank` inside this group
    pub fn local_rank_of(&self, world_rank: Rank) -> Option<usize> {
        self.members.iter().position(|&m| m == world_rank)
    }

    pub fn contains(&self, world_rank: Rank) -> bool {
        self.members.contains(&world_rank)
    }
}

/// How a communicator came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommKind {
    World,
    #[serde(rename = "self")]
    SelfComm,
    Dup,
    Create,
    Split,
}

impl fmt::Display for CommKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommKind::World => "world",
            CommKind::SelfComm => "self",
            CommKind::Dup => "dup",
            CommKind::Create => "create",
            CommKind::Split => "split",
        };
        f.write_str(name)
    }
}

/// One rank's view of a resolved communicator
#[derive(Debug)]
pub struct Communicator {
    pub global_id: CommId,
    pub group: Rc<Group>,
    /// Only used to find sibling participants, never owned
    pub parent: Weak<Communicator>,
    pub kind: CommKind,
    pub split: Option<(Color, Key)>,
    pub local_rank: usize,
    pub world_rank: Rank,
    pub name: RefCell<Option<String>>,
}

impl Communicator {
    pub fn world(group: Rc<Group>, world_rank: Rank) -> Self {
        Self::predefined(CommId::WORLD, CommKind::World, group, world_rank)
    }

    pub fn self_comm(group: Rc<Group>, world_rank: Rank) -> Self {
        Self::predefined(CommId::self_of(world_rank), CommKind::SelfComm, group, world_rank)
    }

    fn predefined(global_id: CommId, kind: CommKind, group: Rc<Group>, world_rank: Rank) -> Self {
        let local_rank = group.local_rank_of(world_rank).unwrap_or(0);
        Self {
            global_id,
            group,
            parent: Weak::new(),
            kind,
            split: None,
            local_rank,
            world_rank,
            name: RefCell::new(None),
        }
    }

    pub fn size(&self) -> usize {
        self.group.size()
    }

    pub fn parent_id(&self) -> Option<CommId> {
        self.parent.upgrade().map(|p| p.global_id)
    }

    pub fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = Some(name.to_string());
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }
}

/// A datatype tracked on one rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Datatype {
    pub size: u64,
    pub committed: Option<Tick>,
    pub predefined: bool,
}

impl Datatype {
    pub fn predefined(size: u64) -> Self {
        Self {
            size,
            committed: Some(Tick::ORIGIN),
            predefined: true,
        }
    }

    pub fn derived(size: u64) -> Self {
        Self {
            size,
            committed: None,
            predefined: false,
        }
    }

    /// Whether the type may be used for communication at tick `at`
    pub fn usable_at(&self, at: Tick) -> bool {
        matches!(self.committed, Some(c) if c <= at)
    }
}

/// The three kinds of rank-local handles a call can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Comm,
    Group,
    Datatype,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Comm => f.write_str("communicator"),
            HandleKind::Group => f.write_str("group"),
            HandleKind::Datatype => f.write_str("datatype"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_display() {
        assert_eq!(ClockTime::new(3, 5).to_string(), "3.000000005");
        assert_eq!(ClockTime::new(0, 0).to_string(), "0.000000000");
    }

    #[test]
    fn test_time_span_seconds() {
        let span = TimeSpan {
            start: ClockTime::new(1, 500_000_000),
            stop: ClockTime::new(2, 0),
        };
        assert!((span.seconds() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_group_local_rank() {
        let group = Group {
            global_id: GroupId(7),
            members: vec![3, 1, 2],
            is_world: false,
            is_self: false,
        };
        assert_eq!(group.local_rank_of(1), Some(1));
        assert_eq!(group.local_rank_of(0), None);
        assert_eq!(group.size(), 3);
    }

    #[test]
    fn test_datatype_usable() {
        let mut dt = Datatype::derived(16);
        assert!(!dt.usable_at(Tick(4)));
        dt.committed = Some(Tick(5));
        assert!(!dt.usable_at(Tick(4)));
        assert!(dt.usable_at(Tick(5)));
        assert!(Datatype::predefined(4).usable_at(Tick::ORIGIN));
    }
}
