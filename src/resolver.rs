//! Cross-rank matching of collective communicator creation.
//!
//! Each rank only records its own side of `MPI_Comm_dup`, `MPI_Comm_create`
//! and `MPI_Comm_split`. The resolver gathers those sides under a
//! [`PendingKey`] until every member of the parent communicator has reported,
//! then assigns global communicator ids and builds the resulting groups.
//!
//! Ids depend only on the order in which collectives complete and on the
//! color/key sort inside a split, never on the order contributions arrive.

use crate::codec::CollectiveKind;
use crate::error::ResolveError;
use crate::group::GroupTable;
use crate::types::{Color, CommId, CommKind, Communicator, Group, GroupId, Key, Rank};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

/// Identifies one in-flight collective: the parent communicator and the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PendingKey {
    pub parent: CommId,
    pub kind: CollectiveKind,
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.kind, self.parent)
    }
}

/// Call-specific part of a contribution
#[derive(Debug, Clone)]
pub enum ContributionData {
    Dup,
    Create { group: Rc<Group> },
    Split { color: Color, key: Key },
}

/// One rank's side of a collective creation
#[derive(Debug, Clone)]
pub struct Contribution {
    pub rank: Rank,
    pub parent: Rc<Communicator>,
    pub data: ContributionData,
}

impl Contribution {
    pub fn key(&self) -> PendingKey {
        let kind = match self.data {
            ContributionData::Dup => CollectiveKind::Dup,
            ContributionData::Create { .. } => CollectiveKind::Create,
            ContributionData::Split { .. } => CollectiveKind::Split,
        };
        PendingKey {
            parent: self.parent.global_id,
            kind,
        }
    }

    fn parent_local_rank(&self) -> usize {
        self.parent.local_rank
    }
}

/// Contributions gathered so far for one key
#[derive(Debug)]
pub struct PendingCollective {
    pub key: PendingKey,
    pub expected: usize,
    pub parent_group: Rc<Group>,
    pub contributions: Vec<Contribution>,
}

impl PendingCollective {
    pub fn arrived(&self) -> Vec<Rank> {
        let mut ranks: Vec<Rank> = self.contributions.iter().map(|c| c.rank).collect();
        ranks.sort_unstable();
        ranks
    }

    /// Members of the parent group that have not contributed yet
    pub fn missing(&self) -> Vec<Rank> {
        let arrived = self.arrived();
        let mut missing: Vec<Rank> = self
            .parent_group
            .members
            .iter()
            .copied()
            .filter(|m| arrived.binary_search(m).is_err())
            .collect();
        missing.sort_unstable();
        missing
    }

    fn is_complete(&self) -> bool {
        self.contributions.len() == self.expected
    }
}

/// A completed collective whose participants have not been released yet
#[derive(Debug)]
pub struct Resolution {
    pub key: PendingKey,
    pub global_ids: Vec<CommId>,
    /// Every participant, in rank order; `None` means the rank got no communicator
    pub outcomes: Vec<(Rank, Option<Rc<Communicator>>)>,
}

/// Result of handing one contribution to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    AwaitingMore,
    Resolved {
        global_ids: Vec<CommId>,
        results: Vec<(Rank, Option<CommId>)>,
    },
}

/// Run-wide description of one resolved communicator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommSummary {
    pub id: CommId,
    pub kind: CommKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<CommId>,
    pub group: GroupId,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<i32>,
    pub members: Vec<Rank>,
}

#[derive(Debug)]
pub struct CollectiveResolver {
    groups: GroupTable,
    next_comm: u32,
    pending: BTreeMap<PendingKey, PendingCollective>,
    completed: VecDeque<Resolution>,
    comms: Vec<CommSummary>,
}

impl CollectiveResolver {
    pub fn new(nranks: u32) -> Self {
        let groups = GroupTable::new(nranks);
        let world = groups.world();
        let mut comms = vec![CommSummary {
            id: CommId::WORLD,
            kind: CommKind::World,
            parent: None,
            group: world.global_id,
            size: world.size(),
            color: None,
            members: world.members.clone(),
        }];
        for rank in 0..nranks {
            if let Some(own) = groups.self_of(rank) {
                comms.push(CommSummary {
                    id: CommId::self_of(rank),
                    kind: CommKind::SelfComm,
                    parent: None,
                    group: own.global_id,
                    size: 1,
                    color: None,
                    members: own.members.clone(),
                });
            }
        }
        Self {
            groups,
            next_comm: 1 + nranks,
            pending: BTreeMap::new(),
            completed: VecDeque::new(),
            comms,
        }
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut GroupTable {
        &mut self.groups
    }

    /// Id the next resolved communicator will get
    pub fn next_comm_id(&self) -> CommId {
        CommId(self.next_comm)
    }

    pub fn communicators(&self) -> &[CommSummary] {
        &self.comms
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingCollective> {
        self.pending.values()
    }

    /// Add one rank's side of a collective, resolving it once every member has reported
    pub fn submit(&mut self, contribution: Contribution) -> Result<ResolverEvent, ResolveError> {
        let key = contribution.key();
        let rank = contribution.rank;
        let parent_group = Rc::clone(&contribution.parent.group);

        if !parent_group.contains(rank) {
            return Err(ResolveError::UnmatchedCollective {
                rank,
                key,
                reason: format!("rank is not a member of {}", key.parent),
            });
        }

        let pending = self
            .pending
            .entry(key)
            .or_insert_with(|| PendingCollective {
                key,
                expected: parent_group.size(),
                parent_group: Rc::clone(&parent_group),
                contributions: Vec::new(),
            });

        if pending.contributions.iter().any(|c| c.rank == rank) {
            return Err(ResolveError::UnmatchedCollective {
                rank,
                key,
                reason: "rank already contributed".to_string(),
            });
        }

        if let ContributionData::Create { group } = &contribution.data {
            if let Some(stray) = group.members.iter().find(|m| !parent_group.contains(**m)) {
                return Err(ResolveError::CollectiveMismatch {
                    rank,
                    key,
                    reason: format!("group member {stray} is outside {}", key.parent),
                });
            }
            let disagrees = pending.contributions.iter().any(|c| match &c.data {
                ContributionData::Create { group: other } => other.global_id != group.global_id,
                _ => true,
            });
            if disagrees {
                return Err(ResolveError::CollectiveMismatch {
                    rank,
                    key,
                    reason: format!("group {} differs from other participants", group.global_id),
                });
            }
        }

        pending.contributions.push(contribution);
        tracing::trace!(%key, rank, arrived = pending.contributions.len(), expected = pending.expected, "contribution");

        if !pending.is_complete() {
            return Ok(ResolverEvent::AwaitingMore);
        }

        let Some(pending) = self.pending.remove(&key) else {
            return Ok(ResolverEvent::AwaitingMore);
        };
        let resolution = self.resolve(pending);
        let event = ResolverEvent::Resolved {
            global_ids: resolution.global_ids.clone(),
            results: resolution
                .outcomes
                .iter()
                .map(|(rank, comm)| (*rank, comm.as_ref().map(|c| c.global_id)))
                .collect(),
        };
        self.completed.push_back(resolution);
        Ok(event)
    }

    /// Whether a completed collective is waiting to release its participants
    pub fn has_progress(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Next completed collective, oldest first
    pub fn release_next(&mut self) -> Option<Resolution> {
        self.completed.pop_front()
    }

    fn allocate(&mut self) -> CommId {
        let id = CommId(self.next_comm);
        self.next_comm += 1;
        id
    }

    fn record(&mut self, id: CommId, kind: CommKind, parent: CommId, group: &Rc<Group>, color: Option<i32>) {
        self.comms.push(CommSummary {
            id,
            kind,
            parent: Some(parent),
            group: group.global_id,
            size: group.size(),
            color,
            members: group.members.clone(),
        });
    }

    fn resolve(&mut self, mut pending: PendingCollective) -> Resolution {
        let key = pending.key;
        pending.contributions.sort_by_key(|c| c.rank);

        let (global_ids, mut outcomes) = match key.kind {
            CollectiveKind::Dup => self.resolve_dup(&pending),
            CollectiveKind::Create => self.resolve_create(&pending),
            CollectiveKind::Split => self.resolve_split(&pending),
        };
        outcomes.sort_by_key(|(rank, _)| *rank);

        tracing::debug!(%key, ids = ?global_ids, participants = outcomes.len(), "resolved collective");
        Resolution {
            key,
            global_ids,
            outcomes,
        }
    }

    fn resolve_dup(&mut self, pending: &PendingCollective) -> (Vec<CommId>, Vec<(Rank, Option<Rc<Communicator>>)>) {
        let id = self.allocate();
        let group = Rc::clone(&pending.parent_group);
        self.record(id, CommKind::Dup, pending.key.parent, &group, None);

        let outcomes = pending
            .contributions
            .iter()
            .map(|c| {
                let comm = new_comm(id, &group, c, CommKind::Dup, None, c.parent_local_rank());
                (c.rank, Some(comm))
            })
            .collect();
        (vec![id], outcomes)
    }

    fn resolve_create(&mut self, pending: &PendingCollective) -> (Vec<CommId>, Vec<(Rank, Option<Rc<Communicator>>)>) {
        let group = match pending.contributions.first().map(|c| &c.data) {
            Some(ContributionData::Create { group }) => Rc::clone(group),
            _ => self.groups.empty(),
        };
        if group.members.is_empty() {
            let outcomes = pending.contributions.iter().map(|c| (c.rank, None)).collect();
            return (Vec::new(), outcomes);
        }

        let id = self.allocate();
        self.record(id, CommKind::Create, pending.key.parent, &group, None);

        let outcomes = pending
            .contributions
            .iter()
            .map(|c| {
                let comm = group
                    .local_rank_of(c.rank)
                    .map(|local| new_comm(id, &group, c, CommKind::Create, None, local));
                (c.rank, comm)
            })
            .collect();
        (vec![id], outcomes)
    }

    fn resolve_split(&mut self, pending: &PendingCollective) -> (Vec<CommId>, Vec<(Rank, Option<Rc<Communicator>>)>) {
        let mut by_color: BTreeMap<Color, Vec<(&Contribution, Key)>> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(pending.contributions.len());

        for c in &pending.contributions {
            if let ContributionData::Split { color, key } = c.data {
                if color.is_undefined() {
                    outcomes.push((c.rank, None));
                } else {
                    by_color.entry(color).or_default().push((c, key));
                }
            }
        }

        let mut global_ids = Vec::with_capacity(by_color.len());
        for (color, mut members) in by_color {
            // Ties on key fall back to the rank's position in the parent
            members.sort_by_key(|(c, key)| (*key, c.parent_local_rank()));
            let group = self
                .groups
                .intern(members.iter().map(|(c, _)| c.rank).collect());
            let id = self.allocate();
            self.record(id, CommKind::Split, pending.key.parent, &group, Some(color.0));
            global_ids.push(id);

            for (local, (c, key)) in members.into_iter().enumerate() {
                let comm = new_comm(id, &group, c, CommKind::Split, Some((color, key)), local);
                outcomes.push((c.rank, Some(comm)));
            }
        }
        (global_ids, outcomes)
    }
}

fn new_comm(
    id: CommId,
    group: &Rc<Group>,
    contribution: &Contribution,
    kind: CommKind,
    split: Option<(Color, Key)>,
    local_rank: usize,
) -> Rc<Communicator> {
    Rc::new(Communicator {
        global_id: id,
        group: Rc::clone(group),
        parent: Rc::downgrade(&contribution.parent),
        kind,
        split,
        local_rank,
        world_rank: contribution.rank,
        name: RefCell::new(None),
    })
}
