//! Group algebra and the global group table.
//!
//! Group constructors are local in MPI, so every derivation here is computed
//! immediately from the membership of already-resolved input groups. The
//! result is interned in a [`GroupTable`] shared by all ranks: two ranks that
//! derive the same ordered membership get the same global id and the same
//! reference-counted [`Group`].

use crate::error::GroupError;
use crate::types::{Group, GroupId, Rank};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Members of `a` followed by members of `b` not already in `a`
pub fn union(a: &[Rank], b: &[Rank]) -> Vec<Rank> {
    let mut out = a.to_vec();
    let seen: HashSet<Rank> = a.iter().copied().collect();
    out.extend(b.iter().copied().filter(|m| !seen.contains(m)));
    out
}

/// Members of `a` that are also in `b`, in `a`'s order
pub fn intersection(a: &[Rank], b: &[Rank]) -> Vec<Rank> {
    let other: HashSet<Rank> = b.iter().copied().collect();
    a.iter().copied().filter(|m| other.contains(m)).collect()
}

/// Members of `a` that are not in `b`, in `a`'s order
pub fn difference(a: &[Rank], b: &[Rank]) -> Vec<Rank> {
    let other: HashSet<Rank> = b.iter().copied().collect();
    a.iter().copied().filter(|m| !other.contains(m)).collect()
}

fn check_ranks(members: &[Rank], ranks: &[i32]) -> Result<(), GroupError> {
    let mut seen = HashSet::new();
    for &r in ranks {
        if r < 0 || r as usize >= members.len() {
            return Err(GroupError::RankOutOfRange {
                rank: r,
                size: members.len(),
            });
        }
        if !seen.insert(r) {
            return Err(GroupError::DuplicateRank(r));
        }
    }
    Ok(())
}

/// `new[i] = members[ranks[i]]`
pub fn include(members: &[Rank], ranks: &[i32]) -> Result<Vec<Rank>, GroupError> {
    check_ranks(members, ranks)?;
    Ok(ranks.iter().map(|&r| members[r as usize]).collect())
}

/// `members` without the listed local ranks, order preserved
pub fn exclude(members: &[Rank], ranks: &[i32]) -> Result<Vec<Rank>, GroupError> {
    check_ranks(members, ranks)?;
    let dropped: HashSet<usize> = ranks.iter().map(|&r| r as usize).collect();
    Ok(members
        .iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, &m)| m)
        .collect())
}

/// Expand `(first, last, stride)` triples into an explicit rank list
pub fn expand_ranges(ranges: &[[i32; 3]], size: usize) -> Result<Vec<i32>, GroupError> {
    let mut out = Vec::new();
    for &[first, last, stride] in ranges {
        if stride == 0 {
            return Err(GroupError::ZeroStride);
        }
        for bound in [first, last] {
            if bound < 0 || bound as usize >= size {
                return Err(GroupError::RankOutOfRange { rank: bound, size });
            }
        }
        let mut next = Some(first);
        while let Some(r) = next {
            if (stride > 0 && r > last) || (stride < 0 && r < last) {
                break;
            }
            out.push(r);
            next = r.checked_add(stride);
        }
    }
    Ok(out)
}

pub fn range_include(members: &[Rank], ranges: &[[i32; 3]]) -> Result<Vec<Rank>, GroupError> {
    let ranks = expand_ranges(ranges, members.len())?;
    include(members, &ranks)
}

pub fn range_exclude(members: &[Rank], ranges: &[[i32; 3]]) -> Result<Vec<Rank>, GroupError> {
    let ranks = expand_ranges(ranges, members.len())?;
    exclude(members, &ranks)
}

/// Run-wide table of resolved groups
#[derive(Debug)]
pub struct GroupTable {
    world: Rc<Group>,
    selves: Vec<Rc<Group>>,
    empty: Rc<Group>,
    interned: HashMap<Vec<Rank>, Rc<Group>>,
    /// Every group in id order
    all: Vec<Rc<Group>>,
}

impl GroupTable {
    pub fn new(nranks: u32) -> Self {
        let world = Rc::new(Group {
            global_id: GroupId(0),
            members: (0..nranks).collect(),
            is_world: true,
            is_self: false,
        });
        let selves: Vec<Rc<Group>> = (0..nranks)
            .map(|r| {
                Rc::new(Group {
                    global_id: GroupId(1 + r),
                    members: vec![r],
                    is_world: false,
                    is_self: true,
                })
            })
            .collect();
        let empty = Rc::new(Group {
            global_id: GroupId(1 + nranks),
            members: Vec::new(),
            is_world: false,
            is_self: false,
        });

        let mut interned = HashMap::new();
        for group in &selves {
            interned.insert(group.members.clone(), Rc::clone(group));
        }
        // A one-rank world shares its membership with self; world wins
        interned.insert(world.members.clone(), Rc::clone(&world));
        interned.insert(Vec::new(), Rc::clone(&empty));

        let mut all = vec![Rc::clone(&world)];
        all.extend(selves.iter().cloned());
        all.push(Rc::clone(&empty));

        Self {
            world,
            selves,
            empty,
            interned,
            all,
        }
    }

    pub fn world(&self) -> Rc<Group> {
        Rc::clone(&self.world)
    }

    pub fn self_of(&self, rank: Rank) -> Option<Rc<Group>> {
        self.selves.get(rank as usize).cloned()
    }

    pub fn empty(&self) -> Rc<Group> {
        Rc::clone(&self.empty)
    }

    /// Shared group for `members`, assigning the next id on first sight
    pub fn intern(&mut self, members: Vec<Rank>) -> Rc<Group> {
        if let Some(existing) = self.interned.get(&members) {
            return Rc::clone(existing);
        }
        let group = Rc::new(Group {
            global_id: GroupId(self.all.len() as u32),
            members: members.clone(),
            is_world: false,
            is_self: false,
        });
        tracing::trace!(id = %group.global_id, size = group.size(), "interned group");
        self.interned.insert(members, Rc::clone(&group));
        self.all.push(Rc::clone(&group));
        group
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Group>> {
        self.all.iter()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let a = [0, 2, 4, 6];
        let b = [6, 1, 2];
        assert_eq!(union(&a, &b), vec![0, 2, 4, 6, 1]);
        assert_eq!(intersection(&a, &b), vec![2, 6]);
        assert_eq!(difference(&a, &b), vec![0, 4]);
        assert_eq!(intersection(&b, &a), vec![6, 2]);
    }

    #[test]
    fn test_include_exclude() {
        let members = [10, 11, 12, 13];
        assert_eq!(include(&members, &[3, 0]), Ok(vec![13, 10]));
        assert_eq!(exclude(&members, &[1, 2]), Ok(vec![10, 13]));
        assert_eq!(
            include(&members, &[4]),
            Err(GroupError::RankOutOfRange { rank: 4, size: 4 })
        );
        assert_eq!(
            exclude(&members, &[1, 1]),
            Err(GroupError::DuplicateRank(1))
        );
    }

    #[test]
    fn test_ranges() {
        let members: Vec<Rank> = (0..10).collect();
        assert_eq!(expand_ranges(&[[0, 6, 3]], 10), Ok(vec![0, 3, 6]));
        assert_eq!(expand_ranges(&[[7, 1, -3]], 10), Ok(vec![7, 4, 1]));
        assert_eq!(expand_ranges(&[[1, 1, 5]], 10), Ok(vec![1]));
        assert_eq!(range_include(&members, &[[5, 5, i32::MAX]]), Ok(vec![5]));
        assert_eq!(expand_ranges(&[[4, 4, i32::MIN]], 10), Ok(vec![4]));
        assert_eq!(expand_ranges(&[[0, 3, 0]], 10), Err(GroupError::ZeroStride));
        assert_eq!(
            range_include(&members, &[[8, 9, 1], [0, 0, 1]]),
            Ok(vec![8, 9, 0])
        );
        assert_eq!(
            range_exclude(&members, &[[0, 9, 2]]),
            Ok(vec![1, 3, 5, 7, 9])
        );
        // Overlapping ranges name a rank twice
        assert_eq!(
            range_include(&members, &[[0, 4, 2], [4, 5, 1]]),
            Err(GroupError::DuplicateRank(4))
        );
    }

    #[test]
    fn test_table_interning() {
        let mut table = GroupTable::new(4);
        assert_eq!(table.world().global_id, GroupId(0));
        assert_eq!(table.self_of(2).unwrap().global_id, GroupId(3));
        assert_eq!(table.empty().global_id, GroupId(5));

        let a = table.intern(vec![0, 2]);
        let b = table.intern(vec![0, 2]);
        let c = table.intern(vec![2, 0]);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.global_id, GroupId(6));
        assert_eq!(c.global_id, GroupId(7));
        assert!(Rc::ptr_eq(&table.intern(vec![0, 1, 2, 3]), &table.world()));
        assert!(Rc::ptr_eq(&table.intern(Vec::new()), &table.empty()));
        for r in 0..4 {
            assert!(Rc::ptr_eq(&table.intern(vec![r]), &table.self_of(r).unwrap()));
        }
        assert_eq!(table.len(), 8);

        let mut single = GroupTable::new(1);
        assert!(Rc::ptr_eq(&single.intern(vec![0]), &single.world()));
        assert_eq!(single.len(), 3);
    }
}
