//! Time-bounded handle tables for one rank.
//!
//! A traced MPI library reuses small integer handles once the object behind
//! them is freed, so each handle maps to a list of lifetime entries ordered by
//! creation tick. Entries are closed, never removed: the second pass still has
//! to answer "what did handle H mean at tick T" for every call.

use crate::error::HandleError;
use crate::types::{Datatype, Handle, Tick};
use std::collections::HashMap;

/// One lifetime of a handle
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub handle: Handle,
    pub created: Tick,
    pub freed: Option<Tick>,
    pub payload: T,
}

impl<T> Entry<T> {
    pub fn is_open(&self) -> bool {
        self.freed.is_none()
    }

    /// Coverage includes the freeing call itself
    pub fn covers(&self, at: Tick) -> bool {
        self.created <= at && self.freed.is_none_or(|freed| at <= freed)
    }
}

/// Payloads that carry a commit point
pub trait Committable {
    fn mark_committed(&mut self, at: Tick);
}

impl Committable for Datatype {
    fn mark_committed(&mut self, at: Tick) {
        self.committed = Some(at);
    }
}

#[derive(Debug, Clone)]
pub struct HandleRegistry<T> {
    entries: HashMap<Handle, Vec<Entry<T>>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new lifetime for `handle` starting at `at`
    pub fn create(&mut self, handle: Handle, payload: T, at: Tick) -> Result<(), HandleError> {
        let list = self.entries.entry(handle).or_default();
        if let Some(last) = list.last() {
            if last.is_open() {
                return Err(HandleError::HandleStillActive(handle));
            }
            if let Some(freed) = last.freed {
                if at <= freed {
                    return Err(HandleError::HandleStillActive(handle));
                }
            }
        }
        list.push(Entry {
            handle,
            created: at,
            freed: None,
            payload,
        });
        Ok(())
    }

    /// Seed a handle that exists before the first record (tick 0)
    pub fn predefine(&mut self, handle: Handle, payload: T) {
        self.entries.insert(
            handle,
            vec![Entry {
                handle,
                created: Tick::ORIGIN,
                freed: None,
                payload,
            }],
        );
    }

    /// Close the most recent lifetime of `handle`
    pub fn close(&mut self, handle: Handle, at: Tick) -> Result<(), HandleError> {
        let last = self
            .entries
            .get_mut(&handle)
            .and_then(|list| list.last_mut())
            .ok_or(HandleError::HandleNotFound(handle))?;
        if !last.is_open() {
            return Err(HandleError::AlreadyClosed(handle));
        }
        last.freed = Some(at);
        Ok(())
    }

    pub fn get_active(&self, handle: Handle) -> Result<&T, HandleError> {
        self.latest_open(handle).map(|entry| &entry.payload)
    }

    pub fn get_active_mut(&mut self, handle: Handle) -> Result<&mut T, HandleError> {
        match self.entries.get_mut(&handle).and_then(|list| list.last_mut()) {
            Some(entry) if entry.is_open() => Ok(&mut entry.payload),
            _ => Err(HandleError::HandleNotActive(handle)),
        }
    }

    /// Payload of the entry for `handle` that covers tick `at`
    pub fn get_at(&self, handle: Handle, at: Tick) -> Result<&T, HandleError> {
        self.entry_at(handle, at).map(|entry| &entry.payload)
    }

    pub fn entry_at(&self, handle: Handle, at: Tick) -> Result<&Entry<T>, HandleError> {
        let list = self
            .entries
            .get(&handle)
            .ok_or(HandleError::NoEntryAtTime { handle, at })?;
        // Entries are sorted by creation tick; the candidate is the last one created at or before `at`
        let idx = list.partition_point(|entry| entry.created <= at);
        match idx.checked_sub(1).map(|i| &list[i]) {
            Some(entry) if entry.covers(at) => Ok(entry),
            _ => Err(HandleError::NoEntryAtTime { handle, at }),
        }
    }

    /// All lifetimes recorded for `handle`, oldest first
    pub fn history(&self, handle: Handle) -> &[Entry<T>] {
        self.entries.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.keys().copied()
    }

    /// Number of lifetimes across all handles
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lifetimes not yet closed
    pub fn open_count(&self) -> usize {
        self.entries
            .values()
            .filter(|list| list.last().is_some_and(Entry::is_open))
            .count()
    }

    fn latest_open(&self, handle: Handle) -> Result<&Entry<T>, HandleError> {
        match self.entries.get(&handle).and_then(|list| list.last()) {
            Some(entry) if entry.is_open() => Ok(entry),
            _ => Err(HandleError::HandleNotActive(handle)),
        }
    }
}

impl<T: Committable> HandleRegistry<T> {
    /// Record the commit point of the most recent lifetime of `handle`
    pub fn commit(&mut self, handle: Handle, at: Tick) -> Result<(), HandleError> {
        let last = self
            .entries
            .get_mut(&handle)
            .and_then(|list| list.last_mut())
            .ok_or(HandleError::HandleNotFound(handle))?;
        if !last.is_open() {
            return Err(HandleError::HandleClosed(handle));
        }
        last.payload.mark_committed(at);
        Ok(())
    }
}
