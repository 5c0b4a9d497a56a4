//! Aggregate call statistics.
//!
//! Calls are binned by matching their MPI function name against user
//! supplied `NAME=REGEX` pairs. The first matching bin wins; calls matching no
//! bin land in `other`. Without bins every function gets a bin of its own.

use crate::emitter::{EventSink, ResolvedCall};
use crate::error::SinkError;
use crate::types::{ClockTime, CommId, Rank};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Name of the catch-all bin when explicit bins are configured
pub const OTHER_BIN: &str = "other";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BinStats {
    pub calls: u64,
    pub wall_seconds: f64,
    pub bytes: u64,
}

impl BinStats {
    fn add(&mut self, seconds: f64, bytes: u64) {
        self.calls += 1;
        self.wall_seconds += seconds;
        self.bytes += bytes;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinRow {
    pub name: String,
    #[serde(flatten)]
    pub stats: BinStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommRow {
    pub id: CommId,
    pub calls: u64,
}

/// Everything a [`StatsSink`] collected
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_calls: u64,
    pub total_bytes: u64,
    pub bins: Vec<BinRow>,
    pub per_rank: Vec<BinStats>,
    pub communicators: Vec<CommRow>,
}

pub struct StatsSink {
    bins: Vec<(String, Regex)>,
    totals: BTreeMap<String, BinStats>,
    per_rank: Vec<BinStats>,
    per_comm: BTreeMap<CommId, u64>,
}

impl StatsSink {
    pub fn new(bins: &[(String, String)]) -> Result<Self, regex::Error> {
        let bins = bins
            .iter()
            .map(|(name, pattern)| Ok((name.clone(), Regex::new(pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            bins,
            totals: BTreeMap::new(),
            per_rank: Vec::new(),
            per_comm: BTreeMap::new(),
        })
    }

    fn bin_for(&self, function: &str) -> String {
        if self.bins.is_empty() {
            return function.to_string();
        }
        self.bins
            .iter()
            .find(|(_, re)| re.is_match(function))
            .map_or_else(|| OTHER_BIN.to_string(), |(name, _)| name.clone())
    }

    pub fn report(&self) -> StatsReport {
        let mut bins: Vec<BinRow> = self
            .totals
            .iter()
            .map(|(name, stats)| BinRow {
                name: name.clone(),
                stats: stats.clone(),
            })
            .collect();
        // Configured bins keep their command-line order
        if !self.bins.is_empty() {
            let position = |name: &str| {
                self.bins
                    .iter()
                    .position(|(n, _)| n == name)
                    .unwrap_or(self.bins.len())
            };
            bins.sort_by_key(|row| position(&row.name));
        }

        StatsReport {
            total_calls: self.totals.values().map(|s| s.calls).sum(),
            total_bytes: self.totals.values().map(|s| s.bytes).sum(),
            bins,
            per_rank: self.per_rank.clone(),
            communicators: self
                .per_comm
                .iter()
                .map(|(&id, &calls)| CommRow { id, calls })
                .collect(),
        }
    }
}

impl EventSink for StatsSink {
    fn emit(
        &mut self,
        rank: Rank,
        start: Option<ClockTime>,
        stop: Option<ClockTime>,
        call: &ResolvedCall<'_>,
    ) -> Result<(), SinkError> {
        let seconds = match (start, stop) {
            (Some(start), Some(stop)) => (stop.as_secs_f64() - start.as_secs_f64()).max(0.0),
            _ => 0.0,
        };
        let bytes = call.payload_bytes().unwrap_or(0);

        let bin = self.bin_for(call.record.call.name());
        self.totals.entry(bin).or_default().add(seconds, bytes);

        let idx = rank as usize;
        if self.per_rank.len() <= idx {
            self.per_rank.resize(idx + 1, BinStats::default());
        }
        self.per_rank[idx].add(seconds, bytes);

        if let Some(comm) = call.communicator() {
            *self.per_comm.entry(comm).or_default() += 1;
        }
        Ok(())
    }
}
