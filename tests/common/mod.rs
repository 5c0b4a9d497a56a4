//! Builders for synthetic multi-rank runs

#![allow(dead_code)]

use mpitrace::codec::{Call, CallRecord, TraceFile, TraceWriter};
use mpitrace::meta::TraceMeta;
use mpitrace::types::{ClockTime, Rank};
use std::path::{Path, PathBuf};

/// Records one rank's calls with increasing wall times
pub struct RankTrace {
    rank: Rank,
    records: Vec<CallRecord>,
}

impl RankTrace {
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            records: Vec::new(),
        }
    }

    pub fn call(mut self, call: Call) -> Self {
        let t = self.records.len() as u32;
        let record = CallRecord::new(call)
            .with_wall(ClockTime::new(t, 0), ClockTime::new(t, 250_000_000))
            .with_thread(0);
        self.records.push(record);
        self
    }

    pub fn calls(self, calls: impl IntoIterator<Item = Call>) -> Self {
        calls.into_iter().fold(self, RankTrace::call)
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut writer = TraceWriter::new(Vec::new(), self.rank).unwrap();
        for record in &self.records {
            writer.write(record).unwrap();
        }
        writer.into_inner().unwrap()
    }

    pub fn file(&self) -> TraceFile {
        TraceFile::from_bytes(self.bytes()).unwrap()
    }
}

/// The same call sequence on every rank, parameterised by rank
pub fn uniform(nranks: u32, calls: impl Fn(Rank) -> Vec<Call>) -> Vec<RankTrace> {
    (0..nranks).map(|r| RankTrace::new(r).calls(calls(r))).collect()
}

pub fn files(ranks: &[RankTrace]) -> Vec<TraceFile> {
    ranks.iter().map(RankTrace::file).collect()
}

/// Write every rank and a metadata file into `dir`
pub fn write_run(dir: &Path, ranks: &[RankTrace]) -> PathBuf {
    let mut names = Vec::new();
    for trace in ranks {
        let name = PathBuf::from(format!("run-{:04}.bin", trace.rank));
        std::fs::write(dir.join(&name), trace.bytes()).unwrap();
        names.push(name);
    }
    let meta_path = dir.join("run.meta.json");
    TraceMeta::new(names).save(&meta_path).unwrap();
    meta_path
}
