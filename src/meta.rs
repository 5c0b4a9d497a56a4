//! Run metadata: how many ranks were traced and where their streams live.

use crate::codec::TraceFile;
use crate::error::{CodecError, MetaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    pub numprocs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// One path per rank, in rank order; relative paths are resolved against the metadata file
    pub files: Vec<PathBuf>,
}

impl TraceMeta {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            numprocs: files.len(),
            hostname: None,
            start_time: None,
            files,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut meta: TraceMeta = serde_json::from_str(&content)?;
        if meta.files.len() != meta.numprocs {
            return Err(MetaError::RankCountMismatch {
                numprocs: meta.numprocs,
                files: meta.files.len(),
            });
        }
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for file in &mut meta.files {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        Ok(meta)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MetaError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Open every rank's trace, in rank order
    pub fn open_traces(&self) -> Result<Vec<TraceFile>, (usize, CodecError)> {
        self.files
            .iter()
            .enumerate()
            .map(|(rank, path)| TraceFile::open(path).map_err(|e| (rank, e)))
            .collect()
    }
}
