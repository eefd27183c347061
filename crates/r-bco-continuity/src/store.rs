//! ---
//! bco_section: "04-failover-orchestration"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Failover planning, execution, verification, simulation and audit."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use r_bco_common::time::SharedClock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auditor::AuditPack;
use crate::error::{ContinuityError, Result};

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub recorded_at: DateTime<Utc>,
    pub plan_id: String,
    pub pack: AuditPack,
    /// SHA-256 of this record's contents and the previous hash.
    pub hash: String,
    pub previous_hash: String,
}

impl AuditRecord {
    fn compute_hash(
        recorded_at: DateTime<Utc>,
        plan_id: &str,
        pack: &AuditPack,
        previous_hash: &str,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(
            recorded_at
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(plan_id.as_bytes());
        hasher.update(serde_json::to_vec(pack)?);
        hasher.update(previous_hash.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Append-only audit trail stored as newline-delimited JSON with a hash chain.
#[derive(Debug, Clone)]
pub struct AuditStore {
    path: PathBuf,
    clock: SharedClock,
    last_hash: String,
}

impl AuditStore {
    /// Opens the trail at `path`, loading the head hash from existing records.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let last_hash = read_records(&path)?
            .last()
            .map(|record| record.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_owned());
        Ok(Self {
            path,
            clock,
            last_hash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, pack: &AuditPack) -> Result<AuditRecord> {
        let recorded_at = self.clock.now();
        let plan_id = pack.plan_id().to_owned();
        let hash = AuditRecord::compute_hash(recorded_at, &plan_id, pack, &self.last_hash)?;
        let record = AuditRecord {
            recorded_at,
            plan_id,
            pack: pack.clone(),
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| ContinuityError::io(parent, err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| ContinuityError::io(&self.path, err))?;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|err| ContinuityError::io(&self.path, err))?;
        self.last_hash = hash;
        debug!(path = %self.path.display(), plan = %record.plan_id, "appended audit record");
        Ok(record)
    }

    pub fn entries(&self) -> Result<Vec<AuditRecord>> {
        read_records(&self.path)
    }

    /// Most recent record for `plan_id`.
    pub fn find(&self, plan_id: &str) -> Result<Option<AuditRecord>> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .find(|record| record.plan_id == plan_id))
    }

    /// Recomputes the hash chain; false when any record was altered, removed
    /// or reordered.
    pub fn verify(&self) -> Result<bool> {
        let mut previous = GENESIS_HASH.to_owned();
        for record in self.entries()? {
            if record.previous_hash != previous {
                return Ok(false);
            }
            let expected = AuditRecord::compute_hash(
                record.recorded_at,
                &record.plan_id,
                &record.pack,
                &previous,
            )?;
            if expected != record.hash {
                return Ok(false);
            }
            previous = record.hash;
        }
        Ok(true)
    }
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).map_err(|err| ContinuityError::io(path, err))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| ContinuityError::io(path, err))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
