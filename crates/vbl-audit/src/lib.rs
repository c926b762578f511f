//! Append-only audit log: JSON Lines, one event per line.
//!
//! Each line is the canonical rendering (via
//! [`vbl_domain::canonical::canonical_json`]) of an [`AuditLine`]: the
//! event plus sink bookkeeping. With chaining enabled, every line carries
//! a hash that binds together its sequence number, the previous line's
//! hash and the event content, so any edit, reorder, or deletion inside
//! the file breaks verification at the first affected line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use vbl_domain::canonical::canonical_json;
use vbl_domain::EventRecord;
use vbl_store::{EventsRepo, InMemoryEventsRepo, StoreError};

/// Domain separator baked into every chain hash, so an audit hash can
/// never collide with a hash of the same bytes produced elsewhere.
const CHAIN_TAG: &[u8] = b"vbl-audit-chain/1";

// ---------------------------------------------------------------------------
// AuditLine
// ---------------------------------------------------------------------------

/// One persisted log line: the event plus sink-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLine {
    /// Monotonic per-log sequence number, starting at 0.
    pub seq: u64,
    #[serde(flatten)]
    pub event: EventRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_self: Option<String>,
}

/// Chain hash for one line: SHA-256 over the domain tag, the sequence
/// number, the previous hash (empty for the first line) and the event's
/// canonical JSON. Binding `seq` into the digest means a verifier catches
/// renumbering even when the event bytes are untouched.
fn chain_hash(seq: u64, prev: Option<&str>, event_canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CHAIN_TAG);
    hasher.update(seq.to_be_bytes());
    hasher.update([0u8]);
    hasher.update(prev.unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(event_canonical.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// AuditWriter
// ---------------------------------------------------------------------------

/// Append-only JSONL writer. Not internally synchronized; wrap in a lock
/// when shared ([`JsonlEventsRepo`] does).
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Restore chain state when resuming an existing log after restart:
    /// pass the number of lines already written and the last line's
    /// `hash_self`.
    pub fn resume(&mut self, seq: u64, last_hash: Option<String>) {
        self.seq = seq;
        self.last_hash = last_hash;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event.
    pub fn append(&mut self, event: &EventRecord) -> Result<AuditLine> {
        let mut line = AuditLine {
            seq: self.seq,
            event: event.clone(),
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            let event_canonical = canonical_json(event).context("canonicalize audit event")?;
            let hash = chain_hash(line.seq, self.last_hash.as_deref(), &event_canonical);
            line.hash_prev = self.last_hash.clone();
            line.hash_self = Some(hash.clone());
            self.last_hash = Some(hash);
        }
        self.seq += 1;

        let rendered = canonical_json(&line).context("canonicalize audit line")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {:?}", self.path))?;
        file.write_all(format!("{rendered}\n").as_bytes())
            .context("append audit line")?;

        Ok(line)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Result of walking a log's hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL content.
///
/// Three faults are detected, each reported at the first line where it
/// appears: a sequence gap, a parent-hash mismatch against the preceding
/// line, and a recorded hash that no longer matches the line's content.
/// Logs written without chaining (no hash fields anywhere) verify as
/// valid; a chained log that *loses* its hashes mid-file does not.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut expected_seq = 0u64;
    let mut prev_hash: Option<String> = None;
    let mut chained = false;
    let mut count = 0usize;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line: AuditLine = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit line {line_no}"))?;
        count += 1;

        if line.seq != expected_seq {
            return Ok(VerifyResult::Broken {
                line: line_no,
                reason: format!("sequence gap: found seq {}, expected {expected_seq}", line.seq),
            });
        }
        expected_seq += 1;

        match &line.hash_self {
            Some(recorded) => {
                chained = true;
                if line.hash_prev != prev_hash {
                    return Ok(VerifyResult::Broken {
                        line: line_no,
                        reason: "parent hash does not match the preceding line".to_string(),
                    });
                }
                let event_canonical = canonical_json(&line.event)
                    .with_context(|| format!("canonicalize event at line {line_no}"))?;
                let recomputed = chain_hash(line.seq, prev_hash.as_deref(), &event_canonical);
                if *recorded != recomputed {
                    return Ok(VerifyResult::Broken {
                        line: line_no,
                        reason: "recorded hash differs from recomputed content hash".to_string(),
                    });
                }
                prev_hash = Some(recorded.clone());
            }
            None if chained => {
                return Ok(VerifyResult::Broken {
                    line: line_no,
                    reason: "chained log is missing its hash from this line on".to_string(),
                });
            }
            None => {}
        }
    }

    Ok(VerifyResult::Valid { lines: count })
}

/// Parse a log back into its events (chronological order as written).
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<EventRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    let mut out = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line: AuditLine = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit line {}", idx + 1))?;
        out.push(line.event);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// JsonlEventsRepo
// ---------------------------------------------------------------------------

/// [`EventsRepo`] that tees every append into the durable JSONL sink and
/// an in-memory index for queries. Writers serialize on the internal lock.
pub struct JsonlEventsRepo {
    writer: Mutex<AuditWriter>,
    index: InMemoryEventsRepo,
}

impl JsonlEventsRepo {
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(AuditWriter::new(path, hash_chain)?),
            index: InMemoryEventsRepo::new(),
        })
    }
}

impl EventsRepo for JsonlEventsRepo {
    fn append(&self, event: EventRecord) -> Result<(), StoreError> {
        {
            let mut w = self.writer.lock().expect("audit writer lock poisoned");
            w.append(&event).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        self.index.append(event)
    }

    fn list_by_trace(&self, trace_id: &str) -> Vec<EventRecord> {
        self.index.list_by_trace(trace_id)
    }

    fn list_for_position(&self, position_id: &str) -> Vec<EventRecord> {
        self.index.list_for_position(position_id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
