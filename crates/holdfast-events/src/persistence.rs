//! Storage boundary for events and snapshots.
//!
//! The store is agnostic to the concrete backend. Two implementations
//! ship with the crate: in-memory (tests, ephemeral runs) and file-backed
//! (one JSON document per line for events, one file per snapshot).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use holdfast_types::Event;

use crate::error::PersistenceError;
use crate::snapshot::Snapshot;

/// Append-only event sink.
///
/// Position `n` in the log holds the event with sequence `n`.
pub trait EventLog: Send {
    /// Persist `event` at the end of the log.
    fn append(&mut self, event: &Event) -> Result<(), PersistenceError>;

    /// Events with sequence in `from..=to`, in order.
    ///
    /// Stops at the end of the log. An undecodable record fails the whole
    /// read with [`PersistenceError::Corrupt`] naming its position.
    fn read_range(&self, from: u64, to: u64) -> Result<Vec<Event>, PersistenceError>;

    /// Number of records in the log.
    fn len(&self) -> Result<u64, PersistenceError>;

    /// Whether the log holds no records.
    fn is_empty(&self) -> Result<bool, PersistenceError> {
        Ok(self.len()? == 0)
    }

    /// The final record, if any.
    fn last(&self) -> Result<Option<Event>, PersistenceError> {
        let len = self.len()?;
        let Some(position) = len.checked_sub(1) else {
            return Ok(None);
        };
        Ok(self.read_range(position, position)?.pop())
    }
}

/// Snapshot sink.
pub trait SnapshotStore: Send {
    /// Persist `snapshot`, replacing any snapshot for the same tick.
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// The snapshot with the greatest tick `<= tick`.
    fn latest_at_or_before(&self, tick: u64) -> Result<Option<Snapshot>, PersistenceError>;
}

fn to_index(position: u64) -> Result<usize, PersistenceError> {
    usize::try_from(position).map_err(|err| PersistenceError::Corrupt {
        position,
        detail: err.to_string(),
    })
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Event log held in memory.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemoryEventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn edit<F: FnOnce(&mut Vec<Event>)>(&self, edit: F) {
        if let Ok(mut events) = self.events.lock() {
            edit(&mut events);
        }
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::Io {
        source: std::io::Error::other("memory log lock poisoned"),
    }
}

impl EventLog for MemoryEventLog {
    fn append(&mut self, event: &Event) -> Result<(), PersistenceError> {
        let Ok(mut events) = self.events.lock() else {
            return Err(poisoned());
        };
        events.push(event.clone());
        Ok(())
    }

    fn read_range(&self, from: u64, to: u64) -> Result<Vec<Event>, PersistenceError> {
        let Ok(events) = self.events.lock() else {
            return Err(poisoned());
        };
        let start = to_index(from)?;
        let end = to_index(to)?.saturating_add(1).min(events.len());
        Ok(events.get(start..end).map(<[Event]>::to_vec).unwrap_or_default())
    }

    fn len(&self) -> Result<u64, PersistenceError> {
        let Ok(events) = self.events.lock() else {
            return Err(poisoned());
        };
        Ok(u64::try_from(events.len()).unwrap_or(u64::MAX))
    }
}

/// Snapshot store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: BTreeMap<u64, Snapshot>,
}

impl MemorySnapshotStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.snapshots.insert(snapshot.tick, snapshot.clone());
        Ok(())
    }

    fn latest_at_or_before(&self, tick: u64) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self
            .snapshots
            .range(..=tick)
            .next_back()
            .map(|(_, snapshot)| snapshot.clone()))
    }
}

// ---------------------------------------------------------------------------
// JSON lines
// ---------------------------------------------------------------------------

/// Event log stored as one JSON document per line.
///
/// Reopening an existing file counts its lines to recover the length.
/// Writes are flushed after every append.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    writer: BufWriter<File>,
    len: u64,
}

impl JsonlEventLog {
    /// Open or create the log at `path`.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = count_lines(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            len,
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn count_lines(path: &Path) -> Result<u64, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut count: u64 = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count = count.saturating_add(1);
        }
    }
    Ok(count)
}

impl EventLog for JsonlEventLog {
    fn append(&mut self, event: &Event) -> Result<(), PersistenceError> {
        let line = serde_json::to_string(event)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.len = self.len.saturating_add(1);
        Ok(())
    }

    fn read_range(&self, from: u64, to: u64) -> Result<Vec<Event>, PersistenceError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        let mut position: u64 = 0;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if position > to {
                break;
            }
            if position >= from {
                let event = serde_json::from_str(&line).map_err(|err| {
                    PersistenceError::Corrupt {
                        position,
                        detail: err.to_string(),
                    }
                })?;
                events.push(event);
            }
            position = position.saturating_add(1);
        }
        Ok(events)
    }

    fn len(&self) -> Result<u64, PersistenceError> {
        Ok(self.len)
    }
}

/// Snapshot store writing one JSON file per snapshot into a directory.
#[derive(Debug, Clone)]
pub struct DirectorySnapshotStore {
    dir: PathBuf,
}

const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_SUFFIX: &str = ".json";

impl DirectorySnapshotStore {
    /// Open or create the snapshot directory.
    pub fn open(dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn file_for(&self, tick: u64) -> PathBuf {
        self.dir
            .join(format!("{SNAPSHOT_PREFIX}{tick:020}{SNAPSHOT_SUFFIX}"))
    }

    fn ticks(&self) -> Result<Vec<u64>, PersistenceError> {
        let mut ticks = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(tick) = name
                .strip_prefix(SNAPSHOT_PREFIX)
                .and_then(|rest| rest.strip_suffix(SNAPSHOT_SUFFIX))
                .and_then(|digits| digits.parse::<u64>().ok())
            {
                ticks.push(tick);
            }
        }
        ticks.sort_unstable();
        Ok(ticks)
    }
}

impl SnapshotStore for DirectorySnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let target = self.file_for(snapshot.tick);
        let staging = target.with_extension("json.tmp");
        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &target)?;
        Ok(())
    }

    fn latest_at_or_before(&self, tick: u64) -> Result<Option<Snapshot>, PersistenceError> {
        let Some(found) = self.ticks()?.into_iter().rev().find(|t| *t <= tick) else {
            return Ok(None);
        };
        let bytes = fs::read(self.file_for(found))?;
        let snapshot = serde_json::from_slice(&bytes).map_err(|err| PersistenceError::Corrupt {
            position: found,
            detail: err.to_string(),
        })?;
        Ok(Some(snapshot))
    }
}
