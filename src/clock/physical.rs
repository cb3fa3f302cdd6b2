// Adjustable-offset physical clock
//
// adjusted_time = system_time + offset. The offset is the only mutable
// piece and is persisted to the node state file so restarts keep the
// last-known adjustment.

use crate::error::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

const NODE_STATE_FILE: &str = "node_state.bin";

// Persisted per-node state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeState {
    offset_ms: i64,
}

pub struct PhysicalClock {
    offset_ms: AtomicI64,
    state_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl PhysicalClock {
    /// In-memory clock with a zero offset.
    pub fn new() -> Self {
        Self {
            offset_ms: AtomicI64::new(0),
            state_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Clock backed by `<data_dir>/node_state.bin`. A previously persisted
    /// offset is restored; a missing or unreadable state file starts at
    /// zero.
    pub fn with_state_dir(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join(NODE_STATE_FILE);
        let offset = match load_state(&path) {
            Ok(Some(state)) => {
                tracing::info!("restored physical clock offset of {} ms", state.offset_ms);
                state.offset_ms
            }
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!("could not read node state {}: {}", path.display(), e);
                0
            }
        };
        Self {
            offset_ms: AtomicI64::new(offset),
            state_path: Some(path),
            persist_lock: Mutex::new(()),
        }
    }

    /// Wall-clock milliseconds adjusted by the current offset.
    pub fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis() + self.offset_ms.load(Ordering::SeqCst)
    }

    pub fn offset_millis(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Apply a signed adjustment to the offset and persist the new value.
    pub fn adjust(&self, delta_ms: i64) {
        let new_offset = self.offset_ms.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms;
        tracing::debug!("physical clock adjusted by {} ms to offset {} ms", delta_ms, new_offset);
        if let Err(e) = self.persist(new_offset) {
            tracing::warn!("failed to persist clock offset: {}", e);
        }
    }

    fn persist(&self, offset_ms: i64) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock();
        let bytes = bincode::serde::encode_to_vec(
            NodeState { offset_ms },
            bincode::config::standard(),
        )?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for PhysicalClock {
    fn default() -> Self {
        Self::new()
    }
}

fn load_state(path: &Path) -> Result<Option<NodeState>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let (state, _) =
        bincode::serde::decode_from_slice::<NodeState, _>(&bytes, bincode::config::standard())?;
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_moves_reported_time() {
        let clock = PhysicalClock::new();
        let before = clock.now_millis();
        clock.adjust(5_000);
        let after = clock.now_millis();
        assert!(after >= before + 4_900);
        assert_eq!(clock.offset_millis(), 5_000);

        clock.adjust(-2_000);
        assert_eq!(clock.offset_millis(), 3_000);
    }

    #[test]
    fn test_offset_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let clock = PhysicalClock::with_state_dir(dir.path());
            clock.adjust(-1234);
        }
        let clock = PhysicalClock::with_state_dir(dir.path());
        assert_eq!(clock.offset_millis(), -1234);
    }
}
