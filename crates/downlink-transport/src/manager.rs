//! Process-wide registry of active transactions.
//!
//! Two disjoint id spaces, `tx` for outbound and `rx` for inbound, each
//! bounded at eight entries (tid 0..=7). The manager owns the maps; embed
//! it behind a single lock (or confine it to one task) when shared.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::error::TransportError;
use crate::transaction::{TransState, Transaction};

/// Cap on concurrently active transactions per direction; the wire id is
/// 3 bits.
pub const MAX_TRANSACTIONS: usize = 8;

/// Which of the manager's two id spaces a transaction lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        }
    }
}

/// Aggregate counters for the interactive surface.
#[derive(Debug, Serialize)]
pub struct ManagerStats {
    pub total: usize,
    pub tx_count: usize,
    pub rx_count: usize,
    pub by_state: BTreeMap<&'static str, usize>,
}

/// Registry and id allocator for both transfer directions.
#[derive(Default)]
pub struct TransactionManager {
    tx: BTreeMap<u8, Transaction>,
    rx: BTreeMap<u8, Transaction>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an outbound transaction for a source file.
    ///
    /// With an explicit `tid` (the requester proposed one) any prior entry
    /// under that id is overwritten with a log line; without one, the
    /// smallest unused id is allocated. Returns the allocated tid.
    pub fn create_tx_transaction(
        &mut self,
        tid: Option<u8>,
        file_path: &Path,
    ) -> Result<u8, TransportError> {
        let tid = match tid {
            Some(tid) => {
                if usize::from(tid) >= MAX_TRANSACTIONS {
                    return Err(TransportError::TidOutOfRange(tid));
                }
                if self.tx.remove(&tid).is_some() {
                    tracing::info!(tid, "overwriting existing TX transaction");
                }
                tid
            }
            None => {
                if self.tx.len() >= MAX_TRANSACTIONS {
                    return Err(TransportError::ManagerFull {
                        max: MAX_TRANSACTIONS,
                    });
                }
                (0..MAX_TRANSACTIONS as u8)
                    .find(|tid| !self.tx.contains_key(tid))
                    .expect("bounded map has a free id below its cap")
            }
        };

        let trans = Transaction::new_tx(tid, file_path)?;
        tracing::info!(tid, path = %file_path.display(), "created TX transaction");
        self.tx.insert(tid, trans);
        Ok(tid)
    }

    /// Create an inbound transaction under the id the remote peer chose in
    /// INIT_TRANS. The id is mandatory on this side and collisions fail.
    pub fn create_rx_transaction(
        &mut self,
        tid: u8,
        file_path: impl Into<PathBuf>,
        file_hash: Option<[u8; 20]>,
        number_of_packets: Option<u32>,
    ) -> Result<&mut Transaction, TransportError> {
        if usize::from(tid) >= MAX_TRANSACTIONS {
            return Err(TransportError::TidOutOfRange(tid));
        }
        if self.rx.contains_key(&tid) {
            return Err(TransportError::TidAlreadyInUse(tid));
        }

        let trans = Transaction::new_rx(tid, file_path, file_hash, number_of_packets)?;
        tracing::info!(tid, "created RX transaction");
        Ok(self.rx.entry(tid).or_insert(trans))
    }

    /// Look up a transaction; with `direction = None` the TX space is
    /// searched before RX.
    pub fn get_transaction(&self, tid: u8, direction: Option<Direction>) -> Option<&Transaction> {
        match direction {
            Some(Direction::Tx) => self.tx.get(&tid),
            Some(Direction::Rx) => self.rx.get(&tid),
            None => self.tx.get(&tid).or_else(|| self.rx.get(&tid)),
        }
    }

    pub fn get_transaction_mut(
        &mut self,
        tid: u8,
        direction: Option<Direction>,
    ) -> Option<&mut Transaction> {
        match direction {
            Some(Direction::Tx) => self.tx.get_mut(&tid),
            Some(Direction::Rx) => self.rx.get_mut(&tid),
            None => {
                if self.tx.contains_key(&tid) {
                    self.tx.get_mut(&tid)
                } else {
                    self.rx.get_mut(&tid)
                }
            }
        }
    }

    /// Remove a transaction. Returns whether anything was deleted.
    pub fn delete_transaction(&mut self, tid: u8, direction: Option<Direction>) -> bool {
        let deleted = match direction {
            Some(Direction::Tx) => self.tx.remove(&tid).is_some(),
            Some(Direction::Rx) => self.rx.remove(&tid).is_some(),
            None => {
                let tx = self.tx.remove(&tid).is_some();
                if tx {
                    true
                } else {
                    self.rx.remove(&tid).is_some()
                }
            }
        };
        if deleted {
            tracing::info!(tid, "deleted transaction");
        }
        deleted
    }

    pub fn transactions(&self, direction: Option<Direction>) -> Vec<&Transaction> {
        match direction {
            Some(Direction::Tx) => self.tx.values().collect(),
            Some(Direction::Rx) => self.rx.values().collect(),
            None => self.tx.values().chain(self.rx.values()).collect(),
        }
    }

    pub fn transactions_by_state(
        &self,
        state: TransState,
        direction: Option<Direction>,
    ) -> Vec<&Transaction> {
        self.transactions(direction)
            .into_iter()
            .filter(|t| t.state() == state)
            .collect()
    }

    pub fn active_count(&self, direction: Option<Direction>) -> usize {
        match direction {
            Some(Direction::Tx) => self.tx.len(),
            Some(Direction::Rx) => self.rx.len(),
            None => self.tx.len() + self.rx.len(),
        }
    }

    pub fn is_full(&self, direction: Option<Direction>) -> bool {
        match direction {
            Some(Direction::Tx) => self.tx.len() >= MAX_TRANSACTIONS,
            Some(Direction::Rx) => self.rx.len() >= MAX_TRANSACTIONS,
            None => {
                self.tx.len() >= MAX_TRANSACTIONS || self.rx.len() >= MAX_TRANSACTIONS
            }
        }
    }

    /// Drop every FAILED transaction. Returns how many were cleared.
    pub fn clear_failed_transactions(&mut self, direction: Option<Direction>) -> usize {
        let mut cleared = 0;
        if direction != Some(Direction::Rx) {
            let before = self.tx.len();
            self.tx.retain(|_, t| t.state() != TransState::Failed);
            cleared += before - self.tx.len();
        }
        if direction != Some(Direction::Tx) {
            let before = self.rx.len();
            self.rx.retain(|_, t| t.state() != TransState::Failed);
            cleared += before - self.rx.len();
        }
        if cleared > 0 {
            tracing::info!(cleared, "cleared failed transactions");
        }
        cleared
    }

    pub fn get_stats(&self, direction: Option<Direction>) -> ManagerStats {
        let mut by_state = BTreeMap::new();
        for trans in self.transactions(direction) {
            *by_state.entry(trans.state().name()).or_insert(0) += 1;
        }
        ManagerStats {
            total: self.active_count(direction),
            tx_count: if direction == Some(Direction::Rx) {
                0
            } else {
                self.tx.len()
            },
            rx_count: if direction == Some(Direction::Tx) {
                0
            } else {
                self.rx.len()
            },
            by_state,
        }
    }

    /// Write a JSON snapshot of one transaction into a history folder.
    ///
    /// Fragment payload bytes are bulky and only included when
    /// `dump_fragments` is set, encoded as space-separated `0xNN` tokens.
    /// Returns the path of the snapshot file.
    pub fn dump_to_disk(
        &self,
        tid: u8,
        direction: Direction,
        folder: &Path,
        dump_fragments: bool,
    ) -> Result<PathBuf, TransportError> {
        let trans = self
            .get_transaction(tid, Some(direction))
            .ok_or(TransportError::UnknownTransaction(tid))?;

        std::fs::create_dir_all(folder)?;

        let timestamp = chrono::DateTime::<chrono::Local>::from(trans.start_date())
            .format("%Y_%m_%d-%H_%M_%S")
            .to_string();
        let filename = format!(
            "{timestamp}_tid{tid}_{}_{}.json",
            trans.state().name(),
            direction.label()
        );
        let path = folder.join(filename);

        let missing: Vec<u16> = trans.missing_fragments().take(100).collect();
        let received: Vec<String> = trans
            .received_fragments()
            .take(100)
            .map(|seq| seq.to_string())
            .collect();

        let mut snapshot = serde_json::json!({
            "tid": trans.tid(),
            "state": trans.state().value(),
            "state_name": trans.state().name(),
            "is_tx": direction == Direction::Tx,
            "start_date": trans
                .start_date()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64(),
            "timestamp": timestamp,
            "file_path": trans.file_path().map(|p| p.display().to_string()),
            "file_size": trans.file_size(),
            "number_of_packets": trans.number_of_packets(),
            "file_hash": trans.file_hash().map(hex::encode),
            "missing_fragments_count": trans.missing_count(),
            "missing_fragments": missing,
            "received_fragments_count": trans.received_count(),
            "received_fragments": received.join(", "),
            "packets_generated_count": trans.packets_generated(),
            "dump_fragments_flag": dump_fragments,
        });

        if dump_fragments && trans.received_count() > 0 {
            let mut data = serde_json::Map::new();
            for seq in trans.received_fragments() {
                if let Some(payload) = trans.fragment_payload(seq) {
                    data.insert(
                        seq.to_string(),
                        serde_json::json!({
                            "size": payload.len(),
                            "bytes": format_bytes(payload),
                        }),
                    );
                }
            }
            snapshot["received_fragments_data"] = serde_json::Value::Object(data);
        }

        std::fs::write(&path, serde_json::to_vec_pretty(&snapshot)?)?;
        tracing::info!(tid, path = %path.display(), "transaction dump written");
        Ok(path)
    }
}

/// Render bytes as space-separated `0xNN` tokens, the dump format.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
