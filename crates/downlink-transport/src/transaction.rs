//! Per-file transfer state machine.
//!
//! A Transaction owns one file transfer in one direction. The sender (TX)
//! knows the source file and generates fragments for whatever the receiver
//! still misses; the receiver (RX) collects fragments by sequence number,
//! reassembles, and verifies the SHA-1 content hash. The two sides keep
//! their view of the missing set in sync through 32-bit bitmap windows.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use downlink_core::codec::pack_fragment;
use downlink_core::defs::{FRAGMENT_SEQ_SIZE, MAX_PACKET_SIZE};
use downlink_core::Fragment;

use crate::error::TransportError;

/// Width of one missing-set synchronization window, in bits.
pub const BITMAP_WINDOW_BITS: u32 = 32;

/// Upper bound on a transaction's fragment count: the sequence field is
/// 13 bits wide.
pub const MAX_FRAGMENTS: u32 = 1 << FRAGMENT_SEQ_SIZE;

/// Lifecycle of a transaction. The numeric values appear in dumps and on
/// the interactive surface, so they are part of the tooling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransState {
    /// Created, counterpart metadata not yet known.
    Requested = 1,
    /// Both sides know the fragment count and hash.
    Init = 2,
    /// Sender has generated at least one outbound fragment.
    Sending = 3,
    /// Receiver has accepted at least one inbound fragment.
    Receiving = 4,
    /// Every fragment is in hand.
    Completed = 5,
    /// File written and hash verified (or no hash to verify).
    Success = 6,
    /// Hash verification rejected the assembled file, or abandoned.
    Failed = 7,
}

impl TransState {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            TransState::Requested => "REQUESTED",
            TransState::Init => "INIT",
            TransState::Sending => "SENDING",
            TransState::Receiving => "RECEIVING",
            TransState::Completed => "COMPLETED",
            TransState::Success => "SUCCESS",
            TransState::Failed => "FAILED",
        }
    }
}

/// Join the two 16-bit words of a bitmap window into the combined value.
pub fn combine_bitmap_words(msb: u16, lsb: u16) -> u32 {
    (u32::from(msb) << 16) | u32::from(lsb)
}

/// One file transfer in one direction.
#[derive(Debug)]
pub struct Transaction {
    tid: u8,
    state: TransState,
    start_date: SystemTime,
    file_path: Option<PathBuf>,
    file_size: Option<u64>,
    number_of_packets: Option<u32>,
    file_hash: Option<[u8; 20]>,
    /// Received payloads by sequence number (RX side).
    fragments: BTreeMap<u16, Bytes>,
    /// Sequence numbers not yet confirmed delivered. Disjoint from the
    /// received map at all times.
    missing: BTreeSet<u16>,
    /// Sequence numbers of the most recently generated outbound batch.
    last_batch: Vec<u16>,
    packets_generated: usize,
}

impl Transaction {
    /// Sender-side constructor: size, fragment count, and hash come from
    /// the source file on disk.
    pub(crate) fn new_tx(tid: u8, file_path: &Path) -> Result<Self, TransportError> {
        let file_size = fs::metadata(file_path)?.len();
        let number_of_packets = file_size.div_ceil(MAX_PACKET_SIZE as u64);
        if number_of_packets >= u64::from(MAX_FRAGMENTS) {
            return Err(TransportError::TooManyFragments {
                fragments: number_of_packets,
                max: MAX_FRAGMENTS,
            });
        }
        let number_of_packets = number_of_packets as u32;

        let data = fs::read(file_path)?;
        let file_hash = Self::calculate_hash(&data);

        Ok(Self {
            tid,
            state: TransState::Requested,
            start_date: SystemTime::now(),
            file_path: Some(file_path.to_path_buf()),
            file_size: Some(file_size),
            number_of_packets: Some(number_of_packets),
            file_hash: Some(file_hash),
            fragments: BTreeMap::new(),
            missing: (0..number_of_packets as u16).collect(),
            last_batch: Vec::new(),
            packets_generated: 0,
        })
    }

    /// Receiver-side constructor: count and hash arrive via INIT_TRANS,
    /// `file_path` is the relative destination chosen by the requester.
    pub(crate) fn new_rx(
        tid: u8,
        file_path: impl Into<PathBuf>,
        file_hash: Option<[u8; 20]>,
        number_of_packets: Option<u32>,
    ) -> Result<Self, TransportError> {
        let mut trans = Self {
            tid,
            state: TransState::Requested,
            start_date: SystemTime::now(),
            file_path: Some(file_path.into()),
            file_size: None,
            number_of_packets: None,
            file_hash,
            fragments: BTreeMap::new(),
            missing: BTreeSet::new(),
            last_batch: Vec::new(),
            packets_generated: 0,
        };
        if let Some(n) = number_of_packets {
            trans.set_number_of_packets(n)?;
        }
        Ok(trans)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn tid(&self) -> u8 {
        self.tid
    }

    pub fn state(&self) -> TransState {
        self.state
    }

    pub fn start_date(&self) -> SystemTime {
        self.start_date
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn number_of_packets(&self) -> Option<u32> {
        self.number_of_packets
    }

    pub fn file_hash(&self) -> Option<&[u8; 20]> {
        self.file_hash.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.state == TransState::Completed
    }

    /// Missing sequence numbers, ascending.
    pub fn missing_fragments(&self) -> impl Iterator<Item = u16> + '_ {
        self.missing.iter().copied()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    pub fn received_count(&self) -> usize {
        self.fragments.len()
    }

    /// Received sequence numbers, ascending.
    pub fn received_fragments(&self) -> impl Iterator<Item = u16> + '_ {
        self.fragments.keys().copied()
    }

    pub fn fragment_payload(&self, seq: u16) -> Option<&Bytes> {
        self.fragments.get(&seq)
    }

    pub fn last_batch(&self) -> &[u16] {
        &self.last_batch
    }

    pub fn packets_generated(&self) -> usize {
        self.packets_generated
    }

    // ── State ────────────────────────────────────────────────────────────────

    pub fn change_state(&mut self, state: TransState) {
        if state != self.state {
            tracing::debug!(tid = self.tid, old = self.state.name(), new = state.name(),
                "transaction state change");
            self.state = state;
        }
    }

    /// Apply the fragment count from INIT_TRANS (receiver side) and reset
    /// the missing set to the full range. A zero-fragment transfer has
    /// nothing left to receive and completes on the spot.
    pub fn set_number_of_packets(&mut self, number: u32) -> Result<(), TransportError> {
        if number >= MAX_FRAGMENTS {
            return Err(TransportError::TooManyFragments {
                fragments: u64::from(number),
                max: MAX_FRAGMENTS,
            });
        }
        self.number_of_packets = Some(number);
        self.missing = (0..number as u16).collect();
        if number == 0 {
            self.change_state(TransState::Completed);
        }
        Ok(())
    }

    // ── Hashing ──────────────────────────────────────────────────────────────

    /// SHA-1 digest of a byte slice. The protocol's integrity check; not a
    /// security boundary.
    pub fn calculate_hash(data: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// The 20-byte digest split for the INIT_TRANS wire format:
    /// bytes 0..8 → MSB, 8..16 → middle, 16..20 → LSB. Always big-endian
    /// regardless of the global endianness setting. `(0, 0, 0)` when no
    /// hash is known.
    pub fn hash_as_integers(&self) -> (u64, u64, u32) {
        match &self.file_hash {
            None => (0, 0, 0),
            Some(h) => (
                u64::from_be_bytes(h[0..8].try_into().unwrap_or_default()),
                u64::from_be_bytes(h[8..16].try_into().unwrap_or_default()),
                u32::from_be_bytes(h[16..20].try_into().unwrap_or_default()),
            ),
        }
    }

    /// Reassemble the digest from the three-integer wire format.
    pub fn set_hash_from_integers(&mut self, msb: u64, middle: u64, lsb: u32) {
        let mut hash = [0u8; 20];
        hash[0..8].copy_from_slice(&msb.to_be_bytes());
        hash[8..16].copy_from_slice(&middle.to_be_bytes());
        hash[16..20].copy_from_slice(&lsb.to_be_bytes());
        self.file_hash = Some(hash);
    }

    // ── Receive path ─────────────────────────────────────────────────────────

    /// Store one inbound fragment. Duplicates overwrite with a warning;
    /// sequences outside the missing set warn but are stored anyway.
    ///
    /// Returns `true` iff this fragment completed the transaction.
    pub fn add_fragment(&mut self, seq: u16, payload: Bytes) -> bool {
        if self.fragments.contains_key(&seq) {
            tracing::warn!(tid = self.tid, seq, "fragment already present, overwriting");
        } else if !self.missing.contains(&seq) {
            tracing::warn!(tid = self.tid, seq, "fragment not in missing set, storing anyway");
        }

        if self.state != TransState::Receiving {
            self.change_state(TransState::Receiving);
        }

        self.fragments.insert(seq, payload);
        self.missing.remove(&seq);

        if let Some(n) = self.number_of_packets {
            if self.missing.is_empty() && self.fragments.len() as u32 == n {
                tracing::info!(tid = self.tid, fragments = n, "all fragments received");
                self.change_state(TransState::Completed);
                return true;
            }
        }
        false
    }

    /// Concatenate the received fragments to the destination path and
    /// verify the hash when one is known.
    ///
    /// `Ok(true)` means the file is on disk and verified (`SUCCESS`);
    /// `Ok(false)` means the hash rejected the assembly (`FAILED`). I/O
    /// failures and incomplete fragment sets surface as errors and leave
    /// the state untouched.
    pub fn write_file(&mut self, folder: Option<&Path>) -> Result<bool, TransportError> {
        let file_path = self.file_path.as_ref().ok_or(TransportError::NoFilePath)?;
        let number = self
            .number_of_packets
            .ok_or(TransportError::UnknownFragmentCount)?;

        let dest: PathBuf = match folder {
            Some(folder) => folder.join(file_path),
            None => file_path.clone(),
        };

        let mut assembled = Vec::new();
        for seq in 0..number as u16 {
            let fragment = self
                .fragments
                .get(&seq)
                .ok_or(TransportError::MissingFragmentAtWrite { seq })?;
            assembled.extend_from_slice(fragment);
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&dest, &assembled)?;

        if let Some(expected) = self.file_hash {
            let actual = Self::calculate_hash(&assembled);
            if actual != expected {
                tracing::error!(
                    tid = self.tid,
                    expected = hex::encode(expected),
                    actual = hex::encode(actual),
                    "hash verification failed"
                );
                self.change_state(TransState::Failed);
                return Ok(false);
            }
            tracing::info!(tid = self.tid, hash = hex::encode(actual), "hash verified");
        }

        tracing::info!(
            tid = self.tid,
            path = %dest.display(),
            bytes = assembled.len(),
            "file written"
        );
        self.change_state(TransState::Success);
        Ok(true)
    }

    // ── Send path ────────────────────────────────────────────────────────────

    /// Pack one fragment frame per missing sequence, ascending. Records the
    /// batch in `last_batch`; the missing set itself only shrinks through
    /// `confirm_last_batch` or a bitmap sync.
    pub fn generate_all_packets(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        let file_path = self.file_path.as_ref().ok_or(TransportError::NoFilePath)?;
        let data = fs::read(file_path)?;

        self.last_batch.clear();
        let mut frames = Vec::with_capacity(self.missing.len());
        for &seq in &self.missing {
            let start = usize::from(seq) * MAX_PACKET_SIZE;
            let end = data.len().min(start + MAX_PACKET_SIZE);
            let payload = data.get(start..end).unwrap_or_default();
            let fragment = Fragment::new(self.tid, seq, Bytes::copy_from_slice(payload));
            frames.push(pack_fragment(&fragment)?);
            self.last_batch.push(seq);
        }
        self.mark_sending(frames.len());
        Ok(frames)
    }

    /// Like `generate_all_packets`, limited to the first `x` missing
    /// sequences. Bounds memory when the receiver drives delivery in
    /// batches.
    pub fn generate_x_packets(&mut self, x: usize) -> Result<Vec<Vec<u8>>, TransportError> {
        let file_path = self.file_path.as_ref().ok_or(TransportError::NoFilePath)?;
        let mut file = File::open(file_path)?;

        self.last_batch.clear();
        let mut frames = Vec::new();
        let batch: Vec<u16> = self.missing.iter().copied().take(x).collect();
        for seq in batch {
            let frame = Self::read_fragment(&mut file, self.tid, seq)?;
            frames.push(frame);
            self.last_batch.push(seq);
        }
        self.mark_sending(frames.len());
        Ok(frames)
    }

    /// Pack exactly one fragment, regardless of the missing set. Seeks
    /// straight to the fragment's offset.
    pub fn generate_specific_packet(&mut self, seq: u16) -> Result<Vec<u8>, TransportError> {
        let number = self
            .number_of_packets
            .ok_or(TransportError::UnknownFragmentCount)?;
        if u32::from(seq) >= number {
            return Err(TransportError::SequenceOutOfRange { seq, count: number });
        }
        let file_path = self.file_path.as_ref().ok_or(TransportError::NoFilePath)?;
        let mut file = File::open(file_path)?;
        let frame = Self::read_fragment(&mut file, self.tid, seq)?;
        self.mark_sending(1);
        Ok(frame)
    }

    /// Sender-side bookkeeping after a generation call: count the frames
    /// and enter SENDING on the first outbound fragment.
    fn mark_sending(&mut self, generated: usize) {
        self.packets_generated += generated;
        if generated > 0 && self.state != TransState::Sending {
            self.change_state(TransState::Sending);
        }
    }

    fn read_fragment(file: &mut File, tid: u8, seq: u16) -> Result<Vec<u8>, TransportError> {
        file.seek(SeekFrom::Start(u64::from(seq) * MAX_PACKET_SIZE as u64))?;
        let mut payload = vec![0u8; MAX_PACKET_SIZE];
        let mut filled = 0;
        loop {
            let n = file.read(&mut payload[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        payload.truncate(filled);
        let fragment = Fragment::new(tid, seq, Bytes::from(payload));
        Ok(pack_fragment(&fragment)?)
    }

    // ── Missing-set synchronization ──────────────────────────────────────────

    /// Replace the missing set wholesale with the receiver's asserted view.
    pub fn overwrite_missing_fragments(&mut self, missing: impl IntoIterator<Item = u16>) {
        self.missing = missing.into_iter().collect();
    }

    /// Drop each listed sequence from the missing set. Entries that were
    /// not missing warn but do not fail.
    pub fn add_received_list(&mut self, received: impl IntoIterator<Item = u16>) {
        for seq in received {
            if !self.missing.remove(&seq) {
                tracing::warn!(tid = self.tid, seq, "received list entry was not missing");
            }
        }
    }

    /// Summarize the missing set as `(seq_offset, bitmap_msb, bitmap_lsb)`
    /// windows of up to `max_bits` sequences. Within a window of width `w`,
    /// bit `(w-1)-i` (MSB-first) is 1 when `seq_offset + i` has been
    /// received. The last window truncates to the remaining width.
    pub fn generate_missing_bitmaps(&self, max_bits: u32) -> Vec<(u16, u16, u16)> {
        let Some(number) = self.number_of_packets else {
            return Vec::new();
        };

        let mut windows = Vec::new();
        let mut seq_offset = 0u32;
        while seq_offset < number {
            let width = max_bits.min(number - seq_offset);
            let mut bitmap = 0u32;
            for i in 0..width {
                let seq = (seq_offset + i) as u16;
                if !self.missing.contains(&seq) {
                    bitmap |= 1 << (width - 1 - i);
                }
            }
            windows.push((
                seq_offset as u16,
                (bitmap >> 16) as u16,
                (bitmap & 0xFFFF) as u16,
            ));
            seq_offset += max_bits;
        }
        windows
    }

    /// Apply one bitmap window to the missing set: bit 1 discards the
    /// sequence from missing, bit 0 inserts it. Inverse of
    /// `generate_missing_bitmaps` over the same window.
    pub fn update_missing_fragments_bitmap(&mut self, seq_offset: u16, bitmap: u32, max_bits: u32) {
        let Some(number) = self.number_of_packets else {
            return;
        };
        if u32::from(seq_offset) >= number {
            return;
        }

        let width = max_bits.min(number - u32::from(seq_offset));
        for i in 0..width {
            let seq = seq_offset + i as u16;
            if (bitmap >> (width - 1 - i)) & 1 == 1 {
                self.missing.remove(&seq);
            } else {
                self.missing.insert(seq);
            }
        }
    }

    /// Confirm the last generated batch against a receiver bitmap whose
    /// index basis is `last_batch` rather than a contiguous range: bit 1
    /// confirms delivery. Clears `last_batch`; returns the remaining
    /// missing count.
    pub fn confirm_last_batch(&mut self, bitmap: u32) -> usize {
        if self.last_batch.is_empty() {
            return self.missing.len();
        }

        let width = self.last_batch.len() as u32;
        for (i, &seq) in self.last_batch.iter().enumerate() {
            if (bitmap >> (width - 1 - i as u32)) & 1 == 1 {
                self.missing.remove(&seq);
            }
        }
        self.last_batch.clear();
        self.missing.len()
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tid={} state={} path={} fragments={}/{} missing={}",
            self.tid,
            self.state.name(),
            self.file_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".into()),
            self.fragments.len(),
            self.number_of_packets
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".into()),
            self.missing.len(),
        )
    }
}
