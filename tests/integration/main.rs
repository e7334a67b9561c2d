//! End-to-end tests for the telemetry codec and the file-transfer layer.
//!
//! Everything here runs in-process: transactions exchange packed frames
//! directly, and the session test drives a miniature satellite loop over
//! loopback TCP with the demo link framing.

mod session;
mod transfer;

use std::fs;
use std::path::PathBuf;

/// Write `data` to a unique temp file and return its path.
pub fn temp_file(tag: &str, data: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "downlink-it-{}-{tag}-{}",
        std::process::id(),
        data.len()
    ));
    fs::write(&path, data).expect("temp file write");
    path
}

/// Deterministic pseudo-random bytes, varied per length so different
/// file sizes do not share a prefix.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491u32 ^ len as u32;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}
