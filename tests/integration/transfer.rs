//! Whole-file transfers at boundary sizes, with fragments delivered in
//! arbitrary order, plus the missing-set synchronization flow.

use std::fs;

use downlink_core::codec::unpack_fragment;
use downlink_core::defs::MAX_PACKET_SIZE;
use downlink_transport::{
    combine_bitmap_words, Direction, TransState, TransactionManager, BITMAP_WINDOW_BITS,
};

use crate::{pattern_bytes, temp_file};

/// Sizes around the fragment boundary plus a multi-window file.
const BOUNDARY_SIZES: &[usize] = &[
    0,
    1,
    MAX_PACKET_SIZE - 1,
    MAX_PACKET_SIZE,
    MAX_PACKET_SIZE + 1,
    10 * MAX_PACKET_SIZE,
];

/// Reorder frames deterministically: odd indices first, then evens
/// reversed. Exercises out-of-order reassembly without a rand dependency.
fn permute<T>(frames: Vec<T>) -> Vec<T> {
    let mut odd = Vec::new();
    let mut even = Vec::new();
    for (i, frame) in frames.into_iter().enumerate() {
        if i % 2 == 1 {
            odd.push(frame);
        } else {
            even.push(frame);
        }
    }
    even.reverse();
    odd.extend(even);
    odd
}

#[test]
fn boundary_sizes_round_trip_out_of_order() {
    for &size in BOUNDARY_SIZES {
        let data = pattern_bytes(size);
        let src = temp_file("boundary", &data);

        let mut manager = TransactionManager::new();
        let tid = manager.create_tx_transaction(None, &src).unwrap();
        let sender = manager
            .get_transaction_mut(tid, Some(Direction::Tx))
            .unwrap();
        let expected_fragments = size.div_ceil(MAX_PACKET_SIZE);
        assert_eq!(sender.number_of_packets(), Some(expected_fragments as u32));

        let frames = permute(sender.generate_all_packets().unwrap());
        let hash = sender.file_hash().copied();
        let count = sender.number_of_packets();

        let dest_name = format!("rebuilt-{size}.bin");
        let receiver = manager
            .create_rx_transaction(tid, dest_name.clone(), hash, count)
            .unwrap();
        for frame in frames {
            let fragment = unpack_fragment(&frame).unwrap();
            receiver.add_fragment(fragment.seq_number(), fragment.payload().clone());
        }
        assert!(receiver.is_completed(), "size {size} did not complete");

        let out_dir = std::env::temp_dir().join(format!("downlink-it-out-{}", std::process::id()));
        assert!(receiver.write_file(Some(&out_dir)).unwrap());
        assert_eq!(receiver.state(), TransState::Success);
        assert_eq!(
            fs::read(out_dir.join(&dest_name)).unwrap(),
            data,
            "size {size} content mismatch"
        );

        manager.delete_transaction(tid, None);
        manager.delete_transaction(tid, None);
        fs::remove_file(src).ok();
        fs::remove_file(out_dir.join(dest_name)).ok();
    }
}

#[test]
fn corrupted_fragment_fails_verification() {
    let data = pattern_bytes(3 * MAX_PACKET_SIZE);
    let src = temp_file("corrupt", &data);

    let mut manager = TransactionManager::new();
    let tid = manager.create_tx_transaction(None, &src).unwrap();
    let sender = manager
        .get_transaction_mut(tid, Some(Direction::Tx))
        .unwrap();
    let frames = sender.generate_all_packets().unwrap();
    let hash = sender.file_hash().copied();
    let count = sender.number_of_packets();

    let receiver = manager
        .create_rx_transaction(tid, "corrupt-out.bin", hash, count)
        .unwrap();
    for (i, frame) in frames.iter().enumerate() {
        let fragment = unpack_fragment(frame).unwrap();
        let mut payload = fragment.payload().to_vec();
        if i == 1 {
            payload[0] ^= 0xFF;
        }
        receiver.add_fragment(fragment.seq_number(), payload.into());
    }
    assert!(receiver.is_completed());

    let out_dir = std::env::temp_dir().join(format!("downlink-it-bad-{}", std::process::id()));
    assert!(!receiver.write_file(Some(&out_dir)).unwrap());
    assert_eq!(receiver.state(), TransState::Failed);

    fs::remove_file(src).ok();
    fs::remove_dir_all(out_dir).ok();
}

#[test]
fn bitmap_sync_resumes_partial_transfer() {
    let data = pattern_bytes(40 * MAX_PACKET_SIZE + 17);
    let src = temp_file("resume", &data);

    // First pass: the receiver gets a gappy subset.
    let mut manager = TransactionManager::new();
    let tid = manager.create_tx_transaction(None, &src).unwrap();
    let sender = manager
        .get_transaction_mut(tid, Some(Direction::Tx))
        .unwrap();
    let frames = sender.generate_all_packets().unwrap();
    let hash = sender.file_hash().copied();
    let count = sender.number_of_packets();

    let receiver = manager
        .create_rx_transaction(tid, "resume-out.bin", hash, count)
        .unwrap();
    for (i, frame) in frames.iter().enumerate() {
        if i % 3 == 0 || i % 7 == 0 {
            continue; // dropped on the lossy pass
        }
        let fragment = unpack_fragment(frame).unwrap();
        receiver.add_fragment(fragment.seq_number(), fragment.payload().clone());
    }
    assert!(!receiver.is_completed());

    // Sync the sender from the receiver's bitmap windows, then resend.
    let windows = receiver.generate_missing_bitmaps(BITMAP_WINDOW_BITS);
    let expected_missing: Vec<u16> = receiver.missing_fragments().collect();

    let sender = manager
        .get_transaction_mut(tid, Some(Direction::Tx))
        .unwrap();
    for (offset, msb, lsb) in windows {
        sender.update_missing_fragments_bitmap(
            offset,
            combine_bitmap_words(msb, lsb),
            BITMAP_WINDOW_BITS,
        );
    }
    assert_eq!(
        sender.missing_fragments().collect::<Vec<_>>(),
        expected_missing
    );

    let resend = sender.generate_all_packets().unwrap();
    assert_eq!(resend.len(), expected_missing.len());

    let receiver = manager
        .get_transaction_mut(tid, Some(Direction::Rx))
        .unwrap();
    for frame in &resend {
        let fragment = unpack_fragment(frame).unwrap();
        receiver.add_fragment(fragment.seq_number(), fragment.payload().clone());
    }
    assert!(receiver.is_completed());

    let out_dir = std::env::temp_dir().join(format!("downlink-it-resume-{}", std::process::id()));
    assert!(receiver.write_file(Some(&out_dir)).unwrap());
    assert_eq!(fs::read(out_dir.join("resume-out.bin")).unwrap(), data);

    fs::remove_file(src).ok();
    fs::remove_dir_all(out_dir).ok();
}

#[test]
fn batch_delivery_with_confirmation() {
    let data = pattern_bytes(9 * MAX_PACKET_SIZE + 5);
    let src = temp_file("batch", &data);

    let mut manager = TransactionManager::new();
    let tid = manager.create_tx_transaction(None, &src).unwrap();
    let count = manager
        .get_transaction(tid, Some(Direction::Tx))
        .unwrap()
        .number_of_packets();
    let hash = manager
        .get_transaction(tid, Some(Direction::Tx))
        .unwrap()
        .file_hash()
        .copied();
    manager
        .create_rx_transaction(tid, "batch-out.bin", hash, count)
        .unwrap();

    loop {
        let sender = manager
            .get_transaction_mut(tid, Some(Direction::Tx))
            .unwrap();
        let frames = sender.generate_x_packets(4).unwrap();
        if frames.is_empty() {
            break;
        }
        let batch = frames.len();

        let receiver = manager
            .get_transaction_mut(tid, Some(Direction::Rx))
            .unwrap();
        for frame in &frames {
            let fragment = unpack_fragment(frame).unwrap();
            receiver.add_fragment(fragment.seq_number(), fragment.payload().clone());
        }

        // Confirm the whole batch so the sender's missing set shrinks.
        let bitmap = (1u32 << batch) - 1;
        let sender = manager
            .get_transaction_mut(tid, Some(Direction::Tx))
            .unwrap();
        sender.confirm_last_batch(bitmap);
    }

    let sender = manager.get_transaction(tid, Some(Direction::Tx)).unwrap();
    assert_eq!(sender.missing_count(), 0);

    let receiver = manager
        .get_transaction_mut(tid, Some(Direction::Rx))
        .unwrap();
    assert!(receiver.is_completed());
    let out_dir = std::env::temp_dir().join(format!("downlink-it-batch-{}", std::process::id()));
    assert!(receiver.write_file(Some(&out_dir)).unwrap());
    assert_eq!(fs::read(out_dir.join("batch-out.bin")).unwrap(), data);

    fs::remove_file(src).ok();
    fs::remove_dir_all(out_dir).ok();
}
