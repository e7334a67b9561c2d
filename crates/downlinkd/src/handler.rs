//! Command dispatch for the daemon.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;

use downlink_core::codec::{pack_ack, pack_command, pack_report};
use downlink_core::{unpack, Ack, Command, Message};
use downlink_transport::{combine_bitmap_words, Direction, TransState, BITMAP_WINDOW_BITS};

use crate::Daemon;

/// One step of a command's reply sequence.
pub enum Outbound {
    Frame(Vec<u8>),
    /// Idle gap before a fragment burst; see the transport ordering rules.
    Idle(Duration),
}

/// Interval between the INIT_TRANS reply (or a batch ack) and the first
/// fragment on the wire.
const FRAGMENT_LEAD_IN: Duration = Duration::from_millis(100);

fn ack(status: u8, message: impl ToString) -> Outbound {
    let frame = pack_ack(&Ack::with_payload(status, message)).expect("ack status fits 5 bits");
    Outbound::Frame(frame)
}

/// Unpack one inbound record and produce the reply sequence.
pub async fn handle_frame(daemon: &Daemon, frame: &[u8]) -> Vec<Outbound> {
    match unpack(frame) {
        Ok(Message::Command(cmd)) => {
            tracing::info!(command = cmd.name(), "command received");
            handle_command(daemon, &cmd).await
        }
        Ok(other) => {
            tracing::warn!(msg_type = ?other.msg_type(), "unexpected message family");
            vec![ack(1, "expected a command")]
        }
        Err(e) => {
            tracing::warn!(error = %e, "frame rejected");
            vec![ack(1, e)]
        }
    }
}

async fn handle_command(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    match cmd.name() {
        "SUM" => {
            let op1 = cmd.arg_u64("op1").unwrap_or(0);
            let op2 = cmd.arg_u64("op2").unwrap_or(0);
            vec![ack(0, format!("SUM={}", op1 + op2))]
        }

        "REQUEST_TM_NOMINAL" => report_reply(daemon, "TM_HEARTBEAT").await,
        "REQUEST_TM_HAL" => report_reply(daemon, "TM_HAL").await,
        "REQUEST_TM_STORAGE" => report_reply(daemon, "TM_STORAGE").await,
        "REQUEST_TM_PAYLOAD" => report_reply(daemon, "TM_PAYLOAD").await,

        "CREATE_TRANS" => create_trans(daemon, cmd).await,
        "GENERATE_ALL_PACKETS" => generate_packets(daemon, cmd, None).await,
        "GENERATE_X_PACKETS" => {
            let x = cmd.arg_u64("x").unwrap_or(0) as usize;
            generate_packets(daemon, cmd, Some(x)).await
        }
        "GET_SINGLE_PACKET" => single_packet(daemon, cmd).await,
        "SYNC_MISSING" => sync_missing(daemon, cmd).await,
        "CONFIRM_BATCH" => confirm_batch(daemon, cmd).await,
        "UPLINK_FRAGMENT" => uplink_fragment(daemon, cmd).await,

        // Remaining flight commands are acknowledged; their side effects
        // live outside this simulator.
        name => vec![ack(0, name)],
    }
}

async fn report_reply(daemon: &Daemon, report_name: &str) -> Vec<Outbound> {
    let report = {
        let mut state = daemon.state.lock().await;
        state.generate_report(report_name)
    };
    match report.and_then(|r| pack_report(&r)) {
        Ok(frame) => vec![ack(0, report_name), Outbound::Frame(frame)],
        Err(e) => {
            tracing::error!(report = report_name, error = %e, "report generation failed");
            vec![ack(1, e)]
        }
    }
}

/// Resolve a requested file name under the served root, rejecting
/// absolute paths and parent traversal.
fn resolve_requested(root: &Path, requested: &str) -> Option<PathBuf> {
    let requested = Path::new(requested);
    if requested
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let path = root.join(requested);
    path.is_file().then_some(path)
}

async fn create_trans(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    let requested_tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let Some(name) = cmd.arg_str("string_command") else {
        return vec![ack(1, "missing file name")];
    };
    let Some(path) = resolve_requested(&daemon.file_root, name) else {
        tracing::warn!(file = name, "requested file not available");
        return vec![ack(1, format!("no such file: {name}"))];
    };

    let mut manager = daemon.manager.lock().await;
    let tid = match manager.create_tx_transaction(Some(requested_tid), &path) {
        Ok(tid) => tid,
        Err(e) => {
            tracing::error!(error = %e, "transaction creation failed");
            return vec![ack(1, e)];
        }
    };

    let trans = manager
        .get_transaction_mut(tid, Some(Direction::Tx))
        .expect("created above");
    trans.change_state(TransState::Init);
    let number_of_packets = trans.number_of_packets().unwrap_or(0) as u16;
    let (msb, middle, lsb) = trans.hash_as_integers();

    match build_init_trans(tid, number_of_packets, msb, middle, lsb) {
        Ok(frame) => {
            tracing::info!(tid, packets = number_of_packets, file = name, "transaction initialised");
            vec![
                ack(0, format!("trans tid={tid} packets={number_of_packets}")),
                Outbound::Frame(frame),
            ]
        }
        Err(e) => vec![ack(1, e)],
    }
}

fn build_init_trans(
    tid: u8,
    number_of_packets: u16,
    msb: u64,
    middle: u64,
    lsb: u32,
) -> Result<Vec<u8>, downlink_core::CodecError> {
    let mut init = Command::new("INIT_TRANS")?;
    init.set_argument("tid", tid)?;
    init.set_argument("number_of_packets", number_of_packets)?;
    init.set_argument("hash_MSB", msb)?;
    init.set_argument("hash_middlesb", middle)?;
    init.set_argument("hash_LSB", lsb)?;
    pack_command(&init)
}

async fn generate_packets(daemon: &Daemon, cmd: &Command, x: Option<usize>) -> Vec<Outbound> {
    let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let mut manager = daemon.manager.lock().await;
    let Some(trans) = manager.get_transaction_mut(tid, Some(Direction::Tx)) else {
        return vec![ack(1, format!("no transaction tid={tid}"))];
    };

    let frames = match x {
        Some(x) => trans.generate_x_packets(x),
        None => trans.generate_all_packets(),
    };
    match frames {
        Ok(frames) => {
            tracing::info!(tid, count = frames.len(), "fragment batch generated");
            let mut replies = vec![ack(0, format!("sending {} fragments", frames.len()))];
            if !frames.is_empty() {
                replies.push(Outbound::Idle(FRAGMENT_LEAD_IN));
                replies.extend(frames.into_iter().map(Outbound::Frame));
            }
            replies
        }
        Err(e) => {
            tracing::error!(tid, error = %e, "fragment generation failed");
            vec![ack(1, e)]
        }
    }
}

async fn single_packet(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let seq = cmd.arg_u64("seq_number").unwrap_or(0) as u16;
    let mut manager = daemon.manager.lock().await;
    let Some(trans) = manager.get_transaction_mut(tid, Some(Direction::Tx)) else {
        return vec![ack(1, format!("no transaction tid={tid}"))];
    };

    match trans.generate_specific_packet(seq) {
        Ok(frame) => vec![
            ack(0, format!("fragment {seq}")),
            Outbound::Idle(FRAGMENT_LEAD_IN),
            Outbound::Frame(frame),
        ],
        Err(e) => vec![ack(1, e)],
    }
}

async fn sync_missing(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let seq_offset = cmd.arg_u64("seq_offset").unwrap_or(0) as u16;
    let msb = cmd.arg_u64("bitmap_msb").unwrap_or(0) as u16;
    let lsb = cmd.arg_u64("bitmap_lsb").unwrap_or(0) as u16;

    let mut manager = daemon.manager.lock().await;
    let Some(trans) = manager.get_transaction_mut(tid, Some(Direction::Tx)) else {
        return vec![ack(1, format!("no transaction tid={tid}"))];
    };
    trans.update_missing_fragments_bitmap(
        seq_offset,
        combine_bitmap_words(msb, lsb),
        BITMAP_WINDOW_BITS,
    );
    vec![ack(0, format!("missing={}", trans.missing_count()))]
}

async fn confirm_batch(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let msb = cmd.arg_u64("bitmap_msb").unwrap_or(0) as u16;
    let lsb = cmd.arg_u64("bitmap_lsb").unwrap_or(0) as u16;

    let mut manager = daemon.manager.lock().await;
    let Some(trans) = manager.get_transaction_mut(tid, Some(Direction::Tx)) else {
        return vec![ack(1, format!("no transaction tid={tid}"))];
    };
    let remaining = trans.confirm_last_batch(combine_bitmap_words(msb, lsb));
    vec![ack(0, format!("missing={remaining}"))]
}

async fn uplink_fragment(daemon: &Daemon, cmd: &Command) -> Vec<Outbound> {
    let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
    let seq = cmd.arg_u64("seq_number").unwrap_or(0) as u16;
    let Some(payload) = cmd.arg_bytes("payload_frag") else {
        return vec![ack(1, "missing payload")];
    };
    let payload: Bytes = payload.clone();

    let mut manager = daemon.manager.lock().await;
    if manager.get_transaction(tid, Some(Direction::Rx)).is_none() {
        let dest = format!("uplink_tid{tid}.bin");
        if let Err(e) = manager.create_rx_transaction(tid, dest, None, None) {
            return vec![ack(1, e)];
        }
    }
    let Some(trans) = manager.get_transaction_mut(tid, Some(Direction::Rx)) else {
        return vec![ack(1, format!("no transaction tid={tid}"))];
    };
    trans.add_fragment(seq, payload);
    vec![ack(0, format!("stored fragment {seq}"))]
}
