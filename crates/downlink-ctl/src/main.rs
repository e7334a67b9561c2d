//! downlink-ctl — ground-station demo client.
//!
//! Requests a file from a running downlinkd and drives delivery in one of
//! the three retrieval modes:
//!
//!   downlink-ctl <addr> <file> all
//!   downlink-ctl <addr> <file> batch <n>
//!   downlink-ctl <addr> <file> single
//!
//! The reassembled file lands in ./received/.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;

use downlink_core::codec::pack_command;
use downlink_core::{unpack, Command, Message};
use downlink_transport::link::{read_record, write_record};
use downlink_transport::{Direction, TransactionManager, TransState};

enum Mode {
    All,
    Batch(usize),
    Single,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (addr, file, mode) = match args.as_slice() {
        [addr, file] => (addr, file, Mode::All),
        [addr, file, mode] if mode == "all" => (addr, file, Mode::All),
        [addr, file, mode] if mode == "single" => (addr, file, Mode::Single),
        [addr, file, mode, n] if mode == "batch" => {
            (addr, file, Mode::Batch(n.parse().context("batch size")?))
        }
        _ => bail!("usage: downlink-ctl <addr> <file> [all|single|batch <n>]"),
    };

    let stream = TcpStream::connect(addr.as_str())
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let (mut reader, mut writer) = stream.into_split();
    tracing::info!(%addr, file, "connected");

    // Request the transfer; the satellite answers with INIT_TRANS.
    let mut create = Command::new("CREATE_TRANS")?;
    create.set_argument("tid", 0u8)?;
    create.set_argument("string_command", file.as_str())?;
    write_record(&mut writer, &pack_command(&create)?).await?;

    let mut manager = TransactionManager::new();
    let tid = loop {
        let Some(frame) = read_record(&mut reader).await? else {
            bail!("server closed before INIT_TRANS");
        };
        match unpack(&frame) {
            Ok(Message::Command(cmd)) if cmd.name() == "INIT_TRANS" => {
                let tid = cmd.arg_u64("tid").context("tid")? as u8;
                let number_of_packets = cmd.arg_u64("number_of_packets").context("count")? as u32;
                let trans = manager.create_rx_transaction(
                    tid,
                    file.as_str(),
                    None,
                    Some(number_of_packets),
                )?;
                trans.set_hash_from_integers(
                    cmd.arg_u64("hash_MSB").unwrap_or(0),
                    cmd.arg_u64("hash_middlesb").unwrap_or(0),
                    cmd.arg_u64("hash_LSB").unwrap_or(0) as u32,
                );
                trans.change_state(TransState::Init);
                tracing::info!(tid, packets = number_of_packets, "transfer initialised");
                break tid;
            }
            Ok(Message::Ack(ack)) => {
                tracing::info!(status = ack.response_status(), payload = ack.payload(),
                    "ack");
                if ack.response_status() != 0 {
                    bail!("request rejected: {:?}", ack.payload());
                }
            }
            Ok(other) => tracing::warn!(msg_type = ?other.msg_type(), "unexpected message"),
            Err(e) => tracing::warn!(error = %e, "undecodable frame"),
        }
    };

    match mode {
        Mode::All => fetch_all(&mut manager, tid, &mut reader, &mut writer).await?,
        Mode::Batch(n) => fetch_batches(&mut manager, tid, n, &mut reader, &mut writer).await?,
        Mode::Single => fetch_single(&mut manager, tid, &mut reader, &mut writer).await?,
    }

    let trans = manager
        .get_transaction_mut(tid, Some(Direction::Rx))
        .context("transaction vanished")?;
    if trans.write_file(Some(Path::new("received")))? {
        tracing::info!(tid, "transfer verified and written to ./received/");
    } else {
        bail!("hash verification failed");
    }
    Ok(())
}

type Reader = tokio::net::tcp::OwnedReadHalf;
type Writer = tokio::net::tcp::OwnedWriteHalf;

async fn send_command(
    writer: &mut Writer,
    name: &str,
    args: &[(&str, u64)],
) -> Result<()> {
    let mut cmd = Command::new(name)?;
    for &(arg, value) in args {
        match downlink_core::defs::defs()
            .argument_type(arg)
            .context("unknown argument")?
        {
            downlink_core::Scalar::U8 => cmd.set_argument(arg, value as u8)?,
            downlink_core::Scalar::U16 => cmd.set_argument(arg, value as u16)?,
            downlink_core::Scalar::U32 => cmd.set_argument(arg, value as u32)?,
            _ => cmd.set_argument(arg, value)?,
        }
    }
    write_record(writer, &pack_command(&cmd)?).await?;
    Ok(())
}

/// Feed inbound frames into the transaction until it completes or the
/// predicate says the current exchange is over.
async fn pump_fragments(
    manager: &mut TransactionManager,
    tid: u8,
    reader: &mut Reader,
    mut budget: Option<usize>,
) -> Result<usize> {
    let mut accepted = 0;
    loop {
        let trans = manager
            .get_transaction(tid, Some(Direction::Rx))
            .context("transaction vanished")?;
        if trans.is_completed() || budget == Some(0) {
            return Ok(accepted);
        }

        let Some(frame) = read_record(reader).await? else {
            bail!("server closed mid-transfer");
        };
        match unpack(&frame) {
            Ok(Message::Fragment(fragment)) => {
                if fragment.tid() != tid {
                    tracing::warn!(got = fragment.tid(), want = tid, "fragment for other transaction");
                    continue;
                }
                let trans = manager
                    .get_transaction_mut(tid, Some(Direction::Rx))
                    .context("transaction vanished")?;
                trans.add_fragment(fragment.seq_number(), fragment.payload().clone());
                accepted += 1;
                if let Some(b) = budget.as_mut() {
                    *b -= 1;
                }
            }
            Ok(Message::Ack(ack)) => {
                tracing::debug!(status = ack.response_status(), payload = ack.payload(), "ack");
                if ack.response_status() != 0 {
                    bail!("server reported failure: {:?}", ack.payload());
                }
            }
            Ok(other) => tracing::warn!(msg_type = ?other.msg_type(), "unexpected message"),
            Err(e) => tracing::warn!(error = %e, "undecodable frame"),
        }
    }
}

/// One shot: ask for everything still missing, then collect.
async fn fetch_all(
    manager: &mut TransactionManager,
    tid: u8,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<()> {
    send_command(writer, "GENERATE_ALL_PACKETS", &[("tid", u64::from(tid))]).await?;
    pump_fragments(manager, tid, reader, None).await?;
    Ok(())
}

/// Batches of `n`, confirming each batch so the sender's missing set
/// shrinks as delivery progresses.
async fn fetch_batches(
    manager: &mut TransactionManager,
    tid: u8,
    n: usize,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<()> {
    loop {
        let missing = manager
            .get_transaction(tid, Some(Direction::Rx))
            .context("transaction vanished")?
            .missing_count();
        if missing == 0 {
            return Ok(());
        }

        let batch = n.min(missing);
        send_command(
            writer,
            "GENERATE_X_PACKETS",
            &[("tid", u64::from(tid)), ("x", batch as u64)],
        )
        .await?;
        let got = pump_fragments(manager, tid, reader, Some(batch)).await?;

        // Reliable link: everything generated arrived, confirm the whole
        // batch MSB-first.
        let bitmap = if got >= 32 { u32::MAX } else { (1u32 << got) - 1 };
        send_command(
            writer,
            "CONFIRM_BATCH",
            &[
                ("tid", u64::from(tid)),
                ("bitmap_msb", u64::from((bitmap >> 16) as u16)),
                ("bitmap_lsb", u64::from(bitmap as u16)),
            ],
        )
        .await?;
        drain_one_ack(reader).await?;
    }
}

/// One fragment per request, lowest missing sequence first.
async fn fetch_single(
    manager: &mut TransactionManager,
    tid: u8,
    reader: &mut Reader,
    writer: &mut Writer,
) -> Result<()> {
    loop {
        let next = {
            let trans = manager
                .get_transaction(tid, Some(Direction::Rx))
                .context("transaction vanished")?;
            if trans.is_completed() {
                return Ok(());
            }
            trans.missing_fragments().next()
        };
        let Some(seq) = next else {
            return Ok(());
        };

        send_command(
            writer,
            "GET_SINGLE_PACKET",
            &[("tid", u64::from(tid)), ("seq_number", u64::from(seq))],
        )
        .await?;
        pump_fragments(manager, tid, reader, Some(1)).await?;
    }
}

async fn drain_one_ack(reader: &mut Reader) -> Result<()> {
    let Some(frame) = read_record(reader).await? else {
        bail!("server closed while waiting for ack");
    };
    if let Ok(Message::Ack(ack)) = unpack(&frame) {
        tracing::debug!(status = ack.response_status(), payload = ack.payload(), "ack");
    }
    Ok(())
}
