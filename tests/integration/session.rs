//! A miniature satellite loop over loopback TCP, driven through the demo
//! link framing. Covers the CREATE_TRANS → INIT_TRANS → fragment flow for
//! the whole-file and single-fragment retrieval modes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use downlink_core::codec::{pack_ack, pack_command};
use downlink_core::{unpack, Ack, Command, Message};
use downlink_transport::link::{read_record, write_record};
use downlink_transport::{Direction, TransState, TransactionManager};

use crate::{pattern_bytes, temp_file};

/// Serve one connection: transaction commands against files under `root`.
async fn satellite_loop(listener: TcpListener, root: PathBuf) -> Result<()> {
    let (socket, _) = listener.accept().await?;
    let (mut reader, mut writer) = socket.into_split();
    let mut manager = TransactionManager::new();

    while let Some(frame) = read_record(&mut reader).await? {
        let Ok(Message::Command(cmd)) = unpack(&frame) else {
            write_record(&mut writer, &pack_ack(&Ack::with_payload(1, "bad frame"))?).await?;
            continue;
        };
        match cmd.name() {
            "CREATE_TRANS" => {
                let requested = cmd.arg_u64("tid").unwrap_or(0) as u8;
                let path = root.join(cmd.arg_str("string_command").unwrap_or_default());
                let tid = manager.create_tx_transaction(Some(requested), &path)?;
                let trans = manager
                    .get_transaction_mut(tid, Some(Direction::Tx))
                    .expect("just created");
                trans.change_state(TransState::Init);
                let packets = trans.number_of_packets().unwrap_or(0) as u16;
                let (msb, middle, lsb) = trans.hash_as_integers();

                let mut init = Command::new("INIT_TRANS")?;
                init.set_argument("tid", tid)?;
                init.set_argument("number_of_packets", packets)?;
                init.set_argument("hash_MSB", msb)?;
                init.set_argument("hash_middlesb", middle)?;
                init.set_argument("hash_LSB", lsb)?;

                write_record(&mut writer, &pack_ack(&Ack::with_payload(0, "created"))?).await?;
                write_record(&mut writer, &pack_command(&init)?).await?;
            }
            "GENERATE_ALL_PACKETS" => {
                let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
                let trans = manager
                    .get_transaction_mut(tid, Some(Direction::Tx))
                    .expect("transaction exists");
                let frames = trans.generate_all_packets()?;
                write_record(&mut writer, &pack_ack(&Ack::with_payload(0, "sending"))?).await?;
                // Give the receiver its record boundary before the burst.
                tokio::time::sleep(Duration::from_millis(50)).await;
                for frame in frames {
                    write_record(&mut writer, &frame).await?;
                }
            }
            "GET_SINGLE_PACKET" => {
                let tid = cmd.arg_u64("tid").unwrap_or(0) as u8;
                let seq = cmd.arg_u64("seq_number").unwrap_or(0) as u16;
                let trans = manager
                    .get_transaction_mut(tid, Some(Direction::Tx))
                    .expect("transaction exists");
                let frame = trans.generate_specific_packet(seq)?;
                write_record(&mut writer, &pack_ack(&Ack::with_payload(0, "one"))?).await?;
                write_record(&mut writer, &frame).await?;
            }
            other => {
                write_record(&mut writer, &pack_ack(&Ack::with_payload(1, other))?).await?;
            }
        }
    }
    Ok(())
}

async fn request_transfer(
    writer: &mut OwnedWriteHalf,
    file_name: &str,
) -> Result<()> {
    let mut create = Command::new("CREATE_TRANS")?;
    create.set_argument("tid", 0u8)?;
    create.set_argument("string_command", file_name)?;
    write_record(writer, &pack_command(&create)?).await?;
    Ok(())
}

/// Skip acks until INIT_TRANS arrives; register the RX transaction.
async fn await_init(
    reader: &mut OwnedReadHalf,
    manager: &mut TransactionManager,
    dest_name: &str,
) -> Result<u8> {
    loop {
        let frame = read_record(reader).await?.expect("stream open");
        match unpack(&frame) {
            Ok(Message::Command(cmd)) if cmd.name() == "INIT_TRANS" => {
                let tid = cmd.arg_u64("tid").unwrap() as u8;
                let packets = cmd.arg_u64("number_of_packets").unwrap() as u32;
                let trans =
                    manager.create_rx_transaction(tid, dest_name, None, Some(packets))?;
                trans.set_hash_from_integers(
                    cmd.arg_u64("hash_MSB").unwrap(),
                    cmd.arg_u64("hash_middlesb").unwrap(),
                    cmd.arg_u64("hash_LSB").unwrap() as u32,
                );
                trans.change_state(TransState::Init);
                return Ok(tid);
            }
            Ok(Message::Ack(ack)) => assert_eq!(ack.response_status(), 0),
            other => panic!("unexpected pre-init message: {other:?}"),
        }
    }
}

/// Collect fragment frames into the transaction until it completes.
async fn collect_until_complete(
    reader: &mut OwnedReadHalf,
    manager: &mut TransactionManager,
    tid: u8,
) -> Result<()> {
    loop {
        if manager
            .get_transaction(tid, Some(Direction::Rx))
            .unwrap()
            .is_completed()
        {
            return Ok(());
        }
        let frame = read_record(reader).await?.expect("stream open");
        match unpack(&frame) {
            Ok(Message::Fragment(fragment)) => {
                let trans = manager
                    .get_transaction_mut(tid, Some(Direction::Rx))
                    .unwrap();
                trans.add_fragment(fragment.seq_number(), fragment.payload().clone());
            }
            Ok(Message::Ack(ack)) => assert_eq!(ack.response_status(), 0),
            other => panic!("unexpected mid-transfer message: {other:?}"),
        }
    }
}

async fn session(file_size: usize, single_mode: bool, tag: &str) -> Result<()> {
    let data = pattern_bytes(file_size);
    let src = temp_file(tag, &data);
    let root = src.parent().unwrap().to_path_buf();
    let file_name = src.file_name().unwrap().to_str().unwrap().to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(satellite_loop(listener, root));

    let stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = stream.into_split();
    let mut manager = TransactionManager::new();

    request_transfer(&mut writer, &file_name).await?;
    let dest_name = format!("session-{tag}.bin");
    let tid = await_init(&mut reader, &mut manager, &dest_name).await?;

    if single_mode {
        // Request each fragment by sequence, lowest missing first.
        loop {
            let next = manager
                .get_transaction(tid, Some(Direction::Rx))
                .unwrap()
                .missing_fragments()
                .next();
            let Some(seq) = next else { break };
            let mut cmd = Command::new("GET_SINGLE_PACKET")?;
            cmd.set_argument("tid", tid)?;
            cmd.set_argument("seq_number", seq)?;
            write_record(&mut writer, &pack_command(&cmd)?).await?;

            // One ack + one fragment per request.
            let trans = manager
                .get_transaction_mut(tid, Some(Direction::Rx))
                .unwrap();
            let mut got_fragment = false;
            while !got_fragment {
                let frame = read_record(&mut reader).await?.expect("stream open");
                match unpack(&frame) {
                    Ok(Message::Fragment(fragment)) => {
                        trans.add_fragment(fragment.seq_number(), fragment.payload().clone());
                        got_fragment = true;
                    }
                    Ok(Message::Ack(ack)) => assert_eq!(ack.response_status(), 0),
                    other => panic!("unexpected message: {other:?}"),
                }
            }
        }
    } else {
        let mut cmd = Command::new("GENERATE_ALL_PACKETS")?;
        cmd.set_argument("tid", tid)?;
        write_record(&mut writer, &pack_command(&cmd)?).await?;
        collect_until_complete(&mut reader, &mut manager, tid).await?;
    }

    let trans = manager
        .get_transaction_mut(tid, Some(Direction::Rx))
        .unwrap();
    assert!(trans.is_completed());
    let out_dir = std::env::temp_dir().join(format!("downlink-session-{}", std::process::id()));
    assert!(trans.write_file(Some(Path::new(&out_dir)))?);
    assert_eq!(trans.state(), TransState::Success);
    assert_eq!(fs::read(out_dir.join(&dest_name))?, data);

    drop(writer);
    drop(reader);
    server.abort();
    fs::remove_file(src).ok();
    fs::remove_file(out_dir.join(dest_name)).ok();
    Ok(())
}

#[tokio::test]
async fn tcp_session_whole_file_mode() -> Result<()> {
    session(601, false, "all").await
}

#[tokio::test]
async fn tcp_session_single_fragment_mode() -> Result<()> {
    // 601 bytes at 230 per fragment: three fragments, matching the
    // reference exchange.
    session(601, true, "single").await
}
