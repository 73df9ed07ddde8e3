use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use ws_duplex::ws::{encode_for, read_frame, Frame, FrameError, Opcode, ProtocolError};
use ws_duplex::{CloseCode, CloseFrame, Config, Connection, Error, Message, Role, State};

const LIMIT: usize = 1 << 20;

fn pair(role: Role, config: Config) -> (Connection, DuplexStream) {
    let (local, peer) = duplex(64 * 1024);
    (Connection::from_stream(local, role, config), peer)
}

fn server() -> (Connection, DuplexStream) {
    pair(Role::Server, Config::default())
}

// writes a frame the way a client endpoint would, masked
async fn send_raw(peer: &mut DuplexStream, frame: Frame) {
    let bytes = encode_for(frame, Role::Client).unwrap();
    peer.write_all(&bytes).await.unwrap();
}

async fn recv_raw(peer: &mut DuplexStream) -> Frame {
    timeout(Duration::from_secs(2), read_frame(peer, LIMIT))
        .await
        .expect("peer read timed out")
        .unwrap()
}

// the peer sees end of stream once the connection released the transport
async fn assert_released(peer: &mut DuplexStream) {
    let result = timeout(Duration::from_secs(2), read_frame(peer, LIMIT))
        .await
        .expect("transport was not released");
    match result {
        Err(FrameError::Io(err)) => assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected end of stream, got {:?}", other),
    }
}

fn close_code(frame: &Frame) -> CloseCode {
    assert_eq!(frame.opcode, Opcode::Close);
    CloseFrame::parse(&frame.payload).unwrap().unwrap().code
}

fn fragments(text: &str, n: usize) -> Vec<Frame> {
    let bytes = text.as_bytes();
    let size = (bytes.len() + n - 1) / n;
    let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                Frame::new(i == last, Opcode::Text, chunk)
            } else {
                Frame::continuation(i == last, chunk)
            }
        })
        .collect()
}

#[tokio::test]
async fn reassembles_fragmented_text() {
    for n in [1, 2, 5] {
        let (conn, mut peer) = server();
        let frames = fragments("hello fragmented world", n);
        assert_eq!(frames.len(), n);
        for frame in frames {
            send_raw(&mut peer, frame).await;
        }
        send_raw(&mut peer, Frame::text("next")).await;

        let message = conn.recv().await.unwrap();
        assert_eq!(message, Some(Message::Text("hello fragmented world".into())));
        let message = conn.recv().await.unwrap();
        assert_eq!(message, Some(Message::Text("next".into())));
    }
}

#[tokio::test]
async fn ping_is_answered_and_not_delivered() {
    let (conn, mut peer) = server();
    send_raw(&mut peer, Frame::ping("abc")).await;

    let pong = recv_raw(&mut peer).await;
    assert_eq!(pong.opcode, Opcode::Pong);
    assert_eq!(pong.payload, b"abc");
    assert!(!pong.masked);

    send_raw(&mut peer, Frame::binary(vec![1, 2, 3])).await;
    let message = conn.recv().await.unwrap();
    assert_eq!(message, Some(Message::Binary(vec![1, 2, 3])));
}

#[tokio::test]
async fn invalid_utf8_closes_with_1007() {
    let (conn, mut peer) = server();
    send_raw(&mut peer, Frame::text(vec![0xFF, 0xFE, 0xFD])).await;

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Invalid);
    assert_ne!(conn.state(), State::Open);

    send_raw(&mut peer, Frame::close(Some(&CloseFrame::new(CloseCode::Invalid, "")))).await;
    let result = conn.recv().await;
    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::InvalidUtf8))
    ));
    assert_eq!(conn.state(), State::Closed);
}

#[tokio::test]
async fn unmasked_client_frame_closes_with_1002() {
    let (conn, mut peer) = server();
    let bytes = encode_for(Frame::text("plain"), Role::Server).unwrap();
    peer.write_all(&bytes).await.unwrap();

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Protocol);
    assert_ne!(conn.state(), State::Open);
}

#[tokio::test]
async fn masked_server_frame_closes_client_with_1002() {
    let (conn, mut peer) = pair(Role::Client, Config::default());
    send_raw(&mut peer, Frame::text("masked")).await;

    let close = recv_raw(&mut peer).await;
    assert!(close.masked);
    assert_eq!(close_code(&close), CloseCode::Protocol);
    assert_ne!(conn.state(), State::Open);
}

#[tokio::test]
async fn oversized_message_closes_with_1009() {
    let (conn, mut peer) = pair(Role::Server, Config::default().max_message_size(8));
    send_raw(&mut peer, Frame::new(false, Opcode::Binary, vec![0; 6])).await;
    send_raw(&mut peer, Frame::continuation(true, vec![0; 6])).await;

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Size);
    assert_ne!(conn.state(), State::Open);
}

#[tokio::test]
async fn local_close_completes_when_peer_answers() {
    let (conn, mut peer) = server();
    let conn = Arc::new(conn);

    let closing = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.close(None).await })
    };

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Normal);
    send_raw(&mut peer, Frame::close(Some(&CloseFrame::normal()))).await;

    timeout(Duration::from_secs(2), closing)
        .await
        .expect("close did not finish")
        .unwrap()
        .unwrap();
    assert_eq!(conn.state(), State::Closed);
    assert_eq!(conn.close_frame(), Some(CloseFrame::normal()));
    assert!(conn.recv().await.unwrap().is_none());
    assert_released(&mut peer).await;
    assert!(matches!(
        conn.send_text("late").await,
        Err(Error::ConnectionClosing)
    ));
}

#[tokio::test]
async fn local_close_gives_up_after_grace_period() {
    let config = Config::default().close_timeout(Duration::from_millis(100));
    let (conn, mut peer) = pair(Role::Server, config);

    timeout(Duration::from_secs(2), conn.close(None))
        .await
        .expect("close did not respect the grace period")
        .unwrap();
    assert_eq!(conn.state(), State::Closed);

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Normal);
}

#[tokio::test]
async fn peer_close_is_echoed() {
    let (conn, mut peer) = server();
    let bye = CloseFrame::new(CloseCode::Away, "bye");
    send_raw(&mut peer, Frame::close(Some(&bye))).await;

    let echo = recv_raw(&mut peer).await;
    assert_eq!(CloseFrame::parse(&echo.payload).unwrap(), Some(bye.clone()));

    assert!(conn.recv().await.unwrap().is_none());
    assert_eq!(conn.state(), State::Closed);
    assert_eq!(conn.close_frame(), Some(bye));
    assert_released(&mut peer).await;
}

#[tokio::test]
async fn close_rejects_reserved_codes() {
    let (conn, _peer) = server();
    let result = conn
        .close(Some(CloseFrame::new(CloseCode::Abnormal, "")))
        .await;
    assert!(matches!(result, Err(Error::Contract(_))));
    assert_eq!(conn.state(), State::Open);
}

#[tokio::test]
async fn concurrent_sends_do_not_interleave() {
    let (conn, mut peer) = pair(Role::Server, Config::default().max_frame_size(4));
    let conn = Arc::new(conn);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.send_text(format!("message number {}", i)).await
        }));
    }

    // every message is fragmented; the fragments of one message must be
    // contiguous on the wire
    let mut received = Vec::new();
    while received.len() < 8 {
        let first = recv_raw(&mut peer).await;
        assert_eq!(first.opcode, Opcode::Text);
        let mut payload = first.payload;
        let mut fin = first.fin;
        while !fin {
            let next = recv_raw(&mut peer).await;
            assert_eq!(next.opcode, Opcode::Continuation);
            payload.extend_from_slice(&next.payload);
            fin = next.fin;
        }
        received.push(String::from_utf8(payload).unwrap());
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    received.sort();
    let mut expected: Vec<String> = (0..8).map(|i| format!("message number {}", i)).collect();
    expected.sort();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn client_masks_outgoing_frames() {
    let (conn, mut peer) = pair(Role::Client, Config::default());
    conn.ping("hb").await.unwrap();
    conn.send_text("hi").await.unwrap();

    let ping = recv_raw(&mut peer).await;
    assert_eq!(ping.opcode, Opcode::Ping);
    assert!(ping.masked);
    assert_eq!(ping.payload, b"hb");

    let text = recv_raw(&mut peer).await;
    assert!(text.masked);
    assert_eq!(text.payload, b"hi");
}

#[tokio::test]
async fn pong_updates_last_pong() {
    let (conn, mut peer) = server();
    assert!(conn.last_pong().is_none());
    send_raw(&mut peer, Frame::pong("")).await;
    send_raw(&mut peer, Frame::text("sync")).await;
    conn.recv().await.unwrap();
    assert!(conn.last_pong().is_some());
}

#[tokio::test]
async fn transport_loss_is_reported() {
    let (conn, peer) = server();
    drop(peer);
    let result = conn.recv().await;
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(conn.state(), State::Closed);
}

#[tokio::test]
async fn reserved_opcode_closes_with_1002_and_stops_reading() {
    let (conn, mut peer) = server();
    // masked frame with opcode 0x3 and a two byte payload, then a valid Close
    let mut bytes = vec![0x83, 0x82, 0x82, 0xFE, 0xFF, 0xFF, 0x00, 0x00];
    bytes.extend(encode_for(Frame::close(Some(&CloseFrame::normal())), Role::Client).unwrap());
    peer.write_all(&bytes).await.unwrap();

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Protocol);
    assert_released(&mut peer).await;

    let result = timeout(Duration::from_secs(2), conn.recv())
        .await
        .expect("connection did not end");
    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::InvalidOpcode(3)))
    ));
    assert_eq!(conn.state(), State::Closed);
}

#[tokio::test]
async fn reserved_bits_close_with_1002() {
    let (conn, mut peer) = server();
    // FIN | RSV1 | Text, masked, empty payload
    peer.write_all(&[0xC1, 0x80, 1, 2, 3, 4]).await.unwrap();

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Protocol);
    assert_released(&mut peer).await;
    assert!(matches!(
        conn.recv().await,
        Err(Error::Protocol(ProtocolError::ReservedBits))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn violation_buffered_before_start_is_answered() {
    let (local, mut peer) = duplex(64 * 1024);
    peer.write_all(&[0x83, 0x80, 1, 2, 3, 4]).await.unwrap();
    let conn = Connection::from_stream(local, Role::Server, Config::default());

    let close = recv_raw(&mut peer).await;
    assert_eq!(close_code(&close), CloseCode::Protocol);
    assert!(conn.recv().await.is_err());
}

#[tokio::test]
async fn close_rejects_oversized_reason() {
    let (conn, mut peer) = server();
    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "x".repeat(200),
    };
    let result = conn.close(Some(close)).await;
    assert!(matches!(result, Err(Error::Contract(_))));
    assert_eq!(conn.state(), State::Open);

    // the connection is still usable and closes normally afterwards
    conn.send_text("still open").await.unwrap();
    let text = recv_raw(&mut peer).await;
    assert_eq!(text.payload, b"still open");
}
