//! Wire protocol round-trip over a real TCP loopback connection, exercising
//! `write_framed`/`read_framed` and the header encoding together the way the
//! session loop and a client actually use them (SPEC_FULL §6, §8 property 2).

use beamstream::protocol::{read_framed, write_framed, Packet, PacketType};
use tokio::net::{TcpListener, TcpStream};

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connect = TcpStream::connect(addr);
    let (accept_result, connect_result) = tokio::join!(listener.accept(), connect);
    let (server, _) = accept_result.unwrap();
    let client = connect_result.unwrap();
    (server, client)
}

#[tokio::test]
async fn video_packet_round_trips_over_a_real_socket() {
    let (mut server, mut client) = loopback_pair().await;

    let sent = Packet::video(vec![0xde, 0xad, 0xbe, 0xef], true, 7);
    write_framed(&mut server, &sent).await.unwrap();

    let received = read_framed(&mut client).await.unwrap();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn audio_config_then_audio_data_preserve_order_and_kind() {
    let (mut server, mut client) = loopback_pair().await;

    let config = Packet::audio_config("48000:FL,FR".to_string());
    let data = Packet::audio_data(vec![1, 2, 3, 4], 3);
    write_framed(&mut server, &config).await.unwrap();
    write_framed(&mut server, &data).await.unwrap();

    let first = read_framed(&mut client).await.unwrap();
    let second = read_framed(&mut client).await.unwrap();

    assert_eq!(first.kind, PacketType::Audio);
    assert!(first.keyframe);
    assert_eq!(first.body, b"48000:FL,FR");

    assert_eq!(second.kind, PacketType::Audio);
    assert!(!second.keyframe);
    assert_eq!(second.body, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn input_event_from_client_to_server_round_trips() {
    let (mut server, mut client) = loopback_pair().await;

    let sent = Packet::input_event(vec![9, 9, 9]);
    write_framed(&mut client, &sent).await.unwrap();

    let received = read_framed(&mut server).await.unwrap();
    assert_eq!(received.kind, PacketType::Misc);
    assert_eq!(received.body, vec![9, 9, 9]);
}

#[tokio::test]
async fn empty_body_packet_round_trips() {
    let (mut server, mut client) = loopback_pair().await;

    let sent = Packet::video(Vec::new(), false, 0);
    write_framed(&mut server, &sent).await.unwrap();

    let received = read_framed(&mut client).await.unwrap();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn reading_from_a_closed_socket_is_an_error_not_a_hang() {
    let (server, client) = loopback_pair().await;
    drop(server);

    let mut client = client;
    let result = read_framed(&mut client).await;
    assert!(result.is_err());
}
