// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bsd_wire::{Request, Response};

use super::*;

#[tokio::test]
async fn request_round_trips_over_a_duplex_stream() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let sent = Request::LookUp { name: "com.example.echo".to_string() };
    write_request(&mut client, &sent, Duration::from_secs(1)).await.unwrap();
    let received = read_request(&mut server, Duration::from_secs(1)).await.unwrap();
    match received {
        Request::LookUp { name } => assert_eq!(name, "com.example.echo"),
        other => panic!("unexpected request: {other:?}"),
    }
}

#[tokio::test]
async fn response_round_trips_over_a_duplex_stream() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let sent = Response::Port { name: 7 };
    write_response(&mut server, &sent, Duration::from_secs(1)).await.unwrap();
    let received = read_response(&mut client, Duration::from_secs(1)).await.unwrap();
    match received {
        Response::Port { name } => assert_eq!(name, 7),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn reading_from_a_closed_stream_reports_connection_closed() {
    let (client, mut server) = tokio::io::duplex(4096);
    drop(client);
    let err = read_request(&mut server, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn reading_with_no_data_times_out() {
    let (_client, mut server) = tokio::io::duplex(4096);
    let err = read_request(&mut server, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected_before_allocating() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    client.write_all(&(MAX_MESSAGE_BYTES + 1).to_be_bytes()).await.unwrap();
    let err = read_request(&mut server, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::TooLarge(_)));
}
