// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn look_up_round_trips_through_json() {
    let request = Request::LookUp { name: "com.example.echo".to_string() };
    let json = serde_json::to_string(&request).unwrap();
    let parsed: Request = serde_json::from_str(&json).unwrap();
    match parsed {
        Request::LookUp { name } => assert_eq!(name, "com.example.echo"),
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn tag_field_names_the_variant() {
    let json = serde_json::to_string(&Request::Subset).unwrap();
    assert!(json.contains("\"type\":\"Subset\""));
}

#[test]
fn create_server_carries_full_spec() {
    let request = Request::CreateServer {
        command: vec!["/usr/libexec/echod".to_string()],
        argv0: None,
        uid: 501,
        on_demand: true,
    };
    let json = serde_json::to_string(&request).unwrap();
    let parsed: Request = serde_json::from_str(&json).unwrap();
    match parsed {
        Request::CreateServer { command, uid, on_demand, .. } => {
            assert_eq!(command, vec!["/usr/libexec/echod".to_string()]);
            assert_eq!(uid, 501);
            assert!(on_demand);
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}
