//! Integration tests for the Casabus relay
//!
//! These tests drive the registry and router directly and observe routed
//! frames through each peer's outbound queue.

use casabus::protocol::{CLIENT_CONNECTED, CONNECTION_ACK, DEVICE_CONNECTED};
use casabus::{Command, MessageRouter, PeerHandle, Registry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

fn peer() -> (Arc<PeerHandle>, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(100);
    (Arc::new(PeerHandle::new(tx)), rx)
}

fn setup() -> (Registry, MessageRouter) {
    let registry = Registry::new();
    let router = MessageRouter::new(registry.clone());
    (registry, router)
}

/// Pull everything queued for a peer right now
fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
    let mut frames = vec![];
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_device_registration_is_acked_once() {
    let (registry, router) = setup();
    let (device, mut rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);

    assert!(registry.has_device());
    assert_eq!(registry.device().unwrap().id, device.id);
    assert_eq!(drain(&mut rx), vec![CONNECTION_ACK.to_string()]);
}

#[tokio::test]
async fn test_repeated_client_registration_acks_every_time() {
    let (registry, router) = setup();
    let (client, mut rx) = peer();

    router.handle_message(&client, CLIENT_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);

    // One membership, but both claims are acknowledged
    assert_eq!(registry.client_count(), 1);
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test]
async fn test_commands_forwarded_to_device_verbatim() {
    let (_registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client, mut client_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut client_rx);

    for command in Command::ALL {
        router.handle_message(&client, command.as_token());
    }

    let forwarded = drain(&mut device_rx);
    let expected: Vec<String> = Command::ALL
        .iter()
        .map(|c| c.as_token().to_string())
        .collect();
    assert_eq!(forwarded, expected);

    // Commands never echo back to the sender
    assert!(drain(&mut client_rx).is_empty());
}

#[tokio::test]
async fn test_command_from_unregistered_sender_is_forwarded() {
    let (_registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (stranger, mut stranger_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    drain(&mut device_rx);

    // Routing is by message shape, not by who the sender is
    router.handle_message(&stranger, "FAN_OFF");

    assert_eq!(drain(&mut device_rx), vec!["FAN_OFF".to_string()]);
    assert!(drain(&mut stranger_rx).is_empty());
}

#[tokio::test]
async fn test_command_without_device_is_dropped() {
    let (registry, router) = setup();
    let (client, mut rx) = peer();

    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut rx);

    router.handle_message(&client, "LIGHT_ON");

    // No device, no error back to the sender, nothing queued anywhere
    assert!(!registry.has_device());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_telemetry_broadcast_to_all_clients_with_source() {
    let (_registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client_a, mut rx_a) = peer();
    let (client_b, mut rx_b) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client_a, CLIENT_CONNECTED);
    router.handle_message(&client_b, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut rx_a);
    drain(&mut rx_b);

    router.handle_message(&device, r#"{"temperature":22.5,"humidity":51.0,"light":900}"#);

    let expected = json!({
        "temperature": 22.5,
        "humidity": 51.0,
        "light": 900,
        "source": "esp32"
    });

    for rx in [&mut rx_a, &mut rx_b] {
        let frames = drain(rx);
        assert_eq!(frames.len(), 1);
        let payload: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(payload, expected);
    }

    // The device never receives its own readings
    assert!(drain(&mut device_rx).is_empty());
}

#[tokio::test]
async fn test_telemetry_keeps_device_supplied_fields() {
    let (_registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client, mut client_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut client_rx);

    router.handle_message(
        &device,
        r#"{"temperature":20,"humidity":45,"light":300,"timestamp":123456,"source":"bench-rig"}"#,
    );

    let frames = drain(&mut client_rx);
    assert_eq!(frames.len(), 1);
    let payload: Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(payload["timestamp"], json!(123456));
    assert_eq!(payload["source"], json!("bench-rig"));
}

#[tokio::test]
async fn test_telemetry_missing_key_is_ignored() {
    let (_registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client, mut client_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut client_rx);

    router.handle_message(&device, r#"{"temperature":22,"humidity":50}"#);
    assert!(drain(&mut client_rx).is_empty());

    // Presence is what counts: a null reading still broadcasts
    router.handle_message(&device, r#"{"temperature":null,"humidity":50,"light":1}"#);
    assert_eq!(drain(&mut client_rx).len(), 1);
}

#[tokio::test]
async fn test_telemetry_from_any_connection_is_broadcast() {
    let (_registry, router) = setup();
    let (stranger, mut stranger_rx) = peer();
    let (client, mut client_rx) = peer();

    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut client_rx);

    // A telemetry-shaped frame routes by shape even from an unregistered
    // connection
    router.handle_message(&stranger, r#"{"temperature":1,"humidity":2,"light":3}"#);

    assert_eq!(drain(&mut client_rx).len(), 1);
    assert!(drain(&mut stranger_rx).is_empty());
}

#[tokio::test]
async fn test_client_sourced_telemetry_echoes_to_sender() {
    let (_registry, router) = setup();
    let (client, mut rx) = peer();

    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut rx);

    // The fan-out covers every registered client, the sender included
    router.handle_message(&client, r#"{"temperature":1,"humidity":2,"light":3}"#);

    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_device_disconnect_frees_slot() {
    let (registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client, mut client_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut client_rx);

    router.handle_disconnect(device.id);
    assert!(!registry.has_device());

    // Commands fall on the floor once the device is gone
    router.handle_message(&client, "LIGHT_OFF");
    assert!(drain(&mut device_rx).is_empty());
    assert!(drain(&mut client_rx).is_empty());
}

#[tokio::test]
async fn test_client_disconnect_stops_broadcasts() {
    let (registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (leaving, mut leaving_rx) = peer();
    let (staying, mut staying_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&leaving, CLIENT_CONNECTED);
    router.handle_message(&staying, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut leaving_rx);
    drain(&mut staying_rx);

    router.handle_disconnect(leaving.id);
    assert_eq!(registry.client_count(), 1);

    router.handle_message(&device, r#"{"temperature":22,"humidity":50,"light":1}"#);

    assert_eq!(drain(&mut staying_rx).len(), 1);
    assert!(drain(&mut leaving_rx).is_empty());
}

#[tokio::test]
async fn test_disconnect_unknown_connection_is_noop() {
    let (registry, router) = setup();
    let (client, _rx) = peer();

    router.handle_message(&client, CLIENT_CONNECTED);
    router.handle_disconnect(Uuid::new_v4());

    assert_eq!(registry.client_count(), 1);
}

#[tokio::test]
async fn test_unrecognized_messages_are_ignored() {
    let (registry, router) = setup();
    let (device, mut device_rx) = peer();
    let (client, mut client_rx) = peer();
    let (sender, mut sender_rx) = peer();

    router.handle_message(&device, DEVICE_CONNECTED);
    router.handle_message(&client, CLIENT_CONNECTED);
    drain(&mut device_rx);
    drain(&mut client_rx);

    let garbage = [
        "hello",
        "light_on",
        "LIGHT_ON ",
        "{not json",
        "[1,2,3]",
        "42",
        r#"{"temperature":22}"#,
        "",
    ];
    for raw in garbage {
        router.handle_message(&sender, raw);
    }

    // Nothing registered, nothing routed, nothing answered
    assert!(registry.device().is_some_and(|d| d.id == device.id));
    assert_eq!(registry.client_count(), 1);
    assert!(drain(&mut device_rx).is_empty());
    assert!(drain(&mut client_rx).is_empty());
    assert!(drain(&mut sender_rx).is_empty());
}

#[tokio::test]
async fn test_registry_concurrent_registration() {
    let (registry, router) = setup();

    // Spawn 100 tasks that register and deregister clients concurrently
    let mut handles = vec![];
    for _ in 0..100 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let (client, _rx) = peer();

            router.handle_message(&client, CLIENT_CONNECTED);
            tokio::time::sleep(Duration::from_micros(100)).await;
            router.handle_disconnect(client.id);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.client_count(), 0);
}

#[tokio::test]
async fn test_concurrent_broadcast_and_registration() {
    let (registry, router) = setup();
    let (device, _device_rx) = peer();
    router.handle_message(&device, DEVICE_CONNECTED);

    // Keep the client receivers alive so sends succeed
    let mut receivers = vec![];
    for _ in 0..10 {
        let (client, rx) = peer();
        router.handle_message(&client, CLIENT_CONNECTED);
        receivers.push((client, rx));
    }

    // Readings fan out while more clients come and go
    let mut handles = vec![];
    for i in 0..50 {
        let publisher = router.clone();
        let device = device.clone();
        handles.push(tokio::spawn(async move {
            let reading = format!(
                r#"{{"temperature":{},"humidity":50,"light":1}}"#,
                20 + i % 5
            );
            publisher.handle_message(&device, &reading);
        }));

        let churner = router.clone();
        handles.push(tokio::spawn(async move {
            let (client, _rx) = peer();
            churner.handle_message(&client, CLIENT_CONNECTED);
            churner.handle_disconnect(client.id);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    // The 10 stable clients saw every reading
    for (_client, mut rx) in receivers {
        assert_eq!(drain(&mut rx).len(), 50);
    }
    assert_eq!(registry.client_count(), 10);
}
