use myrtio_at_mqtt::RxBuffer;
use myrtio_at_mqtt::demux::{MAX_INBOUND_PAYLOAD, try_extract};

#[test]
fn extracts_frame_and_leaves_buffer_empty() {
    let rx = RxBuffer::<256>::new();
    rx.push_slice(b"+MQTTSUBRECV:0,\"a/b\",2,hi\n");

    let message = try_extract(&rx).expect("frame");

    assert_eq!(message.topic(), "a/b");
    assert_eq!(message.payload(), b"hi");
    assert_eq!(message.payload_str(), Some("hi"));
    assert!(rx.is_empty());
}

#[test]
fn byte_by_byte_arrival_yields_exactly_one_message() {
    let rx = RxBuffer::<256>::new();
    let frame = b"+MQTTSUBRECV:0,\"farm/pump/set\",3,off\r\n";

    let mut extracted = Vec::new();
    for &byte in frame {
        rx.push(byte);
        if let Some(message) = try_extract(&rx) {
            extracted.push(message);
        }
    }

    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].payload(), b"off");
    assert!(rx.is_empty());
}

#[test]
fn surrounding_responses_stay_in_place() {
    let rx = RxBuffer::<256>::new();
    rx.push_slice(b"\r\nOK\r\n+MQTTSUBRECV:0,\"t\",1,x\r\n+MQTTPUB:OK\r\n");

    let message = try_extract(&rx).expect("frame");

    assert_eq!(message.payload(), b"x");
    assert_eq!(rx.snapshot().as_bytes(), b"\r\nOK\r\n+MQTTPUB:OK\r\n");
}

#[test]
fn consecutive_frames_come_out_in_order() {
    let rx = RxBuffer::<256>::new();
    rx.push_slice(b"+MQTTSUBRECV:0,\"a\",1,1\r\n+MQTTSUBRECV:0,\"b\",1,2\r\n");

    let first = try_extract(&rx).expect("first");
    let second = try_extract(&rx).expect("second");

    assert_eq!(first.topic(), "a");
    assert_eq!(second.topic(), "b");
    assert!(try_extract(&rx).is_none());
}

#[test]
fn overstated_length_is_flagged_not_overread() {
    let rx = RxBuffer::<256>::new();
    rx.push_slice(b"+MQTTSUBRECV:0,\"a/b\",50,short\r\nOK\r\n");

    let message = try_extract(&rx).expect("truncated frame");

    assert!(message.is_truncated());
    assert_eq!(message.payload(), b"short");
    assert_eq!(message.declared_len(), 50);
    assert_eq!(rx.snapshot().as_bytes(), b"OK\r\n");
}

#[test]
fn malformed_frame_is_dropped_and_next_is_found() {
    let rx = RxBuffer::<256>::new();
    rx.push_slice(b"+MQTTSUBRECV:zz\r\n+MQTTSUBRECV:0,\"t\",2,ok\r\n");

    let message = try_extract(&rx).expect("frame after garbage");

    assert_eq!(message.payload(), b"ok");
    assert!(rx.is_empty());
}

#[test]
fn oversized_payload_is_cut_to_capacity() {
    let rx = RxBuffer::<2048>::new();
    let payload = vec![b'x'; MAX_INBOUND_PAYLOAD + 10];
    let header = format!("+MQTTSUBRECV:0,\"big\",{},", payload.len());
    rx.push_slice(header.as_bytes());
    rx.push_slice(&payload);
    rx.push_slice(b"\r\n");

    let message = try_extract(&rx).expect("frame");

    assert_eq!(message.payload().len(), MAX_INBOUND_PAYLOAD);
    assert_eq!(message.declared_len(), MAX_INBOUND_PAYLOAD + 10);
    assert!(message.is_truncated());
}

#[test]
fn frame_across_ring_wrap_is_extracted() {
    let rx = RxBuffer::<64>::new();
    rx.push_slice(&[b'.'; 40]);
    rx.consume(40);
    rx.push_slice(b"+MQTTSUBRECV:0,\"w\",4,wrap\r\n");

    let message = try_extract(&rx).expect("frame");

    assert_eq!(message.payload(), b"wrap");
}

#[test]
fn nothing_to_extract_from_plain_responses() {
    let rx = RxBuffer::<64>::new();
    rx.push_slice(b"\r\nOK\r\n");

    assert!(try_extract(&rx).is_none());
    assert_eq!(rx.len(), 6);
}
