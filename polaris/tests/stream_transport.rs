mod common;

use common::{TIMEOUT, init_logger, wait_until};
use polaris::transport::codec::{self, decode_request, encode_event};
use polaris::transport::{Request, StreamConnection, WindowState};
use polaris::{
    ButtonState, ChannelSink, Connection, Error, Event, Interest, KeyState, Modifiers,
    MouseButton, Output, Scheduler, SchedulerBuilder,
};

use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Returns a scheduler over a stream connection and the service end.
fn connect() -> (Scheduler<StreamConnection>, UnixStream) {
    let (client, service) = UnixStream::pair().unwrap();
    service.set_read_timeout(Some(TIMEOUT)).unwrap();

    let connection = StreamConnection::from_stream(client).unwrap();
    let scheduler = SchedulerBuilder::new().build(Arc::new(connection));

    (scheduler, service)
}

fn send_events(service: &mut UnixStream, events: &[Event]) {
    let mut wire = Vec::new();
    for event in events {
        encode_event(event, &mut wire).unwrap();
    }
    service.write_all(&wire).unwrap();
}

/// Reads from the service end until `count` requests have been decoded.
fn read_requests(service: &mut UnixStream, count: usize) -> Vec<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut requests = Vec::new();

    while requests.len() < count {
        let n = service.read(&mut chunk).unwrap();
        assert!(n > 0, "client closed the connection");
        buf.extend_from_slice(&chunk[..n]);

        let mut consumed = 0;
        while let Some((request, used)) = decode_request(&buf[consumed..]).unwrap() {
            requests.push(request);
            consumed += used;
        }
        buf.drain(..consumed);
    }

    requests
}

#[test]
fn test_events_are_decoded_in_order() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    let expected = vec![
        Event::Key {
            state: KeyState::Pressed,
            keysym: 0x61,
            modifiers: Modifiers::SHIFT | Modifiers::CONTROL,
        },
        Event::PointerMotion { x: 10.0, y: 10.0 },
        Event::PointerButton {
            window: 3,
            state: ButtonState::Pressed,
            button: MouseButton::Left,
            x: 10.0,
            y: 10.0,
        },
        Event::WindowResized {
            window: 3,
            width: 800,
            height: 600,
        },
        Event::OutputsChanged(vec![Output {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            used: true,
        }]),
        Event::key_up(0x61),
    ];
    send_events(&mut service, &expected);

    let received: Vec<Event> = (0..expected.len())
        .map(|_| rx.recv_timeout(TIMEOUT).unwrap())
        .collect();
    assert_eq!(received, expected);

    scheduler.stop();
}

#[test]
fn test_fragmented_frames_are_reassembled() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    let mut wire = Vec::new();
    encode_event(&Event::key_down(0x41), &mut wire).unwrap();
    encode_event(&Event::PointerMotion { x: 1.5, y: -2.0 }, &mut wire).unwrap();

    for byte in &wire {
        service.write_all(std::slice::from_ref(byte)).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Event::key_down(0x41));
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Event::PointerMotion { x: 1.5, y: -2.0 }
    );

    scheduler.stop();
}

#[test]
fn test_queued_requests_reach_the_service() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, _rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();
    assert!(wait_until(TIMEOUT, || scheduler.stats().interest == Interest::Read));

    let requests = vec![
        Request::SetTitle {
            window: 1,
            title: "polaris".to_owned(),
        },
        Request::SetWindowState {
            window: 1,
            state: WindowState::Maximized,
            width: 1280,
            height: 720,
        },
    ];
    for request in &requests {
        scheduler.connection().queue(request).unwrap();
    }
    scheduler.request_flush();

    assert_eq!(read_requests(&mut service, requests.len()), requests);
    assert!(wait_until(TIMEOUT, || !scheduler.connection().has_pending_output()));

    scheduler.stop();
}

#[test]
fn test_sink_may_queue_requests() {
    init_logger();
    let (mut scheduler, mut service) = connect();
    let connection = scheduler.connection().clone();

    scheduler
        .start(move |event: Event| {
            if let Event::WindowResized { window, width, height } = event {
                let reply = Request::SetWindowState {
                    window,
                    state: WindowState::Resize,
                    width,
                    height,
                };
                connection.queue(&reply).unwrap();
            }
        })
        .unwrap();

    send_events(
        &mut service,
        &[Event::WindowResized {
            window: 9,
            width: 640,
            height: 480,
        }],
    );

    let replies = read_requests(&mut service, 1);
    assert_eq!(
        replies,
        vec![Request::SetWindowState {
            window: 9,
            state: WindowState::Resize,
            width: 640,
            height: 480,
        }]
    );

    scheduler.stop();
}

#[test]
fn test_full_socket_widens_then_drains_in_order() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, _rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();
    assert!(wait_until(TIMEOUT, || scheduler.stats().interest == Interest::Read));

    let title = "x".repeat(1000);
    let requests: Vec<Request> = (0..2000)
        .map(|window| Request::SetTitle {
            window,
            title: title.clone(),
        })
        .collect();
    for request in &requests {
        scheduler.connection().queue(request).unwrap();
    }
    scheduler.request_flush();

    assert!(
        wait_until(TIMEOUT, || scheduler.stats().widened >= 1),
        "a full socket must widen interest"
    );

    let reader = thread::spawn(move || read_requests(&mut service, 2000));
    let received = reader.join().unwrap();
    assert_eq!(received, requests);

    assert!(wait_until(TIMEOUT, || scheduler.stats().interest == Interest::Read));
    let stats = scheduler.stats();
    assert_eq!(stats.narrowed, stats.widened + 1);
    assert!(!scheduler.connection().has_pending_output());

    scheduler.stop();
}

#[test]
fn test_decode_failure_invalidates() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    send_events(&mut service, &[Event::key_down(1)]);
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Event::key_down(1));

    service.write_all(&[0x77, 0x77, 0, 0]).unwrap();

    assert!(wait_until(TIMEOUT, || !scheduler.connection().is_valid()));
    assert_eq!(
        scheduler.connection().last_error().as_deref(),
        Some("failed to decode a protocol message: unknown opcode 0x7777")
    );

    let request = Request::SetTitle {
        window: 1,
        title: "late".to_owned(),
    };
    assert!(matches!(
        scheduler.connection().queue(&request),
        Err(Error::InvalidConnection)
    ));
}

#[test]
fn test_events_before_a_malformed_frame_are_delivered() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let mut wire = Vec::new();
    encode_event(&Event::key_down(1), &mut wire).unwrap();
    encode_event(&Event::key_down(2), &mut wire).unwrap();
    wire.extend_from_slice(&[0x77, 0x77, 0, 0]);
    service.write_all(&wire).unwrap();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Event::key_down(1));
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Event::key_down(2));
    assert_eq!(
        rx.recv_timeout(TIMEOUT),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );

    assert!(!scheduler.connection().is_valid());
    assert_eq!(
        scheduler.connection().last_error().as_deref(),
        Some("failed to decode a protocol message: unknown opcode 0x7777")
    );
}

#[test]
fn test_final_frames_are_delivered_before_half_close() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let last = vec![Event::key_down(3), Event::key_up(3)];
    send_events(&mut service, &last);
    service.shutdown(Shutdown::Write).unwrap();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    let received: Vec<Event> = (0..last.len())
        .map(|_| rx.recv_timeout(TIMEOUT).unwrap())
        .collect();
    assert_eq!(received, last);
    assert_eq!(
        rx.recv_timeout(TIMEOUT),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );
    assert_eq!(
        scheduler.connection().last_error().as_deref(),
        Some("the display connection hung up")
    );
}

#[test]
fn test_service_close_is_a_hang_up() {
    init_logger();
    let (mut scheduler, service) = connect();

    let (tx, rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    drop(service);

    assert!(matches!(
        rx.recv_timeout(TIMEOUT),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
    assert!(wait_until(TIMEOUT, || !scheduler.is_running()));
    assert_eq!(
        scheduler.connection().last_error().as_deref(),
        Some("the display connection hung up")
    );
}

#[test]
fn test_oversized_frame_is_rejected() {
    init_logger();
    let (mut scheduler, mut service) = connect();

    let (tx, _rx) = mpsc::channel();
    scheduler.start(ChannelSink::new(tx)).unwrap();

    let len = (codec::MAX_PAYLOAD + 1) as u16;
    let mut header = codec::OP_KEY.to_le_bytes().to_vec();
    header.extend_from_slice(&len.to_le_bytes());
    service.write_all(&header).unwrap();

    assert!(wait_until(TIMEOUT, || !scheduler.connection().is_valid()));
    assert!(
        scheduler
            .connection()
            .last_error()
            .unwrap()
            .contains("exceeds the maximum")
    );

    // The client end stays open until the scheduler is dropped.
    service.set_nonblocking(true).unwrap();
    let mut probe = [0u8; 1];
    assert_eq!(
        service.read(&mut probe).unwrap_err().kind(),
        ErrorKind::WouldBlock
    );
}
