//! Unit tests for the RPC engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fiberscope_channel::{Channel, MemoryChannel, READY_SENTINEL};
use fiberscope_codec::WireValue;
use rstest::rstest;

use crate::endpoint::{HandlerTable, RpcEndpoint, RpcOptions};
use crate::error::{HandlerError, RpcError};
use crate::presets::{LinkedEndpoints, linked_pair};

fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

fn echo_handlers() -> HandlerTable {
    HandlerTable::new().with(
        "echo",
        Arc::new(|args: &[WireValue]| {
            args.first()
                .cloned()
                .ok_or_else(|| HandlerError::invalid_args("echo needs one argument"))
        }),
    )
}

#[rstest]
fn resolves_call_with_remote_result() {
    let LinkedEndpoints { host, panel: _panel_endpoint } = linked_pair(
        HandlerTable::new(),
        echo_handlers(),
        RpcOptions::default(),
    );

    let result = host
        .call("echo", vec![WireValue::Str("hello".to_owned())])
        .expect("call failed");

    assert_eq!(result, WireValue::Str("hello".to_owned()));
}

#[rstest]
fn rejects_unknown_method_individually() {
    let LinkedEndpoints { host, panel: _panel_endpoint } = linked_pair(
        HandlerTable::new(),
        echo_handlers(),
        RpcOptions::default(),
    );

    let missing = host.call("nonexistent", vec![]);
    assert!(matches!(missing, Err(RpcError::MethodNotFound { .. })));

    // The failed call must not poison the channel.
    let ok = host.call("echo", vec![WireValue::Int(1)]).expect("call failed");
    assert_eq!(ok, WireValue::Int(1));
}

#[rstest]
fn surfaces_handler_failure_as_remote_error() {
    let handlers = HandlerTable::new().with(
        "explode",
        Arc::new(|_args: &[WireValue]| Err(HandlerError::failed("boom"))),
    );
    let LinkedEndpoints { host, panel: _panel_endpoint } =
        linked_pair(HandlerTable::new(), handlers, RpcOptions::default());

    let result = host.call("explode", vec![]);

    let Err(RpcError::Remote { method, message }) = result else {
        panic!("expected remote error, got {result:?}");
    };
    assert_eq!(method, "explode");
    assert_eq!(message, "boom");
}

#[rstest]
fn concurrent_calls_each_get_their_own_result() {
    let handlers = HandlerTable::new().with(
        "double",
        Arc::new(|args: &[WireValue]| {
            let input = args
                .first()
                .and_then(WireValue::as_int)
                .ok_or_else(|| HandlerError::invalid_args("expected an int"))?;
            // Uneven per-call delays shuffle completion order.
            thread::sleep(Duration::from_millis((input % 7).unsigned_abs()));
            Ok(WireValue::Int(input * 2))
        }),
    );
    let LinkedEndpoints { host, panel: _panel_endpoint } =
        linked_pair(HandlerTable::new(), handlers, RpcOptions::default());
    let host = Arc::new(host);

    let workers: Vec<_> = (0..50_i64)
        .map(|input| {
            let caller = Arc::clone(&host);
            thread::spawn(move || {
                let result = caller
                    .call("double", vec![WireValue::Int(input)])
                    .expect("call failed");
                assert_eq!(result, WireValue::Int(input * 2), "cross-matched response");
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }
}

#[rstest]
fn times_out_when_nothing_responds() {
    // A peer with no endpoint attached never answers.
    let (caller_channel, _silent_peer) = MemoryChannel::pair();
    let endpoint = RpcEndpoint::new(
        Arc::new(caller_channel),
        HandlerTable::new(),
        RpcOptions {
            timeout: Duration::from_millis(100),
        },
    );

    let start = Instant::now();
    let result = endpoint.call("anything", vec![]);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(RpcError::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2), "deadline overshot: {elapsed:?}");
}

#[rstest]
fn discards_response_arriving_after_timeout() {
    let (caller_channel, peer) = MemoryChannel::pair();
    let endpoint = RpcEndpoint::new(
        Arc::new(caller_channel),
        HandlerTable::new(),
        RpcOptions {
            timeout: Duration::from_millis(50),
        },
    );

    let result = endpoint.call("slow", vec![]);
    assert!(matches!(result, Err(RpcError::Timeout { .. })));

    // First call id is 1; answer it well after the caller gave up.
    peer.send(r#"{"type":"response","id":1,"result":{"str":"late"}}"#);
    thread::sleep(Duration::from_millis(30));

    // The endpoint must still be functional and the stale payload ignored.
    let again = endpoint.call("slow", vec![]);
    assert!(matches!(again, Err(RpcError::Timeout { .. })));
}

#[rstest]
fn close_rejects_outstanding_and_future_calls() {
    let (caller_channel, _silent_peer) = MemoryChannel::pair();
    let endpoint = Arc::new(RpcEndpoint::new(
        Arc::new(caller_channel),
        HandlerTable::new(),
        RpcOptions {
            timeout: Duration::from_secs(5),
        },
    ));

    let in_flight = Arc::clone(&endpoint);
    let worker = thread::spawn(move || in_flight.call("hanging", vec![]));
    thread::sleep(Duration::from_millis(50));
    endpoint.close();

    let outcome = worker.join().expect("worker panicked");
    assert!(matches!(outcome, Err(RpcError::ChannelClosed)));
    assert!(matches!(
        endpoint.call("after-close", vec![]),
        Err(RpcError::ChannelClosed)
    ));
}

#[rstest]
fn calls_racing_with_close_fail_fast_as_closed() {
    let (caller_channel, _silent_peer) = MemoryChannel::pair();
    let endpoint = Arc::new(RpcEndpoint::new(
        Arc::new(caller_channel),
        HandlerTable::new(),
        RpcOptions {
            timeout: Duration::from_secs(5),
        },
    ));

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let caller = Arc::clone(&endpoint);
            thread::spawn(move || caller.call("hanging", vec![]))
        })
        .collect();
    endpoint.close();

    let start = Instant::now();
    for worker in workers {
        let outcome = worker.join().expect("worker panicked");
        assert!(matches!(outcome, Err(RpcError::ChannelClosed)));
    }
    // No call may be left to wait out its timeout as an orphan.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[rstest]
fn forwards_events_only_while_subscribed() {
    let LinkedEndpoints { host, panel } = linked_pair(
        HandlerTable::new(),
        HandlerTable::new(),
        RpcOptions::default(),
    );

    let received = Arc::new(Mutex::new(Vec::new()));

    // Unsubscribed topics are not forwarded at all.
    host.publish("react-scan:metrics", &WireValue::Int(0));

    let sink = Arc::clone(&received);
    let subscription = panel
        .subscribe(
            "react-scan:metrics",
            Arc::new(move |payload: &WireValue| {
                sink.lock().expect("poisoned").push(payload.clone());
            }),
        )
        .expect("subscribe failed");

    host.publish("react-scan:metrics", &WireValue::Int(1));
    assert!(wait_until(Duration::from_secs(1), || {
        !received.lock().expect("poisoned").is_empty()
    }));
    assert_eq!(received.lock().expect("poisoned").clone(), vec![WireValue::Int(1)]);

    subscription.dispose();
    // Give the fire-and-forget unsubscribe time to cross the channel.
    thread::sleep(Duration::from_millis(200));
    host.publish("react-scan:metrics", &WireValue::Int(2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(received.lock().expect("poisoned").len(), 1);
}

#[rstest]
fn ignores_handshake_sentinels() {
    let (endpoint_channel, peer) = MemoryChannel::pair();
    let _endpoint = RpcEndpoint::new(
        Arc::new(endpoint_channel),
        echo_handlers(),
        RpcOptions::default(),
    );

    let responses = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&responses);
    let _watch = peer.subscribe(Arc::new(move |_payload: &str| {
        counter.fetch_add(1, Ordering::Relaxed);
    }));

    peer.send(READY_SENTINEL);
    thread::sleep(Duration::from_millis(50));

    assert_eq!(responses.load(Ordering::Relaxed), 0);
}

#[rstest]
fn drops_malformed_payload_and_stays_alive() {
    let (endpoint_channel, peer) = MemoryChannel::pair();
    let _endpoint = RpcEndpoint::new(
        Arc::new(endpoint_channel),
        echo_handlers(),
        RpcOptions::default(),
    );

    let responses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&responses);
    let _watch = peer.subscribe(Arc::new(move |payload: &str| {
        sink.lock().expect("poisoned").push(payload.to_owned());
    }));

    peer.send("this is not json");
    peer.send(r#"{"type":"call","id":42,"method":"echo","args":[{"int":5}]}"#);

    assert!(wait_until(Duration::from_secs(1), || {
        !responses.lock().expect("poisoned").is_empty()
    }));
    let payloads = responses.lock().expect("poisoned").clone();
    assert_eq!(payloads.len(), 1, "garbage must produce no response");
    assert!(payloads.first().is_some_and(|p| p.contains(r#""id":42"#)));
}
