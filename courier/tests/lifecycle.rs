/**
 * Worker lifecycle: graceful drain, abort, idle teardown with lazy
 * restart, shutdown idempotence, and drop semantics.
 */
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier::Config;
use support::{mock_client, wait_until, MockBehavior};

fn quick_config() -> Config {
    Config {
        max_concurrent: 3,
        ..Config::default()
    }
}

/**
 * Graceful drain: everything accepted before (and nothing is rejected
 * during) the close still completes, then the worker exits.
 */
#[test]
fn close_when_finished_drains_everything() {
    let (client, _handle) = mock_client(
        quick_config(),
        MockBehavior::AutoComplete { after_steps: 1 },
    );

    let callbacks = Arc::new(AtomicUsize::new(0));
    for i in 0..5 {
        let callbacks = callbacks.clone();
        client
            .get(format!("http://localhost:3001/drain/{i}"))
            .on_complete(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            })
            .submit()
            .expect("submit accepts a well-formed request");
    }

    client.close_when_finished();
    client.join();

    assert_eq!(callbacks.load(Ordering::SeqCst), 5);
    assert!(!client.has_live_worker());
    assert_eq!(client.active_count(), 0);
}

/**
 * Abort abandons queued and in-flight transfers without callbacks, and
 * join returns promptly instead of waiting for the transfers.
 */
#[test]
fn abort_abandons_without_callbacks() {
    let (client, handle) = mock_client(quick_config(), MockBehavior::Manual);

    let callbacks = Arc::new(AtomicUsize::new(0));
    {
        let callbacks = callbacks.clone();
        client
            .get("http://localhost:3001/never-finishes")
            .on_complete(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            })
            .submit()
            .expect("submit accepts a well-formed request");
    }

    /* Let the transfer reach the engine so it is genuinely in flight. */
    assert!(wait_until(Duration::from_secs(5), || handle.parked_count() == 1));

    let before = Instant::now();
    client.abort();
    client.join();
    assert!(
        before.elapsed() < Duration::from_secs(2),
        "join after abort took {:?}",
        before.elapsed()
    );

    assert!(!client.has_live_worker());
    assert_eq!(client.active_count(), 0);

    /* The abandoned transfer never gets a callback. */
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

/**
 * Repeated shutdown requests collapse into one: the second and third
 * calls are observable no-ops.
 */
#[test]
fn shutdown_requests_are_idempotent() {
    let (client, _handle) = mock_client(
        quick_config(),
        MockBehavior::AutoComplete { after_steps: 1 },
    );

    client
        .get("http://localhost:3001/once")
        .submit()
        .expect("submit accepts a well-formed request");

    client.close_when_finished();
    client.close_when_finished();
    client.join();
    assert!(!client.has_live_worker());

    client.abort();
    client.abort();
    client.join();
    assert!(!client.has_live_worker());
}

/**
 * An idle worker exits within the idle timeout and the next submit
 * transparently spawns a fresh worker and a fresh engine.
 */
#[test]
fn idle_worker_tears_down_and_restarts() {
    let (client, handle) = mock_client(
        Config {
            max_concurrent: 3,
            idle_timeout: Duration::from_millis(100),
            ..Config::default()
        },
        MockBehavior::AutoComplete { after_steps: 1 },
    );

    let callbacks = Arc::new(AtomicUsize::new(0));
    {
        let callbacks = callbacks.clone();
        client
            .get("http://localhost:3001/first")
            .on_complete(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            })
            .submit()
            .expect("submit accepts a well-formed request");
    }

    assert!(wait_until(Duration::from_secs(5), || {
        callbacks.load(Ordering::SeqCst) == 1
    }));
    assert!(client.has_live_worker());

    /* Nothing left to do: the worker should retire on its own. */
    assert!(wait_until(Duration::from_secs(5), || !client.has_live_worker()));
    assert_eq!(client.active_count(), 0);
    assert_eq!(handle.generations(), 1);

    /* The next submit observes no worker, then restarts one lazily. */
    {
        let callbacks = callbacks.clone();
        client
            .get("http://localhost:3001/second")
            .on_complete(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            })
            .submit()
            .expect("submit accepts a well-formed request");
    }
    assert!(client.has_live_worker());
    assert!(wait_until(Duration::from_secs(5), || {
        callbacks.load(Ordering::SeqCst) == 2
    }));
    assert_eq!(handle.generations(), 2, "restart must build a fresh engine");

    client.close_when_finished();
    client.join();
}

/**
 * Dropping the client implies abort: the orphaned worker abandons its
 * work and no callback fires afterwards.
 */
#[test]
fn dropping_client_aborts_outstanding_work() {
    let (client, handle) = mock_client(quick_config(), MockBehavior::Manual);

    let callbacks = Arc::new(AtomicUsize::new(0));
    {
        let callbacks = callbacks.clone();
        client
            .get("http://localhost:3001/orphaned")
            .on_complete(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            })
            .submit()
            .expect("submit accepts a well-formed request");
    }
    assert!(wait_until(Duration::from_secs(5), || handle.parked_count() == 1));

    drop(client);

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}
