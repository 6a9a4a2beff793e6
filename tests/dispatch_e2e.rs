use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use zkwatch::{
    watcher_fn, DispatcherConfig, EventDispatcher, EventType, SessionState, Signal, WatchError,
    WatchKind, WatchMode, WatchStream, WatchedEvent, WatcherHandle, WireEvent,
};

fn recorder() -> (WatcherHandle, Arc<Mutex<Vec<WatchedEvent>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (watcher_fn(move |event| sink.lock().unwrap().push(event)), log)
}

fn node(event_type: EventType, path: &str) -> Signal {
    Signal::node_changed(event_type, path).unwrap()
}

#[test]
fn default_and_one_shot_watchers_see_expected_sequence() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let transport = dispatcher.sender();

    transport.send_state(SessionState::Disconnected).unwrap();
    transport.send_state(SessionState::SyncConnected).unwrap();
    dispatcher.flush().unwrap();

    let (one_shot, one_shot_log) = recorder();
    dispatcher
        .registry()
        .register("/a", WatchKind::Exists, one_shot, WatchMode::OneShot)
        .unwrap();

    transport.send(node(EventType::NodeCreated, "/a")).unwrap();
    transport.send(node(EventType::NodeDataChanged, "/a")).unwrap();
    dispatcher.flush().unwrap();

    let expected = vec![
        WatchedEvent::session(SessionState::Disconnected),
        WatchedEvent::session(SessionState::SyncConnected),
        WatchedEvent::node(SessionState::SyncConnected, EventType::NodeCreated, "/a").unwrap(),
        WatchedEvent::node(SessionState::SyncConnected, EventType::NodeDataChanged, "/a").unwrap(),
    ];
    assert_eq!(*default_log.lock().unwrap(), expected);
    assert_eq!(*one_shot_log.lock().unwrap(), vec![expected[2].clone()]);
    assert!(dispatcher.registry().is_empty());
}

#[test]
fn one_shot_registered_up_front_only_fires_once_for_node_events() {
    let (watcher, log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), None).unwrap();
    dispatcher
        .registry()
        .register("/a", WatchKind::Data, watcher, WatchMode::OneShot)
        .unwrap();

    let transport = dispatcher.sender();
    transport.send_state(SessionState::Disconnected).unwrap();
    transport.send_state(SessionState::SyncConnected).unwrap();
    transport.send(node(EventType::NodeCreated, "/a")).unwrap();
    transport.send(node(EventType::NodeDataChanged, "/a")).unwrap();
    dispatcher.flush().unwrap();

    let kinds: Vec<EventType> = log.lock().unwrap().iter().map(WatchedEvent::event_type).collect();
    assert_eq!(kinds, vec![EventType::None, EventType::None, EventType::NodeCreated]);
}

#[test]
fn disconnect_is_broadcast_to_every_registered_watcher() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let registry = dispatcher.registry();

    let (a, a_log) = recorder();
    let (b, b_log) = recorder();
    registry.register("/a", WatchKind::Data, a, WatchMode::OneShot).unwrap();
    registry.register("/b/c", WatchKind::Children, b, WatchMode::Persistent).unwrap();

    dispatcher.send(Signal::StateChanged(SessionState::SyncConnected)).unwrap();
    dispatcher.send(Signal::StateChanged(SessionState::Disconnected)).unwrap();
    dispatcher.flush().unwrap();

    for log in [&default_log, &a_log, &b_log] {
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&WatchedEvent::session(SessionState::Disconnected))
        );
    }
    assert_eq!(registry.registration_count(), 2);
}

#[test]
fn expiry_releases_every_watch() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let (path_watcher, path_log) = recorder();
    dispatcher
        .registry()
        .register("/a", WatchKind::Data, path_watcher.clone(), WatchMode::Persistent)
        .unwrap();

    let transport = dispatcher.sender();
    transport.send_state(SessionState::SyncConnected).unwrap();
    transport.send_state(SessionState::Disconnected).unwrap();
    transport.send_state(SessionState::Expired).unwrap();
    transport.send(node(EventType::NodeDataChanged, "/a")).unwrap();
    transport.send_state(SessionState::SyncConnected).unwrap();
    dispatcher.flush().unwrap();

    assert_eq!(dispatcher.registry().registration_count(), 0);
    assert!(dispatcher.registry().is_closed());
    assert_eq!(
        path_log.lock().unwrap().last(),
        Some(&WatchedEvent::session(SessionState::Expired))
    );
    assert_eq!(path_log.lock().unwrap().len(), 3);
    assert_eq!(default_log.lock().unwrap().len(), 3);

    let errors: Vec<WatchError> = dispatcher.errors().try_iter().collect();
    assert_eq!(
        errors,
        vec![
            WatchError::SessionClosed {
                state: SessionState::Expired
            },
            WatchError::IllegalStateTransition {
                from: SessionState::Expired,
                to: SessionState::SyncConnected
            },
        ]
    );

    let err = dispatcher
        .registry()
        .register("/a", WatchKind::Data, path_watcher, WatchMode::OneShot)
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn reconnect_through_no_sync_connected_keeps_watches() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let (path_watcher, path_log) = recorder();
    dispatcher
        .registry()
        .register("/a", WatchKind::Data, path_watcher, WatchMode::OneShot)
        .unwrap();

    let transport = dispatcher.sender();
    transport.send_state(SessionState::SyncConnected).unwrap();
    transport.send_state(SessionState::Disconnected).unwrap();
    transport.send_state(SessionState::NoSyncConnected).unwrap();
    transport.send(node(EventType::NodeDataChanged, "/a")).unwrap();
    transport.send_state(SessionState::SyncConnected).unwrap();
    dispatcher.flush().unwrap();

    let seen: Vec<(SessionState, EventType)> = default_log
        .lock()
        .unwrap()
        .iter()
        .map(|e| (e.state(), e.event_type()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (SessionState::SyncConnected, EventType::None),
            (SessionState::Disconnected, EventType::None),
            (SessionState::NoSyncConnected, EventType::None),
            (SessionState::NoSyncConnected, EventType::NodeDataChanged),
            (SessionState::SyncConnected, EventType::None),
        ]
    );
    assert_eq!(path_log.lock().unwrap().len(), 4);
    assert!(dispatcher.registry().is_empty());
    assert_eq!(dispatcher.stats().signals_rejected(), 0);
}

#[test]
fn unknown_to_unknown_leaves_session_unusable() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let (path_watcher, _) = recorder();
    dispatcher
        .registry()
        .register("/a", WatchKind::Data, path_watcher.clone(), WatchMode::Persistent)
        .unwrap();

    let transport = dispatcher.sender();
    transport.send_state(SessionState::Unknown).unwrap();
    transport.send_state(SessionState::SyncConnected).unwrap();
    dispatcher.flush().unwrap();

    let errors: Vec<WatchError> = dispatcher.errors().try_iter().collect();
    assert_eq!(
        errors,
        vec![
            WatchError::IllegalStateTransition {
                from: SessionState::Unknown,
                to: SessionState::Unknown
            },
            WatchError::SessionClosed {
                state: SessionState::Unknown
            },
        ]
    );
    assert!(default_log.lock().unwrap().is_empty());
    assert!(dispatcher.registry().is_empty());

    let err = dispatcher
        .registry()
        .register("/a", WatchKind::Data, path_watcher, WatchMode::OneShot)
        .unwrap_err();
    assert_eq!(
        err,
        WatchError::SessionClosed {
            state: SessionState::Unknown
        }
    );
    assert_eq!(dispatcher.registry().registration_count(), 0);
}

#[test]
fn failing_watcher_does_not_stop_delivery() {
    let (default, default_log) = recorder();
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    dispatcher.send(Signal::StateChanged(SessionState::SyncConnected)).unwrap();
    dispatcher.flush().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let flaky = watcher_fn(move |_| {
        if c.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first call fails");
        }
    });
    let (steady, steady_log) = recorder();
    let registry = dispatcher.registry();
    registry.register("/n", WatchKind::Data, flaky.clone(), WatchMode::Persistent).unwrap();
    registry.register("/n", WatchKind::Data, steady, WatchMode::Persistent).unwrap();

    dispatcher.send(node(EventType::NodeDataChanged, "/n")).unwrap();
    dispatcher.send(node(EventType::NodeDataChanged, "/n")).unwrap();
    dispatcher.flush().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(steady_log.lock().unwrap().len(), 2);
    assert_eq!(default_log.lock().unwrap().len(), 3);
    assert_eq!(dispatcher.stats().watcher_failures(), 1);

    match dispatcher.errors().try_recv().unwrap() {
        WatchError::WatcherInvocation { watcher, message } => {
            assert_eq!(watcher, flaky.id());
            assert!(message.contains("first call fails"));
        }
        other => panic!("expected watcher invocation error, got {other:?}"),
    }
}

#[test]
fn wire_frames_are_decoded_before_dispatch() {
    let (default, stream) = WatchStream::bounded(16);
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let transport = dispatcher.sender();

    transport.send_wire(WireEvent::new(-1, 3, None)).unwrap();
    let err = transport.send_wire(WireEvent::new(9, 3, Some("/x".to_string()))).unwrap_err();
    assert!(matches!(err, WatchError::InvalidWireCode { code: 9, .. }));
    transport
        .send_wire(WireEvent::new(2, 3, Some("/x".to_string())))
        .unwrap();

    let first = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    let second = stream.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(first, WatchedEvent::session(SessionState::SyncConnected));
    assert_eq!(second.event_type(), EventType::NodeDeleted);
    assert_eq!(second.path(), Some("/x"));
}

#[test]
fn events_arrive_in_transport_order() {
    let (default, stream) = WatchStream::bounded(1024);
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default)).unwrap();
    let transport = dispatcher.sender();

    let producer = thread::spawn(move || {
        transport.send_state(SessionState::SyncConnected).unwrap();
        for i in 0..500 {
            transport
                .send(Signal::node_changed(EventType::NodeCreated, format!("/seq/{i}")).unwrap())
                .unwrap();
        }
    });
    producer.join().unwrap();
    dispatcher.flush().unwrap();

    assert_eq!(stream.recv().unwrap(), WatchedEvent::session(SessionState::SyncConnected));
    for i in 0..500 {
        let ev = stream.recv().unwrap();
        assert_eq!(ev.path(), Some(format!("/seq/{i}").as_str()));
    }
    assert_eq!(stream.dropped(), 0);
}

#[test]
fn concurrent_registration_fires_at_most_once() {
    let dispatcher = EventDispatcher::new(DispatcherConfig::default(), None).unwrap();
    dispatcher.send(Signal::StateChanged(SessionState::SyncConnected)).unwrap();
    dispatcher.flush().unwrap();
    let registry = Arc::clone(dispatcher.registry());

    for round in 0..50 {
        let path = format!("/race/{round}");
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let watcher = watcher_fn(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let reg = Arc::clone(&registry);
        let reg_path = path.clone();
        let rpc = thread::spawn(move || {
            reg.register(reg_path, WatchKind::Data, watcher, WatchMode::OneShot).unwrap();
        });
        dispatcher.send(node(EventType::NodeDataChanged, &path)).unwrap();
        rpc.join().unwrap();
        dispatcher.flush().unwrap();

        let still_registered = registry.watched_paths(WatchKind::Data).contains(&path);
        match fired.load(Ordering::SeqCst) {
            0 => assert!(still_registered, "round {round}: watch neither fired nor kept"),
            1 => assert!(!still_registered, "round {round}: watch fired and kept"),
            n => panic!("round {round}: fired {n} times"),
        }
        registry.resolve_and_consume(&path, EventType::NodeDeleted);
    }
}
