//! End-to-end flows through the orchestrator's receive loop.

use std::sync::Arc;
use std::time::Duration;

use courier_bus::{ComponentRegistry, Mailbox, Router, RoutingTable};
use courier_memory::{LocationTracker, MemoryLocationLog, SqliteLocationLog};
use courier_runtime::{
    CONSOLE, ConsoleComponent, DispatchEngine, Orchestrator, OrchestratorConfig,
    ResponderSettings, standard_rules,
};
use courier_types::{Envelope, LocationEvent, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, BufReader};

fn settings() -> ResponderSettings {
    ResponderSettings {
        tracked_user: "Enfors".to_string(),
        ip_probe_addr: "127.0.0.1:9".to_string(),
        status_command: vec!["echo".to_string(), "ok".to_string()],
    }
}

fn build(registry: &ComponentRegistry, tracker: Arc<LocationTracker>) -> Orchestrator {
    let engine = DispatchEngine::new(standard_rules(tracker.clone(), &settings()).unwrap());
    let router = Router::new(
        RoutingTable::new()
            .with_route("Telegram", "Telegram")
            .with_route("TwitterStreams", "TwitterRest")
            .with_route(CONSOLE, CONSOLE),
    );
    Orchestrator::new(
        OrchestratorConfig::default(),
        registry.clone(),
        router,
        tracker,
        engine,
    )
    .unwrap()
}

fn memory_tracker() -> Arc<LocationTracker> {
    Arc::new(LocationTracker::new(Box::new(MemoryLocationLog::new())))
}

async fn next(mailbox: &mut Mailbox) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), mailbox.receive())
        .await
        .expect("envelope in time")
        .expect("mailbox open")
}

#[tokio::test]
async fn telegram_ping_gets_pong() {
    let registry = ComponentRegistry::new();
    let mut telegram = registry.open_mailbox("Telegram").unwrap();
    let orchestrator = build(&registry, memory_tracker());
    let cancel = orchestrator.cancellation_token();
    let main_loop = tokio::spawn(orchestrator.run());

    registry
        .send("Main", Envelope::new("Telegram", Message::user_message("x", "Ping")))
        .unwrap();

    let reply = next(&mut telegram).await;
    assert_eq!(reply.sender(), "Main");
    assert_eq!(reply.kind(), MessageKind::UserMessage);
    assert_eq!(reply.message(), &Message::user_message("x", "Pong."));

    cancel.cancel();
    main_loop.await.unwrap();
}

#[tokio::test]
async fn stream_messages_are_answered_over_rest() {
    let registry = ComponentRegistry::new();
    let mut rest = registry.open_mailbox("TwitterRest").unwrap();
    let _streams = registry.open_mailbox("TwitterStreams").unwrap();
    let orchestrator = build(&registry, memory_tracker());
    let cancel = orchestrator.cancellation_token();
    let main_loop = tokio::spawn(orchestrator.run());

    for text in ["good morning bot", "test"] {
        registry
            .send("Main", Envelope::new("TwitterStreams", Message::user_message("y", text)))
            .unwrap();
    }

    assert_eq!(
        next(&mut rest).await.message(),
        &Message::user_message("y", "Good morning!")
    );
    assert_eq!(
        next(&mut rest).await.message(),
        &Message::user_message("y", "I am up and running.")
    );

    cancel.cancel();
    main_loop.await.unwrap();
}

#[tokio::test]
async fn console_session_updates_and_reports_location() {
    let registry = ComponentRegistry::new();
    let tracker = memory_tracker();
    let mut orchestrator = build(&registry, tracker.clone());
    let cancel = orchestrator.cancellation_token();

    let (out_write, out_read) = tokio::io::duplex(4096);
    let input: &'static [u8] = b"/arrive Home\n/leave Work\nlocate\nping\n";
    orchestrator
        .spawn_component(Box::new(ConsoleComponent::new(
            "operator",
            "Main",
            BufReader::new(input),
            out_write,
        )))
        .unwrap();
    orchestrator.validate_routes().unwrap_err();
    let _telegram = registry.open_mailbox("Telegram").unwrap();
    let _rest = registry.open_mailbox("TwitterRest").unwrap();
    orchestrator.validate_routes().unwrap();

    let main_loop = tokio::spawn(orchestrator.run());

    let mut out = BufReader::new(out_read).lines();
    let located = tokio::time::timeout(Duration::from_secs(2), out.next_line())
        .await
        .expect("locate reply in time")
        .unwrap()
        .unwrap();
    assert_eq!(located, "Enfors arrived at Home just now.");
    let pong = tokio::time::timeout(Duration::from_secs(2), out.next_line())
        .await
        .expect("ping reply in time")
        .unwrap()
        .unwrap();
    assert_eq!(pong, "Pong.");

    // The stale departure from Work was dropped.
    assert_eq!(tracker.history().unwrap().len(), 1);
    assert!(tracker.state().is_present);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), main_loop)
        .await
        .expect("orchestrator stops")
        .unwrap();
}

#[tokio::test]
async fn spawning_the_same_component_twice_fails() {
    let registry = ComponentRegistry::new();
    let mut orchestrator = build(&registry, memory_tracker());
    let console = || {
        Box::new(ConsoleComponent::new(
            "operator",
            "Main",
            BufReader::new(&b""[..]),
            tokio::io::sink(),
        ))
    };
    orchestrator.spawn_component(console()).unwrap();
    assert!(orchestrator.spawn_component(console()).is_err());
    orchestrator.cancellation_token().cancel();
    orchestrator.run().await;
}

#[tokio::test]
async fn location_history_persists_across_restarts() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("location.db");
    let path = path.to_string_lossy().to_string();

    {
        let registry = ComponentRegistry::new();
        let tracker = Arc::new(
            LocationTracker::restore(Box::new(SqliteLocationLog::open(&path).unwrap())).unwrap(),
        );
        let orchestrator = build(&registry, tracker);
        let cancel = orchestrator.cancellation_token();
        for (location, arrived) in [("Home", true), ("Home", false), ("Work", true)] {
            orchestrator
                .handle_envelope(&Envelope::new(
                    "Gps",
                    Message::location_update(location, arrived),
                ))
                .unwrap();
        }
        cancel.cancel();
        orchestrator.run().await;
    }

    let tracker =
        LocationTracker::restore(Box::new(SqliteLocationLog::open(&path).unwrap())).unwrap();
    let last = tracker.most_recent_event().unwrap();
    assert_eq!(last.location, "Work");
    assert_eq!(last.event, LocationEvent::Arrived);
    assert_eq!(tracker.history().unwrap().len(), 3);
    assert!(tracker.state().is_present);
}
