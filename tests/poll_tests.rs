mod common;

use common::{expected_ids, CaptureSink, Harness, Reply, ScriptedSession, SteppingClock, NOW};
use sia_events::cli::event::{run_with_session, EventArgs};
use sia_events::cli::{RunError, EXIT_AUTH_FAILURE};
use sia_events::config::parse::parse_config;
use sia_events::config::EventType;
use sia_events::fetch::Mode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_tail_windows_are_contiguous() {
    let token = CancellationToken::new();
    let stop = token.clone();
    // stop once the second cycle has started
    let session = ScriptedSession::new(2, vec![(1, Reply::rows(2))]).on_page_one(move |n| {
        if n == 2 {
            stop.cancel();
        }
    });
    let harness = Harness {
        token,
        ..Harness::new(session)
    };
    let controller = harness.controller(
        10,
        Mode::Tail,
        Duration::from_secs(1),
        2,
        Arc::new(SteppingClock::new(NOW, 60)),
    );

    let summary = tokio::time::timeout(Duration::from_secs(10), controller.run())
        .await
        .expect("tail should stop after the second cycle")
        .unwrap();

    let calls = harness.session.page_one_calls();
    assert_eq!(calls.len(), 2);
    // first window is one poll interval wide, ending 180s before now
    assert_eq!((calls[0].start, calls[0].end), (NOW - 181, NOW - 180));
    assert_eq!(calls[1].start, calls[0].end);
    assert_eq!(calls[1].end, NOW + 60 - 180);

    assert_eq!(summary.cycles.len(), 2);
    assert_eq!(harness.sink.ids().len(), 4);
}

#[tokio::test]
async fn test_slow_cycle_moves_on_without_sleeping() {
    let token = CancellationToken::new();
    let stop = token.clone();
    // each page-1 call outlasts the 1s poll interval
    let session = ScriptedSession::new(1, vec![(1, Reply::delayed(1, 1100))]).on_page_one(
        move |n| {
            if n == 2 {
                stop.cancel();
            }
        },
    );
    let harness = Harness {
        token,
        ..Harness::new(session)
    };
    let controller = harness.controller(
        10,
        Mode::Tail,
        Duration::from_secs(1),
        1,
        Arc::new(SteppingClock::new(NOW, 60)),
    );

    let started = Instant::now();
    let summary = tokio::time::timeout(Duration::from_secs(10), controller.run())
        .await
        .expect("tail should stop after the second cycle")
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.cycles.len(), 2);
    let calls = harness.session.page_one_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].start, calls[0].end);
    // two 1.1s fetches back to back; a sleep between them would add another poll interval
    assert!(elapsed < Duration::from_millis(3000), "took {:?}", elapsed);
    assert_eq!(harness.sink.ids(), expected_ids(&[1, 1], 1));
}

#[tokio::test]
async fn test_tail_stop_during_sleep_returns_promptly() {
    let harness = Harness::new(ScriptedSession::new(1, vec![(1, Reply::rows(1))]));
    let controller = harness.controller(
        10,
        Mode::Tail,
        Duration::from_secs(30),
        1,
        Arc::new(SteppingClock::new(NOW, 30)),
    );

    let stop = harness.token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("stop should interrupt the poll sleep")
        .unwrap();

    assert_eq!(summary.cycles.len(), 1);
    assert_eq!(harness.session.page_one_calls().len(), 1);
    assert_eq!(harness.sink.ids(), expected_ids(&[1], 1));
}

#[tokio::test]
async fn test_tail_stops_on_auth_failure() {
    let harness = Harness::new(ScriptedSession::new(0, vec![(1, Reply::Status(401))]));
    let controller = harness.controller(
        10,
        Mode::Tail,
        Duration::from_secs(1),
        1,
        Arc::new(SteppingClock::new(NOW, 60)),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("auth failure should end the tail");

    assert!(result.is_err());
    assert_eq!(harness.session.calls().len(), 1);
}

#[tokio::test]
async fn test_tail_continues_after_failed_cycle() {
    let token = CancellationToken::new();
    let stop = token.clone();
    let session = ScriptedSession::new(0, vec![(1, Reply::Status(500))]).on_page_one(move |n| {
        if n == 2 {
            stop.cancel();
        }
    });
    let harness = Harness {
        token,
        ..Harness::new(session)
    };
    let controller = harness.controller(
        10,
        Mode::Tail,
        Duration::from_secs(1),
        1,
        Arc::new(SteppingClock::new(NOW, 60)),
    );

    let summary = tokio::time::timeout(Duration::from_secs(10), controller.run())
        .await
        .expect("tail should stop after the second cycle")
        .unwrap();

    assert!(summary.cycles.is_empty());
    let calls = harness.session.page_one_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].start, calls[0].end);
}

fn config() -> sia_events::config::Config {
    parse_config(
        r#"
api:
  base_url: https://api.example.net
  account_id: "4411"
fetch:
  page_size: 2
  concurrency: 3
"#,
    )
    .unwrap()
}

fn args(start: i64, end: i64) -> EventArgs {
    EventArgs {
        event_type: EventType::Dns,
        start: Some(start),
        end: Some(end),
        output: None,
        tail: false,
        poll: None,
        limit: None,
        span: None,
        concurrent: None,
        page_size: None,
    }
}

#[tokio::test]
async fn test_event_command_writes_window_in_order() {
    let session = Arc::new(ScriptedSession::new(
        5,
        vec![
            (1, Reply::rows(2)),
            (2, Reply::delayed(2, 50)),
            (3, Reply::rows(1)),
        ],
    ));
    let sink = CaptureSink::default();

    let summary = run_with_session(
        &config(),
        &args(1000, 2000),
        session.clone(),
        sink.shared(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let mut ids = expected_ids(&[1, 2], 2);
    ids.push("p3-0".to_string());
    assert_eq!(sink.ids(), ids);
    assert_eq!(summary.stats.events, 5);
    assert!(session.calls().iter().all(|c| (c.start, c.end) == (1000, 2000)));
}

#[tokio::test]
async fn test_event_command_auth_failure_exit_code() {
    let session = Arc::new(ScriptedSession::new(0, vec![(1, Reply::Status(403))]));

    let err = run_with_session(
        &config(),
        &args(1000, 2000),
        session,
        CaptureSink::default().shared(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::Poll(_)));
    assert_eq!(err.exit_code(), EXIT_AUTH_FAILURE);
}

#[tokio::test]
async fn test_event_command_status_exit_code() {
    let session = Arc::new(ScriptedSession::new(0, vec![(1, Reply::Status(502))]));

    let err = run_with_session(
        &config(),
        &args(1000, 2000),
        session,
        CaptureSink::default().shared(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), (502 % 256) as u8);
}
