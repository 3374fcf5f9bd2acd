use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use live_detect::session::SessionUpdate;
use live_detect::storage::shared;
use live_detect::{
    DetectionState, InMemoryKvStore, SessionController, SessionSettings, Source,
    SyntheticProvider, DEFAULT_CAMERA,
};

const ONE_HIT: &str = r#"{"detections":[{"bbox":[0.1,0.2,0.4,0.6],"confidence":0.85}]}"#;

type Service = WebSocketStream<TcpStream>;

/// Accept exactly one WebSocket client on a loopback port and hand it to `handler`.
async fn spawn_service<F, Fut>(handler: F) -> String
where
    F: FnOnce(Service) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{}/detect", addr)
}

async fn detecting_session(endpoint: String) -> SessionController<SyntheticProvider> {
    let settings = SessionSettings {
        endpoint: Some(endpoint),
        fallback_probability: 0.0,
        ..SessionSettings::default()
    };
    let mut session = SessionController::new(
        SyntheticProvider::new().with_frame_size(64, 36),
        shared(InMemoryKvStore::new()),
        settings,
    );
    session.set_frame_sampling(10).unwrap();
    session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
    session.start_detection().await.unwrap();
    session
}

/// Step until `pred` matches, failing after five seconds.
async fn step_until(
    session: &mut SessionController<SyntheticProvider>,
    pred: impl Fn(&SessionUpdate) -> bool,
) -> SessionUpdate {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let update = session.step().await;
            if pred(&update) {
                return update;
            }
        }
    })
    .await
    .expect("expected update within five seconds")
}

#[tokio::test]
async fn frames_out_results_in() {
    let endpoint = spawn_service(|mut ws| async move {
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Binary(jpeg) = message {
                assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
                if ws.send(Message::Text(ONE_HIT.to_string())).await.is_err() {
                    break;
                }
            }
        }
    })
    .await;

    let mut session = detecting_session(endpoint).await;
    assert!(session.is_link_open());
    assert!(!session.is_fallback_active());

    let update = step_until(&mut session, |u| matches!(u, SessionUpdate::Detections { .. })).await;
    assert_eq!(
        update,
        SessionUpdate::Detections {
            shown: 1,
            created: 1
        }
    );

    let event = session.events().latest().unwrap();
    assert!((event.confidence - 85.0).abs() < 1e-9);
    assert_eq!(event.model, "movinet-a1");
    let shown = &session.boxes()[0];
    assert!((shown.width - 0.3).abs() < 1e-9);
    assert!((shown.height - 0.4).abs() < 1e-9);
    assert_eq!(shown.label, "Violence");

    let metrics = session.metrics();
    assert!(metrics.fps > 0.0);
    assert!(metrics.latency_ms >= 0.0);
    assert!((metrics.last_confidence - 85.0).abs() < 1e-9);
    assert!((0.0..=100.0).contains(&metrics.buffer_fullness));

    session.stop_detection().unwrap();
    assert!(!session.is_link_open());
}

#[tokio::test]
async fn lost_link_switches_to_fallback() {
    let endpoint = spawn_service(|mut ws| async move {
        // Take one frame, then hang up.
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    })
    .await;

    let mut session = detecting_session(endpoint).await;
    step_until(&mut session, |u| *u == SessionUpdate::LinkLost).await;

    assert!(!session.is_link_open());
    assert!(session.is_fallback_active());
    assert_eq!(session.status().detection, DetectionState::Detecting);
}

#[tokio::test]
async fn unreachable_service_starts_fallback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = detecting_session(format!("ws://{}/detect", addr)).await;
    assert!(!session.is_link_open());
    assert!(session.is_fallback_active());
    assert_eq!(session.status().detection, DetectionState::Detecting);
}

#[tokio::test]
async fn malformed_results_are_dropped() {
    let endpoint = spawn_service(|mut ws| async move {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() && ws.send(Message::Text("{oops".into())).await.is_err() {
                break;
            }
        }
    })
    .await;

    let mut session = detecting_session(endpoint).await;
    step_until(&mut session, |u| *u == SessionUpdate::MessageDropped).await;
    assert!(session.is_link_open());
    assert!(session.events().is_empty());
}

#[tokio::test]
async fn results_after_stop_are_discarded() {
    let endpoint = spawn_service(|mut ws| async move {
        // Keep pushing results regardless of what the client sends.
        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        loop {
            ticker.tick().await;
            if ws.send(Message::Text(ONE_HIT.to_string())).await.is_err() {
                break;
            }
        }
    })
    .await;

    let mut session = detecting_session(endpoint).await;
    step_until(&mut session, |u| matches!(u, SessionUpdate::Detections { .. })).await;
    session.stop_detection().unwrap();
    let recorded = session.events().len();

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(update) = tokio::time::timeout(Duration::from_millis(200), session.step()).await {
        assert_eq!(update, SessionUpdate::Stale);
    }
    assert_eq!(session.events().len(), recorded);
    assert!(session.boxes().is_empty());
}
