mod common;

use anyhow::Context as _;
use async_trait::async_trait;
use common::ScriptedHttp;
use datafetch::FetchContext;
use datafetch::config::ReconnectPolicy;
use datafetch::fetch::{DataSource, FetcherOptions, Side, ValueParser};
use datafetch::realtime::{
    ChangeAction, ConnectionState, DataChangeEvent, PushConnector, PushStream, RealtimeBus,
    RealtimeSubscription, SseDecoder, encode_frame,
};
use futures::StreamExt;
use futures::stream;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Connects a client subscription to a server bus in-process, framing every
/// payload as SSE on the way through.
struct BusBridge {
    server: Arc<RealtimeBus>,
    connections: AtomicUsize,
}

#[async_trait]
impl PushConnector for BusBridge {
    async fn connect(&self) -> datafetch::Result<PushStream> {
        let n = self.connections.fetch_add(1, Ordering::SeqCst);
        let payloads = self.server.register_channel_client(&format!("bridge-{n}"));

        let mut decoder = SseDecoder::new();
        let frames = payloads
            .flat_map(move |payload| {
                let decoded = decoder.push(encode_frame(&payload).as_bytes());
                stream::iter(decoded.into_iter().map(Ok))
            })
            .boxed();
        Ok(frames)
    }
}

#[tokio::test]
async fn test_server_change_reaches_client_and_invalidates() -> anyhow::Result<()> {
    let http = Arc::new(ScriptedHttp::new());
    http.ok("/api/data?component=UserData&dataSource=json", r#"[{"id":1}]"#);
    http.ok(
        "http://localhost:3000/api/data?component=UserData&dataSource=json",
        r#"[{"id":1}]"#,
    );

    let server = FetchContext::builder(Side::Server).http_client(http.clone()).build();
    let client = FetchContext::builder(Side::Client).http_client(http.clone()).build();
    let server_users = server.register(FetcherOptions::new("UserData", DataSource::Json), ValueParser);
    let client_users = client.register(FetcherOptions::new("UserData", DataSource::Json), ValueParser);

    client_users.fetch_data(Side::Client, None).await?;
    assert!(client_users.client_cache().contains_key("json_UserData"));

    let connector: Arc<dyn PushConnector> = Arc::new(BusBridge {
        server: Arc::clone(server.bus()),
        connections: AtomicUsize::new(0),
    });
    let (tx, mut rx) = mpsc::unbounded_channel::<DataChangeEvent>();
    let invalidated = Arc::clone(&client_users);
    let mut subscription = RealtimeSubscription::start(
        client.bus(),
        "UserData",
        Some(connector),
        ReconnectPolicy::default(),
        move |event| {
            invalidated.invalidate_cache();
            let _ = tx.send(event.clone());
        },
    );

    let mut state = subscription.state_receiver();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await??;
    assert_eq!(server.bus().sse_client_count(), 1);

    server
        .bus()
        .publish(&DataChangeEvent::new("ProductData", ChangeAction::Refresh));
    server_users.publish_data_change(ChangeAction::Create, Some(json!({"id": 2})), Some(json!(2)));

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await?
        .context("callback channel closed")?;
    assert_eq!(event.component_id, "UserData");
    assert_eq!(event.action, ChangeAction::Create);
    assert_eq!(event.id, Some(json!(2)));
    assert!(client_users.client_cache().is_empty());

    client_users.fetch_data(Side::Client, None).await?;
    assert_eq!(http.calls_to("/api/data?component=UserData&dataSource=json"), 2);

    subscription.close();
    assert_eq!(subscription.state(), ConnectionState::Closed);
    assert_eq!(client.bus().subscribers_for("UserData"), 1);

    // the aborted task drops its stream asynchronously; the next broadcast after that prunes it
    for _ in 0..50 {
        server_users.publish_data_change(ChangeAction::Refresh, None, None);
        if server.bus().sse_client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.bus().sse_client_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_local_events_do_not_need_push_channel() {
    let ctx = FetchContext::builder(Side::Client).build();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let subscription = RealtimeSubscription::start(
        ctx.bus(),
        "UserData",
        None,
        ReconnectPolicy::default(),
        move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    assert_eq!(subscription.state(), ConnectionState::Closed);

    ctx.bus().publish(&DataChangeEvent::new("UserData", ChangeAction::Delete).with_id(7));
    ctx.bus().publish(&DataChangeEvent::new("Other", ChangeAction::Delete));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    drop(subscription);
    ctx.bus().publish(&DataChangeEvent::new("UserData", ChangeAction::Refresh));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.bus().subscriber_count(), 0);
}
