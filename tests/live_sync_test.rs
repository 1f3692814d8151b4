//! Push-to-refresh integration tests: socket frames through the event bus
//! into a silent REST refresh of a donations query.

mod common;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::MockPushServer;
use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;

use donordesk_lib::bus::event_types::{DONATION_INVALIDATORS, EVENT_NEW_DONATION};
use donordesk_lib::models::{Donation, DonationFilter};
use donordesk_lib::{
    ApiClient, Connection, ConnectionState, EndpointSource, EventBus, LiveQuery,
    QueryController, QueryOutcome, ReconnectPolicy, RunOptions, SessionStore, SyncConfig,
};

type DonationsQuery = QueryController<EndpointSource<DonationFilter, Donation>>;

struct Harness {
    push: MockPushServer,
    bus: EventBus,
    connection: Connection,
    donations: Arc<DonationsQuery>,
    _live: LiveQuery,
}

fn harness(server: &MockServer) -> Harness {
    let mut config = SyncConfig::new(server.base_url());
    config.debounce_ms = 50;
    config.reconnect_delay_ms = 50;

    let bus = EventBus::new();
    let client = ApiClient::new(&config, SessionStore::in_memory()).expect("client should build");
    let donations = Arc::new(
        QueryController::new(EndpointSource::new(client, "donations"), 50)
            .expect("controller should build"),
    );
    let live = LiveQuery::bind(
        &bus,
        donations.clone(),
        DONATION_INVALIDATORS,
        config.debounce_window(),
    )
    .expect("binding should subscribe");

    let push = MockPushServer::new();
    let connection = Connection::start(
        "ws://push.test/ws",
        push.connector(),
        bus.clone(),
        ReconnectPolicy::Fixed(config.reconnect_delay()),
    );

    Harness {
        push,
        bus,
        connection,
        donations,
        _live: live,
    }
}

async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

async fn until(what: &str, mut check: impl FnMut() -> bool) {
    within(what, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

async fn wait_open(connection: &Connection) {
    let mut states = connection.watch_state();
    within("open connection", states.wait_for(|s| *s == ConnectionState::Open))
        .await
        .expect("connection driver stopped");
}

fn donation(id: &str, amount: f64) -> serde_json::Value {
    json!({ "id": id, "amount": amount, "donor_name": "Ada" })
}

#[tokio::test]
async fn pushed_new_donation_triggers_one_silent_refresh() {
    let server = MockServer::start();
    let mut before = server.mock(|when, then| {
        when.method(GET).path("/api/donations");
        then.status(200).json_body(json!({
            "items": [donation("d-1", 25.0)],
            "total_count": 1
        }));
    });

    let h = harness(&server);
    wait_open(&h.connection).await;

    let outcome = h
        .donations
        .run_query(DonationFilter::default(), RunOptions::visible())
        .await;
    assert_eq!(outcome, QueryOutcome::Applied);
    assert_eq!(h.donations.state().items().len(), 1);
    before.assert_hits(1);
    before.delete();

    let after = server.mock(|when, then| {
        when.method(GET)
            .path("/api/donations")
            .query_param("offset", "0")
            .query_param("page_size", "50");
        then.status(200).json_body(json!({
            "items": [donation("d-2", 40.0), donation("d-1", 25.0)],
            "total_count": 2
        }));
    });

    let loading_seen = Arc::new(Mutex::new(Vec::new()));
    let mut view = h.donations.watch();
    let recorder = tokio::spawn({
        let loading_seen = loading_seen.clone();
        async move {
            while view.changed().await.is_ok() {
                let loading = view.borrow_and_update().loading;
                loading_seen.lock().unwrap().push(loading);
            }
        }
    });

    for amount in [40.0, 41.0, 42.0] {
        assert!(h.push.push(EVENT_NEW_DONATION, json!({ "amount": amount })).await);
    }

    let donations = h.donations.clone();
    until("silent refresh", || donations.state().items().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    recorder.abort();

    after.assert_hits(1);
    let state = h.donations.state();
    assert_eq!(state.items()[0].id, "d-2");
    assert_eq!(state.cursor.total_count(), 2);
    assert!(!state.loading);
    assert!(loading_seen.lock().unwrap().iter().all(|loading| !loading));
}

#[tokio::test]
async fn malformed_frames_do_not_refresh() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path("/api/donations");
        then.status(200).json_body(json!([donation("d-1", 25.0)]));
    });

    let h = harness(&server);
    wait_open(&h.connection).await;
    h.donations
        .run_query(DonationFilter::default(), RunOptions::visible())
        .await;

    assert!(h.push.push_text("not json").await);
    assert!(h.push.push_text(r#"{"data":{"amount":5}}"#).await);
    assert!(h.push.push("campaign_updated", json!({})).await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    list.assert_hits(1);
    assert_eq!(h.connection.state(), ConnectionState::Open);
}

#[tokio::test]
async fn refresh_resumes_after_server_drops_socket() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path("/api/donations");
        then.status(200).json_body(json!({ "donations": [donation("d-1", 25.0)] }));
    });

    let h = harness(&server);
    wait_open(&h.connection).await;
    h.donations
        .run_query(DonationFilter::default(), RunOptions::visible())
        .await;

    h.push.drop_connection().await;
    let push = h.push.clone();
    until("reconnect", || push.connects() >= 2).await;
    wait_open(&h.connection).await;

    assert!(h.push.push(EVENT_NEW_DONATION, json!({ "amount": 10 })).await);
    let list_hits = || list.hits();
    until("refresh after reconnect", || list_hits() == 2).await;
}

#[tokio::test]
async fn disposing_stops_delivery() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET).path("/api/donations");
        then.status(200).json_body(json!([]));
    });

    let h = harness(&server);
    wait_open(&h.connection).await;
    h.donations
        .run_query(DonationFilter::default(), RunOptions::visible())
        .await;

    let Harness {
        push,
        bus,
        connection,
        ..
    } = h;
    connection.dispose().await;
    bus.dispose();

    assert!(!push.push(EVENT_NEW_DONATION, json!({ "amount": 1 })).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    list.assert_hits(1);
    assert_eq!(push.connects(), 1);
}
