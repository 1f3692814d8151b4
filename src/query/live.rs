use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::controller::{QueryController, RunOptions};
use crate::api::ListSource;
use crate::bus::{BusError, Debouncer, EventBus, Subscription};

/// Keeps a query fresh from server push events.
///
/// Every dispatched event of a bound type restarts one debounce window;
/// when the window passes quietly the controller is refreshed silently.
/// Dropping the binding unsubscribes and stops any pending refresh.
pub struct LiveQuery {
    // Field order matters: listeners detach before the debouncer stops.
    subscriptions: Vec<Subscription>,
    _debouncer: Debouncer,
}

impl LiveQuery {
    pub fn bind<S: ListSource>(
        bus: &EventBus,
        controller: Arc<QueryController<S>>,
        event_types: &[&str],
        window: Duration,
    ) -> Result<Self, BusError> {
        let debouncer = Debouncer::spawn(window, move || {
            let controller = controller.clone();
            async move {
                let outcome = controller.refresh(RunOptions::silent()).await;
                debug!("push-triggered refresh finished: {outcome:?}");
            }
        });

        let subscriptions = event_types
            .iter()
            .map(|event_type| {
                let trigger = debouncer.trigger();
                bus.subscribe(*event_type, move |_| trigger.signal())
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("live query bound to {event_types:?} ({window:?} window)");

        Ok(Self {
            subscriptions,
            _debouncer: debouncer,
        })
    }

    pub fn event_types(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .map(|subscription| subscription.event_type())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::api::{ApiError, Page};
    use crate::bus::event_types::{
        DONATION_INVALIDATORS, EVENT_CAMPAIGN_UPDATED, EVENT_NEW_DONATION,
    };
    use crate::bus::EventEnvelope;

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ListSource for CountingSource {
        type Params = ();
        type Item = usize;

        async fn fetch_page(
            &self,
            _params: &(),
            _offset: usize,
            _page_size: usize,
        ) -> Result<Page<usize>, ApiError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Page {
                items: (0..n).collect(),
                total_count: n,
            })
        }
    }

    fn fetches(controller: &QueryController<CountingSource>) -> usize {
        controller.source().fetches.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_triggers_one_silent_refresh() {
        let bus = EventBus::new();
        let controller = Arc::new(QueryController::new(CountingSource::default(), 10).unwrap());
        controller.run_query((), RunOptions::visible()).await;
        assert_eq!(fetches(&controller), 1);

        let _live = LiveQuery::bind(
            &bus,
            controller.clone(),
            DONATION_INVALIDATORS,
            Duration::from_millis(500),
        )
        .unwrap();

        for i in 0..3 {
            bus.dispatch(&EventEnvelope::new(EVENT_NEW_DONATION, json!({ "id": i })));
            sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(fetches(&controller), 1);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(fetches(&controller), 2);
        assert_eq!(controller.state().items().len(), 2);
        assert!(!controller.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_events_do_not_refresh() {
        let bus = EventBus::new();
        let controller = Arc::new(QueryController::new(CountingSource::default(), 10).unwrap());
        controller.run_query((), RunOptions::visible()).await;

        let _live = LiveQuery::bind(
            &bus,
            controller.clone(),
            &[EVENT_NEW_DONATION],
            Duration::from_millis(100),
        )
        .unwrap();

        bus.dispatch(&EventEnvelope::new(EVENT_CAMPAIGN_UPDATED, json!({})));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fetches(&controller), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_binding_unsubscribes() {
        let bus = EventBus::new();
        let controller = Arc::new(QueryController::new(CountingSource::default(), 10).unwrap());
        controller.run_query((), RunOptions::visible()).await;

        let live = LiveQuery::bind(
            &bus,
            controller.clone(),
            &[EVENT_NEW_DONATION],
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(live.event_types(), vec![EVENT_NEW_DONATION]);
        assert_eq!(bus.listener_count(EVENT_NEW_DONATION), 1);

        drop(live);
        assert!(bus.is_empty());

        bus.dispatch(&EventEnvelope::new(EVENT_NEW_DONATION, json!({})));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(fetches(&controller), 1);
    }

    #[tokio::test]
    async fn refresh_before_any_query_is_skipped() {
        let bus = EventBus::new();
        let controller = Arc::new(QueryController::new(CountingSource::default(), 10).unwrap());
        let _live = LiveQuery::bind(
            &bus,
            controller.clone(),
            &[EVENT_NEW_DONATION],
            Duration::from_millis(10),
        )
        .unwrap();

        bus.dispatch(&EventEnvelope::new(EVENT_NEW_DONATION, json!({})));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(fetches(&controller), 0);
    }
}
