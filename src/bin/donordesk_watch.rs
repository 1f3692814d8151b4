use std::sync::Arc;

use donordesk_lib::bus::event_types::{DONATION_INVALIDATORS, EVENT_NEW_DONATION};
use donordesk_lib::models::{Donation, DonationFilter, NewDonationPayload};
use donordesk_lib::{
    init_tracing, ApiClient, Connection, EndpointSource, EventBus, LiveQuery, QueryController,
    ReconnectPolicy, RunOptions, SessionStore, SyncConfig, SyncError, WebSocketConnector,
};
use tracing::{info, warn};

const USAGE: &str = "usage: donordesk-watch [--origin URL] [--campaign ID] [--status STATUS] \
[--search TEXT] [--page-size N] [--token TOKEN]";

#[derive(Debug, Default)]
struct Args {
    origin: Option<String>,
    token: Option<String>,
    page_size: Option<usize>,
    filter: DonationFilter,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut args = Self::default();
        while let Some(flag) = raw.next() {
            let mut value = || {
                raw.next()
                    .ok_or_else(|| format!("missing value for {flag}\n{USAGE}"))
            };
            match flag.as_str() {
                "--origin" => args.origin = Some(value()?),
                "--token" => args.token = Some(value()?),
                "--campaign" => args.filter.campaign_id = Some(value()?),
                "--status" => args.filter.status = Some(value()?),
                "--search" => args.filter.search = Some(value()?),
                "--page-size" => {
                    let raw_size = value()?;
                    let size = raw_size
                        .parse::<usize>()
                        .map_err(|_| format!("invalid --page-size value '{raw_size}'"))?;
                    args.page_size = Some(size);
                }
                "-h" | "--help" => return Err(USAGE.to_string()),
                other => return Err(format!("unknown argument '{other}'\n{USAGE}")),
            }
        }
        Ok(args)
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    if let Err(error) = run(args).await {
        eprintln!("donordesk-watch failed: {error}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), SyncError> {
    let mut config = SyncConfig::from_env()?;
    if let Some(origin) = args.origin {
        config.origin = origin;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    config.validate()?;

    let session = SessionStore::open(&config.session_file)?;
    if let Some(token) = args.token {
        session.set_token(token)?;
    }
    if session.token().is_none() {
        warn!("no session token; requests will be unauthenticated");
    }
    info!("admin session: {}", session.is_admin());

    let bus = EventBus::new();
    let client = ApiClient::new(&config, session)?;
    let source: EndpointSource<DonationFilter, Donation> =
        EndpointSource::new(client, "donations");
    let donations = Arc::new(QueryController::new(source, config.page_size)?);

    let _live = LiveQuery::bind(
        &bus,
        donations.clone(),
        DONATION_INVALIDATORS,
        config.debounce_window(),
    )?;

    let _announcements = bus.subscribe(EVENT_NEW_DONATION, |data| {
        match serde_json::from_value::<NewDonationPayload>(data.clone()) {
            Ok(payload) => info!(
                "new donation of {:.2}{}",
                payload.amount,
                payload
                    .campaign_id
                    .map(|campaign| format!(" to {campaign}"))
                    .unwrap_or_default()
            ),
            Err(e) => warn!("new_donation payload not understood: {e}"),
        }
    })?;

    let ws_url = config.ws_url()?;
    info!("connecting to {ws_url}");
    let connection = Connection::start(
        ws_url,
        Arc::new(WebSocketConnector::new()),
        bus.clone(),
        ReconnectPolicy::Fixed(config.reconnect_delay()),
    );

    let mut states = connection.watch_state();
    let mut view = donations.watch();

    let outcome = donations.run_query(args.filter, RunOptions::visible()).await;
    info!("initial load: {outcome:?}");
    report(&donations.state());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("connection {}", *states.borrow_and_update());
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = view.borrow_and_update().clone();
                report(&state);
            }
        }
    }

    connection.dispose().await;
    bus.dispose();
    Ok(())
}

fn report(state: &donordesk_lib::query::QueryState<DonationFilter, Donation>) {
    if let Some(notice) = &state.error {
        warn!("donations: {}", notice.message);
    }
    let total: f64 = state.items().iter().map(|donation| donation.amount).sum();
    info!(
        "donations: {} of {} loaded, {:.2} total{}",
        state.cursor.len(),
        state.cursor.total_count(),
        total,
        if state.loading { " (loading)" } else { "" }
    );
    if let Some(latest) = state.items().first() {
        info!(
            "latest: {} {:.2} from {}",
            latest.id,
            latest.amount,
            latest.donor_name.as_deref().unwrap_or("anonymous")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_filter_flags() {
        let args = Args::parse(argv(&[
            "--origin",
            "https://admin.example.org",
            "--campaign",
            "spring",
            "--page-size",
            "20",
        ]))
        .unwrap();

        assert_eq!(args.origin.as_deref(), Some("https://admin.example.org"));
        assert_eq!(args.filter.campaign_id.as_deref(), Some("spring"));
        assert_eq!(args.page_size, Some(20));
    }

    #[test]
    fn rejects_unknown_and_incomplete_flags() {
        assert!(Args::parse(argv(&["--verbose"])).is_err());
        assert!(Args::parse(argv(&["--status"])).is_err());
        assert!(Args::parse(argv(&["--page-size", "lots"])).is_err());
    }
}
