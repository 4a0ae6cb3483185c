#[macro_use]
extern crate log;

use jester::apis::Api;
use jester::config;
use jester::dispatcher::{Dispatcher, Message};
use jester::quota::QuotaTracker;
use jester::ratings::RatingLedger;
use jester::storage::Storage;

use crossbeam_channel::{bounded, TrySendError};
use warp::{hyper::body::Bytes, path, Filter};

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    info!("Jester is booting up, please standby...");

    info!("Reading configuration");
    let config = config::configure()?;

    let storage = Arc::new(match config.storage {
        Some(storage_config) => Storage::new(storage_config)?,
        None => {
            warn!("No storage configured; quotas and ratings will not survive a restart");
            Storage::in_memory()
        }
    });

    let quota = Arc::new(QuotaTracker::new(storage.clone()).await);
    let ratings = Arc::new(RatingLedger::new(storage.clone()).await);
    info!(
        "Loaded {} user records and {} rated jokes",
        quota.user_count().await,
        ratings.len().await
    );

    info!("Configuring external APIs");
    let api = Arc::new(Api::new(config.apis));

    let (update_sender, update_receiver) = bounded(config.webhook.queue_size);

    info!(
        "Starting {} dispatcher threads",
        config.webhook.workers.max(1)
    );
    let _dispatcher = Dispatcher::start(
        update_receiver,
        api.clone(),
        quota,
        ratings,
        config.webhook.workers,
    );

    if api.messenger.has_webhook_url() {
        match api.messenger.register_webhook().await {
            Ok(()) => info!("Webhook registered with the platform"),
            Err(e) => error!("Initial webhook registration failed: {e}"),
        }
    }

    let server_address: SocketAddr = config
        .webhook
        .listen_address
        .parse()
        .expect("The webhook server has an invalid listen address");

    let webhook_token = Arc::new(config.webhook.token);
    let post_route = warp::post()
        .and(warp::body::content_length_limit(1024 * 256))
        .and(path!("webhook" / String))
        .and(warp::body::bytes())
        .map(move |token: String, body: Bytes| {
            if token != *webhook_token {
                warn!("Rejected a webhook delivery naming an unknown token");
                return Box::new(warp::reply());
            }

            // Updates are buffered and acknowledged immediately; the
            // dispatcher threads do the actual work.
            if let Err(e) = update_sender.try_send(Message {
                body: body[..].to_vec(),
            }) {
                match e {
                    TrySendError::Full(_) => error!("Queue full! Inbound update dropped!"),
                    TrySendError::Disconnected(_) => panic!(
                        "The dispatch system is no longer accepting updates. Nothing can continue."
                    ),
                }
            }

            Box::new(warp::reply())
        });

    // Visiting the root page re-registers the platform webhook, which is
    // handy after a host migration.
    let register_api = api.clone();
    let register_route = warp::get().and(warp::path::end()).and_then(move || {
        let api = register_api.clone();
        async move {
            match api.messenger.register_webhook().await {
                Ok(()) => Ok::<_, Infallible>(warp::reply::html("Webhook registered".to_string())),
                Err(e) => {
                    error!("Webhook registration failed: {e}");
                    Ok(warp::reply::html(String::new()))
                }
            }
        }
    });

    let routes = post_route.or(register_route);

    info!("Webhook server listening on {server_address}, boot up complete");
    warp::serve(routes).run(server_address).await;

    Ok(())
}
