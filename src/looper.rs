// src/looper.rs
//
// Loop mode: fetch, report, sleep, until asked to stop.

use futures::FutureExt;
use std::future::Future;
use tracing::{info, info_span, warn, Instrument};

use crate::client::LogFetcher;
use crate::config::FetchConfig;
use crate::dispatch::{dispatch, report};
use crate::sleeper::Sleeper;

/// Poll with a fixed pause between fetches until `shutdown` resolves, and
/// return the number of fetches made.
///
/// A failed fetch is logged and the loop carries on. The configuration, and
/// therefore the time window, is the same on every iteration.
///
/// `shutdown` is only observed between fetches: a fetch that has started
/// always runs to completion, so the output never ends mid-record. It is
/// polled once before the first fetch so that signal listeners behind it are
/// installed early.
pub async fn run_loop<F>(
    config: &FetchConfig,
    client: &dyn LogFetcher,
    interval_secs: u64,
    sleeper: &dyn Sleeper,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    if shutdown.as_mut().now_or_never().is_some() {
        return 0;
    }

    let mut iteration: u64 = 0;
    loop {
        iteration += 1;
        let span = info_span!("loop", iteration);
        async {
            match dispatch(config, client).await {
                Ok(meta) => report(&meta),
                Err(e) => warn!("{:#}", e),
            }
            info!("sleeping for seconds : {}", interval_secs);
        }
        .instrument(span)
        .await;

        tokio::select! {
            biased;
            _ = shutdown.as_mut() => return iteration,
            _ = sleeper.sleep_sec(interval_secs) => {}
        }
    }
}
