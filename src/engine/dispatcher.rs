//! Request coalescing.
//!
//! The dispatcher turns the stream of cache misses into provider batches.
//! After receiving one request it drains whatever is already queued,
//! without waiting, so that a burst of misses for the same exporter
//! collapses into a single provider call.
//!
//! Requests are only pulled once a worker is idle. While every worker is
//! busy, misses stay in the request queue and keep piling up, so the next
//! round sees all of them at once.

use std::net::Ipv6Addr;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::telemetry;
use crate::types::{BatchQuery, Query};

/// Beyond this many distinct exporters, draining stops and batches are
/// flushed.
pub(crate) const MAX_EXPORTERS_PER_ROUND: usize = 4;

/// Group `first` and the requests returned by `next` into batches.
///
/// Draining stops when `next` has nothing more, when the batch of the
/// exporter of the last drained request reaches `max_batch_requests`, or
/// when [`MAX_EXPORTERS_PER_ROUND`] exporters are held. With
/// `max_batch_requests == 0` nothing is drained. Batches come out in the
/// order their exporter was first seen; indexes keep submission order.
pub(crate) fn coalesce(
    first: Query,
    mut next: impl FnMut() -> Option<Query>,
    max_batch_requests: usize,
) -> Vec<BatchQuery> {
    let mut pending: Vec<(Ipv6Addr, Vec<u32>)> = vec![(first.exporter_ip, vec![first.if_index])];
    let mut current = 0;
    while max_batch_requests > 0
        && pending[current].1.len() < max_batch_requests
        && pending.len() < MAX_EXPORTERS_PER_ROUND
    {
        let Some(query) = next() else {
            break;
        };
        current = match pending.iter().position(|(ip, _)| *ip == query.exporter_ip) {
            Some(i) => {
                pending[i].1.push(query.if_index);
                i
            }
            None => {
                pending.push((query.exporter_ip, vec![query.if_index]));
                pending.len() - 1
            }
        };
    }
    pending
        .into_iter()
        .map(|(exporter_ip, if_indexes)| BatchQuery {
            exporter_ip,
            if_indexes,
        })
        .collect()
}

/// Take the slot of an idle worker. Returns `false` on shutdown.
async fn idle_worker(idle: &Semaphore, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        permit = idle.acquire() => match permit {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        },
    }
}

/// Dispatcher task: requests in, batches out.
///
/// Workers add a permit to `idle` each time they wait for a batch; every
/// batch sent consumes one, so `batches` never holds more than one batch
/// per waiting worker.
pub(crate) async fn run(
    mut requests: mpsc::Receiver<Query>,
    batches: mpsc::Sender<BatchQuery>,
    idle: Arc<Semaphore>,
    max_batch_requests: usize,
    shutdown: CancellationToken,
) {
    let batched = metrics::counter!(telemetry::PROVIDER_BATCHED_COUNT);
    'dispatch: loop {
        if !idle_worker(&idle, &shutdown).await {
            break;
        }
        let first = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        let round = coalesce(first, || requests.try_recv().ok(), max_batch_requests);
        for (i, batch) in round.into_iter().enumerate() {
            // The first batch goes to the worker found above.
            if i > 0 && !idle_worker(&idle, &shutdown).await {
                break 'dispatch;
            }
            if batch.if_indexes.len() > 1 {
                batched.increment(batch.if_indexes.len() as u64);
            }
            if batches.send(batch).await.is_err() {
                break 'dispatch;
            }
        }
    }
    debug!("dispatcher stopped");
}
