//! Bounded pool of long-lived download workers.
//!
//! Every [`Fetcher`] clone shares one job queue. Workers are spawned lazily,
//! never more than the configured bound, and live until the last clone is
//! dropped. Each call to [`Fetcher::fetch`] gets its own reply channel.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use log::{debug, warn};
use reqwest::Client;
use tokio::sync::mpsc;

use super::classify::classify_error;
use crate::error::{BackendError, Result, UnexpectedError};

type Outcome = (String, Result<Vec<u8>>);

struct Job {
    url: String,
    reply: mpsc::UnboundedSender<Outcome>,
}

struct Shared {
    client: Client,
    queue: mpsc::UnboundedSender<Job>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    pending: Arc<AtomicUsize>,
    workers: Mutex<usize>,
    max_workers: usize,
}

/// Concurrent URL fetcher.
#[derive(Clone)]
pub struct Fetcher {
    shared: Arc<Shared>,
}

impl Fetcher {
    pub fn new(client: Client, max_workers: usize) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                client,
                queue,
                receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
                pending: Arc::new(AtomicUsize::new(0)),
                workers: Mutex::new(0),
                max_workers: max_workers.max(1),
            }),
        }
    }

    /// Number of workers spawned so far.
    pub fn workers(&self) -> usize {
        *self.shared.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Downloads every URL and returns the payloads keyed by URL.
    ///
    /// Unless `quiet` is set the first failure is returned and the remaining
    /// results are discarded. With `quiet` failed URLs are left out.
    #[tracing::instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn fetch(&self, urls: Vec<String>, quiet: bool) -> Result<HashMap<String, Vec<u8>>> {
        let mut unique: Vec<String> = Vec::with_capacity(urls.len());
        for url in urls {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        let mut results = HashMap::new();
        if unique.is_empty() {
            return Ok(results);
        }

        let (reply, mut outcomes) = mpsc::unbounded_channel();
        let expected = unique.len();
        self.shared.pending.fetch_add(expected, Ordering::SeqCst);
        self.grow();
        for url in unique {
            let job = Job {
                url,
                reply: reply.clone(),
            };
            if self.shared.queue.send(job).is_err() {
                return Err(UnexpectedError::capture("download queue closed").into());
            }
        }
        drop(reply);

        for _ in 0..expected {
            let Some((url, outcome)) = outcomes.recv().await else {
                return Err(UnexpectedError::capture("download workers stopped").into());
            };
            match outcome {
                Ok(data) => {
                    results.insert(url, data);
                }
                Err(err) if quiet => debug!("Ignoring failed download: {}", err),
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }

    fn grow(&self) {
        let mut workers = self.shared.workers.lock().unwrap_or_else(|e| e.into_inner());
        let wanted = self
            .shared
            .pending
            .load(Ordering::SeqCst)
            .min(self.shared.max_workers);
        while *workers < wanted {
            *workers += 1;
            debug!("Starting download worker {}", *workers);
            tokio::spawn(worker(
                self.shared.client.clone(),
                Arc::clone(&self.shared.receiver),
                Arc::clone(&self.shared.pending),
            ));
        }
    }
}

async fn worker(
    client: Client,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    pending: Arc<AtomicUsize>,
) {
    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(Job { url, reply }) = job else {
            break;
        };
        let outcome = guarded(download(&client, &url)).await;
        pending.fetch_sub(1, Ordering::SeqCst);
        if reply.send((url, outcome)).is_err() {
            debug!("Discarding result of an abandoned batch");
        }
    }
}

/// Converts a panic inside `future` into an unexpected error.
async fn guarded<F>(future: F) -> Result<Vec<u8>>
where
    F: Future<Output = Result<Vec<u8>>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let error = UnexpectedError::from_panic(payload);
            warn!("Download worker panicked: {}", error.message);
            Err(error.into())
        }
    }
}

async fn download(client: &Client, url: &str) -> Result<Vec<u8>> {
    debug!("GET {}", url);
    let fail = |e: reqwest::Error| BackendError::from(classify_error(url, &e));
    let response = client.get(url).send().await.map_err(fail)?;
    let response = response.error_for_status().map_err(fail)?;
    let body = response.bytes().await.map_err(fail)?;
    Ok(body.to_vec())
}
