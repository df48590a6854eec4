//! Concurrent universe screener.
//!
//! Walks every code the data port lists, admitting at most `limit`
//! securities at a time through a semaphore. Each admitted security is
//! loaded and evaluated on a blocking worker, and results are pushed into a
//! bounded channel the moment they exist, so the consumer sees them in
//! completion order.

use crate::domain::error::StrategistError;
use crate::domain::info::Info;
use crate::domain::kline::{Kline, TimeWindow};
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info};

/// Upper bound on concurrently evaluated securities.
pub const MAX_CONCURRENCY: usize = 1024;

/// A security whose signal fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub info: Info,
    pub day: Vec<Kline>,
}

/// Incremental results of a screen.
///
/// Dropping the stream cancels the walk the same way [`cancel`](Self::cancel)
/// does: no further securities are admitted and results of in-flight
/// workers are discarded.
pub struct ScreenStream<T> {
    rx: mpsc::Receiver<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T> ScreenStream<T> {
    /// Wraps a receiver fed by a task that watches `cancelled`.
    pub fn from_channel(rx: mpsc::Receiver<T>, cancelled: Arc<AtomicBool>) -> Self {
        Self { rx, cancelled }
    }

    /// Next result, or `None` once the walk is finished or cancelled.
    pub async fn next(&mut self) -> Option<T> {
        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.recv().await
    }

    /// Drains every remaining result.
    pub async fn collect(mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item);
        }
        out
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> Drop for ScreenStream<T> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub struct Screener {
    data: Arc<dyn DataPort>,
    load_minutes: bool,
}

impl Screener {
    pub fn new(data: Arc<dyn DataPort>, load_minutes: bool) -> Self {
        Self { data, load_minutes }
    }

    /// Streams every security whose `strategy` signal is true at the end of
    /// `window`. Must be called from within a tokio runtime.
    pub fn screen(
        &self,
        strategy: Arc<dyn Strategy>,
        window: TimeWindow,
        limit: usize,
    ) -> Result<ScreenStream<Match>, StrategistError> {
        info!(strategy = strategy.name(), limit, "screen started");
        self.range(limit, window, move |info, day, min| {
            strategy.signal(info, day, min).then(|| Match {
                info: info.clone(),
                day: day.to_vec(),
            })
        })
    }

    /// Runs `f` on every security that loads, streaming its `Some` results.
    /// Must be called from within a tokio runtime.
    ///
    /// The universe is listed before anything is spawned, so a listing
    /// failure is returned here. Failures of single securities are skipped.
    pub fn range<T, F>(
        &self,
        limit: usize,
        window: TimeWindow,
        f: F,
    ) -> Result<ScreenStream<T>, StrategistError>
    where
        T: Send + 'static,
        F: Fn(&Info, &[Kline], &[Kline]) -> Option<T> + Send + Sync + 'static,
    {
        let codes = self.data.list_codes()?;
        let limit = limit.clamp(1, MAX_CONCURRENCY);
        let (tx, rx) = mpsc::channel(limit);
        let cancelled = Arc::new(AtomicBool::new(false));

        let data = Arc::clone(&self.data);
        let load_minutes = self.load_minutes;
        let stop = Arc::clone(&cancelled);
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(limit));
            let f = Arc::new(f);
            let total = codes.len();
            let mut admitted = 0usize;
            for code in codes {
                if stop.load(Ordering::SeqCst) || tx.is_closed() {
                    debug!(admitted, total, "screen cancelled");
                    break;
                }
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                admitted += 1;

                let data = Arc::clone(&data);
                let f = Arc::clone(&f);
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    if let Some(item) = scan_one(data.as_ref(), &code, window, load_minutes, &*f) {
                        // receiver gone: the screen was cancelled
                        let _ = tx.blocking_send(item);
                    }
                });
            }

            // every permit back means every worker has finished
            let _ = semaphore.acquire_many(limit as u32).await;
            debug!(admitted, total, "screen finished");
        });

        Ok(ScreenStream::from_channel(rx, cancelled))
    }
}

fn scan_one<T>(
    data: &dyn DataPort,
    code: &str,
    window: TimeWindow,
    load_minutes: bool,
    f: &dyn Fn(&Info, &[Kline], &[Kline]) -> Option<T>,
) -> Option<T> {
    let day = match data.fetch_day_klines(code, window) {
        Ok(day) if !day.is_empty() => day,
        Ok(_) => {
            debug!(code, "no daily bars in window");
            return None;
        }
        Err(err) => {
            debug!(code, error = %err, "daily bars unavailable");
            return None;
        }
    };
    let min = if load_minutes {
        match data.fetch_minute_klines(code, window) {
            Ok(min) => min,
            Err(err) => {
                debug!(code, error = %err, "minute bars unavailable");
                return None;
            }
        }
    } else {
        Vec::new()
    };
    let info = Info::from_klines(code, &data.code_name(code), &day)?;
    f(&info, &day, &min)
}
