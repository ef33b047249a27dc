//! Threshold mix: buffers items and releases them in shuffled, jittered batches.
//!
//! Items are held until at least `batch_size` are buffered. A release takes exactly the oldest
//! `batch_size` items, applies a uniform random permutation, and assigns each item an
//! independent delay from the configured jitter range. Delays are drawn after the shuffle and
//! never sorted, so emission order carries no information about arrival order.

use std::{collections::VecDeque, time::Duration};

use parking_lot::Mutex;
use rand::{seq::SliceRandom, Rng};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MIN_JITTER: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixConfig {
    batch_size: usize,
    min_jitter: Duration,
    max_jitter: Duration,
}

impl MixConfig {
    pub fn new(batch_size: usize, min_jitter: Duration, max_jitter: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("mix batch size must be at least one"));
        }
        if min_jitter > max_jitter {
            return Err(Error::InvalidConfig("mix jitter range is empty"));
        }
        Ok(Self {
            batch_size,
            min_jitter,
            max_jitter,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn jitter(&self) -> (Duration, Duration) {
        (self.min_jitter, self.max_jitter)
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_jitter: DEFAULT_MIN_JITTER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

/// An item released from the mix, to become visible only after `delay`.
#[derive(Debug)]
pub struct Scheduled<T> {
    pub item: T,
    pub delay: Duration,
}

impl<T: Send + 'static> Scheduled<T> {
    /// Hand the item to `deliver` on `runtime` once its delay has elapsed, without blocking the
    /// caller.
    pub fn spawn_on<F>(self, runtime: &Handle, deliver: F) -> JoinHandle<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let Scheduled { item, delay } = self;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(item);
        })
    }
}

/// The mix buffer. All buffer mutation happens under a single lock, and buffered items are
/// never exposed by reference.
#[derive(Debug)]
pub struct MixStage<T> {
    config: MixConfig,
    buffer: Mutex<VecDeque<T>>,
}

impl<T> MixStage<T> {
    pub fn new(config: MixConfig) -> Self {
        Self {
            config,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    pub fn ingest(&self, item: T) {
        self.buffer.lock().push_back(item);
    }

    /// Number of items waiting for a batch.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release one batch using the thread-local RNG. See [MixStage::release_batch_with].
    pub fn release_batch(&self) -> Option<Vec<Scheduled<T>>> {
        self.release_batch_with(&mut rand::thread_rng())
    }

    /// Release the oldest `batch_size` items, shuffled and each with its own delay.
    ///
    /// Returns `None`, leaving the buffer untouched, while fewer than `batch_size` items are
    /// buffered. Never drops an item.
    pub fn release_batch_with<R>(&self, rng: &mut R) -> Option<Vec<Scheduled<T>>>
    where
        R: Rng + ?Sized,
    {
        let mut batch: Vec<T> = {
            let mut buffer = self.buffer.lock();
            if buffer.len() < self.config.batch_size {
                return None;
            }
            let batch = buffer.drain(..self.config.batch_size).collect();
            debug!(
                batch_size = self.config.batch_size,
                remaining = buffer.len(),
                "mix releasing batch"
            );
            batch
        };

        batch.shuffle(rng);
        Some(
            batch
                .into_iter()
                .map(|item| Scheduled {
                    item,
                    delay: rng.gen_range(self.config.min_jitter..=self.config.max_jitter),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::{MixConfig, MixStage, DEFAULT_MAX_JITTER, DEFAULT_MIN_JITTER};
    use crate::error::Error;

    fn stage() -> MixStage<usize> {
        MixStage::new(MixConfig::default())
    }

    #[test]
    fn holds_until_threshold() {
        let mix = stage();
        for i in 0..4 {
            mix.ingest(i);
            assert!(mix.release_batch().is_none());
        }
        assert_eq!(mix.len(), 4);
    }

    #[test]
    fn releases_exactly_one_batch() {
        let mix = stage();
        for i in 0..7 {
            mix.ingest(i);
        }
        let batch = mix.release_batch().unwrap();
        assert_eq!(batch.len(), 5);

        let mut released: Vec<usize> = batch.iter().map(|s| s.item).collect();
        released.sort();
        assert_eq!(released, vec![0, 1, 2, 3, 4]);

        // The remainder stays buffered, below threshold.
        assert_eq!(mix.len(), 2);
        assert!(mix.release_batch().is_none());
    }

    #[test]
    fn delays_within_jitter_range() {
        let mix = stage();
        for _ in 0..100 {
            for i in 0..5 {
                mix.ingest(i);
            }
            for scheduled in mix.release_batch().unwrap() {
                assert!(scheduled.delay >= DEFAULT_MIN_JITTER);
                assert!(scheduled.delay <= DEFAULT_MAX_JITTER);
            }
        }
    }

    #[test]
    fn shuffle_is_nontrivial() {
        let mix = stage();
        let trials = 1000;
        let mut identity_orders = 0;
        for _ in 0..trials {
            for i in 0..5 {
                mix.ingest(i);
            }
            let order: Vec<usize> = mix.release_batch().unwrap().iter().map(|s| s.item).collect();
            if order == [0, 1, 2, 3, 4] {
                identity_orders += 1;
            }
        }
        // Expected 1000 / 5! ~= 8.3 identity orders.
        assert!(identity_orders < 40, "{identity_orders} of {trials} batches unshuffled");
    }

    #[test]
    fn delay_order_independent_of_arrival_order() {
        let mix = stage();
        let trials = 1000;
        let mut sorted_by_arrival = 0;
        for _ in 0..trials {
            for i in 0..5 {
                mix.ingest(i);
            }
            let mut batch = mix.release_batch().unwrap();
            batch.sort_by_key(|s| s.delay);
            let order: Vec<usize> = batch.iter().map(|s| s.item).collect();
            if order == [0, 1, 2, 3, 4] {
                sorted_by_arrival += 1;
            }
        }
        assert!(sorted_by_arrival < 40, "{sorted_by_arrival} of {trials} emitted in arrival order");
    }

    #[test]
    fn concurrent_ingest_never_duplicates_or_drops() {
        let mix = Arc::new(stage());
        let released = Arc::new(parking_lot::Mutex::new(Vec::new()));
        std::thread::scope(|s| {
            for t in 0..4 {
                let mix = mix.clone();
                let released = released.clone();
                s.spawn(move || {
                    for i in 0..250 {
                        mix.ingest(t * 1000 + i);
                        if let Some(batch) = mix.release_batch() {
                            released.lock().extend(batch.into_iter().map(|s| s.item));
                        }
                    }
                });
            }
        });
        let mut released = released.lock().clone();
        assert_eq!(released.len() + mix.len(), 1000);
        assert_eq!(released.len() % 5, 0);
        released.sort();
        released.dedup();
        assert_eq!(released.len() + mix.len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_items_delivered_after_delay() {
        let mix = stage();
        for i in 0..5 {
            mix.ingest(i);
        }
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let runtime = tokio::runtime::Handle::current();
        let handles: Vec<_> = mix
            .release_batch()
            .unwrap()
            .into_iter()
            .map(|scheduled| {
                let tx = tx.clone();
                scheduled.spawn_on(&runtime, move |item| {
                    let _ = tx.send(item);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(start.elapsed() >= DEFAULT_MIN_JITTER);

        let mut delivered = Vec::new();
        while let Ok(item) = rx.try_recv() {
            delivered.push(item);
        }
        delivered.sort();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn rejects_invalid_config() {
        let Err(Error::InvalidConfig(_)) = MixConfig::new(0, Duration::ZERO, Duration::ZERO) else {
            panic!("zero batch size accepted");
        };
        let Err(Error::InvalidConfig(_)) =
            MixConfig::new(5, Duration::from_millis(50), Duration::from_millis(10))
        else {
            panic!("inverted jitter range accepted");
        };
    }
}
