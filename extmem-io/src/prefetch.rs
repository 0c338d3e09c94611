use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use extmem_error::{ExtmemResult, extmem_bail};
use parking_lot::{Condvar, Mutex, MutexGuard};

/// The number of items a [`Prefetcher`] keeps buffered ahead of its consumer by default.
pub const DEFAULT_PREFETCH_CAPACITY: usize = 4;

/// The producing half of a [`Prefetcher`].
///
/// A producer is moved onto the prefetch thread and owns whatever stream it decodes from.
pub trait Producer<T>: Send + 'static {
    /// Fill `slot` with the next item.
    ///
    /// `slot` is either a recycled item or a freshly defaulted one; implementations must overwrite
    /// it completely. Returns `Ok(false)` once the stream is exhausted.
    fn produce(&mut self, slot: &mut T) -> ExtmemResult<bool>;

    /// Reset the stream so that the next call to [`Producer::produce`] yields the first item again.
    fn rewind(&mut self) -> ExtmemResult<()>;
}

/// A [`Producer`] assembled from a pair of closures.
pub struct FnProducer<P, R> {
    produce: P,
    rewind: R,
}

impl<P, R> FnProducer<P, R> {
    pub fn new(produce: P, rewind: R) -> Self {
        Self { produce, rewind }
    }
}

impl<T, P, R> Producer<T> for FnProducer<P, R>
where
    P: FnMut(&mut T) -> ExtmemResult<bool> + Send + 'static,
    R: FnMut() -> ExtmemResult<()> + Send + 'static,
{
    fn produce(&mut self, slot: &mut T) -> ExtmemResult<bool> {
        (self.produce)(slot)
    }

    fn rewind(&mut self) -> ExtmemResult<()> {
        (self.rewind)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Produce,
    BeforeFirst,
    Destroy,
}

struct State<T> {
    ready: VecDeque<T>,
    free: Vec<T>,
    signal: Signal,
    end_of_stream: bool,
    /// Set once the producer thread has returned, including by unwinding.
    exited: bool,
}

struct Shared<T> {
    name: String,
    capacity: usize,
    state: Mutex<State<T>>,
    producer_cv: Condvar,
    consumer_cv: Condvar,
}

impl<T> Shared<T> {
    fn release(&self, state: &mut State<T>, item: T) {
        if state.free.len() < self.capacity {
            state.free.push(item);
        }
    }
}

/// A single-producer, single-consumer pipeline that decodes items on a background thread.
///
/// At most `capacity` produced items wait in the queue for the consumer. Consumed items should be
/// handed back with [`Prefetcher::recycle`] so their allocations are reused by the producer; the
/// free list is capped at the same capacity.
///
/// A failing producer is treated as the end of the stream: the error is logged, items produced
/// before it remain available, and [`Prefetcher::next`] returns `None` afterwards.
pub struct Prefetcher<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Default + Send + 'static> Prefetcher<T> {
    /// Spawn a producer thread named `name` that starts filling the queue immediately.
    pub fn try_new<P: Producer<T>>(
        name: impl Into<String>,
        capacity: usize,
        producer: P,
    ) -> ExtmemResult<Self> {
        if capacity == 0 {
            extmem_bail!("prefetch capacity must be at least 1");
        }

        let name = name.into();
        let shared = Arc::new(Shared {
            name: name.clone(),
            capacity,
            state: Mutex::new(State {
                ready: VecDeque::with_capacity(capacity),
                free: Vec::with_capacity(capacity),
                signal: Signal::Produce,
                end_of_stream: false,
                exited: false,
            }),
            producer_cv: Condvar::new(),
            consumer_cv: Condvar::new(),
        });

        let worker = std::thread::Builder::new().name(name).spawn({
            let shared = Arc::clone(&shared);
            move || run_producer(&shared, producer)
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Block until the next item is available, or return `None` at the end of the stream.
    pub fn next(&mut self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.ready.pop_front() {
                self.shared.producer_cv.notify_one();
                return Some(item);
            }
            if state.end_of_stream || state.exited {
                return None;
            }
            self.shared.consumer_cv.wait(&mut state);
        }
    }

    /// Hand a consumed item back to the producer for reuse.
    pub fn recycle(&mut self, item: T) {
        let mut state = self.shared.state.lock();
        self.shared.release(&mut state, item);
    }

    /// Stop production, rewind the producer and start again from the first item.
    ///
    /// Items still queued from the previous pass are moved to the free list. Returns once the
    /// producer has rewound.
    pub fn before_first(&mut self) {
        let mut state = self.shared.state.lock();
        if state.exited {
            return;
        }
        state.signal = Signal::BeforeFirst;
        self.shared.producer_cv.notify_one();
        while state.signal == Signal::BeforeFirst && !state.exited {
            self.shared.consumer_cv.wait(&mut state);
        }
    }

    /// The capacity this pipeline was created with.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T: Send + 'static> Drop for Prefetcher<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.signal = Signal::Destroy;
            self.shared.producer_cv.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("prefetch thread {} panicked", self.shared.name);
            }
        }
    }
}

/// Marks the shared state as exited when the producer thread returns or unwinds, so that the
/// consumer never waits on a thread that is gone.
struct ExitGuard<'a, T>(&'a Shared<T>);

impl<T> Drop for ExitGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.exited = true;
        self.0.consumer_cv.notify_all();
    }
}

fn run_producer<T: Default, P: Producer<T>>(shared: &Shared<T>, mut producer: P) {
    let _guard = ExitGuard(shared);

    loop {
        let mut slot = {
            let mut state = shared.state.lock();
            while state.signal == Signal::Produce
                && (state.end_of_stream || state.ready.len() >= shared.capacity)
            {
                shared.producer_cv.wait(&mut state);
            }

            match state.signal {
                Signal::Destroy => return,
                Signal::BeforeFirst => {
                    rewind(shared, &mut state, &mut producer);
                    continue;
                }
                Signal::Produce => state.free.pop().unwrap_or_default(),
            }
        };

        let produced = producer.produce(&mut slot);

        let mut state = shared.state.lock();
        if state.signal != Signal::Produce {
            // A rewind or shutdown was requested while decoding; the item belongs to a stale pass.
            shared.release(&mut state, slot);
            continue;
        }
        match produced {
            Ok(true) => state.ready.push_back(slot),
            Ok(false) => {
                state.end_of_stream = true;
                shared.release(&mut state, slot);
            }
            Err(err) => {
                log::error!("{}: stopping pass early: {err}", shared.name);
                state.end_of_stream = true;
                shared.release(&mut state, slot);
            }
        }
        shared.consumer_cv.notify_all();
    }
}

fn rewind<T, P: Producer<T>>(
    shared: &Shared<T>,
    state: &mut MutexGuard<'_, State<T>>,
    producer: &mut P,
) {
    let stale: Vec<T> = state.ready.drain(..).collect();
    for item in stale {
        shared.release(state, item);
    }

    let rewound = MutexGuard::unlocked(state, || producer.rewind());
    state.end_of_stream = match rewound {
        Ok(()) => false,
        Err(err) => {
            log::error!("{}: rewind failed: {err}", shared.name);
            true
        }
    };
    state.signal = Signal::Produce;
    shared.consumer_cv.notify_all();
}
