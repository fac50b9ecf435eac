//! Observable values.
//!
//! A [`Signal`] is a cloneable, read-only handle to a value owned by an adapter. Readers either
//! poll it with [`Signal::get`] or await changes through the [`Changes`] stream. [`Derived`]
//! values are computed from a signal on every read and never cache anything.

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use futures_util::{stream::BoxStream, Stream};

struct State<T> {
    value: T,
    version: u64,
    closed: bool,
    wakers: Vec<Waker>,
}

/// An observable value.
pub struct Signal<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Signal<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value,
                version: 0,
                closed: false,
                wakers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls `f` with a reference to the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock().value)
    }

    /// Returns a counter that is incremented on every change.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Replaces the value and wakes all pending [`Changes`] streams.
    ///
    /// Does nothing once the signal has been closed.
    pub(crate) fn set(&self, value: T) {
        let wakers = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.value = value;
            state.version += 1;
            std::mem::take(&mut state.wakers)
        };
        wakers.into_iter().for_each(Waker::wake);
    }

    /// Freezes the signal: later [`Signal::set`] calls are ignored and change streams end.
    pub(crate) fn close(&self) {
        let wakers = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.wakers)
        };
        wakers.into_iter().for_each(Waker::wake);
    }
}

impl<T: Clone> Signal<T> {
    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Returns a stream yielding the value after each subsequent change.
    ///
    /// Changes that happen faster than the stream is polled are collapsed: only the latest value
    /// is yielded. The stream ends when the owning adapter is disposed.
    pub fn changes(&self) -> Changes<T> {
        Changes {
            seen: self.version(),
            signal: self.clone(),
        }
    }

    /// Creates a [`Derived`] value computed from this signal by `f`.
    pub fn map<U, F>(&self, f: F) -> Derived<U>
    where
        T: Send + 'static,
        U: 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        let (read, watch) = (f.clone(), f);
        let watch_source = source.clone();
        Derived {
            read: Arc::new(move || source.with(|v| read(v))),
            watch: Arc::new(move || {
                let f = watch.clone();
                Box::pin(futures_util::StreamExt::map(watch_source.changes(), move |v| f(&v)))
            }),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Signal")
            .field("value", &state.value)
            .field("version", &state.version)
            .finish()
    }
}

/// A stream of changes to a [`Signal`].
///
/// Returned by [`Signal::changes`].
pub struct Changes<T> {
    signal: Signal<T>,
    seen: u64,
}

impl<T: Clone> Stream for Changes<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let mut state = this.signal.lock();
        if state.version != this.seen {
            this.seen = state.version;
            return Poll::Ready(Some(state.value.clone()));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// A value computed from a [`Signal`].
///
/// Nothing is stored: every [`Derived::get`] re-evaluates the function against the source's
/// current value, so a derived value can never disagree with its source.
pub struct Derived<T> {
    read: Arc<dyn Fn() -> T + Send + Sync>,
    watch: Arc<dyn Fn() -> BoxStream<'static, T> + Send + Sync>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            watch: self.watch.clone(),
        }
    }
}

impl<T> Derived<T> {
    /// Recomputes the value from the current state of the source.
    pub fn get(&self) -> T {
        (self.read)()
    }

    /// Returns a stream yielding the recomputed value whenever the source changes.
    pub fn changes(&self) -> BoxStream<'static, T> {
        (self.watch)()
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[test]
    fn set_and_get() {
        let signal = Signal::new(1);
        assert_eq!(signal.get(), 1);
        assert_eq!(signal.version(), 0);
        signal.set(2);
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.version(), 1);
        assert_eq!(signal.with(|v| v * 10), 20);
    }

    #[test]
    fn closed_signal_ignores_writes() {
        let signal = Signal::new("a");
        signal.close();
        signal.set("b");
        assert_eq!(signal.get(), "a");
        assert_eq!(signal.version(), 0);
    }

    #[test]
    fn derived_tracks_source() {
        let server = Signal::new(None::<u32>);
        let connected = server.map(|s| s.is_some());
        assert!(!connected.get());
        server.set(Some(7));
        assert!(connected.get());
        server.set(None);
        assert!(!connected.get());
    }

    #[test]
    fn change_stream() {
        pollster::block_on(async {
            let signal = Signal::new(0);
            let mut changes = signal.changes();
            let derived = signal.map(|v| v % 2 == 1);
            let mut parity = derived.changes();

            signal.set(1);
            assert_eq!(changes.next().await, Some(1));
            assert_eq!(parity.next().await, Some(true));

            // Collapsed into the latest value.
            signal.set(2);
            signal.set(3);
            assert_eq!(changes.next().await, Some(3));

            signal.close();
            assert_eq!(changes.next().await, None);
            assert_eq!(parity.next().await, Some(true));
            assert_eq!(parity.next().await, None);
        });
    }
}
