//! Watch Sources
//!
//! Anything a callback watch can observe. Reading a source inside the
//! watcher's tracking context subscribes the watcher to everything the read
//! touched; the value read is what the callback receives and what decides
//! whether the callback fires at all.

use crate::reactive::{Memo, Signal};

/// A value a [`watch`](super::watch) can observe.
pub trait WatchSource: Send + Sync + 'static {
    /// The observed value. Compared with the previous read to decide whether
    /// the callback fires.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Read the current value, tracked.
    fn read(&self) -> Self::Value;
}

impl<T> WatchSource for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

impl<T> WatchSource for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

/// A closure used as a watch source. Build one with [`getter`].
#[derive(Clone)]
pub struct Getter<F> {
    read: F,
}

/// Watch whatever `f` reads.
///
/// ```rust
/// use vigil_core::reactive::Signal;
/// use vigil_core::watch::{getter, WatchSource};
///
/// let first = Signal::new(String::from("Ada"));
/// let last = Signal::new(String::from("Lovelace"));
///
/// let full_name = getter(move || format!("{} {}", first.get(), last.get()));
/// assert_eq!(full_name.read(), "Ada Lovelace");
/// ```
pub fn getter<F, T>(f: F) -> Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Getter { read: f }
}

impl<F, T> WatchSource for Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        (self.read)()
    }
}

/// Several sources of one type, observed as a list.
impl<S> WatchSource for Vec<S>
where
    S: WatchSource,
{
    type Value = Vec<S::Value>;

    fn read(&self) -> Self::Value {
        self.iter().map(WatchSource::read).collect()
    }
}

macro_rules! tuple_source {
    ($($source:ident),+) => {
        impl<$($source: WatchSource),+> WatchSource for ($($source,)+) {
            type Value = ($($source::Value,)+);

            #[allow(non_snake_case)]
            fn read(&self) -> Self::Value {
                let ($($source,)+) = self;
                ($($source.read(),)+)
            }
        }
    };
}

tuple_source!(A);
tuple_source!(A, B);
tuple_source!(A, B, C);
tuple_source!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ReactiveContext, Runtime, SubscriberId};

    #[test]
    fn tuple_reads_each_member() {
        let a = Signal::new(1);
        let b = Signal::new("two");
        let doubled = {
            let a = a.clone();
            Memo::new(move || a.get() * 2)
        };

        assert_eq!((a.clone(), b.clone(), doubled).read(), (1, "two", 2));
    }

    #[test]
    fn vec_reads_in_order() {
        let sources = vec![Signal::new(3), Signal::new(1), Signal::new(2)];
        assert_eq!(sources.read(), vec![3, 1, 2]);
    }

    #[test]
    fn reads_are_tracked_by_the_running_subscriber() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let source = getter({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        let subscriber = SubscriberId::new();
        {
            let _ctx = ReactiveContext::enter(subscriber);
            source.read();
        }

        assert_eq!(Runtime::dependency_count(subscriber), 2);
        assert_eq!(a.subscriber_count(), 1);
        Runtime::clear_dependencies(subscriber);
    }
}
