//! Reactive Objects
//!
//! A [`ReactiveObject`] is the per-object administration a binding layer
//! builds for one class-style object. Each member is bound once with a
//! role:
//!
//! - **Observable**: a [`Signal`] holding a mutable field.
//! - **Computed**: a [`Memo`] derived from other members.
//! - **Watch**: a callback watch whose source is a getter or another member.
//! - **WatchEffect**: an effect with a given flush mode.
//!
//! Watches and effects are owned by the object's [`EffectScope`], so
//! [`dispose`](ReactiveObject::dispose) tears every one of them down.
//!
//! Binding is idempotent per role: binding `count` as observable twice
//! hands back the first signal, while binding it as observable and then as
//! computed is a [`VigilError::RoleConflict`]. Hosts should bind
//! observables first, then computeds, then watches, so watch sources exist
//! by the time they are looked up.

use std::any::{type_name, Any};
use std::fmt;

use indexmap::IndexMap;

use crate::error::{Result, VigilError};
use crate::reactive::{Memo, Signal};
use crate::scheduler::Scheduler;
use crate::scope::EffectScope;
use crate::watch::{FlushMode, WatchOptions, WatchSource};

/// The role a member was bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    Observable,
    Computed,
    Watch,
    WatchEffect { flush: FlushMode },
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Observable => f.write_str("observable"),
            MemberRole::Computed => f.write_str("computed"),
            MemberRole::Watch => f.write_str("watch"),
            MemberRole::WatchEffect { flush: FlushMode::Pre } => f.write_str("watchEffect"),
            MemberRole::WatchEffect { flush: FlushMode::Post } => f.write_str("watchEffect.post"),
            MemberRole::WatchEffect { flush: FlushMode::Sync } => f.write_str("watchEffect.sync"),
        }
    }
}

struct MemberRecord {
    role: MemberRole,
    /// The signal or memo backing the member. Watches keep nothing here;
    /// their handles live in the scope.
    value: Option<Box<dyn Any + Send + Sync>>,
}

/// Reactive administration for one object.
pub struct ReactiveObject {
    name: String,
    records: IndexMap<String, MemberRecord>,
    scope: EffectScope,
}

impl ReactiveObject {
    /// An object with no members whose watches run on `scheduler`.
    pub fn new(name: impl Into<String>, scheduler: &Scheduler) -> Self {
        Self {
            name: name.into(),
            records: IndexMap::new(),
            scope: EffectScope::new(scheduler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope owning the object's watches.
    pub fn scope(&self) -> &EffectScope {
        &self.scope
    }

    /// Check `key` for an earlier binding.
    ///
    /// `Ok(true)` means it is already bound with `role`, `Ok(false)` that it
    /// is free.
    fn claim(&self, key: &str, role: MemberRole) -> Result<bool> {
        match self.records.get(key) {
            None => Ok(false),
            Some(record) if record.role == role => Ok(true),
            Some(record) => Err(VigilError::RoleConflict {
                key: key.to_string(),
                existing: record.role,
                requested: role,
            }),
        }
    }

    fn insert(&mut self, key: &str, role: MemberRole, value: Option<Box<dyn Any + Send + Sync>>) {
        tracing::trace!(object = %self.name, member = key, %role, "member bound");
        self.records
            .insert(key.to_string(), MemberRecord { role, value });
    }

    fn stored<V: Clone + 'static>(&self, key: &str) -> Result<V> {
        self.records
            .get(key)
            .and_then(|record| record.value.as_ref())
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
            .ok_or_else(|| VigilError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<V>(),
            })
    }

    /// Bind `key` as an observable field with an initial value.
    ///
    /// Rebinding returns the existing signal and ignores `initial`.
    pub fn observable<T>(&mut self, key: &str, initial: T) -> Result<Signal<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.claim(key, MemberRole::Observable)? {
            return self.stored(key);
        }

        let signal = Signal::new(initial);
        self.insert(key, MemberRole::Observable, Some(Box::new(signal.clone())));
        Ok(signal)
    }

    /// Bind `key` as a read-only computed value.
    pub fn computed<T, F>(&mut self, key: &str, compute: F) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.bind_memo(key, || Memo::new(compute))
    }

    /// Bind `key` as a computed value that forwards writes to `set`.
    pub fn computed_writable<T, F, S>(&mut self, key: &str, compute: F, set: S) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.bind_memo(key, || Memo::writable(compute, set))
    }

    fn bind_memo<T>(&mut self, key: &str, build: impl FnOnce() -> Memo<T>) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.claim(key, MemberRole::Computed)? {
            return self.stored(key);
        }

        let memo = build();
        self.insert(key, MemberRole::Computed, Some(Box::new(memo.clone())));
        Ok(memo)
    }

    /// Bind `key` as a watch over an arbitrary source.
    pub fn watch<S, F>(
        &mut self,
        key: &str,
        source: S,
        callback: F,
        options: WatchOptions,
    ) -> Result<()>
    where
        S: WatchSource,
        F: Fn(&S::Value, Option<&S::Value>) + Send + Sync + 'static,
    {
        if self.claim(key, MemberRole::Watch)? {
            return Ok(());
        }

        self.scope.watch(source, callback, options)?;
        self.insert(key, MemberRole::Watch, None);
        Ok(())
    }

    /// Bind `key` as a watch over the observable member `source`.
    ///
    /// Fails with [`VigilError::UnknownMember`] if `source` was never bound,
    /// [`VigilError::NotObservable`] if it is not an observable, and
    /// [`VigilError::TypeMismatch`] if it does not hold a `T`.
    pub fn watch_member<T, F>(
        &mut self,
        key: &str,
        source: &str,
        callback: F,
        options: WatchOptions,
    ) -> Result<()>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        if self.claim(key, MemberRole::Watch)? {
            return Ok(());
        }

        let record = self
            .records
            .get(source)
            .ok_or_else(|| VigilError::UnknownMember(source.to_string()))?;
        if record.role != MemberRole::Observable {
            return Err(VigilError::NotObservable(source.to_string()));
        }
        let signal: Signal<T> = self.stored(source)?;

        self.watch(key, signal, callback, options)
    }

    /// Bind `key` as an effect.
    pub fn watch_effect<F>(&mut self, key: &str, flush: FlushMode, effect: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let role = MemberRole::WatchEffect { flush };
        if self.claim(key, role)? {
            return Ok(());
        }

        self.scope.watch_effect(flush, effect)?;
        self.insert(key, role, None);
        Ok(())
    }

    /// The signal backing observable member `key`.
    pub fn signal<T>(&self, key: &str) -> Result<Signal<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.role(key) {
            None => Err(VigilError::UnknownMember(key.to_string())),
            Some(MemberRole::Observable) => self.stored(key),
            Some(_) => Err(VigilError::NotObservable(key.to_string())),
        }
    }

    /// The memo backing computed member `key`.
    pub fn memo<T>(&self, key: &str) -> Result<Memo<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.role(key) {
            None => Err(VigilError::UnknownMember(key.to_string())),
            Some(MemberRole::Computed) => self.stored(key),
            Some(existing) => Err(VigilError::RoleConflict {
                key: key.to_string(),
                existing,
                requested: MemberRole::Computed,
            }),
        }
    }

    pub fn role(&self, key: &str) -> Option<MemberRole> {
        self.records.get(key).map(|record| record.role)
    }

    pub fn is_observable(&self, key: &str) -> bool {
        self.role(key) == Some(MemberRole::Observable)
    }

    pub fn is_computed(&self, key: &str) -> bool {
        self.role(key) == Some(MemberRole::Computed)
    }

    pub fn is_watch(&self, key: &str) -> bool {
        self.role(key) == Some(MemberRole::Watch)
    }

    pub fn is_watch_effect(&self, key: &str) -> bool {
        matches!(self.role(key), Some(MemberRole::WatchEffect { .. }))
    }

    /// Bound members with their roles, in binding order.
    pub fn members(&self) -> impl Iterator<Item = (&str, MemberRole)> + '_ {
        self.records
            .iter()
            .map(|(key, record)| (key.as_str(), record.role))
    }

    /// Stop every watch and effect the object owns.
    ///
    /// Observables and computeds stay readable.
    pub fn dispose(&self) {
        tracing::debug!(object = %self.name, "disposing reactive object");
        self.scope.stop();
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("name", &self.name)
            .field("members", &self.members().collect::<Vec<_>>())
            .field("scope", &self.scope)
            .finish()
    }
}
