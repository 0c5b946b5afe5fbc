//! Deferred, fallible configuration steps.
//!
//! Every tunable of a module comes in two flavors:
//!
//! ```text
//! with_x(v)                      → Opt::value(v, set)
//! with_x_fn(|| -> Result<V, E>)  → Opt::deferred(factory, set)
//! ```
//!
//! The direct flavor delegates to the deferred one, so factory errors are
//! handled in exactly one place. Options are applied in constructor order
//! during `init` and the first failure aborts the rest.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::{BoxError, Error, Result};

type Step<T> = Box<dyn FnOnce(&mut T) -> std::result::Result<(), BoxError> + Send>;

/// A single configuration step applied to the settings `T` of a module.
pub struct Opt<T> {
    step: Step<T>,
}

impl<T> Opt<T> {
    /// Wrap a raw step. The step may mutate the settings and may fail.
    pub fn new<F>(step: F) -> Self
    where
        F: FnOnce(&mut T) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Self {
            step: Box::new(step),
        }
    }

    /// Produce a value lazily with `factory`, then hand it to `set`.
    pub fn deferred<V, E, F, S>(factory: F, set: S) -> Self
    where
        F: FnOnce() -> std::result::Result<V, E> + Send + 'static,
        E: Into<BoxError>,
        S: FnOnce(&mut T, V) + Send + 'static,
    {
        Self::new(move |settings| {
            let value = factory().map_err(Into::<BoxError>::into)?;
            set(settings, value);
            Ok(())
        })
    }

    /// Set a value known up front.
    pub fn value<V, S>(value: V, set: S) -> Self
    where
        V: Send + 'static,
        S: FnOnce(&mut T, V) + Send + 'static,
    {
        Self::deferred(move || Ok::<_, BoxError>(value), set)
    }

    pub(crate) fn apply(self, settings: &mut T) -> std::result::Result<(), BoxError> {
        (self.step)(settings)
    }
}

impl<T> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt").finish_non_exhaustive()
    }
}

/// Options captured at construction, applied during `init`.
///
/// Option closures are `Send` but not `Sync`; keeping them behind a mutex
/// lets the owning module be shared across tasks. The mutex is only ever
/// reached through `&mut self`.
pub struct Pending<T> {
    opts: Mutex<Vec<Opt<T>>>,
}

impl<T> Pending<T> {
    pub fn new(opts: impl IntoIterator<Item = Opt<T>>) -> Self {
        Self {
            opts: Mutex::new(opts.into_iter().collect()),
        }
    }

    /// Like [`Pending::new`], but use `defaults` when `opts` is empty.
    pub fn or_defaults(
        opts: impl IntoIterator<Item = Opt<T>>,
        defaults: impl FnOnce() -> Vec<Opt<T>>,
    ) -> Self {
        let opts: Vec<Opt<T>> = opts.into_iter().collect();
        if opts.is_empty() {
            Self::new(defaults())
        } else {
            Self::new(opts)
        }
    }

    /// Take the pending options, leaving none behind.
    pub fn take(&mut self) -> Vec<Opt<T>> {
        std::mem::take(self.opts.get_mut().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

/// Apply `opts` to `settings` in order. The first failing option aborts the
/// remaining ones and is returned as [`Error::Option`].
pub fn apply_options<T>(settings: &mut T, opts: impl IntoIterator<Item = Opt<T>>) -> Result<()> {
    for (index, opt) in opts.into_iter().enumerate() {
        opt.apply(settings)
            .map_err(|source| Error::Option { index, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Settings {
        trail: Vec<u32>,
    }

    fn push(n: u32) -> Opt<Settings> {
        Opt::value(n, |s: &mut Settings, n| s.trail.push(n))
    }

    #[test]
    fn applies_in_order() {
        let mut settings = Settings::default();
        apply_options(&mut settings, vec![push(1), push(2), push(3)]).unwrap();
        assert_eq!(settings.trail, vec![1, 2, 3]);
    }

    #[test]
    fn first_failure_aborts_the_rest() {
        let mut settings = Settings::default();
        let failing = Opt::deferred(
            || Err::<u32, _>("factory failed"),
            |s: &mut Settings, n| s.trail.push(n),
        );

        let err = apply_options(&mut settings, vec![push(1), failing, push(3)]).unwrap_err();

        assert!(matches!(err, Error::Option { index: 1, .. }));
        assert_eq!(err.to_string(), "failed to apply option #1: factory failed");
        assert_eq!(settings.trail, vec![1]);
    }

    #[test]
    fn pending_falls_back_to_defaults() {
        let mut pending = Pending::or_defaults(Vec::new(), || vec![push(7)]);
        let mut settings = Settings::default();
        apply_options(&mut settings, pending.take()).unwrap();
        assert_eq!(settings.trail, vec![7]);
        assert!(pending.take().is_empty());
    }

    #[test]
    fn empty_list_is_a_no_op() {
        let mut settings = Settings::default();
        apply_options(&mut settings, Vec::new()).unwrap();
        assert!(settings.trail.is_empty());
    }
}
