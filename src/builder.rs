//! Registration builder.
//!
//! [`Closer::add`] starts a registration; the graph is only touched once the
//! registration is finished with [`Registration::register`] or
//! [`Registration::depends_on`].

use crate::closer::Closer;
use crate::error::CloserResult;
use crate::prerequisite::Prerequisite;
use crate::release::Releaser;
use crate::types::Dependency;

/// Pending registration of one resource.
///
/// Returned by [`Closer::add`]. Finish it with [`register`](Registration::register) for a
/// resource with no prerequisites or [`depends_on`](Registration::depends_on) to declare
/// the resources that may only be released after this one.
///
/// # Examples
///
/// ```
/// use closer::{releaser, Closer};
///
/// let closer = Closer::new();
///
/// // Released last: the server and the worker both use it
/// let pool = closer.add(Some(releaser(|_| async { Ok(()) }))).register();
///
/// // Released before the pool
/// let server = closer.add(None).depends_on([pool]).unwrap();
/// let worker = closer.add(None).depends_on([&pool]).unwrap();
/// # let _ = (server, worker);
/// ```
#[must_use = "a registration does nothing until `register` or `depends_on` is called"]
pub struct Registration<'a> {
    pub(crate) closer: &'a Closer,
    pub(crate) releaser: Option<Releaser>,
}

impl<'a> Registration<'a> {
    /// Register the resource without prerequisites.
    pub fn register(self) -> Dependency {
        self.closer.insert(self.releaser)
    }

    /// Register the resource with its prerequisites.
    ///
    /// Every prerequisite is released only after this resource. Listing the same
    /// prerequisite more than once has no additional effect.
    ///
    /// # Errors
    ///
    /// - [`CloserError::NilDependency`](crate::CloserError::NilDependency) if a
    ///   prerequisite is `None`
    /// - [`CloserError::UnknownDependency`](crate::CloserError::UnknownDependency) if a
    ///   prerequisite was issued by another closer or has already been released
    ///
    /// On error nothing is registered.
    ///
    /// # Examples
    ///
    /// ```
    /// use closer::{Closer, CloserError, Dependency};
    ///
    /// let closer = Closer::new();
    /// let a = closer.add(None).register();
    ///
    /// let missing: Option<Dependency> = None;
    /// let err = closer.add(None).depends_on([Some(a), missing]).unwrap_err();
    /// assert!(matches!(err, CloserError::NilDependency));
    /// assert_eq!(closer.len(), 1);
    /// ```
    #[allow(private_bounds)]
    pub fn depends_on<I>(self, prerequisites: I) -> CloserResult<Dependency>
    where
        I: IntoIterator,
        I::Item: Prerequisite,
    {
        let prerequisites = prerequisites
            .into_iter()
            .map(Prerequisite::into_dependency)
            .collect();
        self.closer.insert_with(self.releaser, prerequisites)
    }
}
