//! Accepted forms of prerequisites.
//!
//! [`Registration::depends_on`](crate::Registration::depends_on) takes any iterator of
//! prerequisites. A prerequisite is a [`Dependency`] handle, a reference to one, or an
//! optional handle; an absent handle is rejected at registration time.
//!
//! This trait is internal and not meant for external implementation. Users should only
//! use the provided implementations.

use crate::types::Dependency;

pub(crate) trait Prerequisite {
    fn into_dependency(self) -> Option<Dependency>;
}

impl Prerequisite for Dependency {
    fn into_dependency(self) -> Option<Dependency> {
        Some(self)
    }
}

impl Prerequisite for &Dependency {
    fn into_dependency(self) -> Option<Dependency> {
        Some(*self)
    }
}

impl Prerequisite for Option<Dependency> {
    fn into_dependency(self) -> Option<Dependency> {
        self
    }
}

impl Prerequisite for Option<&Dependency> {
    fn into_dependency(self) -> Option<Dependency> {
        self.copied()
    }
}
