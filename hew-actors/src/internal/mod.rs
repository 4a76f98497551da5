//! Internal synchronization helpers. Not part of the public API.

pub(crate) mod spin;
