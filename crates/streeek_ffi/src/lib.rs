//! Flutter-facing bindings for the Streeek reminder core.

pub mod api;
