//! Control-plane assembly.
//!
//! [`Heimdall::builder()`] wires the configured store, rate limiter,
//! admission controller, cache and worker pool into a [`ControlPlane`].

mod builder;
mod control;

pub use builder::{Heimdall, HeimdallBuilder};
pub use control::ControlPlane;
