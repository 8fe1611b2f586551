//! Actor implementations

pub mod reconciler;
