//! HTTP route handlers

pub mod probes;
