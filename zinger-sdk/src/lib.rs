//! Shared types for the Zinger match-to-audio pipeline.
//!
//! Every process in the pipeline speaks the JSON schemas defined in
//! [`objects`]. The typed HTTP client for the tracked-player store lives in
//! [`client`] behind the `client` feature.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
