//! # searchit-server
//!
//! HTTP server library for Search It, the BLE beacon object finder.
//!
//! This library provides the API handlers, the radio backend selection and
//! the state shared between them.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod beacon;
pub mod logging;
pub mod state;
