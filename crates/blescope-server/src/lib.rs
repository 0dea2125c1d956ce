//! # blescope-server
//!
//! HTTP surface for blescope: REST endpoints over the live device catalog,
//! advertisement decoding, GATT access and a Server-Sent Events stream.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
