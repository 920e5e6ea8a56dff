#![forbid(unsafe_code)]

//! Single-video management front-end for a YouTube channel.
//!
//! The library holds everything the `tubedesk` binary serves: the platform
//! client, comment feed and thumbnail state, the editor and dashboard models
//! and the HTML views. The binary only parses arguments, loads settings and
//! starts [`server::serve`].

pub mod client;
pub mod config;
pub mod dashboard;
pub mod editor;
pub mod feed;
pub mod model;
pub mod page;
pub mod server;
pub mod thumbnail;
pub mod view;

#[cfg(test)]
mod testing;
