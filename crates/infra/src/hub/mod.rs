//! HTTP adapter for the remote hub

mod client;

pub use client::HttpHubClient;
