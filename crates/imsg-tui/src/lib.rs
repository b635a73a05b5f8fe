//! Terminal client for the imsg server.

pub mod api;
pub mod app;
pub mod engine;
pub mod live;
pub mod view;
