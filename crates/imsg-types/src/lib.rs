//! Wire contracts shared by the server crates and the terminal client.

pub mod api;
pub mod events;
pub mod models;
