//! Request/response model and the network the cache layer falls back to.

mod client;
#[cfg(test)]
pub mod mock;
mod types;

pub use client::{HttpNetwork, Network};
pub use types::{Destination, Request, RequestMode, Response, ResponseType};
