//! burrow-client: talks to the rendezvous service over HTTP.

pub mod client;
pub mod ip;

pub use burrow_services::RouteError;
pub use client::RendezvousClient;
pub use ip::public_ip;
