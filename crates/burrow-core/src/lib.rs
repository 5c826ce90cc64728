//! burrow-core: shared identity, address, wire and configuration types.
//! All other burrow crates depend on this one.

pub mod addr;
pub mod config;
pub mod wire;

pub use addr::{
    parse_addr_list, rewrite_loopback, tcp_addr, AddrError, AddrInfo, Multiaddr, MultiaddrExt, PeerId,
};
pub use config::BurrowConfig;
pub use wire::Namespace;
