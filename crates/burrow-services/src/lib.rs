//! burrow-services: the registry, routing seams and tunnel data plane.
//!
//! Nothing in here speaks HTTP: the rendezvous server wraps `PeerDirectory`
//! and the rendezvous client implements the `routing` traits.

pub mod directory;
pub mod host;
pub mod nat;
pub mod pool;
pub mod routing;
pub mod tcp_host;
pub mod tunnel;

pub use directory::{DirectoryError, PeerDirectory, ServerIdSlot};
pub use host::{
    accept_backoff, HandlerFuture, HostError, P2pHost, PeerStream, Reachability, StreamHandler,
};
pub use nat::ReachabilityWatcher;
pub use pool::{BufferPool, PooledBuf, RELAY_BUFFER_SIZE};
pub use routing::{
    provider_channel, ContentRouting, FingerprintRouting, PeerRouting, ProviderSink, ProviderStream,
    RouteError, ServerIdentity,
};
pub use tcp_host::TcpHost;
pub use tunnel::{ConnContext, Dialers, Route, Tunnel};
