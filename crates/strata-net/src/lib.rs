//! TCP transport for the strata server.
//!
//! Connections carry length-prefixed UTF-8 JSON frames ([`framing`]). The
//! [`TcpTransport`] turns them into [`strata_protocol::InboundEvent`]s and
//! accepts outbound messages through a [`NetSink`].

pub mod framing;
pub mod transport;

pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use transport::{IdGenerator, NetSink, PeerMap, TcpTransport, TransportConfig, TransportError};
