//! Transport-level building blocks: opening a socket, negotiating the protocol version, and
//! parsing the steady-state frame stream that follows.

pub mod connect;
pub mod framed;
pub mod handshake;
pub mod io_stream;
pub mod pem;

pub use connect::connect;
pub use framed::FramedMessageStream;
pub use handshake::{negotiate, NegotiatedProtocol};
pub use io_stream::IoStream;
