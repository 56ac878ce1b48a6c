//! TCP front end: the accept loop and the per-connection proxy session.

pub mod server;
pub mod session;

pub use server::RcpTcpServer;
pub use session::ProxySession;
