//! # rcproxy - Redis Cluster proxy
//!
//! Lets applications that only speak to a single Redis server use a Redis
//! Cluster. Each client connection gets its own session that forwards
//! requests, byte for byte, to a cluster node and relays the replies back.
//! When a node answers `-MOVED <slot> <host:port>`, the session reconnects to
//! the named node and replays the request there.
//!
//! ## Quick Start
//!
//! ```rust
//! use rcproxy::{Item, frame::{split, Split}};
//!
//! let wire = b"$6\r\nfoobar\r\n";
//! let Split::Frame(frame) = split(wire, true)? else { unreachable!() };
//! assert_eq!(frame.len(), wire.len());
//!
//! let item = frame.to_item(&bytes::Bytes::from_static(wire));
//! assert_eq!(item, Item::bulk("foobar"));
//! assert_eq!(&item.to_bytes()[..], wire);
//! # Ok::<(), rcproxy::ProtocolError>(())
//! ```
//!
//! ## Wire format
//!
//! | Sigil | Item         | Example                 |
//! |-------|--------------|-------------------------|
//! | `+`   | SimpleString | `+OK\r\n`               |
//! | `-`   | Error        | `-ERR message\r\n`      |
//! | `:`   | Integer      | `:1000\r\n`             |
//! | `$`   | Bulk         | `$6\r\nfoobar\r\n`      |
//! | `*`   | Array        | `*2\r\n` + elements     |
//! | none  | Inline       | `EXISTS somekey\r\n`    |
//!
//! Lines are written with `\r\n`; `\r\n` and a bare `\n` are both accepted.
//! `$-1` and `*-1` are the null bulk and null array.
//!
//! ## Limitations
//!
//! Sessions keep no shared slot map and open one backend connection at a
//! time. `ASK` redirects end the session. There are no I/O timeouts: a
//! backend that never answers stalls only its own session.

pub mod cli;
pub mod codec;
pub mod config;
pub mod frame;
pub mod redirect;
pub mod tcp;
pub mod types;

pub use codec::{Command, CommandCodec, ItemCodec, ItemReader, Reply, ReplyCodec};
pub use config::ProxyConfig;
pub use redirect::Redirect;
pub use types::{Item, ProtocolError, RcpError};
