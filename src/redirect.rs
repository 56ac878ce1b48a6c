//! Classification of cluster redirect replies.
//!
//! A node that does not own a key's slot answers with an error reply whose
//! first word is `MOVED` (the slot now lives elsewhere for good) or `ASK`
//! (the slot is being migrated; retry this one request elsewhere):
//!
//! ```text
//! -MOVED 3999 127.0.0.1:6381
//! -ASK 3999 127.0.0.1:6381
//! ```
//!
//! Every other error reply is an ordinary application error.

use std::fmt;

use crate::types::RcpError;

/// Routing instruction carried by a redirect reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The slot is permanently served by `addr`.
    Moved { slot: Option<u16>, addr: String },
    /// Retry this single request against `addr`.
    Ask { slot: Option<u16>, addr: String },
}

impl Redirect {
    /// `host:port` of the node the reply points at.
    pub fn target(&self) -> &str {
        match self {
            Redirect::Moved { addr, .. } | Redirect::Ask { addr, .. } => addr,
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, slot, addr) = match self {
            Redirect::Moved { slot, addr } => ("MOVED", slot, addr),
            Redirect::Ask { slot, addr } => ("ASK", slot, addr),
        };
        match slot {
            Some(slot) => write!(f, "{kind} {slot} {addr}"),
            None => write!(f, "{kind} {addr}"),
        }
    }
}

/// First whitespace-delimited word of an error message, e.g. `ERR`.
pub fn error_prefix(message: &[u8]) -> &[u8] {
    message
        .split(|b| b.is_ascii_whitespace())
        .find(|word| !word.is_empty())
        .unwrap_or_default()
}

/// Classify an error reply's message (without the leading `-`).
///
/// Returns `Ok(None)` for application errors. The last field of a `MOVED` or
/// `ASK` message is the target and must look like `host:port`; a message with
/// no such field is an error.
pub fn classify(message: &[u8]) -> Result<Option<Redirect>, RcpError> {
    let mut words = message
        .split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty());

    let ask = match words.next() {
        Some(b"MOVED") => false,
        Some(b"ASK") => true,
        _ => return Ok(None),
    };

    let rest: Vec<&[u8]> = words.collect();
    let Some((addr, middle)) = rest.split_last() else {
        return Err(malformed(message));
    };
    let addr = std::str::from_utf8(addr)
        .ok()
        .filter(|addr| addr.contains(':'))
        .ok_or_else(|| malformed(message))?
        .to_string();
    let slot = middle
        .first()
        .and_then(|slot| std::str::from_utf8(slot).ok())
        .and_then(|slot| slot.parse().ok());

    Ok(Some(if ask {
        Redirect::Ask { slot, addr }
    } else {
        Redirect::Moved { slot, addr }
    }))
}

fn malformed(message: &[u8]) -> RcpError {
    RcpError::BadRedirect(String::from_utf8_lossy(message).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_moved() {
        let redirect = classify(b"MOVED 1234 127.0.0.1:30002").unwrap().unwrap();
        assert_eq!(
            redirect,
            Redirect::Moved {
                slot: Some(1234),
                addr: "127.0.0.1:30002".to_string()
            }
        );
        assert_eq!(redirect.target(), "127.0.0.1:30002");
        assert_eq!(redirect.to_string(), "MOVED 1234 127.0.0.1:30002");
    }

    #[test]
    fn classifies_ask() {
        let redirect = classify(b"ASK 99 10.0.0.5:7001").unwrap().unwrap();
        assert!(matches!(redirect, Redirect::Ask { slot: Some(99), .. }));
        assert_eq!(redirect.target(), "10.0.0.5:7001");
    }

    #[test]
    fn last_field_is_the_target() {
        let redirect = classify(b"MOVED  127.0.0.1:7000 ").unwrap().unwrap();
        assert_eq!(
            redirect,
            Redirect::Moved {
                slot: None,
                addr: "127.0.0.1:7000".to_string()
            }
        );
    }

    #[test]
    fn application_errors_pass() {
        assert_eq!(classify(b"ERR unknown command 'FOO'").unwrap(), None);
        assert_eq!(classify(b"WRONGTYPE Operation against a key").unwrap(), None);
        assert_eq!(classify(b"MOVEDX 1 127.0.0.1:1").unwrap(), None);
        assert_eq!(classify(b"").unwrap(), None);
    }

    #[test]
    fn rejects_moved_without_target() {
        assert!(matches!(classify(b"MOVED"), Err(RcpError::BadRedirect(_))));
        assert!(matches!(classify(b"MOVED 1234"), Err(RcpError::BadRedirect(_))));
        assert!(matches!(classify(b"ASK 1234 localhost"), Err(RcpError::BadRedirect(_))));
    }

    #[test]
    fn prefix_is_first_word() {
        assert_eq!(error_prefix(b"ERR wrong number of arguments"), b"ERR");
        assert_eq!(error_prefix(b"MOVED 1 a:1"), b"MOVED");
        assert_eq!(error_prefix(b""), b"");
    }
}
