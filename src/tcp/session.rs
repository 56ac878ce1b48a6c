//! Per-connection proxy state machine.
//!
//! A session reads one client request, forwards its raw bytes to the current
//! backend node, reads one complete reply and relays it. Only then is the next
//! request read, so requests never overlap even if the client pipelines.
//!
//! The backend connection is opened lazily. A `MOVED` reply closes it, rebinds
//! the session to the node named in the reply and replays the same request
//! there, up to `max_redirects` times per request. Any failure writes a short
//! error reply to the client where possible and ends the session.

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{Command, CommandCodec, Reply, ReplyCodec};
use crate::config::ProxyConfig;
use crate::redirect::{self, Redirect};
use crate::types::{Item, RcpError};

const DIAL_ERROR: &str = "ERR backend dial error";
const WRITE_ERROR: &str = "ERR backend write error";
const READ_ERROR: &str = "ERR backend read error";
const COMMAND_ERROR: &str = "ERR unexpected error reading command";
const BAD_REDIRECT: &str = "ERR unexpected -MOVED string";
const TOO_MANY_REDIRECTS: &str = "ERR too many redirects";
const ASK_UNSUPPORTED: &str = "ERR ASK redirect not supported";

type Backend = Framed<TcpStream, ReplyCodec>;

/// One client connection and the backend node it is currently bound to.
pub struct ProxySession<S> {
    client: Framed<S, CommandCodec>,
    backend_addr: String,
    backend: Option<Backend>,
    max_redirects: usize,
}

impl<S> ProxySession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: S, backend_addr: impl Into<String>, max_redirects: usize) -> Self {
        Self {
            client: Framed::new(client, CommandCodec::default()),
            backend_addr: backend_addr.into(),
            backend: None,
            max_redirects,
        }
    }

    pub fn from_config(client: S, config: &ProxyConfig) -> Self {
        Self::new(client, config.backend.clone(), config.max_redirects)
    }

    /// Address of the node the next request will be sent to.
    pub fn backend_addr(&self) -> &str {
        &self.backend_addr
    }

    /// Drive the session until the client disconnects or an error ends it.
    ///
    /// Both streams are closed on every exit path. A clean client disconnect
    /// returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), RcpError> {
        let result = self.serve().await;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<(), RcpError> {
        loop {
            let command = match self.client.try_next().await {
                Ok(Some(command)) => command,
                Ok(None) => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    let reply = e.reply().unwrap_or_else(|| error_reply(COMMAND_ERROR));
                    self.reply_best_effort(reply).await;
                    return Err(e);
                }
            };

            debug!(
                command = %String::from_utf8_lossy(command.name().unwrap_or_default()),
                bytes = command.raw().len(),
                "forwarding request"
            );
            let reply = self.round_trip(&command).await?;
            self.client.send(reply.into_raw()).await?;
        }
    }

    /// Send `command` until a reply other than `MOVED` comes back.
    async fn round_trip(&mut self, command: &Command) -> Result<Reply, RcpError> {
        let mut hops = 0;
        loop {
            let reply = self.exchange(command).await?;
            let Some(message) = reply.error_message() else {
                return Ok(reply);
            };

            let redirect = match redirect::classify(message) {
                Ok(Some(redirect)) => redirect,
                Ok(None) => {
                    debug!(
                        kind = %String::from_utf8_lossy(redirect::error_prefix(message)),
                        "relaying error reply"
                    );
                    return Ok(reply);
                }
                Err(e) => return Err(self.fail(BAD_REDIRECT, e).await),
            };

            match redirect {
                Redirect::Moved { slot, addr } => {
                    if hops >= self.max_redirects {
                        warn!(hops, "giving up on redirect chain");
                        return Err(self.fail(TOO_MANY_REDIRECTS, RcpError::TooManyRedirects(hops)).await);
                    }
                    hops += 1;
                    info!(?slot, from = %self.backend_addr, to = %addr, "MOVED, rebinding backend");
                    self.rebind(addr).await;
                }
                Redirect::Ask { slot, addr } => {
                    warn!(?slot, to = %addr, "ASK redirect, halting session");
                    return Err(self.fail(ASK_UNSUPPORTED, RcpError::AskUnsupported(addr)).await);
                }
            }
        }
    }

    /// Write one request to the backend and read back one complete reply.
    async fn exchange(&mut self, command: &Command) -> Result<Reply, RcpError> {
        let backend = match self.backend.take() {
            Some(backend) => backend,
            None => self.dial().await?,
        };
        let backend = self.backend.insert(backend);

        if let Err(e) = backend.send(command.raw().clone()).await {
            warn!(backend = %self.backend_addr, error = %e, "backend write failed");
            return Err(self.fail(WRITE_ERROR, e).await);
        }

        match backend.try_next().await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(self.fail(READ_ERROR, RcpError::BackendClosed).await),
            Err(e) => {
                warn!(backend = %self.backend_addr, error = %e, "backend read failed");
                let reply = e.reply().unwrap_or_else(|| error_reply(READ_ERROR));
                self.reply_best_effort(reply).await;
                Err(e)
            }
        }
    }

    async fn dial(&mut self) -> Result<Backend, RcpError> {
        match TcpStream::connect(self.backend_addr.as_str()).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "failed to set TCP_NODELAY");
                }
                info!(backend = %self.backend_addr, "connected to backend");
                Ok(Framed::new(stream, ReplyCodec::default()))
            }
            Err(e) => {
                warn!(backend = %self.backend_addr, error = %e, "backend dial failed");
                Err(self.fail(DIAL_ERROR, e.into()).await)
            }
        }
    }

    /// Drop the current backend connection and point the session at `addr`.
    async fn rebind(&mut self, addr: String) {
        self.close_backend().await;
        self.backend_addr = addr;
    }

    async fn close_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = SinkExt::<Bytes>::close(&mut backend).await {
                debug!(error = %e, "backend shutdown failed");
            }
        }
    }

    async fn close(&mut self) {
        self.close_backend().await;
        if let Err(e) = SinkExt::<Bytes>::close(&mut self.client).await {
            debug!(error = %e, "client shutdown failed");
        }
    }

    /// Tell the client why the session is ending, then hand back `err`.
    async fn fail(&mut self, message: &'static str, err: RcpError) -> RcpError {
        self.reply_best_effort(error_reply(message)).await;
        err
    }

    async fn reply_best_effort(&mut self, reply: Bytes) {
        if let Err(e) = self.client.send(reply).await {
            debug!(error = %e, "failed to deliver error reply");
        }
    }
}

fn error_reply(message: &'static str) -> Bytes {
    Item::error(message).to_bytes()
}
