use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ProxyConfig;
use crate::tcp::ProxySession;
use crate::types::RcpError;

/// Accept loop handing every client connection to its own [`ProxySession`].
pub struct RcpTcpServer {
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    next_session_id: Arc<AtomicU64>,
}

impl RcpTcpServer {
    /// Bind to the configured listen address
    pub async fn bind(config: ProxyConfig) -> Result<Self, RcpError> {
        config.validate()?;
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr).await?;
        info!("proxy bound to {}, seed backend {}", addr, config.backend);

        Ok(Self {
            listener,
            config: Arc::new(config),
            next_session_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Get the local address this server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, RcpError> {
        self.listener.local_addr().map_err(RcpError::Io)
    }

    /// Accept connections until the process exits
    pub async fn run(self) -> Result<(), RcpError> {
        info!("proxy accepting connections...");

        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => self.spawn_session(socket, addr),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RcpError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => self.spawn_session(socket, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_session(&self, socket: TcpStream, addr: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        info!("New connection from {} (session {})", addr, session_id);

        if let Err(e) = socket.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let session = ProxySession::from_config(socket, &self.config);
        let span = info_span!("session", id = session_id, peer = %addr);
        tokio::spawn(
            async move {
                match session.run().await {
                    Ok(()) => info!("session ended"),
                    Err(e) => warn!("session ended with error: {}", e),
                }
            }
            .instrument(span),
        );
    }
}
