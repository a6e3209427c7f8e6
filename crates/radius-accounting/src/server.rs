use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::cache::{RequestFingerprint, TtlCache};
use crate::config::Config;
use crate::error::AccountingError;
use crate::model::NasContext;
use crate::service::{AccountingService, Ack};
use radius_proto::auth::{sign_response, verify_accounting_request_authenticator};
use radius_proto::{Code, Packet, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Unauthorized client: {0}")]
    UnauthorizedClient(IpAddr),
    #[error("Invalid Request Authenticator")]
    InvalidAuthenticator,
    #[error("Unexpected packet code: {0:?}")]
    UnexpectedCode(Code),
    #[error("Accounting error: {0}")]
    Accounting(#[from] AccountingError),
}

/// State of a request in the deduplication cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedReply {
    /// Being processed; retransmissions are dropped
    InFlight,
    /// Processed; retransmissions get this encoded Accounting-Response
    Done(Vec<u8>),
}

/// Accounting server configuration
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// NAS table and default secret
    pub config: Arc<Config>,
    /// Request deduplication / reply replay cache
    pub request_cache: Arc<TtlCache<RequestFingerprint, CachedReply>>,
    pub audit_logger: Arc<AuditLogger>,
}

impl ServerConfig {
    /// Server on `bind_addr` with the default cache (60 s TTL, 10000 entries) and no audit log
    pub fn new(bind_addr: SocketAddr, config: Config) -> Self {
        ServerConfig {
            bind_addr,
            config: Arc::new(config),
            request_cache: Arc::new(TtlCache::new(Duration::from_secs(60), 10000)),
            audit_logger: Arc::new(AuditLogger::disabled()),
        }
    }

    /// Create server config from a full Config object
    pub fn from_config(config: Config, audit_logger: Arc<AuditLogger>) -> Result<Self, ServerError> {
        let bind_addr = config
            .socket_addr()
            .map_err(|e| ServerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let ttl = Duration::from_secs(config.request_cache_ttl.unwrap_or(60));
        let max_entries = config.request_cache_max_entries.unwrap_or(10000);

        Ok(ServerConfig {
            bind_addr,
            config: Arc::new(config),
            request_cache: Arc::new(TtlCache::new(ttl, max_entries)),
            audit_logger,
        })
    }
}

/// UDP listener for Accounting-Request packets
pub struct AccountingServer {
    config: Arc<ServerConfig>,
    service: AccountingService,
    socket: Arc<UdpSocket>,
}

impl AccountingServer {
    pub async fn new(config: ServerConfig, service: AccountingService) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        info!("RADIUS accounting server listening on {}", socket.local_addr()?);

        Ok(AccountingServer {
            config: Arc::new(config),
            service,
            socket: Arc::new(socket),
        })
    }

    /// Get the local address the server is listening on
    ///
    /// This is useful for testing when binding to port 0 (OS-assigned port)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    /// Receive datagrams forever, one task per request
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; 4096];

        loop {
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let config = Arc::clone(&self.config);
            let service = self.service.clone();
            let socket = Arc::clone(&self.socket);

            tokio::spawn(async move {
                if let Err(e) = Self::handle_request(data, addr, config, service, socket).await {
                    warn!(client_addr = %addr, error = %e, "Accounting-Request not acknowledged");
                }
            });
        }
    }

    async fn handle_request(
        data: Vec<u8>,
        addr: SocketAddr,
        config: Arc<ServerConfig>,
        service: AccountingService,
        socket: Arc<UdpSocket>,
    ) -> Result<(), ServerError> {
        let request_id = data.get(1).copied().unwrap_or(0);

        let Some(nas) = config.config.nas_context(addr.ip()) else {
            warn!(client_ip = %addr.ip(), request_id, "Rejected request from unauthorized client");
            config
                .audit_logger
                .log(AuditEntry::new(AuditEventType::UnauthorizedClient)
                    .with_nas(addr.ip(), None)
                    .with_request_id(request_id))
                .await;
            return Err(ServerError::UnauthorizedClient(addr.ip()));
        };

        let request = Packet::decode(&data)?;
        if request.code != Code::AccountingRequest {
            return Err(ServerError::UnexpectedCode(request.code));
        }

        if !verify_accounting_request_authenticator(&request, &nas.secret) {
            Self::audit_drop(&config, &nas, request.identifier, "invalid request authenticator").await;
            return Err(ServerError::InvalidAuthenticator);
        }

        let fingerprint = RequestFingerprint::new(addr.ip(), request.identifier, &request.authenticator);
        if !config
            .request_cache
            .insert_if_absent(fingerprint, CachedReply::InFlight)
        {
            match config.request_cache.get(&fingerprint) {
                Some(CachedReply::Done(reply)) => {
                    debug!(client_addr = %addr, request_id = request.identifier, "Retransmission, replaying reply");
                    socket.send_to(&reply, addr).await?;
                }
                _ => {
                    debug!(client_addr = %addr, request_id = request.identifier, "Retransmission of in-flight request, dropping");
                }
            }
            return Ok(());
        }

        let reply = match Self::process(&request, &nas, &service).await {
            Ok(reply) => reply,
            Err(e) => {
                // Let the NAS's retransmission be processed afresh
                config.request_cache.remove(&fingerprint);
                Self::audit_drop(&config, &nas, request.identifier, &e.to_string()).await;
                return Err(e);
            }
        };

        config
            .request_cache
            .insert(fingerprint, CachedReply::Done(reply.clone()));
        socket.send_to(&reply, addr).await?;

        debug!(client_addr = %addr, request_id = request.identifier, "Sent Accounting-Response");
        Ok(())
    }

    /// Apply the request and build the signed, encoded Accounting-Response
    async fn process(
        request: &Packet,
        nas: &NasContext,
        service: &AccountingService,
    ) -> Result<Vec<u8>, ServerError> {
        let ack = service.handle_accounting(request, nas).await?;
        if ack == Ack::Duplicate {
            debug!(nas = %nas.address, request_id = request.identifier, "Duplicate accounting event acknowledged");
        }

        let mut reply = Packet::reply_to(request, Code::AccountingResponse);
        sign_response(&mut reply, &request.authenticator, &nas.secret)?;
        Ok(reply.encode()?)
    }

    async fn audit_drop(config: &ServerConfig, nas: &NasContext, request_id: u8, reason: &str) {
        config
            .audit_logger
            .log(AuditEntry::new(AuditEventType::RequestDropped)
                .with_nas(nas.address, nas.name.as_deref())
                .with_request_id(request_id)
                .with_details(reason))
            .await;
    }
}
