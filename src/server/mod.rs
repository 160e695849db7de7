//! The collector server: REST and gRPC front ends over one aggregator.

pub mod config;
pub mod grpc;
pub mod origin;
pub mod render;
pub mod rest;
pub mod service;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;
use tracing::{error, info, warn};

use crate::codec::{CodecError, Opener, PrivateKey, Signer};
use crate::config::ConfigError;

use config::ServerConfig;
use grpc::interceptors::{CheckChain, HmacInterceptor, SubnetInterceptor};
use grpc::MetricsRpc;
use origin::OriginGuard;
use rest::RestState;
use service::Service;
use store::{Store, StoreError};

/// Time in-flight REST requests get to finish after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("REST server failed: {0}")]
    Rest(#[source] std::io::Error),

    #[error("gRPC server failed: {0}")]
    Grpc(#[from] tonic::transport::Error),
}

/// Everything both front ends share, built once from configuration.
pub struct Components {
    pub service: Arc<Service>,
    pub opener: Arc<Opener>,
    pub origin: OriginGuard,
}

impl Components {
    pub fn new(config: &ServerConfig, store: Arc<dyn Store>) -> Result<Self, ServerError> {
        let origin = OriginGuard::new(config.trusted_network()?);
        let private_key = config
            .crypto_key
            .as_deref()
            .map(PrivateKey::from_file)
            .transpose()?;
        if private_key.is_some() {
            info!("Batch decryption enabled");
        }
        let signer = Signer::new(&config.key);
        if signer.is_none() {
            warn!("No shared key configured, integrity checks are disabled");
        }

        Ok(Self {
            service: Arc::new(Service::new(store)),
            opener: Arc::new(Opener::new(signer, private_key)),
            origin,
        })
    }

    pub fn rest_router(&self) -> axum::Router {
        rest::router(Arc::new(RestState {
            service: self.service.clone(),
            opener: self.opener.clone(),
            origin: self.origin.clone(),
        }))
    }

    /// Origin check first, then integrity.
    pub fn rpc_service(&self) -> MetricsRpc {
        let checks = CheckChain::new()
            .with(SubnetInterceptor::new(self.origin.clone()))
            .with(HmacInterceptor::new(self.opener.signer().cloned()));
        MetricsRpc::new(self.service.clone(), checks)
    }
}

pub type ServerTask = JoinHandle<Result<(), ServerError>>;

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}

/// Serves the REST router on `listener` until `cancel` fires.
pub fn spawn_rest(listener: TcpListener, router: axum::Router, cancel: CancellationToken) -> ServerTask {
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ServerError::Rest)
    })
}

/// Serves the gRPC service on `listener` until `cancel` fires.
pub fn spawn_grpc(
    listener: TcpListener,
    rpc: MetricsRpc,
    cancel: CancellationToken,
) -> Result<ServerTask, ServerError> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let incoming = TcpIncoming::from_listener(listener, true, None).map_err(|e| {
        ServerError::Bind {
            addr,
            reason: e.to_string(),
        }
    })?;
    Ok(tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(rpc.into_server())
            .serve_with_incoming_shutdown(incoming, async move { cancel.cancelled().await })
            .await
            .map_err(ServerError::from)
    }))
}

fn report(name: &str, result: Result<Result<(), ServerError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("{} server stopped", name),
        Ok(Err(e)) => error!("{} server error: {}", name, e),
        Err(e) => error!("{} server task failed: {}", name, e),
    }
}

/// Waits up to `grace` for `handle`, aborting the task when it overruns.
async fn join_within(name: &str, mut handle: ServerTask, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(result) => report(name, result),
        Err(_) => {
            warn!("{} server did not stop within {:?}, forcing close", name, grace);
            handle.abort();
        }
    }
}

async fn join(name: &str, handle: ServerTask) {
    join_within(name, handle, SHUTDOWN_GRACE).await
}

/// Runs both front ends until `cancel` fires or one of them fails, then
/// shuts down and closes the store.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> Result<(), ServerError> {
    let store = store::open(&config).await?;
    let components = Components::new(&config, store.clone())?;

    let rest_listener = bind(&config.address).await?;
    let grpc_listener = bind(&config.grpc_address).await?;
    info!("REST listening on http://{}", config.address);
    info!("gRPC listening on {}", config.grpc_address);

    let mut rest = spawn_rest(rest_listener, components.rest_router(), cancel.clone());
    let mut grpc = spawn_grpc(grpc_listener, components.rpc_service(), cancel.clone())?;

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("Shutdown requested");
            join("REST", rest).await;
            join("gRPC", grpc).await;
        }
        res = &mut rest => {
            report("REST", res);
            cancel.cancel();
            join("gRPC", grpc).await;
        }
        res = &mut grpc => {
            report("gRPC", res);
            cancel.cancel();
            join("REST", rest).await;
        }
    }

    if let Err(e) = store.close().await {
        error!("Failed to close store: {}", e);
    }
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_join_aborts_stuck_server() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let handle: ServerTask = tokio::spawn(async move {
            let _flag = flag;
            std::future::pending::<()>().await;
            Ok(())
        });

        join_within("stuck", handle, Duration::from_millis(20)).await;
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dropped.load(Ordering::SeqCst), "server task kept running");
    }

    #[tokio::test]
    async fn test_join_reports_finished_server() {
        let handle: ServerTask = tokio::spawn(async { Ok(()) });
        join_within("done", handle, Duration::from_secs(1)).await;
    }
}
