//! Transport seam and the blocking adapter
//!
//! [`Transport`] is the only primitive the client issues requests through.
//! [`Channel`] wraps a transport with a request timeout and a private
//! current-thread runtime, so synchronous callers can drive one request to
//! completion with [`Channel::send_blocking`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{Error, Request, Response, Result, TransportErrorKind};
use tokio::runtime::Runtime;
use tracing::debug;

/// Request/response channel to the server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Transport handle with a timeout and a blocking veneer
///
/// Cheap to clone; clones share the transport and runtime.
#[derive(Clone)]
pub struct Channel {
    transport: Arc<dyn Transport>,
    runtime: Arc<Runtime>,
    timeout: Duration,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel over a transport
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Internal {
                reason: format!("failed to start client runtime: {}", e),
            })?;
        Ok(Channel {
            transport,
            runtime: Arc::new(runtime),
            timeout,
        })
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request, failing with a `Timeout` transport error if the
    /// response does not arrive in time
    pub async fn send(&self, request: Request) -> Result<Response> {
        let name = request.name();
        debug!(target: "tessera::transport", request = name, "sending");
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => {
                debug!(target: "tessera::transport", request = name, response = response.name(), "received");
                Ok(response)
            }
            Ok(Err(e)) => {
                debug!(target: "tessera::transport", request = name, error = %e, "failed");
                Err(e)
            }
            Err(_) => Err(Error::transport(
                TransportErrorKind::Timeout,
                format!("{} timed out after {:?}", name, self.timeout),
            )),
        }
    }

    /// Send a request from synchronous code
    ///
    /// # Errors
    /// `InvalidArgument` when called from inside an async runtime.
    pub fn send_blocking(&self, request: Request) -> Result<Response> {
        self.block_on(self.send(request))
    }

    /// Drive a client future to completion from synchronous code
    ///
    /// # Errors
    /// `InvalidArgument` when called from inside an async runtime; use the
    /// async API there instead.
    pub fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::invalid_argument(
                "blocking call made from inside an async runtime",
            ));
        }
        self.runtime.block_on(future)
    }
}
