//! gRPC client for the `auth.Auth` service
//!
//! [`AuthServiceClient`] owns one channel to the service and sends every
//! call through an interceptor chain: retry outermost, payload logging
//! inside it, then the transport.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sso_proto::auth_client::AuthClient;
use sso_proto::{IsAdminRequest, IsAdminResponse, SERVICE_NAME};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use crate::config::ClientConfig;
use crate::context::CallContext;
use crate::error::{error_chain, ClientError};
use crate::middleware::{
    InterceptorChain, LoggingInterceptor, LoggingOptions, MethodName, RetryInterceptor,
    RetryPolicy, UnaryInvoker,
};
use crate::sink::{LogEvent, LogLevel, LogSink};

/// The `IsAdmin` RPC
pub const IS_ADMIN: MethodName = MethodName::new(SERVICE_NAME, "IsAdmin");

const OP_CONNECT: &str = "AuthServiceClient::connect";
const OP_IS_ADMIN: &str = "AuthServiceClient::is_admin";

/// Message of the event written when the channel cannot be established
pub const DIAL_FAILED: &str = "failed to connect to gRPC server";

/// Client for the authorization service
///
/// Cheap to clone: the channel and the interceptor chain are shared, so a
/// single client can serve concurrent calls from many tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use sso_client::{AuthServiceClient, CallContext, TracingSink};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = AuthServiceClient::connect(
///     Arc::new(TracingSink::current()),
///     "127.0.0.1:44044",
///     Duration::from_secs(5),
///     3,
/// )
/// .await?;
///
/// let ctx = CallContext::new().with_timeout(Duration::from_secs(30));
/// if client.is_admin(&ctx, 42).await? {
///     println!("user 42 is an admin");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthServiceClient {
    chain: InterceptorChain<IsAdminRequest, IsAdminResponse>,
    invoker: AuthInvoker,
    log: Arc<dyn LogSink>,
}

impl AuthServiceClient {
    /// Dial `address` and build a client around the channel
    ///
    /// `timeout` bounds the dial and, separately, every attempt of every
    /// call. Calls failing with a retryable code are attempted up to
    /// `retries_count` more times. A dial failure is written to `log` once
    /// and returned; it is never retried.
    pub async fn connect(
        log: Arc<dyn LogSink>,
        address: &str,
        timeout: Duration,
        retries_count: u32,
    ) -> Result<Self, ClientError> {
        let endpoint = endpoint(&log, address, timeout)?;

        let channel = match endpoint.connect().await {
            Ok(channel) => channel,
            Err(source) => {
                log_dial_failure(log.as_ref(), address, &source);
                return Err(ClientError::Dial {
                    op: OP_CONNECT,
                    address: address.to_string(),
                    source,
                });
            }
        };
        debug!(address, "connected to auth service");

        Ok(Self::from_channel(
            log,
            channel,
            RetryPolicy::new(retries_count, timeout),
            LoggingOptions::default(),
        ))
    }

    /// Build a client from loaded configuration
    ///
    /// With `lazy_connect` set the channel is only established on the first
    /// call, so construction cannot fail on an unreachable server.
    pub async fn connect_with(
        log: Arc<dyn LogSink>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let timeout = config.timeout();
        if !config.lazy_connect {
            return Self::connect(log, &config.address, timeout, config.retries_count).await;
        }

        let channel = endpoint(&log, &config.address, timeout)?.connect_lazy();
        debug!(address = %config.address, "created lazy channel to auth service");

        Ok(Self::from_channel(
            log,
            channel,
            RetryPolicy::new(config.retries_count, timeout),
            LoggingOptions::default(),
        ))
    }

    /// Build a client on an existing channel with explicit policies
    pub fn from_channel(
        log: Arc<dyn LogSink>,
        channel: Channel,
        retry: RetryPolicy,
        logging: LoggingOptions,
    ) -> Self {
        let chain = InterceptorChain::new()
            .with(RetryInterceptor::new(retry))
            .with(LoggingInterceptor::new(log.clone(), logging));

        Self {
            chain,
            invoker: AuthInvoker {
                api: AuthClient::new(channel),
            },
            log,
        }
    }

    /// Ask the service whether `user_id` has administrator rights
    ///
    /// The call stops as soon as `ctx` is cancelled or its deadline passes;
    /// no attempt is started after that.
    pub async fn is_admin(&self, ctx: &CallContext, user_id: i64) -> Result<bool, ClientError> {
        let response = self
            .chain
            .call(IS_ADMIN, ctx, &self.invoker, IsAdminRequest { user_id })
            .await
            .map_err(|source| ClientError::Rpc {
                op: OP_IS_ADMIN,
                source,
            })?;

        Ok(response.is_admin)
    }

    /// The sink receiving this client's call log
    pub fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.log
    }
}

impl fmt::Debug for AuthServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthServiceClient")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

/// Performs the actual `IsAdmin` round trip
#[derive(Clone)]
struct AuthInvoker {
    api: AuthClient<Channel>,
}

#[async_trait]
impl UnaryInvoker<IsAdminRequest, IsAdminResponse> for AuthInvoker {
    async fn invoke(
        &self,
        ctx: &CallContext,
        request: IsAdminRequest,
    ) -> Result<IsAdminResponse, Status> {
        let mut request = tonic::Request::new(request);
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(grpc_timeout(remaining));
        }

        let mut api = self.api.clone();
        ctx.run(async move {
            api.is_admin(request)
                .await
                .map(tonic::Response::into_inner)
        })
        .await
    }
}

/// Largest value the `grpc-timeout` header can carry: eight digits of hours
pub const MAX_GRPC_TIMEOUT: Duration = Duration::from_secs(99_999_999 * 3600);

/// Clamp a remaining deadline to what the `grpc-timeout` header can encode
pub fn grpc_timeout(remaining: Duration) -> Duration {
    remaining.min(MAX_GRPC_TIMEOUT)
}

/// Prefix plaintext `http://` when the address carries no scheme
pub fn endpoint_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

fn endpoint(
    log: &Arc<dyn LogSink>,
    address: &str,
    timeout: Duration,
) -> Result<Endpoint, ClientError> {
    match Endpoint::from_shared(endpoint_uri(address)) {
        Ok(endpoint) => Ok(endpoint.connect_timeout(timeout)),
        Err(source) => {
            log_dial_failure(log.as_ref(), address, &source);
            Err(ClientError::InvalidAddress {
                op: OP_CONNECT,
                address: address.to_string(),
                source,
            })
        }
    }
}

fn log_dial_failure(log: &dyn LogSink, address: &str, err: &tonic::transport::Error) {
    log.log(
        LogEvent::new(LogLevel::ERROR, DIAL_FAILED)
            .with_field("op", OP_CONNECT)
            .with_field("address", address)
            .with_field("error", error_chain(err)),
    );
}
