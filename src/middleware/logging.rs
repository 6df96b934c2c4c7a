/*!
 * Payload logging interceptor
 */

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tonic::{Code, Status};

use super::{Message, MethodName, Next, UnaryInterceptor};
use crate::context::CallContext;
use crate::sink::{LogEvent, LogLevel, LogSink};

/// Message of the event written for every finished call
pub const FINISHED_CALL: &str = "finished call";

/// Level used for a call that finished with `code`, as seen from the client side
pub fn default_client_code_to_level(code: Code) -> LogLevel {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange => LogLevel::DEBUG,
        Code::Unknown
        | Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::Unauthenticated => LogLevel::INFO,
        Code::Unimplemented | Code::Internal | Code::Unavailable | Code::DataLoss => {
            LogLevel::WARN
        }
    }
}

#[derive(Clone, Copy)]
pub struct LoggingOptions {
    /// Attach request and response payloads to the event
    pub log_payloads: bool,
    /// Maps the final status code to the event level
    pub level_for: fn(Code) -> LogLevel,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_payloads: true,
            level_for: default_client_code_to_level,
        }
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("log_payloads", &self.log_payloads)
            .finish_non_exhaustive()
    }
}

/// Writes one event per pass through the chain to the injected sink
///
/// Placed inside the retry interceptor it records every attempt on its own.
#[derive(Clone)]
pub struct LoggingInterceptor {
    sink: Arc<dyn LogSink>,
    options: LoggingOptions,
}

impl LoggingInterceptor {
    pub fn new(sink: Arc<dyn LogSink>, options: LoggingOptions) -> Self {
        Self { sink, options }
    }
}

impl fmt::Debug for LoggingInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingInterceptor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<Req: Message, Resp: Message> UnaryInterceptor<Req, Resp> for LoggingInterceptor {
    async fn intercept(
        &self,
        method: MethodName,
        ctx: &CallContext,
        request: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status> {
        let request_content = self.options.log_payloads.then(|| format!("{:?}", request));
        let start = Instant::now();

        let result = next.run(method, ctx, request).await;

        let code = match &result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        let mut event = LogEvent::new((self.options.level_for)(code), FINISHED_CALL)
            .with_field("grpc.component", "client")
            .with_field("grpc.service", method.service)
            .with_field("grpc.method", method.method)
            .with_field("grpc.attempt", ctx.attempt())
            .with_field("grpc.code", format!("{:?}", code))
            .with_field("grpc.time_ms", start.elapsed());

        if let Some(content) = request_content {
            event = event.with_field("grpc.request.content", content);
        }
        match &result {
            Ok(response) if self.options.log_payloads => {
                event = event.with_field("grpc.response.content", format!("{:?}", response));
            }
            Ok(_) => {}
            Err(status) => {
                event = event.with_field("grpc.error", status.message().to_string());
            }
        }

        self.sink.log(event);
        result
    }
}
