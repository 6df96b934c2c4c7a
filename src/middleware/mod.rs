/*!
 * Ordered call-wrapping middleware for unary RPCs
 *
 * A call travels through the interceptors in list order (the first one is
 * outermost) and ends at the invoker, which performs the transport call.
 */

pub mod logging;
pub mod retry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tonic::Status;

use crate::context::CallContext;

pub use logging::{LoggingInterceptor, LoggingOptions};
pub use retry::{Backoff, RetryInterceptor, RetryPolicy};

/// Bounds every request and response message must meet to pass through the chain
pub trait Message: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Message for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Identifies a unary RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodName {
    pub service: &'static str,
    pub method: &'static str,
}

impl MethodName {
    pub const fn new(service: &'static str, method: &'static str) -> Self {
        Self { service, method }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// Terminal step of the chain
#[async_trait]
pub trait UnaryInvoker<Req, Resp>: Send + Sync {
    async fn invoke(&self, ctx: &CallContext, request: Req) -> Result<Resp, Status>;
}

/// A call-wrapping unit applied to every outgoing request
#[async_trait]
pub trait UnaryInterceptor<Req, Resp>: Send + Sync {
    async fn intercept(
        &self,
        method: MethodName,
        ctx: &CallContext,
        request: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status>;
}

/// The rest of the chain after the current interceptor
///
/// `Next` is `Copy`; an interceptor may run it any number of times.
pub struct Next<'a, Req, Resp> {
    rest: &'a [Arc<dyn UnaryInterceptor<Req, Resp>>],
    invoker: &'a dyn UnaryInvoker<Req, Resp>,
}

impl<Req, Resp> Clone for Next<'_, Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for Next<'_, Req, Resp> {}

impl<'a, Req: Message, Resp: Message> Next<'a, Req, Resp> {
    /// Pass the request to the next interceptor, or to the invoker at the end
    pub fn run<'c>(
        self,
        method: MethodName,
        ctx: &'c CallContext,
        request: Req,
    ) -> BoxFuture<'c, Result<Resp, Status>>
    where
        'a: 'c,
    {
        match self.rest.split_first() {
            Some((head, rest)) => head.intercept(
                method,
                ctx,
                request,
                Next {
                    rest,
                    invoker: self.invoker,
                },
            ),
            None => self.invoker.invoke(ctx, request),
        }
    }
}

/// Ordered list of interceptors, outermost first
pub struct InterceptorChain<Req, Resp> {
    interceptors: Vec<Arc<dyn UnaryInterceptor<Req, Resp>>>,
}

impl<Req: Message, Resp: Message> InterceptorChain<Req, Resp> {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor inside the ones already in the chain
    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryInterceptor<Req, Resp> + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `request` through every interceptor and finally `invoker`
    pub async fn call(
        &self,
        method: MethodName,
        ctx: &CallContext,
        invoker: &dyn UnaryInvoker<Req, Resp>,
        request: Req,
    ) -> Result<Resp, Status> {
        let next = Next {
            rest: &self.interceptors,
            invoker,
        };
        next.run(method, ctx, request).await
    }
}

impl<Req: Message, Resp: Message> Default for InterceptorChain<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Clone for InterceptorChain<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<Req, Resp> fmt::Debug for InterceptorChain<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted invoker shared by the middleware tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes, repeating the last one when exhausted
    pub struct ScriptedInvoker {
        script: Mutex<VecDeque<Result<u32, Status>>>,
        last: Mutex<Option<Result<u32, Status>>>,
        calls: AtomicU32,
    }

    impl ScriptedInvoker {
        pub fn new(script: Vec<Result<u32, Status>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UnaryInvoker<u32, u32> for ScriptedInvoker {
        async fn invoke(&self, _ctx: &CallContext, request: u32) -> Result<u32, Status> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(outcome) => {
                    *self.last.lock().unwrap() = Some(outcome.clone());
                    outcome
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or(Ok(request)),
            }
        }
    }

    pub const TEST_METHOD: MethodName = MethodName::new("test.Service", "Call");
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::Mutex;

    /// Records the order in which it sees the request
    struct Tag {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl UnaryInterceptor<u32, u32> for Tag {
        async fn intercept(
            &self,
            method: MethodName,
            ctx: &CallContext,
            request: u32,
            next: Next<'_, u32, u32>,
        ) -> Result<u32, Status> {
            self.seen.lock().unwrap().push(self.name);
            next.run(method, ctx, request + 1).await
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_list_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new()
            .with(Tag {
                name: "outer",
                seen: seen.clone(),
            })
            .with(Tag {
                name: "inner",
                seen: seen.clone(),
            });
        let invoker = ScriptedInvoker::new(vec![]);

        let response = chain
            .call(TEST_METHOD, &CallContext::new(), &invoker, 40)
            .await
            .unwrap();

        // Each interceptor increments the request before the echoing invoker sees it
        assert_eq!(response, 42);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_calls_invoker_directly() {
        let chain: InterceptorChain<u32, u32> = InterceptorChain::default();
        let invoker = ScriptedInvoker::new(vec![Err(Status::internal("boom"))]);

        let err = chain
            .call(TEST_METHOD, &CallContext::new(), &invoker, 1)
            .await
            .unwrap_err();

        assert_eq!(err.code(), tonic::Code::Internal);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_method_name_display() {
        let method = MethodName::new("auth.Auth", "IsAdmin");
        assert_eq!(method.to_string(), "/auth.Auth/IsAdmin");
    }
}
