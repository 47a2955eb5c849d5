//! `tower` adapter for [`Backend`].
//!
//! Dispatch is synchronous, so the service is always ready and its future
//! resolves immediately. Wrap it in `tower` middleware (timeouts, concurrency
//! limits, buffering) the way any other service is composed.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{self, Ready};
use tower_service::Service;

use crate::backend::Backend;
use crate::error::Error;
use crate::request::{Request, Response};

/// `tower::Service<Request>` answering exactly like [`Backend::handle_request`].
#[derive(Debug, Clone)]
pub struct BackendService {
    backend: Arc<Backend>,
}

impl BackendService {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl From<Backend> for BackendService {
    fn from(backend: Backend) -> Self {
        Self::new(Arc::new(backend))
    }
}

impl Service<Request> for BackendService {
    type Response = Option<Response>;
    type Error = Error;
    type Future = Ready<Result<Option<Response>, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        future::ready(self.backend.handle_request(&req))
    }
}
