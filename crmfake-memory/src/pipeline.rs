//! Operation dispatch.
//!
//! Every request submitted to the service is routed through an
//! [`OperationPipeline`]. Handlers are registered either against an exact
//! operation kind or as catch-alls that inspect the request themselves.
//!
//! Resolution order:
//!
//! 1. Handlers registered for the request's kind, most recently registered first.
//! 2. Catch-all handlers of [`HandlerPriority::Specific`], in registration order.
//! 3. Catch-all handlers of [`HandlerPriority::Fallback`], in registration order.
//!
//! The first handler whose [`can_handle`](OperationHandler::can_handle) accepts
//! the request executes it. Registration needs `&mut` access, so all handlers are
//! in place before the pipeline is shared with concurrent callers.

use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

use crmfake_core::{
    error::{CrmError, CrmResult},
    request::{Request, Response, kinds},
};

use crate::{handlers, service::FakeOrganizationService};

/// Where a catch-all handler ranks against other catch-alls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerPriority {
    /// Consulted before every fallback.
    #[default]
    Specific,
    /// Consulted last.
    Fallback,
}

/// Executes one kind of operation.
///
/// # Example
///
/// ```rust
/// use crmfake_core::{error::CrmResult, request::{OrganizationResponse, Request, Response}};
/// use crmfake_memory::{pipeline::OperationHandler, service::FakeOrganizationService};
///
/// struct Ping;
///
/// impl OperationHandler for Ping {
///     fn name(&self) -> &str {
///         "ping"
///     }
///
///     fn can_handle(&self, request: &Request) -> bool {
///         request.kind() == "Ping"
///     }
///
///     fn execute(&self, _: &Request, _: &FakeOrganizationService) -> CrmResult<Response> {
///         Ok(Response::Custom(OrganizationResponse {
///             response_name: "Ping".to_string(),
///             ..Default::default()
///         }))
///     }
/// }
/// ```
pub trait OperationHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if this handler accepts the request.
    fn can_handle(&self, request: &Request) -> bool;

    /// Executes the request against the service it was submitted to.
    fn execute(&self, request: &Request, service: &FakeOrganizationService) -> CrmResult<Response>;

    /// Rank among catch-all handlers. Ignored for handlers registered to a kind.
    fn priority(&self) -> HandlerPriority {
        HandlerPriority::Specific
    }
}

/// Registry of operation handlers.
#[derive(Clone, Default)]
pub struct OperationPipeline {
    exact: HashMap<String, Vec<Arc<dyn OperationHandler>>>,
    catch_all: Vec<Arc<dyn OperationHandler>>,
}

impl OperationPipeline {
    /// Creates a pipeline with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline with the built-in handlers of every typed request.
    pub fn with_default_handlers() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(kinds::CREATE, handlers::CreateHandler);
        pipeline.register(kinds::RETRIEVE, handlers::RetrieveHandler);
        pipeline.register(kinds::UPDATE, handlers::UpdateHandler);
        pipeline.register(kinds::DELETE, handlers::DeleteHandler);
        pipeline.register(kinds::ASSOCIATE, handlers::AssociateHandler);
        pipeline.register(kinds::DISASSOCIATE, handlers::DisassociateHandler);
        pipeline.register(kinds::RETRIEVE_MULTIPLE, handlers::RetrieveMultipleHandler);
        pipeline.register(kinds::UPSERT, handlers::UpsertHandler);
        pipeline.register(kinds::WHO_AM_I, handlers::WhoAmIHandler);
        pipeline
    }

    /// Registers a handler for an exact operation kind.
    ///
    /// A later registration for the same kind is consulted before earlier ones.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl OperationHandler + 'static) {
        let kind = kind.into();
        debug!(kind = %kind, handler = handler.name(), "registered operation handler");
        self.exact.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Registers a handler consulted for any kind after the exact-kind handlers.
    pub fn register_catch_all(&mut self, handler: impl OperationHandler + 'static) {
        debug!(
            handler = handler.name(),
            priority = ?handler.priority(),
            "registered catch-all operation handler"
        );
        self.catch_all.push(Arc::new(handler));
    }

    /// Finds the handler that executes a request.
    ///
    /// # Errors
    ///
    /// Returns a not-implemented error naming the request kind when no handler
    /// accepts it.
    pub fn resolve(&self, request: &Request) -> CrmResult<&dyn OperationHandler> {
        let kind = request.kind();
        let exact = self
            .exact
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .rev();
        let specific = self
            .catch_all
            .iter()
            .filter(|handler| handler.priority() == HandlerPriority::Specific);
        let fallback = self
            .catch_all
            .iter()
            .filter(|handler| handler.priority() == HandlerPriority::Fallback);

        exact
            .chain(specific)
            .chain(fallback)
            .find(|handler| handler.can_handle(request))
            .map(|handler| &**handler)
            .ok_or_else(|| CrmError::NotImplemented {
                request: kind.to_string(),
            })
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>() + self.catch_all.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.exact.keys().map(String::as_str).collect();
        kinds.sort_unstable();

        f.debug_struct("OperationPipeline")
            .field("kinds", &kinds)
            .field(
                "catch_all",
                &self.catch_all.iter().map(|handler| handler.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
