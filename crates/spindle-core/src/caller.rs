//! Direct, transport-less invocation of router procedures.
//!
//! A [`CallerFactory`] wraps a router (and optionally a factory-level error
//! interceptor); each [`Caller`] it produces binds a context (and optionally
//! a caller-level interceptor). When a call fails, the factory-level
//! handler runs first and its explicit continue hands control to the
//! caller-level handler; with no factory-level handler, the caller-level
//! handler runs directly. A handler that returns a replacement error makes
//! that error final.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ProcedureError;
use crate::executor::{ErrorInterceptor, intercept_failure};
use crate::procedure::ProcedureKind;
use crate::router::Router;

/// Factory binding a router to an optional factory-level error handler.
pub struct CallerFactory<C> {
    router: Arc<Router<C>>,
    on_error: Option<Arc<dyn ErrorInterceptor<C>>>,
}

impl<C> CallerFactory<C> {
    /// Creates a factory over the given router.
    #[must_use]
    pub fn new(router: Arc<Router<C>>) -> Self {
        Self {
            router,
            on_error: None,
        }
    }

    /// Registers the factory-level error handler.
    #[must_use]
    pub fn with_on_error(mut self, interceptor: Arc<dyn ErrorInterceptor<C>>) -> Self {
        self.on_error = Some(interceptor);
        self
    }

    /// Produces a caller bound to `ctx`.
    #[must_use]
    pub fn caller(&self, ctx: C) -> Caller<C> {
        Caller {
            router: Arc::clone(&self.router),
            factory_on_error: self.on_error.clone(),
            on_error: None,
            ctx,
        }
    }
}

/// A context-bound handle for invoking procedures directly.
pub struct Caller<C> {
    router: Arc<Router<C>>,
    factory_on_error: Option<Arc<dyn ErrorInterceptor<C>>>,
    on_error: Option<Arc<dyn ErrorInterceptor<C>>>,
    ctx: C,
}

impl<C> Caller<C> {
    /// Registers the caller-level error handler.
    #[must_use]
    pub fn with_on_error(mut self, interceptor: Arc<dyn ErrorInterceptor<C>>) -> Self {
        self.on_error = Some(interceptor);
        self
    }

    /// Invokes the query procedure at `path`.
    ///
    /// # Errors
    ///
    /// Returns the final error after interception: the original failure
    /// unless a handler produced a replacement.
    pub fn query(&self, path: &str, input: Option<Value>) -> Result<Value, ProcedureError> {
        self.call(ProcedureKind::Query, path, input)
    }

    /// Invokes the mutation procedure at `path`.
    ///
    /// # Errors
    ///
    /// Returns the final error after interception.
    pub fn mutation(&self, path: &str, input: Option<Value>) -> Result<Value, ProcedureError> {
        self.call(ProcedureKind::Mutation, path, input)
    }

    /// Initiates the subscription procedure at `path`.
    ///
    /// # Errors
    ///
    /// Returns the final error after interception.
    pub fn subscription(&self, path: &str, input: Option<Value>) -> Result<Value, ProcedureError> {
        self.call(ProcedureKind::Subscription, path, input)
    }

    fn call(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: Option<Value>,
    ) -> Result<Value, ProcedureError> {
        let mut chain: Vec<&dyn ErrorInterceptor<C>> = Vec::new();
        if let Some(factory_handler) = &self.factory_on_error {
            chain.push(factory_handler.as_ref());
        }
        if let Some(caller_handler) = &self.on_error {
            chain.push(caller_handler.as_ref());
        }

        let procedure = match self.router.resolve(path, kind) {
            Ok(procedure) => procedure,
            Err(error) => {
                return Err(intercept_failure(
                    error,
                    Some(&self.ctx),
                    path,
                    input.as_ref(),
                    Some(kind),
                    &chain,
                ));
            }
        };
        match procedure.invoke(&self.ctx, input.clone()) {
            Ok(data) => Ok(data),
            Err(error) => Err(intercept_failure(
                error,
                Some(&self.ctx),
                path,
                input.as_ref(),
                Some(kind),
                &chain,
            )),
        }
    }
}
