//! Bearer-token authentication middleware.
//!
//! [`BearerAuthentication`] never rejects a request by itself. It verifies the
//! `Authorization: Bearer` credential when one is present and stores an
//! [`Authentication`] in the context extensions; handlers for protected routes
//! call [`Authentication::principal`] and turn a failure into `401`.

use std::pin::Pin;
use std::sync::Arc;

use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

use super::{AuthError, Principal, TokenService};

/// Outcome of bearer-token verification for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// No bearer credential was sent.
    Anonymous,
    Authenticated(Principal),
    Rejected(AuthError),
}

impl Authentication {
    /// Reads the outcome recorded for `ctx`. A context that never passed
    /// through [`BearerAuthentication`] counts as anonymous.
    pub fn of(ctx: &Context) -> &Authentication {
        static ANONYMOUS: Authentication = Authentication::Anonymous;
        ctx.extensions()
            .get::<Authentication>()
            .unwrap_or(&ANONYMOUS)
    }

    /// The verified principal, or why there is none.
    pub fn principal(&self) -> Result<&Principal, AuthError> {
        match self {
            Authentication::Authenticated(principal) => Ok(principal),
            Authentication::Anonymous => Err(AuthError::Missing),
            Authentication::Rejected(err) => Err(err.clone()),
        }
    }
}

pub struct BearerAuthentication {
    tokens: Arc<TokenService>,
}

impl BearerAuthentication {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    fn authenticate(&self, ctx: &Context) -> Authentication {
        let Some(raw) = ctx.request().headers().bearer_token() else {
            return Authentication::Anonymous;
        };
        match self.tokens.verify(raw) {
            Ok(principal) => Authentication::Authenticated(principal),
            Err(e) => {
                tracing::debug!(error = %e, path = %ctx.request().path(), "bearer token rejected");
                Authentication::Rejected(e)
            }
        }
    }
}

impl Middleware for BearerAuthentication {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let outcome = self.authenticate(&ctx);
        ctx.extensions_mut().insert(outcome);
        Box::pin(next.run(ctx))
    }
}
