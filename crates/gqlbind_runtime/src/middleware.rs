//! Field middleware.
//!
//! A [`MiddlewareManager`] is an ordered chain of wrappers invoked around
//! every field resolver. The first middleware is the outermost one.

use crate::executor::Context;
use crate::resolver::{Resolver, ResolverArgs, ResolverFuture, ResolverInfo};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A wrapper around field resolution.
pub trait Middleware: Send + Sync {
    /// Name used in logs and debug output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Resolves a field, usually by calling `next.run(..)`.
    fn resolve<'a>(
        &'a self,
        next: Next<'a>,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// The remainder of a middleware chain, ending in the field resolver.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    resolver: &'a dyn Resolver,
}

impl<'a> Next<'a> {
    /// Starts a chain that ends in `resolver`.
    pub fn new(chain: &'a [Arc<dyn Middleware>], resolver: &'a dyn Resolver) -> Self {
        Self { chain, resolver }
    }

    /// Runs the next middleware, or the resolver once the chain is exhausted.
    pub fn run(
        self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                middleware.resolve(Next::new(rest, self.resolver), parent, args, ctx, info)
            }
            None => self.resolver.resolve(parent, args, ctx, info),
        }
    }
}

/// An ordered middleware chain.
#[derive(Clone, Default)]
pub struct MiddlewareManager {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareManager {
    /// Creates a chain from middlewares in invocation order.
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// Appends a middleware as the innermost wrapper.
    pub fn push<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Appends a middleware and returns self.
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.push(middleware);
        self
    }

    /// Returns the middlewares in invocation order.
    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    /// Returns the number of middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns true if the chain has no middleware.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Resolves a field through the whole chain.
    pub fn resolve<'a>(
        &'a self,
        resolver: &'a dyn Resolver,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Next::new(&self.middlewares, resolver).run(parent, args, ctx, info)
    }
}

impl fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.middlewares.iter().map(|m| m.name()))
            .finish()
    }
}
