// SPDX-License-Identifier: Apache-2.0
//! The named-method dispatch table: `register(name, handler)`,
//! `dispatch(name, params) -> result`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Holds every registered method. Cloning a dispatcher is cheap — each entry
/// is an `Arc`, so clones share the same handler set.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(move |params| Box::pin(handler(params)) as HandlerFuture));
    }

    /// Unknown method yields `MethodNotFound`; a handler that panics is
    /// caught and reported as `Internal`, mirroring the tool registry's
    /// panic-catching policy rather than taking the whole process down.
    pub async fn dispatch(&self, name: &str, params: Value) -> Result<Value, DispatchError> {
        let handler =
            self.handlers.get(name).cloned().ok_or_else(|| DispatchError::MethodNotFound(name.to_string()))?;

        match AssertUnwindSafe(handler(params)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(DispatchError::Internal(panic_message(&panic))),
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
