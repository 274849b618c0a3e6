//! In-memory [`InferenceClient`] for tests. Enabled for this crate's own tests
//! and, through the `testing` feature, for dependent crates.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::ProviderError;
use crate::inference::{InferenceCall, InferenceClient, RawCompletion};

type Responder = dyn Fn(&InferenceCall) -> Result<String, ProviderError> + Send + Sync;

/// Answers every call from a closure and records what it was asked.
pub struct ScriptedClient {
    responder: Box<Responder>,
    calls: AtomicUsize,
    last_call: Mutex<Option<InferenceCall>>,
}

impl ScriptedClient {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&InferenceCall) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        }
    }

    /// Returns `text` for every call.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Fails every call with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<InferenceCall> {
        self.last_call.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, call: &InferenceCall) -> Result<RawCompletion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_call.lock() {
            *last = Some(call.clone());
        }
        let text = (self.responder)(call)?;
        Ok(RawCompletion::new(text, Duration::from_millis(1)))
    }
}
