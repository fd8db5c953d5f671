pub(crate) mod fake_surface;


use crate::orchestrator::{PromptSurface, Severity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .try_init();
}

/// Recording prompt double. Optionally parks inside `confirm` until notified,
/// and runs a hook right before answering.
pub(crate) struct TestPrompt {
    accept: AtomicBool,
    pub confirms: Mutex<Vec<(String, String)>>,
    pub notifies: Mutex<Vec<(String, String, Severity)>>,
    gate: Mutex<Option<Arc<Notify>>>,
    on_confirm: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl TestPrompt {
    fn with_accept(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(accept),
            confirms: Mutex::new(Vec::new()),
            notifies: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            on_confirm: Mutex::new(None),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::with_accept(true)
    }

    pub fn declining() -> Arc<Self> {
        Self::with_accept(false)
    }

    pub fn set_gate(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn set_on_confirm(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_confirm.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn last_notify(&self) -> Option<(String, String, Severity)> {
        self.notifies.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PromptSurface for TestPrompt {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        self.confirms
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(hook) = self.on_confirm.lock().unwrap().as_ref() {
            hook();
        }
        self.accept.load(Ordering::SeqCst)
    }

    async fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.notifies
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string(), severity));
    }
}
