//! Dispatch engine: routes canonical messages to matching pipelines.
//!
//! Two ordered lists are kept, one for messages from other people and one for
//! messages authored by the bot's own account. A message is evaluated against
//! exactly one of them. Every pipeline that passes its access filter and match
//! predicate runs in its own tokio task; the engine never waits for a pipeline
//! before evaluating the next one, and no pipeline's failure or panic reaches
//! the engine or any other pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::message::{CanonicalMessage, ChatId};
use crate::transport::{Progress, TransportRegistry};

pub mod access;
pub mod pipeline;

pub use access::ChatAccess;
pub use pipeline::{Outcome, Pipeline, PipelineContext, PipelineError};

/// A line in the generated help listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    /// Pipeline name.
    pub name: String,
    /// Pipeline description.
    pub text: String,
}

/// Handles to the pipeline tasks started for one message.
#[derive(Debug, Default)]
pub struct Dispatched {
    handles: Vec<JoinHandle<()>>,
}

impl Dispatched {
    /// Number of pipelines started.
    pub fn started(&self) -> usize {
        self.handles.len()
    }

    /// Wait until every started pipeline has finished and reported.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "pipeline supervisor ended abnormally");
            }
        }
    }
}

/// Ordered pipeline registry and single entry point for inbound messages.
pub struct DispatchEngine {
    registry: Arc<TransportRegistry>,
    external: Vec<Arc<dyn Pipeline>>,
    self_authored: Vec<Arc<dyn Pipeline>>,
    limiter: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
}

impl DispatchEngine {
    /// Create an engine with unbounded concurrency and no time limit.
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self {
            registry,
            external: Vec::new(),
            self_authored: Vec::new(),
            limiter: None,
            timeout: None,
        }
    }

    /// Create an engine with limits taken from configuration.
    pub fn with_config(registry: Arc<TransportRegistry>, config: &DispatchConfig) -> Self {
        let mut engine = Self::new(registry);
        engine.limiter = config
            .max_concurrent_pipelines
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        engine.timeout = config.pipeline_timeout_secs.map(Duration::from_secs);
        engine
    }

    /// Append a pipeline for messages from other people.
    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>) {
        info!(pipeline = pipeline.name(), "registered pipeline");
        self.external.push(pipeline);
    }

    /// Append a pipeline for messages authored by the bot's own account.
    pub fn register_self(&mut self, pipeline: Arc<dyn Pipeline>) {
        info!(pipeline = pipeline.name(), "registered self-authored pipeline");
        self.self_authored.push(pipeline);
    }

    /// Transport registry used to resolve chats.
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Number of registered pipelines as `(external, self_authored)`.
    pub fn pipeline_counts(&self) -> (usize, usize) {
        (self.external.len(), self.self_authored.len())
    }

    /// Help entries of external pipelines allowed in `chat`, in registration order.
    pub fn help_listing(&self, chat: &ChatId) -> Vec<HelpEntry> {
        self.external
            .iter()
            .filter(|p| p.access().allows(chat))
            .filter_map(|p| {
                p.help_text().map(|text| HelpEntry {
                    name: p.name().to_owned(),
                    text,
                })
            })
            .collect()
    }

    /// Route one message. Called synchronously from a transport receive loop.
    ///
    /// Starts one supervised task per matching pipeline and returns without
    /// waiting for any of them.
    pub fn dispatch(self: &Arc<Self>, message: CanonicalMessage) -> Dispatched {
        let Some(transport) = self.registry.resolve(&message.chat_id) else {
            warn!(chat = %message.chat_id, "no transport owns chat, dropping message");
            return Dispatched::default();
        };

        let message = Arc::new(message);
        let pipelines = if message.is_self_authored {
            &self.self_authored
        } else {
            &self.external
        };

        let mut handles = Vec::new();
        for pipeline in pipelines {
            if !pipeline.allowed_in_chat(&message) || !pipeline.matches(&message) {
                continue;
            }
            debug!(
                pipeline = pipeline.name(),
                chat = %message.chat_id,
                message_id = %message.message_id,
                "pipeline matched"
            );
            let ctx = PipelineContext::new(
                Arc::clone(&message),
                Arc::clone(&transport),
                Arc::clone(self),
            );
            handles.push(self.spawn_supervised(Arc::clone(pipeline), ctx));
        }

        Dispatched { handles }
    }

    /// Run `process` in an inner task and turn its result, error, panic or
    /// timeout into uniform chat signaling.
    fn spawn_supervised(&self, pipeline: Arc<dyn Pipeline>, ctx: PipelineContext) -> JoinHandle<()> {
        let limiter = self.limiter.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            // Held until reporting is done; `None` when concurrency is unbounded.
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let name = pipeline.name().to_owned();
            let worker_ctx = ctx.clone();
            let mut worker = tokio::spawn(async move { pipeline.process(&worker_ctx).await });

            let joined = match timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut worker).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        worker.abort();
                        Ok(Err(PipelineError::TimedOut(limit)))
                    }
                },
                None => worker.await,
            };

            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(PipelineError::Panicked(panic_message(e))),
                Err(e) => Err(PipelineError::Failed(format!("pipeline task cancelled: {e}"))),
            };

            report(&name, &ctx, result).await;
        })
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

async fn report(name: &str, ctx: &PipelineContext, result: Result<Outcome, PipelineError>) {
    let chat = &ctx.message().chat_id;
    match result {
        Ok(Outcome::Done) => {
            debug!(pipeline = name, %chat, "pipeline done");
            ctx.progress_best_effort(Progress::Done).await;
        }
        Ok(Outcome::Silent) => debug!(pipeline = name, %chat, "pipeline done (silent)"),
        Ok(Outcome::Skipped(reason)) => {
            info!(pipeline = name, %chat, %reason, "pipeline skipped message");
            ctx.progress_best_effort(Progress::Skipped).await;
        }
        Err(e @ PipelineError::Panicked(_)) => {
            warn!(pipeline = name, %chat, error = %e, "pipeline panicked");
            ctx.progress_best_effort(Progress::Failed).await;
        }
        Err(e) => {
            warn!(pipeline = name, %chat, error = %e, "pipeline failed");
            ctx.progress_best_effort(Progress::Failed).await;
            if let Err(reply_err) = ctx.reply(&e.user_message()).await {
                warn!(pipeline = name, %chat, error = %reply_err, "failed to report pipeline failure");
            }
        }
    }
}
