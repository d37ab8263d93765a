//! Built-in pipelines and their construction from configuration.
//!
//! Every `[[pipelines]]` entry becomes one pipeline instance registered into
//! the engine in file order. `history` is registered into both lists so it
//! sees every message; `undo` only ever acts on the bot's own messages and
//! always goes into the self-authored list.

use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, PipelineConfig, PipelineKind};
use crate::dispatch::{ChatAccess, DispatchEngine, Pipeline};
use crate::services::Services;
use crate::storage::Store;

pub mod ask;
pub mod forget;
pub mod gallery;
pub mod help;
pub mod history;
pub mod imagine;
pub mod say;
pub mod transcribe;
pub mod undo;

pub use ask::AskPipeline;
pub use forget::{Confirmation, ForgetPipeline, PendingConfirmations};
pub use gallery::GalleryPipeline;
pub use help::HelpPipeline;
pub use history::HistoryPipeline;
pub use imagine::ImaginePipeline;
pub use say::SayPipeline;
pub use transcribe::TranscribePipeline;
pub use undo::UndoPipeline;

/// Language used by `say` when neither the command nor config names one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Which engine list a pipeline goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Messages from other people.
    External,
    /// Messages from the bot's own account.
    SelfAuthored,
    /// Both lists.
    Both,
}

fn require<T: ?Sized>(
    service: Option<&Arc<T>>,
    kind: PipelineKind,
    name: &'static str,
) -> Result<Arc<T>, ConfigError> {
    service.cloned().ok_or_else(|| ConfigError::MissingService {
        pipeline: kind.as_str().to_owned(),
        service: name,
    })
}

/// Build one pipeline from its config entry.
///
/// # Errors
///
/// Returns [`ConfigError::ConflictingAccessLists`] for invalid access lists
/// and [`ConfigError::MissingService`] when a needed service is not configured.
pub fn build_pipeline(
    config: &PipelineConfig,
    services: &Services,
    store: &Store,
) -> Result<(Arc<dyn Pipeline>, Placement), ConfigError> {
    let access = ChatAccess::from_lists(
        config.allowed_chats.iter().cloned(),
        config.blocked_chats.iter().cloned(),
    )?;

    let kind = config.kind;
    let placement = match kind {
        PipelineKind::History => Placement::Both,
        PipelineKind::Undo => Placement::SelfAuthored,
        _ if config.self_authored => Placement::SelfAuthored,
        _ => Placement::External,
    };

    let pipeline: Arc<dyn Pipeline> = match kind {
        PipelineKind::Help => Arc::new(HelpPipeline::new(access)),
        PipelineKind::History => Arc::new(HistoryPipeline::new(access, store.history())),
        PipelineKind::Ask => Arc::new(AskPipeline::new(
            access,
            require(services.answerer.as_ref(), kind, "answerer")?,
        )),
        PipelineKind::Forget => Arc::new(ForgetPipeline::new(access, store.history())),
        PipelineKind::Gallery => Arc::new(GalleryPipeline::new(access, store.gallery())),
        PipelineKind::Transcribe => Arc::new(TranscribePipeline::new(
            access,
            require(services.transcriber.as_ref(), kind, "transcriber")?,
        )),
        PipelineKind::Imagine => Arc::new(ImaginePipeline::new(
            access,
            require(services.image_generator.as_ref(), kind, "image generator")?,
        )),
        PipelineKind::Say => Arc::new(SayPipeline::new(
            access,
            require(services.synthesizer.as_ref(), kind, "synthesizer")?,
            config
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
        )),
        PipelineKind::Undo => Arc::new(UndoPipeline::new(access, store.history())),
    };
    Ok((pipeline, placement))
}

/// Build every configured pipeline and register it into the engine in order.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered; nothing after it is registered.
pub fn build_pipelines(
    configs: &[PipelineConfig],
    services: &Services,
    store: &Store,
    engine: &mut DispatchEngine,
) -> Result<(), ConfigError> {
    for config in configs {
        let (pipeline, placement) = build_pipeline(config, services, store)?;
        match placement {
            Placement::External => engine.register(pipeline),
            Placement::SelfAuthored => engine.register_self(pipeline),
            Placement::Both => {
                engine.register(Arc::clone(&pipeline));
                engine.register_self(pipeline);
            }
        }
    }
    let (external, self_authored) = engine.pipeline_counts();
    info!(external, self_authored, "pipelines built");
    Ok(())
}
