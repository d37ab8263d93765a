//! Tests for `src/dispatch/mod.rs`: routing, isolation and failure signaling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use relaybot::config::DispatchConfig;
use relaybot::dispatch::{
    ChatAccess, DispatchEngine, Outcome, Pipeline, PipelineContext, PipelineError,
};
use relaybot::message::{CanonicalMessage, ChatId, Platform};
use relaybot::transport::Progress;

use crate::support::{registry_with, telegram_chat, text_message, Call, RecordingTransport};

/// What a [`ScriptedPipeline`] does when processing.
#[derive(Clone)]
enum Behavior {
    Finish(Outcome),
    Fail(&'static str),
    Panic,
    Sleep(Duration),
    WaitFor(Arc<Notify>),
    Signal(Arc<Notify>),
}

struct ScriptedPipeline {
    name: &'static str,
    command: &'static str,
    access: ChatAccess,
    behavior: Behavior,
    runs: AtomicUsize,
}

impl ScriptedPipeline {
    fn new(name: &'static str, command: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            command,
            access: ChatAccess::Everywhere,
            behavior,
            runs: AtomicUsize::new(0),
        })
    }

    fn restricted(
        name: &'static str,
        command: &'static str,
        access: ChatAccess,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            command,
            access,
            behavior: Behavior::Finish(Outcome::Done),
            runs: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command(self.command)
    }

    async fn process(&self, _ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Finish(outcome) => Ok(outcome.clone()),
            Behavior::Fail(reason) => Err(PipelineError::Failed((*reason).to_owned())),
            Behavior::Panic => panic!("scripted panic"),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Outcome::Done)
            }
            Behavior::WaitFor(notify) => {
                notify.notified().await;
                Ok(Outcome::Done)
            }
            Behavior::Signal(notify) => {
                notify.notify_one();
                Ok(Outcome::Done)
            }
        }
    }

    fn help_text(&self) -> Option<String> {
        Some(format!("#{}", self.command))
    }
}

fn setup() -> (Arc<RecordingTransport>, DispatchEngine, ChatId) {
    let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
    let engine = DispatchEngine::new(registry_with(Arc::clone(&transport)));
    (transport, engine, telegram_chat("100"))
}

#[tokio::test]
async fn every_matching_pipeline_runs_once() {
    let (_transport, mut engine, chat) = setup();
    let first = ScriptedPipeline::new("first", "go", Behavior::Finish(Outcome::Done));
    let second = ScriptedPipeline::new("second", "go", Behavior::Finish(Outcome::Silent));
    let other = ScriptedPipeline::new("other", "stop", Behavior::Finish(Outcome::Done));
    engine.register(first.clone());
    engine.register(second.clone());
    engine.register(other.clone());
    let engine = Arc::new(engine);

    let dispatched = engine.dispatch(text_message(&chat, "1", "#go now"));
    assert_eq!(dispatched.started(), 2);
    dispatched.join().await;

    assert_eq!(first.runs(), 1);
    assert_eq!(second.runs(), 1);
    assert_eq!(other.runs(), 0);
}

#[tokio::test]
async fn outcomes_map_to_progress_markers() {
    let (transport, mut engine, chat) = setup();
    engine.register(ScriptedPipeline::new("done", "done", Behavior::Finish(Outcome::Done)));
    engine.register(ScriptedPipeline::new(
        "skip",
        "skip",
        Behavior::Finish(Outcome::Skipped("not today".to_owned())),
    ));
    engine.register(ScriptedPipeline::new("quiet", "quiet", Behavior::Finish(Outcome::Silent)));
    let engine = Arc::new(engine);

    engine.dispatch(text_message(&chat, "1", "#done")).join().await;
    assert_eq!(transport.progress(), vec![Progress::Done]);

    engine.dispatch(text_message(&chat, "2", "#skip")).join().await;
    assert_eq!(transport.progress(), vec![Progress::Done, Progress::Skipped]);

    engine.dispatch(text_message(&chat, "3", "#quiet")).join().await;
    assert_eq!(transport.progress().len(), 2, "silent adds no marker");
    assert!(transport.replies().is_empty());
}

#[tokio::test]
async fn failure_marks_failed_and_replies_with_reason() {
    let (transport, mut engine, chat) = setup();
    engine.register(ScriptedPipeline::new("bad", "bad", Behavior::Fail("cannot do that")));
    let engine = Arc::new(engine);

    engine.dispatch(text_message(&chat, "7", "#bad")).join().await;

    let calls = transport.calls();
    assert!(calls.contains(&Call::Progress {
        message_id: "7".to_owned(),
        progress: Progress::Failed,
    }));
    assert_eq!(transport.replies(), vec!["cannot do that".to_owned()]);
}

#[tokio::test]
async fn panic_is_contained_and_other_pipelines_finish() {
    let (transport, mut engine, chat) = setup();
    let healthy = ScriptedPipeline::new("healthy", "go", Behavior::Finish(Outcome::Done));
    engine.register(ScriptedPipeline::new("boom", "go", Behavior::Panic));
    engine.register(healthy.clone());
    let engine = Arc::new(engine);

    engine.dispatch(text_message(&chat, "1", "#go")).join().await;

    assert_eq!(healthy.runs(), 1);
    let progress = transport.progress();
    assert!(progress.contains(&Progress::Failed));
    assert!(progress.contains(&Progress::Done));
    assert!(transport.replies().is_empty(), "a panic sends no reply");

    // The engine keeps routing afterwards.
    engine.dispatch(text_message(&chat, "2", "#go")).join().await;
    assert_eq!(healthy.runs(), 2);
}

#[tokio::test]
async fn pipelines_run_concurrently() {
    let (_transport, mut engine, chat) = setup();
    let notify = Arc::new(Notify::new());
    engine.register(ScriptedPipeline::new(
        "waiter",
        "go",
        Behavior::WaitFor(Arc::clone(&notify)),
    ));
    engine.register(ScriptedPipeline::new("signaller", "go", Behavior::Signal(notify)));
    let engine = Arc::new(engine);

    let dispatched = engine.dispatch(text_message(&chat, "1", "#go"));
    let joined = tokio::time::timeout(Duration::from_secs(5), dispatched.join()).await;
    assert!(joined.is_ok(), "the waiter must be released by the later pipeline");
}

#[tokio::test]
async fn concurrency_limit_queues_without_blocking_dispatch() {
    let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
    let config = DispatchConfig {
        max_concurrent_pipelines: Some(1),
        pipeline_timeout_secs: None,
    };
    let mut engine = DispatchEngine::with_config(registry_with(Arc::clone(&transport)), &config);
    let gate = Arc::new(Notify::new());
    let holder = ScriptedPipeline::new("holder", "hold", Behavior::WaitFor(Arc::clone(&gate)));
    let queued = ScriptedPipeline::new("queued", "count", Behavior::Finish(Outcome::Done));
    engine.register(holder.clone());
    engine.register(queued.clone());
    let engine = Arc::new(engine);
    let chat = telegram_chat("1");

    let first = engine.dispatch(text_message(&chat, "1", "#hold"));
    let second = engine.dispatch(text_message(&chat, "2", "#count"));
    assert_eq!((first.started(), second.started()), (1, 1));

    // Let the holder take the only permit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(holder.runs(), 1);
    assert_eq!(queued.runs(), 0, "second pipeline must wait for a permit");

    gate.notify_one();
    let joined = tokio::time::timeout(Duration::from_secs(5), async {
        first.join().await;
        second.join().await;
    })
    .await;
    assert!(joined.is_ok(), "queued pipeline runs once the permit frees");
    assert_eq!(queued.runs(), 1);
    assert_eq!(transport.progress(), vec![Progress::Done, Progress::Done]);
}

#[tokio::test]
async fn self_authored_messages_use_their_own_list() {
    let (_transport, mut engine, chat) = setup();
    let external = ScriptedPipeline::new("external", "go", Behavior::Finish(Outcome::Done));
    let own = ScriptedPipeline::new("own", "go", Behavior::Finish(Outcome::Done));
    engine.register(external.clone());
    engine.register_self(own.clone());
    let engine = Arc::new(engine);

    let mut message = text_message(&chat, "1", "#go");
    message.is_self_authored = true;
    engine.dispatch(message).join().await;
    assert_eq!((external.runs(), own.runs()), (0, 1));

    engine.dispatch(text_message(&chat, "2", "#go")).join().await;
    assert_eq!((external.runs(), own.runs()), (1, 1));
}

#[tokio::test]
async fn access_rules_filter_before_matching() {
    let (_transport, mut engine, chat) = setup();
    let allowed = ChatAccess::from_lists(vec![telegram_chat("other")], Vec::new()).expect("valid");
    let pipeline = ScriptedPipeline::restricted("restricted", "go", allowed);
    engine.register(pipeline.clone());
    let engine = Arc::new(engine);

    let dispatched = engine.dispatch(text_message(&chat, "1", "#go"));
    assert_eq!(dispatched.started(), 0);
    dispatched.join().await;
    assert_eq!(pipeline.runs(), 0);
}

#[tokio::test]
async fn unknown_platform_is_dropped() {
    let (_transport, mut engine, _chat) = setup();
    let pipeline = ScriptedPipeline::new("any", "go", Behavior::Finish(Outcome::Done));
    engine.register(pipeline.clone());
    let engine = Arc::new(engine);

    let signal_chat = ChatId::new(Platform::Signal, "+100");
    let dispatched = engine.dispatch(text_message(&signal_chat, "1", "#go"));
    assert_eq!(dispatched.started(), 0);
    assert_eq!(pipeline.runs(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_marks_failed_and_replies() {
    let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
    let config = DispatchConfig {
        max_concurrent_pipelines: None,
        pipeline_timeout_secs: Some(1),
    };
    let mut engine = DispatchEngine::with_config(registry_with(Arc::clone(&transport)), &config);
    engine.register(ScriptedPipeline::new(
        "slow",
        "slow",
        Behavior::Sleep(Duration::from_secs(60)),
    ));
    let engine = Arc::new(engine);

    engine
        .dispatch(text_message(&telegram_chat("1"), "1", "#slow"))
        .join()
        .await;

    assert_eq!(transport.progress(), vec![Progress::Failed]);
    assert_eq!(transport.replies(), vec!["That took too long, giving up.".to_owned()]);
}

#[tokio::test]
async fn help_listing_respects_order_and_access() {
    let (_transport, mut engine, chat) = setup();
    engine.register(ScriptedPipeline::new("a", "alpha", Behavior::Finish(Outcome::Done)));
    let elsewhere = ChatAccess::from_lists(vec![telegram_chat("other")], Vec::new()).expect("valid");
    engine.register(ScriptedPipeline::restricted("b", "beta", elsewhere));
    engine.register(ScriptedPipeline::new("c", "gamma", Behavior::Finish(Outcome::Done)));
    engine.register_self(ScriptedPipeline::new("d", "delta", Behavior::Finish(Outcome::Done)));

    let names: Vec<String> = engine
        .help_listing(&chat)
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["a".to_owned(), "c".to_owned()]);
}
