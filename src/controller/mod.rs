//! Collection lifecycle: start, pause, resume and stop a harvest run.
//!
//! The controller owns the [`CollectionState`] and is its only writer; the
//! background tasks of a run (driver, monitor, progress and checkpoint
//! tickers) update it through a shared `watch` sender. Each `start` builds a
//! fresh [`RunContext`] so nothing leaks from one run into the next.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::{GleanerError, Result};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::domain::{CollectionState, GroupInfo, HarvestReport, Item, Phase};
use crate::export::{ExportConfig, Exporter};
use crate::extract::{group_info, FieldExtractors};
use crate::harvester::{finalize, HarvestOutcome, HarvestStatus, Harvester, RunControl};
use crate::page::FeedPage;
use crate::store::ResultStore;

const EVENT_CAPACITY: usize = 64;
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifications for whoever drives the collection.
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    Progress { current: usize, target: usize },
    /// Loading has produced nothing for `consecutive` cycles; collection goes on.
    Stalled { consecutive: u32 },
    Complete(Arc<HarvestReport>),
}

/// Everything a run's background tasks share. Built fresh per run.
#[derive(Clone)]
struct RunContext {
    page: Arc<dyn FeedPage>,
    store: Arc<dyn ResultStore>,
    events: broadcast::Sender<CollectorEvent>,
    state: Arc<watch::Sender<CollectionState>>,
    group: GroupInfo,
    export: ExportConfig,
}

impl RunContext {
    fn save_run_state(&self) {
        let snapshot = self.state.borrow().run_snapshot();
        if let Err(e) = self.store.save_run_state(&snapshot) {
            warn!("Failed to save run state: {}", e);
        }
    }

    fn save_partial(&self, items: Vec<Item>) {
        let report = HarvestReport::partial(self.group.clone(), items);
        if let Err(e) = self.store.save_partial(&report) {
            warn!("Failed to checkpoint partial result: {}", e);
        }
    }

    fn record(&self, report: &HarvestReport) {
        if let Err(e) = self.store.record_run(report) {
            warn!("Failed to record run: {}", e);
        }
    }

    async fn complete(&self, items: Vec<Item>) {
        let report = HarvestReport::complete(self.group.clone(), items);
        self.state.send_modify(|state| {
            state.phase = Phase::Complete;
            state.current_count = report.items.len();
            state.last_activity = Utc::now();
        });

        if let Err(e) = self.store.save_result(&report) {
            warn!("Failed to save result: {}", e);
        }
        if let Err(e) = self.store.clear_partial() {
            debug!("Failed to clear partial result: {}", e);
        }
        self.record(&report);
        self.save_run_state();

        if let Err(e) = self.page.detach().await {
            debug!("Detach after completion failed: {}", e);
        }

        info!("Collection complete: {} items", report.items.len());
        let report = Arc::new(report);
        if self
            .events
            .send(CollectorEvent::Complete(report.clone()))
            .is_err()
        {
            self.deliver_fallback(&report);
        }
    }

    /// Nobody is listening for completion; write the report to disk instead.
    fn deliver_fallback(&self, report: &HarvestReport) {
        let exporter = Exporter::from_config(&self.export);
        match exporter.write(report) {
            Ok(paths) => {
                for path in paths {
                    warn!("No listener for results; exported to {}", path.display());
                }
            }
            Err(e) => warn!("Fallback export to {} failed: {}", exporter.dir().display(), e),
        }
    }
}

struct ActiveRun {
    control: watch::Sender<RunControl>,
    status: watch::Receiver<HarvestStatus>,
    context: RunContext,
    driver: JoinHandle<HarvestOutcome>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct CollectionController {
    page: Arc<dyn FeedPage>,
    store: Arc<dyn ResultStore>,
    config: Config,
    events: broadcast::Sender<CollectorEvent>,
    state: Arc<watch::Sender<CollectionState>>,
    run: Option<ActiveRun>,
}

impl CollectionController {
    pub fn new(page: Arc<dyn FeedPage>, store: Arc<dyn ResultStore>, config: Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(CollectionState::new());
        Self {
            page,
            store,
            config,
            events,
            state: Arc::new(state),
            run: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectorEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state. Reading it changes nothing.
    pub fn state(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Items accepted so far in the current or last run.
    pub fn items(&self) -> Vec<Item> {
        self.run
            .as_ref()
            .map(|run| run.status.borrow().items.to_vec())
            .unwrap_or_default()
    }

    /// Name, id and member count of the group on the page.
    pub async fn group_info(&self) -> GroupInfo {
        if let Some(run) = &self.run {
            return run.context.group.clone();
        }

        let url = self.page.current_url().await.unwrap_or_default();
        match self.page.snapshot().await {
            Ok(html) => group_info(&html, &url),
            Err(e) => {
                debug!("Group info unavailable: {}", e);
                GroupInfo::unknown(url)
            }
        }
    }

    /// Begin a run toward `target` items.
    pub async fn start(&mut self, target: usize) -> Result<()> {
        if self.state.borrow().phase.is_active() {
            return Err(GleanerError::AlreadyCollecting);
        }
        if target == 0 {
            return Err(GleanerError::Config("target count must be positive".into()));
        }
        if let Some(previous) = self.run.take() {
            for task in previous.tasks {
                task.abort();
            }
        }

        let group = self.group_info().await;
        let base_url = Url::parse(&group.url).ok();
        let harvester = Harvester::new(
            self.page.clone(),
            Classifier::new(&self.config.classifier),
            FieldExtractors::new(self.config.extract.clone(), base_url),
            self.config.harvest.clone(),
            target,
        );
        let status = harvester.subscribe();
        let (control, control_rx) = watch::channel(RunControl::Running);

        self.state.send_replace(CollectionState {
            phase: Phase::Collecting,
            target_count: target,
            current_count: 0,
            last_activity: Utc::now(),
            stalled_cycles: 0,
        });

        let context = RunContext {
            page: self.page.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
            group,
            export: self.config.export.clone(),
        };
        context.save_run_state();
        info!(
            "Collecting {} items from {} ({})",
            target, context.group.name, context.group.url
        );

        let driver = {
            let context = context.clone();
            let control_rx = control_rx.clone();
            tokio::spawn(async move {
                let outcome = harvester.run(control_rx).await;
                if outcome.completed {
                    context.complete(outcome.items.clone()).await;
                }
                outcome
            })
        };

        let harvest = &self.config.harvest;
        let tasks = vec![
            tokio::spawn(monitor(status.clone(), context.clone())),
            tokio::spawn(report_progress(
                context.clone(),
                control_rx.clone(),
                harvest.progress_interval(),
            )),
            tokio::spawn(checkpoint(
                context.clone(),
                status.clone(),
                control_rx,
                harvest.checkpoint_interval(),
            )),
        ];

        self.run = Some(ActiveRun {
            control,
            status,
            context,
            driver,
            tasks,
        });
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let run = self.run.as_ref().ok_or(GleanerError::NotCollecting)?;
        match self.state.borrow().phase {
            Phase::Paused => return Ok(()),
            Phase::Collecting => {}
            _ => return Err(GleanerError::NotCollecting),
        }

        run.control.send_replace(RunControl::Paused);
        self.state.send_modify(|state| {
            state.phase = Phase::Paused;
            state.last_activity = Utc::now();
        });
        run.context.save_run_state();
        info!("Collection paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let run = self.run.as_ref().ok_or(GleanerError::NotCollecting)?;
        match self.state.borrow().phase {
            Phase::Collecting => return Ok(()),
            Phase::Paused => {}
            _ => return Err(GleanerError::NotCollecting),
        }

        run.control.send_replace(RunControl::Running);
        self.state.send_modify(|state| {
            state.phase = Phase::Collecting;
            state.last_activity = Utc::now();
        });
        run.context.save_run_state();
        info!("Collection resumed");
        Ok(())
    }

    /// Cancel the run and return what was collected, marked partial.
    ///
    /// Returns `None` when there is nothing to stop, including a second call
    /// and a run that already completed.
    pub async fn stop(&mut self) -> Option<HarvestReport> {
        let run = self.run.take()?;
        if !self.state.borrow().phase.is_active() {
            for task in run.tasks {
                task.abort();
            }
            return None;
        }

        run.control.send_replace(RunControl::Stopped);
        let mut driver = run.driver;
        let outcome = match tokio::time::timeout(STOP_TIMEOUT, &mut driver).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                warn!("Harvest task ended abnormally: {}", e);
                None
            }
            Err(_) => {
                warn!("Harvest did not stop within {:?}", STOP_TIMEOUT);
                driver.abort();
                None
            }
        };
        for task in run.tasks {
            task.abort();
        }
        if let Err(e) = self.page.detach().await {
            debug!("Detach on stop failed: {}", e);
        }

        // Completion raced the stop request
        if outcome.as_ref().is_some_and(|o| o.completed) {
            return None;
        }

        let items = match outcome {
            Some(outcome) => outcome.items,
            None => {
                let status = run.status.borrow();
                finalize(status.items.to_vec(), status.target)
            }
        };
        let report = HarvestReport::partial(run.context.group.clone(), items);

        self.state.send_modify(|state| {
            state.phase = Phase::Stopped;
            state.current_count = report.items.len();
            state.last_activity = Utc::now();
        });
        if let Err(e) = self.store.save_partial(&report) {
            warn!("Failed to save partial result: {}", e);
        }
        run.context.record(&report);
        run.context.save_run_state();
        info!("Collection stopped with {} items", report.items.len());

        Some(report)
    }

    /// Latest partial result: the live run's items, else the stored checkpoint.
    pub fn partial_result(&self) -> Option<HarvestReport> {
        if let Some(run) = &self.run {
            if self.state.borrow().phase.is_active() {
                return Some(HarvestReport::partial(run.context.group.clone(), self.items()));
            }
        }
        self.store.load_partial().unwrap_or_else(|e| {
            warn!("Failed to load partial result: {}", e);
            None
        })
    }
}

/// Mirror harvester status into the collection state.
async fn monitor(mut status: watch::Receiver<HarvestStatus>, context: RunContext) {
    let mut warned = false;
    while status.changed().await.is_ok() {
        let (accepted, stalled, warning) = {
            let current = status.borrow_and_update();
            (current.accepted, current.stalled_cycles, current.stall_warning)
        };

        context.state.send_if_modified(|state| {
            if !state.phase.is_active() {
                return false;
            }
            let grew = state.current_count != accepted;
            let changed = grew || state.stalled_cycles != stalled;
            if grew {
                state.last_activity = Utc::now();
            }
            state.current_count = accepted;
            state.stalled_cycles = stalled;
            changed
        });

        if warning && !warned {
            let _ = context
                .events
                .send(CollectorEvent::Stalled { consecutive: stalled });
        }
        warned = warning;
    }
}

async fn report_progress(
    context: RunContext,
    control: watch::Receiver<RunControl>,
    every: Duration,
) {
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        if control.has_changed().is_err() {
            break;
        }
        let state = context.state.borrow().clone();
        match state.phase {
            Phase::Collecting => {
                let _ = context.events.send(CollectorEvent::Progress {
                    current: state.current_count,
                    target: state.target_count,
                });
            }
            Phase::Paused => {}
            _ => break,
        }
    }
}

async fn checkpoint(
    context: RunContext,
    status: watch::Receiver<HarvestStatus>,
    control: watch::Receiver<RunControl>,
    every: Duration,
) {
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await;
    loop {
        timer.tick().await;
        if control.has_changed().is_err() || !context.state.borrow().phase.is_active() {
            break;
        }
        let items = status.borrow().items.clone();
        context.save_partial(items.to_vec());
        context.save_run_state();
        debug!("Checkpointed {} items", items.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvester::HarvestConfig;
    use crate::page::simulated::SimulatedFeed;
    use crate::store::SqliteStore;
    use std::collections::HashSet;

    fn config() -> Config {
        Config {
            harvest: HarvestConfig {
                scroll_step_px: 600.0,
                scroll_steps_per_load: 4,
                scroll_step_pause_ms: 10,
                initial_settle_ms: 100,
                min_settle_ms: 50,
                max_settle_ms: 200,
                stall_backoff_ms: 100,
                max_stall_backoff_ms: 300,
                tick_interval_ms: 250,
                expand_settle_ms: 10,
                batch_pause_ms: 5,
                progress_interval_ms: 200,
                checkpoint_interval_ms: 500,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn controller(feed: Arc<SimulatedFeed>) -> (CollectionController, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let controller = CollectionController::new(feed, store.clone(), config());
        (controller, store)
    }

    async fn wait_until(
        controller: &CollectionController,
        done: impl Fn(&CollectionState) -> bool,
    ) {
        for _ in 0..600 {
            if done(&controller.state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached; state = {:?}", controller.state());
    }

    async fn wait_for_complete(
        events: &mut broadcast::Receiver<CollectorEvent>,
    ) -> Arc<HarvestReport> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(CollectorEvent::Complete(report)) => return report,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event channel closed: {}", e),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(120), wait)
            .await
            .expect("collection never completed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_exactly_target() {
        let feed = Arc::new(SimulatedFeed::new(8).with_posts(15));
        let (mut controller, store) = controller(feed.clone());
        let mut events = controller.subscribe();

        controller.start(10).await.unwrap();
        let report = wait_for_complete(&mut events).await;

        assert_eq!(report.items.len(), 10);
        assert_eq!(report.total_collected, 10);
        assert!(report.is_complete);
        assert!(!report.partial_data);
        let ids: HashSet<_> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(report.group_info.id.as_deref(), Some("424242"));

        wait_until(&controller, |s| s.phase == Phase::Complete).await;
        assert_eq!(controller.state().current_count, 10);
        assert_eq!(store.load_result().unwrap().unwrap().items.len(), 10);
        assert!(feed.detach_calls() >= 1);
    }

    #[tokio::test]
    async fn test_state_read_is_idempotent() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(5));
        let (controller, store) = controller(feed);

        let first = controller.state();
        let second = controller.state();
        assert_eq!(first, second);
        assert_eq!(first.phase, Phase::Idle);
        assert!(store.load_run_state().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_collecting_is_rejected() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(3));
        let (mut controller, _store) = controller(feed);

        controller.start(10).await.unwrap();
        let err = controller.start(10).await.unwrap_err();
        assert!(matches!(err, GleanerError::AlreadyCollecting));

        controller.pause().unwrap();
        assert!(matches!(
            controller.start(10).await,
            Err(GleanerError::AlreadyCollecting)
        ));
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_zero_target_is_rejected() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(3));
        let (mut controller, _store) = controller(feed);
        assert!(controller.start(0).await.is_err());
        assert_eq!(controller.state().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_partial_and_is_idempotent() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(3));
        let (mut controller, store) = controller(feed.clone());

        controller.start(10).await.unwrap();
        wait_until(&controller, |s| s.current_count == 3).await;

        let report = controller.stop().await.expect("stop should yield a report");
        assert!(report.partial_data);
        assert!(!report.is_complete);
        assert_eq!(report.items.len(), 3);
        assert_eq!(controller.state().phase, Phase::Stopped);
        assert!(feed.detach_calls() >= 1);

        let stored = store.load_partial().unwrap().unwrap();
        assert!(stored.partial_data);
        assert_eq!(stored.items.len(), 3);

        assert!(controller.stop().await.is_none());
        assert_eq!(controller.state().phase, Phase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_without_run_does_nothing() {
        let feed = Arc::new(SimulatedFeed::new(5));
        let (mut controller, _store) = controller(feed);
        assert!(controller.stop().await.is_none());
        assert_eq!(controller.state().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_keep_earlier_items() {
        let feed = Arc::new(SimulatedFeed::new(4).with_posts(30));
        let (mut controller, _store) = controller(feed);
        let mut events = controller.subscribe();

        controller.start(20).await.unwrap();
        wait_until(&controller, |s| s.current_count >= 4).await;

        controller.pause().unwrap();
        assert_eq!(controller.state().phase, Phase::Paused);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let before: Vec<String> = controller.items().into_iter().map(|i| i.id).collect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(controller.items().len(), before.len(), "paused run kept collecting");

        controller.resume().unwrap();
        let report = wait_for_complete(&mut events).await;
        assert_eq!(report.items.len(), 20);
        let after: HashSet<_> = report.items.iter().map(|i| i.id.clone()).collect();
        assert!(before.iter().all(|id| after.contains(id)));
    }

    #[tokio::test]
    async fn test_pause_requires_a_run() {
        let feed = Arc::new(SimulatedFeed::new(5));
        let (mut controller, _store) = controller(feed);
        assert!(matches!(controller.pause(), Err(GleanerError::NotCollecting)));
        assert!(matches!(controller.resume(), Err(GleanerError::NotCollecting)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_event_keeps_run_alive() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(2));
        let (mut controller, _store) = controller(feed);
        let mut events = controller.subscribe();

        controller.start(10).await.unwrap();
        let stalled = tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                if let Ok(CollectorEvent::Stalled { consecutive }) = events.recv().await {
                    return consecutive;
                }
            }
        })
        .await
        .expect("no stall event");

        assert!(stalled >= 3);
        assert_eq!(controller.state().phase, Phase::Collecting);
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoints_partial_result() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(3));
        let (mut controller, store) = controller(feed);

        controller.start(10).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let partial = store.load_partial().unwrap().expect("no checkpoint written");
        assert!(partial.partial_data);
        assert_eq!(partial.items.len(), 3);
        let run_state = store.load_run_state().unwrap().unwrap();
        assert!(run_state.is_collecting);
        assert_eq!(run_state.target_count, 10);

        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_without_listener_exports_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(5));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut config = config();
        config.export.output_dir = Some(dir.path().to_path_buf());
        let mut controller = CollectionController::new(feed, store, config);

        controller.start(3).await.unwrap();
        wait_until(&controller, |s| s.phase == Phase::Complete).await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_group_info_from_page() {
        let feed = Arc::new(SimulatedFeed::new(5).with_posts(1));
        let (controller, _store) = controller(feed);

        let info = controller.group_info().await;
        assert_eq!(info.name, "Bike Swap");
        assert_eq!(info.id.as_deref(), Some("424242"));
        assert_eq!(info.member_count, Some(12_500));
    }
}
