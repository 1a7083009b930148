//! Incremental feed harvesting.
//!
//! A [`Harvester`] owns one collection run: it scrolls the page to load more
//! content, snapshots it, classifies candidates, resolves identities and
//! extracts items in small batches until the target is reached or the run is
//! stopped. Loading is driven by a trigger queue fed from an interval tick and
//! a sentinel proximity check, with an adaptive settle delay and stall backoff.
//!
//! Progress is published through a `watch` channel as [`HarvestStatus`]; run
//! control arrives through a `watch` of [`RunControl`].

mod config;
mod pacing;
mod trigger;

pub use config::HarvestConfig;
pub use pacing::{AdaptiveDelay, StallTracker};
pub use trigger::{LoadTrigger, TriggerQueue};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scraper::{ElementRef, Html};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::classifier::Classifier;
use crate::domain::Item;
use crate::extract::FieldExtractors;
use crate::identity::{resolve_identity, Identity, IdentitySet};
use crate::page::{Affordance, FeedMetrics, FeedPage};

/// Run control signal sent by the collection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Idle,
    Loading,
    Scanning,
    Draining,
    Complete,
}

/// Live view of a run, published after every batch and cycle.
#[derive(Debug, Clone)]
pub struct HarvestStatus {
    pub phase: HarvestPhase,
    pub target: usize,
    pub accepted: usize,
    pub stalled_cycles: u32,
    /// Set once consecutive stalls reach the configured threshold.
    pub stall_warning: bool,
    pub layout: Option<String>,
    pub items: Arc<Vec<Item>>,
}

impl HarvestStatus {
    pub fn new(target: usize) -> Self {
        Self {
            phase: HarvestPhase::Idle,
            target,
            accepted: 0,
            stalled_cycles: 0,
            stall_warning: false,
            layout: None,
            items: Arc::new(Vec::new()),
        }
    }
}

/// Result of a finished or cancelled run.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub items: Vec<Item>,
    /// True when the target was reached.
    pub completed: bool,
    pub layout: Option<String>,
}

/// Candidate whose identity is new, waiting for extraction.
struct PendingCandidate {
    identity: Identity,
    html: String,
}

enum Flow {
    Continue,
    Stop,
}

pub struct Harvester {
    page: Arc<dyn FeedPage>,
    classifier: Classifier,
    extractors: FieldExtractors,
    config: HarvestConfig,
    target: usize,
    identities: IdentitySet,
    /// Content keys of accepted low-confidence items, whose ids change per scan.
    content_keys: HashSet<String>,
    items: Vec<Item>,
    delay: AdaptiveDelay,
    stalls: StallTracker,
    sentinel: Option<f64>,
    /// Layout the page was last focused for; `Some(None)` before detection.
    focused: Option<Option<String>>,
    status: watch::Sender<HarvestStatus>,
}

impl Harvester {
    pub fn new(
        page: Arc<dyn FeedPage>,
        classifier: Classifier,
        extractors: FieldExtractors,
        config: HarvestConfig,
        target: usize,
    ) -> Self {
        let (status, _) = watch::channel(HarvestStatus::new(target));
        Self {
            page,
            classifier,
            extractors,
            delay: AdaptiveDelay::from_config(&config),
            stalls: StallTracker::from_config(&config),
            config,
            target,
            identities: IdentitySet::new(),
            content_keys: HashSet::new(),
            items: Vec::new(),
            sentinel: None,
            focused: None,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HarvestStatus> {
        self.status.subscribe()
    }

    /// Drive the run until the target is reached or `control` says stop.
    pub async fn run(mut self, mut control: watch::Receiver<RunControl>) -> HarvestOutcome {
        info!("Harvest started (target {})", self.target);
        let mut triggers = TriggerQueue::new();
        let ticker = triggers.spawn_ticker(self.config.tick_interval());

        self.focus().await;
        // Content already on screen is scanned before any scrolling.
        let mut stopped = !wait_while_paused(&mut control).await
            || matches!(self.scan(&mut control).await, Flow::Stop);
        triggers.fire(LoadTrigger::Proximity);

        while !stopped && !self.target_reached() {
            if !wait_while_paused(&mut control).await {
                break;
            }

            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        stopped = true;
                    }
                }
                trigger = triggers.next() => {
                    let Some(trigger) = trigger else { break };
                    trace!("Load cycle triggered by {:?}", trigger);
                    match self.cycle(&mut control).await {
                        Flow::Stop => stopped = true,
                        Flow::Continue => {
                            if self.near_sentinel().await {
                                triggers.fire(LoadTrigger::Proximity);
                            }
                        }
                    }
                }
            }
        }
        ticker.abort();

        self.set_phase(HarvestPhase::Draining);
        let completed = self.target_reached();
        let items = finalize(std::mem::take(&mut self.items), self.target);
        let layout = self.classifier.active_layout().map(str::to_string);

        self.status.send_modify(|status| {
            status.phase = if completed {
                HarvestPhase::Complete
            } else {
                HarvestPhase::Idle
            };
            status.accepted = items.len();
            status.items = Arc::new(items.clone());
        });
        info!(
            "Harvest {} with {} items",
            if completed { "completed" } else { "stopped" },
            items.len()
        );

        HarvestOutcome {
            items,
            completed,
            layout,
        }
    }

    fn target_reached(&self) -> bool {
        self.items.len() >= self.target
    }

    /// One Loading phase followed by a scan, with settle and stall handling.
    async fn cycle(&mut self, control: &mut watch::Receiver<RunControl>) -> Flow {
        let before = self.metrics().await;
        let started = Instant::now();

        self.set_phase(HarvestPhase::Loading);
        for _ in 0..self.config.scroll_steps_per_load {
            if let Err(e) = self.page.scroll_by(self.config.scroll_step_px).await {
                warn!("Scroll failed: {}", e);
                break;
            }
            if !settle(self.config.scroll_step_pause(), control).await {
                return Flow::Stop;
            }
        }
        let load_time = started.elapsed();

        if !settle(self.delay.current(), control).await {
            return Flow::Stop;
        }

        let scan_started = Instant::now();
        let before_count = self.items.len();
        if let Flow::Stop = self.scan(control).await {
            return Flow::Stop;
        }
        let accepted = self.items.len() - before_count;
        // The settle sleep itself is excluded so the delay cannot feed on itself.
        self.delay.record(load_time + scan_started.elapsed());

        let after = self.metrics().await;
        let grew = after.scroll_height > before.scroll_height;

        if grew || accepted > 0 {
            if self.stalls.consecutive() > 0 {
                debug!("Feed recovered after {} stalled cycles", self.stalls.consecutive());
            }
            self.stalls.reset();
            self.publish_stalls();
            if accepted > 0 {
                self.move_sentinel(after.scroll_height).await;
            }
            return Flow::Continue;
        }

        let backoff = self.stalls.record_stall();
        self.publish_stalls();
        if self.stalls.should_report() {
            warn!(
                "No new content after {} load cycles; still waiting",
                self.stalls.consecutive()
            );
        } else {
            debug!(
                "Stalled cycle {} (backoff {:?})",
                self.stalls.consecutive(),
                backoff
            );
        }

        if settle(backoff, control).await {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }

    /// Expand, snapshot, classify, then extract new candidates in micro-batches.
    async fn scan(&mut self, control: &mut watch::Receiver<RunControl>) -> Flow {
        self.set_phase(HarvestPhase::Scanning);

        self.click_affordance(&Affordance::see_more(), self.config.expand_attempts, control)
            .await;
        if self.extractors.config().include_replies {
            self.click_affordance(
                &Affordance::more_replies(),
                self.config.reply_load_attempts,
                control,
            )
            .await;
        }

        let snapshot = match self.page.snapshot().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Snapshot failed: {}", e);
                return Flow::Continue;
            }
        };

        let pending = self.discover(&snapshot);
        self.focus().await;
        if pending.is_empty() {
            return Flow::Continue;
        }
        debug!("{} new candidates", pending.len());

        let first = self.config.first_batch_size.max(1).min(pending.len());
        let (head, tail) = pending.split_at(first);
        self.extract_batch(head);

        for batch in tail.chunks(self.config.batch_size.max(1)) {
            if self.target_reached() {
                break;
            }
            tokio::task::yield_now().await;
            if !settle(self.config.batch_pause(), control).await
                || !wait_while_paused(control).await
            {
                return Flow::Stop;
            }
            self.extract_batch(batch);
        }
        Flow::Continue
    }

    /// Classify a snapshot and keep the candidates whose identity is new.
    fn discover(&mut self, snapshot: &str) -> Vec<PendingCandidate> {
        let doc = Html::parse_document(snapshot);
        let layout = self.classifier.detect_layout(&doc).to_string();
        self.status.send_if_modified(|status| {
            if status.layout.as_deref() == Some(layout.as_str()) {
                return false;
            }
            status.layout = Some(layout.clone());
            true
        });

        let mut in_scan = HashSet::new();
        self.classifier
            .candidates(&doc)
            .into_iter()
            .filter_map(|node| {
                let identity = resolve_identity(&node, &self.extractors);
                if self.identities.contains(&identity) || !in_scan.insert(identity.key.clone()) {
                    return None;
                }
                Some(PendingCandidate {
                    identity,
                    html: node.html(),
                })
            })
            .collect()
    }

    fn extract_batch(&mut self, batch: &[PendingCandidate]) {
        for candidate in batch {
            if self.target_reached() {
                break;
            }
            let Some(item) = self.extract(candidate) else {
                trace!("Dropping {} without content", candidate.identity.key);
                continue;
            };
            if item.low_confidence && !self.content_keys.insert(item.dedup_key()) {
                trace!("{} repeats an accepted post", candidate.identity.key);
                continue;
            }
            if self.identities.insert(&candidate.identity) {
                self.items.push(item);
            }
        }
        self.publish_items();
    }

    fn extract(&self, candidate: &PendingCandidate) -> Option<Item> {
        let fragment = Html::parse_fragment(&candidate.html);
        let root = fragment.root_element().children().find_map(ElementRef::wrap)?;
        let item = self.extractors.item(&candidate.identity, &root);
        item.has_content().then_some(item)
    }

    async fn click_affordance(
        &self,
        affordance: &Affordance,
        attempts: u32,
        control: &mut watch::Receiver<RunControl>,
    ) {
        for _ in 0..attempts {
            match self.page.click_matching(affordance).await {
                Ok(0) => break,
                Ok(clicked) => {
                    trace!("Clicked {} {:?} controls", clicked, affordance.labels.first());
                    if !settle(self.config.expand_settle(), control).await {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Affordance click failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Point the page at the feed container of the active layout.
    async fn focus(&mut self) {
        let layout = self.classifier.active_layout().map(str::to_string);
        if self.focused.as_ref() == Some(&layout) {
            return;
        }
        match self.page.focus(self.classifier.container_selectors()).await {
            Ok(()) => self.focused = Some(layout),
            Err(e) => debug!("Could not focus feed container: {}", e),
        }
    }

    async fn metrics(&self) -> FeedMetrics {
        self.page.metrics().await.unwrap_or_else(|e| {
            debug!("Metrics unavailable: {}", e);
            FeedMetrics::default()
        })
    }

    async fn move_sentinel(&mut self, offset: f64) {
        match self.page.place_sentinel(offset).await {
            Ok(()) => self.sentinel = Some(offset),
            Err(e) => debug!("Could not place sentinel: {}", e),
        }
    }

    /// Whether the viewport has come within the proximity margin of the sentinel.
    async fn near_sentinel(&self) -> bool {
        let metrics = self.metrics().await;
        let edge = self.sentinel.unwrap_or(metrics.scroll_height);
        metrics.scroll_top + metrics.viewport_height + self.config.proximity_margin_px >= edge
    }

    fn set_phase(&self, phase: HarvestPhase) {
        self.status.send_if_modified(|status| {
            let changed = status.phase != phase;
            status.phase = phase;
            changed
        });
    }

    fn publish_items(&self) {
        let items = Arc::new(self.items.clone());
        self.status.send_modify(|status| {
            status.accepted = items.len();
            status.items = items;
        });
    }

    fn publish_stalls(&self) {
        let consecutive = self.stalls.consecutive();
        let warning = self.stalls.should_report();
        self.status.send_if_modified(|status| {
            let changed = status.stalled_cycles != consecutive || status.stall_warning != warning;
            status.stalled_cycles = consecutive;
            status.stall_warning = warning;
            changed
        });
    }
}

/// Sleep for `duration` unless a stop arrives first. Returns false on stop.
async fn settle(duration: Duration, control: &mut watch::Receiver<RunControl>) -> bool {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return *control.borrow() != RunControl::Stopped,
            changed = control.changed() => {
                if changed.is_err() || *control.borrow() == RunControl::Stopped {
                    return false;
                }
            }
        }
    }
}

/// Block while paused. Returns false once the run is stopped.
async fn wait_while_paused(control: &mut watch::Receiver<RunControl>) -> bool {
    loop {
        let state = *control.borrow_and_update();
        match state {
            RunControl::Running => return true,
            RunControl::Stopped => return false,
            RunControl::Paused => {
                if control.changed().await.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Final duplicate sweep, then trim to `target` keeping the earliest items.
pub fn finalize(items: Vec<Item>, target: usize) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut result: Vec<Item> = items
        .into_iter()
        .filter(|item| seen.insert(item.dedup_key()))
        .collect();
    result.truncate(target);
    result
}
