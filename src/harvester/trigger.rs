//! Loading triggers. Two independent sources feed one queue: a fixed
//! interval tick and the sentinel proximity signal. The queue is shallow and
//! drained before each cycle, so triggers that pile up during a cycle
//! collapse into a single follow-up cycle.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    Tick,
    Proximity,
}

pub struct TriggerQueue {
    tx: mpsc::Sender<LoadTrigger>,
    rx: mpsc::Receiver<LoadTrigger>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        Self { tx, rx }
    }

    /// Enqueue unless the queue is already full.
    pub fn fire(&self, trigger: LoadTrigger) {
        let _ = self.tx.try_send(trigger);
    }

    /// Start the backup interval source.
    pub fn spawn_ticker(&self, every: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // Skip the first immediate tick
            loop {
                timer.tick().await;
                if tx.is_closed() {
                    break;
                }
                let _ = tx.try_send(LoadTrigger::Tick);
            }
        })
    }

    /// Wait for the next trigger, then swallow any that queued behind it.
    pub async fn next(&mut self) -> Option<LoadTrigger> {
        let first = self.rx.recv().await?;
        while self.rx.try_recv().is_ok() {}
        Some(first)
    }
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new()
    }
}
