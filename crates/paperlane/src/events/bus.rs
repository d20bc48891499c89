//! Per-job event fan-out backed by `tokio::sync::broadcast`
//!
//! One channel per active job id, created lazily on first publish or
//! subscribe and torn down a grace period after the terminal event, so slow
//! subscribers still observe the close. Channels keep a small ring of recent
//! events that is replayed to late subscribers; delivery across the
//! replay/live seam is at-least-once, and the job record remains the source
//! of truth for anything a consumer misses.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EventsConfig;
use crate::types::event::JobEvent;

/// A single job's broadcast channel plus replay state
struct JobChannel {
    sender: broadcast::Sender<JobEvent>,
    backlog: RwLock<VecDeque<JobEvent>>,
    closed: AtomicBool,
}

impl JobChannel {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: RwLock::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }
}

/// What a subscriber starts from
pub struct Subscription {
    /// Recent events replayed before going live
    pub backlog: Vec<JobEvent>,
    /// Live receiver; `None` when the channel is already gone
    pub receiver: Option<broadcast::Receiver<JobEvent>>,
}

/// In-process fan-out hub for job events
pub struct EventBus {
    channels: Arc<DashMap<Uuid, Arc<JobChannel>>>,
    channel_capacity: usize,
    replay_buffer: usize,
    teardown_grace: Duration,
}

impl EventBus {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            channel_capacity: config.channel_capacity.max(8),
            replay_buffer: config.replay_buffer.max(1),
            teardown_grace: config.teardown_grace(),
        }
    }

    /// Publish an event to the job's channel, creating it if needed
    ///
    /// Events arriving after the terminal event are dropped: the terminal
    /// event closes the stream, exactly once per job.
    pub fn publish(&self, event: JobEvent) {
        let id = event.job_id();
        let channel = self.channel(id);

        if channel.closed.load(Ordering::Acquire) {
            tracing::warn!(job_id = %id, "Dropping event published after terminal");
            return;
        }

        let terminal = event.is_terminal();

        {
            let mut backlog = channel.backlog.write();
            if backlog.len() >= self.replay_buffer {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }

        // SendError only means there are zero live receivers
        let _ = channel.sender.send(event);

        if terminal {
            channel.closed.store(true, Ordering::Release);
            self.schedule_teardown(id);
        }
    }

    /// Attach a subscriber, creating the channel when the job is still live
    ///
    /// Returns the replay backlog plus a live receiver. The receiver ends
    /// when the channel is torn down after the terminal event.
    pub fn subscribe(&self, id: Uuid) -> Subscription {
        let channel = self.channel(id);
        // Subscribe before snapshotting the backlog: an event landing between
        // the two shows up in both, never in neither (at-least-once).
        let receiver = channel.sender.subscribe();
        let backlog: Vec<JobEvent> = channel.backlog.read().iter().cloned().collect();
        Subscription {
            backlog,
            receiver: Some(receiver),
        }
    }

    /// Look at the channel without creating one
    pub fn peek(&self, id: Uuid) -> Option<Subscription> {
        let channel = self.channels.get(&id)?.value().clone();
        let receiver = channel.sender.subscribe();
        let backlog: Vec<JobEvent> = channel.backlog.read().iter().cloned().collect();
        Some(Subscription {
            backlog,
            receiver: Some(receiver),
        })
    }

    /// Drop a job's channel immediately (retention sweep)
    pub fn remove(&self, id: Uuid) {
        self.channels.remove(&id);
    }

    /// Number of live channels
    pub fn active_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self, id: Uuid) -> Arc<JobChannel> {
        self.channels
            .entry(id)
            .or_insert_with(|| Arc::new(JobChannel::new(self.channel_capacity)))
            .value()
            .clone()
    }

    fn schedule_teardown(&self, id: Uuid) {
        let channels = self.channels.clone();
        let grace = self.teardown_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            channels.remove(&id);
            tracing::debug!(job_id = %id, "Event channel torn down");
        });
    }
}
