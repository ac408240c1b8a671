/*!
 * Mailbox
 * Per-process FIFO message queues with volume accounting
 */

use crate::core::serde::system_time_micros;
use crate::core::types::{Cycle, FastMap, Pid};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::SystemTime;

/// One queued message, delivered in send order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    pub from: Pid,
    pub payload: Value,
    /// Cycle the message was sent on
    pub sent_cycle: Cycle,
}

/// Coarse payload shape recorded in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl PayloadKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => PayloadKind::Null,
            Value::Bool(_) => PayloadKind::Bool,
            Value::Number(_) => PayloadKind::Number,
            Value::String(_) => PayloadKind::String,
            Value::Array(_) => PayloadKind::Array,
            Value::Object(_) => PayloadKind::Object,
        }
    }
}

/// One traced send, kept in a bounded ring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TraceEntry {
    #[serde(with = "system_time_micros")]
    pub timestamp: SystemTime,
    pub cycle: Cycle,
    pub from: Pid,
    pub to: Pid,
    /// Serialized payload size in bytes
    pub bytes: usize,
    pub kind: PayloadKind,
}

/// Aggregated volume on one sender->target channel
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelVolume {
    pub count: u64,
    pub bytes: u64,
}

type ChannelKey = (Pid, Pid);

/// Per-process FIFO queues plus abuse accounting.
///
/// Delivery is lossless: spam detection warns but never drops. Queues are
/// created at registration and dropped at unregistration, so a send to a
/// missing queue means the target is gone and is a quiet no-op.
pub(crate) struct Mailbox {
    queues: FastMap<Pid, VecDeque<Message>>,
    /// Per-channel sends this cycle, cleared by `end_cycle`
    cycle_counts: FastMap<ChannelKey, u32>,
    /// Per-channel volume since the last report window
    window: FastMap<ChannelKey, ChannelVolume>,
    trace: VecDeque<TraceEntry>,
    trace_enabled: bool,
    trace_cap: usize,
    spam_threshold: u32,
    report_interval: u64,
    cycles_since_report: u64,
}

impl Mailbox {
    pub fn new(spam_threshold: u32, report_interval: u64, trace_enabled: bool, trace_cap: usize) -> Self {
        Self {
            queues: FastMap::default(),
            cycle_counts: FastMap::default(),
            window: FastMap::default(),
            trace: VecDeque::new(),
            trace_enabled,
            trace_cap,
            spam_threshold,
            report_interval,
            cycles_since_report: 0,
        }
    }

    pub fn create_queue(&mut self, id: &Pid) {
        self.queues.entry(id.clone()).or_default();
    }

    /// Drop a queue and everything still pending on it
    pub fn remove_queue(&mut self, id: &str) -> usize {
        self.queues.remove(id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn has_queue(&self, id: &str) -> bool {
        self.queues.contains_key(id)
    }

    pub fn pending(&self, id: &str) -> usize {
        self.queues.get(id).map(|q| q.len()).unwrap_or(0)
    }

    /// Enqueue a message for `to`. Returns false when the target has no
    /// queue (unknown or already unregistered).
    pub fn send(&mut self, to: &str, payload: Value, from: &Pid, cycle: Cycle) -> bool {
        let Some(queue) = self.queues.get_mut(to) else {
            debug!("dropping message from {from} to unknown process {to}");
            return false;
        };

        let bytes = serde_json::to_string(&payload).map(|s| s.len()).unwrap_or(0);
        let kind = PayloadKind::of(&payload);
        let to = Pid::from(to);

        queue.push_back(Message {
            from: from.clone(),
            payload,
            sent_cycle: cycle,
        });

        let key = (from.clone(), to.clone());
        let count = self.cycle_counts.entry(key.clone()).or_insert(0);
        *count += 1;
        // Warn exactly once per channel per cycle, on the first send past
        // the threshold. Delivery is unaffected.
        if *count == self.spam_threshold + 1 {
            warn!(
                "channel {from} -> {to} passed {} messages in one cycle; still delivering",
                self.spam_threshold
            );
        }

        let volume = self.window.entry(key).or_default();
        volume.count += 1;
        volume.bytes += bytes as u64;

        if self.trace_enabled {
            if self.trace.len() == self.trace_cap {
                self.trace.pop_front();
            }
            self.trace.push_back(TraceEntry {
                timestamp: SystemTime::now(),
                cycle,
                from: from.clone(),
                to,
                bytes,
                kind,
            });
        }

        true
    }

    /// Take every pending message for `id`, oldest first
    pub fn drain(&mut self, id: &str) -> Vec<Message> {
        self.queues
            .get_mut(id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn trace_entries(&self) -> Vec<TraceEntry> {
        self.trace.iter().cloned().collect()
    }

    /// Busiest channels in the current window, by message count
    pub fn busiest(&self, top: usize) -> Vec<(ChannelKey, ChannelVolume)> {
        let mut channels: Vec<_> = self.window.iter().map(|(k, v)| (k.clone(), *v)).collect();
        channels.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then_with(|| b.1.bytes.cmp(&a.1.bytes))
                .then_with(|| a.0.cmp(&b.0))
        });
        channels.truncate(top);
        channels
    }

    /// Cycle boundary: reset spam counters and emit the periodic
    /// busiest-channel report
    pub fn end_cycle(&mut self, top: usize) {
        self.cycle_counts.clear();
        self.cycles_since_report += 1;
        if self.cycles_since_report < self.report_interval {
            return;
        }
        self.cycles_since_report = 0;
        if !self.window.is_empty() {
            for ((from, to), volume) in self.busiest(top) {
                info!(
                    "channel {from} -> {to}: {} messages, {} bytes over the last {} cycles",
                    volume.count, volume.bytes, self.report_interval
                );
            }
        }
        self.window.clear();
    }
}
