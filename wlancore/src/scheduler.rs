//! Per-node one-shot timers on a shared virtual clock.
//!
//! Every node owns one slot per [`TimerPurpose`]. Arming a slot replaces whatever was pending in it,
//! cancelling clears it. Replaced or cancelled events stay in the heap and are skipped when popped,
//! the same way a node thread ignores a stale notification.

use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::{timing::quantize, units::Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerPurpose {
    /// Backoff countdown reached zero.
    EndBackoff,
    /// DIFS elapsed, the backoff countdown may resume.
    ResumeBackoff,
    /// The frame this node is sending is off the air.
    TxFinished,
    /// SIFS elapsed, send the pending CTS, DATA or ACK.
    SendResponse,
    /// Sub-epsilon delay before an RTS occupies the channel.
    StartTransmission,
    CtsTimeout,
    DataTimeout,
    AckTimeout,
    NavTimeout,
    /// Traffic generator produced a packet.
    NewPacket,
    RestartSta,
    WaitCollisions,
}

impl TimerPurpose {
    pub const COUNT: usize = 12;

    pub const ALL: [TimerPurpose; Self::COUNT] = [
        TimerPurpose::EndBackoff,
        TimerPurpose::ResumeBackoff,
        TimerPurpose::TxFinished,
        TimerPurpose::SendResponse,
        TimerPurpose::StartTransmission,
        TimerPurpose::CtsTimeout,
        TimerPurpose::DataTimeout,
        TimerPurpose::AckTimeout,
        TimerPurpose::NavTimeout,
        TimerPurpose::NewPacket,
        TimerPurpose::RestartSta,
        TimerPurpose::WaitCollisions,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// A pending timer in one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Armed {
    at: Time,
    generation: u64,
}

#[derive(Debug, Clone, Default)]
struct TimerTable {
    slots: [Option<Armed>; TimerPurpose::COUNT],
}

#[derive(Debug, Clone)]
pub struct SimEvent {
    pub time: Time,
    seq: u64,
    pub node_id: usize,
    pub purpose: TimerPurpose,
    generation: u64,
}

impl PartialEq for SimEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}
impl Eq for SimEvent {}

impl PartialOrd for SimEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max heap so earlier times (and then earlier insertions) must compare greater.
impl Ord for SimEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .time
            .seconds()
            .total_cmp(&self.time.seconds())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A timer that was still armed when its event came up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fired {
    pub time: Time,
    pub node_id: usize,
    pub purpose: TimerPurpose,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    now: Time,
    queue: BinaryHeap<SimEvent>,
    timers: Vec<TimerTable>,
    next_seq: u64,
    next_generation: u64,
}

impl Scheduler {
    pub fn new(node_count: usize) -> Self {
        Self {
            now: Time::ZERO,
            queue: BinaryHeap::new(),
            timers: vec![TimerTable::default(); node_count],
            next_seq: 0,
            next_generation: 0,
        }
    }

    pub fn now(&self) -> Time {
        self.now
    }

    /// Arms `purpose` on `node_id` to fire at `at` (quantized). Any pending instance is replaced.
    /// Times in the past are clamped to now.
    pub fn arm(&mut self, node_id: usize, purpose: TimerPurpose, at: Time) -> Time {
        let at = quantize(at).max(self.now);

        self.next_generation += 1;
        let generation = self.next_generation;
        self.timers[node_id].slots[purpose.index()] = Some(Armed { at, generation });

        self.next_seq += 1;
        self.queue.push(SimEvent {
            time: at,
            seq: self.next_seq,
            node_id,
            purpose,
            generation,
        });

        at
    }

    /// Clears `purpose` on `node_id`. Does nothing if it was not armed.
    pub fn cancel(&mut self, node_id: usize, purpose: TimerPurpose) {
        self.timers[node_id].slots[purpose.index()] = None;
    }

    pub fn armed_at(&self, node_id: usize, purpose: TimerPurpose) -> Option<Time> {
        self.timers[node_id].slots[purpose.index()].map(|x| x.at)
    }

    pub fn is_armed(&self, node_id: usize, purpose: TimerPurpose) -> bool {
        self.armed_at(node_id, purpose).is_some()
    }

    /// Time of the next event in the heap, stale or not.
    pub fn peek_time(&self) -> Option<Time> {
        self.queue.peek().map(|x| x.time)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops events until one is still armed, advances the clock to it and disarms its slot.
    pub fn pop_due(&mut self) -> Option<Fired> {
        while let Some(event) = self.queue.pop() {
            let slot = &mut self.timers[event.node_id].slots[event.purpose.index()];

            let live = slot.is_some_and(|armed| armed.generation == event.generation);
            if !live {
                continue;
            }

            *slot = None;
            self.now = event.time;

            return Some(Fired {
                time: event.time,
                node_id: event.node_id,
                purpose: event.purpose,
            });
        }

        None
    }

    /// Drops cancelled or replaced events from the head of the queue so [`Self::peek_time`]
    /// reports the next timer that will actually fire.
    pub fn discard_stale(&mut self) {
        while let Some(event) = self.queue.peek() {
            let slot = self.timers[event.node_id].slots[event.purpose.index()];
            if slot.is_some_and(|armed| armed.generation == event.generation) {
                break;
            }
            self.queue.pop();
        }
    }

    /// Moves the clock without firing anything. Used when a run stops between events.
    pub fn advance_to(&mut self, time: Time) {
        self.now = self.now.max(time);
    }
}
