use log::{trace, warn};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

use super::message::{Message, ParticipantId};

/// Handle of a cancellable scheduled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(Uuid);

enum Command {
    Broadcast {
        at: u64,
        message: Message,
    },
    Send {
        to: ParticipantId,
        at: u64,
        timer: Option<TimerId>,
        message: Message,
    },
    Cancel(TimerId),
}

/// A participant's capability to publish, message itself and set timers.
#[derive(Debug, Clone)]
pub struct BusHandle {
    owner: ParticipantId,
    commands: Sender<Command>,
    clock: Arc<AtomicU64>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Broadcast { at, message } => write!(f, "Broadcast({}@{})", message.name(), at),
            Command::Send { to, at, message, .. } => {
                write!(f, "Send({}@{} -> {})", message.name(), at, to)
            }
            Command::Cancel(timer) => write!(f, "Cancel({:?})", timer),
        }
    }
}

impl BusHandle {
    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// Current logical tick.
    pub fn now(&self) -> u64 {
        self.clock.load(AtomicOrdering::SeqCst)
    }

    /// Deliver `message` to every registered participant, the sender included.
    pub fn broadcast(&self, message: Message) {
        self.push(Command::Broadcast {
            at: self.now(),
            message,
        });
    }

    /// Queue `message` for the owner `delay` ticks from now.
    pub fn send_self(&self, message: Message, delay: u64) {
        self.push(Command::Send {
            to: self.owner,
            at: self.now() + delay,
            timer: None,
            message,
        });
    }

    /// Like [`BusHandle::send_self`] but cancellable.
    pub fn schedule(&self, message: Message, delay: u64) -> TimerId {
        let timer = TimerId(Uuid::new_v4());
        self.push(Command::Send {
            to: self.owner,
            at: self.now() + delay,
            timer: Some(timer),
            message,
        });
        timer
    }

    pub fn cancel(&self, timer: TimerId) {
        self.push(Command::Cancel(timer));
    }

    fn push(&self, command: Command) {
        if let Err(err) = self.commands.send(command) {
            warn!("bus gone, dropping {:?} from {}", err.0, self.owner);
        }
    }
}

/// One message due for one participant.
#[derive(Debug)]
pub struct Delivery {
    pub at: u64,
    pub to: ParticipantId,
    pub message: Message,
    seq: u64,
    timer: Option<TimerId>,
}

impl PartialEq for Delivery {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Delivery {}

impl PartialOrd for Delivery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delivery {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Logical-time scheduler. Drains handle commands into a queue ordered by
/// `(tick, sequence)` and hands out one delivery at a time.
pub struct Bus {
    commands: Receiver<Command>,
    sender: Sender<Command>,
    clock: Arc<AtomicU64>,
    participants: Vec<ParticipantId>,
    queue: BinaryHeap<Reverse<Delivery>>,
    live_timers: HashSet<TimerId>,
    seq: u64,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        let (sender, commands) = mpsc::channel();
        Self {
            commands,
            sender,
            clock: Arc::new(AtomicU64::new(0)),
            participants: Vec::new(),
            queue: BinaryHeap::new(),
            live_timers: HashSet::new(),
            seq: 0,
        }
    }

    /// Capability handed to a participant at construction.
    pub fn handle(&self, owner: ParticipantId) -> BusHandle {
        BusHandle {
            owner,
            commands: self.sender.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn register(&mut self, participants: impl IntoIterator<Item = ParticipantId>) {
        for id in participants {
            if !self.participants.contains(&id) {
                self.participants.push(id);
            }
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.load(AtomicOrdering::SeqCst)
    }

    /// Deliveries queued but not yet handed out.
    pub fn pending(&mut self) -> usize {
        self.pump();
        self.queue.len()
    }

    /// Pop the next live delivery due at or before `until`, advancing the clock to it.
    pub fn next_delivery(&mut self, until: u64) -> Option<Delivery> {
        self.pump();
        loop {
            let Some(Reverse(next)) = self.queue.pop() else {
                self.advance_to(until);
                return None;
            };
            if next.at > until {
                self.queue.push(Reverse(next));
                self.advance_to(until);
                return None;
            }
            if let Some(timer) = next.timer {
                if !self.live_timers.remove(&timer) {
                    trace!("skipping cancelled {} for {}", next.message.name(), next.to);
                    continue;
                }
            }
            self.advance_to(next.at);
            return Some(next);
        }
    }

    fn advance_to(&self, tick: u64) {
        self.clock.fetch_max(tick, AtomicOrdering::SeqCst);
    }

    fn pump(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Broadcast { at, message } => {
                    for to in self.participants.clone() {
                        self.enqueue(to, at, None, message.clone());
                    }
                }
                Command::Send {
                    to,
                    at,
                    timer,
                    message,
                } => {
                    if let Some(timer) = timer {
                        self.live_timers.insert(timer);
                    }
                    self.enqueue(to, at, timer, message);
                }
                Command::Cancel(timer) => {
                    self.live_timers.remove(&timer);
                }
            }
        }
    }

    fn enqueue(&mut self, to: ParticipantId, at: u64, timer: Option<TimerId>, message: Message) {
        self.seq += 1;
        self.queue.push(Reverse(Delivery {
            at,
            to,
            message,
            seq: self.seq,
            timer,
        }));
    }
}
