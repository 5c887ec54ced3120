//! Commands that are on the wire and still waiting for a response.

use crate::error::{CommandError, CommandResult, ReassemblyError};
use crate::packet::FragmentInfo;
use crate::reassembly::ReassemblyBuffer;
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Destination for the eventual outcome of a command.
pub trait ResponseSink: Send {
    fn deliver(self: Box<Self>, result: CommandResult);
}

impl ResponseSink for tokio::sync::oneshot::Sender<CommandResult> {
    fn deliver(self: Box<Self>, result: CommandResult) {
        // The caller may have stopped waiting.
        let _ = (*self).send(result);
    }
}

impl ResponseSink for tokio::sync::mpsc::UnboundedSender<CommandResult> {
    fn deliver(self: Box<Self>, result: CommandResult) {
        let _ = self.send(result);
    }
}

impl ResponseSink for std::sync::mpsc::Sender<CommandResult> {
    fn deliver(self: Box<Self>, result: CommandResult) {
        let _ = self.send(result);
    }
}

pub struct PendingCommand {
    pub sequence: u8,
    pub sent_at: Instant,
    sink: Option<Box<dyn ResponseSink>>,
}

impl PendingCommand {
    fn resolve(self, result: CommandResult) {
        if let Some(sink) = self.sink {
            sink.deliver(result);
        }
    }

    pub fn is_overdue(&self, now: Instant, deadline: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) >= deadline
    }
}

/// What became of an inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The pending command received its complete payload.
    Delivered,
    /// A fragment was stored; more are expected.
    Incomplete { received: usize, highest_index: u8 },
    /// No command is waiting on this sequence.
    Unknown,
    /// The fragments contradicted each other; the command was failed.
    Rejected(ReassemblyError),
}

/// In-flight commands keyed by sequence, plus their partial responses.
#[derive(Default)]
pub struct PendingTracker {
    pending: HashMap<u8, PendingCommand>,
    reassembly: ReassemblyBuffer,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly sent command. Heartbeats pass no sink.
    ///
    /// If the sequence is still taken by an older command, that command is
    /// expired first. Returns whether that happened.
    pub fn register(
        &mut self,
        sequence: u8,
        sink: Option<Box<dyn ResponseSink>>,
        sent_at: Instant,
    ) -> bool {
        let evicted = self.expire(sequence);

        self.pending.insert(
            sequence,
            PendingCommand {
                sequence,
                sent_at,
                sink,
            },
        );
        evicted
    }

    /// Resolves `sequence` with a single-packet response.
    pub fn complete(&mut self, sequence: u8, payload: Vec<u8>) -> ResponseOutcome {
        let Some(command) = self.pending.remove(&sequence) else {
            return ResponseOutcome::Unknown;
        };

        self.reassembly.discard(sequence);
        command.resolve(Ok(payload));
        ResponseOutcome::Delivered
    }

    pub fn on_fragment(
        &mut self,
        sequence: u8,
        fragment: FragmentInfo,
        payload: &[u8],
    ) -> ResponseOutcome {
        if !self.pending.contains_key(&sequence) {
            return ResponseOutcome::Unknown;
        }

        match self
            .reassembly
            .on_fragment(sequence, fragment.index, fragment.total, payload)
        {
            Ok(None) => ResponseOutcome::Incomplete {
                received: self.reassembly.received(sequence).unwrap_or_default(),
                highest_index: self.reassembly.highest_index(sequence).unwrap_or_default(),
            },
            Ok(Some(joined)) => self.complete(sequence, joined),
            Err(err) => {
                if let Some(command) = self.pending.remove(&sequence) {
                    command.resolve(Err(CommandError::CorruptResponse {
                        sequence,
                        reason: err.to_string(),
                    }));
                }
                ResponseOutcome::Rejected(err)
            }
        }
    }

    /// Fails `sequence` with a timeout. Returns false if it was not pending.
    pub fn expire(&mut self, sequence: u8) -> bool {
        self.reassembly.discard(sequence);
        match self.pending.remove(&sequence) {
            Some(command) => {
                command.resolve(Err(CommandError::Timeout { sequence }));
                true
            }
            None => false,
        }
    }

    /// Expires every command sent at least `deadline` before `now`.
    pub fn expire_overdue(&mut self, now: Instant, deadline: Duration) -> Vec<u8> {
        let mut overdue: Vec<u8> = self
            .pending
            .values()
            .filter(|command| command.is_overdue(now, deadline))
            .map(|command| command.sequence)
            .collect();
        overdue.sort_unstable();

        for &sequence in &overdue {
            self.expire(sequence);
        }
        overdue
    }

    /// Forgets `sequence` without telling its sink, for sends that never
    /// reached the wire.
    pub fn cancel(&mut self, sequence: u8) -> bool {
        self.reassembly.discard(sequence);
        self.pending.remove(&sequence).is_some()
    }

    pub fn fail_all(&mut self, error: CommandError) -> usize {
        let count = self.pending.len();
        for (sequence, command) in self.pending.drain() {
            debug!("Failing pending command {}: {}", sequence, error);
            self.reassembly.discard(sequence);
            command.resolve(Err(error.clone()));
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, sequence: u8) -> bool {
        self.pending.contains_key(&sequence)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
