//! Request Table
//!
//! Pending synthesis requests keyed by correlation id, each with its result
//! slot and (once the turn has started) its reassembly buffer. The table is
//! owned by the session task, which is its only writer.
//!
//! A result slot is a one-shot sender. It is moved out of the table by whichever
//! of `finalize`, `expire` or `fail_all` reaches it first, so a request observes
//! exactly one outcome.

use crate::{error::SynthesisError, id::RequestId};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, hash_map::Entry};
use tokio::sync::oneshot;
use tracing::{debug, trace};

pub type SynthesisResult = Result<Bytes, SynthesisError>;
pub type ResultSlot = oneshot::Sender<SynthesisResult>;

struct Pending {
    slot: ResultSlot,
    /// `None` until the turn-start frame arrives.
    buffer: Option<BytesMut>,
}

#[derive(Default)]
pub struct RequestTable {
    pending: HashMap<RequestId, Pending>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending request. An id that is already pending is rejected and
    /// its slot handed back untouched.
    pub fn register(&mut self, id: RequestId, slot: ResultSlot) -> Result<(), ResultSlot> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(slot),
            Entry::Vacant(entry) => {
                entry.insert(Pending { slot, buffer: None });
                Ok(())
            }
        }
    }

    /// Starts reassembly for `id`. Returns `false` if the request is unknown.
    pub fn open_buffer(&mut self, id: &RequestId) -> bool {
        match self.pending.get_mut(id) {
            Some(pending) => {
                pending.buffer.get_or_insert_with(BytesMut::new);
                true
            }
            None => {
                debug!(request_id = %id, "turn.start for unknown request");
                false
            }
        }
    }

    /// Appends an audio chunk. Chunks for unknown requests, or for requests
    /// whose turn has not started, are dropped.
    pub fn append(&mut self, id: &RequestId, chunk: &[u8]) -> bool {
        match self.pending.get_mut(id).and_then(|p| p.buffer.as_mut()) {
            Some(buffer) => {
                buffer.extend_from_slice(chunk);
                true
            }
            None => {
                trace!(request_id = %id, len = chunk.len(), "dropping stray audio chunk");
                false
            }
        }
    }

    /// Completes `id` with its reassembled audio.
    ///
    /// Only a request whose turn has started can be finalized; otherwise this
    /// is a no-op and the request stays pending.
    pub fn finalize(&mut self, id: &RequestId) -> bool {
        let started = self
            .pending
            .get(id)
            .is_some_and(|pending| pending.buffer.is_some());
        if !started {
            debug!(request_id = %id, "turn.end without a started turn");
            return false;
        }

        let Some(Pending { slot, buffer }) = self.pending.remove(id) else {
            return false;
        };
        let audio = buffer.unwrap_or_default().freeze();
        debug!(request_id = %id, bytes = audio.len(), remaining = self.pending.len(), "request completed");
        settle(id, slot, Ok(audio));
        true
    }

    /// Fails `id` with a timeout. Returns `false` if it already settled.
    pub fn expire(&mut self, id: &RequestId) -> bool {
        match self.pending.remove(id) {
            Some(Pending { slot, .. }) => {
                settle(id, slot, Err(SynthesisError::Timeout));
                true
            }
            None => false,
        }
    }

    /// Fails every pending request with a closed-connection error and empties the table.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for (id, Pending { slot, .. }) in self.pending.drain() {
            settle(
                &id,
                slot,
                Err(SynthesisError::ConnectionClosed(reason.to_string())),
            );
        }
        count
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn settle(id: &RequestId, slot: ResultSlot, result: SynthesisResult) {
    if slot.send(result).is_err() {
        debug!(request_id = %id, "caller went away before the request settled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    fn pending(table: &mut RequestTable, id: &str) -> oneshot::Receiver<SynthesisResult> {
        let (tx, rx) = oneshot::channel();
        table.register(RequestId::from(id), tx).unwrap();
        rx
    }

    #[test]
    fn test_chunks_are_concatenated_in_arrival_order() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");

        assert!(table.open_buffer(&id));
        assert!(table.append(&id, &[0x01, 0x02]));
        assert!(table.append(&id, &[]));
        assert!(table.append(&id, &[0x03]));
        assert!(table.finalize(&id));

        let audio = rx.try_recv().unwrap().unwrap();
        assert_eq!(&audio[..], &[0x01, 0x02, 0x03]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut table = RequestTable::new();
        let mut first = pending(&mut table, "dup");

        let (tx, mut second) = oneshot::channel();
        let rejected = table.register(RequestId::from("dup"), tx).unwrap_err();
        drop(rejected);

        // The first entry is untouched and still completes.
        let id = RequestId::from("dup");
        table.open_buffer(&id);
        table.append(&id, b"x");
        table.finalize(&id);
        assert_eq!(&first.try_recv().unwrap().unwrap()[..], b"x");
        assert!(matches!(second.try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn test_chunk_before_turn_start_is_dropped() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");

        assert!(!table.append(&id, &[0xee]));
        assert!(table.open_buffer(&id));
        assert!(table.append(&id, &[0x01]));
        assert!(table.finalize(&id));

        assert_eq!(&rx.try_recv().unwrap().unwrap()[..], &[0x01]);
    }

    #[test]
    fn test_turn_end_before_turn_start_keeps_request_pending() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");

        assert!(!table.finalize(&id));
        assert!(table.contains(&id));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_repeated_turn_start_keeps_buffer() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");

        table.open_buffer(&id);
        table.append(&id, &[0x01]);
        table.open_buffer(&id);
        table.append(&id, &[0x02]);
        table.finalize(&id);

        assert_eq!(&rx.try_recv().unwrap().unwrap()[..], &[0x01, 0x02]);
    }

    #[test]
    fn test_frames_for_unknown_ids_do_not_touch_other_requests() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let stranger = RequestId::from("zz");
        let mut rx = pending(&mut table, "a");
        table.open_buffer(&id);
        table.append(&id, &[0x01]);

        assert!(!table.open_buffer(&stranger));
        assert!(!table.append(&stranger, &[0xff]));
        assert!(!table.finalize(&stranger));
        assert!(!table.expire(&stranger));
        assert_eq!(table.len(), 1);

        table.finalize(&id);
        assert_eq!(&rx.try_recv().unwrap().unwrap()[..], &[0x01]);
    }

    #[test]
    fn test_late_frames_after_finalize_are_noops() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let _rx = pending(&mut table, "a");
        table.open_buffer(&id);
        table.finalize(&id);

        assert!(!table.open_buffer(&id));
        assert!(!table.append(&id, &[0x01]));
        assert!(!table.finalize(&id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_expire_delivers_timeout() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");
        table.open_buffer(&id);
        table.append(&id, &[0x01]);

        assert!(table.expire(&id));
        assert!(matches!(rx.try_recv(), Ok(Err(SynthesisError::Timeout))));
        assert!(!table.contains(&id));

        // A late turn.end for the expired id is harmless.
        assert!(!table.append(&id, &[0x02]));
        assert!(!table.finalize(&id));
    }

    #[test]
    fn test_finalize_and_expire_race_settles_once() {
        // Turn end first, deadline second.
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        let mut rx = pending(&mut table, "a");
        table.open_buffer(&id);
        table.append(&id, &[0x01, 0x02]);
        assert!(table.finalize(&id));
        assert!(!table.expire(&id));
        assert_eq!(&rx.try_recv().unwrap().unwrap()[..], &[0x01, 0x02]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));

        // Deadline first, turn end second.
        let mut rx = pending(&mut table, "a");
        table.open_buffer(&id);
        assert!(table.expire(&id));
        assert!(!table.finalize(&id));
        assert!(matches!(rx.try_recv(), Ok(Err(SynthesisError::Timeout))));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn test_fail_all_resolves_every_pending_request() {
        let mut table = RequestTable::new();
        let mut receivers: Vec<_> = (0..5)
            .map(|i| pending(&mut table, &format!("id{i}")))
            .collect();
        table.open_buffer(&RequestId::from("id0"));
        table.append(&RequestId::from("id0"), &[0x01]);

        assert_eq!(table.fail_all("going away"), 5);
        assert!(table.is_empty());
        for rx in receivers.iter_mut() {
            match rx.try_recv() {
                Ok(Err(SynthesisError::ConnectionClosed(reason))) => {
                    assert_eq!(reason, "going away")
                }
                other => panic!("expected ConnectionClosed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_settling_with_dropped_receiver_is_harmless() {
        let mut table = RequestTable::new();
        let id = RequestId::from("a");
        drop(pending(&mut table, "a"));

        table.open_buffer(&id);
        assert!(table.finalize(&id));
        assert!(table.is_empty());
    }
}
