// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Batch bookkeeping: correlating inbound batch calls with their outgoing
//! response array.
//!
//! For each inbound batch containing at least one call, a record maps each
//! call's identifier to a slot in a fixed-size response buffer. Replies to
//! batched calls are parked in their slot; only when every slot is filled
//! is the array released for a single write. Replies to unbatched calls
//! pass straight through.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::protocol::ProtocolError;
use crate::protocol::jsonrpc::{Id, Response};

/// What the reply writer should do with a response it just produced.
#[derive(Debug)]
pub(crate) enum BatchDisposition {
    /// Not part of any batch: write it on its own.
    Unbatched(Response),
    /// Parked in its batch slot; the batch is still incomplete.
    Held,
    /// This response completed its batch: write the whole array.
    Complete(Vec<Response>),
}

struct BatchRecord {
    /// Call ID -> slot index, in inbound array order
    positions: HashMap<Id, usize>,
    slots: Vec<Option<Response>>,
    remaining: usize,
}

/// The set of open batch records for one connection.
///
/// Guarded by one mutex; critical sections end before any I/O.
#[derive(Default)]
pub(crate) struct BatchLedger {
    records: Mutex<Vec<BatchRecord>>,
}

impl BatchLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens a record for a batch whose calls carry `call_ids`, in array
    /// order. Fails without side effects when two calls share an ID.
    pub(crate) fn register(&self, call_ids: Vec<Id>) -> Result<(), ProtocolError> {
        let mut positions = HashMap::with_capacity(call_ids.len());
        let len = call_ids.len();
        for (index, id) in call_ids.into_iter().enumerate() {
            if positions.insert(id.clone(), index).is_some() {
                return Err(ProtocolError::DuplicateBatchId(id.to_string()));
            }
        }
        self.records.lock().push(BatchRecord {
            positions,
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        });
        Ok(())
    }

    /// Routes a response: into its batch slot when one exists, through
    /// otherwise. Returns the completed array exactly once per batch.
    pub(crate) fn offer(&self, response: Response) -> BatchDisposition {
        let Some(id) = response.id.clone() else {
            return BatchDisposition::Unbatched(response);
        };

        let mut records = self.records.lock();
        let Some(record_index) = records.iter().position(|r| r.positions.contains_key(&id))
        else {
            return BatchDisposition::Unbatched(response);
        };

        let record = &mut records[record_index];
        let slot = record.positions[&id];
        if record.slots[slot].replace(response).is_none() {
            record.remaining -= 1;
        }
        if record.remaining > 0 {
            return BatchDisposition::Held;
        }

        let record = records.swap_remove(record_index);
        BatchDisposition::Complete(record.slots.into_iter().flatten().collect())
    }

    /// Number of open batch records.
    #[cfg(test)]
    fn open_records(&self) -> usize {
        self.records.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unbatched_response_passes_through() {
        let ledger = BatchLedger::new();
        let response = Response::success(Id::Number(1), json!(5));
        match ledger.offer(response.clone()) {
            BatchDisposition::Unbatched(r) => assert_eq!(r, response),
            other => panic!("expected pass-through, got {other:?}"),
        }
    }

    #[test]
    fn test_batch_completes_when_all_slots_filled() {
        let ledger = BatchLedger::new();
        ledger
            .register(vec![Id::Number(1), Id::Number(2)])
            .unwrap();

        match ledger.offer(Response::success(Id::Number(2), json!(4))) {
            BatchDisposition::Held => {}
            other => panic!("expected held, got {other:?}"),
        }
        match ledger.offer(Response::success(Id::Number(1), json!(2))) {
            BatchDisposition::Complete(responses) => {
                assert_eq!(responses.len(), 2);
                // Slots preserve inbound array order regardless of reply order.
                assert_eq!(responses[0].id, Some(Id::Number(1)));
                assert_eq!(responses[1].id, Some(Id::Number(2)));
            }
            other => panic!("expected complete, got {other:?}"),
        }
        assert_eq!(ledger.open_records(), 0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let ledger = BatchLedger::new();
        let err = ledger
            .register(vec![Id::Number(1), Id::Number(1)])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateBatchId(_)));
        assert_eq!(ledger.open_records(), 0);
    }

    #[test]
    fn test_same_id_allowed_across_batches() {
        let ledger = BatchLedger::new();
        ledger.register(vec![Id::Number(1)]).unwrap();
        // The first record absorbs the first reply and closes.
        match ledger.offer(Response::success(Id::Number(1), json!(1))) {
            BatchDisposition::Complete(responses) => assert_eq!(responses.len(), 1),
            other => panic!("expected complete, got {other:?}"),
        }

        ledger.register(vec![Id::Number(1)]).unwrap();
        match ledger.offer(Response::success(Id::Number(1), json!(2))) {
            BatchDisposition::Complete(responses) => {
                assert_eq!(responses[0].result, Some(json!(2)))
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn test_string_and_number_ids_do_not_collide() {
        let ledger = BatchLedger::new();
        ledger
            .register(vec![Id::Number(92), Id::String("92".to_string())])
            .unwrap();
        match ledger.offer(Response::success(Id::String("92".to_string()), json!("s"))) {
            BatchDisposition::Held => {}
            other => panic!("expected held, got {other:?}"),
        }
    }
}
