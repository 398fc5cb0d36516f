use nhb_common::{
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

use super::{intent_key, StateManager};
use crate::core::error::ChainError;

/// Consumed intent reference, persisted until its expiry passes
#[derive(Clone, Debug, PartialEq, Eq)]
struct IntentRecord {
    expiry: u64,
    consumed_at_height: u64,
}

impl Serializer for IntentRecord {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.expiry);
        writer.write_u64(&self.consumed_at_height);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(IntentRecord {
            expiry: reader.read_u64()?,
            consumed_at_height: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        16
    }
}

/// Reservation produced by [`reserve`]; consumed only if the transaction
/// succeeds, so failed executions never burn the reference.
#[derive(Clone, Debug)]
pub struct IntentReservation {
    reference: Hash,
    expiry: u64,
}

/// Validate uniqueness and expiry of an intent reference.
///
/// A live record (unexpired) means the reference was already consumed; a
/// stale record is overwritten. The effective expiry is the caller's
/// `intent_expiry` or `now + ttl`.
pub fn reserve(
    state: &mut StateManager,
    reference: &Hash,
    intent_expiry: Option<u64>,
    ttl: u64,
    now: u64,
) -> Result<IntentReservation, ChainError> {
    if let Some(expiry) = intent_expiry {
        if expiry < now {
            return Err(ChainError::IntentExpired);
        }
    }
    let key = intent_key(reference);
    if let Some(bytes) = state.raw_get(&key)? {
        let record = IntentRecord::from_bytes(&bytes)?;
        if record.expiry >= now {
            return Err(ChainError::IntentAlreadyConsumed);
        }
    }
    Ok(IntentReservation {
        reference: reference.clone(),
        expiry: intent_expiry.unwrap_or(now + ttl),
    })
}

/// Persist the reservation after a successful execution
pub fn consume(
    state: &mut StateManager,
    reservation: &IntentReservation,
    height: u64,
) -> Result<(), ChainError> {
    let record = IntentRecord {
        expiry: reservation.expiry,
        consumed_at_height: height,
    };
    state.raw_put(&intent_key(&reservation.reference), record.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{storage::MemoryDatabase, trie::Trie};
    use nhb_common::crypto::keccak256;
    use std::sync::Arc;

    fn state() -> StateManager {
        StateManager::new(Trie::open(Arc::new(MemoryDatabase::new())).unwrap())
    }

    #[test]
    fn at_most_once_within_ttl() -> Result<(), ChainError> {
        let mut state = state();
        let reference = keccak256(b"intent");

        let reservation = reserve(&mut state, &reference, None, 3600, 100)?;
        consume(&mut state, &reservation, 1)?;

        assert!(matches!(
            reserve(&mut state, &reference, None, 3600, 200),
            Err(ChainError::IntentAlreadyConsumed)
        ));
        Ok(())
    }

    #[test]
    fn stale_record_can_be_reused() -> Result<(), ChainError> {
        let mut state = state();
        let reference = keccak256(b"intent");
        let reservation = reserve(&mut state, &reference, Some(150), 3600, 100)?;
        consume(&mut state, &reservation, 1)?;

        // past the recorded expiry the reference is free again
        assert!(reserve(&mut state, &reference, None, 3600, 151).is_ok());
        Ok(())
    }

    #[test]
    fn caller_expiry_in_the_past_is_rejected() {
        let mut state = state();
        let reference = keccak256(b"intent");
        assert!(matches!(
            reserve(&mut state, &reference, Some(50), 3600, 100),
            Err(ChainError::IntentExpired)
        ));
    }

    #[test]
    fn unconsumed_reservation_leaves_no_trace() -> Result<(), ChainError> {
        let mut state = state();
        let reference = keccak256(b"intent");
        let _reservation = reserve(&mut state, &reference, None, 3600, 100)?;
        // never consumed: a second reserve succeeds
        assert!(reserve(&mut state, &reference, None, 3600, 101).is_ok());
        Ok(())
    }
}
