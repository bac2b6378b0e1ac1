use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use escr_core::ExpectedVersion;
use escr_events::{ProjectionStatus, SequenceNumber, StreamName};

use super::r#trait::{
    CommitResult, EventStore, EventStoreError, EventStreamFilter, EventStreamSelector, StoredEvent,
    UncommittedEvent,
};

#[derive(Debug, Default)]
struct Log {
    events: Vec<StoredEvent>,
    versions: HashMap<StreamName, u64>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Loads scan the whole log.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Database("event log lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn setup(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    fn commit(
        &self,
        stream: &StreamName,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<CommitResult, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::InvalidAppend(format!(
                "empty commit to {stream}"
            )));
        }

        let mut log = self.log.write().map_err(|_| Self::poisoned())?;
        let current = log.versions.get(stream).copied().unwrap_or(0);
        if !expected.matches(current) {
            return Err(EventStoreError::Concurrency {
                stream: stream.clone(),
                expected,
                actual: Some(current),
            });
        }
        if let Some(duplicate) = events
            .iter()
            .find(|e| log.events.iter().any(|stored| stored.event_id == e.event_id))
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} was already committed",
                duplicate.event_id
            )));
        }

        let recorded_at = Utc::now();
        let mut version = current;
        let mut sequence = SequenceNumber::new(log.events.len() as u64);
        for e in events {
            version += 1;
            sequence = sequence.next();
            log.events.push(StoredEvent {
                event_id: e.event_id,
                stream_name: stream.clone(),
                version,
                sequence_number: sequence,
                event_type: e.event_type,
                recorded_at,
                metadata: e.metadata,
                payload: e.payload,
            });
        }
        log.versions.insert(stream.clone(), version);

        Ok(CommitResult {
            version,
            sequence_number: sequence,
        })
    }

    fn load(
        &self,
        selector: &EventStreamSelector,
        filter: &EventStreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        // Sequence numbers are dense here, so the lower bound is an index.
        let start = filter
            .min_sequence_number
            .map_or(0, |min| min.value().saturating_sub(1) as usize)
            .min(log.events.len());
        Ok(log.events[start..]
            .iter()
            .filter(|e| match selector {
                EventStreamSelector::All => true,
                EventStreamSelector::Stream(name) => &e.stream_name == name,
            })
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    fn highest_sequence_number(&self) -> Result<SequenceNumber, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(SequenceNumber::new(log.events.len() as u64))
    }

    fn stream_version(&self, stream: &StreamName) -> Result<u64, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(log.versions.get(stream).copied().unwrap_or(0))
    }

    fn status(&self) -> ProjectionStatus {
        match self.log.read() {
            Ok(_) => ProjectionStatus::Ok,
            Err(_) => ProjectionStatus::Error("event log lock poisoned".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use escr_core::EventId;
    use serde_json::json;

    use super::*;

    fn event(kind: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: EventId::new(),
            event_type: kind.to_string(),
            payload: json!({ "type": kind }),
            metadata: Default::default(),
        }
    }

    fn stream(name: &str) -> StreamName {
        StreamName::new(name)
    }

    #[test]
    fn commits_assign_stream_versions_and_global_sequence() {
        let store = InMemoryEventStore::new();
        let a = stream("ContentStream:a");
        let b = stream("ContentStream:b");

        let first = store
            .commit(&a, vec![event("A1"), event("A2")], ExpectedVersion::NO_STREAM)
            .unwrap();
        assert_eq!(first.version, 2);
        assert_eq!(first.sequence_number, SequenceNumber::new(2));

        let second = store.commit(&b, vec![event("B1")], ExpectedVersion::NO_STREAM).unwrap();
        assert_eq!(second.version, 1);
        assert_eq!(second.sequence_number, SequenceNumber::new(3));

        let all = store
            .load(&EventStreamSelector::All, &EventStreamFilter::new())
            .unwrap();
        let sequences: Vec<u64> = all.iter().map(|e| e.sequence_number.value()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        let only_a = store
            .load(&EventStreamSelector::Stream(a.clone()), &EventStreamFilter::new())
            .unwrap();
        assert_eq!(only_a.len(), 2);
        assert_eq!(store.stream_version(&a).unwrap(), 2);
        assert_eq!(store.stream_version(&stream("unknown")).unwrap(), 0);
        assert_eq!(store.highest_sequence_number().unwrap(), SequenceNumber::new(3));
    }

    #[test]
    fn stale_expectation_is_a_concurrency_conflict() {
        let store = InMemoryEventStore::new();
        let a = stream("ContentStream:a");
        store.commit(&a, vec![event("A1")], ExpectedVersion::NO_STREAM).unwrap();

        let err = store
            .commit(&a, vec![event("A2")], ExpectedVersion::NO_STREAM)
            .unwrap_err();
        assert!(matches!(
            err,
            EventStoreError::Concurrency { actual: Some(1), .. }
        ));
        assert_eq!(store.stream_version(&a).unwrap(), 1);

        store.commit(&a, vec![event("A2")], ExpectedVersion::Any).unwrap();
        assert_eq!(store.stream_version(&a).unwrap(), 2);
    }

    #[test]
    fn filters_bound_sequence_and_type() {
        let store = InMemoryEventStore::new();
        let a = stream("ContentStream:a");
        store
            .commit(
                &a,
                vec![event("Created"), event("Tagged"), event("Tagged"), event("Removed")],
                ExpectedVersion::Any,
            )
            .unwrap();

        let window = store
            .load(
                &EventStreamSelector::All,
                &EventStreamFilter::new()
                    .from_sequence_number(SequenceNumber::new(2))
                    .until_sequence_number(Some(SequenceNumber::new(3))),
            )
            .unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].version, 2);

        let tagged = store
            .load(&EventStreamSelector::All, &EventStreamFilter::new().of_types(["Tagged"]))
            .unwrap();
        assert_eq!(tagged.len(), 2);
    }

    #[test]
    fn empty_and_duplicate_commits_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = stream("ContentStream:a");
        assert!(matches!(
            store.commit(&a, vec![], ExpectedVersion::Any),
            Err(EventStoreError::InvalidAppend(_))
        ));

        let once = event("A1");
        store.commit(&a, vec![once.clone()], ExpectedVersion::Any).unwrap();
        assert!(matches!(
            store.commit(&a, vec![once], ExpectedVersion::Any),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn racing_writers_with_the_same_expectation_commit_once() {
        let store = Arc::new(InMemoryEventStore::new());
        let a = stream("ContentStream:a");
        store.commit(&a, vec![event("A1")], ExpectedVersion::NO_STREAM).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let a = a.clone();
                thread::spawn(move || store.commit(&a, vec![event("A2")], ExpectedVersion::Exact(1)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(EventStoreError::is_concurrency_conflict)
        );
        assert_eq!(store.stream_version(&a).unwrap(), 2);
    }
}
