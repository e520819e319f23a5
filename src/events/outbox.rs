//! Transactional outbox: side effects written next to the rows they describe.
//!
//! Rows are stored as `{"data": <payload>, "metadata": <EventMetadata>}` and
//! picked up by the dispatcher after the surrounding transaction commits.

use diesel::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{NewOutboxEvent, OutboxEvent};
use crate::schema::outbox_events;

use super::types::{AggregateType, EventMetadata, EventType};

#[derive(Serialize)]
struct Envelope<'a, P: Serialize> {
    data: &'a P,
    metadata: &'a EventMetadata,
}

#[derive(Debug, Clone)]
pub struct OutboxService;

impl OutboxService {
    /// Writes one event on the caller's connection, so it commits or rolls
    /// back with the caller's transaction.
    #[instrument(skip(conn, payload, metadata), fields(event_type = %event_type))]
    pub fn emit<P: Serialize>(
        conn: &mut PgConnection,
        event_type: EventType,
        aggregate_type: AggregateType,
        aggregate_id: impl ToString + std::fmt::Debug,
        payload: &P,
        metadata: EventMetadata,
    ) -> QueryResult<OutboxEvent> {
        let payload = serde_json::to_value(Envelope {
            data: payload,
            metadata: &metadata,
        })
        .map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))?;

        let row = diesel::insert_into(outbox_events::table)
            .values(&NewOutboxEvent {
                event_type: event_type.as_str().to_string(),
                aggregate_type: aggregate_type.as_str().to_string(),
                aggregate_id: aggregate_id.to_string(),
                payload,
            })
            .returning(OutboxEvent::as_returning())
            .get_result(conn)?;

        debug!(event_id = %row.id, "Event written to outbox");
        Ok(row)
    }

    /// Oldest unpublished events first.
    pub fn pending(conn: &mut PgConnection, limit: i64) -> QueryResult<Vec<OutboxEvent>> {
        outbox_events::table
            .filter(outbox_events::published.eq(false))
            .order((outbox_events::created_at.asc(), outbox_events::id.asc()))
            .limit(limit)
            .select(OutboxEvent::as_select())
            .load(conn)
    }

    pub fn mark_published(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::update(outbox_events::table.filter(outbox_events::id.eq_any(ids)))
            .set((
                outbox_events::published.eq(true),
                outbox_events::published_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
    }

    /// Deletes published events older than `retention_days`.
    pub fn prune_published(conn: &mut PgConnection, retention_days: i32) -> QueryResult<usize> {
        let cutoff = chrono::Utc::now().naive_utc()
            - chrono::Duration::days(i64::from(retention_days.max(0)));

        let removed = diesel::delete(
            outbox_events::table
                .filter(outbox_events::published.eq(true))
                .filter(outbox_events::published_at.lt(cutoff)),
        )
        .execute(conn)?;

        if removed > 0 {
            debug!(removed, retention_days, "Pruned published outbox events");
        }
        Ok(removed)
    }
}
