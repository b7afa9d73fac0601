/// Record identifiers are opaque strings. Challenge ids are chosen by the
/// caller; deployment, job, and result ids are generated here.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new time-ordered identifier (UUID v7).
pub fn new_id() -> EntityId {
    uuid::Uuid::now_v7().to_string()
}

/// Return a timestamp strictly later than `previous`.
///
/// Stored timestamps have microsecond precision, so two writes within the
/// same microsecond would otherwise record the same `updated_at`.
pub fn advance_timestamp(previous: Timestamp) -> Timestamp {
    let now = chrono::Utc::now();
    let floor = previous + chrono::Duration::microseconds(1);
    if now < floor {
        floor
    } else {
        now
    }
}
