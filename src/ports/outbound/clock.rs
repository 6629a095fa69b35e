use chrono::{DateTime, Utc};

/// Clock port; orchestration reads time only through it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
