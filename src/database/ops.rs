//! Database operations organized by entity type

mod categories;
mod downloads;
mod favorites;
mod tracks;

pub use categories::*;
pub use downloads::*;
pub use favorites::*;
pub use tracks::*;

use chrono::{DateTime, Utc};

/// Current time as stored in timestamp columns
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

