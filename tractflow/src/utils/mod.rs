//! Small shared helpers for timestamps and durations.

pub mod timestamps;

pub use timestamps::{format_duration, format_iso8601, iso_timestamp, Timestamp};
