//! Field-name constants for structured `tracing` events.

pub const EVENT: &str = "event";
pub const URL: &str = "url";
pub const KEY: &str = "key";
pub const STATUS_CODE: &str = "status_code";
pub const BYTES: &str = "bytes";
pub const RANGE: &str = "range";
pub const SIZE: &str = "size";
