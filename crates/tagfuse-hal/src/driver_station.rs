//! Match information published by the field management system.

use tagfuse_types::Alliance;

/// Source of the current alliance colour.
///
/// The value may change at any time (most notably when the match starts), so
/// callers query it for every decision rather than caching it.
pub trait DriverStation {
    fn alliance(&self) -> Alliance;
}
