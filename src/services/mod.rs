//! Business logic: sync passes, the scheduler, cleaning, and the outbox.

pub mod outbox;
pub mod sync;
