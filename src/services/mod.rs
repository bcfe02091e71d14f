//! Service layer for business logic operations.
//!
//! Services encapsulate lifecycle rules and coordinate between the
//! repositories and the executor.

mod schedule_registry;

pub use schedule_registry::ScheduleRegistry;
