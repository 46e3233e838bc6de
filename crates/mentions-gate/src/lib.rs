//! Admission control: per-user request rate limits and daily AI token budgets.

pub mod budget;
pub mod calendar;
pub mod error;
pub mod rate;
pub mod store;

pub use budget::{AiBudget, BudgetReservation};
pub use calendar::{local_day_bounds, local_midnight};
pub use error::GateError;
pub use rate::{OperationClass, RateDecision, RateGate, RateLimits};
pub use store::{CounterStore, InProcessCounters, PgCounterStore};
