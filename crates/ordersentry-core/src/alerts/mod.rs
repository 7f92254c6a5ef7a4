//! Alert model, persistence, and lifecycle.

mod lifecycle;
mod model;
mod repository;

pub use lifecycle::{AlertLifecycleManager, CycleReport, EscalationOutcome};
pub use model::{Alert, AlertStatus, AlertType, NewAlert, ResolvedBy};
pub use repository::AlertRepository;
