//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The free
//! functions in `journal` and `transfer` take an explicit unit of work; the
//! service structs wrap them, one unit of work per call.

mod card;
pub mod expansion;
pub mod journal;
pub mod logging;
pub mod migration;
mod status;
pub mod transfer;
pub mod unit;
mod user;

pub use card::CardService;
pub use expansion::{
    BalanceView, Expandable, Expander, MovementView, TransferView, UserView,
};
pub use journal::{MovementJournal, StagedMovements};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use status::{AuditReport, BalanceDivergence, StatusService, StatusSummary};
pub use transfer::{TransferCoordinator, TransferPolicy};
pub use user::UserService;
