pub mod analytics;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod provider;
pub mod registry;
pub mod warmer;

pub use analytics::{AnalyticsAggregator, DrillDown};
pub use cache::{EventCache, SnapshotCache};
pub use config::Config;
pub use engine::{BookingCoordinator, CoordinatorSettings, EngineError};
pub use ledger::UsageLedger;
pub use registry::{AliasResolver, AliasStore, InMemoryAliasStore};
