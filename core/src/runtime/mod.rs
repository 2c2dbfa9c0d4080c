//! Game runtime: instances, collaborators and the orchestrator.

mod instance;
mod orchestrator;
mod services;


pub use instance::{GameInstance, LifecycleState};
pub use orchestrator::{LoadOptions, Orchestrator};
pub use services::{
    BettingService, FailureAction, FailurePanel, GameSummary, HeadlessSurface, HostSurface,
    LocalBetting,
};
