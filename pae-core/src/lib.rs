pub mod config;
pub mod correlation;
pub mod eapol_session;
pub mod error;
pub mod session;
pub mod state_machine;

pub use config::{Config, LogLevel};
pub use correlation::{CorrelationTable, PendingRequest, Sweep};
pub use eapol_session::{EapolSession, EapolSessionFactory, EapolState};
pub use error::CoreError;
pub use session::SessionManager;
pub use state_machine::{
    AuthHandler, EapOutput, Event, OutputQueues, RadiusOutput, StateMachine, StateMachineFactory,
};
