//! Application layer containing business logic and shared state.

pub mod codes;
pub mod policy;
pub mod rate_limiter;
pub mod service;
pub mod state;
pub mod worker;

pub use codes::OsRngCodeGenerator;
pub use policy::OtpPolicy;
pub use rate_limiter::OtpRequestLimiter;
pub use service::AuthService;
pub use state::AppState;
pub use worker::{ChallengeReaper, WorkerConfig, spawn_worker};
