//! Coach Flux - Behavioral-signal pipeline for conversational coaching
//!
//! Flux turns free-form user messages into stored behavioral signals and,
//! on request, a structured action plan:
//! redaction → classification → bounded session storage → plan synthesis.
//!
//! ## Modules
//!
//! - **Redaction**: Strip emails, phone numbers, ids, names and addresses
//! - **Classifiers**: Three rule-table classifiers sharing one scoring function
//! - **Store**: Capped, TTL-bounded per-session events and plans
//! - **Admission**: Session identity resolution and fixed-window rate limiting
//! - **Synthesis**: Prompt rendering, generative backend call and reply parsing

pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod rate_limit;
pub mod redact;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod types;

pub use classifier::{classify, ClassifierSet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoachConfig;
pub use error::CoachError;
pub use notify::{PipelineNotice, PipelineObserver, TracingObserver};
pub use pipeline::{CoachProcessor, IngestOutcome, SweeperHandle};
pub use rate_limit::{RateDecision, RateLimiter};
pub use redact::redact;
pub use session::{resolve_session, IdentityHints};
pub use store::EventStore;
pub use synthesis::{GenerativeBackend, PlanSynthesizer};
pub use types::{Action, Analysis, ClassifierId, Event, Plan, Session, Tag, TagKind};

/// Crate version reported by the CLI
pub const COACH_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in reports
pub const PRODUCER_NAME: &str = "coach-flux";
