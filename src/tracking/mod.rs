//! The per-request click-tracking pipeline and its pure classifiers.

pub mod bot;
pub mod cloaking;
pub mod fingerprint;
pub mod pipeline;
pub mod referrer;
pub mod user_agent;

pub use bot::BotClassifier;
pub use cloaking::resolve_target;
pub use fingerprint::fingerprint;
pub use pipeline::{sanitize_slug, ClickRequest, TrackOutcome, Tracker};
pub use referrer::{infer_source, Confidence, InferredSource};
pub use user_agent::{parse_user_agent, DeviceClass, UserAgentInfo};
