//! Streaming chat pipeline: decodes the response stream into frames,
//! accumulates the reply, and reveals it through a paced typewriter that
//! decides per step between plain and markdown presentation.
//!
//! Nothing in this crate draws to a screen or owns a clock. Display goes
//! through [`surface::ChatSurface`] and pacing through
//! [`scheduler::TickScheduler`], so a front end supplies both.

pub mod accumulator;
pub mod chat;
pub mod config;
pub mod decoder;
pub mod error;
pub mod frame_stream;
pub mod history;
pub mod scheduler;
pub mod session;
pub mod streaming;
pub mod surface;
pub mod transport;

pub use chat::ChatSession;
pub use chat::OutgoingRequest;
pub use chat::RequestId;
pub use chat::StopDirective;
pub use config::Config;
pub use session::SessionId;
