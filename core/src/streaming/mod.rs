//! Paced reveal of a streaming reply.

mod controller;
pub mod render_gate;
pub mod table_detect;

pub use controller::FinishedReply;
pub use controller::TickOutcome;
pub use controller::TypewriterController;
pub use render_gate::RenderGate;
pub use render_gate::RenderMode;
