//! Wire types shared between the chat transport and the streaming pipeline.

mod frame;
mod models;

pub use frame::FramePayload;
pub use frame::StreamFrame;
pub use frame::DONE_SENTINEL;
pub use frame::FRAME_PREFIX;
pub use models::ChatRequest;
pub use models::ChatTurn;
pub use models::HealthStatus;
pub use models::Role;
pub use models::StopAck;
