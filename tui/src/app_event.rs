use chatline_core::RequestId;
use chatline_core::scheduler::TimerId;
use chatline_protocol::HealthStatus;
use chatline_protocol::StopAck;
use chatline_protocol::StreamFrame;

/// Everything background tasks hand back to the UI loop.
#[derive(Debug)]
pub(crate) enum AppEvent {
    Tick(TimerId),

    Frame {
        request: RequestId,
        frame: StreamFrame,
    },

    /// The response body ended without an end marker.
    StreamEnded { request: RequestId },

    StreamFailed { request: RequestId, message: String },

    StopFinished(Result<StopAck, String>),

    HealthChecked(Result<HealthStatus, String>),

    /// A guarded task returned an error or panicked.
    TaskFailed(String),
}
