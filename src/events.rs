//! Event types for PetalStream

use crate::device::BufferHandle;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The source ran out and the last queued buffer has played
    Finished {
        session: Uuid,
    },
    /// A looping source wrapped back to its first frame
    Looped {
        session: Uuid,
        loop_count: u32,
    },
    /// The device stopped with buffers still queued and was restarted
    UnderrunRecovered {
        queued: usize,
    },
    /// The device rejected a filled buffer; it is resubmitted next tick
    SubmitFailed {
        handle: BufferHandle,
        error: String,
    },
}

impl StreamEvent {
    pub fn session(&self) -> Option<Uuid> {
        match self {
            Self::Finished { session } | Self::Looped { session, .. } => Some(*session),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UnderrunRecovered { .. } | Self::SubmitFailed { .. }
        )
    }
}

/// What one call to `tick()` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Buffers the device reported finished and handed back
    pub reclaimed: usize,
    /// Buffers filled and queued on the device
    pub submitted: usize,
    pub events: Vec<StreamEvent>,
}

impl TickReport {
    pub fn finished(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, StreamEvent::Finished { .. }))
    }
}
