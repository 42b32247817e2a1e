use linkwatch_decode::{ErrorSource, LineError};

/// Transition on the companion activity input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    DataReceived,
    FramingError,
    Overrun,
    BreakDetected,
    Pulse(Edge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DataReceived,
    FramingError,
    Overrun,
    BreakDetected,
    Pulse,
}

impl LinkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DataReceived => EventKind::DataReceived,
            Self::FramingError => EventKind::FramingError,
            Self::Overrun => EventKind::Overrun,
            Self::BreakDetected => EventKind::BreakDetected,
            Self::Pulse(_) => EventKind::Pulse,
        }
    }

    /// Events for each fault set in a hardware error-source mask. Parity is not reported.
    ///
    /// [`Runtime::report_line_errors`](crate::Runtime::report_line_errors) dispatches these.
    pub fn from_error_source(src: ErrorSource) -> Vec<LinkEvent> {
        src.errors()
            .filter_map(|error| match error {
                LineError::Overrun => Some(Self::Overrun),
                LineError::Framing => Some(Self::FramingError),
                LineError::Break => Some(Self::BreakDetected),
                LineError::Parity => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_source_maps_to_events() {
        let events = LinkEvent::from_error_source(ErrorSource(0b1111));
        assert_eq!(
            events,
            vec![LinkEvent::Overrun, LinkEvent::FramingError, LinkEvent::BreakDetected]
        );
        assert!(LinkEvent::from_error_source(ErrorSource(0b0010)).is_empty());
    }

    #[test]
    fn pulse_edges_share_a_kind() {
        assert_eq!(LinkEvent::Pulse(Edge::Rising).kind(), EventKind::Pulse);
        assert_eq!(LinkEvent::Pulse(Edge::Falling).kind(), EventKind::Pulse);
    }
}
