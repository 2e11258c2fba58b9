//! Per-key capture state machine.

/// Lifecycle state of one capture key.
///
/// ```text
///            begin_capture            publish / abort
///   Idle ───────────────────▶ Capturing ─────────────────▶ Idle
///                              │    ▲
///                              └────┘ begin_capture (supersedes)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture in flight; the published map (if any) is current.
    #[default]
    Idle,

    /// A capture is in flight.
    ///
    /// `generation` is the latest issued capture for this key. Only a
    /// result carrying this generation may be published.
    Capturing {
        generation: u64,
    },
}

impl CaptureState {
    /// Whether a capture of this key is in flight.
    pub fn is_capturing(&self) -> bool {
        matches!(self, CaptureState::Capturing { .. })
    }

    /// Generation of the in-flight capture, if any.
    pub fn in_flight(&self) -> Option<u64> {
        match *self {
            CaptureState::Capturing { generation } => Some(generation),
            CaptureState::Idle => None,
        }
    }

    /// Whether a completion tagged `generation` may still be published.
    pub fn accepts(&self, generation: u64) -> bool {
        self.in_flight() == Some(generation)
    }
}

/// Generation counter plus state for one capture key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyState {
    pub state: CaptureState,
    /// Last generation issued for this key.
    pub generation: u64,
}

impl KeyState {
    /// Issues a new generation and enters `Capturing`, superseding any
    /// capture already in flight.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.state = CaptureState::Capturing {
            generation: self.generation,
        };
        self.generation
    }

    /// Returns to `Idle` if `generation` is the one in flight.
    ///
    /// Returns false for superseded generations, leaving the newer capture
    /// in flight.
    pub fn finish(&mut self, generation: u64) -> bool {
        if self.state.accepts(generation) {
            self.state = CaptureState::Idle;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let key = KeyState::default();
        assert_eq!(key.state, CaptureState::Idle);
        assert!(!key.state.is_capturing());
        assert_eq!(key.state.in_flight(), None);
    }

    #[test]
    fn begin_then_finish() {
        let mut key = KeyState::default();
        let generation = key.begin();
        assert_eq!(generation, 1);
        assert!(key.state.is_capturing());
        assert!(key.finish(generation));
        assert_eq!(key.state, CaptureState::Idle);
    }

    #[test]
    fn newer_capture_supersedes() {
        let mut key = KeyState::default();
        let first = key.begin();
        let second = key.begin();
        assert!(second > first);

        assert!(!key.finish(first));
        assert_eq!(key.state.in_flight(), Some(second));
        assert!(key.finish(second));
        assert!(!key.finish(second));
    }
}
