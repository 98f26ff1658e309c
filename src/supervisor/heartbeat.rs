//! Rotating idle indicator for a silent but live child.

use std::time::Duration;

/// Silence window after which the indicator starts spinning.
pub const HEARTBEAT_AFTER: Duration = Duration::from_secs(5);

const FRAMES: [char; 4] = ['-', '\\', '|', '/'];

/// Animation state for the idle indicator. Purely cosmetic: it never
/// touches the progress percentages.
#[derive(Debug, Default)]
pub struct Heartbeat {
    frame: usize,
    visible: bool,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the animation and return the frame to display.
    pub fn next_frame(&mut self) -> char {
        let frame = FRAMES[self.frame];
        self.frame = (self.frame + 1) % FRAMES.len();
        self.visible = true;
        frame
    }

    /// Whether an indicator is currently on screen and needs clearing.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Mark the indicator as cleared (real output arrived or the child
    /// exited).
    pub fn reset(&mut self) {
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_rotate_through_the_spinner_characters() {
        let mut heartbeat = Heartbeat::new();
        let frames: Vec<char> = (0..5).map(|_| heartbeat.next_frame()).collect();
        assert_eq!(frames, vec!['-', '\\', '|', '/', '-']);
    }

    #[test]
    fn visibility_tracks_display_and_reset() {
        let mut heartbeat = Heartbeat::new();
        assert!(!heartbeat.is_visible());
        heartbeat.next_frame();
        assert!(heartbeat.is_visible());
        heartbeat.reset();
        assert!(!heartbeat.is_visible());
    }
}
