//! Frame Cadence Controller: picks I-frames and B-frames.
//!
//! The controller owns one counter, the number of frames until the next
//! mandatory I-frame. It is advanced exactly once per rendered frame and
//! does no GPU work; its decision travels with the parameter snapshot into
//! the kernel dispatch.

use crate::params::CompressionParams;

/// Per-frame encoding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceDecision {
    /// Fully re-derived from Source.
    IFrame,
    /// Predicted from motion-compensated Last and blended with Source.
    BFrame,
}

impl CadenceDecision {
    pub fn is_i_frame(&self) -> bool {
        matches!(self, CadenceDecision::IFrame)
    }
}

impl std::fmt::Display for CadenceDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CadenceDecision::IFrame => write!(f, "I"),
            CadenceDecision::BFrame => write!(f, "B"),
        }
    }
}

/// I/B-frame state machine.
///
/// `remaining == 0` is the AwaitingIFrame state, anything above is a
/// B-frame run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameCadence {
    remaining: u32,
}

impl FrameCadence {
    /// Starts in AwaitingIFrame, so the first frame is always an I-frame.
    pub fn new() -> Self {
        Self { remaining: 0 }
    }

    /// Frames left before the next mandatory I-frame.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Return to the initial state (effect re-initialised or buffers rebuilt).
    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    /// Decide the current frame and step the counter.
    ///
    /// `active_playback` is false whenever motion vectors are unavailable;
    /// every such frame is an I-frame. Without temporal compression there is
    /// nothing to predict from, so I-frames are forced as well.
    pub fn advance(&mut self, params: &CompressionParams, active_playback: bool) -> CadenceDecision {
        let forced = !params.use_temporal;
        if self.remaining == 0 || !active_playback || forced {
            let run = params.num_b_frames.max(0) as u32;
            // With I-frame forcing off the run never counts down, so it must
            // not start at zero or every frame would be an I-frame.
            self.remaining = if params.use_i_frames { run } else { run.max(1) };
            tracing::debug!(remaining = self.remaining, "cadence: I-frame");
            return CadenceDecision::IFrame;
        }

        if params.use_i_frames {
            self.remaining -= 1;
        }
        tracing::debug!(remaining = self.remaining, "cadence: B-frame");
        CadenceDecision::BFrame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temporal(num_b_frames: i32, use_i_frames: bool) -> CompressionParams {
        CompressionParams {
            use_temporal: true,
            use_i_frames,
            num_b_frames,
            ..CompressionParams::default()
        }
    }

    fn run(cadence: &mut FrameCadence, params: &CompressionParams, frames: usize) -> String {
        (0..frames)
            .map(|_| cadence.advance(params, true).to_string())
            .collect()
    }

    #[test]
    fn test_first_decision_is_i_frame() {
        let mut cadence = FrameCadence::new();
        assert_eq!(
            cadence.advance(&temporal(3, true), true),
            CadenceDecision::IFrame
        );
    }

    #[test]
    fn test_eight_b_frames_over_ten_frames() {
        let mut cadence = FrameCadence::new();
        assert_eq!(run(&mut cadence, &temporal(8, true), 10), "IBBBBBBBBI");
    }

    #[test]
    fn test_period_is_n_plus_one() {
        for n in 0..6 {
            let mut cadence = FrameCadence::new();
            let params = temporal(n, true);
            let decisions = run(&mut cadence, &params, 3 * (n as usize + 1));
            let expected: String = (0..3)
                .map(|_| format!("I{}", "B".repeat(n as usize)))
                .collect();
            assert_eq!(decisions, expected, "n = {}", n);
        }
    }

    #[test]
    fn test_negative_b_frames_means_all_i_frames() {
        let mut cadence = FrameCadence::new();
        assert_eq!(run(&mut cadence, &temporal(-4, true), 4), "IIII");
    }

    #[test]
    fn test_without_forcing_never_returns_to_i_frame() {
        for n in 0..5 {
            let mut cadence = FrameCadence::new();
            let params = temporal(n, false);
            assert_eq!(cadence.advance(&params, true), CadenceDecision::IFrame);
            let after_i = cadence.remaining();
            for _ in 0..50 {
                assert_eq!(cadence.advance(&params, true), CadenceDecision::BFrame);
                assert_eq!(cadence.remaining(), after_i);
            }
        }
    }

    #[test]
    fn test_inactive_playback_always_i_frame() {
        let mut cadence = FrameCadence::new();
        let params = temporal(8, true);
        cadence.advance(&params, true);
        assert_eq!(cadence.remaining(), 8);
        for _ in 0..5 {
            assert_eq!(cadence.advance(&params, false), CadenceDecision::IFrame);
            assert_eq!(cadence.remaining(), 8);
        }
    }

    #[test]
    fn test_temporal_disabled_forces_i_frames() {
        let mut cadence = FrameCadence::new();
        let params = CompressionParams {
            use_temporal: false,
            ..temporal(8, true)
        };
        assert_eq!(run(&mut cadence, &params, 5), "IIIII");
    }

    #[test]
    fn test_reset_restarts_with_i_frame() {
        let mut cadence = FrameCadence::new();
        let params = temporal(4, true);
        assert_eq!(run(&mut cadence, &params, 3), "IBB");
        cadence.reset();
        assert_eq!(cadence.remaining(), 0);
        assert_eq!(run(&mut cadence, &params, 2), "IB");
    }
}
