//! Emotional state estimation.
//!
//! Updates the per-chat PAD estimate from lightweight sentiment signals
//! on the inbound text, blended with inertia so the estimate has
//! momentum rather than snapping turn to turn. The estimator never
//! blocks and never fails — on insufficient signal it holds the
//! previous estimate.

use funil_core::pad::Pad;
use funil_core::sentiment::{analyze_sentiment, is_neutral};

pub struct EmotionalEstimator {
    /// Blend factor toward the new signal (0.0 = frozen, 1.0 = instant).
    smoothing: f32,
}

impl Default for EmotionalEstimator {
    fn default() -> Self {
        Self { smoothing: 0.35 }
    }
}

impl EmotionalEstimator {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    /// Produce the next estimate from the previous one and the latest
    /// inbound text.
    pub fn update(&self, previous: &Pad, inbound_text: &str) -> Pad {
        let (valence, intensity, assertiveness) = analyze_sentiment(inbound_text);
        if is_neutral(valence, intensity) {
            return *previous;
        }

        let target = Pad::new(
            valence,
            // Intensity [0.1, 1.0] maps onto the bipolar arousal axis.
            intensity * 2.0 - 1.0,
            assertiveness * 2.0 - 1.0,
        );
        let next = previous.lerp(&target, self.smoothing);
        tracing::trace!(
            previous = %previous.describe(),
            next = %next.describe(),
            "updated emotional estimate"
        );
        next
    }

    /// The prompt directive derived from the current estimate, if any.
    pub fn instruction(&self, pad: &Pad) -> Option<&'static str> {
        pad.instruction()
    }
}
