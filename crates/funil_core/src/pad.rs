//! PAD emotional model (Pleasure-Arousal-Dominance).
//!
//! Instead of discrete emotion labels, the lead's state is a continuous
//! point in a 3D space. Each axis is bipolar in [-1.0, 1.0]. The estimate
//! steers agent-node prompts: quantized bands index a fixed instruction
//! table, and the derived directive is injected into every subsequent
//! agentic prompt for the chat until the state changes again.

use serde::{Deserialize, Deserializer, Serialize};

/// Guard against NaN/Inf sneaking in through persisted JSON.
/// Non-finite values reset to the neutral baseline.
pub fn deserialize_safe_axis<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f32::deserialize(deserializer)?;
    if v.is_finite() {
        Ok(v.clamp(-1.0, 1.0))
    } else {
        tracing::warn!("non-finite PAD axis in stored state, resetting to 0.0");
        Ok(0.0)
    }
}

/// Pleasure-Arousal-Dominance triple, each axis in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    /// Displeasure ↔ pleasure.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub pleasure: f32,
    /// Calm ↔ activated.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub arousal: f32,
    /// Submissive ↔ in control.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub dominance: f32,
}

impl Default for Pad {
    fn default() -> Self {
        Self {
            pleasure: 0.0,
            arousal: 0.0,
            dominance: 0.0,
        }
    }
}

/// Discrete band for one axis: the [-1, 1] range is projected onto [0, 1]
/// and cut at 0.3 and 0.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Low,
    Medium,
    High,
}

impl Band {
    pub fn of(axis: f32) -> Band {
        let unit = (axis.clamp(-1.0, 1.0) + 1.0) / 2.0;
        if unit < 0.3 {
            Band::Low
        } else if unit <= 0.7 {
            Band::Medium
        } else {
            Band::High
        }
    }
}

impl Pad {
    pub fn new(pleasure: f32, arousal: f32, dominance: f32) -> Self {
        Self {
            pleasure: pleasure.clamp(-1.0, 1.0),
            arousal: arousal.clamp(-1.0, 1.0),
            dominance: dominance.clamp(-1.0, 1.0),
        }
    }

    /// Interpolate toward another estimate (emotional inertia).
    pub fn lerp(&self, other: &Pad, t: f32) -> Pad {
        let t = t.clamp(0.0, 1.0);
        Pad::new(
            self.pleasure + (other.pleasure - self.pleasure) * t,
            self.arousal + (other.arousal - self.arousal) * t,
            self.dominance + (other.dominance - self.dominance) * t,
        )
    }

    pub fn bands(&self) -> (Band, Band, Band) {
        (
            Band::of(self.pleasure),
            Band::of(self.arousal),
            Band::of(self.dominance),
        )
    }

    /// Fixed instruction table keyed by band combination. First match wins;
    /// a fully medium state injects nothing.
    pub fn instruction(&self) -> Option<&'static str> {
        let (p, a, d) = self.bands();
        match (p, a, d) {
            (Band::Low, Band::High, _) => Some(
                "The lead sounds agitated. De-escalate: acknowledge the frustration, \
                 keep sentences short and do not push the offer.",
            ),
            (Band::Low, _, _) => Some(
                "The lead sounds unhappy. Lead with empathy and address the concern \
                 before advancing the conversation.",
            ),
            (Band::High, Band::High, _) => Some(
                "The lead is enthusiastic and highly engaged. Match the energy and \
                 move the conversation forward.",
            ),
            (_, Band::Low, _) => Some(
                "The lead sounds disengaged. Keep replies brief and end with exactly \
                 one clear question.",
            ),
            (_, _, Band::High) => {
                Some("The lead wants to drive. Offer options instead of instructions.")
            }
            (_, _, Band::Low) => Some(
                "The lead is hesitant. Be reassuring and propose the next step \
                 explicitly.",
            ),
            _ => None,
        }
    }

    /// Short human-readable summary, used in audit logs.
    pub fn describe(&self) -> String {
        format!(
            "P={:+.2} A={:+.2} D={:+.2}",
            self.pleasure, self.arousal, self.dominance
        )
    }
}
