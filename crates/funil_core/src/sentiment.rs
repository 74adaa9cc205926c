//! Keyword-based Portuguese/English sentiment heuristics.
//!
//! Lightweight signal source for the emotional state estimator when no
//! agent-node output is available. In production this should be replaced
//! with a proper model.

const POSITIVE: &[&str] = &[
    "obrigado", "obrigada", "ótimo", "otimo", "legal", "perfeito", "adorei", "quero", "top",
    "show", "maravilha", "great", "thanks", "love", "perfect", "yes", "😊", "❤️", "👍",
];

const NEGATIVE: &[&str] = &[
    "caro", "ruim", "péssimo", "pessimo", "cancelar", "odeio", "problema", "demora", "absurdo",
    "nunca", "bad", "hate", "expensive", "cancel", "awful", "😡", "😢", "💔",
];

const INTENSE: &[&str] = &[
    "muito", "demais", "super", "urgente", "agora", "já", "ja", "very", "really", "now", "!",
    "?!",
];

/// Markers that the lead is taking charge of the conversation.
const ASSERTIVE: &[&str] = &[
    "quero", "preciso", "manda", "me envia", "need", "send me", "want",
];

/// Analyze text for emotional signals.
///
/// Returns `(valence, intensity, assertiveness)` where:
/// - `valence` is in `[-1.0, 1.0]` (negative to positive)
/// - `intensity` is in `[0.1, 1.0]`
/// - `assertiveness` is in `[0.0, 1.0]`
pub fn analyze_sentiment(text: &str) -> (f32, f32, f32) {
    let text = text.to_lowercase();
    let pos = POSITIVE.iter().filter(|w| text.contains(*w)).count() as f32;
    let neg = NEGATIVE.iter().filter(|w| text.contains(*w)).count() as f32;
    let int = INTENSE.iter().filter(|w| text.contains(*w)).count() as f32;
    let assertive = ASSERTIVE.iter().filter(|w| text.contains(*w)).count() as f32;

    let valence = (pos - neg) / (pos + neg + 1.0);
    let intensity = ((pos + neg + int) / 5.0).clamp(0.1, 1.0);
    let assertiveness = (assertive / 2.0).clamp(0.0, 1.0);

    (valence, intensity, assertiveness)
}

/// True when the text carries no usable emotional signal, in which case
/// the estimator holds its previous estimate.
pub fn is_neutral(valence: f32, intensity: f32) -> bool {
    valence.abs() < f32::EPSILON && intensity <= 0.1 + f32::EPSILON
}
