//! Broadcast message rendering: `{{var}}` substitution from accumulated
//! conversation variables, then spintax — `{a|b|c}` picks one alternative
//! at random. Braces without a pipe are left untouched.

use rand::Rng;
use std::collections::BTreeMap;

/// Render a message template against the conversation's variables.
///
/// Unknown variables render as empty strings (a lead must never see raw
/// placeholder syntax); each occurrence is logged as a warning.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> String {
    let substituted = substitute(template, variables);
    spin(&substituted, &mut rand::thread_rng())
}

fn substitute(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("}}") {
            Some(len) => {
                let name = rest[start + 2..start + 2 + len].trim();
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        tracing::warn!(variable = name, "template references unset variable");
                    }
                }
                rest = &rest[start + 2 + len + 2..];
            }
            None => {
                // Unterminated placeholder: emit literally.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand spintax groups. Only single-level groups containing at least
/// one `|` are treated as alternatives.
pub fn spin<R: Rng>(text: &str, rng: &mut R) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        match rest[start + 1..].find('}') {
            Some(len) => {
                let group = &rest[start + 1..start + 1 + len];
                if group.contains('|') {
                    let alternatives: Vec<&str> = group.split('|').collect();
                    let pick = rng.gen_range(0..alternatives.len());
                    out.push_str(alternatives[pick]);
                } else {
                    out.push('{');
                    out.push_str(group);
                    out.push('}');
                }
                rest = &rest[start + 1 + len + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
