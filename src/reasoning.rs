//! Reasoning-level mapping
//!
//! Requests carry a backend-independent reasoning level from 0 (none) to 4
//! (maximum). Each backend understands a different dial: Claude models take a
//! thinking-token budget, Codex models take a named effort tier. Levels above
//! a model's ceiling are rejected up front, never clamped.

use crate::error::{GatewayError, GatewayResult};
use crate::providers::ProviderKind;

/// Backend-specific rendering of a reasoning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningUnit {
    /// Thinking-token budget (Claude).
    TokenBudget(u32),
    /// Named effort tier (Codex).
    Effort(&'static str),
}

/// Thinking budgets for Claude levels 1..=4.
const CLAUDE_BUDGETS: [u32; 4] = [4_000, 10_000, 16_000, 32_000];

/// Effort tiers for Codex levels 1..=4.
const CODEX_EFFORTS: [&str; 4] = ["minimal", "low", "medium", "high"];

/// Highest supported level for a model, or None if the model is unknown.
fn max_level(provider: ProviderKind, model: &str) -> Option<u8> {
    match provider {
        ProviderKind::Claude => {
            if model.contains("opus") || model.contains("sonnet") {
                Some(4)
            } else if model.contains("haiku") {
                Some(0)
            } else {
                None
            }
        }
        ProviderKind::Codex => {
            if model == "codex-mini-latest" {
                Some(2)
            } else if model.starts_with("gpt-5") {
                Some(4)
            } else {
                None
            }
        }
    }
}

/// Reject levels outside 0..=4 and levels above the model's ceiling.
///
/// Unknown models accept only level 0.
pub fn validate(provider: ProviderKind, model: &str, level: u8) -> GatewayResult<()> {
    if level > 4 {
        return Err(GatewayError::Validation(format!(
            "Reasoning level {level} is out of range (0-4)"
        )));
    }
    if level == 0 {
        return Ok(());
    }
    match max_level(provider, model) {
        Some(max) if level <= max => Ok(()),
        Some(max) => Err(GatewayError::Validation(format!(
            "Model {model} supports reasoning levels up to {max}, got {level}"
        ))),
        None => Err(GatewayError::Validation(format!(
            "Model {model} does not support reasoning levels"
        ))),
    }
}

/// Map a validated level to the backend's dial. Level 0 maps to nothing.
pub fn resolve(provider: ProviderKind, model: &str, level: u8) -> Option<ReasoningUnit> {
    if level == 0 || level > 4 {
        return None;
    }
    max_level(provider, model)?;
    let index = usize::from(level - 1);
    match provider {
        ProviderKind::Claude => Some(ReasoningUnit::TokenBudget(CLAUDE_BUDGETS[index])),
        ProviderKind::Codex => Some(ReasoningUnit::Effort(CODEX_EFFORTS[index])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_claude_levels_map_to_budgets() {
        assert_eq!(
            resolve(ProviderKind::Claude, "claude-sonnet-4", 1),
            Some(ReasoningUnit::TokenBudget(4_000))
        );
        assert_eq!(
            resolve(ProviderKind::Claude, "opus", 4),
            Some(ReasoningUnit::TokenBudget(32_000))
        );
    }

    #[test]
    fn test_codex_levels_map_to_efforts() {
        assert_eq!(
            resolve(ProviderKind::Codex, "gpt-5-codex", 1),
            Some(ReasoningUnit::Effort("minimal"))
        );
        assert_eq!(
            resolve(ProviderKind::Codex, "gpt-5", 4),
            Some(ReasoningUnit::Effort("high"))
        );
    }

    #[test]
    fn test_level_zero_maps_to_nothing() {
        assert_eq!(resolve(ProviderKind::Claude, "sonnet", 0), None);
        assert!(validate(ProviderKind::Claude, "sonnet", 0).is_ok());
        // Level 0 is valid even for models without reasoning support.
        assert!(validate(ProviderKind::Claude, "haiku", 0).is_ok());
        assert!(validate(ProviderKind::Codex, "some-future-model", 0).is_ok());
    }

    #[test]
    fn test_levels_above_ceiling_are_rejected_not_clamped() {
        assert!(matches!(
            validate(ProviderKind::Codex, "codex-mini-latest", 3),
            Err(GatewayError::Validation(_))
        ));
        assert!(validate(ProviderKind::Codex, "codex-mini-latest", 2).is_ok());
        assert!(matches!(
            validate(ProviderKind::Claude, "haiku", 1),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_model_rejects_nonzero_levels() {
        assert!(matches!(
            validate(ProviderKind::Claude, "mystery-model", 2),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_out_of_range_level() {
        assert!(matches!(
            validate(ProviderKind::Claude, "sonnet", 5),
            Err(GatewayError::Validation(_))
        ));
    }
}
