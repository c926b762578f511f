//! Anchor-relative price trigger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerDirection {
    /// Price rose past the upper threshold: SELL side.
    Up,
    /// Price fell past the lower threshold: BUY side.
    Down,
    None,
}

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDecision {
    pub fired: bool,
    pub direction: TriggerDirection,
    /// (price − anchor) / anchor; `None` without a usable anchor.
    pub delta_pct: Option<Decimal>,
    pub reason: &'static str,
}

/// Evaluate Δ = (price − anchor)/anchor against the thresholds.
///
/// Fires DOWN (BUY) when `Δ ≤ −tau_down`, UP (SELL) when `Δ ≥ +tau_up`;
/// exact equality fires. An unset or non-positive anchor yields
/// `no_anchor` and never fires.
pub fn evaluate_trigger(
    anchor: Option<Decimal>,
    price: Decimal,
    tau_up: Decimal,
    tau_down: Decimal,
) -> TriggerDecision {
    let anchor = match anchor {
        Some(a) if a > Decimal::ZERO => a,
        _ => {
            return TriggerDecision {
                fired: false,
                direction: TriggerDirection::None,
                delta_pct: None,
                reason: "no_anchor",
            }
        }
    };

    let delta = (price - anchor) / anchor;

    if delta >= tau_up {
        TriggerDecision {
            fired: true,
            direction: TriggerDirection::Up,
            delta_pct: Some(delta),
            reason: "threshold_up",
        }
    } else if delta <= -tau_down {
        TriggerDecision {
            fired: true,
            direction: TriggerDirection::Down,
            delta_pct: Some(delta),
            reason: "threshold_down",
        }
    } else {
        TriggerDecision {
            fired: false,
            direction: TriggerDirection::None,
            delta_pct: Some(delta),
            reason: "inside_band",
        }
    }
}
