//! Engine settings: layered YAML + environment overrides.
//!
//! Config files merge in order (later files override earlier via
//! deep-merge), canonicalize to key-sorted compact JSON, and hash with
//! SHA-256 so a run can be pinned to the exact configuration it saw.
//! Decimal values are written as strings in YAML (`cash: "10000"`), which
//! keeps them exact.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

use vbl_domain::canonical::canonical_json;
use vbl_domain::{GuardrailConfig, OrderPolicyConfig, TriggerConfig};

// ---------------------------------------------------------------------------
// Backend selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerSelector {
    Stub,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSelector {
    System,
    Deterministic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketDataSelector {
    Live,
    Deterministic,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// One monitored position as declared in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSpec {
    pub tenant_id: String,
    pub portfolio_id: String,
    pub position_id: String,
    pub symbol: String,
    pub cash: Decimal,
    #[serde(default)]
    pub anchor: Option<Decimal>,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub order_policy: OrderPolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub broker: BrokerSelector,
    pub clock: ClockSelector,
    pub market_data: MarketDataSelector,
    pub tick_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub io_timeout_ms: u64,
    pub audit_path: Option<PathBuf>,
    pub audit_hash_chain: bool,
    pub positions: Vec<PositionSpec>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            broker: BrokerSelector::Stub,
            clock: ClockSelector::System,
            market_data: MarketDataSelector::Deterministic,
            tick_interval_secs: 60,
            reconcile_interval_secs: 30,
            io_timeout_ms: 5_000,
            audit_path: None,
            audit_hash_chain: true,
            positions: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Validate positions and policy configs; selectors are enforced at
    /// wiring time (where the missing adapter is actually needed).
    pub fn validate(&self) -> Result<()> {
        for spec in &self.positions {
            spec.trigger
                .validate()
                .with_context(|| format!("position {}: trigger", spec.position_id))?;
            spec.guardrail
                .validate()
                .with_context(|| format!("position {}: guardrail", spec.position_id))?;
            spec.order_policy
                .validate()
                .with_context(|| format!("position {}: order policy", spec.position_id))?;
            if spec.cash < Decimal::ZERO {
                bail!("position {}: cash must be >= 0", spec.position_id);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: EngineSettings,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + merge YAML files in order, then canonicalize, hash and
/// deserialize into [`EngineSettings`].
///
/// Every file's root must be a mapping; later files overlay earlier ones
/// key by key (nested mappings merge recursively, everything else is
/// replaced wholesale).
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedSettings> {
    let mut merged: Map<String, Value> = Map::new();

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        match json_val {
            Value::Object(layer) => overlay(&mut merged, layer),
            Value::Null => {} // empty file: nothing to overlay
            other => bail!(
                "config root in {p} must be a mapping, found {}",
                value_kind(&other)
            ),
        }
    }

    let canonical = canonical_json(&merged).context("canonicalize merged config")?;
    let config_hash = hex::encode(Sha256::digest(canonical.as_bytes()));

    let settings: EngineSettings = serde_json::from_value(Value::Object(merged))
        .context("settings deserialization failed")?;
    settings.validate()?;

    Ok(LoadedSettings {
        settings,
        canonical_json: canonical,
        config_hash,
    })
}

/// Apply `VBL_*` environment overrides. `vars` is injectable for tests;
/// production callers pass `std::env::vars()`.
pub fn apply_env_overrides(
    settings: &mut EngineSettings,
    vars: impl Iterator<Item = (String, String)>,
) -> Result<()> {
    for (key, value) in vars {
        match key.as_str() {
            "VBL_BROKER" => {
                settings.broker = match value.as_str() {
                    "stub" => BrokerSelector::Stub,
                    "real" => BrokerSelector::Real,
                    other => bail!("VBL_BROKER: unknown selector {other:?}"),
                }
            }
            "VBL_CLOCK" => {
                settings.clock = match value.as_str() {
                    "system" => ClockSelector::System,
                    "deterministic" => ClockSelector::Deterministic,
                    other => bail!("VBL_CLOCK: unknown selector {other:?}"),
                }
            }
            "VBL_MARKET_DATA" => {
                settings.market_data = match value.as_str() {
                    "live" => MarketDataSelector::Live,
                    "deterministic" => MarketDataSelector::Deterministic,
                    other => bail!("VBL_MARKET_DATA: unknown selector {other:?}"),
                }
            }
            "VBL_TICK_INTERVAL_SECS" => {
                settings.tick_interval_secs = value
                    .parse()
                    .with_context(|| format!("VBL_TICK_INTERVAL_SECS: {value:?}"))?;
            }
            "VBL_IO_TIMEOUT_MS" => {
                settings.io_timeout_ms = value
                    .parse()
                    .with_context(|| format!("VBL_IO_TIMEOUT_MS: {value:?}"))?;
            }
            "VBL_AUDIT_PATH" => {
                settings.audit_path = Some(PathBuf::from(value));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Overlay one config layer onto the accumulated base, key by key.
/// Mapping-onto-mapping recurses; any other combination (scalar, array,
/// null, or a type change) replaces the base entry outright.
fn overlay(base: &mut Map<String, Value>, layer: Map<String, Value>) {
    for (key, incoming) in layer {
        let nested = incoming.is_object()
            && matches!(base.get(&key), Some(Value::Object(_)));
        if nested {
            if let (Some(Value::Object(existing)), Value::Object(patch)) =
                (base.get_mut(&key), incoming)
            {
                overlay(existing, patch);
            }
        } else {
            base.insert(key, incoming);
        }
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    const BASE: &str = r#"
broker: stub
tick_interval_secs: 60
positions:
  - tenant_id: t1
    portfolio_id: pf1
    position_id: pos1
    symbol: AAPL
    cash: "10000"
"#;

    const OVERLAY: &str = r#"
tick_interval_secs: 15
"#;

    #[test]
    fn loads_and_merges_layers() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(&dir, "base.yaml", BASE);
        let overlay = write_file(&dir, "overlay.yaml", OVERLAY);

        let loaded = load_layered_yaml(&[&base, &overlay]).unwrap();
        assert_eq!(loaded.settings.tick_interval_secs, 15);
        assert_eq!(loaded.settings.positions.len(), 1);
        assert_eq!(loaded.settings.positions[0].cash, dec!(10000));
        // Defaults fill unspecified policies.
        assert_eq!(loaded.settings.positions[0].trigger, TriggerConfig::default());
    }

    #[test]
    fn hash_is_stable_and_order_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(&dir, "base.yaml", BASE);
        let overlay = write_file(&dir, "overlay.yaml", OVERLAY);

        let a = load_layered_yaml(&[&base, &overlay]).unwrap();
        let b = load_layered_yaml(&[&base, &overlay]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);

        let base_only = load_layered_yaml(&[&base]).unwrap();
        assert_ne!(a.config_hash, base_only.config_hash);
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(&dir, "bad.yaml", "- just\n- a\n- list\n");
        let err = load_layered_yaml(&[&bad]).unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn empty_overlay_changes_nothing_but_the_hash_input() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(&dir, "base.yaml", BASE);
        let empty = write_file(&dir, "empty.yaml", "");

        let with_empty = load_layered_yaml(&[&base, &empty]).unwrap();
        let alone = load_layered_yaml(&[&base]).unwrap();
        assert_eq!(with_empty.settings, alone.settings);
        assert_eq!(with_empty.canonical_json, alone.canonical_json);
    }

    #[test]
    fn invalid_position_config_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(
            &dir,
            "bad.yaml",
            r#"
positions:
  - tenant_id: t1
    portfolio_id: pf1
    position_id: pos1
    symbol: AAPL
    cash: "100"
    guardrail:
      min_stock_pct: "0.9"
      max_stock_pct: "0.2"
      max_orders_per_day: 5
"#,
        );
        assert!(load_layered_yaml(&[&bad]).is_err());
    }

    #[test]
    fn env_overrides_apply_and_reject_unknown_selectors() {
        let mut settings = EngineSettings::default();
        apply_env_overrides(
            &mut settings,
            vec![
                ("VBL_BROKER".to_string(), "stub".to_string()),
                ("VBL_CLOCK".to_string(), "deterministic".to_string()),
                ("VBL_TICK_INTERVAL_SECS".to_string(), "5".to_string()),
                ("UNRELATED".to_string(), "ignored".to_string()),
            ]
            .into_iter(),
        )
        .unwrap();
        assert_eq!(settings.clock, ClockSelector::Deterministic);
        assert_eq!(settings.tick_interval_secs, 5);

        let err = apply_env_overrides(
            &mut settings,
            vec![("VBL_BROKER".to_string(), "alpaca".to_string())].into_iter(),
        );
        assert!(err.is_err());
    }
}
