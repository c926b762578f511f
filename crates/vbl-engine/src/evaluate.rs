//! One evaluation tick: price → trigger → sizing → guardrails → proposal.
//!
//! Every call produces exactly one [`EvaluationRecord`]. Ticks that end
//! here (HOLD and every SKIP flavor) are appended to the timeline before
//! returning; ticks that produce a BUY/SELL proposal hand the record back
//! to the caller, which completes it (order id, execution details) and
//! appends it (exactly once) when the tick's outcome is known.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use vbl_domain::{
    evaluate_trigger, raw_size, trim_to_bounds, AllocationState, DomainError, EvalAction,
    EvalMode, EvaluationRecord, EventRecord, EventType, OrderSide, Position,
};
use vbl_ports::{Clock, HistoricalBar, MarketData, PriceSource};
use vbl_store::{ConfigRepo, EventsRepo, PositionsRepo, TimelineRepo};

use crate::error::EngineError;
use crate::ids::IdGen;
use crate::trace::TraceContext;
use crate::wiring::EnginePorts;

/// Caller-supplied price, used by the simulation to replay bars. When
/// absent the market-data port resolves the price.
#[derive(Debug, Clone)]
pub struct PriceOverride {
    pub price: Decimal,
    pub source: PriceSource,
    pub bar: Option<HistoricalBar>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Per-share cash dividend going ex on this tick. Credited to the
    /// cash leg before the trigger runs; the anchor is never touched.
    pub dividend: Option<Decimal>,
}

impl PriceOverride {
    pub fn at(price: Decimal, source: PriceSource) -> Self {
        Self {
            price,
            source,
            bar: None,
            timestamp: None,
            dividend: None,
        }
    }
}

/// A sized, trimmed, validated trade intent.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderProposal {
    pub side: OrderSide,
    /// Absolute quantity after trimming and quantization.
    pub qty: Decimal,
    pub notional: Decimal,
    pub commission_estimate: Decimal,
    pub post_trade_pct: Option<Decimal>,
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub action: EvalAction,
    pub reason: Option<String>,
    pub proposal: Option<OrderProposal>,
    pub record: EvaluationRecord,
    /// Whether the record has already been appended to the timeline.
    /// `false` only when a proposal was produced; the caller then owns
    /// the append.
    pub appended: bool,
}

#[derive(Clone)]
pub struct EvaluatePosition {
    ports: EnginePorts,
}

impl EvaluatePosition {
    pub fn new(ports: EnginePorts) -> Self {
        Self { ports }
    }

    /// Run one evaluation tick for a position.
    ///
    /// Fatal failures (missing position/config, math anomalies, store
    /// errors) surface as `Err`; retryable market-data failures downgrade
    /// to a SKIP row so the timeline explains why nothing happened.
    pub fn evaluate(
        &self,
        tenant_id: &str,
        portfolio_id: &str,
        position_id: &str,
        mode: EvalMode,
        price_override: Option<PriceOverride>,
        trace: &mut TraceContext,
    ) -> Result<EvaluationOutcome, EngineError> {
        let mut position = self
            .ports
            .positions
            .get(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::PositionNotFound {
                position_id: position_id.to_string(),
            })?;

        let trigger_cfg = self
            .ports
            .configs
            .trigger_config(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("trigger config for {position_id}"),
            })?;
        let guardrail_cfg = self
            .ports
            .configs
            .guardrail_config(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("guardrail config for {position_id}"),
            })?;
        let policy = self
            .ports
            .configs
            .order_policy(tenant_id, portfolio_id, position_id)
            .ok_or_else(|| DomainError::ConfigurationMissing {
                what: format!("order policy for {position_id}"),
            })?;

        let now = price_override
            .as_ref()
            .and_then(|p| p.timestamp)
            .unwrap_or_else(|| self.ports.clock.now());

        // -------------------------------------------------------------------
        // Ex-date dividend: cash-additive, anchor untouched
        // -------------------------------------------------------------------
        let mut dividend_amount = None;
        if let Some(per_share) = price_override.as_ref().and_then(|p| p.dividend) {
            if per_share > Decimal::ZERO && position.qty > Decimal::ZERO {
                let amount = position.qty * per_share;
                position.apply_dividend(amount, now)?;
                self.ports.positions.save(position.clone());
                self.emit(
                    trace,
                    EventType::DividendPaid,
                    &position,
                    now,
                    format!("dividend {amount} ({per_share}/share)"),
                    json!({"per_share": per_share, "qty": position.qty, "amount": amount}),
                )?;
                dividend_amount = Some(amount);
            }
        }

        // -------------------------------------------------------------------
        // Price resolution
        // -------------------------------------------------------------------
        let (price, source, bar) = match &price_override {
            Some(p) => (p.price, p.source, p.bar.clone()),
            None => match self.ports.market.get_reference_price(&position.asset_symbol) {
                Ok(ref_price) if ref_price.is_fresh => {
                    (ref_price.price, ref_price.source, None)
                }
                Ok(stale) => {
                    warn!(
                        position_id,
                        symbol = %position.asset_symbol,
                        ts = %stale.timestamp,
                        "stale reference price; skipping tick"
                    );
                    return self.skip_without_price(
                        &position, &trigger_cfg, &guardrail_cfg, mode, now,
                        stale.price, "price_stale", trace,
                    );
                }
                Err(DomainError::PriceStale { .. }) => {
                    return self.skip_without_price(
                        &position, &trigger_cfg, &guardrail_cfg, mode, now,
                        Decimal::ZERO, "price_stale", trace,
                    );
                }
                Err(_) => {
                    return self.skip_without_price(
                        &position, &trigger_cfg, &guardrail_cfg, mode, now,
                        Decimal::ZERO, "price_unavailable", trace,
                    );
                }
            },
        };

        if price <= Decimal::ZERO {
            return Err(DomainError::InvalidValue {
                field: "price",
                message: format!("non-positive price {price} for {}", position.asset_symbol),
            }
            .into());
        }

        self.emit(
            trace,
            EventType::PriceEvent,
            &position,
            now,
            format!("{} @ {}", position.asset_symbol, price),
            json!({"price": price, "source": source.as_str()}),
        )?;

        let mut record = EvaluationRecord::base(
            self.ports.ids.record_id(),
            mode,
            now,
            trace.trace_id.clone(),
            &position,
            price,
            trigger_cfg.tau_up,
            trigger_cfg.tau_down,
            guardrail_cfg.min_stock_pct,
            guardrail_cfg.max_stock_pct,
        );
        record.price_source = Some(source.as_str().to_string());
        record.dividend_amount = dividend_amount;
        if let Some(b) = &bar {
            record.open = Some(b.open);
            record.high = Some(b.high);
            record.low = Some(b.low);
            record.close = Some(b.close);
            record.volume = Some(b.volume);
        }

        // -------------------------------------------------------------------
        // Anchor adoption: first usable price becomes the anchor; no trade
        // this tick.
        // -------------------------------------------------------------------
        if position.anchor_price.is_none() {
            position.set_anchor(price, now)?;
            self.ports.positions.save(position.clone());
            self.emit(
                trace,
                EventType::AnchorReset,
                &position,
                now,
                format!("initial anchor {price}"),
                json!({"old": null, "new": price, "reason": "initial"}),
            )?;
            record.anchor_after = Some(price);
            record.anchor_reset = true;
            record.anchor_reset_reason = Some("initial".to_string());
            record.trigger_reason = "no_anchor".to_string();
            return self.finish_hold(record, "anchor_initialized", trace);
        }

        // -------------------------------------------------------------------
        // Trigger
        // -------------------------------------------------------------------
        let decision = evaluate_trigger(
            position.anchor_price,
            price,
            trigger_cfg.tau_up,
            trigger_cfg.tau_down,
        );
        record.delta_pct = decision.delta_pct;
        record.trigger_fired = decision.fired;
        record.trigger_direction = decision.direction;
        record.trigger_reason = decision.reason.to_string();

        self.emit(
            trace,
            EventType::TriggerEvaluated,
            &position,
            now,
            format!("trigger {}: {}", if decision.fired { "fired" } else { "held" }, decision.reason),
            json!({
                "anchor": position.anchor_price,
                "price": price,
                "delta_pct": decision.delta_pct,
                "fired": decision.fired,
                "direction": decision.direction,
                "reason": decision.reason,
            }),
        )?;

        // Anomaly gate: a gap this large is treated as a corporate-action
        // artifact, not a tradeable move. Reset the anchor and hold.
        if let (Some(threshold), Some(delta)) =
            (trigger_cfg.anomaly_reset_pct, decision.delta_pct)
        {
            if delta.abs() > threshold {
                let old = position.anchor_price;
                position.set_anchor(price, now)?;
                self.ports.positions.save(position.clone());
                self.emit(
                    trace,
                    EventType::AnomalyDetected,
                    &position,
                    now,
                    format!("price gap {delta} exceeds {threshold}"),
                    json!({"delta_pct": delta, "threshold": threshold}),
                )?;
                self.emit(
                    trace,
                    EventType::AnchorReset,
                    &position,
                    now,
                    format!("anchor reset on anomaly to {price}"),
                    json!({"old": old, "new": price, "reason": "anomaly_detected"}),
                )?;
                record.anchor_after = Some(price);
                record.anchor_reset = true;
                record.anchor_reset_reason = Some("anomaly_detected".to_string());
                return self.finish_hold(record, "anomaly_detected", trace);
            }
        }

        if !decision.fired {
            return self.finish_hold(record, decision.reason, trace);
        }

        // -------------------------------------------------------------------
        // Sizing
        // -------------------------------------------------------------------
        let anchor = position.anchor_price.expect("anchor checked above");
        let raw = raw_size(
            anchor,
            price,
            position.qty,
            position.cash,
            trigger_cfg.rebalance_ratio,
        )
        .ok_or_else(|| DomainError::InvalidValue {
            field: "raw_size",
            message: format!("no size for anchor {anchor} price {price}"),
        })?;

        let state = AllocationState {
            qty: position.qty,
            cash: position.cash,
        };
        let trim = trim_to_bounds(raw, state, &guardrail_cfg, price);

        // Optional per-trade cap: a single trade may not exceed the
        // configured fraction of the position's total value.
        let mut sized = trim.qty;
        if let Some(max_trade_pct) = guardrail_cfg.max_trade_pct {
            if let Some(limit_qty) =
                (position.total_value(price) * max_trade_pct).checked_div(price)
            {
                if sized.abs() > limit_qty {
                    sized = if sized >= Decimal::ZERO {
                        limit_qty
                    } else {
                        -limit_qty
                    };
                }
            }
        }

        // Order-policy quantization, truncating toward zero.
        let abs_qty = policy.quantize_qty(sized.abs());
        let side = if sized >= Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let notional = abs_qty * price;
        let commission_estimate = notional * policy.commission_rate;

        debug!(
            position_id,
            raw = %raw,
            trimmed = %trim.qty,
            quantized = %abs_qty,
            %side,
            "sized proposal"
        );

        // -------------------------------------------------------------------
        // Below-min and sufficiency gates
        // -------------------------------------------------------------------
        if abs_qty == Decimal::ZERO {
            return self.finish_skip(
                record, &position, now, side, abs_qty, notional,
                "below_min", &guardrail_cfg, trace,
            );
        }
        if let Some(reason) = policy.below_min_reason(abs_qty, price) {
            return self.finish_skip(
                record, &position, now, side, abs_qty, notional,
                reason.code(), &guardrail_cfg, trace,
            );
        }

        if let Err(breach) = vbl_domain::validate_after_fill(
            state,
            side,
            abs_qty,
            price,
            commission_estimate,
            &guardrail_cfg,
        ) {
            return self.finish_skip(
                record, &position, now, side, abs_qty, notional,
                breach.code(), &guardrail_cfg, trace,
            );
        }

        // -------------------------------------------------------------------
        // Proposal
        // -------------------------------------------------------------------
        let signed = match side {
            OrderSide::Buy => abs_qty,
            OrderSide::Sell => -abs_qty,
        };
        let qty_after = position.qty + signed;
        let cash_after = match side {
            OrderSide::Buy => position.cash - notional - commission_estimate,
            OrderSide::Sell => position.cash + notional - commission_estimate,
        };
        let post_trade_pct = vbl_domain::num::stock_pct(qty_after, cash_after, price);

        record.action = match side {
            OrderSide::Buy => EvalAction::Buy,
            OrderSide::Sell => EvalAction::Sell,
        };
        record.side = Some(side);
        record.intended_qty = Some(abs_qty);
        record.intended_value = Some(notional);
        record.qty_after = qty_after;
        record.cash_after = cash_after;
        record.stock_value_after = qty_after * price;
        record.total_value_after = qty_after * price + cash_after;
        record.stock_pct_after = post_trade_pct;

        self.emit(
            trace,
            EventType::GuardrailEvaluated,
            &position,
            now,
            format!("proposal allowed: {side} {abs_qty}"),
            json!({
                "allowed": true,
                "side": side,
                "raw_qty": raw,
                "trimmed": trim.trimmed,
                "trim_reason": trim.reason.map(|r| r.code()),
                "qty": abs_qty,
                "notional": notional,
                "post_trade_pct": post_trade_pct,
            }),
        )?;

        Ok(EvaluationOutcome {
            action: record.action,
            reason: None,
            proposal: Some(OrderProposal {
                side,
                qty: abs_qty,
                notional,
                commission_estimate,
                post_trade_pct,
            }),
            record,
            appended: false,
        })
    }

    /// Append a completed proposal record. Callers invoke this exactly
    /// once per proposal tick after filling in order/execution fields.
    pub fn append_record(&self, record: EvaluationRecord) {
        self.ports.timeline.append(record);
    }

    // -----------------------------------------------------------------------
    // Terminal helpers
    // -----------------------------------------------------------------------

    fn finish_hold(
        &self,
        mut record: EvaluationRecord,
        reason: &str,
        _trace: &mut TraceContext,
    ) -> Result<EvaluationOutcome, EngineError> {
        record.action = EvalAction::Hold;
        if record.block_reason.is_none() && reason != "inside_band" {
            record.block_reason = Some(reason.to_string());
        }
        self.ports.timeline.append(record.clone());
        Ok(EvaluationOutcome {
            action: EvalAction::Hold,
            reason: Some(reason.to_string()),
            proposal: None,
            record,
            appended: true,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_skip(
        &self,
        mut record: EvaluationRecord,
        position: &Position,
        now: DateTime<Utc>,
        side: OrderSide,
        qty: Decimal,
        notional: Decimal,
        reason: &str,
        guardrail_cfg: &vbl_domain::GuardrailConfig,
        trace: &mut TraceContext,
    ) -> Result<EvaluationOutcome, EngineError> {
        record.action = EvalAction::Skip;
        record.side = Some(side);
        record.allowed = false;
        record.block_reason = Some(reason.to_string());
        record.intended_qty = Some(qty);
        record.intended_value = Some(notional);

        self.emit(
            trace,
            EventType::GuardrailEvaluated,
            position,
            now,
            format!("proposal blocked: {reason}"),
            json!({
                "allowed": false,
                "side": side,
                "qty": qty,
                "notional": notional,
                "reason": reason,
                "min_stock_pct": guardrail_cfg.min_stock_pct,
                "max_stock_pct": guardrail_cfg.max_stock_pct,
            }),
        )?;

        self.ports.timeline.append(record.clone());
        Ok(EvaluationOutcome {
            action: EvalAction::Skip,
            reason: Some(reason.to_string()),
            proposal: None,
            record,
            appended: true,
        })
    }

    /// SKIP row for ticks where no usable price exists. `price` may be
    /// zero; the row still documents the attempt.
    #[allow(clippy::too_many_arguments)]
    fn skip_without_price(
        &self,
        position: &Position,
        trigger_cfg: &vbl_domain::TriggerConfig,
        guardrail_cfg: &vbl_domain::GuardrailConfig,
        mode: EvalMode,
        now: DateTime<Utc>,
        price: Decimal,
        reason: &str,
        trace: &mut TraceContext,
    ) -> Result<EvaluationOutcome, EngineError> {
        let mut record = EvaluationRecord::base(
            self.ports.ids.record_id(),
            mode,
            now,
            trace.trace_id.clone(),
            position,
            price,
            trigger_cfg.tau_up,
            trigger_cfg.tau_down,
            guardrail_cfg.min_stock_pct,
            guardrail_cfg.max_stock_pct,
        );
        record.action = EvalAction::Skip;
        record.allowed = false;
        record.block_reason = Some(reason.to_string());
        record.trigger_reason = reason.to_string();
        self.ports.timeline.append(record.clone());
        Ok(EvaluationOutcome {
            action: EvalAction::Skip,
            reason: Some(reason.to_string()),
            proposal: None,
            record,
            appended: true,
        })
    }

    fn emit(
        &self,
        trace: &mut TraceContext,
        event_type: EventType,
        position: &Position,
        now: DateTime<Utc>,
        message: String,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        let ev = EventRecord::new(
            self.ports.ids.event_id(),
            event_type,
            trace.trace_id.clone(),
            "engine",
            message,
            payload,
            now,
        )
        .with_scope(&position.tenant_id, &position.portfolio_id, &position.id)
        .with_asset(&position.asset_symbol);
        self.ports.events.append(trace.chain(ev))?;
        Ok(())
    }
}
