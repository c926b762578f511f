//! Core domain for the volatility-rebalancing engine.
//!
//! Everything in this crate is deterministic and IO-free: entities carry
//! their invariants in constructors and mutation methods, and the decision
//! services ([`trigger`], [`sizer`], [`guardrail`]) are pure functions of
//! their inputs. Clocks, market data, brokers and persistence live behind
//! ports in sibling crates.

pub mod canonical;
pub mod config;
pub mod errors;
pub mod evaluation;
pub mod event;
pub mod guardrail;
pub mod num;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod sizer;
pub mod trade;
pub mod trigger;

pub use config::{ActionBelowMin, GuardrailConfig, OrderPolicyConfig, TriggerConfig};
pub use errors::{BreachReason, DomainError};
pub use evaluation::{EvalAction, EvalMode, EvaluationRecord};
pub use event::{EventRecord, EventType};
pub use guardrail::{validate_after_fill, trim_to_bounds, AllocationState, TrimOutcome};
pub use order::{Order, OrderSide, OrderStatus, TransitionError};
pub use portfolio::{Portfolio, TradingHoursPolicy, TradingState};
pub use position::Position;
pub use sizer::raw_size;
pub use trade::Trade;
pub use trigger::{evaluate_trigger, TriggerDecision, TriggerDirection};
