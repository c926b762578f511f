//! Decision-and-execution use cases.
//!
//! Three orchestrations over the domain services and ports:
//!
//! * [`EvaluatePosition`]: one evaluation tick: resolve price, run the
//!   trigger → sizer → guardrail pipeline, produce an [`OrderProposal`]
//!   and the tick's [`vbl_domain::EvaluationRecord`].
//! * [`SubmitOrder`]: idempotent order creation with the daily-cap
//!   guardrail and commission-rate snapshot.
//! * [`ExecuteOrder`]: applies a broker fill to the position under the
//!   invariant-preserving state transitions.
//!
//! All wiring is explicit: [`EnginePorts`] bundles the ports, a factory
//! hands them to the use cases, and nothing reads globals.

pub mod error;
pub mod evaluate;
pub mod execute;
pub mod ids;
pub mod submit;
pub mod trace;
pub mod wiring;

pub use error::EngineError;
pub use evaluate::{EvaluatePosition, EvaluationOutcome, OrderProposal, PriceOverride};
pub use execute::{ExecuteOrder, FillOutcome, FillRequest};
pub use ids::{IdGen, SeqIdGen, UuidIdGen};
pub use submit::{SubmitOrder, SubmitRequestBody, SubmitResult};
pub use trace::TraceContext;
pub use wiring::{Engine, EnginePorts};
