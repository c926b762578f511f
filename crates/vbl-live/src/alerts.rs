//! Operational alerting: periodic invariant checks with auto-resolve.
//!
//! Each condition holds at most one active alert. A check that finds the
//! condition true while an alert is already active returns nothing new; a
//! check that finds it cleared resolves the active alert.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vbl_ports::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    WorkerStopped,
    NoEvaluations,
    OrderRejected,
    GuardrailSkips,
    PriceDataStale,
    BrokerUnreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub condition: AlertCondition,
    pub severity: AlertSeverity,
    pub title: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

pub trait AlertsRepo: Send + Sync {
    fn save(&self, alert: Alert);
    fn find_active_by_condition(&self, condition: AlertCondition) -> Option<Alert>;
    fn list_active(&self) -> Vec<Alert>;
    fn list_all(&self) -> Vec<Alert>;
}

#[derive(Default)]
pub struct InMemoryAlertsRepo {
    inner: Mutex<BTreeMap<String, Alert>>,
}

impl InMemoryAlertsRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertsRepo for InMemoryAlertsRepo {
    fn save(&self, alert: Alert) {
        self.inner
            .lock()
            .expect("alerts lock poisoned")
            .insert(alert.id.clone(), alert);
    }

    fn find_active_by_condition(&self, condition: AlertCondition) -> Option<Alert> {
        self.inner
            .lock()
            .expect("alerts lock poisoned")
            .values()
            .find(|a| a.condition == condition && a.is_active())
            .cloned()
    }

    fn list_active(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .expect("alerts lock poisoned")
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    fn list_all(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .expect("alerts lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

/// Point-in-time observations the checker evaluates.
#[derive(Debug, Clone, Default)]
pub struct AlertInputs {
    pub worker_running: bool,
    pub worker_enabled: bool,
    pub last_evaluation_time: Option<DateTime<Utc>>,
    pub is_market_hours: bool,
    pub recent_order_rejections: u64,
    pub recent_guardrail_skips: u64,
    pub last_price_update: Option<DateTime<Utc>>,
    pub broker_reachable: bool,
}

pub struct AlertChecker {
    repo: Arc<dyn AlertsRepo>,
    clock: Arc<dyn Clock>,
    pub no_eval_minutes: i64,
    pub guardrail_skip_threshold: u64,
    pub price_stale_minutes: i64,
    seq: Mutex<u64>,
}

impl AlertChecker {
    pub fn new(repo: Arc<dyn AlertsRepo>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            no_eval_minutes: 10,
            guardrail_skip_threshold: 5,
            price_stale_minutes: 5,
            seq: Mutex::new(0),
        }
    }

    /// Run every check; returns only newly raised alerts.
    pub fn run_all_checks(&self, inputs: &AlertInputs) -> Vec<Alert> {
        let mut new_alerts = Vec::new();

        // (a) worker stopped while enabled: critical.
        new_alerts.extend(self.check(
            AlertCondition::WorkerStopped,
            AlertSeverity::Critical,
            inputs.worker_enabled && !inputs.worker_running,
            "Trading worker stopped unexpectedly",
            "The trading worker is enabled but not running.".to_string(),
        ));

        // (b) no evaluations during market hours: warning.
        let stale_evals = inputs.is_market_hours
            && match inputs.last_evaluation_time {
                None => true,
                Some(t) => {
                    (self.clock.now() - t).num_minutes() > self.no_eval_minutes
                }
            };
        new_alerts.extend(self.check(
            AlertCondition::NoEvaluations,
            AlertSeverity::Warning,
            stale_evals,
            "No recent evaluations",
            format!(
                "No evaluations within {} minutes during market hours.",
                self.no_eval_minutes
            ),
        ));

        // (c) any order rejection in window: warning.
        new_alerts.extend(self.check(
            AlertCondition::OrderRejected,
            AlertSeverity::Warning,
            inputs.recent_order_rejections > 0,
            "Orders rejected",
            format!("{} order(s) rejected recently.", inputs.recent_order_rejections),
        ));

        // (d) guardrail skips over threshold: warning.
        new_alerts.extend(self.check(
            AlertCondition::GuardrailSkips,
            AlertSeverity::Warning,
            inputs.recent_guardrail_skips >= self.guardrail_skip_threshold,
            "Guardrail skips elevated",
            format!(
                "{} guardrail skip(s) recently (threshold {}).",
                inputs.recent_guardrail_skips, self.guardrail_skip_threshold
            ),
        ));

        // (e) price data stale during market hours: warning.
        let stale_price = inputs.is_market_hours
            && match inputs.last_price_update {
                None => true,
                Some(t) => {
                    (self.clock.now() - t).num_minutes() > self.price_stale_minutes
                }
            };
        new_alerts.extend(self.check(
            AlertCondition::PriceDataStale,
            AlertSeverity::Warning,
            stale_price,
            "Price data stale",
            format!(
                "No price update within {} minutes during market hours.",
                self.price_stale_minutes
            ),
        ));

        // (f) broker unreachable: critical.
        new_alerts.extend(self.check(
            AlertCondition::BrokerUnreachable,
            AlertSeverity::Critical,
            !inputs.broker_reachable,
            "Broker unreachable",
            "The broker endpoint is not responding.".to_string(),
        ));

        new_alerts
    }

    /// Raise-or-resolve for one condition.
    fn check(
        &self,
        condition: AlertCondition,
        severity: AlertSeverity,
        firing: bool,
        title: &str,
        detail: String,
    ) -> Option<Alert> {
        let existing = self.repo.find_active_by_condition(condition);
        match (firing, existing) {
            (true, Some(_)) => None, // already active
            (true, None) => {
                let alert = Alert {
                    id: self.next_id(condition),
                    condition,
                    severity,
                    title: title.to_string(),
                    detail,
                    raised_at: self.clock.now(),
                    resolved_at: None,
                };
                self.repo.save(alert.clone());
                Some(alert)
            }
            (false, Some(mut active)) => {
                active.resolved_at = Some(self.clock.now());
                self.repo.save(active);
                None
            }
            (false, None) => None,
        }
    }

    fn next_id(&self, condition: AlertCondition) -> String {
        let mut seq = self.seq.lock().expect("alert seq poisoned");
        *seq += 1;
        format!("alert-{:?}-{:04}", condition, *seq).to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct TestClock(Mutex<DateTime<Utc>>);
    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn checker() -> (Arc<InMemoryAlertsRepo>, Arc<TestClock>, AlertChecker) {
        let repo = Arc::new(InMemoryAlertsRepo::new());
        let clock = Arc::new(TestClock(Mutex::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        )));
        let checker = AlertChecker::new(repo.clone(), clock.clone());
        (repo, clock, checker)
    }

    fn healthy() -> AlertInputs {
        AlertInputs {
            worker_running: true,
            worker_enabled: true,
            last_evaluation_time: Some(Utc.with_ymd_and_hms(2024, 1, 2, 14, 59, 0).unwrap()),
            is_market_hours: true,
            recent_order_rejections: 0,
            recent_guardrail_skips: 0,
            last_price_update: Some(Utc.with_ymd_and_hms(2024, 1, 2, 14, 59, 0).unwrap()),
            broker_reachable: true,
        }
    }

    #[test]
    fn healthy_system_raises_nothing() {
        let (repo, _clock, checker) = checker();
        assert!(checker.run_all_checks(&healthy()).is_empty());
        assert!(repo.list_active().is_empty());
    }

    #[test]
    fn stopped_worker_is_critical_and_deduplicated() {
        let (repo, _clock, checker) = checker();
        let mut inputs = healthy();
        inputs.worker_running = false;

        let raised = checker.run_all_checks(&inputs);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].condition, AlertCondition::WorkerStopped);
        assert_eq!(raised[0].severity, AlertSeverity::Critical);

        // Second sweep: still firing, but no duplicate alert.
        assert!(checker.run_all_checks(&inputs).is_empty());
        assert_eq!(repo.list_active().len(), 1);
    }

    #[test]
    fn alerts_auto_resolve_when_the_condition_clears() {
        let (repo, _clock, checker) = checker();
        let mut inputs = healthy();
        inputs.broker_reachable = false;
        checker.run_all_checks(&inputs);
        assert_eq!(repo.list_active().len(), 1);

        inputs.broker_reachable = true;
        checker.run_all_checks(&inputs);
        assert!(repo.list_active().is_empty());
        // The resolved alert is retained with its resolution time.
        let all = repo.list_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved_at.is_some());
    }

    #[test]
    fn no_evaluations_only_fires_during_market_hours() {
        let (_repo, _clock, checker) = checker();
        let mut inputs = healthy();
        inputs.last_evaluation_time = None;
        inputs.is_market_hours = false;
        assert!(checker.run_all_checks(&inputs).is_empty());

        inputs.is_market_hours = true;
        let raised = checker.run_all_checks(&inputs);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].condition, AlertCondition::NoEvaluations);
    }

    #[test]
    fn guardrail_skips_respect_the_threshold() {
        let (_repo, _clock, checker) = checker();
        let mut inputs = healthy();
        inputs.recent_guardrail_skips = 4;
        assert!(checker.run_all_checks(&inputs).is_empty());
        inputs.recent_guardrail_skips = 5;
        assert_eq!(checker.run_all_checks(&inputs).len(), 1);
    }

    #[test]
    fn stale_price_uses_the_clock_delta() {
        let (_repo, clock, checker) = checker();
        let mut inputs = healthy();
        inputs.last_price_update =
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap());
        *clock.0.lock().unwrap() = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        let raised = checker.run_all_checks(&inputs);
        assert!(raised
            .iter()
            .any(|a| a.condition == AlertCondition::PriceDataStale));
    }
}
