//! Cron scheduling functionality for BeemFlow
//!
//! Evaluates flows with a `schedule.cron` trigger against a short lookback
//! window and starts runs for those that are due.

use crate::engine::Engine;
use crate::storage::Storage;
use crate::Result;
use crate::model::Flow;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Cron manager for handling cron-based flow execution
#[derive(Clone)]
pub struct CronManager {
    storage: Arc<dyn Storage>,
    engine: Arc<Engine>,
    /// Shared secret required as a bearer credential on the HTTP cron endpoints.
    pub cron_secret: Option<String>,
}

impl CronManager {
    /// Create a new cron manager over the shared storage and engine
    pub fn new(storage: Arc<dyn Storage>, engine: Arc<Engine>, cron_secret: Option<String>) -> Self {
        Self {
            storage,
            engine,
            cron_secret,
        }
    }

    /// `true` if `credential` matches the configured secret, or if no secret
    /// is configured (in which case the endpoint is open).
    pub fn check_secret(&self, credential: Option<&str>) -> bool {
        match &self.cron_secret {
            Some(expected) => credential == Some(expected.as_str()),
            None => true,
        }
    }

    /// Check all flows for cron schedules and execute those that are due.
    /// Stateless; relies only on the storage layer for both flow lookup and
    /// the deterministic-run-id dedup the engine already performs on start.
    pub async fn check_and_execute_cron_flows(&self) -> Result<CronExecutionResult> {
        let flows = self.storage.list_flows().await?;

        let mut triggered = Vec::new();
        let mut errors = Vec::new();
        let mut checked = 0;

        let now = Utc::now();

        for flow_name in &flows {
            match self.storage.get_flow(flow_name).await {
                Ok(Some(content)) => match crate::dsl::parse_string(&content) {
                    Ok(flow) => {
                        if !Self::has_schedule_cron_trigger(&flow) {
                            continue;
                        }
                        checked += 1;

                        let Some(cron_expr) = &flow.cron else {
                            errors.push(format!("{}: missing cron expression", flow_name));
                            continue;
                        };

                        match Schedule::from_str(&Self::normalize_cron_expr(cron_expr)) {
                            Ok(schedule) => {
                                if Self::should_run_now(&schedule, &now, Duration::minutes(5)) {
                                    match self.execute_flow_by_cron(flow_name).await {
                                        Ok(_) => triggered.push(flow_name.clone()),
                                        Err(e) => {
                                            errors.push(format!("{}: {}", flow_name, e))
                                        }
                                    }
                                }
                            }
                            Err(_) => {
                                errors.push(format!("{}: invalid cron expression", flow_name))
                            }
                        }
                    }
                    Err(e) => errors.push(format!("{}: {}", flow_name, e)),
                },
                Ok(None) => errors.push(format!("{}: flow not found", flow_name)),
                Err(e) => errors.push(format!("{}: {}", flow_name, e)),
            }
        }

        Ok(CronExecutionResult {
            status: "completed".to_string(),
            timestamp: now.to_rfc3339(),
            triggered: triggered.len(),
            workflows: triggered,
            errors,
            checked,
            total: flows.len(),
        })
    }

    /// Check a single named workflow and trigger it if it is due, regardless
    /// of whether the lookback window would otherwise have caught it. Used by
    /// the per-workflow cron endpoint, which is an explicit ask rather than a
    /// sweep.
    pub async fn check_and_execute_one(&self, flow_name: &str) -> Result<CronExecutionResult> {
        let now = Utc::now();
        let content = self
            .storage
            .get_flow(flow_name)
            .await?
            .ok_or_else(|| crate::BeemFlowError::not_found("flow", flow_name))?;
        let flow = crate::dsl::parse_string(&content)?;

        if !Self::has_schedule_cron_trigger(&flow) {
            return Ok(CronExecutionResult {
                status: "skipped".to_string(),
                timestamp: now.to_rfc3339(),
                triggered: 0,
                workflows: Vec::new(),
                errors: vec![format!("{}: no schedule.cron trigger", flow_name)],
                checked: 1,
                total: 1,
            });
        }

        match self.execute_flow_by_cron(flow_name).await {
            Ok(_) => Ok(CronExecutionResult {
                status: "completed".to_string(),
                timestamp: now.to_rfc3339(),
                triggered: 1,
                workflows: vec![flow_name.to_string()],
                errors: Vec::new(),
                checked: 1,
                total: 1,
            }),
            Err(e) => Ok(CronExecutionResult {
                status: "completed".to_string(),
                timestamp: now.to_rfc3339(),
                triggered: 0,
                workflows: Vec::new(),
                errors: vec![format!("{}: {}", flow_name, e)],
                checked: 1,
                total: 1,
            }),
        }
    }

    /// Check if a flow has a schedule.cron trigger
    fn has_schedule_cron_trigger(flow: &Flow) -> bool {
        flow.cron.is_some()
            && flow
                .on
                .as_ref()
                .map(|t| t.includes("schedule.cron"))
                .unwrap_or(false)
    }

    /// Normalize a cron expression to the 6-field (with seconds) form the
    /// `cron` crate requires. Standard POSIX 5-field expressions (minute hour
    /// day-of-month month day-of-week) get a leading `"0"` seconds field;
    /// anything that already has 6+ fields is passed through unchanged.
    fn normalize_cron_expr(expr: &str) -> String {
        let field_count = expr.split_whitespace().count();
        if field_count == 5 {
            format!("0 {}", expr)
        } else {
            expr.to_string()
        }
    }

    /// Check if a cron schedule should run within the given time window,
    /// anchored at `window_start` (not at the current instant) so that a
    /// scheduled time earlier in the lookback window is still found even if
    /// it isn't the very next upcoming occurrence from `now`.
    fn should_run_now(schedule: &Schedule, now: &DateTime<Utc>, window: Duration) -> bool {
        let window_start = *now - window;
        let window_end = *now + Duration::minutes(1); // buffer for early triggers

        let next_run = schedule.after(&window_start).next();

        if let Some(scheduled_time) = next_run {
            scheduled_time > window_start && scheduled_time <= window_end
        } else {
            false
        }
    }

    /// Execute a flow triggered by cron
    async fn execute_flow_by_cron(&self, flow_name: &str) -> Result<()> {
        let mut event_data = HashMap::new();
        event_data.insert(
            "trigger".to_string(),
            Value::String("schedule.cron".to_string()),
        );
        event_data.insert("workflow".to_string(), Value::String(flow_name.to_string()));
        event_data.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        self.engine.start(flow_name, event_data, false).await?;

        tracing::info!("Triggered cron workflow: {} at {}", flow_name, Utc::now().to_rfc3339());
        Ok(())
    }
}

/// Result of cron execution check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronExecutionResult {
    /// Execution status
    pub status: String,
    /// Timestamp when check was performed
    pub timestamp: String,
    /// Number of workflows triggered
    pub triggered: usize,
    /// List of triggered workflow names
    pub workflows: Vec<String>,
    /// List of errors encountered
    pub errors: Vec<String>,
    /// Number of workflows checked
    pub checked: usize,
    /// Total number of workflows
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_schedule_cron_trigger() {
        let flow = Flow {
            cron: Some("0 * * * *".to_string()),
            on: Some(crate::model::Trigger::Single("schedule.cron".to_string())),
            ..Default::default()
        };
        assert!(CronManager::has_schedule_cron_trigger(&flow));

        let flow_no_cron = Flow {
            cron: None,
            ..Default::default()
        };
        assert!(!CronManager::has_schedule_cron_trigger(&flow_no_cron));

        let flow_cron_wrong_trigger = Flow {
            cron: Some("0 * * * *".to_string()),
            on: Some(crate::model::Trigger::Single("cli.manual".to_string())),
            ..Default::default()
        };
        assert!(!CronManager::has_schedule_cron_trigger(&flow_cron_wrong_trigger));
    }

    #[test]
    fn test_should_run_now_matches_within_window() {
        let schedule =
            Schedule::from_str(&CronManager::normalize_cron_expr("* * * * *")).unwrap();
        let now = Utc::now();
        assert!(CronManager::should_run_now(&schedule, &now, Duration::minutes(5)));
    }

    #[test]
    fn test_normalize_cron_expr_adds_seconds_field() {
        assert_eq!(CronManager::normalize_cron_expr("* * * * *"), "0 * * * * *");
        assert_eq!(CronManager::normalize_cron_expr("0 0 * * *"), "0 0 0 * * *");
        // already 6 fields: left untouched
        assert_eq!(
            CronManager::normalize_cron_expr("0 0 * * * *"),
            "0 0 * * * *"
        );
    }

    #[test]
    fn test_should_run_now_anchors_at_window_start() {
        // A schedule that fires every minute: something should always be
        // found inside a 5 minute lookback window even though `now` itself
        // isn't exactly on a minute boundary.
        let schedule =
            Schedule::from_str(&CronManager::normalize_cron_expr("* * * * *")).unwrap();
        let now = Utc::now() + Duration::seconds(30);
        assert!(CronManager::should_run_now(&schedule, &now, Duration::minutes(5)));
    }
}
