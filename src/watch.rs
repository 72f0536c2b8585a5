//! Condition watcher.
//!
//! Starts a long-lived `get --watch` on one resource, printing the status of
//! a single condition on every change. The first line matching the expected
//! status ends the watch. Stopping the watch process after a match is a
//! normal outcome, not a cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Condition, WaitConfig};
use crate::error::{KubeEnsureError, ProcessError, Result, WatchError};
use crate::kubectl::KubectlClient;
use crate::process::{ExecutionRequest, LineSink};

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WatchOutcome {
    /// The expected status was observed.
    Matched,
    /// The caller cancelled, or the timeout expired, before a match.
    Cancelled,
    /// The watch process exited before a match.
    Failed {
        /// Exit code of the watch process.
        exit_code: Option<i32>,
    },
}

impl WatchOutcome {
    /// Converts the outcome into a result for the given wait.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::CancelledBeforeMatch`] or
    /// [`WatchError::ConditionNotReached`] unless the condition matched.
    pub fn into_result(self, wait: &WaitConfig) -> Result<()> {
        let condition = wait.condition.condition_type.clone();
        let expected = wait.condition.expected_status.clone();
        let resource = wait.display_name();

        match self {
            Self::Matched => Ok(()),
            Self::Cancelled => Err(WatchError::CancelledBeforeMatch {
                condition,
                expected,
                resource,
            }
            .into()),
            Self::Failed { exit_code } => Err(WatchError::ConditionNotReached {
                condition,
                expected,
                resource,
                exit_code,
            }
            .into()),
        }
    }
}

/// Outcome of one configured wait, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WaitReport {
    /// Human-readable description of the wait.
    pub wait: String,
    /// How the watch ended.
    #[serde(flatten)]
    pub outcome: WatchOutcome,
}

impl WaitReport {
    /// Creates a report for a wait.
    #[must_use]
    pub fn new(wait: &WaitConfig, outcome: WatchOutcome) -> Self {
        Self {
            wait: wait.describe(),
            outcome,
        }
    }
}

/// Builds the jsonpath expression selecting a condition's status.
///
/// The condition type is written as a JSON string literal so quotes in it
/// cannot end the filter early.
#[must_use]
pub fn condition_query(condition_type: &str) -> String {
    let literal = serde_json::to_string(condition_type)
        .unwrap_or_else(|_| format!("\"{condition_type}\""));
    format!("jsonpath={{.status.conditions[?(@.type=={literal})].status}}\\n")
}

/// Watches resource conditions through the external tool.
#[derive(Debug, Clone)]
pub struct ConditionWatcher<'a> {
    client: &'a KubectlClient,
}

/// Compares each status line with the expected status and stops the watch
/// on the first match.
struct MatchSink<'s> {
    condition: &'s Condition,
    matched: &'s AtomicBool,
    stop: &'s CancellationToken,
}

impl LineSink for MatchSink<'_> {
    fn stdout(&mut self, line: &str) {
        debug!("{}: {line}", self.condition.condition_type);
        if !self.matched.load(Ordering::SeqCst) && self.condition.matches(line) {
            self.matched.store(true, Ordering::SeqCst);
            self.stop.cancel();
        }
    }

    fn stderr(&mut self, line: &str) {
        warn!("{line}");
    }
}

impl<'a> ConditionWatcher<'a> {
    /// Creates a watcher using the given client.
    #[must_use]
    pub const fn new(client: &'a KubectlClient) -> Self {
        Self { client }
    }

    /// Builds the watch invocation for a wait.
    #[must_use]
    pub fn watch_request(&self, wait: &WaitConfig) -> ExecutionRequest {
        self.client
            .request()
            .arg("get")
            .args(&wait.add_args)
            .arg("--watch")
            .arg("--output")
            .arg(condition_query(&wait.condition.condition_type))
            .arg("--namespace")
            .arg(&wait.namespace)
            .arg(&wait.resource_type)
            .arg(&wait.name)
    }

    /// Watches until the condition matches, the process exits, or `cancel`
    /// (or the wait's timeout) fires.
    ///
    /// # Errors
    ///
    /// Returns an error only if the watch cannot be started; every way the
    /// watch itself can end is a [`WatchOutcome`].
    pub async fn watch(&self, wait: &WaitConfig, cancel: &CancellationToken) -> Result<WatchOutcome> {
        info!("{}", wait.describe());

        let deadline = cancel.child_token();
        let stop = deadline.child_token();
        let timer = wait.timeout_secs.map(|secs| {
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                debug!("Watch timed out after {secs}s");
                deadline.cancel();
            })
        });

        let matched = AtomicBool::new(false);
        let mut sink = MatchSink {
            condition: &wait.condition,
            matched: &matched,
            stop: &stop,
        };
        let accepts = |_exit_code: Option<i32>| matched.load(Ordering::SeqCst);

        let request = self.watch_request(wait);
        let result = self
            .client
            .runner()
            .run(&request, &mut sink, &stop, Some(&accepts))
            .await;

        if let Some(timer) = timer {
            timer.abort();
        }

        let outcome = match result {
            Ok(_) if matched.load(Ordering::SeqCst) => WatchOutcome::Matched,
            Ok(completion) => WatchOutcome::Failed {
                exit_code: completion.exit_code,
            },
            Err(KubeEnsureError::Process(ProcessError::Cancelled { .. })) => WatchOutcome::Cancelled,
            Err(KubeEnsureError::Process(ProcessError::ExecutionFailed { exit_code, .. })) => {
                WatchOutcome::Failed { exit_code }
            }
            Err(e) => return Err(e),
        };

        debug!("Watch ended: {outcome:?}");
        Ok(outcome)
    }

    /// Watches and converts the outcome into a result.
    ///
    /// # Errors
    ///
    /// Returns an error unless the condition matched.
    pub async fn await_condition(&self, wait: &WaitConfig, cancel: &CancellationToken) -> Result<()> {
        self.watch(wait, cancel).await?.into_result(wait)
    }
}
