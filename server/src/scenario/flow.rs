//! One virtual user's journey through a scenario

use crate::orchestrator::VirtualUser;
use crate::probe::{Probe, ProbeOptions, RequestOutcome};
use crate::protocol::ScenarioId;
use crate::run::RunConfig;
use crate::stats::StatsAccumulator;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::credentials::{Credential, CredentialPool};
use super::steps::{EndpointCall, LOGIN, TOKEN_EXCHANGE};

/// How a user's flow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Every step ran (individual steps may still have failed)
    Completed,
    /// Authentication failed; no further steps were attempted
    LoginFailed,
    /// The run was cancelled before the flow finished
    Cancelled,
}

/// Scenario script shared by all users of a run.
///
/// Steps of one user run strictly in sequence; outcomes are recorded into
/// the shared accumulator as soon as each step returns.
#[derive(Debug, Clone)]
pub struct ScenarioFlow {
    scenario: ScenarioId,
    base_url: Arc<str>,
    iterations: u64,
    delay: Duration,
    probe: Probe,
    stats: Arc<StatsAccumulator>,
    credentials: CredentialPool,
    cancel: CancellationToken,
}

impl ScenarioFlow {
    pub fn new(
        config: &RunConfig,
        probe: Probe,
        stats: Arc<StatsAccumulator>,
        credentials: CredentialPool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            scenario: config.scenario,
            base_url: Arc::from(config.base_url.as_str()),
            iterations: config.requests_per_user,
            delay: Duration::from_millis(config.delay_ms),
            probe,
            stats,
            credentials,
            cancel,
        }
    }

    pub fn stats(&self) -> &Arc<StatsAccumulator> {
        &self.stats
    }

    /// Run the whole journey of virtual user `vu_index`
    pub async fn run_user(&self, vu_index: u64) -> FlowOutcome {
        if self.cancel.is_cancelled() {
            return FlowOutcome::Cancelled;
        }

        let credential = self.credentials.for_vu(vu_index);
        let Some(token) = self.login(credential).await else {
            debug!("VU {} login failed as {}", vu_index, credential.username);
            return FlowOutcome::LoginFailed;
        };

        for iteration in 0..self.iterations {
            for call in self.scenario.steps() {
                if !self.pause().await {
                    return FlowOutcome::Cancelled;
                }
                let body = json!({
                    "username": credential.username,
                    "iteration": iteration,
                });
                self.call(call, &body, &token).await;
            }
        }

        FlowOutcome::Completed
    }

    async fn call(&self, call: &EndpointCall, body: &Value, token: &str) -> RequestOutcome {
        let url = self.url(call);
        let outcome = self
            .probe
            .probe(&url, ProbeOptions::post_json(body).bearer(token))
            .await;
        self.stats.record(call.name, &outcome);
        outcome
    }

    /// Authenticate, following a password exchange when the target asks for one
    async fn login(&self, credential: &Credential) -> Option<String> {
        let body = json!({
            "username": credential.username,
            "pin": credential.pin,
        });
        let outcome = self
            .probe
            .probe(
                &self.url(&LOGIN),
                ProbeOptions::post_json(&body).capture_body(),
            )
            .await;

        if !outcome.success {
            self.stats.record(LOGIN.name, &outcome);
            return None;
        }

        let payload = parse_json(&outcome);
        if let Some(token) = payload.as_ref().and_then(extract_token) {
            self.stats.record(LOGIN.name, &outcome);
            return Some(token);
        }

        let Some(password) = payload.as_ref().and_then(extract_password) else {
            let outcome = outcome.into_failure("login response carried no token");
            self.stats.record(LOGIN.name, &outcome);
            return None;
        };
        self.stats.record(LOGIN.name, &outcome);

        if !self.pause().await {
            return None;
        }
        let body = json!({
            "username": credential.username,
            "password": password,
        });
        let outcome = self
            .probe
            .probe(
                &self.url(&TOKEN_EXCHANGE),
                ProbeOptions::post_json(&body).capture_body(),
            )
            .await;

        let token = outcome
            .success
            .then(|| parse_json(&outcome))
            .flatten()
            .as_ref()
            .and_then(extract_token);
        match token {
            Some(token) => {
                self.stats.record(TOKEN_EXCHANGE.name, &outcome);
                Some(token)
            }
            None if outcome.success => {
                let outcome = outcome.into_failure("token exchange carried no token");
                self.stats.record(TOKEN_EXCHANGE.name, &outcome);
                None
            }
            None => {
                self.stats.record(TOKEN_EXCHANGE.name, &outcome);
                None
            }
        }
    }

    /// Inter-step delay; false when the run was cancelled
    async fn pause(&self) -> bool {
        if self.delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }

    fn url(&self, call: &EndpointCall) -> String {
        format!("{}{}", self.base_url, call.path)
    }
}

#[async_trait]
impl VirtualUser for ScenarioFlow {
    async fn run(&self, vu_index: u64) -> FlowOutcome {
        self.run_user(vu_index).await
    }
}

fn parse_json(outcome: &RequestOutcome) -> Option<Value> {
    serde_json::from_slice(outcome.body.as_deref()?).ok()
}

fn find_string(value: &Value, keys: &[&str]) -> Option<String> {
    let scopes = [Some(value), value.get("data")];
    scopes.into_iter().flatten().find_map(|scope| {
        keys.iter()
            .find_map(|k| scope.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn extract_token(value: &Value) -> Option<String> {
    find_string(value, &["token", "accessToken", "access_token"])
}

fn extract_password(value: &Value) -> Option<String> {
    find_string(value, &["password", "tempPassword"])
}
