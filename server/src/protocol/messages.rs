use serde::{Deserialize, Serialize};

/// Named traffic scenario a virtual user runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    A,
    B,
    C,
}

impl ScenarioId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioId::A => "A",
            ScenarioId::B => "B",
            ScenarioId::C => "C",
        }
    }
}

/// Safety mode that selects the clamping ceilings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Test,
    Full,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Test => "test",
            RunMode::Full => "full",
        }
    }
}

/// How virtual users are launched
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// All users start at once
    #[default]
    Burst,
    /// Users start in capped, barrier-separated waves
    Waves,
}

/// Body of `POST /api/runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub base_url: String,
    pub vus: u64,
    pub requests_per_user: u64,
    #[serde(default)]
    pub delay_ms: u64,
    pub scenario: ScenarioId,
    pub mode: RunMode,
    #[serde(default)]
    pub schedule: ScheduleKind,
}

/// Client to Server messages on a progress socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive; `seq` is echoed in logs only
    Ping {
        #[serde(default)]
        seq: u64,
    },
}

/// Server to Client messages on a progress socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Point-in-time view of a running test
    Progress(ProgressSnapshot),
    /// Terminal event: the run finished and produced a report
    Done(RunReport),
    /// Terminal event: the run was aborted
    Error(RunFailure),
    /// Keepalive response
    Pong,
}

impl ServerMessage {
    /// Whether this message ends the run's channel
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerMessage::Done(_) | ServerMessage::Error(_))
    }

    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::Progress(_) => "progress",
            ServerMessage::Done(_) => "done",
            ServerMessage::Error(_) => "error",
            ServerMessage::Pong => "pong",
        }
    }
}

/// Most recent failure seen by a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastError {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wave position, present only for waved runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaveProgress {
    pub index: u64,
    pub of: u64,
}

/// Progress event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub progress_percent: f64,
    pub completed_vus: u64,
    pub total_requests: u64,
    pub success: u64,
    pub failed: u64,
    pub last_error: Option<LastError>,
    pub vus: u64,
    pub requests_per_user: u64,
    pub scenario: ScenarioId,
    pub mode: RunMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave: Option<WaveProgress>,
}

/// Error event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub message: String,
}

/// Diagnostic sample of one failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSample {
    pub endpoint: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub body: String,
    pub elapsed_ms: f64,
}

/// Pass/fail verdict of a finished run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Critical,
}

/// Which threshold produced a finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FindingRule {
    ErrorRate,
    Latency,
}

/// Endpoint flagged by the bottleneck analyzer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckFinding {
    pub component: String,
    pub rule: FindingRule,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
    pub recommendation: String,
}

/// Final per-endpoint numbers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub name: String,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub error_rate: f64,
    pub mean_latency_ms: f64,
    pub p95_latency_ms: f64,
}

/// Done event payload and the terminal artifact of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub total_time_sec: f64,
    pub total_requests: u64,
    pub success: u64,
    pub failed: u64,
    pub error_rate: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub vus: u64,
    pub requests_per_user: u64,
    pub scenario: ScenarioId,
    pub mode: RunMode,
    pub endpoints: Vec<EndpointSummary>,
    pub bottlenecks: Vec<BottleneckFinding>,
    pub sample_errors: Vec<ErrorSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_parses_camel_case() {
        let json = r#"{
            "baseUrl": "http://localhost:3000",
            "vus": 20,
            "requestsPerUser": 2,
            "delayMs": 0,
            "scenario": "A",
            "mode": "test"
        }"#;
        let request: RunRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.vus, 20);
        assert_eq!(request.requests_per_user, 2);
        assert_eq!(request.scenario, ScenarioId::A);
        assert_eq!(request.mode, RunMode::Test);
        assert_eq!(request.schedule, ScheduleKind::Burst);
    }

    #[test]
    fn test_run_request_rejects_unknown_scenario() {
        let json = r#"{"baseUrl":"http://x","vus":1,"requestsPerUser":1,"scenario":"D","mode":"test"}"#;
        assert!(serde_json::from_str::<RunRequest>(json).is_err());
    }

    #[test]
    fn test_run_request_rejects_negative_counts() {
        let json = r#"{"baseUrl":"http://x","vus":-5,"requestsPerUser":1,"scenario":"A","mode":"full"}"#;
        assert!(serde_json::from_str::<RunRequest>(json).is_err());
    }

    #[test]
    fn test_progress_event_shape() {
        let msg = ServerMessage::Progress(ProgressSnapshot {
            run_id: "r1".to_string(),
            progress_percent: 50.0,
            completed_vus: 5,
            total_requests: 35,
            success: 34,
            failed: 1,
            last_error: Some(LastError {
                url: "http://x/wallet/balance".to_string(),
                status: Some(500),
                error: None,
            }),
            vus: 10,
            requests_per_user: 2,
            scenario: ScenarioId::A,
            mode: RunMode::Test,
            wave: None,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "progress");
        assert_eq!(value["data"]["progressPercent"], 50.0);
        assert_eq!(value["data"]["totalRequests"], 35);
        assert_eq!(value["data"]["lastError"]["status"], 500);
        assert!(value["data"]["lastError"].get("error").is_none());
        assert!(value["data"].get("wave").is_none());
    }

    #[test]
    fn test_last_error_serializes_null_when_absent() {
        let snapshot = ProgressSnapshot {
            run_id: "r1".to_string(),
            progress_percent: 0.0,
            completed_vus: 0,
            total_requests: 0,
            success: 0,
            failed: 0,
            last_error: None,
            vus: 1,
            requests_per_user: 1,
            scenario: ScenarioId::B,
            mode: RunMode::Full,
            wave: None,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["lastError"].is_null());
        assert_eq!(value["scenario"], "B");
        assert_eq!(value["mode"], "full");
    }

    #[test]
    fn test_terminal_messages() {
        let error = ServerMessage::Error(RunFailure {
            message: "boom".to_string(),
        });
        assert!(error.is_terminal());
        assert!(!ServerMessage::Pong.is_terminal());

        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["message"], "boom");
    }

    #[test]
    fn test_client_ping_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping","seq":7}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { seq: 7 }));

        let bare: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(bare, ClientMessage::Ping { seq: 0 }));
    }
}
