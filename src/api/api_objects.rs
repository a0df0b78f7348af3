use serde::{Deserialize, Serialize};

use crate::channel_objects::ExecutionState;
use crate::requests_queue::JobAdmission;
use crate::utils::PtElement;

const MAX_ID_LEN: usize = 128;
/// Seats are numbered 0 to 3.
const MAX_ACTOR: i64 = 3;

/// One analysis request. Field names follow the existing HTTP clients.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(with = "base64_payload")]
    pub data: Vec<u8>,
    pub target_actor: i64,
    pub pt_list: Vec<f64>,
    pub extra_per_1000: f64,
    pub deviation_threshold: f64,
}

impl Job {
    /// Checks the request before it reaches admission.
    pub fn validate(&self, pt_element: PtElement) -> Result<(), String> {
        validate_id(&self.id)?;
        if !(0..=MAX_ACTOR).contains(&self.target_actor) {
            return Err(format!(
                "targetActor must be between 0 and {}, got {}",
                MAX_ACTOR, self.target_actor
            ));
        }
        for (i, pt) in self.pt_list.iter().enumerate() {
            pt_element
                .check(*pt)
                .map_err(|reason| format!("ptList[{}] {}", i, reason))?;
        }
        if !self.deviation_threshold.is_finite() {
            return Err("deviationThreshold is not a finite number".to_string());
        }
        if !self.extra_per_1000.is_finite() {
            return Err("extraPer1000 is not a finite number".to_string());
        }
        Ok(())
    }
}

fn validate_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("id must not be empty".to_string());
    }
    if id.len() > MAX_ID_LEN {
        return Err(format!("id must be at most {} bytes", MAX_ID_LEN));
    }
    if id.starts_with('.') {
        return Err("id must not start with '.'".to_string());
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.')))
    {
        return Err(format!("id contains invalid character {:?}", c));
    }
    Ok(())
}

/// `data` travels as a base64 string; `null` is an empty payload.
mod base64_payload {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            None => Ok(Vec::new()),
            Some(encoded) => general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_running: bool,
    pub params: StatusParams,
}

/// The current job as echoed by `/status`, with `ptList` in the configured element type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    pub id: String,
    #[serde(serialize_with = "base64_payload::serialize")]
    pub data: Vec<u8>,
    pub target_actor: i64,
    pub pt_list: Vec<serde_json::Value>,
    pub extra_per_1000: f64,
    pub deviation_threshold: f64,
}

impl StatusResponse {
    pub fn new(state: ExecutionState, pt_element: PtElement) -> Self {
        let job = state.job.unwrap_or_default();
        StatusResponse {
            is_running: state.busy,
            params: StatusParams {
                pt_list: job.pt_list.iter().map(|pt| pt_element.to_json(*pt)).collect(),
                id: job.id,
                data: job.data,
                target_actor: job.target_actor,
                extra_per_1000: job.extra_per_1000,
                deviation_threshold: job.deviation_threshold,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        MessageResponse {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        ErrorResponse {
            error: error.to_string(),
        }
    }
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub admission: JobAdmission,
    pub pt_element: PtElement,
}
