//! Request dispatch: maps an action/step pair onto analysis stages

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::info;

use crate::error::ServiceError;
use crate::report::{ApiResponse, Stage};
use crate::session::AnalysisSession;

/// Request body; every field optional.
///
/// Fields hold raw JSON so an explicit `null` stays distinguishable from an absent key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default, deserialize_with = "present")]
    pub action: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub step: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// JSON truthiness: null, false, zero and empty values are falsy
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl AnalysisRequest {
    /// Parse a body leniently: malformed or empty JSON is an empty request
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FullAnalysis,
    Step(Step),
    Liveness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Exploratory,
    Distributions,
    Associations,
    Model,
    RiskFactors,
    CallCenter,
    Insights,
}

impl Step {
    pub fn parse(name: &str) -> Result<Self, ServiceError> {
        match name {
            "exploratorio" => Ok(Step::Exploratory),
            "distribuicoes" => Ok(Step::Distributions),
            "associacoes" => Ok(Step::Associations),
            "modelo" => Ok(Step::Model),
            "fatores_risco" => Ok(Step::RiskFactors),
            "call_center_impact" => Ok(Step::CallCenter),
            "insights" => Ok(Step::Insights),
            other => Err(ServiceError::InvalidStep(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Exploratory => "exploratorio",
            Step::Distributions => "distribuicoes",
            Step::Associations => "associacoes",
            Step::Model => "modelo",
            Step::RiskFactors => "fatores_risco",
            Step::CallCenter => "call_center_impact",
            Step::Insights => "insights",
        }
    }
}

impl Action {
    /// Resolve a request; only an unknown step is an error.
    ///
    /// A missing action means a full analysis; any action that is not one of
    /// the known strings, `null` included, gets the liveness reply.
    pub fn resolve(request: &AnalysisRequest) -> Result<Self, ServiceError> {
        let action = match &request.action {
            None => return Ok(Action::FullAnalysis),
            Some(Value::String(action)) => action.as_str(),
            Some(_) => return Ok(Action::Liveness),
        };
        match action {
            "full_analysis" => Ok(Action::FullAnalysis),
            "step_analysis" => match &request.step {
                Some(step) if truthy(step) => match step {
                    Value::String(name) => Ok(Action::Step(Step::parse(name)?)),
                    other => Err(ServiceError::InvalidStep(other.to_string())),
                },
                _ => Ok(Action::Liveness),
            },
            _ => Ok(Action::Liveness),
        }
    }
}

/// Handle one request against the session
pub fn dispatch(
    session: &AnalysisSession,
    request: &AnalysisRequest,
) -> Result<ApiResponse, ServiceError> {
    let action = Action::resolve(request)?;
    info!(?action, "Dispatching analysis request");

    match action {
        Action::Liveness => Ok(ApiResponse::alive()),
        Action::FullAnalysis => {
            let report = session.full_report()?;
            Ok(ApiResponse::data(serde_json::to_value(report)?))
        }
        Action::Step(step) => Ok(ApiResponse::data(run_step(session, step)?)),
    }
}

fn run_step(session: &AnalysisSession, step: Step) -> Result<Value, ServiceError> {
    let data = session.dataset()?;
    let name = step.name();
    let value = match step {
        Step::Exploratory => serde_json::to_value(Stage::from_result(name, session.exploratory(data)))?,
        Step::Distributions => {
            serde_json::to_value(Stage::from_result(name, session.distributions(data)))?
        }
        Step::Associations => {
            serde_json::to_value(Stage::from_result(name, session.associations(data)))?
        }
        Step::Model => serde_json::to_value(session.model_report(data))?,
        Step::RiskFactors => {
            serde_json::to_value(Stage::from_result(name, session.risk_factors(data)))?
        }
        Step::CallCenter => serde_json::to_value(Stage::from_result(name, session.call_center(data)))?,
        Step::Insights => serde_json::to_value(Stage::from_result(name, session.insights(data)))?,
    };
    Ok(value)
}
