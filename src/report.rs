//! Serializable stage outputs and the response envelope

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::AnalysisError;
use crate::stats::AssociationStrength;

/// Outcome of one analysis stage: its fields, or an `erro` fragment
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Stage<T> {
    Done(T),
    Failed(StageFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub erro: String,
}

impl<T> Stage<T> {
    /// Wrap a stage result, logging the failure
    pub fn from_result(stage: &str, result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(value) => Stage::Done(value),
            Err(e) => {
                error!(stage, error = %e, "Analysis stage failed");
                Stage::Failed(StageFailure { erro: e.to_string() })
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Stage::Done(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploratoryReport {
    pub total_registros: usize,
    pub total_variaveis: usize,
    pub taxa_cancelamento: f64,
    pub registros_validos: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub idade_media: f64,
    pub freq_uso_media: f64,
    pub gasto_medio: f64,
    pub ligacoes_media: f64,
    pub imagem_base64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssociationEntry {
    pub variavel: String,
    pub qui_quadrado: f64,
    pub p_valor: String,
    pub resultado: AssociationStrength,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssociationReport {
    pub testes: Vec<AssociationEntry>,
    pub imagem_base64: String,
}

/// Classifier metrics; a failed fit keeps the shape with zeroed metrics
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub acuracia: String,
    pub precisao: String,
    pub recall: String,
    pub f1_score: String,
    pub matriz_confusao_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erro: Option<String>,
}

impl ModelReport {
    pub fn failed(e: &AnalysisError) -> Self {
        error!(stage = "modelo", error = %e, "Analysis stage failed");
        Self {
            acuracia: "0.00".to_string(),
            precisao: "0.00".to_string(),
            recall: "0.00".to_string(),
            f1_score: "0.00".to_string(),
            matriz_confusao_base64: None,
            erro: Some(e.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.erro.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorEntry {
    pub variavel: String,
    pub coeficiente: f64,
    pub importancia: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorSummary {
    pub variavel: String,
    pub coeficiente: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskFactorReport {
    pub top_fatores: Vec<FactorEntry>,
    pub grafico_fatores_base64: String,
    pub total_fatores: usize,
    pub summary_top_factors: Vec<FactorSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRiskEntry {
    pub ligacoes: i64,
    pub risco_medio: f64,
    pub clientes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallCenterReport {
    pub insights_text: Vec<String>,
    pub imagem_base64: String,
    pub risco_por_ligacoes: Vec<CallRiskEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsReport {
    pub alto_risco: usize,
    pub medio_risco: usize,
    pub baixo_risco: usize,
    pub total_clientes: usize,
    pub recomendacoes: Vec<String>,
    pub segmentacao_base64: String,
}

/// Every stage, keyed as in the `full_analysis` response
#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub analise_exploratoria: Stage<ExploratoryReport>,
    pub distribuicoes: Stage<DistributionReport>,
    pub associacoes: Stage<AssociationReport>,
    pub modelo: ModelReport,
    pub fatores_risco: Stage<RiskFactorReport>,
    pub call_center_impact: Stage<CallCenterReport>,
    pub insights: Stage<InsightsReport>,
}

/// Response body of every request
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl ApiResponse {
    pub fn data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            timestamp: None,
        }
    }

    /// Liveness answer for requests that name no analysis
    pub fn alive() -> Self {
        Self {
            success: true,
            data: None,
            message: Some("Churn analysis API is running".to_string()),
            error: None,
            timestamp: Some(now_seconds()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            timestamp: None,
        }
    }
}

/// Current Unix time in seconds, with sub-second precision
pub fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Two-decimal string, as used for model metrics
pub fn fixed2(value: f64) -> String {
    format!("{:.2}", value)
}

/// Six-decimal string, as used for p-values
pub fn fixed6(value: f64) -> String {
    format!("{:.6}", value)
}
