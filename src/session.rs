//! Analysis session: the lazily loaded dataset and model shared by all requests

use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{AnalysisConfig, CALLS_COLUMN, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS};
use crate::data::CustomerData;
use crate::error::{AnalysisError, ServiceError};
use crate::insights::{
    call_center_profile, rank_risk_factors, title_case, RiskTiers, INSIGHTS_TEXT,
    RECOMMENDATIONS, SUMMARY_FACTORS, TOP_FACTORS,
};
use crate::model::ChurnModel;
use crate::report::{
    fixed2, fixed6, AssociationEntry, AssociationReport, CallCenterReport, CallRiskEntry,
    DistributionReport, ExploratoryReport, FactorEntry, FactorSummary, FullReport,
    InsightsReport, ModelReport, RiskFactorReport, Stage,
};
use crate::source::{acquire, DataSource};
use crate::stats::{
    chi_square_test, churn_rate_by_level, exploratory_summary, mean, round2,
    NumericDistribution,
};
use crate::viz;

/// Dataset and model loaded once per process and reused across requests.
///
/// Concurrent first requests block on the initialization guard; a failed
/// initialization leaves the guard empty so a later request retries.
pub struct AnalysisSession {
    config: AnalysisConfig,
    source: Box<dyn DataSource>,
    data: OnceCell<CustomerData>,
    model: OnceCell<ChurnModel>,
}

impl AnalysisSession {
    pub fn new(config: AnalysisConfig, source: Box<dyn DataSource>) -> Self {
        Self {
            config,
            source,
            data: OnceCell::new(),
            model: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// The cleaned dataset, loading and preparing it on first use
    pub fn dataset(&self) -> Result<&CustomerData, ServiceError> {
        self.data.get_or_try_init(|| {
            let start = Instant::now();
            let raw = acquire(self.source.as_ref(), &self.config)?;
            let data =
                CustomerData::prepare(raw, &self.config).map_err(ServiceError::Preprocessing)?;
            info!(
                rows = data.n_customers(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Dataset ready"
            );
            Ok(data)
        })
    }

    /// The fitted model, training it on first use
    pub fn model(&self, data: &CustomerData) -> Result<&ChurnModel, AnalysisError> {
        self.model
            .get_or_try_init(|| ChurnModel::fit(data, &self.config))
    }

    fn require_model(&self, data: &CustomerData) -> Result<&ChurnModel, AnalysisError> {
        self.model(data)
            .map_err(|e| AnalysisError::ModelUnavailable(e.to_string()))
    }

    pub fn exploratory(&self, data: &CustomerData) -> Result<ExploratoryReport, AnalysisError> {
        let summary = exploratory_summary(data)?;
        Ok(ExploratoryReport {
            total_registros: summary.rows,
            total_variaveis: summary.columns,
            taxa_cancelamento: summary.churn_rate_pct,
            registros_validos: summary.complete_rows,
        })
    }

    pub fn distributions(&self, data: &CustomerData) -> Result<DistributionReport, AnalysisError> {
        let distributions: Vec<NumericDistribution> = NUMERIC_COLUMNS
            .iter()
            .filter_map(|name| {
                data.numeric_column(name)
                    .map(|values| NumericDistribution::from_values(name, values))
            })
            .collect();
        if distributions.is_empty() {
            return Err(AnalysisError::NoNumericColumns);
        }

        let column_mean = |name: &str| {
            distributions
                .iter()
                .find(|d| d.column == name)
                .map(|d| round2(d.mean))
                .unwrap_or(0.0)
        };

        let png = viz::render_distributions(&distributions).map_err(render_error)?;
        Ok(DistributionReport {
            idade_media: column_mean("idade"),
            freq_uso_media: column_mean("frequencia_uso"),
            gasto_medio: column_mean("total_gasto"),
            ligacoes_media: column_mean("ligacoes_callcenter"),
            imagem_base64: viz::to_base64(&png),
        })
    }

    pub fn associations(&self, data: &CustomerData) -> Result<AssociationReport, AnalysisError> {
        let target = data.target.to_vec();
        let mut tests = Vec::new();
        let mut panels = Vec::new();

        for name in CATEGORICAL_COLUMNS {
            let Some(levels) = data.categorical_column(name) else {
                warn!(column = name, "Categorical column absent, skipping association test");
                continue;
            };
            if let Some(test) = chi_square_test(name, &levels, &target) {
                tests.push(AssociationEntry {
                    variavel: name.to_string(),
                    qui_quadrado: round2(test.statistic),
                    p_valor: fixed6(test.p_value),
                    resultado: test.strength,
                });
            }
            panels.push((name.to_string(), churn_rate_by_level(&levels, &target)));
        }

        let png = viz::render_churn_rates(&panels).map_err(render_error)?;
        Ok(AssociationReport {
            testes: tests,
            imagem_base64: viz::to_base64(&png),
        })
    }

    /// Metrics of the classifier on the held-out partition
    pub fn model_report(&self, data: &CustomerData) -> ModelReport {
        let result = self.model(data).and_then(|model| {
            let evaluation = model.evaluate(data)?;
            let png = viz::render_confusion_matrix(&evaluation.confusion).map_err(render_error)?;
            Ok((evaluation, png))
        });

        match result {
            Ok((evaluation, png)) => {
                let m = evaluation.metrics;
                ModelReport {
                    acuracia: fixed2(m.accuracy),
                    precisao: fixed2(m.precision),
                    recall: fixed2(m.recall),
                    f1_score: fixed2(m.f1),
                    matriz_confusao_base64: Some(viz::to_base64(&png)),
                    erro: None,
                }
            }
            Err(e) => ModelReport::failed(&e),
        }
    }

    pub fn risk_factors(&self, data: &CustomerData) -> Result<RiskFactorReport, AnalysisError> {
        let model = self.require_model(data)?;
        let coefficients = model.coefficients().to_vec();
        let factors = rank_risk_factors(&coefficients, &model.feature_names, &data.feature_names)?;

        let top: Vec<_> = factors.iter().take(TOP_FACTORS).cloned().collect();
        let png = viz::render_risk_factors(&top).map_err(render_error)?;

        Ok(RiskFactorReport {
            top_fatores: top
                .iter()
                .map(|f| FactorEntry {
                    variavel: title_case(&f.feature),
                    coeficiente: f.coefficient,
                    importancia: f.importance,
                })
                .collect(),
            grafico_fatores_base64: viz::to_base64(&png),
            total_fatores: factors.len(),
            summary_top_factors: factors
                .iter()
                .take(SUMMARY_FACTORS)
                .map(|f| FactorSummary {
                    variavel: title_case(&f.feature),
                    coeficiente: f.coefficient,
                })
                .collect(),
        })
    }

    pub fn call_center(&self, data: &CustomerData) -> Result<CallCenterReport, AnalysisError> {
        let model = self.require_model(data)?;
        let calls = data
            .numeric_column(CALLS_COLUMN)
            .ok_or_else(|| AnalysisError::MissingColumn(CALLS_COLUMN.to_string()))?;
        let probabilities = model.predict_proba(&data.features)?.to_vec();
        let profile = call_center_profile(&calls, &probabilities);

        let png = viz::render_call_center(&calls, &probabilities, &profile).map_err(render_error)?;
        Ok(CallCenterReport {
            insights_text: INSIGHTS_TEXT.iter().map(|s| s.to_string()).collect(),
            imagem_base64: viz::to_base64(&png),
            risco_por_ligacoes: profile
                .iter()
                .map(|g| CallRiskEntry {
                    ligacoes: g.calls,
                    risco_medio: (g.mean_risk * 10_000.0).round() / 10_000.0,
                    clientes: g.customers,
                })
                .collect(),
        })
    }

    pub fn insights(&self, data: &CustomerData) -> Result<InsightsReport, AnalysisError> {
        let model = self.require_model(data)?;
        let probabilities = model.predict_proba(&data.features)?.to_vec();
        let tiers = RiskTiers::from_probabilities(&probabilities);
        info!(
            high = tiers.high,
            medium = tiers.medium,
            low = tiers.low,
            mean_risk = mean(&probabilities).unwrap_or(0.0),
            "Customers segmented by risk"
        );

        let png = viz::render_risk_tiers(&tiers).map_err(render_error)?;
        Ok(InsightsReport {
            alto_risco: tiers.high,
            medio_risco: tiers.medium,
            baixo_risco: tiers.low,
            total_clientes: probabilities.len(),
            recomendacoes: RECOMMENDATIONS.iter().map(|s| s.to_string()).collect(),
            segmentacao_base64: viz::to_base64(&png),
        })
    }

    /// Run every stage; stage failures stay inside their slot
    pub fn full_report(&self) -> Result<FullReport, ServiceError> {
        let data = self.dataset()?;
        let start = Instant::now();

        let report = FullReport {
            analise_exploratoria: Stage::from_result("exploratorio", self.exploratory(data)),
            distribuicoes: Stage::from_result("distribuicoes", self.distributions(data)),
            associacoes: Stage::from_result("associacoes", self.associations(data)),
            modelo: self.model_report(data),
            fatores_risco: Stage::from_result("fatores_risco", self.risk_factors(data)),
            call_center_impact: Stage::from_result("call_center_impact", self.call_center(data)),
            insights: Stage::from_result("insights", self.insights(data)),
        };

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Full analysis complete");
        Ok(report)
    }
}

fn render_error(e: anyhow::Error) -> AnalysisError {
    AnalysisError::Render(e.to_string())
}
