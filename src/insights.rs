//! Business insights derived from the fitted model: ranked risk factors,
//! call-center impact and risk tiers

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::AnalysisError;
use crate::stats::mean;

/// Number of factors drawn in the risk-factor chart
pub const TOP_FACTORS: usize = 5;

/// Number of factors in the short summary
pub const SUMMARY_FACTORS: usize = 3;

pub const INSIGHTS_TEXT: [&str; 3] = [
    "• Key relationship: the number of call-center calls is a major driver of churn risk.",
    "• Rising risk: after 4-5 calls the churn probability climbs sharply, pointing to chronic dissatisfaction or unresolved problems.",
    "• Proactive action: customers with repeated call-center contacts should be prioritized for retention and proactive issue resolution.",
];

pub const RECOMMENDATIONS: [&str; 5] = [
    "Prioritize 'High Risk' customers with personalized retention offers.",
    "Run proactive satisfaction surveys with 'Medium Risk' customers.",
    "Keep service excellence for 'Low Risk' customers and encourage them to become promoters.",
    "Analyze interaction history to identify cancellation triggers.",
    "Build loyalty programs around 'Contract Duration' and 'Usage Frequency'.",
];

/// One model coefficient, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct RiskFactor {
    /// Encoded feature name, e.g. `duracao_contrato_Mensal`
    pub feature: String,
    pub coefficient: f64,
    /// Absolute value of the coefficient
    pub importance: f64,
}

impl RiskFactor {
    pub fn label(&self) -> String {
        title_case(&self.feature)
    }

    pub fn increases_risk(&self) -> bool {
        self.coefficient > 0.0
    }

    pub fn direction(&self) -> &'static str {
        if self.increases_risk() {
            "Increases risk"
        } else {
            "Decreases risk"
        }
    }
}

/// Rank features by absolute coefficient, largest first.
///
/// When the model's own feature names do not line up with its coefficients,
/// the names of the training matrix columns are used instead.
pub fn rank_risk_factors(
    coefficients: &[f64],
    model_features: &[String],
    training_features: &[String],
) -> Result<Vec<RiskFactor>, AnalysisError> {
    let names = if coefficients.len() == model_features.len() {
        model_features
    } else {
        warn!(
            coefficients = coefficients.len(),
            features = model_features.len(),
            "Coefficient count does not match feature names, using training columns"
        );
        if coefficients.len() != training_features.len() {
            return Err(AnalysisError::FeatureMismatch {
                coefficients: coefficients.len(),
                features: training_features.len(),
            });
        }
        training_features
    };

    let mut factors: Vec<RiskFactor> = names
        .iter()
        .zip(coefficients)
        .map(|(name, &coefficient)| RiskFactor {
            feature: name.clone(),
            coefficient,
            importance: coefficient.abs(),
        })
        .collect();
    factors.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    // a male dummy is reported as its female complement
    if let Some(factor) = factors.iter_mut().find(|f| f.feature == "sexo_male") {
        factor.feature = "sexo_female".to_string();
        factor.coefficient = -factor.coefficient;
    }

    Ok(factors)
}

/// Replace underscores with spaces and capitalize each word, lowering the rest
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Percentile with linear interpolation between closest ranks; `q` in [0, 1]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Customer counts per risk tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskTiers {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub p25: f64,
    pub p75: f64,
}

impl RiskTiers {
    /// Split probabilities at their 25th and 75th percentiles.
    ///
    /// Ties at a cut point fall into the lower tier, so coinciding cut points
    /// leave a tier empty.
    pub fn from_probabilities(probabilities: &[f64]) -> Self {
        let p25 = percentile(probabilities, 0.25).unwrap_or(0.0);
        let p75 = percentile(probabilities, 0.75).unwrap_or(0.0);

        let mut tiers = Self {
            high: 0,
            medium: 0,
            low: 0,
            p25,
            p75,
        };
        for &p in probabilities {
            if p <= p25 {
                tiers.low += 1;
            } else if p <= p75 {
                tiers.medium += 1;
            } else {
                tiers.high += 1;
            }
        }
        tiers
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Mean churn probability of customers sharing one call count
#[derive(Debug, Clone, PartialEq)]
pub struct CallCenterGroup {
    pub calls: i64,
    pub mean_risk: f64,
    pub customers: usize,
    /// 95% confidence band of the mean
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Group churn probabilities by call count, ascending
pub fn call_center_profile(calls: &[f64], probabilities: &[f64]) -> Vec<CallCenterGroup> {
    let mut groups: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (&c, &p) in calls.iter().zip(probabilities) {
        groups.entry(c.round() as i64).or_default().push(p);
    }

    groups
        .into_iter()
        .map(|(calls, risks)| {
            let m = mean(&risks).unwrap_or(0.0);
            let half_width = if risks.len() > 1 {
                let var = risks.iter().map(|r| (r - m).powi(2)).sum::<f64>()
                    / (risks.len() - 1) as f64;
                1.96 * var.sqrt() / (risks.len() as f64).sqrt()
            } else {
                0.0
            };
            CallCenterGroup {
                calls,
                mean_risk: m,
                customers: risks.len(),
                ci_low: (m - half_width).max(0.0),
                ci_high: (m + half_width).min(1.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_rank_by_absolute_coefficient() {
        let features = names(&["idade", "ligacoes_callcenter", "duracao_contrato_Mensal"]);
        let factors = rank_risk_factors(&[0.1, -0.9, 0.5], &features, &features).unwrap();

        assert_eq!(factors[0].feature, "ligacoes_callcenter");
        assert_eq!(factors[0].importance, 0.9);
        assert!(!factors[0].increases_risk());
        assert_eq!(factors[0].direction(), "Decreases risk");
        assert_eq!(factors[1].feature, "duracao_contrato_Mensal");
        assert_eq!(factors[2].feature, "idade");
    }

    #[test]
    fn test_male_dummy_is_relabeled() {
        let features = names(&["idade", "sexo_male"]);
        let factors = rank_risk_factors(&[0.1, 0.4], &features, &features).unwrap();
        assert_eq!(factors[0].feature, "sexo_female");
        assert_eq!(factors[0].coefficient, -0.4);
        assert_eq!(factors[0].importance, 0.4);
    }

    #[test]
    fn test_mismatched_names_fall_back_to_training_columns() {
        let stale = names(&["idade"]);
        let training = names(&["idade", "sexo_M"]);
        let factors = rank_risk_factors(&[0.2, -0.3], &stale, &training).unwrap();
        assert_eq!(factors[0].feature, "sexo_M");

        let result = rank_risk_factors(&[0.2, -0.3, 0.1], &stale, &training);
        assert!(matches!(result, Err(AnalysisError::FeatureMismatch { .. })));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("duracao_contrato_Mensal"), "Duracao Contrato Mensal");
        assert_eq!(title_case("sexo_M"), "Sexo M");
        assert_eq!(title_case("ligacoes_callcenter"), "Ligacoes Callcenter");
        assert_eq!(title_case("assinatura_PREMIUM"), "Assinatura Premium");
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.25), Some(1.75));
        assert_eq!(percentile(&values, 0.75), Some(3.25));
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_risk_tiers_sum_to_total() {
        let probabilities: Vec<f64> = (0..101).map(|i| i as f64 / 100.0).collect();
        let tiers = RiskTiers::from_probabilities(&probabilities);
        assert_eq!(tiers.total(), 101);
        assert_eq!(tiers.low, 26);
        assert_eq!(tiers.medium, 50);
        assert_eq!(tiers.high, 25);
    }

    #[test]
    fn test_risk_tiers_with_coinciding_cut_points() {
        let tiers = RiskTiers::from_probabilities(&[0.3; 40]);
        assert_eq!(tiers.low, 40);
        assert_eq!(tiers.medium, 0);
        assert_eq!(tiers.high, 0);

        let mut skewed = vec![0.1; 30];
        skewed.extend([0.5, 0.9]);
        let tiers = RiskTiers::from_probabilities(&skewed);
        assert_eq!(tiers.total(), 32);
        assert_eq!(tiers.medium, 0);

        assert_eq!(RiskTiers::from_probabilities(&[]).total(), 0);
    }

    #[test]
    fn test_call_center_profile() {
        let calls = [0.0, 0.0, 1.0, 5.0, 5.0, 5.0];
        let risks = [0.1, 0.3, 0.2, 0.7, 0.8, 0.9];
        let profile = call_center_profile(&calls, &risks);

        assert_eq!(profile.len(), 3);
        assert_eq!(profile[0].calls, 0);
        assert_eq!(profile[0].customers, 2);
        assert!((profile[0].mean_risk - 0.2).abs() < 1e-12);
        assert_eq!(profile[1].ci_low, profile[1].ci_high);
        assert_eq!(profile[2].calls, 5);
        assert!(profile[2].ci_low < profile[2].mean_risk);
        assert!(profile[2].ci_high > profile[2].mean_risk);
    }
}
