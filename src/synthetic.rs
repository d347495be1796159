//! Seeded synthetic customer dataset used when object storage is unreachable
//! and no cloud credentials are configured

use polars::prelude::*;
use rand::distributions::{Bernoulli, Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp, Normal, Poisson};
use tracing::info;

use crate::error::LoadError;

/// Draw `n` categorical values with the given probabilities
fn choose(rng: &mut StdRng, n: usize, levels: &[(&str, f64)]) -> Result<Vec<String>, LoadError> {
    let weights = WeightedIndex::new(levels.iter().map(|(_, p)| *p))
        .map_err(|e| LoadError::Synthetic(e.to_string()))?;
    Ok((0..n)
        .map(|_| levels[weights.sample(rng)].0.to_string())
        .collect())
}

/// Assemble generated columns into a frame
fn assemble(columns: Vec<Column>) -> Result<DataFrame, LoadError> {
    DataFrame::new(columns).map_err(|e| LoadError::Synthetic(e.to_string()))
}

/// Churn probability of one synthetic customer before clipping
fn churn_probability(
    age: i64,
    sex: &str,
    usage: f64,
    spend: f64,
    calls: i64,
    contract: &str,
) -> f64 {
    let mut p = 0.0;
    if age < 25 {
        p += 0.15;
    }
    if calls > 3 {
        p += 0.3;
    }
    if usage < 1.0 {
        p += 0.2;
    }
    if spend < 50.0 {
        p += 0.1;
    }
    if contract == "Mensal" {
        p += 0.2;
    }
    if sex == "F" {
        p += 0.05;
    }
    p
}

/// Generate `n_samples` customers with the stored dataset's schema.
///
/// The same seed always yields the same frame.
pub fn generate_customers(n_samples: usize, seed: u64) -> Result<DataFrame, LoadError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let err = |e: &dyn std::fmt::Display| LoadError::Synthetic(e.to_string());

    let age_dist = Normal::new(35.0_f64, 10.0).map_err(|e| err(&e))?;
    let usage_dist = Exp::new(0.5).map_err(|e| err(&e))?;
    let spend_dist = Normal::new(100.0, 30.0).map_err(|e| err(&e))?;
    let calls_dist = Poisson::new(2.0).map_err(|e| err(&e))?;

    let age: Vec<i64> = (0..n_samples)
        .map(|_| age_dist.sample(&mut rng).trunc() as i64)
        .collect();
    let sex = choose(&mut rng, n_samples, &[("M", 0.48), ("F", 0.52)])?;
    let usage: Vec<f64> = (0..n_samples).map(|_| usage_dist.sample(&mut rng)).collect();
    let spend: Vec<f64> = (0..n_samples).map(|_| spend_dist.sample(&mut rng)).collect();
    let calls: Vec<i64> = (0..n_samples)
        .map(|_| calls_dist.sample(&mut rng) as i64)
        .collect();
    let months: Vec<i64> = (0..n_samples).map(|_| rng.gen_range(1..12)).collect();
    let tier = choose(
        &mut rng,
        n_samples,
        &[("Basic", 0.4), ("Premium", 0.2), ("Standard", 0.4)],
    )?;
    let contract = choose(
        &mut rng,
        n_samples,
        &[("Mensal", 0.5), ("Anual", 0.3), ("Bianual", 0.2)],
    )?;

    let mut churned = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let p = churn_probability(age[i], &sex[i], usage[i], spend[i], calls[i], &contract[i])
            .clamp(0.05, 0.8);
        let draw = Bernoulli::new(p).map_err(|e| err(&e))?;
        churned.push(i32::from(draw.sample(&mut rng)));
    }

    let df = assemble(vec![
        Series::new("idade".into(), age).into(),
        Series::new("sexo".into(), sex).into(),
        Series::new("frequencia_uso".into(), usage).into(),
        Series::new("total_gasto".into(), spend).into(),
        Series::new("ligacoes_callcenter".into(), calls).into(),
        Series::new("meses_ultima_interacao".into(), months).into(),
        Series::new("assinatura".into(), tier).into(),
        Series::new("duracao_contrato".into(), contract).into(),
        Series::new("cancelou".into(), churned).into(),
    ])?;

    info!(rows = df.height(), columns = df.width(), seed, "Synthetic dataset generated");
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_and_size() {
        let df = generate_customers(500, 42).unwrap();
        assert_eq!(df.shape(), (500, 9));
        for name in [
            "idade",
            "sexo",
            "frequencia_uso",
            "total_gasto",
            "ligacoes_callcenter",
            "meses_ultima_interacao",
            "assinatura",
            "duracao_contrato",
            "cancelou",
        ] {
            assert!(df.column(name).is_ok(), "missing column {}", name);
        }
    }

    #[test]
    fn test_ragged_columns_are_a_synthetic_error() {
        let result = assemble(vec![
            Series::new("idade".into(), vec![30i64, 40]).into(),
            Series::new("cancelou".into(), vec![1i32]).into(),
        ]);
        match result {
            Err(LoadError::Synthetic(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = generate_customers(200, 42).unwrap();
        let b = generate_customers(200, 42).unwrap();
        assert!(a.equals(&b));

        let c = generate_customers(200, 7).unwrap();
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_churn_rate_is_plausible() {
        let df = generate_customers(5000, 42).unwrap();
        let labels = df.column("cancelou").unwrap().cast(&DataType::Float64).unwrap();
        let rate = labels.f64().unwrap().mean().unwrap();
        // clipped probabilities bound the expected rate
        assert!(rate > 0.05 && rate < 0.8, "rate {}", rate);
    }

    #[test]
    fn test_churn_probability_weights() {
        assert_eq!(churn_probability(40, "M", 2.0, 100.0, 1, "Anual"), 0.0);
        let max = churn_probability(20, "F", 0.5, 30.0, 5, "Mensal");
        assert!((max - 1.0).abs() < 1e-12);
        assert_eq!(max.clamp(0.05, 0.8), 0.8);
    }
}
