//! Integration tests for the churn analysis pipeline

use churnlens::data::{clean_frame, encode_features, parse_csv};
use churnlens::insights::RiskTiers;
use churnlens::{
    dispatch, AnalysisConfig, AnalysisRequest, AnalysisSession, ChurnModel, CustomerData,
    FileSource, ServiceError,
};
use std::io::Write;
use tempfile::NamedTempFile;

const CONTRACTS: [&str; 3] = ["Mensal", "Anual", "Bianual"];
const TIERS: [&str; 3] = ["Basic", "Standard", "Premium"];

/// Create a test CSV file with English headers and a churn signal on calls and contract
fn create_test_csv(rows: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "CustomerID,Age,Sex,Usage Frequency,Total Spend,Callcenter Calls,\
         Months Since Last Interaction,Subscription Tier,Contract Duration,Churned"
    )
    .unwrap();

    for i in 0..rows {
        let calls = i % 7;
        let contract = CONTRACTS[i % 3];
        let mut churned = calls > 3 || (contract == "Mensal" && i % 2 == 0);
        if i % 11 == 0 {
            churned = !churned;
        }
        // sprinkle missing values
        let age = if i % 13 == 0 {
            String::new()
        } else {
            (20 + (i * 7) % 45).to_string()
        };
        writeln!(
            file,
            "c{},{},{},{:.2},{:.2},{},{},{},{},{}",
            i,
            age,
            if i % 2 == 0 { "M" } else { "F" },
            0.5 + (i % 5) as f64 * 0.7,
            40.0 + ((i * 13) % 120) as f64,
            calls,
            1 + i % 11,
            TIERS[(i / 3) % 3],
            contract,
            u8::from(churned)
        )
        .unwrap();
    }

    file
}

fn config() -> AnalysisConfig {
    AnalysisConfig {
        credentials_present: false,
        synthetic_rows: 800,
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv(120);
    let text = std::fs::read_to_string(test_file.path()).unwrap();

    let cleaned = clean_frame(parse_csv(&text).unwrap()).unwrap();
    assert_eq!(cleaned.height(), 120);
    assert!(cleaned.column("ligacoes_callcenter").is_ok());
    assert!(cleaned.column("duracao_contrato").is_ok());

    let (matrix, names) = encode_features(&cleaned).unwrap();
    assert!(matrix.iter().all(|v| v.is_finite()));
    assert!(!names.iter().any(|n| n.contains("customerid")));
    assert_eq!(matrix.ncols(), names.len());

    let data = CustomerData::prepare(parse_csv(&text).unwrap(), &config()).unwrap();
    assert!(data.split.stratified);
    assert_eq!(data.split.test.len(), 30);

    let model = ChurnModel::fit(&data, &config()).unwrap();
    let evaluation = model.evaluate(&data).unwrap();
    assert_eq!(evaluation.confusion.total(), 30);

    let probabilities = model.predict_proba(&data.features).unwrap().to_vec();
    let tiers = RiskTiers::from_probabilities(&probabilities);
    assert_eq!(tiers.total(), data.n_customers());
}

#[test]
fn test_full_analysis_from_file() {
    let test_file = create_test_csv(90);
    let session = AnalysisSession::new(config(), Box::new(FileSource::new(test_file.path())));

    let response = dispatch(&session, &AnalysisRequest::default()).unwrap();
    assert!(response.success);

    let data = response.data.unwrap();
    assert_eq!(data["analise_exploratoria"]["total_registros"], 90);
    assert_eq!(data["analise_exploratoria"]["total_variaveis"], 10);
    assert!(data["analise_exploratoria"]["registros_validos"].as_u64().unwrap() <= 90);

    let tests = data["associacoes"]["testes"].as_array().unwrap();
    assert!(!tests.is_empty());
    for test in tests {
        assert_eq!(test["p_valor"].as_str().unwrap().split('.').nth(1).unwrap().len(), 6);
    }

    let call_rows = data["call_center_impact"]["risco_por_ligacoes"].as_array().unwrap();
    assert_eq!(call_rows.len(), 7);
    let customers: u64 = call_rows.iter().map(|r| r["clientes"].as_u64().unwrap()).sum();
    assert_eq!(customers, 90);

    let insights = &data["insights"];
    let tiers = insights["alto_risco"].as_u64().unwrap()
        + insights["medio_risco"].as_u64().unwrap()
        + insights["baixo_risco"].as_u64().unwrap();
    assert_eq!(tiers, insights["total_clientes"].as_u64().unwrap());
}

#[test]
fn test_synthetic_full_report() {
    let session = AnalysisSession::new(
        config(),
        Box::new(FileSource::new("/nonexistent/cancelamentos.csv")),
    );
    let response = dispatch(&session, &AnalysisRequest::default()).unwrap();
    let data = response.data.unwrap();

    for key in [
        "analise_exploratoria",
        "distribuicoes",
        "associacoes",
        "modelo",
        "fatores_risco",
        "call_center_impact",
        "insights",
    ] {
        assert!(data.get(key).is_some(), "missing {}", key);
        assert!(data[key].get("erro").is_none(), "stage {} failed: {}", key, data[key]);
    }

    assert_eq!(data["analise_exploratoria"]["total_registros"], 800);
    assert_eq!(data["fatores_risco"]["top_fatores"].as_array().unwrap().len(), 5);
    assert_eq!(data["fatores_risco"]["summary_top_factors"].as_array().unwrap().len(), 3);
    assert_eq!(data["call_center_impact"]["insights_text"].as_array().unwrap().len(), 3);
    assert_eq!(data["insights"]["recomendacoes"].as_array().unwrap().len(), 5);
}

#[test]
fn test_step_analysis_and_errors() {
    let test_file = create_test_csv(60);
    let session = AnalysisSession::new(config(), Box::new(FileSource::new(test_file.path())));

    let request = AnalysisRequest {
        action: Some("step_analysis".into()),
        step: Some("modelo".into()),
    };
    let data = dispatch(&session, &request).unwrap().data.unwrap();
    for metric in ["acuracia", "precisao", "recall", "f1_score"] {
        let text = data[metric].as_str().unwrap();
        assert_eq!(text.split('.').nth(1).unwrap().len(), 2);
        let value: f64 = text.parse().unwrap();
        assert!((0.0..=1.0).contains(&value));
    }
    assert!(!data["matriz_confusao_base64"].as_str().unwrap().is_empty());

    let bogus = AnalysisRequest {
        action: Some("step_analysis".into()),
        step: Some("bogus".into()),
    };
    assert!(matches!(
        dispatch(&session, &bogus),
        Err(ServiceError::InvalidStep(_))
    ));

    let ping = AnalysisRequest {
        action: Some("ping".into()),
        step: None,
    };
    let alive = dispatch(&session, &ping).unwrap();
    assert!(alive.success);
    assert!(alive.data.is_none());
    assert!(alive.timestamp.is_some());
}

#[test]
fn test_missing_label_is_a_load_failure() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "idade,sexo").unwrap();
    writeln!(file, "30,M").unwrap();

    let session = AnalysisSession::new(config(), Box::new(FileSource::new(file.path())));
    let result = dispatch(&session, &AnalysisRequest::default());
    assert!(matches!(result, Err(ServiceError::Preprocessing(_))));
}

#[test]
fn test_default_synthetic_fallback_full_analysis() {
    let config = AnalysisConfig {
        credentials_present: false,
        ..AnalysisConfig::default()
    };
    let session = AnalysisSession::new(
        config,
        Box::new(FileSource::new("/nonexistent/cancelamentos.csv")),
    );
    let data = dispatch(&session, &AnalysisRequest::default())
        .unwrap()
        .data
        .unwrap();

    assert_eq!(data["analise_exploratoria"]["total_registros"], 10_000);
    assert!(data["modelo"].get("erro").is_none());
    let accuracy: f64 = data["modelo"]["acuracia"].as_str().unwrap().parse().unwrap();
    assert!(accuracy > 0.6, "accuracy {}", accuracy);

    // more calls means more risk in the generated data
    let rows = data["call_center_impact"]["risco_por_ligacoes"].as_array().unwrap();
    let mean_risk = |keep: &dyn Fn(i64) -> bool| {
        let (weighted, customers) = rows
            .iter()
            .filter(|r| keep(r["ligacoes"].as_i64().unwrap()))
            .fold((0.0, 0.0), |(w, n), r| {
                let clients = r["clientes"].as_f64().unwrap();
                (w + r["risco_medio"].as_f64().unwrap() * clients, n + clients)
            });
        weighted / customers
    };
    assert!(mean_risk(&|calls| calls >= 5) > mean_risk(&|calls| calls <= 1));
}
