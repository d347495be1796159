//! Chart rendering with Plotters into in-memory PNG images

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::insights::{title_case, CallCenterGroup, RiskFactor, RiskTiers};
use crate::model::ConfusionMatrix;
use crate::stats::NumericDistribution;

const BAR_BLUE: RGBColor = RGBColor(70, 130, 180);
const RISK_UP: RGBColor = RGBColor(0xFF, 0x45, 0x00);
const RISK_DOWN: RGBColor = RGBColor(0x1E, 0x90, 0xFF);
const TIER_COLORS: [RGBColor; 3] = [
    RGBColor(0xDC, 0x39, 0x12),
    RGBColor(0xFF, 0x99, 0x00),
    RGBColor(0x10, 0x96, 0x18),
];
const SCATTER_BLUE: RGBColor = RGBColor(0, 0, 139);

/// Base64 text of a PNG image, as embedded in responses
pub fn to_base64(png: &[u8]) -> String {
    STANDARD.encode(png)
}

/// Encode a raw RGB buffer as PNG
pub fn encode_png(buffer: Vec<u8>, width: u32, height: u32) -> crate::Result<Vec<u8>> {
    let image = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow::anyhow!("pixel buffer does not match {}x{}", width, height))?;
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Draw onto a white in-memory canvas and return the PNG bytes
fn render<F>(width: u32, height: u32, draw: F) -> crate::Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend, Shift>) -> crate::Result<()>,
{
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    encode_png(buffer, width, height)
}

fn anchored(size: f64, h: HPos, v: VPos) -> TextStyle<'static> {
    ("sans-serif", size)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(h, v))
}

fn centered(size: f64) -> TextStyle<'static> {
    anchored(size, HPos::Center, VPos::Center)
}

/// Panel shown in place of a chart with nothing to plot
fn placeholder(area: &DrawingArea<BitMapBackend, Shift>, title: &str) -> crate::Result<()> {
    let (w, h) = area.dim_in_pixel();
    area.draw(&Text::new(
        title.to_string(),
        (w as i32 / 2, h as i32 / 3),
        centered(16.0),
    ))?;
    area.draw(&Text::new(
        "No data available",
        (w as i32 / 2, h as i32 / 2),
        centered(14.0),
    ))?;
    Ok(())
}

fn histogram_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    dist: &NumericDistribution,
) -> crate::Result<()> {
    let title = format!("Distribution of {}", title_case(&dist.column));
    if dist.is_degenerate() {
        return placeholder(area, &title);
    }

    let min = dist.values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = dist.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let bins = dist.bins();
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in &dist.values {
        let bin = (((v - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let y_max = *counts.iter().max().unwrap_or(&1) as f64 * 1.15;

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(45)
        .build_cartesian_2d(min..max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc(title_case(&dist.column))
        .y_desc("Frequency")
        .axis_desc_style(("sans-serif", 11))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
        let lo = min + i as f64 * width;
        Rectangle::new([(lo, 0.0), (lo + width, count as f64)], BAR_BLUE.mix(0.8).filled())
    }))?;

    let mean = dist.mean;
    chart
        .draw_series(LineSeries::new(
            vec![(mean, 0.0), (mean, y_max)],
            RED.stroke_width(2),
        ))?
        .label(format!("Mean: {:.2}", mean))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED));

    let median = dist.median;
    chart
        .draw_series(LineSeries::new(
            vec![(median, 0.0), (median, y_max)],
            GREEN.stroke_width(2),
        ))?
        .label(format!("Median: {:.2}", median))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], GREEN));

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .label_font(("sans-serif", 11))
        .draw()?;

    Ok(())
}

/// Histograms of the numeric columns in a two-column grid
pub fn render_distributions(distributions: &[NumericDistribution]) -> crate::Result<Vec<u8>> {
    let rows = distributions.len().max(1).div_ceil(2);
    render(1000, 320 * rows as u32, |root| {
        let panels = root.split_evenly((rows, 2));
        for (dist, panel) in distributions.iter().zip(panels.iter()) {
            histogram_panel(panel, dist)?;
        }
        Ok(())
    })
}

fn churn_rate_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    column: &str,
    rates: &[(String, f64)],
) -> crate::Result<()> {
    let title = format!("Churn Rate by {} (%)", title_case(column));
    if rates.is_empty() {
        return placeholder(area, &title);
    }

    let n = rates.len() as f64;
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(45)
        .build_cartesian_2d(-0.5f64..(n - 0.5), 0f64..110f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_: &f64| String::new())
        .y_desc("Churn rate (%)")
        .axis_desc_style(("sans-serif", 11))
        .draw()?;

    chart.draw_series(rates.iter().enumerate().map(|(i, (_, rate))| {
        let x = i as f64;
        Rectangle::new([(x - 0.35, 0.0), (x + 0.35, *rate)], BAR_BLUE.filled())
    }))?;

    chart.draw_series(rates.iter().enumerate().map(|(i, (level, rate))| {
        Text::new(
            format!("{}: {:.1}%", level, rate),
            (i as f64, rate + 5.0),
            centered(11.0),
        )
    }))?;

    Ok(())
}

/// One bar panel per categorical column with the churn rate of each level
pub fn render_churn_rates(columns: &[(String, Vec<(String, f64)>)]) -> crate::Result<Vec<u8>> {
    let rows = columns.len().max(1);
    render(900, 320 * rows as u32, |root| {
        if columns.is_empty() {
            return placeholder(root, "Churn Rate by Category");
        }
        let panels = root.split_evenly((rows, 1));
        for ((column, rates), panel) in columns.iter().zip(panels.iter()) {
            churn_rate_panel(panel, column, rates)?;
        }
        Ok(())
    })
}

/// Annotated heatmap of a 2x2 confusion matrix
pub fn render_confusion_matrix(matrix: &ConfusionMatrix) -> crate::Result<Vec<u8>> {
    const LABELS: [&str; 2] = ["Retained", "Churned"];

    render(600, 520, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Confusion Matrix", ("sans-serif", 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..2f64, 0f64..2f64)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_label_formatter(&|_: &f64| String::new())
            .y_label_formatter(&|_: &f64| String::new())
            .x_desc("Predicted")
            .y_desc("Actual")
            .axis_desc_style(("sans-serif", 14))
            .draw()?;

        let max = matrix.counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
        for actual in 0..2 {
            for predicted in 0..2 {
                let count = matrix.counts[actual][predicted];
                let intensity = count as f64 / max;
                let shade = |lo: u8, hi: u8| (hi as f64 - (hi - lo) as f64 * intensity) as u8;
                let fill = RGBColor(shade(8, 247), shade(48, 251), shade(107, 255));
                // actual label 0 is the top row
                let (x, y) = (predicted as f64, 1.0 - actual as f64);
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(x, y), (x + 1.0, y + 1.0)],
                    fill.filled(),
                )))?;
                let ink = if intensity > 0.5 { WHITE } else { BLACK };
                chart.draw_series(std::iter::once(Text::new(
                    count.to_string(),
                    (x + 0.5, y + 0.5),
                    centered(24.0).color(&ink),
                )))?;
            }
        }

        for (i, label) in LABELS.iter().enumerate() {
            chart.draw_series(std::iter::once(Text::new(
                label.to_string(),
                (i as f64 + 0.5, 0.05),
                anchored(13.0, HPos::Center, VPos::Bottom),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                label.to_string(),
                (0.03, 1.5 - i as f64),
                anchored(13.0, HPos::Left, VPos::Center),
            )))?;
        }

        Ok(())
    })
}

/// Horizontal bars of the top factors by importance, colored by direction
pub fn render_risk_factors(factors: &[RiskFactor]) -> crate::Result<Vec<u8>> {
    render(900, 600, |root| {
        if factors.is_empty() {
            return placeholder(root, "Top Churn Risk Factors");
        }
        let n = factors.len() as f64;
        let x_max = factors
            .iter()
            .map(|f| f.importance)
            .fold(0.0, f64::max)
            .max(1e-6)
            * 1.8;

        let mut chart = ChartBuilder::on(root)
            .caption(
                format!("Top {} Churn Risk Factors", factors.len()),
                ("sans-serif", 22),
            )
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(20)
            .build_cartesian_2d(0f64..x_max, 0f64..n)?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_label_formatter(&|_: &f64| String::new())
            .x_desc("Importance (absolute coefficient)")
            .axis_desc_style(("sans-serif", 13))
            .draw()?;

        for (i, factor) in factors.iter().enumerate() {
            // most important on top
            let y = n - i as f64 - 1.0;
            let color = if factor.increases_risk() {
                RISK_UP
            } else {
                RISK_DOWN
            };
            chart.draw_series(std::iter::once(Rectangle::new(
                [(0.0, y + 0.15), (factor.importance, y + 0.85)],
                color.filled(),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                format!("{} ({})", factor.label(), factor.direction()),
                (factor.importance + x_max * 0.01, y + 0.5),
                anchored(12.0, HPos::Left, VPos::Center),
            )))?;
        }

        Ok(())
    })
}

/// Churn probability against call-center calls with the per-count mean and 95% band
pub fn render_call_center(
    calls: &[f64],
    probabilities: &[f64],
    profile: &[CallCenterGroup],
) -> crate::Result<Vec<u8>> {
    render(900, 600, |root| {
        if profile.is_empty() {
            return placeholder(root, "Call-Center Calls vs. Churn Risk");
        }
        let x_min = calls.iter().copied().fold(f64::INFINITY, f64::min) - 0.5;
        let x_max = calls.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 0.5;

        let mut chart = ChartBuilder::on(root)
            .caption("Call-Center Calls vs. Churn Risk", ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(55)
            .build_cartesian_2d(x_min..x_max, 0f64..1f64)?;

        chart
            .configure_mesh()
            .x_desc("Call-center calls")
            .y_desc("Churn probability")
            .axis_desc_style(("sans-serif", 14))
            .draw()?;

        chart
            .draw_series(
                calls
                    .iter()
                    .zip(probabilities)
                    .map(|(&c, &p)| Circle::new((c, p), 3, SCATTER_BLUE.mix(0.2).filled())),
            )?
            .label("Individual customers")
            .legend(|(x, y)| Circle::new((x + 7, y), 3, SCATTER_BLUE.filled()));

        let band: Vec<(f64, f64)> = profile
            .iter()
            .map(|g| (g.calls as f64, g.ci_high))
            .chain(profile.iter().rev().map(|g| (g.calls as f64, g.ci_low)))
            .collect();
        chart
            .draw_series(std::iter::once(Polygon::new(band, RED.mix(0.2).filled())))?
            .label("95% confidence band")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], RED.mix(0.2).filled()));

        chart
            .draw_series(LineSeries::new(
                profile.iter().map(|g| (g.calls as f64, g.mean_risk)),
                RED.stroke_width(3),
            ))?
            .label("Mean risk")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED.stroke_width(3)));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()?;

        Ok(())
    })
}

/// Customer counts per risk tier with percentages
pub fn render_risk_tiers(tiers: &RiskTiers) -> crate::Result<Vec<u8>> {
    let bars = [
        ("High Risk", tiers.high),
        ("Medium Risk", tiers.medium),
        ("Low Risk", tiers.low),
    ];
    let total = tiers.total().max(1) as f64;
    let y_max = bars.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1) as f64 * 1.15;

    render(800, 600, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Customer Segmentation by Churn Risk", ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..2.5f64, 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(3)
            .x_label_formatter(&|x: &f64| {
                let i = x.round();
                if (x - i).abs() < 1e-6 && (0.0..=2.0).contains(&i) {
                    ["High Risk", "Medium Risk", "Low Risk"][i as usize].to_string()
                } else {
                    String::new()
                }
            })
            .x_desc("Risk group")
            .y_desc("Customers")
            .axis_desc_style(("sans-serif", 14))
            .draw()?;

        for (i, ((_, count), color)) in bars.iter().zip(TIER_COLORS.iter()).enumerate() {
            let x = i as f64;
            let height = *count as f64;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.35, 0.0), (x + 0.35, height)],
                color.filled(),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                count.to_string(),
                (x, height + y_max * 0.03),
                centered(13.0),
            )))?;
            if *count > 0 {
                chart.draw_series(std::iter::once(Text::new(
                    format!("{:.1}%", height / total * 100.0),
                    (x, height / 2.0),
                    centered(12.0).color(&WHITE),
                )))?;
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn assert_png(bytes: &[u8]) {
        assert!(bytes.len() > PNG_SIGNATURE.len());
        assert_eq!(&bytes[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_encode_png_and_base64() {
        let png = encode_png(vec![255u8; 4 * 3 * 3], 4, 3).unwrap();
        assert_png(&png);
        assert!(to_base64(&png).starts_with("iVBORw0KGgo"));
        assert!(encode_png(vec![0u8; 5], 4, 3).is_err());
    }

    #[test]
    fn test_render_distributions_with_placeholder() {
        let dists = vec![
            NumericDistribution::from_values("idade", vec![20.0, 30.0, 30.0, 45.0, 60.0]),
            NumericDistribution::from_values("total_gasto", vec![7.0; 4]),
            NumericDistribution::from_values("frequencia_uso", vec![0.5, 1.5, 2.5]),
        ];
        assert_png(&render_distributions(&dists).unwrap());
    }

    #[test]
    fn test_render_churn_rates() {
        let columns = vec![
            (
                "duracao_contrato".to_string(),
                vec![("Mensal".to_string(), 40.0), ("Anual".to_string(), 12.5)],
            ),
            ("sexo".to_string(), vec![]),
        ];
        assert_png(&render_churn_rates(&columns).unwrap());
        assert_png(&render_churn_rates(&[]).unwrap());
    }

    #[test]
    fn test_render_confusion_matrix() {
        let matrix = ConfusionMatrix::from_labels(&[0, 0, 1, 1, 1], &[0, 1, 1, 1, 0]);
        assert_png(&render_confusion_matrix(&matrix).unwrap());
        assert_png(&render_confusion_matrix(&ConfusionMatrix::default()).unwrap());
    }

    #[test]
    fn test_render_risk_factors() {
        let factors = vec![
            RiskFactor {
                feature: "ligacoes_callcenter".to_string(),
                coefficient: 0.4,
                importance: 0.4,
            },
            RiskFactor {
                feature: "duracao_contrato_Mensal".to_string(),
                coefficient: -0.2,
                importance: 0.2,
            },
        ];
        assert_png(&render_risk_factors(&factors).unwrap());
    }

    #[test]
    fn test_render_call_center() {
        let calls = [0.0, 1.0, 1.0, 4.0];
        let risks = [0.1, 0.2, 0.3, 0.7];
        let profile = crate::insights::call_center_profile(&calls, &risks);
        assert_png(&render_call_center(&calls, &risks, &profile).unwrap());
    }

    #[test]
    fn test_render_risk_tiers() {
        let tiers = RiskTiers::from_probabilities(&[0.1, 0.2, 0.3, 0.4, 0.9]);
        assert_png(&render_risk_tiers(&tiers).unwrap());
        assert_png(&render_risk_tiers(&RiskTiers::from_probabilities(&[])).unwrap());
    }
}
