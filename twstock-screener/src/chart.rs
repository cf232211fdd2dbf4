//! SVG chart rendering.
//!
//! Four panels per stock: close with moving averages, MACD, daily volume and
//! monthly revenue. Up bars are red and down bars green, the local market
//! convention.

use async_trait::async_trait;
use plotters::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use twstock_common::config::ChartConfig;

use crate::data::{RawPriceRow, RevenueRow, StockId};
use crate::error::CollaboratorError;
use crate::indicators::IndicatorSnapshot;

/// Revenue months shown on the revenue panel.
const REVENUE_MONTHS: usize = 12;

/// Input for one stock's charts.
#[derive(Debug, Clone)]
pub struct ChartRequest {
    pub stock_id: StockId,
    pub name: Option<String>,
    /// Ascending by date
    pub prices: Vec<RawPriceRow>,
    /// One per price row, same order
    pub snapshots: Vec<IndicatorSnapshot>,
    /// Ascending by month
    pub revenue: Vec<RevenueRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    PriceMa,
    Macd,
    Volume,
    Revenue,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceMa => "price_ma",
            Self::Macd => "macd",
            Self::Volume => "volume",
            Self::Revenue => "revenue",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered chart file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    pub path: PathBuf,
}

/// Renders charts for one stock.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, request: &ChartRequest) -> Result<Vec<ChartArtifact>, CollaboratorError>;
}

// ============================================================================
// SVG renderer
// ============================================================================

struct Line<'a> {
    label: &'a str,
    values: Vec<Option<f64>>,
    color: RGBColor,
}

impl<'a> Line<'a> {
    fn new(label: &'a str, values: Vec<Option<f64>>, color: RGBColor) -> Self {
        Self {
            label,
            values,
            color,
        }
    }
}

const ORANGE: RGBColor = RGBColor(255, 140, 0);
const PURPLE: RGBColor = RGBColor(128, 0, 160);

/// Writes SVG files with `plotters`.
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    output_dir: PathBuf,
    width: u32,
    height: u32,
}

impl SvgChartRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            width,
            height,
        }
    }

    pub fn from_config(config: &ChartConfig) -> Self {
        Self::new(config.resolved_output_dir(), config.width, config.height)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, request: &ChartRequest, kind: ChartKind) -> PathBuf {
        let date = request
            .prices
            .last()
            .map(|p| p.date.format("%Y%m%d").to_string())
            .unwrap_or_default();
        self.output_dir
            .join(format!("{}_{}_{}.svg", request.stock_id, date, kind))
    }

    fn title(request: &ChartRequest, what: &str) -> String {
        match &request.name {
            Some(name) => format!("{} {} - {}", request.stock_id, name, what),
            None => format!("{} - {}", request.stock_id, what),
        }
    }

    fn render_sync(&self, request: &ChartRequest) -> Result<Vec<ChartArtifact>, CollaboratorError> {
        if request.prices.is_empty() {
            return Err(CollaboratorError::Render(format!(
                "no price rows for {}",
                request.stock_id
            )));
        }
        std::fs::create_dir_all(&self.output_dir)?;

        let size = (self.width, self.height);
        let labels: Vec<String> = request
            .prices
            .iter()
            .map(|p| p.date.format("%m/%d").to_string())
            .collect();
        let mut artifacts = Vec::new();

        let closes: Vec<Option<f64>> = request.prices.iter().map(|p| Some(p.close)).collect();
        let pick = |f: fn(&IndicatorSnapshot) -> Option<f64>| -> Vec<Option<f64>> {
            request.snapshots.iter().map(f).collect()
        };

        let path = self.path_for(request, ChartKind::PriceMa);
        draw_panel(
            &path,
            size,
            &Self::title(request, "收盤價與均線"),
            &labels,
            &[
                Line::new("收盤", closes, BLACK),
                Line::new("MA5", pick(|s| s.ma5), ORANGE),
                Line::new("MA20", pick(|s| s.ma20), BLUE),
                Line::new("MA60", pick(|s| s.ma60), PURPLE),
            ],
            None,
        )?;
        artifacts.push(ChartArtifact {
            kind: ChartKind::PriceMa,
            path,
        });

        if request.snapshots.iter().any(|s| s.macd_dif.is_some()) {
            let osc: Vec<f64> = request
                .snapshots
                .iter()
                .map(|s| s.macd_osc.unwrap_or(0.0))
                .collect();
            let path = self.path_for(request, ChartKind::Macd);
            draw_panel(
                &path,
                size,
                &Self::title(request, "MACD"),
                &labels,
                &[
                    Line::new("DIF", pick(|s| s.macd_dif), BLUE),
                    Line::new("MACD", pick(|s| s.macd_signal), ORANGE),
                ],
                Some(&osc),
            )?;
            artifacts.push(ChartArtifact {
                kind: ChartKind::Macd,
                path,
            });
        }

        let volumes: Vec<f64> = request.prices.iter().map(|p| p.volume as f64).collect();
        let path = self.path_for(request, ChartKind::Volume);
        draw_panel(
            &path,
            size,
            &Self::title(request, "成交量(張)"),
            &labels,
            &[],
            Some(&volumes),
        )?;
        artifacts.push(ChartArtifact {
            kind: ChartKind::Volume,
            path,
        });

        if !request.revenue.is_empty() {
            let skip = request.revenue.len().saturating_sub(REVENUE_MONTHS);
            let recent = &request.revenue[skip..];
            let months: Vec<String> = recent
                .iter()
                .map(|r| r.month.format("%Y-%m").to_string())
                .collect();
            let revenue: Vec<f64> = recent.iter().map(|r| r.revenue).collect();
            let path = self.path_for(request, ChartKind::Revenue);
            draw_panel(
                &path,
                size,
                &Self::title(request, "營業收入(億)"),
                &months,
                &[],
                Some(&revenue),
            )?;
            artifacts.push(ChartArtifact {
                kind: ChartKind::Revenue,
                path,
            });
        }

        Ok(artifacts)
    }
}

#[async_trait]
impl ChartRenderer for SvgChartRenderer {
    async fn render(
        &self,
        request: &ChartRequest,
    ) -> Result<Vec<ChartArtifact>, CollaboratorError> {
        // Plotting and file writes block; keep them off the runtime workers
        let renderer = self.clone();
        let owned = request.clone();
        let artifacts = tokio::task::spawn_blocking(move || renderer.render_sync(&owned))
            .await
            .map_err(render_err)??;
        tracing::debug!(
            stock_id = %request.stock_id,
            count = artifacts.len(),
            dir = %self.output_dir.display(),
            "Charts rendered"
        );
        Ok(artifacts)
    }
}

fn render_err<E: fmt::Display>(e: E) -> CollaboratorError {
    CollaboratorError::Render(e.to_string())
}

/// Y bounds over every defined value, with a little headroom.
fn y_range(lines: &[Line<'_>], bars: Option<&[f64]>) -> (f64, f64) {
    let mut values: Vec<f64> = lines
        .iter()
        .flat_map(|l| l.values.iter().flatten().copied())
        .collect();
    if let Some(bars) = bars {
        values.extend_from_slice(bars);
        values.push(0.0);
    }

    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// One chart: optional bars (red up, green down) under any number of lines.
fn draw_panel(
    path: &Path,
    size: (u32, u32),
    title: &str,
    labels: &[String],
    lines: &[Line<'_>],
    bars: Option<&[f64]>,
) -> Result<(), CollaboratorError> {
    let n = labels.len().max(1);
    let (y_min, y_max) = y_range(lines, bars);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22).into_font())
        .margin(12)
        .x_label_area_size(36)
        .y_label_area_size(64)
        .build_cartesian_2d(0usize..n, y_min..y_max)
        .map_err(render_err)?;

    let x_fmt = |i: &usize| labels.get(*i).cloned().unwrap_or_default();
    chart
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_fmt)
        .draw()
        .map_err(render_err)?;

    if let Some(bars) = bars {
        chart
            .draw_series(bars.iter().enumerate().map(|(i, &v)| {
                let color = if v >= 0.0 { RED } else { GREEN };
                Rectangle::new([(i, 0.0), (i + 1, v)], color.mix(0.7).filled())
            }))
            .map_err(render_err)?;
    }

    for line in lines {
        let color = line.color;
        let points: Vec<(usize, f64)> = line
            .values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();
        if points.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(render_err)?
            .label(line.label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    if !lines.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}
