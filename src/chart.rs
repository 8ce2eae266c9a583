//! Chart geometry for the rate history.
//!
//! [`ChartLayout::compute`] turns the current [`TimeSeries`] into draw
//! coordinates (origin top-left, y growing downwards). The terminal
//! dashboard paints it on a canvas and [`ChartLayout::to_svg`] writes the
//! same picture as an SVG document. Every frame is a full recompute.

use std::fmt::Write as _;

use crate::series::TimeSeries;

/// Smallest value the vertical axis ever tops out at, in Mbps.
pub const AXIS_FLOOR: f64 = 10.0;
pub const GRID_DIVISIONS: usize = 4;
pub const PADDING: f64 = 28.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChartArea {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridLine {
    pub y: f64,
    pub value: f64,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartLayout {
    pub area: ChartArea,
    pub max_val: f64,
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub download: Vec<(f64, f64)>,
    pub upload: Vec<(f64, f64)>,
    pub grid: Vec<GridLine>,
}

pub fn autoscale(series: &TimeSeries) -> f64 {
    series.iter().map(|p| p.peak()).fold(1.0_f64.max(AXIS_FLOOR), f64::max)
}

impl ChartLayout {
    pub fn compute(series: &TimeSeries, area: ChartArea) -> Self {
        let inner_w = (area.width - PADDING * 2.0).max(1.0);
        let inner_h = (area.height - PADDING * 2.0).max(1.0);
        let max_val = autoscale(series);
        let n = series.len();

        let x_at = |i: usize| {
            if n > 1 {
                PADDING + (i as f64 / (n - 1) as f64) * inner_w
            } else {
                PADDING + inner_w / 2.0
            }
        };
        let y_at = |v: f64| PADDING + inner_h * (1.0 - v / max_val);

        let download = series.iter().enumerate().map(|(i, p)| (x_at(i), y_at(p.download_mbps))).collect();
        let upload = series.iter().enumerate().map(|(i, p)| (x_at(i), y_at(p.upload_mbps))).collect();

        let grid = (0..=GRID_DIVISIONS)
            .map(|i| {
                let frac = i as f64 / GRID_DIVISIONS as f64;
                let value = max_val * (1.0 - frac);
                GridLine { y: PADDING + inner_h * frac, value, label: format!("{value:.0}") }
            })
            .collect();

        Self {
            area,
            max_val,
            left: PADDING,
            right: PADDING + inner_w,
            top: PADDING,
            bottom: PADDING + inner_h,
            download,
            upload,
            grid,
        }
    }

    pub fn to_svg(&self) -> String {
        let (w, h) = (self.area.width, self.area.height);
        let mut out = String::new();
        let _ = write!(
            out,
            r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"##
        );
        let _ = write!(out, r##"<rect x="0" y="0" width="{w}" height="{h}" rx="14" fill="#0b1220"/>"##);
        for line in &self.grid {
            let _ = write!(
                out,
                r##"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="#1f2937" stroke-width="1"/>"##,
                self.left,
                self.right,
                y = line.y
            );
            let _ = write!(
                out,
                r##"<text x="{}" y="{}" fill="#94a3b8" font-size="10" text-anchor="end">{}</text>"##,
                self.left - 8.0,
                line.y + 4.0,
                line.label
            );
        }
        for (points, color) in [(&self.download, "#60a5fa"), (&self.upload, "#34d399")] {
            if points.is_empty() {
                continue;
            }
            let coords: Vec<String> = points.iter().map(|(x, y)| format!("{x},{y}")).collect();
            let _ = write!(
                out,
                r##"<polyline points="{}" fill="none" stroke="{color}" stroke-width="3" stroke-linecap="round" stroke-linejoin="round"/>"##,
                coords.join(" ")
            );
        }
        out.push_str("</svg>\n");
        out
    }
}
