use crate::sequencer::SimulationResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

/// Colours cycled across beats.
pub const BEAT_PALETTE: [Color; 10] = [
    Color(0x1f77b4),
    Color(0xff7f0e),
    Color(0x2ca02c),
    Color(0xd62728),
    Color(0x9467bd),
    Color(0x8c564b),
    Color(0xe377c2),
    Color(0x7f7f7f),
    Color(0xbcbd22),
    Color(0x17becf),
];

pub const THRESHOLD_COLOR: Color = Color(0xFF0000);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        let init = (first[0], first[0], first[1], first[1]);
        Some(points.fold(init, |(x0, x1, y0, y1), p| {
            (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1]))
        }))
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// One line per beat, labelled with its resistance, plus a dashed `v_min`
/// reference when given.
pub fn figure_from_simulation_limit(
    result: &SimulationResult,
    v_min: Option<f64>,
    max_points_per_beat: usize,
) -> Figure {
    let mut fig = Figure::new(Some("Pacemaker discharge pulses (RC model)".into()));
    fig.x.label = Some("Time (s)".into());
    fig.y.label = Some("Voltage (V)".into());
    for beat in result.iter_beats() {
        let points: Vec<[f64; 2]> = beat
            .time
            .iter()
            .zip(beat.voltage)
            .map(|(t, v)| [*t, *v])
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: format!("Beat {} (R={:.0} Ω)", beat.index + 1, beat.record.resistance),
            points: decimate_points(&points, max_points_per_beat),
            style: Style {
                width: 2.5,
                dash: None,
                color: BEAT_PALETTE[beat.index % BEAT_PALETTE.len()],
            },
        }));
    }
    if let (Some(v_min), Some(&t0), Some(&t1)) =
        (v_min, result.time().first(), result.time().last())
    {
        fig.add_series(Series::Line(LineSeries {
            name: "V_min".into(),
            points: vec![[t0, v_min], [t1, v_min]],
            style: Style {
                width: 1.0,
                dash: Some([4.0, 4.0]),
                color: THRESHOLD_COLOR,
            },
        }));
    }
    fig
}

pub fn figure_from_simulation(result: &SimulationResult, v_min: Option<f64>) -> Figure {
    figure_from_simulation_limit(result, v_min, 1024)
}
