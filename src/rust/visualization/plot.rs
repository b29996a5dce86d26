use std::io::{self, IsTerminal, Stdout};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use log::info;
use ratatui::prelude::*;
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, LegendPosition};

use super::projection::Projection;
use crate::evaluation::RocReport;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Ten-color cycle used for class series.
pub const PALETTE: [Color; 10] = [
    Color::Rgb(31, 119, 180),
    Color::Rgb(255, 127, 14),
    Color::Rgb(44, 160, 44),
    Color::Rgb(214, 39, 40),
    Color::Rgb(148, 103, 189),
    Color::Rgb(140, 86, 75),
    Color::Rgb(227, 119, 194),
    Color::Rgb(127, 127, 127),
    Color::Rgb(188, 189, 34),
    Color::Rgb(23, 190, 207),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Line,
    Scatter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend entry; unnamed series are left out of the legend.
    pub name: Option<String>,
    pub points: Vec<(f64, f64)>,
    pub color: Color,
    pub kind: SeriesKind,
}

impl Series {
    pub fn new(points: Vec<(f64, f64)>, color: Color, kind: SeriesKind) -> Self {
        Self {
            name: None,
            points,
            color,
            kind,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A chart that can be drawn into any ratatui frame or shown full-screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            x_bounds: [0.0, 1.0],
            y_bounds: [0.0, 1.0],
            series: Vec::new(),
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_bounds(mut self, x_bounds: [f64; 2], y_bounds: [f64; 2]) -> Self {
        self.x_bounds = x_bounds;
        self.y_bounds = y_bounds;
        self
    }

    /// Sets both axis ranges to the extent of the data plus a 5% margin.
    pub fn fit_bounds(self) -> Self {
        let x = padded_extent(self.series.iter().flat_map(|s| s.points.iter().map(|p| p.0)));
        let y = padded_extent(self.series.iter().flat_map(|s| s.points.iter().map(|p| p.1)));
        self.with_bounds(x, y)
    }

    pub fn legend(&self) -> Vec<&str> {
        self.series.iter().filter_map(|s| s.name.as_deref()).collect()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let datasets: Vec<Dataset> = self
            .series
            .iter()
            .map(|series| {
                let dataset = Dataset::default()
                    .marker(symbols::Marker::Braille)
                    .graph_type(match series.kind {
                        SeriesKind::Line => GraphType::Line,
                        SeriesKind::Scatter => GraphType::Scatter,
                    })
                    .style(Style::default().fg(series.color))
                    .data(&series.points);
                match &series.name {
                    Some(name) => dataset.name(name.clone()),
                    None => dataset,
                }
            })
            .collect();

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .title(self.title.clone())
                    .title_bottom(Line::from("press any key to continue").right_aligned())
                    .borders(Borders::ALL),
            )
            .legend_position(Some(LegendPosition::TopRight))
            .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(3, 4)))
            .x_axis(axis(&self.x_label, self.x_bounds))
            .y_axis(axis(&self.y_label, self.y_bounds));
        frame.render_widget(chart, area);
    }

    /// Shows the figure on the alternate screen until a key is pressed.
    ///
    /// Returns `Ok(false)` without drawing when stdout is not a terminal.
    pub fn show(&self) -> Result<bool, PlotError> {
        if !io::stdout().is_terminal() {
            info!("stdout is not a terminal, skipping chart '{}'", self.title);
            return Ok(false);
        }

        let mut screen = ScreenGuard::enter()?;
        loop {
            screen.terminal.draw(|f| {
                let area = f.area();
                self.render(f, area);
            })?;
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
        Ok(true)
    }
}

fn axis<'a>(title: &'a str, bounds: [f64; 2]) -> Axis<'a> {
    let middle = (bounds[0] + bounds[1]) / 2.0;
    Axis::default()
        .title(title)
        .bounds(bounds)
        .labels(vec![
            Line::from(format!("{:.2}", bounds[0])),
            Line::from(format!("{:.2}", middle)),
            Line::from(format!("{:.2}", bounds[1])),
        ])
}

fn padded_extent(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        return [0.0, 1.0];
    }
    let margin = ((max - min) * 0.05).max(1e-6);
    [min - margin, max + margin]
}

// Raw mode and the alternate screen are released on drop, including on error paths.
struct ScreenGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl ScreenGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Scatter plot of the projection, one colored series per class.
///
/// Legend entries read `"<code>: <label>"`.
pub fn projection_figure(projection: &Projection) -> Figure {
    projection
        .classes
        .iter()
        .enumerate()
        .fold(
            Figure::new("Embeddings visualized with t-SNE", "Component 1", "Component 2"),
            |figure, (code, class)| {
                figure.with_series(
                    Series::new(
                        projection.points_of(code),
                        PALETTE[code % PALETTE.len()],
                        SeriesKind::Scatter,
                    )
                    .named(format!("{}: {}", code, class)),
                )
            },
        )
        .fit_bounds()
}

/// Both mean ROC curves and the chance diagonal on the unit square.
pub fn roc_figure(report: &RocReport) -> Figure {
    let colors = [Color::Blue, Color::Red];
    report
        .curves()
        .iter()
        .zip(colors)
        .fold(
            Figure::new(
                format!("Mean ROC curve for K={}", report.k),
                "False Positive Rate",
                "True Positive Rate",
            ),
            |figure, (curve, color)| {
                let points = curve.fpr.iter().copied().zip(curve.tpr.iter().copied()).collect();
                let name = format!("{} AUC = {:.2}", curve.metric.title(), curve.auc);
                figure.with_series(Series::new(points, color, SeriesKind::Line).named(name))
            },
        )
        .with_series(Series::new(vec![(0.0, 0.0), (1.0, 1.0)], Color::DarkGray, SeriesKind::Line))
        .with_bounds([0.0, 1.0], [0.0, 1.0])
}
