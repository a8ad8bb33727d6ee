//! Terminal line plots.

const GLYPHS: [char; 5] = ['█', '*', '+', 'o', 'x'];

#[derive(Debug, Clone)]
struct Series {
    label: String,
    points: Vec<(f64, f64)>,
}

/// ASCII line plot of one or more `(x, y)` series.
///
/// Non-finite points are dropped; on a logarithmic x axis so are points
/// with `x <= 0`.
///
/// ```rust
/// use minilearn_train::LinePlot;
///
/// let text = LinePlot::new(20, 5)
///     .title("loss")
///     .series("train", [(0.0, 1.0), (1.0, 0.5), (2.0, 0.25)])
///     .render();
/// assert!(text.contains("loss"));
/// ```
#[derive(Debug, Clone)]
pub struct LinePlot {
    width: usize,
    height: usize,
    log_x: bool,
    title: Option<String>,
    series: Vec<Series>,
}

impl LinePlot {
    /// Empty plot of `width` x `height` cells.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(2),
            height: height.max(2),
            log_x: false,
            title: None,
            series: Vec::new(),
        }
    }

    /// Use a base-10 logarithmic x axis.
    #[must_use]
    pub fn log_x(mut self, log_x: bool) -> Self {
        self.log_x = log_x;
        self
    }

    /// Set the header label.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a series.
    #[must_use]
    pub fn series(mut self, label: impl Into<String>, points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        self.series.push(Series {
            label: label.into(),
            points: points.into_iter().collect(),
        });
        self
    }

    /// Add a series plotted against its index.
    #[must_use]
    pub fn indexed(self, label: impl Into<String>, values: &[f64]) -> Self {
        let points = values.iter().enumerate().map(|(i, &v)| (i as f64, v));
        self.series(label, points)
    }

    fn project_x(&self, x: f64) -> Option<f64> {
        match (self.log_x, x.is_finite()) {
            (_, false) => None,
            (true, true) if x <= 0.0 => None,
            (true, true) => Some(x.log10()),
            (false, true) => Some(x),
        }
    }

    /// Render to a string; empty if there is nothing to draw.
    #[must_use]
    pub fn render(&self) -> String {
        let projected: Vec<Vec<(f64, f64)>> = self
            .series
            .iter()
            .map(|s| {
                s.points
                    .iter()
                    .filter(|(_, y)| y.is_finite())
                    .filter_map(|&(x, y)| self.project_x(x).map(|px| (px, y)))
                    .collect()
            })
            .collect();

        let all = projected.iter().flatten();
        let (x_min, x_max, y_min, y_max) = all.fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), &(x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
        );
        if !x_min.is_finite() {
            return String::new();
        }
        let x_range = (x_max - x_min).max(1e-12);
        let y_range = (y_max - y_min).max(1e-12);

        let mut grid = vec![vec![' '; self.width]; self.height];
        for (i, points) in projected.iter().enumerate() {
            let glyph = GLYPHS[i % GLYPHS.len()];
            for &(x, y) in points {
                let col = (((x - x_min) / x_range) * (self.width - 1) as f64).round() as usize;
                let row = ((1.0 - (y - y_min) / y_range) * (self.height - 1) as f64).round() as usize;
                grid[row.min(self.height - 1)][col.min(self.width - 1)] = glyph;
            }
        }

        let mut output = String::new();
        let label = self.title.as_deref().unwrap_or("");
        output.push_str(&format!("┌─ {} ", label));
        output.push_str(&"─".repeat((self.width + 7).saturating_sub(label.chars().count())));
        output.push_str("┐\n");

        for (i, row) in grid.iter().enumerate() {
            if i == 0 {
                output.push_str(&format!("│{:>9.3e} ", y_max));
            } else if i == self.height - 1 {
                output.push_str(&format!("│{:>9.3e} ", y_min));
            } else {
                output.push_str("│          ");
            }
            output.extend(row.iter());
            output.push_str("│\n");
        }

        output.push('└');
        output.push_str(&"─".repeat(self.width + 10));
        output.push_str("┘\n");

        let (lo, hi) = if self.log_x {
            (10f64.powf(x_min), 10f64.powf(x_max))
        } else {
            (x_min, x_max)
        };
        output.push_str(&format!(
            "           x: {:.3e} → {:.3e}{}\n",
            lo,
            hi,
            if self.log_x { " (log)" } else { "" }
        ));

        if self.series.len() > 1 {
            for (i, s) in self.series.iter().enumerate() {
                output.push_str(&format!("           {} {}\n", GLYPHS[i % GLYPHS.len()], s.label));
            }
        }

        output
    }
}
