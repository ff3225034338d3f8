//! Outbound plotting requests.
//!
//! The orchestrator never draws anything itself; it hands [`Plot`] values and
//! progress updates to a [`Visualizer`].

use log::{debug, info};

use crate::ProblemPoint;
use crate::controller::TrainingState;

/// A plotting request.
#[derive(Debug, Clone, PartialEq)]
pub enum Plot {
    /// The filtered dataset as raw points.
    Points(Vec<ProblemPoint>),
    /// Regression curve as denormalized `(sqft_living, price)` pairs.
    PredictionLine { points: Vec<(f32, f32)> },
    /// One probability grid per model output.
    ///
    /// `values[col][row]`: columns run left to right over `sqft_living`, rows top
    /// to bottom over decreasing `price`.
    Heatmap {
        name: String,
        values: Vec<Vec<f32>>,
        x_ticks: Vec<f32>,
        y_ticks: Vec<f32>,
    },
}

pub trait Visualizer {
    fn render(&mut self, plot: Plot);

    /// Called after every epoch.
    fn progress(&mut self, _state: &TrainingState) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn render(&mut self, _plot: Plot) {}
}

/// Logs a one-line summary of each request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVisualizer;

impl Visualizer for LogVisualizer {
    fn render(&mut self, plot: Plot) {
        match plot {
            Plot::Points(points) => debug!("plot: {} points", points.len()),
            Plot::PredictionLine { points } => {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    debug!(
                        "plot: prediction line {:.0}sqft=${:.0} .. {:.0}sqft=${:.0}",
                        first.0, first.1, last.0, last.1
                    );
                }
            }
            Plot::Heatmap { name, values, .. } => {
                let rows = values.first().map_or(0, Vec::len);
                debug!("plot: heatmap {name} ({}x{rows})", values.len());
            }
        }
    }

    fn progress(&mut self, state: &TrainingState) {
        info!(
            "epoch {} loss={} min={} elapsed={}ms",
            state.current_epoch,
            fmt_loss(state.current_loss),
            fmt_loss(state.min_loss),
            state.elapsed_ms
        );
    }
}

fn fmt_loss(loss: Option<f32>) -> String {
    loss.map_or_else(|| "-".to_owned(), |l| format!("{l:.6}"))
}

/// Keeps every request; handy in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingVisualizer {
    pub plots: Vec<Plot>,
    pub progress: Vec<TrainingState>,
}

impl Visualizer for RecordingVisualizer {
    fn render(&mut self, plot: Plot) {
        self.plots.push(plot);
    }

    fn progress(&mut self, state: &TrainingState) {
        self.progress.push(*state);
    }
}

impl<V: Visualizer + ?Sized> Visualizer for Box<V> {
    fn render(&mut self, plot: Plot) {
        (**self).render(plot);
    }

    fn progress(&mut self, state: &TrainingState) {
        (**self).progress(state);
    }
}
