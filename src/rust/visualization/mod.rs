//! Two-dimensional projections of the embedding space and terminal charts.

mod plot;
mod projection;

pub use plot::{projection_figure, roc_figure, Figure, PlotError, Series, SeriesKind, PALETTE};
pub use projection::{effective_perplexity, project_tsne, Projection, ProjectionError, TsneOptions};
