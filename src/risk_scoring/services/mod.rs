mod graph_traversal;
mod score_engine;

pub use graph_traversal::DependencyDigraph;
pub use score_engine::{GraphScoring, NodeSignals, ScoreEngine};
