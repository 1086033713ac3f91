pub mod analyzer;
pub mod geometry;
pub mod phase;
pub mod reps;
pub mod scoring;
pub mod side;

pub use analyzer::{FormAnalysisResult, FrameReport, QualityBand, SquatAnalyzer};
pub use phase::{PhaseMachine, PhaseUpdate, SquatPhase};
pub use reps::{
    CompletedRep, PerformanceTrend, RepAggregator, RepKind, SessionAggregate, SessionSummary,
};
pub use scoring::{CoachingCue, FormMetrics, FormScore, FormScorer};
pub use side::{BodySide, SideJoints, SideSelector};
