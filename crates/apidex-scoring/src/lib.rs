//! Apidex Scoring - artifact-driven score evaluation

pub mod definition;
pub mod engine;
pub mod score;

pub use definition::{
    ArtifactRef, BooleanType, Formula, IntegerType, PercentType, RollupFormula, ScoreDefinition,
    ScoreFormula, ValueType,
};
pub use engine::ScoringEngine;
pub use score::{Score, ScoreValue, Severity};
