// Pipeline processing: assessment, cleaning rules, and joins

pub mod clean;
pub mod merge;
pub mod quality_gate;
