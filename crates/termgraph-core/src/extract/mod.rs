//! Rule-based extractors over validated text
//!
//! Each extractor consumes the same validated entity list and produces one
//! structured artifact: recognized pattern instances, causal stage chains,
//! or the strict five-level concept hierarchy. None of them raise on "no
//! results": they return valid-but-empty structures, and only a failed
//! validation yields `valid: false`.

mod chain;
mod hierarchy;
mod pattern;

pub use chain::{
    CausalChain, CausalChainExtractor, ChainExtraction, ChainOptions, InterventionPoint,
    ProcessCategory, Stage,
};
pub use hierarchy::{
    ConceptHierarchy, ConceptNode, CrossConnection, CrossRelation, HierarchyExtraction,
    HierarchyExtractor, HierarchyLevel, TechniqueLexicon, ALLOWED_ROOTS,
};
pub use pattern::{Pattern, PatternCategory, PatternExtraction, PatternExtractor};
