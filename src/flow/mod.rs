// src/flow/mod.rs — Single-listing draft flow: state machine, answers, categories

pub mod category;
pub mod draft;
pub mod input;

pub use category::{CategoryTree, NodeId};
pub use draft::{Draft, FlowState, PreservedValues, SelectedCategory, StepError};
