//! Dynamic-k label assignment and contrastive sample selection
//!
//! This crate decides, for every ground-truth instance of a reference frame,
//! which predicted queries are positives and which are negatives, and turns
//! those decisions into contrast batches for an instance-embedding loss:
//! - `dynamic_k`: cost-based assignment with a variable number of positives per ground truth
//! - `selector`: strict/loose positive-negative selection and contrast batch assembly
//! - `object_queue`: bounded per-identity embedding queues whose mean drives the sword contrast
//!
//! ```rust,ignore
//! use contrastrack::{ObjectQueue, PosNegSelector, SelectionInputs, SelectorConfig};
//!
//! let selector = PosNegSelector::new(SelectorConfig::default())?;
//! let mut queue = ObjectQueue::new(16)?;
//! queue.enqueue(track_embedding)?;
//!
//! let items = selector.select_pos_neg(&inputs, &embed_head, &queue, &mut rng)?;
//! ```

pub mod assignment;
pub mod bbox;
pub mod config;
pub mod contrast;
pub mod cost;
pub mod diagnostics;
pub mod dynamic_k;
pub mod error;
pub mod geometry;
pub mod object_queue;
pub mod selector;

pub use assignment::{get_pos_idx, Assignment, PosNegAssignment};
pub use config::{MatcherConfig, SelectorConfig};
pub use contrast::get_sword_contrast;
pub use diagnostics::{DiagnosticSink, NoopSink, OneTimeLogger};
pub use dynamic_k::dynamic_k_matching;
pub use error::{MatchError, Result};
pub use geometry::{get_in_boxes_info, InBoxesInfo};
pub use object_queue::{ObjectQueue, ObjectQueueBank};
pub use selector::{
    ContrastItem, EmbeddingHead, FrameTargets, LinearEmbeddingHead, PosNegSelector, SelectionInputs,
};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
