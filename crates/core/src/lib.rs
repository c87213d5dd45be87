//! Core library for drawkit
//!
//! This crate implements the **Functional Core** of the diagram pipeline,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! - **`drawkit_core`** (this crate): Pure transformation functions with zero I/O
//! - **`drawkit`**: Model calls, subprocess execution and orchestration (the Imperative Shell)
//!
//! Everything a request passes through that can be decided from data alone
//! lives here: prompt assembly, decoding of provider replies, schema salvage,
//! safety screening, SVG post-processing and the fallback state machine. The
//! shell only moves bytes between these functions, the model provider and the
//! renderer processes.
//!
//! # Module Organization
//!
//! - [`generation`]: Prompt building, reply-shape decoding, schema validation and salvage
//! - [`safety`]: Denylist, structural marker and portable-charset checks
//! - [`svg`]: viewBox padding, metadata injection and placeholder synthesis
//! - [`plot`]: Plot source sanitation and the Python runner script
//! - [`latex`]: Standalone document wrapping and compiler log parsing
//! - [`ladder`]: The generate/validate/execute state machine with its single retry
//! - [`types`]: Request, result and response models
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use drawkit_core::generation::{extract_generation, ModelReply};
//!
//! let reply = ModelReply::from_text(r#"Sure! {"type": "svg", ...}"#);
//! let result = extract_generation(&reply)?;
//! drawkit_core::safety::screen(&result)?;
//! ```

pub mod error;
pub mod generation;
pub mod ladder;
pub mod latex;
pub mod plot;
pub mod safety;
pub mod svg;
pub mod types;

pub use error::{DiagramError, FailureKind};
pub use types::{
    ConversationTurn, DiagramRequest, DiagramResponse, ExecutionOutcome, GenerationResult,
    ImagePayload, RenderingHint, Technology, TokenUsage,
};
