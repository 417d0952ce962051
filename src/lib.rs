//! # imgpipe
//!
//! Plans and executes the resize/crop/orientation work behind an on-request
//! image service. Given encoded bytes, a source format and a set of
//! [`ProcessingOptions`](options::ProcessingOptions), it decides which
//! operations to run, in what order, with what parameters, and hands the
//! pixel work to an [`ImageEngine`](imaging::ImageEngine).
//!
//! # Architecture: Fixed Stage Order
//!
//! ```text
//! bytes ─▶ decode ─▶ metadata ─▶ geometry plan
//!       ─▶ [shrink-on-load re-decode] ─▶ alpha-safe resize
//!       ─▶ sRGB ─▶ rotate ─▶ flip ─▶ crop ─▶ encode ─▶ bytes
//! ```
//!
//! Two orderings in this chain are silent-correctness hazards: resizing an
//! image with alpha outside a premultiply/unpremultiply bracket fringes
//! transparent edges, and cropping before rotation picks the wrong window.
//! Neither raises an error. Each is therefore a single function in
//! [`imaging::operations`] and only [`pipeline`] calls them.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`options`] | Request options: resize mode, gravity, formats, quality, token parsing |
//! | [`imaging`] | Engine trait, `image`-crate engine, geometry math, stages, decode cache |
//! | [`pipeline`] | The orchestrator: validation, stage order, deadline checkpoints |
//! | [`deadline`] | Cooperative per-request deadlines |
//! | [`batch`] | Parallel directory processing on the rayon pool |
//! | [`config`] | Layered `imgpipe.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Handles Move Through the Pipeline
//!
//! Engine transforms take their input handle by value and return a new one.
//! A superseded image cannot be read again, and an early `?` return drops
//! whatever is alive at that point, so there is no cleanup path to forget.
//!
//! ## Pure Geometry
//!
//! Scale, shrink-on-load and crop-window math lives in
//! [`imaging::calculations`] as plain functions over integers. It is tested
//! without decoding a single pixel; the engine-facing stages are tested
//! against a recording mock engine.
//!
//! ## Startup Is All-or-Nothing
//!
//! The engine and its [`CapabilityRegistry`](imaging::CapabilityRegistry) are
//! built once before any request. If either fails, the process exits instead
//! of serving requests it cannot complete.

pub mod batch;
pub mod config;
pub mod deadline;
pub mod imaging;
pub mod options;
pub mod output;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_helpers;
