//! Sceneloom-Common: Shared error taxonomy and identifiers.
//!
//! This crate provides the pieces every other sceneloom crate agrees on:
//!
//! - **Error Handling**: the run-level [`Error`] taxonomy and [`Result`] alias
//! - **Scene IDs**: [`SceneId`], the caller-supplied (or positional) scene key
//!
//! # Examples
//!
//! ```
//! use sceneloom_common::{Error, Result, SceneId};
//!
//! fn check(id: SceneId) -> Result<()> {
//!     Err(Error::validation(id, "missing 'video_prompt'"))
//! }
//!
//! let err = check(SceneId::from(3)).unwrap_err();
//! assert_eq!(err.kind(), "ValidationError");
//! ```

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::SceneId;
