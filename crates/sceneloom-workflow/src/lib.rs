//! # sceneloom-workflow
//!
//! Workflow template documents for ComfyUI-style generation services.
//!
//! A workflow template is a JSON object keyed by node id, where each node
//! carries an `inputs` map. This crate provides:
//! - Loading templates from disk ([`WorkflowTemplate::load`])
//! - Node-id keyed injection as a pure function ([`inject`])
//! - `{var}` substitution for output prefixes ([`VarContext`])
//! - Dot-path lookup and concatenation over JSON arrays ([`concat_by_path`])
//!
//! ## Example
//!
//! ```
//! use sceneloom_workflow::{inject, Injection, WorkflowTemplate};
//! use serde_json::json;
//!
//! let template = WorkflowTemplate::from_value(json!({
//!     "6": { "inputs": { "text": "" } }
//! }))?;
//!
//! let injected = inject(&template, &[Injection::new("6", "text", "a red fox")]);
//! assert_eq!(injected.workflow["6"]["inputs"]["text"], "a red fox");
//! assert!(injected.skipped.is_empty());
//! # Ok::<(), sceneloom_workflow::Error>(())
//! ```

mod error;
pub mod path;
pub mod template;
pub mod vars;

pub use error::{Error, Result};
pub use path::{concat_by_path, lookup};
pub use template::{inject, Injected, Injection, WorkflowTemplate};
pub use vars::VarContext;
