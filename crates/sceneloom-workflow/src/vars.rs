//! Variable substitution for output prefixes.

use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for output prefix patterns.
///
/// Supports variable substitution in strings using the `{varname}` syntax.
///
/// # Example
///
/// ```
/// use sceneloom_workflow::VarContext;
/// use std::path::Path;
///
/// let ctx = VarContext::new()
///     .with_output_dir(Path::new("output/video_run1"))
///     .with_var("scene", "3");
///
/// assert_eq!(
///     ctx.substitute("{output_dir}/scene_{scene}"),
///     "output/video_run1/scene_3"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct VarContext {
    vars: HashMap<String, String>,
}

impl VarContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `{output_dir}` to the directory with forward-slash separators.
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        let posix = dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
            .replacen("//", "/", 1);
        self.vars.insert("output_dir".to_string(), posix);
        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string. Unknown variables are left as-is.
    ///
    /// The pattern is scanned once from left to right, so substituted values
    /// are never expanded again.
    pub fn substitute(&self, pattern: &str) -> String {
        let mut result = String::with_capacity(pattern.len());
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            result.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let Some(close) = after.find('}') else {
                rest = &rest[open..];
                break;
            };

            let key = &after[..close];
            match self.vars.get(key) {
                Some(value) if !key.contains('{') => result.push_str(value),
                _ => {
                    // keep the brace and rescan from the next character
                    result.push('{');
                    rest = after;
                    continue;
                }
            }
            rest = &after[close + 1..];
        }

        result.push_str(rest);
        result
    }
}
