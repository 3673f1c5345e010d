//! Value type trees for conversion diagnostics.
//!
//! The marshaller records one [`TypeNode`] per value it visits, indented by
//! nesting depth.  When a conversion fails, the rendered tree shows exactly
//! where in a nested structure the unsupported value sat:
//!
//! ```text
//!   Map
//!     entry
//!       Str
//!       List
//!         Widget  <- unsupported
//! ```
//!
//! A tree is built fresh for each conversion and dropped when it resolves.
//! It never influences the outcome of a conversion.

use std::fmt;

use crate::error::{Direction, Error};

/// Indentation used when none is given explicitly.
const DEFAULT_BASE_INDENT: usize = 1;

/// One visited value: its nesting level and a type label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub indent: usize,
    pub label: String,
}

/// An ordered, indentation-rendered record of the values visited so far.
#[derive(Debug, Clone)]
pub struct TypeTree {
    nodes: Vec<TypeNode>,
    indent: usize,
}

impl Default for TypeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTree {
    pub fn new() -> Self {
        Self::with_indent(DEFAULT_BASE_INDENT)
    }

    pub fn with_indent(indent: usize) -> Self {
        Self { nodes: Vec::new(), indent }
    }

    /// A tree whose first entry is `label`; used for call boundaries such
    /// as `(arguments)` and `(return value)`.
    pub fn rooted(label: impl Into<String>) -> Self {
        let mut tree = Self::new();
        tree.add(label);
        tree
    }

    /// Record a value at the current depth.
    pub fn add(&mut self, label: impl Into<String>) {
        self.nodes.push(TypeNode { indent: self.indent, label: label.into() });
    }

    /// Run `f` one level deeper, restoring the depth afterwards even if `f`
    /// bails out early with `?`.
    pub fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.indent += 1;
        let out = f(self);
        self.indent -= 1;
        out
    }

    pub fn depth(&self) -> usize {
        self.indent
    }

    pub fn nodes(&self) -> &[TypeNode] {
        &self.nodes
    }

    /// Mark the most recent position as unsupported and build the error.
    pub fn unsupported(&mut self, direction: Direction, type_name: &str, value: Option<String>) -> Error {
        self.add(format!("{type_name}  <- unsupported"));
        let reason = match value {
            Some(v) => format!("unsupported type `{type_name}`\nvalue = {v}"),
            None => format!("unsupported type `{type_name}`"),
        };
        self.fail(direction, reason)
    }

    /// Build a conversion error carrying the tree as rendered so far.
    pub fn fail(&self, direction: Direction, reason: impl Into<String>) -> Error {
        Error::Conversion { direction, reason: reason.into(), trace: self.to_string() }
    }
}

impl fmt::Display for TypeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{:width$}{}", "", node.label, width = node.indent * 2)?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
