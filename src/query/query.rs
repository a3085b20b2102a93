//! The query trait shared by every AST node.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::Result;
use crate::index::Index;

/// The result of executing one query node: matched documents with their raw
/// scores, and the node's contribution to the query norm.
///
/// Scores here are pre-normalisation; the orchestrator multiplies every
/// score by `1/sqrt(sum_squared_weights)` of the whole tree before ranking.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Matched documents in ascending global-id order, with raw scores.
    /// A document may carry a zero score (a prohibited clause matched); the
    /// search discards zero-scored documents after normalisation.
    pub docs: BTreeMap<u32, f32>,
    /// Sum of squared clause weights under this node.
    pub sum_squared_weights: f32,
}

impl Execution {
    /// An execution matching nothing.
    pub fn empty() -> Self {
        Execution::default()
    }
}

/// One node of the query AST.
///
/// The lifecycle is `parse -> rewrite(index) -> optimize(index) ->
/// execute(index)`. `rewrite` reduces the tree to primitive nodes (terms,
/// multi-terms, phrases, booleans and the two sentinel nodes); `optimize`
/// prunes impossible or insignificant branches; `execute` computes the
/// scored result vector. Nodes never retain the index; it is always passed
/// in.
pub trait Query: Debug + Send {
    /// This node's boost factor (default 1.0).
    fn boost(&self) -> f32;

    /// Replace the boost factor.
    fn set_boost(&mut self, boost: f32);

    /// Reduce to a primitive-only tree against the open index.
    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>>;

    /// Return an equivalent, usually smaller tree. Only meaningful after
    /// [`Query::rewrite`]; the default keeps the node unchanged.
    fn optimize(&self, index: &Index) -> Result<Box<dyn Query>> {
        let _ = index;
        Ok(self.clone_box())
    }

    /// Execute against the index, producing the scored result vector.
    fn execute(&self, index: &Index) -> Result<Execution>;

    /// Render the node in query syntax (used by diagnostics and tests).
    fn to_query_string(&self) -> String;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn Query>;

    /// Downcasting support for the optimize pass.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Query> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Render a boost suffix (`^2`, `^0.5`), or nothing for the default boost.
pub(crate) fn boost_suffix(boost: f32) -> String {
    if (boost - 1.0).abs() < f32::EPSILON {
        String::new()
    } else {
        format!("^{boost}")
    }
}
