//! Selection collection.
//!
//! Flattens a selection set into an ordered map of response key to field
//! nodes. Duplicate response keys merge their nodes in order. Fragment
//! spreads and inline fragments are rejected here, which is the single
//! choke point the whole engine goes through.
//!
//! Sub-selection collection is memoized per execution, keyed by the parent
//! type name and the identity of the parent field nodes.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use rxgql_core::Span;
use rxgql_syntax::ast::{FieldNode, Selection, SelectionSet};
use std::sync::{Arc, Mutex};

/// Ordered response-key → field-nodes mapping.
pub type FieldsMap = IndexMap<String, Vec<Arc<FieldNode>>>;

/// A collection failure, positioned for the engine to locate.
#[derive(Debug, Clone)]
pub struct CollectError {
    pub message: String,
    pub span: Span,
}

/// Collects the fields of a selection set in selection order.
pub fn collect_fields(selection_set: &SelectionSet) -> Result<FieldsMap, CollectError> {
    let mut fields = FieldsMap::new();
    collect_into(selection_set, &mut fields)?;
    Ok(fields)
}

fn collect_into(selection_set: &SelectionSet, fields: &mut FieldsMap) -> Result<(), CollectError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                fields
                    .entry(field.response_key().to_string())
                    .or_default()
                    .push(Arc::new(field.clone()));
            }
            Selection::FragmentSpread(spread) => {
                return Err(CollectError {
                    message: format!(
                        "fragments are not supported (found spread of '{}')",
                        spread.name.value
                    ),
                    span: spread.span,
                });
            }
            Selection::InlineFragment(inline) => {
                return Err(CollectError {
                    message: "fragments are not supported (found an inline fragment)".to_string(),
                    span: inline.span,
                });
            }
        }
    }
    Ok(())
}

/// Memo key: the concrete type plus the identity of the field nodes whose
/// sub-selections are being merged.
type SubfieldKey = (String, Vec<usize>);

/// Per-execution cache of merged sub-selections.
///
/// Caching by node identity keeps the `Arc<FieldNode>`s of a sub-selection
/// stable across re-completions, so a switching parent re-evaluates against
/// the same collected map instead of re-walking the AST.
#[derive(Debug, Default)]
pub struct SubfieldCache {
    cache: Mutex<FxHashMap<SubfieldKey, Arc<FieldsMap>>>,
}

impl SubfieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the sub-selections of `nodes` for the given concrete type.
    pub fn collect_subfields(
        &self,
        type_name: &str,
        nodes: &[Arc<FieldNode>],
    ) -> Result<Arc<FieldsMap>, CollectError> {
        let key: SubfieldKey = (
            type_name.to_string(),
            nodes.iter().map(|node| Arc::as_ptr(node) as usize).collect(),
        );

        if let Some(cached) = self.cache.lock().expect("subfield cache poisoned").get(&key) {
            return Ok(cached.clone());
        }

        let mut fields = FieldsMap::new();
        for node in nodes {
            if let Some(selection_set) = &node.selection_set {
                collect_into(selection_set, &mut fields)?;
            }
        }
        let fields = Arc::new(fields);

        self.cache
            .lock()
            .expect("subfield cache poisoned")
            .insert(key, fields.clone());
        Ok(fields)
    }
}
