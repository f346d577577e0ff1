//! Feature-vector expression assembly.
//!
//! Produces the argument list that follows the label, weight and tag inside
//! the row-level `CONCAT(...)`: one `'|<namespace> '` literal per namespace,
//! followed by the encoder expression of each of its columns.

use crate::encoder::{encode_column, sql_literal};
use crate::error::EncodeError;
use crate::types::NamespaceMap;

/// Separator between `CONCAT` arguments in the generated text.
pub const ARG_SEPARATOR: &str = "\n    , ";

/// The `CONCAT` arguments for every namespace block, in map order.
pub fn feature_parts(namespaces: &NamespaceMap) -> Result<Vec<String>, EncodeError> {
    let mut parts = Vec::with_capacity(namespaces.len() + namespaces.column_count());
    for ns in namespaces.iter() {
        parts.push(sql_literal(&format!("|{} ", ns.name)));
        for column in &ns.columns {
            parts.push(encode_column(column)?);
        }
    }
    Ok(parts)
}

/// Join [`feature_parts`] into a single expression fragment.
///
/// Fails on the first column whose type has no encoding rule.
pub fn assemble_features(namespaces: &NamespaceMap) -> Result<String, EncodeError> {
    Ok(feature_parts(namespaces)?.join(ARG_SEPARATOR))
}
