//! Bindery binding: compiled definitions that pull binding values out of live resources.
//!
//! Typical flow:
//! 1. build [`Definition`]s once, usually from [`BindingRule`]s
//! 2. for every reconciliation pass, [`assemble`] them against the current resource document
//! 3. hand the merged [`Value`] to whatever writes env entries or mounted files

#![forbid(unsafe_code)]

pub mod builder;
pub mod definition;
pub mod resolver;

pub use bindery_core::{BindingError, BindingResult, Entry, ObjectType, Path, ResourceDocument, Value};
pub use builder::{BindingRule, BuildError, DefinitionBuilder};
pub use definition::{
    Definition, MapFromDataFieldDefinition, SliceOfMapsFromPathDefinition, SliceOfStringsFromPathDefinition,
    StringDefinition, StringFromDataFieldDefinition, StringOfMapDefinition,
};
pub use resolver::Resolver;

use futures::future::try_join_all;
use tracing::debug;

/// Apply every definition to `doc` and merge the results in definition order.
///
/// Definitions run concurrently; later definitions win on colliding output keys.
/// The first failure aborts the whole assembly.
pub async fn assemble(definitions: &[Definition], doc: &ResourceDocument) -> BindingResult<Value> {
    let values = try_join_all(definitions.iter().map(|d| d.apply(doc))).await?;
    let mut out = Value::default();
    for v in values {
        for key in v.keys() {
            if out.get(key).is_some() {
                debug!(key, "output key overridden by a later definition");
            }
        }
        out.merge_from(v);
    }
    Ok(out)
}
