//! Filter abstraction for heap walks.

use crate::error::FilterError;
use crate::id::{Address, SpaceId};
use crate::record::ObjectRecord;
use crate::root::RootPtr;

/// Everything a filter may inspect about one object during a walk.
#[derive(Clone, Copy, Debug)]
pub struct ObjectView<'a> {
    /// The object.
    pub record: &'a ObjectRecord,
    /// The object's address.
    pub address: Address,
    /// The space holding the object's lab, when walked through a heap.
    pub space: Option<SpaceId>,
    /// Root pointers targeting the object.
    pub roots: &'a [RootPtr<Address>],
}

/// Predicate deciding whether a heap walk visits an object.
///
/// Filters are chained; an object is visited only if every filter
/// accepts it. An `Err` is logged by the walker and counts as a
/// rejection of that object alone.
pub trait ObjectFilter {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Decide whether `view` passes.
    fn accept(&self, view: &ObjectView<'_>) -> Result<bool, FilterError>;
}

/// Run a filter chain over one object.
///
/// Failing filters are logged at `warn` level and reject the object.
pub fn accepts_all(filters: &[&dyn ObjectFilter], view: &ObjectView<'_>) -> bool {
    filters.iter().all(|filter| match filter.accept(view) {
        Ok(accepted) => accepted,
        Err(e) => {
            log::warn!(
                "filter '{}' failed on object {} at {}: {e}",
                filter.name(),
                view.record.id,
                view.address
            );
            false
        }
    })
}
