//! Shared context for heap walks.

use indexmap::IndexMap;

use heapscope_core::{
    accepts_all, Address, CancelFlag, ObjectFilter, ObjectRecord, ObjectView, RootPtr, SpaceId,
};

use crate::error::ArenaError;

/// Root pointers grouped by the address they target.
pub type RootMap = IndexMap<Address, Vec<RootPtr<Address>>>;

/// Settings for one walk over labs, spaces, or a whole heap.
#[derive(Clone, Copy, Default)]
pub struct WalkContext<'a> {
    /// Space reported to filters. Heap walks fill this in per space.
    pub space: Option<SpaceId>,
    /// Root pointers to expose to filters.
    pub roots: Option<&'a RootMap>,
    /// Filter chain; every filter must accept an object for it to be visited.
    pub filters: &'a [&'a dyn ObjectFilter],
    /// Checked between objects.
    pub cancel: Option<&'a CancelFlag>,
}

impl<'a> WalkContext<'a> {
    /// A walk with the given filter chain and nothing else.
    pub fn filtered(filters: &'a [&'a dyn ObjectFilter]) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// The same walk, scoped to `space`.
    pub fn in_space(self, space: SpaceId) -> Self {
        Self {
            space: Some(space),
            ..self
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ArenaError> {
        match self.cancel {
            Some(flag) if flag.is_cancelled() => Err(ArenaError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn accepts(&self, address: Address, record: &ObjectRecord) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let roots = self
            .roots
            .and_then(|r| r.get(&address))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let view = ObjectView {
            record,
            address,
            space: self.space,
            roots,
        };
        accepts_all(self.filters, &view)
    }
}
