//! Callbacks fired as the window progresses.

use crate::data::EvolutionData;

/// Observer of window progress.
///
/// For every window the tracker calls `window_start` once, then
/// `gc_start`/`gc_end` for each boundary inside the window, then
/// `window_end` once. When the opening boundary is a GC start,
/// `window_start` precedes that boundary's `gc_start`; when the closing
/// boundary is a GC end, `window_end` follows its `gc_end`.
///
/// All methods default to doing nothing.
pub trait EvolutionListener {
    /// The window opened; `data.perm` holds the window-start heap.
    fn window_start(&mut self, _data: &EvolutionData) {}

    /// A GC inside the window started.
    fn gc_start(&mut self, _data: &EvolutionData) {}

    /// A GC inside the window ended; DIED and TEMP reflect it.
    fn gc_end(&mut self, _data: &EvolutionData) {}

    /// The window closed and `data` is finalized.
    fn window_end(&mut self, _data: &EvolutionData) {}
}
