//! Worker-local scratch workspace for transient rasters
//!
//! Every raster produced for a time slice is registered under a unique name
//! and handed out as a [`ScratchRaster`] guard. Dropping the guard frees the
//! raster and removes the registration, on success and on error paths alike,
//! so a worker walking thousands of slices holds at most one raster at a time.

use crate::engine::Raster;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::ops::Deref;

/// Registry of live rasters for one worker. Not shared across threads.
#[derive(Debug, Default)]
pub struct ScratchWorkspace {
    next_id: Cell<u64>,
    live: RefCell<BTreeSet<String>>,
    peak: Cell<usize>,
}

impl ScratchWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `raster` and return the guard that owns it.
    pub fn adopt(&self, raster: Raster) -> ScratchRaster<'_> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let name = format!("scratch_{id}_{}", raster.name);

        let mut live = self.live.borrow_mut();
        live.insert(name.clone());
        self.peak.set(self.peak.get().max(live.len()));

        ScratchRaster {
            workspace: self,
            name,
            raster,
        }
    }

    /// Names of rasters not yet released.
    pub fn live(&self) -> Vec<String> {
        self.live.borrow().iter().cloned().collect()
    }

    /// Highest number of rasters alive at once.
    pub fn peak(&self) -> usize {
        self.peak.get()
    }

    fn release(&self, name: &str) {
        self.live.borrow_mut().remove(name);
    }
}

/// Scoped ownership of one scratch raster.
#[derive(Debug)]
pub struct ScratchRaster<'w> {
    workspace: &'w ScratchWorkspace,
    name: String,
    raster: Raster,
}

impl ScratchRaster<'_> {
    pub fn scratch_name(&self) -> &str {
        &self.name
    }
}

impl Deref for ScratchRaster<'_> {
    type Target = Raster;

    fn deref(&self) -> &Raster {
        &self.raster
    }
}

impl Drop for ScratchRaster<'_> {
    fn drop(&mut self) {
        self.workspace.release(&self.name);
        tracing::trace!(raster = %self.name, "scratch raster released");
    }
}
