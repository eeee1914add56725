// Guard — pre-save consistency check over every reachable wrapper
//
// Saving is only sound if every wrapper's children can be found again by
// name when the graph is rebuilt. Before a save the guard walks the graph
// from the checkpoint root and validates each list and dict wrapper:
//
//   list:  non-append mutation of tracked content -> IncompatibleReplacement
//          mutation through a raw alias            -> StructuralMutation
//   dict:  trackable under a non-string key        -> UnsupportedKey
//          mutation through a raw alias            -> StructuralMutation
//          removal of a tracked entry              -> StructuralMutation
//
// The first failure aborts the check and nothing is refreshed. When every
// wrapper passes, each snapshot is refreshed to the current contents, so the
// next save compares against what this one saw.

use tracing::debug;

use crate::error::Result;
use crate::graph::Graph;
use crate::object::{ObjectId, ObjectKind};

impl Graph {
    /// Validate every wrapper reachable from `root`, then refresh their
    /// snapshots. Returns the number of wrappers checked.
    pub fn check_consistency(&mut self, root: ObjectId) -> Result<usize> {
        let reachable = self.list_objects(root)?;
        let mut checked = 0;
        for &id in &reachable {
            let describe = self.describe(id);
            match &mut self.object_mut(id)?.kind {
                ObjectKind::List(w) => w.validate(&describe)?,
                ObjectKind::Dict(w) => w.validate(&describe)?,
                _ => continue,
            }
            checked += 1;
        }
        self.refresh_snapshots(&reachable)?;
        debug!(root = ?root, wrappers = checked, "graph is consistent");
        Ok(checked)
    }

    fn refresh_snapshots(&mut self, objects: &[ObjectId]) -> Result<()> {
        for &id in objects {
            match &mut self.object_mut(id)?.kind {
                ObjectKind::List(w) => w.update_snapshot(),
                ObjectKind::Dict(w) => w.update_snapshot(),
                _ => {}
            }
        }
        Ok(())
    }
}
