//! Position reservation checks.
//!
//! A position is reserved when an enabled reservation marker or an
//! obstacle claims it for the querying agent's area types. Markers and
//! obstacles are registered in every cell their circle overlaps, so the
//! check only needs to visit cells within the agent's own radius.

use crate::components::ReservationQuery;
use crate::error::{Result, SpatialError};
use crate::index::SpatialIndex;
use crate::search::RingTraversal;

impl SpatialIndex {
    /// Check whether `query.position` is free for an agent of
    /// `query.radius`.
    ///
    /// Cells are visited in ring order; within a cell markers are checked
    /// before obstacles.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::PositionMarkerReserved`] or
    /// [`SpatialError::PositionObstacleReserved`] for the first conflict
    /// found, and [`SpatialError::CellNotFound`] if the position lies
    /// outside the world.
    pub fn is_position_reserved(&self, query: &ReservationQuery) -> Result<()> {
        let source = self.locate(query.position)?;
        let cell_size = self.cell_size();
        let mut rings = RingTraversal::start(self, source);

        loop {
            for &key in rings.ring() {
                let Some(cell) = self.cell(key) else {
                    continue;
                };

                for &id in cell.markers() {
                    if self.marker(id).is_some_and(|m| m.reserves(query)) {
                        return Err(SpatialError::PositionMarkerReserved(id));
                    }
                }

                for &id in cell.obstacles() {
                    if self.obstacle(id).is_some_and(|o| o.reserves(query)) {
                        return Err(SpatialError::PositionObstacleReserved(id));
                    }
                }
            }

            if rings.covered(cell_size) >= query.radius || !rings.advance(self) {
                return Ok(());
            }
        }
    }
}
