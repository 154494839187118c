//! Polygon filtering and traversal cost policy
//!
//! Every query takes a filter. The filter decides which polygons may be
//! visited at all (`pass_filter`), what moving across a polygon costs
//! (`get_cost`), and how off-mesh links are treated for the current agent.
//! Implementations must be pure with respect to the mesh: two calls with
//! the same arguments must return the same answer while a query is running.

use crate::nav_mesh::{
    MeshTile, Poly, PolyFlags, PolyRef, LINK_FLAG_OFFMESH_CON,
    LINK_FLAG_OFFMESH_CON_BACKTRACKER, LINK_FLAG_OFFMESH_CON_BIDIR,
    LINK_FLAG_OFFMESH_CON_ENABLED, MAX_AREAS,
};
use tilenav_common::math::vdist;

/// Default A* heuristic scale. Slightly below 1 keeps the heuristic
/// admissible in the presence of area costs at 1.0.
pub const DEFAULT_HEURISTIC_SCALE: f32 = 0.999;

/// Traversal policy consulted by every query
pub trait QueryFilter {
    /// Returns true if the polygon may be visited
    fn pass_filter(&self, r: PolyRef, tile: &MeshTile, poly: &Poly) -> bool;

    /// Cost of moving from `pa` to `pb` across `cur_poly`, optionally
    /// entering `next_poly`
    fn get_cost(&self, pa: &[f32; 3], pb: &[f32; 3], cur_poly: &Poly, next_poly: Option<&Poly>)
        -> f32;

    /// Scale applied to the Euclidean distance heuristic
    fn heuristic_scale(&self) -> f32 {
        DEFAULT_HEURISTIC_SCALE
    }

    /// Cheapest per-unit area cost this filter can produce. Used to keep
    /// distance-bounded searches conservative.
    fn lowest_area_cost(&self) -> f32 {
        1.0
    }

    /// Whether the agent is traversing the graph in reverse
    fn is_backtracking(&self) -> bool {
        false
    }

    /// Whether a link with the given side flags may be traversed.
    /// Ground links always pass; off-mesh links must be enabled and either
    /// bidirectional or oriented to match the backtracking state.
    fn is_valid_link_side(&self, side: u8) -> bool {
        (side & LINK_FLAG_OFFMESH_CON) == 0
            || ((side & LINK_FLAG_OFFMESH_CON_ENABLED) != 0
                && ((side & LINK_FLAG_OFFMESH_CON_BIDIR) != 0
                    || self.is_backtracking()
                        == ((side & LINK_FLAG_OFFMESH_CON_BACKTRACKER) != 0)))
    }

    /// Whether the off-mesh connection with the given user id may be used
    fn allow_off_mesh_connection(&self, _user_id: u32) -> bool {
        true
    }
}

/// Flag- and area-based filter with per-area traversal costs
pub struct StandardFilter {
    /// Per-unit traversal cost per area id
    area_cost: [f32; MAX_AREAS],
    /// One-off cost added when entering a polygon of the area
    area_fixed_cost: [f32; MAX_AREAS],
    /// Cached minimum of `area_cost`
    lowest_area_cost: f32,
    /// At least one of these flags must be set on a polygon
    include_flags: PolyFlags,
    /// None of these flags may be set on a polygon
    exclude_flags: PolyFlags,
    heuristic_scale: f32,
    backtracking: bool,
    /// Optional per-connection veto keyed by user id
    off_mesh_predicate: Option<Box<dyn Fn(u32) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for StandardFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardFilter")
            .field("include_flags", &self.include_flags)
            .field("exclude_flags", &self.exclude_flags)
            .field("heuristic_scale", &self.heuristic_scale)
            .field("backtracking", &self.backtracking)
            .field(
                "off_mesh_predicate",
                &self.off_mesh_predicate.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

impl Default for StandardFilter {
    fn default() -> Self {
        Self {
            area_cost: [1.0; MAX_AREAS],
            area_fixed_cost: [0.0; MAX_AREAS],
            lowest_area_cost: 1.0,
            include_flags: PolyFlags::ALL,
            exclude_flags: PolyFlags::empty(),
            heuristic_scale: DEFAULT_HEURISTIC_SCALE,
            backtracking: false,
            off_mesh_predicate: None,
        }
    }
}

impl StandardFilter {
    /// Filter passing all flags at unit cost
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-unit traversal cost of an area
    pub fn area_cost(&self, area: u8) -> f32 {
        self.area_cost[area as usize % MAX_AREAS]
    }

    /// Sets the per-unit traversal cost of an area
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        self.area_cost[area as usize % MAX_AREAS] = cost;
        self.lowest_area_cost = self.area_cost.iter().fold(f32::MAX, |a, &b| a.min(b));
    }

    /// One-off cost added when entering an area
    pub fn area_fixed_cost(&self, area: u8) -> f32 {
        self.area_fixed_cost[area as usize % MAX_AREAS]
    }

    /// Sets the one-off entering cost of an area
    pub fn set_area_fixed_cost(&mut self, area: u8, cost: f32) {
        self.area_fixed_cost[area as usize % MAX_AREAS] = cost;
    }

    /// Required flag mask
    pub fn include_flags(&self) -> PolyFlags {
        self.include_flags
    }

    /// Sets the required flag mask
    pub fn set_include_flags(&mut self, flags: PolyFlags) {
        self.include_flags = flags;
    }

    /// Forbidden flag mask
    pub fn exclude_flags(&self) -> PolyFlags {
        self.exclude_flags
    }

    /// Sets the forbidden flag mask
    pub fn set_exclude_flags(&mut self, flags: PolyFlags) {
        self.exclude_flags = flags;
    }

    /// Overrides the heuristic scale
    pub fn set_heuristic_scale(&mut self, scale: f32) {
        self.heuristic_scale = scale;
    }

    /// Marks the agent as backtracking, flipping one-way off-mesh links
    pub fn set_backtracking(&mut self, backtracking: bool) {
        self.backtracking = backtracking;
    }

    /// Installs a veto over off-mesh connections by user id
    pub fn set_off_mesh_predicate<P>(&mut self, pred: P)
    where
        P: Fn(u32) -> bool + Send + Sync + 'static,
    {
        self.off_mesh_predicate = Some(Box::new(pred));
    }
}

impl QueryFilter for StandardFilter {
    fn pass_filter(&self, _r: PolyRef, _tile: &MeshTile, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    fn get_cost(
        &self,
        pa: &[f32; 3],
        pb: &[f32; 3],
        cur_poly: &Poly,
        next_poly: Option<&Poly>,
    ) -> f32 {
        let mut cost = vdist(pa, pb) * self.area_cost[cur_poly.area as usize % MAX_AREAS];
        if let Some(next) = next_poly {
            cost += self.area_fixed_cost[next.area as usize % MAX_AREAS];
        }
        cost
    }

    fn heuristic_scale(&self) -> f32 {
        self.heuristic_scale
    }

    fn lowest_area_cost(&self) -> f32 {
        self.lowest_area_cost
    }

    fn is_backtracking(&self) -> bool {
        self.backtracking
    }

    fn allow_off_mesh_connection(&self, user_id: u32) -> bool {
        match &self.off_mesh_predicate {
            Some(pred) => pred(user_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_mesh::{PolyType, INTERNAL_LINK_SIDE};

    fn walkable_poly(flags: PolyFlags, area: u8) -> Poly {
        let mut p = Poly::new(area, PolyType::Ground, flags);
        p.vert_count = 3;
        p
    }

    #[test]
    fn include_exclude_masks() {
        let tile = MeshTile::default();
        let mut filter = StandardFilter::new();
        let poly = walkable_poly(PolyFlags::WALK, 1);
        assert!(filter.pass_filter(PolyRef::NULL, &tile, &poly));

        filter.set_exclude_flags(PolyFlags::WALK);
        assert!(!filter.pass_filter(PolyRef::NULL, &tile, &poly));

        filter.set_exclude_flags(PolyFlags::empty());
        filter.set_include_flags(PolyFlags::DISABLED);
        assert!(!filter.pass_filter(PolyRef::NULL, &tile, &poly));
    }

    #[test]
    fn cost_scales_with_area_and_entry() {
        let mut filter = StandardFilter::new();
        filter.set_area_cost(2, 10.0);
        filter.set_area_fixed_cost(3, 5.0);

        let cur = walkable_poly(PolyFlags::WALK, 2);
        let next = walkable_poly(PolyFlags::WALK, 3);
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let cost = filter.get_cost(&a, &b, &cur, Some(&next));
        assert!((cost - 15.0).abs() < 1e-5);

        assert!((filter.lowest_area_cost() - 1.0).abs() < 1e-6);
        filter.set_area_cost(0, 0.5);
        assert!((filter.lowest_area_cost() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn link_side_rules() {
        let mut filter = StandardFilter::new();
        // Ground links always pass, internal side included.
        assert!(filter.is_valid_link_side(INTERNAL_LINK_SIDE));
        assert!(filter.is_valid_link_side(0));

        // Disabled off-mesh link is rejected.
        assert!(!filter.is_valid_link_side(LINK_FLAG_OFFMESH_CON));

        // Enabled one-way link follows the backtracking orientation.
        let fwd = LINK_FLAG_OFFMESH_CON | LINK_FLAG_OFFMESH_CON_ENABLED;
        assert!(filter.is_valid_link_side(fwd));
        filter.set_backtracking(true);
        assert!(!filter.is_valid_link_side(fwd));
        assert!(filter.is_valid_link_side(fwd | LINK_FLAG_OFFMESH_CON_BACKTRACKER));

        // Bidirectional links pass either way.
        filter.set_backtracking(false);
        assert!(filter.is_valid_link_side(fwd | LINK_FLAG_OFFMESH_CON_BIDIR));
    }

    #[test]
    fn off_mesh_predicate_veto() {
        let mut filter = StandardFilter::new();
        assert!(filter.allow_off_mesh_connection(42));
        filter.set_off_mesh_predicate(|id| id != 42);
        assert!(!filter.allow_off_mesh_connection(42));
        assert!(filter.allow_off_mesh_connection(7));
    }
}
