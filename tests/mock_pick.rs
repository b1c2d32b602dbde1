use annotation_authoring::annotate::model::{Coordinate, CoordinateSpace, SpaceAnchor, SurfaceVertex};
use annotation_authoring::annotate::space::{PickResolver, PickResult, Plane, ResolvedCoordinate, Viewport};

/// Renderer stand-in with a single 100x100 viewport at the window origin.
///
/// Window and tab positions resolve to percent (equal to pixels here),
/// viewport positions to pixels, stereotaxic positions onto an axial slice
/// at `slice_z`, and surface positions to vertex `x` of `structure`.
#[derive(Debug, Clone)]
pub struct MockPick {
    pub under_pointer: PickResult,
    pub slice_z: Option<f32>,
    pub structure: String,
}

impl Default for MockPick {
    fn default() -> Self {
        Self {
            under_pointer: PickResult::nothing(),
            slice_z: Some(5.0),
            structure: "cortex_left".into(),
        }
    }
}

pub const VIEWPORT: Viewport = Viewport::new(0.0, 0.0, 100.0, 100.0);

impl PickResolver for MockPick {
    fn resolve_at_screen_position(&self, _x: f32, _y: f32) -> PickResult {
        self.under_pointer
    }

    fn resolve_coordinate_in_space(
        &self,
        x: f32,
        y: f32,
        space: CoordinateSpace,
    ) -> Option<ResolvedCoordinate> {
        if !VIEWPORT.contains(x, y) {
            return None;
        }
        let mut resolved = match space {
            CoordinateSpace::Window | CoordinateSpace::Tab | CoordinateSpace::Viewport => {
                ResolvedCoordinate::new(Coordinate::new(x, y, 0.0))
            }
            CoordinateSpace::Stereotaxic => {
                let z = self.slice_z?;
                let mut resolved = ResolvedCoordinate::new(Coordinate::new(x, y, z));
                resolved.slice_plane = Plane::new([0.0, 0.0, z], [0.0, 0.0, 1.0]);
                resolved
            }
            CoordinateSpace::Surface => ResolvedCoordinate::new(Coordinate::on_surface(SurfaceVertex {
                structure: self.structure.clone(),
                vertex_count: 1000,
                vertex_index: x as u32,
            })),
            _ => return None,
        };
        resolved.viewport = Some(VIEWPORT);
        Some(resolved)
    }

    fn viewport_of(&self, _space: CoordinateSpace, _anchor: &SpaceAnchor) -> Option<Viewport> {
        Some(VIEWPORT)
    }
}
