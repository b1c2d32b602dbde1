use serde::{Deserialize, Serialize};

use crate::annotate::error::AnnotateError;
use crate::annotate::input::PointerEvent;
use crate::annotate::model::{
    AnnotationId, Coordinate, CoordinateSpace, SizingHandle, SpaceAnchor,
};
use crate::annotate::settings::AnnotateSettings;

/// Rectangle in window pixels, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// Window pixel to percentage of this viewport.
    pub fn to_percent(&self, px: f32, py: f32) -> (f32, f32) {
        (
            (px - self.x) * 100.0 / self.width,
            (py - self.y) * 100.0 / self.height,
        )
    }

    pub fn from_percent(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.x + x * self.width / 100.0,
            self.y + y * self.height / 100.0,
        )
    }

    /// Window pixel to pixel offset inside this viewport.
    pub fn to_local(&self, px: f32, py: f32) -> (f32, f32) {
        (px - self.x, py - self.y)
    }
}

const PARALLEL_TOLERANCE: f32 = 1e-4;

/// Plane with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: [f32; 3],
    pub normal: [f32; 3],
}

impl Plane {
    /// `None` when `normal` has no length.
    pub fn new(origin: [f32; 3], normal: [f32; 3]) -> Option<Self> {
        let normal = normalize(normal)?;
        Some(Self { origin, normal })
    }

    pub fn signed_distance(&self, point: [f32; 3]) -> f32 {
        dot(sub(point, self.origin), self.normal)
    }

    pub fn project(&self, point: [f32; 3]) -> [f32; 3] {
        sub(point, scale(self.normal, self.signed_distance(point)))
    }

    /// Parallel plane moved `distance` along the normal.
    pub fn offset(&self, distance: f32) -> Self {
        Self {
            origin: add(self.origin, scale(self.normal, distance)),
            normal: self.normal,
        }
    }

    pub fn is_parallel_to(&self, other: &Plane) -> bool {
        dot(self.normal, other.normal).abs() >= 1.0 - PARALLEL_TOLERANCE
    }
}

/// Bounding box of the image, slice or chart under a content-relative annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl ContentBounds {
    pub fn larger_side(&self) -> f32 {
        (self.max_x - self.min_x).abs().max((self.max_y - self.min_y).abs())
    }
}

/// Answer of the pick collaborator for one screen position in one space.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCoordinate {
    pub coordinate: Coordinate,
    pub anchor: SpaceAnchor,
    /// Viewport the position falls into, for screen-anchored spaces.
    pub viewport: Option<Viewport>,
    /// Volume slice displayed under the pointer (stereotaxic space).
    pub slice_plane: Option<Plane>,
    pub content_bounds: Option<ContentBounds>,
}

impl ResolvedCoordinate {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            anchor: SpaceAnchor::default(),
            viewport: None,
            slice_plane: None,
            content_bounds: None,
        }
    }
}

/// Annotation and handle under a screen position.
///
/// A result with a `coordinate_index` but no `annotation` refers to the
/// annotation under construction, which has no id yet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PickResult {
    pub annotation: Option<AnnotationId>,
    pub handle: SizingHandle,
    pub coordinate_index: Option<usize>,
    /// Position along the segment starting at `coordinate_index`, 0..1.
    pub fractional_distance: Option<f32>,
}

impl PickResult {
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn annotation(id: AnnotationId, handle: SizingHandle) -> Self {
        Self {
            annotation: Some(id),
            handle,
            ..Self::default()
        }
    }

    pub fn with_coordinate(mut self, index: usize, fraction: Option<f32>) -> Self {
        self.coordinate_index = Some(index);
        self.fractional_distance = fraction;
        self
    }
}

/// Renderer-side hit testing and unprojection.
///
/// Every call is a fresh, synchronous query; results are never cached
/// across events.
pub trait PickResolver {
    fn resolve_at_screen_position(&self, x: f32, y: f32) -> PickResult;

    fn resolve_coordinate_in_space(
        &self,
        x: f32,
        y: f32,
        space: CoordinateSpace,
    ) -> Option<ResolvedCoordinate>;

    /// Viewport currently displaying an annotation anchored in `space`.
    fn viewport_of(&self, space: CoordinateSpace, anchor: &SpaceAnchor) -> Option<Viewport>;

    fn content_bounds_of(
        &self,
        _space: CoordinateSpace,
        _anchor: &SpaceAnchor,
    ) -> Option<ContentBounds> {
        None
    }
}

/// Turns pointer positions into coordinates of a target space.
#[derive(Clone, Copy)]
pub struct CoordinateResolver<'a> {
    pick: &'a dyn PickResolver,
}

impl<'a> CoordinateResolver<'a> {
    pub fn new(pick: &'a dyn PickResolver) -> Self {
        Self { pick }
    }

    pub fn pick(&self) -> &'a dyn PickResolver {
        self.pick
    }

    pub fn resolve(
        &self,
        x: f32,
        y: f32,
        space: CoordinateSpace,
    ) -> Result<ResolvedCoordinate, AnnotateError> {
        let resolved = self
            .pick
            .resolve_coordinate_in_space(x, y, space)
            .ok_or_else(|| {
                AnnotateError::resolution(format!(
                    "no {} coordinate at ({x:.1}, {y:.1})",
                    space.label()
                ))
            })?;
        if space == CoordinateSpace::Surface && resolved.coordinate.surface.is_none() {
            return Err(AnnotateError::resolution(format!(
                "no surface vertex at ({x:.1}, {y:.1})"
            )));
        }
        Ok(resolved)
    }

    pub fn resolve_event(
        &self,
        event: &PointerEvent,
        space: CoordinateSpace,
    ) -> Result<ResolvedCoordinate, AnnotateError> {
        self.resolve(event.x, event.y, space)
    }

    pub fn resolve_previous(
        &self,
        event: &PointerEvent,
        space: CoordinateSpace,
    ) -> Result<ResolvedCoordinate, AnnotateError> {
        self.resolve(event.previous_x, event.previous_y, space)
    }

    pub fn pick_at(&self, x: f32, y: f32) -> PickResult {
        self.pick.resolve_at_screen_position(x, y)
    }

    pub fn viewport_of(&self, space: CoordinateSpace, anchor: &SpaceAnchor) -> Option<Viewport> {
        self.pick.viewport_of(space, anchor)
    }

    pub fn content_bounds_of(
        &self,
        space: CoordinateSpace,
        anchor: &SpaceAnchor,
    ) -> Option<ContentBounds> {
        self.pick.content_bounds_of(space, anchor)
    }
}

/// Units an annotation's x/y are stored in, and how pointer pixels map onto them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkingFrame {
    /// Window, tab and spacer: 0-100 of the viewport.
    PercentOfViewport(Viewport),
    /// Viewport space: pixels relative to the viewport origin.
    ViewportPixels(Viewport),
    /// Stereotaxic mm, media pixels, histology or chart units. Pixel deltas
    /// do not apply; positions are re-resolved in the space itself.
    Native,
}

impl WorkingFrame {
    /// `None` for surface space, which has no continuous frame, and for
    /// screen-anchored spaces whose viewport is unknown.
    pub fn for_space(space: CoordinateSpace, viewport: Option<Viewport>) -> Option<Self> {
        match space {
            CoordinateSpace::Surface => None,
            CoordinateSpace::Viewport => viewport
                .filter(Viewport::is_valid)
                .map(Self::ViewportPixels),
            space if space.is_percent_of_viewport() => viewport
                .filter(Viewport::is_valid)
                .map(Self::PercentOfViewport),
            _ => Some(Self::Native),
        }
    }

    /// Frame used to size a new shape. Surface shapes are anchored on a
    /// vertex and sized in percent of the viewport showing them.
    pub fn for_sizing(space: CoordinateSpace, viewport: Option<Viewport>) -> Option<Self> {
        match space {
            CoordinateSpace::Surface => viewport
                .filter(Viewport::is_valid)
                .map(Self::PercentOfViewport),
            space => Self::for_space(space, viewport),
        }
    }

    /// Window pixel position in frame units.
    pub fn pixel_to_frame(&self, px: f32, py: f32) -> Option<(f32, f32)> {
        match self {
            Self::PercentOfViewport(viewport) => Some(viewport.to_percent(px, py)),
            Self::ViewportPixels(viewport) => Some(viewport.to_local(px, py)),
            Self::Native => None,
        }
    }

    pub fn pixel_delta_to_frame(&self, dx: f32, dy: f32) -> Option<(f32, f32)> {
        match self {
            Self::PercentOfViewport(viewport) => {
                Some((dx * 100.0 / viewport.width, dy * 100.0 / viewport.height))
            }
            Self::ViewportPixels(_) => Some((dx, dy)),
            Self::Native => None,
        }
    }

    /// Percentage frames reject anything outside 0-100.
    pub fn in_bounds(&self, xyz: [f32; 3]) -> bool {
        match self {
            Self::PercentOfViewport(_) => {
                (0.0..=100.0).contains(&xyz[0]) && (0.0..=100.0).contains(&xyz[1])
            }
            Self::ViewportPixels(_) | Self::Native => true,
        }
    }

    /// Extents of a sized shape placed by a click without drag.
    pub fn default_extent(
        &self,
        percent: f32,
        content: Option<ContentBounds>,
    ) -> Result<(f32, f32), AnnotateError> {
        match self {
            Self::PercentOfViewport(viewport) => {
                // square on screen
                Ok((percent, percent * viewport.width / viewport.height))
            }
            Self::ViewportPixels(viewport) => {
                let side = viewport.width.min(viewport.height) * percent / 100.0;
                Ok((side, side))
            }
            Self::Native => {
                let bounds = content.ok_or_else(|| {
                    AnnotateError::invalid_construction("no content bounds for default size")
                })?;
                let side = bounds.larger_side() * percent / 100.0;
                Ok((side, side))
            }
        }
    }
}

/// Arrow-key step (x, y) for an annotation in `space`, in the units its
/// coordinates are stored in.
pub fn nudge_step(
    space: CoordinateSpace,
    viewport: Option<Viewport>,
    content: Option<ContentBounds>,
    settings: &AnnotateSettings,
    coarse: bool,
) -> Result<(f32, f32), AnnotateError> {
    let multiplier = if coarse {
        settings.nudge_shift_multiplier
    } else {
        1.0
    };
    let (x, y) = match space {
        CoordinateSpace::Surface => {
            return Err(AnnotateError::illegal(
                "nudge",
                "surface annotations move between vertices",
            ));
        }
        CoordinateSpace::Stereotaxic => (settings.stereotaxic_nudge_mm, settings.stereotaxic_nudge_mm),
        space if space.is_content_relative() => {
            let bounds = content.ok_or_else(|| {
                AnnotateError::resolution(format!("no {} content bounds", space.label()))
            })?;
            let step = bounds.larger_side() * settings.content_nudge_fraction;
            (step, step)
        }
        space => {
            let frame = WorkingFrame::for_space(space, viewport).ok_or_else(|| {
                AnnotateError::resolution(format!("no viewport for {} annotation", space.label()))
            })?;
            frame
                .pixel_delta_to_frame(settings.nudge_step_pixels, settings.nudge_step_pixels)
                .ok_or_else(|| AnnotateError::resolution("no pixel frame"))?
        }
    };
    Ok((x * multiplier, y * multiplier))
}

pub(crate) fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub(crate) fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn scale(a: [f32; 3], factor: f32) -> [f32; 3] {
    [a[0] * factor, a[1] * factor, a[2] * factor]
}

pub(crate) fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn length(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

pub(crate) fn normalize(a: [f32; 3]) -> Option<[f32; 3]> {
    let len = length(a);
    (len > f32::EPSILON).then(|| scale(a, 1.0 / len))
}

/// `a + (b - a) * t`
pub(crate) fn lerp(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    add(a, scale(sub(b, a), t))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoSurfaceVertex;

    impl PickResolver for NoSurfaceVertex {
        fn resolve_at_screen_position(&self, _x: f32, _y: f32) -> PickResult {
            PickResult::nothing()
        }

        fn resolve_coordinate_in_space(
            &self,
            x: f32,
            y: f32,
            _space: CoordinateSpace,
        ) -> Option<ResolvedCoordinate> {
            Some(ResolvedCoordinate::new(Coordinate::new(x, y, 0.0)))
        }

        fn viewport_of(&self, _space: CoordinateSpace, _anchor: &SpaceAnchor) -> Option<Viewport> {
            None
        }
    }

    #[test]
    fn percent_round_trip_through_viewport() {
        let viewport = Viewport::new(100.0, 50.0, 400.0, 200.0);
        let (x, y) = viewport.to_percent(300.0, 150.0);
        assert_eq!((x, y), (50.0, 50.0));
        assert_eq!(viewport.from_percent(x, y), (300.0, 150.0));
    }

    #[test]
    fn plane_projection_lands_on_plane() {
        let plane = Plane::new([0.0, 0.0, 5.0], [0.0, 0.0, 2.0]).expect("plane");
        let projected = plane.project([3.0, 4.0, 9.0]);
        assert_eq!(projected, [3.0, 4.0, 5.0]);
        assert_eq!(plane.offset(3.0).signed_distance(projected), -3.0);
        assert!(Plane::new([0.0; 3], [0.0; 3]).is_none());
    }

    #[test]
    fn surface_resolution_without_vertex_fails() {
        let pick = NoSurfaceVertex;
        let resolver = CoordinateResolver::new(&pick);
        assert!(resolver.resolve(1.0, 1.0, CoordinateSpace::Tab).is_ok());
        assert!(matches!(
            resolver.resolve(1.0, 1.0, CoordinateSpace::Surface),
            Err(AnnotateError::Resolution { .. })
        ));
    }

    #[test]
    fn percent_frame_rejects_out_of_range_positions() {
        let frame = WorkingFrame::for_space(
            CoordinateSpace::Window,
            Some(Viewport::new(0.0, 0.0, 200.0, 100.0)),
        )
        .expect("frame");
        assert!(frame.in_bounds([0.0, 100.0, 0.0]));
        assert!(!frame.in_bounds([-0.5, 50.0, 0.0]));
        assert_eq!(frame.pixel_delta_to_frame(2.0, 2.0), Some((1.0, 2.0)));
        assert!(WorkingFrame::for_space(CoordinateSpace::Surface, None).is_none());
    }

    #[test]
    fn nudge_steps_follow_space_units() {
        let settings = AnnotateSettings::default();
        let viewport = Some(Viewport::new(0.0, 0.0, 200.0, 100.0));

        let (x, y) = nudge_step(CoordinateSpace::Tab, viewport, None, &settings, false)
            .expect("tab step");
        assert_eq!((x, y), (0.5, 1.0));

        let (x, _) = nudge_step(CoordinateSpace::Tab, viewport, None, &settings, true)
            .expect("coarse tab step");
        assert_eq!(x, 5.0);

        let bounds = ContentBounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 2000.0,
            max_y: 1000.0,
        };
        let (x, _) = nudge_step(
            CoordinateSpace::MediaPixel,
            None,
            Some(bounds),
            &settings,
            false,
        )
        .expect("media step");
        assert!((x - 2.0).abs() < 1e-4);

        assert!(nudge_step(CoordinateSpace::Surface, None, None, &settings, false).is_err());
    }
}
