use serde::{Deserialize, Serialize};

use crate::annotate::error::AnnotateError;
use crate::annotate::input::PointerEvent;
use crate::annotate::model::{
    Annotation, AnnotationType, Coordinate, CoordinateSpace, FileId, Shape, SurfaceVertex,
};
use crate::annotate::modify::MIN_EXTENT;
use crate::annotate::settings::AnnotateSettings;
use crate::annotate::space::{
    add, lerp, sub, ContentBounds, CoordinateResolver, Plane, ResolvedCoordinate, Viewport,
    WorkingFrame,
};

/// What the user asked to draw, and where it goes once finished.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeRequest {
    pub annotation_type: AnnotationType,
    pub space: CoordinateSpace,
    pub file: FileId,
}

impl ShapeRequest {
    /// Polyhedra and stereotaxic poly-types need a volume slice to draw on.
    pub fn is_stereotaxic_poly(&self) -> bool {
        self.annotation_type.is_poly_type() && self.space == CoordinateSpace::Stereotaxic
    }
}

/// Accumulates coordinates for an annotation that is not yet in the store.
pub trait AnnotationBuilder {
    /// Returns `false` when the event was accepted but did not add anything
    /// (a drag that has not travelled far enough).
    fn add_coordinate(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
    ) -> Result<bool, AnnotateError>;

    fn erase_last_coordinate(&mut self) -> Result<(), AnnotateError>;

    /// Inserts after vertex `index`, `fraction` of the way to the next one.
    fn insert_coordinate_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
        fraction: Option<f32>,
    ) -> Result<(), AnnotateError>;

    fn remove_coordinate_at_index(&mut self, index: usize) -> Result<(), AnnotateError>;

    fn move_coordinate_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
    ) -> Result<(), AnnotateError>;

    fn annotation(&self) -> &Annotation;

    fn file(&self) -> FileId;

    fn can_finish(&self) -> bool;

    fn finish(self) -> Result<Annotation, AnnotateError>
    where
        Self: Sized;
}

fn require_same_mesh(
    first: Option<&SurfaceVertex>,
    candidate: &Coordinate,
) -> Result<(), AnnotateError> {
    match (first, candidate.surface.as_ref()) {
        (Some(first), Some(vertex)) if first.same_mesh(vertex) => Ok(()),
        (Some(first), Some(vertex)) => Err(AnnotateError::resolution(format!(
            "vertex on {} ({} vertices) does not belong to {} ({} vertices)",
            vertex.structure, vertex.vertex_count, first.structure, first.vertex_count
        ))),
        (None, _) => Ok(()),
        (Some(_), None) => Err(AnnotateError::resolution("no surface vertex")),
    }
}

/// Inserts a logical vertex after `index`. Native shapes interpolate
/// `fraction` of the way to the next vertex (midpoint when absent); surface
/// shapes take `surface_pick` as the new vertex.
pub(crate) fn insert_vertex(
    annotation: &mut Annotation,
    index: usize,
    fraction: Option<f32>,
    surface_pick: Option<Coordinate>,
) -> Result<(), AnnotateError> {
    let count = annotation.shape.logical_vertex_count();
    if index >= count {
        return Err(AnnotateError::illegal(
            "insert coordinate",
            format!("no vertex {index}"),
        ));
    }
    let next = if index + 1 < count {
        index + 1
    } else if annotation.annotation_type.is_closed() && count > 1 {
        0
    } else {
        return Err(AnnotateError::illegal(
            "insert coordinate",
            "no segment after the last vertex",
        ));
    };

    let stride = vertex_stride(&annotation.shape);
    let inserted: Vec<Coordinate> = if annotation.space == CoordinateSpace::Surface {
        let pick = surface_pick
            .ok_or_else(|| AnnotateError::resolution("no surface vertex under the pointer"))?;
        let first = annotation
            .shape
            .coordinate(0)
            .and_then(|coordinate| coordinate.surface.as_ref());
        require_same_mesh(first, &pick)?;
        vec![pick]
    } else {
        let t = fraction.unwrap_or(0.5).clamp(0.0, 1.0);
        (0..stride)
            .filter_map(|face| {
                let a = annotation.shape.coordinate(index * stride + face)?;
                let b = annotation.shape.coordinate(next * stride + face)?;
                let xyz = lerp(a.xyz, b.xyz, t);
                Some(Coordinate::new(xyz[0], xyz[1], xyz[2]))
            })
            .collect()
    };

    let coordinates = poly_coordinates_mut(&mut annotation.shape)?;
    let at = (index + 1) * stride;
    for (offset, coordinate) in inserted.into_iter().enumerate() {
        coordinates.insert(at + offset, coordinate);
    }
    Ok(())
}

/// Removes logical vertex `index` unless only `keep` vertices remain.
pub(crate) fn remove_vertex(
    annotation: &mut Annotation,
    index: usize,
    keep: usize,
) -> Result<(), AnnotateError> {
    let count = annotation.shape.logical_vertex_count();
    if count <= keep.max(1) {
        return Err(AnnotateError::illegal(
            "remove coordinate",
            format!("{} keeps at least {} vertices", annotation.annotation_type.label(), keep.max(1)),
        ));
    }
    if index >= count {
        return Err(AnnotateError::illegal(
            "remove coordinate",
            format!("no vertex {index}"),
        ));
    }
    let stride = vertex_stride(&annotation.shape);
    let coordinates = poly_coordinates_mut(&mut annotation.shape)?;
    coordinates.drain(index * stride..(index + 1) * stride);
    Ok(())
}

fn vertex_stride(shape: &Shape) -> usize {
    if matches!(shape, Shape::Paired { .. }) {
        2
    } else {
        1
    }
}

fn poly_coordinates_mut(shape: &mut Shape) -> Result<&mut Vec<Coordinate>, AnnotateError> {
    match shape {
        Shape::Multi { coordinates } | Shape::Paired { coordinates } => Ok(coordinates),
        _ => Err(AnnotateError::illegal(
            "edit coordinates",
            "shape is not a poly-type",
        )),
    }
}

/// Press, drag, release: lines, markers and sized shapes.
#[derive(Debug, Clone)]
pub struct DragShapeBuilder {
    file: FileId,
    annotation: Annotation,
    press: PointerEvent,
    press_coordinate: Coordinate,
    viewport: Option<Viewport>,
    content_bounds: Option<ContentBounds>,
    default_size_percent: f32,
    dragged: bool,
}

impl DragShapeBuilder {
    pub fn start(
        resolver: &CoordinateResolver<'_>,
        request: &ShapeRequest,
        event: &PointerEvent,
        settings: &AnnotateSettings,
    ) -> Result<Self, AnnotateError> {
        if request.annotation_type.is_poly_type() {
            return Err(AnnotateError::invalid_construction(format!(
                "{} is drawn by clicking vertices",
                request.annotation_type.label()
            )));
        }
        let resolved = resolver.resolve_event(event, request.space)?;
        let content_bounds = resolved
            .content_bounds
            .or_else(|| resolver.content_bounds_of(request.space, &resolved.anchor));
        let annotation = Annotation::new(
            request.annotation_type,
            request.space,
            resolved.anchor.clone(),
            resolved.coordinate.clone(),
        );
        tracing::debug!(
            annotation_type = request.annotation_type.label(),
            space = request.space.label(),
            "drag construction started"
        );
        Ok(Self {
            file: request.file,
            annotation,
            press: *event,
            press_coordinate: resolved.coordinate,
            viewport: resolved.viewport,
            content_bounds,
            default_size_percent: settings.default_box_size_percent,
            dragged: false,
        })
    }

    pub fn press_event(&self) -> &PointerEvent {
        &self.press
    }

    fn apply_drag(
        &mut self,
        resolved: ResolvedCoordinate,
        event: &PointerEvent,
    ) -> Result<(), AnnotateError> {
        let current = resolved.coordinate;
        let surface = self.annotation.space == CoordinateSpace::Surface;
        if surface {
            require_same_mesh(self.press_coordinate.surface.as_ref(), &current)?;
        }
        let press = &self.press_coordinate;
        match &mut self.annotation.shape {
            Shape::Point { coordinate } => *coordinate = current,
            Shape::TwoPoint { end, .. } => *end = current,
            Shape::Sized {
                center,
                width,
                height,
                ..
            } => {
                if surface {
                    // anchored on the pressed vertex, extents in viewport percent
                    if let Some(viewport) = self.viewport.filter(Viewport::is_valid) {
                        *width = (event.x - self.press.x).abs() * 100.0 / viewport.width;
                        *height = (event.y - self.press.y).abs() * 100.0 / viewport.height;
                    }
                } else {
                    let (p, c) = (press.xyz, current.xyz);
                    center.xyz = [
                        (p[0] + c[0]) / 2.0,
                        (p[1] + c[1]) / 2.0,
                        (p[2] + c[2]) / 2.0,
                    ];
                    *width = (c[0] - p[0]).abs();
                    *height = (c[1] - p[1]).abs();
                }
            }
            Shape::Multi { .. } | Shape::Paired { .. } => {
                return Err(AnnotateError::illegal(
                    "drag",
                    "poly-type shapes are built by clicks",
                ));
            }
        }
        self.dragged = true;
        Ok(())
    }

    fn default_extent(&self) -> Result<(f32, f32), AnnotateError> {
        let frame = WorkingFrame::for_sizing(self.annotation.space, self.viewport)
            .ok_or_else(|| AnnotateError::invalid_construction("no frame for a default size"))?;
        frame.default_extent(self.default_size_percent, self.content_bounds)
    }
}

impl AnnotationBuilder for DragShapeBuilder {
    fn add_coordinate(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
    ) -> Result<bool, AnnotateError> {
        let resolved = resolver.resolve_event(event, self.annotation.space)?;
        self.apply_drag(resolved, event)?;
        Ok(true)
    }

    fn erase_last_coordinate(&mut self) -> Result<(), AnnotateError> {
        Err(AnnotateError::illegal(
            "erase last coordinate",
            "drag-built shapes have a fixed coordinate count",
        ))
    }

    fn insert_coordinate_at_index(
        &mut self,
        _resolver: &CoordinateResolver<'_>,
        _event: &PointerEvent,
        _index: usize,
        _fraction: Option<f32>,
    ) -> Result<(), AnnotateError> {
        Err(AnnotateError::illegal(
            "insert coordinate",
            "drag-built shapes have a fixed coordinate count",
        ))
    }

    fn remove_coordinate_at_index(&mut self, _index: usize) -> Result<(), AnnotateError> {
        Err(AnnotateError::illegal(
            "remove coordinate",
            "drag-built shapes have a fixed coordinate count",
        ))
    }

    fn move_coordinate_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
    ) -> Result<(), AnnotateError> {
        let resolved = resolver.resolve_event(event, self.annotation.space)?;
        if self.annotation.space == CoordinateSpace::Surface {
            require_same_mesh(self.press_coordinate.surface.as_ref(), &resolved.coordinate)?;
        }
        let slot = self.annotation.shape.coordinate_mut(index).ok_or_else(|| {
            AnnotateError::illegal("move coordinate", format!("no coordinate {index}"))
        })?;
        *slot = resolved.coordinate;
        Ok(())
    }

    fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    fn file(&self) -> FileId {
        self.file
    }

    fn can_finish(&self) -> bool {
        true
    }

    fn finish(mut self) -> Result<Annotation, AnnotateError> {
        let default_extent = match &self.annotation.shape {
            Shape::Sized { width, height, .. } if *width < MIN_EXTENT || *height < MIN_EXTENT => {
                Some(self.default_extent()?)
            }
            _ => None,
        };
        match &mut self.annotation.shape {
            Shape::TwoPoint { start, end } if start == end => {
                return Err(AnnotateError::invalid_construction("line has zero length"));
            }
            Shape::Sized { width, height, .. } => {
                if let Some((default_width, default_height)) = default_extent {
                    if *width < MIN_EXTENT {
                        *width = default_width;
                    }
                    if *height < MIN_EXTENT {
                        *height = default_height;
                    }
                }
            }
            _ => {}
        }
        self.annotation.validate()?;
        tracing::debug!(
            annotation_type = self.annotation.annotation_type.label(),
            dragged = self.dragged,
            "drag construction finished"
        );
        Ok(self.annotation)
    }
}

const MIN_FACE_SEPARATION_MM: f32 = 1e-3;

/// Near and far faces of a polyhedron under construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePlanes {
    pub near: Plane,
    pub far: Plane,
}

impl FacePlanes {
    /// Far face on the slice under the last vertex. Falls back to `depth_mm`
    /// behind the near face when that slice is missing, tilted or the same
    /// as the near one.
    fn from_slices(near: Plane, last: Option<Plane>, depth_mm: f32) -> Self {
        let far = last
            .filter(|slice| {
                slice.is_parallel_to(&near)
                    && near.signed_distance(slice.origin).abs() > MIN_FACE_SEPARATION_MM
            })
            .map(|slice| Plane {
                origin: slice.origin,
                normal: near.normal,
            })
            .unwrap_or_else(|| near.offset(depth_mm));
        Self { near, far }
    }

    fn pair_for(&self, coordinate: &Coordinate) -> [Coordinate; 2] {
        let near = self.near.project(coordinate.xyz);
        let far = self.far.project(coordinate.xyz);
        [
            Coordinate::new(near[0], near[1], near[2]),
            Coordinate::new(far[0], far[1], far[2]),
        ]
    }

    fn plane_for(&self, coordinate_index: usize) -> &Plane {
        if coordinate_index % 2 == 0 {
            &self.near
        } else {
            &self.far
        }
    }
}

/// Successive clicks (and long enough drags) append vertices of a polyline,
/// polygon or polyhedron.
///
/// `samples` holds the event behind every logical vertex, in vertex order.
#[derive(Debug, Clone)]
pub struct ClickSequenceBuilder {
    file: FileId,
    annotation: Annotation,
    samples: Vec<PointerEvent>,
    /// Volume slice under each sample.
    slices: Vec<Option<Plane>>,
    planes: Option<FacePlanes>,
    polyhedron_depth_mm: f32,
    min_append_distance_sq: f32,
}

impl ClickSequenceBuilder {
    pub fn start(
        resolver: &CoordinateResolver<'_>,
        request: &ShapeRequest,
        event: &PointerEvent,
        settings: &AnnotateSettings,
    ) -> Result<Self, AnnotateError> {
        if !request.annotation_type.is_poly_type() {
            return Err(AnnotateError::invalid_construction(format!(
                "{} is drawn by dragging",
                request.annotation_type.label()
            )));
        }
        let paired = matches!(request.annotation_type, AnnotationType::Polyhedron);
        if paired && request.space != CoordinateSpace::Stereotaxic {
            return Err(AnnotateError::invalid_construction(
                "polyhedra are drawn in stereotaxic space",
            ));
        }

        let resolved = resolver.resolve_event(event, request.space)?;
        let planes = if paired {
            let near = resolved.slice_plane.ok_or_else(|| {
                AnnotateError::invalid_construction("no volume slice under the pointer")
            })?;
            Some(FacePlanes::from_slices(near, None, settings.polyhedron_depth_mm))
        } else {
            None
        };

        let mut annotation = Annotation::new(
            request.annotation_type,
            request.space,
            resolved.anchor.clone(),
            resolved.coordinate.clone(),
        );
        if let (Some(planes), Shape::Paired { coordinates }) = (&planes, &mut annotation.shape) {
            *coordinates = planes.pair_for(&resolved.coordinate).to_vec();
        }
        tracing::debug!(
            annotation_type = request.annotation_type.label(),
            space = request.space.label(),
            "click construction started"
        );
        Ok(Self {
            file: request.file,
            annotation,
            samples: vec![*event],
            slices: vec![resolved.slice_plane],
            planes,
            polyhedron_depth_mm: settings.polyhedron_depth_mm,
            min_append_distance_sq: settings.drag_append_min_distance_sq(),
        })
    }

    pub fn samples(&self) -> &[PointerEvent] {
        &self.samples
    }

    pub fn vertex_count(&self) -> usize {
        self.annotation.shape.logical_vertex_count()
    }

    fn first_surface_vertex(&self) -> Option<&SurfaceVertex> {
        self.annotation
            .shape
            .coordinate(0)
            .and_then(|coordinate| coordinate.surface.as_ref())
    }

    fn coordinates_mut(&mut self) -> Result<&mut Vec<Coordinate>, AnnotateError> {
        poly_coordinates_mut(&mut self.annotation.shape)
    }

    /// One logical vertex at `resolved`: a near/far pair for polyhedra.
    fn vertex_coordinates(&self, resolved: &Coordinate) -> Vec<Coordinate> {
        match &self.planes {
            Some(planes) => planes.pair_for(resolved).to_vec(),
            None => vec![resolved.clone()],
        }
    }

    fn stride(&self) -> usize {
        vertex_stride(&self.annotation.shape)
    }

    fn resolve_vertex(
        &self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
    ) -> Result<ResolvedCoordinate, AnnotateError> {
        let resolved = resolver.resolve_event(event, self.annotation.space)?;
        if self.annotation.space == CoordinateSpace::Surface {
            require_same_mesh(self.first_surface_vertex(), &resolved.coordinate)?;
        }
        Ok(resolved)
    }

    /// Re-derives the far face from the slice under the last vertex and
    /// moves every far coordinate onto it.
    fn refresh_far_face(&mut self) {
        let Some(near) = self.planes.as_ref().map(|planes| planes.near) else {
            return;
        };
        let last = self.slices.last().copied().flatten();
        let planes = FacePlanes::from_slices(near, last, self.polyhedron_depth_mm);
        if let Shape::Paired { coordinates } = &mut self.annotation.shape {
            for far in coordinates.iter_mut().skip(1).step_by(2) {
                far.xyz = planes.far.project(far.xyz);
            }
        }
        self.planes = Some(planes);
    }

    /// Swaps in an edited copy of the shape; the coordinate count must not change.
    pub fn replace_shape(&mut self, shape: Shape) -> Result<(), AnnotateError> {
        if shape.kind() != self.annotation.shape.kind()
            || shape.coordinate_count() != self.annotation.shape.coordinate_count()
        {
            return Err(AnnotateError::illegal(
                "edit coordinates",
                "edit changed the vertex count",
            ));
        }
        self.annotation.shape = shape;
        Ok(())
    }

    /// Moves coordinate `index` to the pointer and its near/far counterpart
    /// by the same delta.
    pub fn move_coordinate_pair_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
    ) -> Result<(), AnnotateError> {
        let counterpart = self
            .annotation
            .shape
            .paired_counterpart(index)
            .ok_or_else(|| AnnotateError::illegal("move two coordinates", "shape has no pairs"))?;
        let old = self
            .annotation
            .shape
            .coordinate(index)
            .map(|coordinate| coordinate.xyz)
            .ok_or_else(|| {
                AnnotateError::illegal("move two coordinates", format!("no coordinate {index}"))
            })?;
        self.move_coordinate_at_index(resolver, event, index)?;
        let new = self
            .annotation
            .shape
            .coordinate(index)
            .map(|coordinate| coordinate.xyz)
            .unwrap_or(old);
        let delta = sub(new, old);
        if let Some(other) = self.annotation.shape.coordinate_mut(counterpart) {
            other.xyz = add(other.xyz, delta);
        }
        Ok(())
    }
}

impl AnnotationBuilder for ClickSequenceBuilder {
    fn add_coordinate(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
    ) -> Result<bool, AnnotateError> {
        if !event.first_in_gesture {
            if let Some(last) = self.samples.last() {
                let (dx, dy) = (event.x - last.x, event.y - last.y);
                if dx * dx + dy * dy < self.min_append_distance_sq {
                    return Ok(false);
                }
            }
        }
        let resolved = self.resolve_vertex(resolver, event)?;
        let vertex = self.vertex_coordinates(&resolved.coordinate);
        self.coordinates_mut()?.extend(vertex);
        self.samples.push(*event);
        self.slices.push(resolved.slice_plane);
        self.refresh_far_face();
        tracing::trace!(vertices = self.vertex_count(), "vertex added");
        Ok(true)
    }

    fn erase_last_coordinate(&mut self) -> Result<(), AnnotateError> {
        if self.vertex_count() <= 1 {
            return Err(AnnotateError::illegal(
                "erase last coordinate",
                "the first coordinate is kept",
            ));
        }
        let stride = self.stride();
        let coordinates = self.coordinates_mut()?;
        let keep = coordinates.len() - stride;
        coordinates.truncate(keep);
        self.samples.pop();
        self.slices.pop();
        self.refresh_far_face();
        Ok(())
    }

    fn insert_coordinate_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
        fraction: Option<f32>,
    ) -> Result<(), AnnotateError> {
        let surface_pick = if self.annotation.space == CoordinateSpace::Surface {
            Some(self.resolve_vertex(resolver, event)?.coordinate)
        } else {
            None
        };
        insert_vertex(&mut self.annotation, index, fraction, surface_pick)?;
        self.samples.insert(index + 1, *event);
        let slice = self.slices.get(index).copied().flatten();
        self.slices.insert(index + 1, slice);
        self.refresh_far_face();
        Ok(())
    }

    fn remove_coordinate_at_index(&mut self, index: usize) -> Result<(), AnnotateError> {
        remove_vertex(&mut self.annotation, index, 1)?;
        self.samples.remove(index);
        self.slices.remove(index);
        self.refresh_far_face();
        Ok(())
    }

    fn move_coordinate_at_index(
        &mut self,
        resolver: &CoordinateResolver<'_>,
        event: &PointerEvent,
        index: usize,
    ) -> Result<(), AnnotateError> {
        let coordinate = self.resolve_vertex(resolver, event)?.coordinate;
        let placed = match &self.planes {
            Some(planes) => {
                let xyz = planes.plane_for(index).project(coordinate.xyz);
                Coordinate::new(xyz[0], xyz[1], xyz[2])
            }
            None => coordinate,
        };
        let stride = self.stride();
        let slot = self.annotation.shape.coordinate_mut(index).ok_or_else(|| {
            AnnotateError::illegal("move coordinate", format!("no coordinate {index}"))
        })?;
        *slot = placed;
        if let Some(sample) = self.samples.get_mut(index / stride) {
            *sample = *event;
        }
        Ok(())
    }

    fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    fn file(&self) -> FileId {
        self.file
    }

    fn can_finish(&self) -> bool {
        self.vertex_count() >= self.annotation.annotation_type.min_finish_vertices()
    }

    fn finish(self) -> Result<Annotation, AnnotateError> {
        if !self.can_finish() {
            return Err(AnnotateError::illegal(
                "finish",
                format!(
                    "{} needs {} vertices, has {}",
                    self.annotation.annotation_type.label(),
                    self.annotation.annotation_type.min_finish_vertices(),
                    self.vertex_count()
                ),
            ));
        }
        self.annotation.validate()?;
        tracing::debug!(
            annotation_type = self.annotation.annotation_type.label(),
            vertices = self.vertex_count(),
            "click construction finished"
        );
        Ok(self.annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::model::SpaceAnchor;
    use crate::annotate::space::{PickResolver, PickResult};

    /// Window pixels map 1:1 onto every space; stereotaxic picks land on z = 0.
    struct FlatPick {
        slice: Option<Plane>,
    }

    impl PickResolver for FlatPick {
        fn resolve_at_screen_position(&self, _x: f32, _y: f32) -> PickResult {
            PickResult::nothing()
        }

        fn resolve_coordinate_in_space(
            &self,
            x: f32,
            y: f32,
            space: CoordinateSpace,
        ) -> Option<ResolvedCoordinate> {
            if space == CoordinateSpace::Surface {
                return None;
            }
            let mut resolved = ResolvedCoordinate::new(Coordinate::new(x, y, 0.0));
            resolved.viewport = Some(Viewport::new(0.0, 0.0, 100.0, 100.0));
            resolved.slice_plane = self.slice;
            Some(resolved)
        }

        fn viewport_of(&self, _space: CoordinateSpace, _anchor: &SpaceAnchor) -> Option<Viewport> {
            Some(Viewport::new(0.0, 0.0, 100.0, 100.0))
        }
    }

    fn flat() -> FlatPick {
        FlatPick { slice: None }
    }

    fn request(annotation_type: AnnotationType, space: CoordinateSpace) -> ShapeRequest {
        ShapeRequest {
            annotation_type,
            space,
            file: FileId(1),
        }
    }

    fn click(x: f32, y: f32) -> PointerEvent {
        PointerEvent::at(x, y)
    }

    #[test]
    fn box_drag_uses_midpoint_and_extents() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let settings = AnnotateSettings::default();
        let press = click(60.0, 20.0);
        let mut builder = DragShapeBuilder::start(
            &resolver,
            &request(AnnotationType::Box, CoordinateSpace::Tab),
            &press,
            &settings,
        )
        .expect("start");
        builder
            .add_coordinate(&resolver, &press.moved_to(20.0, 40.0))
            .expect("drag");

        let annotation = builder.finish().expect("finish");
        match annotation.shape {
            Shape::Sized {
                center,
                width,
                height,
                ..
            } => {
                assert_eq!(center.xyz, [40.0, 30.0, 0.0]);
                assert_eq!((width, height), (40.0, 20.0));
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn box_click_without_drag_gets_default_size() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let settings = AnnotateSettings::default();
        let builder = DragShapeBuilder::start(
            &resolver,
            &request(AnnotationType::Oval, CoordinateSpace::Window),
            &click(50.0, 50.0),
            &settings,
        )
        .expect("start");

        let annotation = builder.finish().expect("finish");
        match annotation.shape {
            Shape::Sized { width, height, .. } => assert_eq!((width, height), (10.0, 10.0)),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn zero_length_line_is_rejected() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let builder = DragShapeBuilder::start(
            &resolver,
            &request(AnnotationType::Line, CoordinateSpace::Viewport),
            &click(5.0, 5.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        assert!(matches!(
            builder.finish(),
            Err(AnnotateError::InvalidConstruction { .. })
        ));
    }

    #[test]
    fn short_drags_do_not_append_vertices() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let first = click(10.0, 10.0);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyline, CoordinateSpace::Tab),
            &first,
            &AnnotateSettings::default(),
        )
        .expect("start");

        assert_eq!(
            builder.add_coordinate(&resolver, &first.moved_to(11.0, 11.0)),
            Ok(false)
        );
        assert_eq!(
            builder.add_coordinate(&resolver, &first.moved_to(20.0, 10.0)),
            Ok(true)
        );
        assert_eq!(builder.vertex_count(), 2);
        assert_eq!(builder.samples().len(), 2);
    }

    #[test]
    fn polygon_insert_after_last_vertex_uses_closing_edge() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polygon, CoordinateSpace::Tab),
            &click(0.0, 0.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        builder.add_coordinate(&resolver, &click(40.0, 0.0)).expect("add");
        builder.add_coordinate(&resolver, &click(40.0, 40.0)).expect("add");

        builder
            .insert_coordinate_at_index(&resolver, &click(20.0, 20.0), 2, Some(0.5))
            .expect("insert");
        let inserted = builder.annotation().shape.coordinate(3).expect("vertex");
        assert_eq!(inserted.xyz, [20.0, 20.0, 0.0]);
        assert_eq!(builder.samples().len(), 4);
    }

    #[test]
    fn polyline_has_no_closing_edge() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyline, CoordinateSpace::Tab),
            &click(0.0, 0.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        builder.add_coordinate(&resolver, &click(40.0, 0.0)).expect("add");
        assert!(builder
            .insert_coordinate_at_index(&resolver, &click(20.0, 0.0), 1, None)
            .is_err());
    }

    #[test]
    fn polyhedron_without_slice_is_not_constructed() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let result = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyhedron, CoordinateSpace::Stereotaxic),
            &click(0.0, 0.0),
            &AnnotateSettings::default(),
        );
        assert!(matches!(
            result,
            Err(AnnotateError::InvalidConstruction { .. })
        ));
    }

    #[test]
    fn polyhedron_vertices_are_near_far_pairs() {
        let pick = FlatPick {
            slice: Plane::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        };
        let resolver = CoordinateResolver::new(&pick);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyhedron, CoordinateSpace::Stereotaxic),
            &click(1.0, 2.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        builder.add_coordinate(&resolver, &click(5.0, 2.0)).expect("add");

        let shape = &builder.annotation().shape;
        assert_eq!(shape.coordinate_count(), 4);
        assert_eq!(shape.coordinate(0).map(|c| c.xyz), Some([1.0, 2.0, 0.0]));
        assert_eq!(shape.coordinate(1).map(|c| c.xyz), Some([1.0, 2.0, 3.0]));

        builder.erase_last_coordinate().expect("erase");
        assert_eq!(builder.annotation().shape.coordinate_count(), 2);
        assert!(builder.erase_last_coordinate().is_err());
    }

    #[test]
    fn polyhedron_far_face_follows_slice_under_last_vertex() {
        let axial = |z: f32| Plane::new([0.0, 0.0, z], [0.0, 0.0, 1.0]);
        let pick = std::cell::RefCell::new(FlatPick { slice: axial(0.0) });
        struct Layered<'a>(&'a std::cell::RefCell<FlatPick>);
        impl PickResolver for Layered<'_> {
            fn resolve_at_screen_position(&self, x: f32, y: f32) -> PickResult {
                self.0.borrow().resolve_at_screen_position(x, y)
            }
            fn resolve_coordinate_in_space(
                &self,
                x: f32,
                y: f32,
                space: CoordinateSpace,
            ) -> Option<ResolvedCoordinate> {
                self.0.borrow().resolve_coordinate_in_space(x, y, space)
            }
            fn viewport_of(&self, space: CoordinateSpace, anchor: &SpaceAnchor) -> Option<Viewport> {
                self.0.borrow().viewport_of(space, anchor)
            }
        }
        let layered = Layered(&pick);
        let resolver = CoordinateResolver::new(&layered);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyhedron, CoordinateSpace::Stereotaxic),
            &click(1.0, 1.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        builder.add_coordinate(&resolver, &click(5.0, 1.0)).expect("add");
        let far_zs = |builder: &ClickSequenceBuilder| -> Vec<f32> {
            builder
                .annotation()
                .shape
                .coordinates()
                .iter()
                .skip(1)
                .step_by(2)
                .map(|c| c.xyz[2])
                .collect()
        };
        assert_eq!(far_zs(&builder), vec![3.0, 3.0]);

        pick.borrow_mut().slice = axial(6.0);
        builder.add_coordinate(&resolver, &click(5.0, 5.0)).expect("add");
        assert_eq!(far_zs(&builder), vec![6.0, 6.0, 6.0]);
        let near_zs: Vec<f32> = builder
            .annotation()
            .shape
            .coordinates()
            .iter()
            .step_by(2)
            .map(|c| c.xyz[2])
            .collect();
        assert_eq!(near_zs, vec![0.0, 0.0, 0.0]);

        builder.erase_last_coordinate().expect("erase");
        assert_eq!(far_zs(&builder), vec![3.0, 3.0]);

        // a tilted slice is not a support plane
        pick.borrow_mut().slice = Plane::new([0.0, 0.0, 6.0], [1.0, 0.0, 1.0]);
        builder.add_coordinate(&resolver, &click(1.0, 5.0)).expect("add");
        assert_eq!(far_zs(&builder), vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn move_two_keeps_faces_parallel() {
        let pick = FlatPick {
            slice: Plane::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        };
        let resolver = CoordinateResolver::new(&pick);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polyhedron, CoordinateSpace::Stereotaxic),
            &click(1.0, 1.0),
            &AnnotateSettings::default(),
        )
        .expect("start");

        builder
            .move_coordinate_pair_at_index(&resolver, &click(4.0, 5.0), 0)
            .expect("move");
        let shape = &builder.annotation().shape;
        assert_eq!(shape.coordinate(0).map(|c| c.xyz), Some([4.0, 5.0, 0.0]));
        assert_eq!(shape.coordinate(1).map(|c| c.xyz), Some([4.0, 5.0, 3.0]));
    }

    #[test]
    fn finish_requires_minimum_vertices() {
        let pick = flat();
        let resolver = CoordinateResolver::new(&pick);
        let mut builder = ClickSequenceBuilder::start(
            &resolver,
            &request(AnnotationType::Polygon, CoordinateSpace::Tab),
            &click(0.0, 0.0),
            &AnnotateSettings::default(),
        )
        .expect("start");
        builder.add_coordinate(&resolver, &click(10.0, 0.0)).expect("add");
        assert!(!builder.can_finish());
        builder.add_coordinate(&resolver, &click(10.0, 10.0)).expect("add");
        assert!(builder.can_finish());
        assert_eq!(builder.finish().expect("finish").coordinate_count(), 3);
    }
}
