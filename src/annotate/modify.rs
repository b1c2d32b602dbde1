use crate::annotate::error::AnnotateError;
use crate::annotate::model::{Annotation, CoordinateSpace, Shape, SizingHandle, SurfaceVertex};
use crate::annotate::space::{add, dot, normalize, scale, sub, Viewport, WorkingFrame};

/// Smallest width or height a sized shape may be resized to.
pub const MIN_EXTENT: f32 = 0.001;

/// One pointer step applied to an annotation through a sizing handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpatialModification {
    pub handle: SizingHandle,
    /// Vertex under the pointer for vertex and polyhedron handles.
    pub coordinate_index: Option<usize>,
    /// Viewport the annotation is displayed in.
    pub viewport: Option<Viewport>,
    /// Previous and current pointer position in window pixels.
    pub previous_px: (f32, f32),
    pub current_px: (f32, f32),
    /// The same two positions resolved in the annotation's own space;
    /// required for spaces that are not screen-anchored.
    pub previous_in_space: Option<[f32; 3]>,
    pub current_in_space: Option<[f32; 3]>,
    /// Vertex under the pointer, for surface annotations.
    pub surface_vertex: Option<SurfaceVertex>,
    pub first_drag: bool,
    /// Move the near/far counterpart together with a polyhedron vertex.
    pub move_two: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModificationOutcome {
    pub shape: Shape,
    /// Handle to use for the next step; box handles change sides when the
    /// box is dragged through itself.
    pub handle: SizingHandle,
}

fn rejected(operation: &str, reason: impl Into<String>) -> AnnotateError {
    AnnotateError::illegal(operation, reason)
}

/// Computes the shape `annotation` takes after `modification`.
pub fn apply(
    annotation: &Annotation,
    modification: &SpatialModification,
) -> Result<ModificationOutcome, AnnotateError> {
    if annotation.space == CoordinateSpace::Surface {
        return apply_on_surface(annotation, modification);
    }
    let frame = WorkingFrame::for_space(annotation.space, modification.viewport)
        .ok_or_else(|| AnnotateError::resolution("annotation is not in a displayed viewport"))?;
    let delta = frame_delta(frame, modification)?;
    let handle = modification.handle;
    tracing::trace!(?handle, first_drag = modification.first_drag, ?delta, "modify annotation");

    let mut shape = annotation.shape.clone();
    let mut next_handle = handle;
    match handle {
        SizingHandle::None => {
            if matches!(shape, Shape::Paired { .. }) && !annotation.space.is_screen_anchored() {
                return Err(rejected("move", "polyhedra move one face at a time"));
            }
            shape.for_each_coordinate_mut(|_, coordinate| coordinate.xyz = add(coordinate.xyz, delta));
        }
        SizingHandle::LineStart | SizingHandle::LineEnd => {
            let index = usize::from(handle == SizingHandle::LineEnd);
            if !matches!(shape, Shape::TwoPoint { .. }) {
                return Err(rejected("move line end", "annotation is not a line"));
            }
            translate_coordinate(&mut shape, index, delta)?;
        }
        SizingHandle::PolyLineCoordinate => {
            let index = vertex_index(modification)?;
            translate_coordinate(&mut shape, index, delta)?;
            if modification.move_two {
                if let Some(counterpart) = shape.paired_counterpart(index) {
                    translate_coordinate(&mut shape, counterpart, delta)?;
                }
            }
        }
        SizingHandle::PolyhedronEnd => {
            let face = vertex_index(modification)? % 2;
            let Shape::Paired { coordinates } = &mut shape else {
                return Err(rejected("move polyhedron end", "annotation is not a polyhedron"));
            };
            for coordinate in coordinates.iter_mut().skip(face).step_by(2) {
                coordinate.xyz = add(coordinate.xyz, delta);
            }
        }
        SizingHandle::PolyhedronResizeEnd => {
            let face = vertex_index(modification)? % 2;
            resize_polyhedron_end(&mut shape, face, delta)?;
        }
        SizingHandle::Rotation => {
            require_sized_editing(annotation.space)?;
            let pointer = pointer_in_frame(frame, modification)?;
            rotate(&mut shape, frame, pointer)?;
        }
        handle if handle.is_box_handle() => {
            require_sized_editing(annotation.space)?;
            next_handle = resize_box(&mut shape, frame, handle, delta)?;
        }
        _ => return Err(rejected("modify", format!("unsupported handle {handle:?}"))),
    }

    if let Some(coordinate) = shape.coordinates().into_iter().find(|c| !frame.in_bounds(c.xyz)) {
        return Err(rejected(
            "move",
            format!(
                "coordinate ({:.1}, {:.1}) leaves the viewport",
                coordinate.x(),
                coordinate.y()
            ),
        ));
    }
    Ok(ModificationOutcome {
        shape,
        handle: next_handle,
    })
}

/// Moves every coordinate by `delta` (arrow-key nudges).
pub fn translate(
    annotation: &Annotation,
    delta: [f32; 3],
    viewport: Option<Viewport>,
) -> Result<Shape, AnnotateError> {
    if annotation.space == CoordinateSpace::Surface {
        return Err(rejected("nudge", "surface annotations move between vertices"));
    }
    let frame = WorkingFrame::for_space(annotation.space, viewport)
        .ok_or_else(|| AnnotateError::resolution("annotation is not in a displayed viewport"))?;
    let mut shape = annotation.shape.clone();
    shape.for_each_coordinate_mut(|_, coordinate| coordinate.xyz = add(coordinate.xyz, delta));
    if shape.coordinates().into_iter().any(|c| !frame.in_bounds(c.xyz)) {
        return Err(rejected("nudge", "annotation would leave the viewport"));
    }
    Ok(shape)
}

fn require_sized_editing(space: CoordinateSpace) -> Result<(), AnnotateError> {
    if space.is_screen_anchored() || space.is_content_relative() {
        Ok(())
    } else {
        Err(rejected(
            "resize",
            format!("{} shapes cannot be resized or rotated", space.label()),
        ))
    }
}

fn vertex_index(modification: &SpatialModification) -> Result<usize, AnnotateError> {
    modification
        .coordinate_index
        .ok_or_else(|| rejected("move vertex", "no vertex under the pointer"))
}

fn translate_coordinate(shape: &mut Shape, index: usize, delta: [f32; 3]) -> Result<(), AnnotateError> {
    let coordinate = shape
        .coordinate_mut(index)
        .ok_or_else(|| rejected("move vertex", format!("no coordinate {index}")))?;
    coordinate.xyz = add(coordinate.xyz, delta);
    Ok(())
}

/// Pointer step in the units the annotation is stored in.
fn frame_delta(
    frame: WorkingFrame,
    modification: &SpatialModification,
) -> Result<[f32; 3], AnnotateError> {
    let (px, py) = modification.current_px;
    let (qx, qy) = modification.previous_px;
    if let Some((dx, dy)) = frame.pixel_delta_to_frame(px - qx, py - qy) {
        return Ok([dx, dy, 0.0]);
    }
    match (modification.previous_in_space, modification.current_in_space) {
        (Some(previous), Some(current)) => Ok(sub(current, previous)),
        _ => Err(AnnotateError::resolution(
            "pointer did not resolve in the annotation's space",
        )),
    }
}

/// Multipliers from frame units to a locally isotropic unit (viewport pixels
/// for screen frames).
fn frame_scale(frame: WorkingFrame) -> (f32, f32) {
    match frame {
        WorkingFrame::PercentOfViewport(viewport) => (viewport.width / 100.0, viewport.height / 100.0),
        WorkingFrame::ViewportPixels(_) | WorkingFrame::Native => (1.0, 1.0),
    }
}

fn pointer_in_frame(
    frame: WorkingFrame,
    modification: &SpatialModification,
) -> Result<(f32, f32), AnnotateError> {
    let (px, py) = modification.current_px;
    if let Some(position) = frame.pixel_to_frame(px, py) {
        return Ok(position);
    }
    modification
        .current_in_space
        .map(|xyz| (xyz[0], xyz[1]))
        .ok_or_else(|| AnnotateError::resolution("pointer did not resolve in the annotation's space"))
}

/// Angle from the pointer-to-center vector; the grip sits above the shape at 0 degrees.
fn rotate(shape: &mut Shape, frame: WorkingFrame, pointer: (f32, f32)) -> Result<(), AnnotateError> {
    let Shape::Sized {
        center,
        rotation_degrees,
        ..
    } = shape
    else {
        return Err(rejected("rotate", "annotation has no rotation"));
    };
    let (sx, sy) = frame_scale(frame);
    let dx = (pointer.0 - center.x()) * sx;
    let dy = (pointer.1 - center.y()) * sy;
    if dx.abs() <= f32::EPSILON && dy.abs() <= f32::EPSILON {
        return Err(rejected("rotate", "pointer is on the center"));
    }
    // angles grow clockwise from the grip
    let angle = 90.0 - dy.atan2(dx).to_degrees();
    *rotation_degrees = angle.rem_euclid(360.0);
    Ok(())
}

fn resize_box(
    shape: &mut Shape,
    frame: WorkingFrame,
    handle: SizingHandle,
    delta: [f32; 3],
) -> Result<SizingHandle, AnnotateError> {
    let Shape::Sized {
        center,
        width,
        height,
        rotation_degrees,
    } = shape
    else {
        return Err(rejected("resize", "annotation has no width and height"));
    };
    let (sx, sy) = frame_scale(frame);
    let (horizontal, vertical) = handle.box_edges();

    // Local axes of the box, clockwise rotation.
    let theta = rotation_degrees.to_radians();
    let u = [theta.cos(), -theta.sin(), 0.0];
    let v = [theta.sin(), theta.cos(), 0.0];

    let d = [delta[0] * sx, delta[1] * sy, 0.0];
    let (du, dv) = (dot(d, u), dot(d, v));

    let half_w = *width * sx / 2.0;
    let half_h = *height * sy / 2.0;
    let (mut left, mut right) = (-half_w, half_w);
    let (mut bottom, mut top) = (-half_h, half_h);
    match horizontal {
        1 => right += du,
        -1 => left += du,
        _ => {}
    }
    match vertical {
        1 => top += dv,
        -1 => bottom += dv,
        _ => {}
    }

    let new_width = (right - left) / sx;
    let new_height = (top - bottom) / sy;
    if new_width.abs() < MIN_EXTENT || new_height.abs() < MIN_EXTENT {
        return Err(rejected("resize", "box would collapse"));
    }

    let shift = add(scale(u, (left + right) / 2.0), scale(v, (bottom + top) / 2.0));
    center.xyz[0] += shift[0] / sx;
    center.xyz[1] += shift[1] / sy;
    *width = new_width.abs();
    *height = new_height.abs();

    let horizontal = if new_width < 0.0 { -horizontal } else { horizontal };
    let vertical = if new_height < 0.0 { -vertical } else { vertical };
    Ok(SizingHandle::from_box_edges(horizontal, vertical))
}

/// Slides one face along the near-to-far axis of the first vertex pair.
fn resize_polyhedron_end(shape: &mut Shape, face: usize, delta: [f32; 3]) -> Result<(), AnnotateError> {
    let Shape::Paired { coordinates } = shape else {
        return Err(rejected("resize polyhedron", "annotation is not a polyhedron"));
    };
    let (Some(near), Some(far)) = (coordinates.first(), coordinates.get(1)) else {
        return Err(rejected("resize polyhedron", "polyhedron has no vertices"));
    };
    let normal = normalize(sub(far.xyz, near.xyz))
        .ok_or_else(|| rejected("resize polyhedron", "faces coincide"))?;
    let step = scale(normal, dot(delta, normal));
    let depth = dot(sub(far.xyz, near.xyz), normal);
    let new_depth = if face == 0 {
        depth - dot(step, normal)
    } else {
        depth + dot(step, normal)
    };
    if new_depth < MIN_EXTENT {
        return Err(rejected("resize polyhedron", "faces would cross"));
    }
    for coordinate in coordinates.iter_mut().skip(face).step_by(2) {
        coordinate.xyz = add(coordinate.xyz, step);
    }
    Ok(())
}

/// Surface annotations move between vertices of the same mesh.
fn apply_on_surface(
    annotation: &Annotation,
    modification: &SpatialModification,
) -> Result<ModificationOutcome, AnnotateError> {
    let vertex = modification
        .surface_vertex
        .as_ref()
        .ok_or_else(|| AnnotateError::resolution("no surface vertex under the pointer"))?;
    let mut shape = annotation.shape.clone();
    let index = match (modification.handle, &shape) {
        (SizingHandle::None, Shape::Point { .. } | Shape::Sized { .. }) => 0,
        (SizingHandle::LineStart, Shape::TwoPoint { .. }) => 0,
        (SizingHandle::LineEnd, Shape::TwoPoint { .. }) => 1,
        (SizingHandle::PolyLineCoordinate, Shape::Multi { .. }) => vertex_index(modification)?,
        (SizingHandle::None, _) => {
            return Err(rejected(
                "move",
                "surface shapes with several vertices move one vertex at a time",
            ));
        }
        (handle, _) => {
            return Err(rejected(
                "modify",
                format!("{handle:?} is not available in surface space"),
            ));
        }
    };
    let coordinate = shape
        .coordinate_mut(index)
        .ok_or_else(|| rejected("move vertex", format!("no coordinate {index}")))?;
    match &coordinate.surface {
        Some(existing) if existing.same_mesh(vertex) => {}
        _ => {
            return Err(AnnotateError::resolution(format!(
                "vertex on {} is not on the annotation's mesh",
                vertex.structure
            )));
        }
    }
    coordinate.surface = Some(vertex.clone());
    if let Some(xyz) = modification.current_in_space {
        coordinate.xyz = xyz;
    }
    Ok(ModificationOutcome {
        shape,
        handle: modification.handle,
    })
}
