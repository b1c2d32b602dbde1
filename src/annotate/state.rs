use serde::{Deserialize, Serialize};

use crate::annotate::builder::{AnnotationBuilder, ClickSequenceBuilder, DragShapeBuilder, ShapeRequest};
use crate::annotate::model::{AnnotationId, AnnotationType, CoordinateSpace, FileId, SizingHandle};

/// Gesture in progress over selected annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectDrag {
    /// Annotation the press landed on.
    pub grabbed: AnnotationId,
    pub handle: SizingHandle,
    pub coordinate_index: Option<usize>,
    pub annotations: Vec<AnnotationId>,
    /// Mixed-space selections are never dragged.
    pub allowed: bool,
    /// A modification has already been recorded for this gesture.
    pub moved: bool,
}

/// Controller state; each variant carries only what that mode needs.
#[derive(Debug, Clone)]
pub enum Mode {
    Select {
        drag: Option<SelectDrag>,
    },
    DrawingSimpleShapeInitialize {
        request: ShapeRequest,
    },
    DrawingSimpleShape {
        builder: DragShapeBuilder,
    },
    DrawingPolyTypeInitialize {
        request: ShapeRequest,
    },
    DrawingPolyType {
        builder: ClickSequenceBuilder,
        /// Coordinate held by a move operation.
        grab: Option<usize>,
    },
    DrawingPolyTypeStereotaxicInitialize {
        request: ShapeRequest,
    },
    DrawingPolyTypeStereotaxic {
        builder: ClickSequenceBuilder,
        grab: Option<usize>,
    },
    Paste {
        file: FileId,
    },
    PasteSpecial {
        space: CoordinateSpace,
        file: FileId,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Self::select()
    }
}

impl Mode {
    pub fn select() -> Self {
        Self::Select { drag: None }
    }

    /// Initial drawing mode for a new shape request.
    pub fn initialize(request: ShapeRequest) -> Self {
        if request.is_stereotaxic_poly() {
            Self::DrawingPolyTypeStereotaxicInitialize { request }
        } else if request.annotation_type.is_poly_type() {
            Self::DrawingPolyTypeInitialize { request }
        } else {
            Self::DrawingSimpleShapeInitialize { request }
        }
    }

    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Select { .. } => ModeKind::Select,
            Self::DrawingSimpleShapeInitialize { .. } => ModeKind::DrawingSimpleShapeInitialize,
            Self::DrawingSimpleShape { .. } => ModeKind::DrawingSimpleShape,
            Self::DrawingPolyTypeInitialize { .. } => ModeKind::DrawingPolyTypeInitialize,
            Self::DrawingPolyType { .. } => ModeKind::DrawingPolyType,
            Self::DrawingPolyTypeStereotaxicInitialize { .. } => {
                ModeKind::DrawingPolyTypeStereotaxicInitialize
            }
            Self::DrawingPolyTypeStereotaxic { .. } => ModeKind::DrawingPolyTypeStereotaxic,
            Self::Paste { .. } => ModeKind::Paste,
            Self::PasteSpecial { .. } => ModeKind::PasteSpecial,
        }
    }

    /// File a new or pasted annotation will be added to.
    pub fn target_file(&self) -> Option<FileId> {
        match self {
            Self::DrawingSimpleShapeInitialize { request }
            | Self::DrawingPolyTypeInitialize { request }
            | Self::DrawingPolyTypeStereotaxicInitialize { request } => Some(request.file),
            Self::DrawingSimpleShape { builder } => Some(builder.file()),
            Self::DrawingPolyType { builder, .. } | Self::DrawingPolyTypeStereotaxic { builder, .. } => {
                Some(builder.file())
            }
            Self::Paste { file } | Self::PasteSpecial { file, .. } => Some(*file),
            Self::Select { .. } => None,
        }
    }

    pub fn poly_builder(&self) -> Option<&ClickSequenceBuilder> {
        match self {
            Self::DrawingPolyType { builder, .. } | Self::DrawingPolyTypeStereotaxic { builder, .. } => {
                Some(builder)
            }
            _ => None,
        }
    }

    pub fn poly_builder_mut(&mut self) -> Option<(&mut ClickSequenceBuilder, &mut Option<usize>)> {
        match self {
            Self::DrawingPolyType { builder, grab }
            | Self::DrawingPolyTypeStereotaxic { builder, grab } => Some((builder, grab)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Select,
    DrawingSimpleShapeInitialize,
    DrawingSimpleShape,
    DrawingPolyTypeInitialize,
    DrawingPolyType,
    DrawingPolyTypeStereotaxicInitialize,
    DrawingPolyTypeStereotaxic,
    Paste,
    PasteSpecial,
}

impl ModeKind {
    pub fn is_initialize(self) -> bool {
        matches!(
            self,
            Self::DrawingSimpleShapeInitialize
                | Self::DrawingPolyTypeInitialize
                | Self::DrawingPolyTypeStereotaxicInitialize
        )
    }

    /// A builder session exists.
    pub fn is_constructing(self) -> bool {
        matches!(
            self,
            Self::DrawingSimpleShape | Self::DrawingPolyType | Self::DrawingPolyTypeStereotaxic
        )
    }

    pub fn is_poly_drawing(self) -> bool {
        matches!(
            self,
            Self::DrawingPolyType | Self::DrawingPolyTypeStereotaxic
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolyTypeDrawEditOperation {
    AddNewCoordinate,
    Cancel,
    EraseLastCoordinate,
    RemoveCoordinate,
    InsertCoordinate,
    Finish,
    MoveOneCoordinate,
    MoveTwoCoordinates,
    MovePolyhedronEnd,
    ResizePolyhedronEnd,
}

impl PolyTypeDrawEditOperation {
    /// Operations that act once when chosen instead of shaping later pointer events.
    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Cancel | Self::Finish | Self::EraseLastCoordinate)
    }
}

/// The poly-type annotation operations apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyEditTarget {
    pub annotation_type: AnnotationType,
    /// Logical vertices; a near/far pair counts once.
    pub vertex_count: usize,
    /// Already in the store rather than under construction.
    pub finished: bool,
}

impl PolyEditTarget {
    pub fn under_construction(builder: &ClickSequenceBuilder) -> Self {
        Self {
            annotation_type: builder.annotation().annotation_type,
            vertex_count: builder.vertex_count(),
            finished: false,
        }
    }
}

/// Operations legal for `target`, in toolbar order.
pub fn available_operations(
    mode: ModeKind,
    target: Option<PolyEditTarget>,
) -> Vec<PolyTypeDrawEditOperation> {
    use PolyTypeDrawEditOperation as Op;

    let Some(target) = target else {
        return Vec::new();
    };
    if !target.annotation_type.is_poly_type() {
        return Vec::new();
    }
    let paired = matches!(target.annotation_type, AnnotationType::Polyhedron);
    let min = target.annotation_type.min_finish_vertices();
    let mut operations = Vec::new();

    match (mode, target.finished) {
        (mode, false) if mode.is_poly_drawing() => {
            operations.push(Op::AddNewCoordinate);
            operations.push(Op::Cancel);
            if target.vertex_count > 1 {
                operations.push(Op::EraseLastCoordinate);
                operations.push(Op::RemoveCoordinate);
                operations.push(Op::InsertCoordinate);
            }
            if target.vertex_count >= min {
                operations.push(Op::Finish);
            }
        }
        (ModeKind::Select, true) => {
            if target.vertex_count > min {
                operations.push(Op::RemoveCoordinate);
            }
            if target.vertex_count > 1 {
                operations.push(Op::InsertCoordinate);
            }
        }
        _ => return operations,
    }

    operations.push(Op::MoveOneCoordinate);
    if paired {
        operations.push(Op::MoveTwoCoordinates);
        operations.push(Op::MovePolyhedronEnd);
        operations.push(Op::ResizePolyhedronEnd);
    }
    operations
}

/// The user's choice when legal, otherwise the default for the mode.
pub fn effective_operation(
    requested: Option<PolyTypeDrawEditOperation>,
    available: &[PolyTypeDrawEditOperation],
) -> Option<PolyTypeDrawEditOperation> {
    use PolyTypeDrawEditOperation as Op;

    if let Some(requested) = requested.filter(|op| !op.is_immediate() && available.contains(op)) {
        return Some(requested);
    }
    [Op::AddNewCoordinate, Op::MoveOneCoordinate]
        .into_iter()
        .find(|op| available.contains(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use PolyTypeDrawEditOperation as Op;

    fn drawing(annotation_type: AnnotationType, vertex_count: usize) -> Option<PolyEditTarget> {
        Some(PolyEditTarget {
            annotation_type,
            vertex_count,
            finished: false,
        })
    }

    #[test]
    fn finish_appears_at_minimum_vertex_count() {
        let two = available_operations(ModeKind::DrawingPolyType, drawing(AnnotationType::Polygon, 2));
        assert!(!two.contains(&Op::Finish));
        let three =
            available_operations(ModeKind::DrawingPolyType, drawing(AnnotationType::Polygon, 3));
        assert!(three.contains(&Op::Finish));
    }

    #[test]
    fn finished_annotations_never_offer_add_or_finish() {
        let target = Some(PolyEditTarget {
            annotation_type: AnnotationType::Polyline,
            vertex_count: 4,
            finished: true,
        });
        let operations = available_operations(ModeKind::Select, target);
        assert!(!operations.contains(&Op::AddNewCoordinate));
        assert!(!operations.contains(&Op::Finish));
        assert!(operations.contains(&Op::RemoveCoordinate));
        assert_eq!(
            effective_operation(None, &operations),
            Some(Op::MoveOneCoordinate)
        );
        assert_eq!(
            effective_operation(Some(Op::AddNewCoordinate), &operations),
            Some(Op::MoveOneCoordinate)
        );
    }

    #[test]
    fn paired_shapes_offer_face_operations() {
        let operations = available_operations(
            ModeKind::DrawingPolyTypeStereotaxic,
            drawing(AnnotationType::Polyhedron, 1),
        );
        assert!(operations.contains(&Op::MoveTwoCoordinates));
        assert!(operations.contains(&Op::ResizePolyhedronEnd));
        assert!(!operations.contains(&Op::EraseLastCoordinate));
        assert_eq!(
            effective_operation(Some(Op::MovePolyhedronEnd), &operations),
            Some(Op::MovePolyhedronEnd)
        );
    }

    #[test]
    fn non_poly_targets_have_no_operations() {
        let target = Some(PolyEditTarget {
            annotation_type: AnnotationType::Box,
            vertex_count: 1,
            finished: true,
        });
        assert!(available_operations(ModeKind::Select, target).is_empty());
        assert!(available_operations(ModeKind::Paste, None).is_empty());
    }

    #[test]
    fn stereotaxic_poly_requests_use_stereotaxic_modes() {
        let request = ShapeRequest {
            annotation_type: AnnotationType::Polyhedron,
            space: CoordinateSpace::Stereotaxic,
            file: FileId(1),
        };
        assert_eq!(
            Mode::initialize(request).kind(),
            ModeKind::DrawingPolyTypeStereotaxicInitialize
        );
        let line = ShapeRequest {
            annotation_type: AnnotationType::Line,
            ..request
        };
        assert_eq!(
            Mode::initialize(line).kind(),
            ModeKind::DrawingSimpleShapeInitialize
        );
    }
}
