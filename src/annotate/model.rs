use serde::{Deserialize, Serialize};

use crate::annotate::error::AnnotateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference frame of every coordinate in one annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    Window,
    Tab,
    Viewport,
    Spacer,
    Surface,
    Stereotaxic,
    MediaPixel,
    Histology,
    Chart,
}

impl CoordinateSpace {
    /// Window, tab and spacer coordinates are stored as percentages (0-100)
    /// of the owning viewport.
    pub fn is_percent_of_viewport(self) -> bool {
        matches!(self, Self::Window | Self::Tab | Self::Spacer)
    }

    pub fn is_screen_anchored(self) -> bool {
        self.is_percent_of_viewport() || matches!(self, Self::Viewport)
    }

    /// Spaces whose natural units come from an underlying image, slice or chart.
    pub fn is_content_relative(self) -> bool {
        matches!(self, Self::MediaPixel | Self::Histology | Self::Chart)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Tab => "tab",
            Self::Viewport => "viewport",
            Self::Spacer => "spacer",
            Self::Surface => "surface",
            Self::Stereotaxic => "stereotaxic",
            Self::MediaPixel => "media",
            Self::Histology => "histology",
            Self::Chart => "chart",
        }
    }
}

/// Which window, tab or media file an annotation is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpaceAnchor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceVertex {
    pub structure: String,
    pub vertex_count: u32,
    pub vertex_index: u32,
}

impl SurfaceVertex {
    /// True when both vertices index into the same mesh.
    pub fn same_mesh(&self, other: &SurfaceVertex) -> bool {
        self.structure == other.structure && self.vertex_count == other.vertex_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub xyz: [f32; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceVertex>,
}

impl Coordinate {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            xyz: [x, y, z],
            surface: None,
        }
    }

    pub fn on_surface(vertex: SurfaceVertex) -> Self {
        Self {
            xyz: [0.0; 3],
            surface: Some(vertex),
        }
    }

    pub fn x(&self) -> f32 {
        self.xyz[0]
    }

    pub fn y(&self) -> f32 {
        self.xyz[1]
    }

    pub fn translated(&self, delta: [f32; 3]) -> Self {
        Self {
            xyz: [
                self.xyz[0] + delta[0],
                self.xyz[1] + delta[1],
                self.xyz[2] + delta[2],
            ],
            surface: self.surface.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    Marker,
    Line,
    Box,
    Oval,
    Text,
    Image,
    Polyline,
    Polygon,
    Polyhedron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Point,
    TwoPoint,
    Sized,
    MultiCoordinate,
    MultiPairedCoordinate,
}

impl AnnotationType {
    pub fn shape_kind(self) -> ShapeKind {
        match self {
            Self::Marker => ShapeKind::Point,
            Self::Line => ShapeKind::TwoPoint,
            Self::Box | Self::Oval | Self::Text | Self::Image => ShapeKind::Sized,
            Self::Polyline | Self::Polygon => ShapeKind::MultiCoordinate,
            Self::Polyhedron => ShapeKind::MultiPairedCoordinate,
        }
    }

    pub fn is_poly_type(self) -> bool {
        matches!(
            self.shape_kind(),
            ShapeKind::MultiCoordinate | ShapeKind::MultiPairedCoordinate
        )
    }

    /// Polygons and polyhedra have an edge from the last vertex back to the first.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Polygon | Self::Polyhedron)
    }

    /// Logical vertices required before a poly-type shape may be finished.
    pub fn min_finish_vertices(self) -> usize {
        match self {
            Self::Polyline => 2,
            Self::Polygon | Self::Polyhedron => 3,
            Self::Line => 2,
            Self::Marker | Self::Box | Self::Oval | Self::Text | Self::Image => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::Line => "line",
            Self::Box => "box",
            Self::Oval => "oval",
            Self::Text => "text",
            Self::Image => "image",
            Self::Polyline => "polyline",
            Self::Polygon => "polygon",
            Self::Polyhedron => "polyhedron",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Alpha comes from the fourth component.
    pub fn from_rgba_array(rgba: [u8; 4]) -> Self {
        Self::rgba(rgba[0], rgba[1], rgba[2], rgba[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    pub line: Color,
    #[serde(default)]
    pub fill: Option<Color>,
    pub line_width: f32,
    #[serde(default)]
    pub arrow_start: bool,
    #[serde(default)]
    pub arrow_end: bool,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            line: Color::rgba(255, 255, 255, 255),
            fill: None,
            line_width: 2.0,
            arrow_start: false,
            arrow_end: false,
        }
    }
}

/// Coordinates of an annotation, one variant per shape kind.
///
/// `Paired` stores near/far coordinates interleaved: index `2k` is the near
/// face of logical vertex `k` and `2k + 1` its far counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Point {
        coordinate: Coordinate,
    },
    TwoPoint {
        start: Coordinate,
        end: Coordinate,
    },
    Sized {
        center: Coordinate,
        width: f32,
        height: f32,
        rotation_degrees: f32,
    },
    Multi {
        coordinates: Vec<Coordinate>,
    },
    Paired {
        coordinates: Vec<Coordinate>,
    },
}

impl Shape {
    /// Shape holding a single seed coordinate. Paired shapes seed a
    /// degenerate pair which the caller replaces with a real near/far pair.
    pub fn seeded(kind: ShapeKind, coordinate: Coordinate) -> Self {
        match kind {
            ShapeKind::Point => Self::Point { coordinate },
            ShapeKind::TwoPoint => Self::TwoPoint {
                start: coordinate.clone(),
                end: coordinate,
            },
            ShapeKind::Sized => Self::Sized {
                center: coordinate,
                width: 0.0,
                height: 0.0,
                rotation_degrees: 0.0,
            },
            ShapeKind::MultiCoordinate => Self::Multi {
                coordinates: vec![coordinate],
            },
            ShapeKind::MultiPairedCoordinate => Self::Paired {
                coordinates: vec![coordinate.clone(), coordinate],
            },
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Point { .. } => ShapeKind::Point,
            Self::TwoPoint { .. } => ShapeKind::TwoPoint,
            Self::Sized { .. } => ShapeKind::Sized,
            Self::Multi { .. } => ShapeKind::MultiCoordinate,
            Self::Paired { .. } => ShapeKind::MultiPairedCoordinate,
        }
    }

    pub fn coordinate_count(&self) -> usize {
        match self {
            Self::Point { .. } | Self::Sized { .. } => 1,
            Self::TwoPoint { .. } => 2,
            Self::Multi { coordinates } | Self::Paired { coordinates } => coordinates.len(),
        }
    }

    /// Vertex count as the user sees it: a near/far pair counts once.
    pub fn logical_vertex_count(&self) -> usize {
        match self {
            Self::Paired { coordinates } => coordinates.len() / 2,
            other => other.coordinate_count(),
        }
    }

    pub fn coordinate(&self, index: usize) -> Option<&Coordinate> {
        match self {
            Self::Point { coordinate } => (index == 0).then_some(coordinate),
            Self::Sized { center, .. } => (index == 0).then_some(center),
            Self::TwoPoint { start, end } => match index {
                0 => Some(start),
                1 => Some(end),
                _ => None,
            },
            Self::Multi { coordinates } | Self::Paired { coordinates } => coordinates.get(index),
        }
    }

    pub fn coordinate_mut(&mut self, index: usize) -> Option<&mut Coordinate> {
        match self {
            Self::Point { coordinate } => (index == 0).then_some(coordinate),
            Self::Sized { center, .. } => (index == 0).then_some(center),
            Self::TwoPoint { start, end } => match index {
                0 => Some(start),
                1 => Some(end),
                _ => None,
            },
            Self::Multi { coordinates } | Self::Paired { coordinates } => {
                coordinates.get_mut(index)
            }
        }
    }

    pub fn coordinates(&self) -> Vec<&Coordinate> {
        (0..self.coordinate_count())
            .filter_map(|index| self.coordinate(index))
            .collect()
    }

    pub fn for_each_coordinate_mut(&mut self, mut f: impl FnMut(usize, &mut Coordinate)) {
        match self {
            Self::Point { coordinate } => f(0, coordinate),
            Self::Sized { center, .. } => f(0, center),
            Self::TwoPoint { start, end } => {
                f(0, start);
                f(1, end);
            }
            Self::Multi { coordinates } | Self::Paired { coordinates } => {
                for (index, coordinate) in coordinates.iter_mut().enumerate() {
                    f(index, coordinate);
                }
            }
        }
    }

    /// Index of the other half of a near/far pair.
    pub fn paired_counterpart(&self, index: usize) -> Option<usize> {
        match self {
            Self::Paired { coordinates } if index < coordinates.len() => Some(index ^ 1),
            _ => None,
        }
    }
}

/// Manipulable part of an annotation's rendered footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingHandle {
    /// Body of the shape: the whole shape translates.
    #[default]
    None,
    BoxBottom,
    BoxBottomLeft,
    BoxBottomRight,
    BoxLeft,
    BoxRight,
    BoxTop,
    BoxTopLeft,
    BoxTopRight,
    LineStart,
    LineEnd,
    Rotation,
    PolyLineCoordinate,
    PolyhedronEnd,
    PolyhedronResizeEnd,
}

impl SizingHandle {
    pub fn is_box_handle(self) -> bool {
        matches!(
            self,
            Self::BoxBottom
                | Self::BoxBottomLeft
                | Self::BoxBottomRight
                | Self::BoxLeft
                | Self::BoxRight
                | Self::BoxTop
                | Self::BoxTopLeft
                | Self::BoxTopRight
        )
    }

    /// Edge multipliers (left/right, bottom/top) moved by a box handle.
    /// `-1` moves the left or bottom edge, `1` the right or top edge.
    pub(crate) fn box_edges(self) -> (i8, i8) {
        match self {
            Self::BoxBottom => (0, -1),
            Self::BoxBottomLeft => (-1, -1),
            Self::BoxBottomRight => (1, -1),
            Self::BoxLeft => (-1, 0),
            Self::BoxRight => (1, 0),
            Self::BoxTop => (0, 1),
            Self::BoxTopLeft => (-1, 1),
            Self::BoxTopRight => (1, 1),
            _ => (0, 0),
        }
    }

    pub(crate) fn from_box_edges(horizontal: i8, vertical: i8) -> Self {
        match (horizontal, vertical) {
            (0, -1) => Self::BoxBottom,
            (-1, -1) => Self::BoxBottomLeft,
            (1, -1) => Self::BoxBottomRight,
            (-1, 0) => Self::BoxLeft,
            (1, 0) => Self::BoxRight,
            (0, 1) => Self::BoxTop,
            (-1, 1) => Self::BoxTopLeft,
            (1, 1) => Self::BoxTopRight,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_type: AnnotationType,
    pub space: CoordinateSpace,
    #[serde(default)]
    pub anchor: SpaceAnchor,
    pub shape: Shape,
    #[serde(default)]
    pub style: AnnotationStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Annotation {
    pub fn new(
        annotation_type: AnnotationType,
        space: CoordinateSpace,
        anchor: SpaceAnchor,
        seed: Coordinate,
    ) -> Self {
        let text = matches!(annotation_type, AnnotationType::Text).then(|| "New Text".to_string());
        Self {
            annotation_type,
            space,
            anchor,
            shape: Shape::seeded(annotation_type.shape_kind(), seed),
            style: AnnotationStyle::default(),
            text,
        }
    }

    pub fn shape_kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    pub fn coordinate_count(&self) -> usize {
        self.shape.coordinate_count()
    }

    /// Checks the structural invariants of the coordinate set.
    pub fn validate(&self) -> Result<(), AnnotateError> {
        if self.shape.kind() != self.annotation_type.shape_kind() {
            return Err(AnnotateError::invalid_construction(format!(
                "{} annotation carries a {:?} shape",
                self.annotation_type.label(),
                self.shape.kind()
            )));
        }
        if let Shape::Paired { coordinates } = &self.shape {
            if coordinates.len() % 2 != 0 {
                return Err(AnnotateError::invalid_construction(format!(
                    "paired shape has odd coordinate count {}",
                    coordinates.len()
                )));
            }
        }
        if self.space == CoordinateSpace::Surface {
            let mut vertices = self.shape.coordinates().into_iter().map(|c| c.surface.as_ref());
            let Some(Some(first)) = vertices.next() else {
                return Err(AnnotateError::invalid_construction(
                    "surface annotation without a surface vertex",
                ));
            };
            if vertices.any(|vertex| !vertex.is_some_and(|v| v.same_mesh(first))) {
                return Err(AnnotateError::invalid_construction(
                    "surface annotation spans more than one mesh",
                ));
            }
        }
        Ok(())
    }
}
