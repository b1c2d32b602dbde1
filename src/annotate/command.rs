use serde::{Deserialize, Serialize};

use crate::annotate::error::AnnotateError;
use crate::annotate::history::UndoCommand;
use crate::annotate::model::{
    Annotation, AnnotationId, AnnotationType, Color, CoordinateSpace, FileId, Shape,
};
use crate::annotate::modify::MIN_EXTENT;
use crate::annotate::store::AnnotationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateAnnotation,
    DeleteAnnotations,
    CutAnnotation,
    PasteAnnotation,
    LocationAndSize,
    AddCoordinate,
    InsertCoordinate,
    RemoveCoordinate,
    RotationAngle,
    LineColor,
    FillColor,
    LineWidth,
    LineArrowStart,
    LineArrowEnd,
    TwoDimWidth,
    TwoDimHeight,
    CoordinateOne,
    CoordinateTwo,
    CoordinateOneAndTwo,
}

impl CommandKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::CreateAnnotation => "Create Annotation",
            Self::DeleteAnnotations => "Delete Annotations",
            Self::CutAnnotation => "Cut Annotation",
            Self::PasteAnnotation => "Paste Annotation",
            Self::LocationAndSize => "Move/Resize Annotation",
            Self::AddCoordinate => "Add Coordinate",
            Self::InsertCoordinate => "Insert Coordinate",
            Self::RemoveCoordinate => "Remove Coordinate",
            Self::RotationAngle => "Rotate Annotation",
            Self::LineColor => "Line Color",
            Self::FillColor => "Fill Color",
            Self::LineWidth => "Line Width",
            Self::LineArrowStart => "Arrow at Start",
            Self::LineArrowEnd => "Arrow at End",
            Self::TwoDimWidth => "Width",
            Self::TwoDimHeight => "Height",
            Self::CoordinateOne => "Coordinate",
            Self::CoordinateTwo => "Second Coordinate",
            Self::CoordinateOneAndTwo => "Coordinates",
        }
    }
}

/// Value typed into an attribute editor for the selected annotations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", rename_all = "snake_case")]
pub enum AttributeEdit {
    LineColor { rgba: [u8; 4] },
    /// `None` turns the fill off.
    FillColor { rgba: Option<[u8; 4]> },
    LineWidth { width: f32 },
    ArrowStart { enabled: bool },
    ArrowEnd { enabled: bool },
    Width { width: f32 },
    Height { height: f32 },
    CoordinateOne { xyz: [f32; 3] },
    CoordinateTwo { xyz: [f32; 3] },
    CoordinateOneAndTwo { one: [f32; 3], two: [f32; 3] },
}

impl AttributeEdit {
    pub fn command_kind(&self) -> CommandKind {
        match self {
            Self::LineColor { .. } => CommandKind::LineColor,
            Self::FillColor { .. } => CommandKind::FillColor,
            Self::LineWidth { .. } => CommandKind::LineWidth,
            Self::ArrowStart { .. } => CommandKind::LineArrowStart,
            Self::ArrowEnd { .. } => CommandKind::LineArrowEnd,
            Self::Width { .. } => CommandKind::TwoDimWidth,
            Self::Height { .. } => CommandKind::TwoDimHeight,
            Self::CoordinateOne { .. } => CommandKind::CoordinateOne,
            Self::CoordinateTwo { .. } => CommandKind::CoordinateTwo,
            Self::CoordinateOneAndTwo { .. } => CommandKind::CoordinateOneAndTwo,
        }
    }

    /// Numeric edits arrive in bursts from spin boxes and fold into one
    /// undo step; colors and arrow toggles are recorded one by one.
    pub fn is_continuous(&self) -> bool {
        !matches!(
            self,
            Self::LineColor { .. }
                | Self::FillColor { .. }
                | Self::ArrowStart { .. }
                | Self::ArrowEnd { .. }
        )
    }

    /// Copy of `annotation` with the edit applied.
    pub fn applied_to(&self, annotation: &Annotation) -> Result<Annotation, AnnotateError> {
        let operation = self.command_kind().label();
        let refuse = |reason: String| Err(AnnotateError::illegal(operation, reason));
        let label = annotation.annotation_type.label();
        let mut after = annotation.clone();
        match self {
            Self::LineColor { rgba } => after.style.line = Color::from_rgba_array(*rgba),
            Self::FillColor { rgba } => {
                if matches!(
                    annotation.annotation_type,
                    AnnotationType::Line | AnnotationType::Polyline
                ) {
                    return refuse(format!("{label} has no fill"));
                }
                after.style.fill = rgba.map(Color::from_rgba_array);
            }
            Self::LineWidth { width } => {
                if !(width.is_finite() && *width > 0.0) {
                    return refuse(format!("line width {width} is not positive"));
                }
                after.style.line_width = *width;
            }
            Self::ArrowStart { enabled } | Self::ArrowEnd { enabled } => {
                if annotation.annotation_type != AnnotationType::Line {
                    return refuse(format!("{label} has no arrows"));
                }
                if matches!(self, Self::ArrowStart { .. }) {
                    after.style.arrow_start = *enabled;
                } else {
                    after.style.arrow_end = *enabled;
                }
            }
            Self::Width { width: value } | Self::Height { height: value } => {
                if !(value.is_finite() && *value >= MIN_EXTENT) {
                    return refuse(format!("extent {value} is too small"));
                }
                let Shape::Sized { width, height, .. } = &mut after.shape else {
                    return refuse(format!("{label} has no width or height"));
                };
                if matches!(self, Self::Width { .. }) {
                    *width = *value;
                } else {
                    *height = *value;
                }
            }
            Self::CoordinateOne { xyz } => set_xyz(&mut after, 0, *xyz, operation)?,
            Self::CoordinateTwo { xyz } => {
                require_two_point(&after, operation)?;
                set_xyz(&mut after, 1, *xyz, operation)?;
            }
            Self::CoordinateOneAndTwo { one, two } => {
                require_two_point(&after, operation)?;
                set_xyz(&mut after, 0, *one, operation)?;
                set_xyz(&mut after, 1, *two, operation)?;
            }
        }
        after.validate()?;
        Ok(after)
    }
}

fn require_two_point(annotation: &Annotation, operation: &str) -> Result<(), AnnotateError> {
    if matches!(annotation.shape, Shape::TwoPoint { .. }) {
        Ok(())
    } else {
        Err(AnnotateError::illegal(
            operation,
            format!("{} has no second coordinate", annotation.annotation_type.label()),
        ))
    }
}

fn set_xyz(
    annotation: &mut Annotation,
    index: usize,
    xyz: [f32; 3],
    operation: &str,
) -> Result<(), AnnotateError> {
    if annotation.space == CoordinateSpace::Surface {
        return Err(AnnotateError::illegal(
            operation,
            "surface coordinates are vertices",
        ));
    }
    if xyz.iter().any(|value| !value.is_finite()) {
        return Err(AnnotateError::illegal(operation, "coordinate is not finite"));
    }
    let coordinate = annotation
        .shape
        .coordinate_mut(index)
        .ok_or_else(|| AnnotateError::illegal(operation, format!("no coordinate {index}")))?;
    coordinate.xyz = xyz;
    Ok(())
}

/// State of one annotation on either side of a command. `None` means the
/// annotation is absent on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationMemento {
    pub id: AnnotationId,
    pub file: FileId,
    /// Where to reinsert the annotation inside its file.
    pub position: Option<usize>,
    pub before: Option<Annotation>,
    pub after: Option<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationCommand {
    kind: CommandKind,
    mementos: Vec<AnnotationMemento>,
    description: String,
    merge_eligible: bool,
}

impl AnnotationCommand {
    fn new(kind: CommandKind, mementos: Vec<AnnotationMemento>) -> Self {
        Self {
            kind,
            mementos,
            description: kind.label().to_string(),
            merge_eligible: false,
        }
    }

    pub fn create(id: AnnotationId, file: FileId, annotation: Annotation) -> Self {
        let description = format!("Create {}", annotation.annotation_type.label());
        Self::new(
            CommandKind::CreateAnnotation,
            vec![AnnotationMemento {
                id,
                file,
                position: None,
                before: None,
                after: Some(annotation),
            }],
        )
        .with_description(description)
    }

    pub fn paste(id: AnnotationId, file: FileId, annotation: Annotation) -> Self {
        Self::new(
            CommandKind::PasteAnnotation,
            vec![AnnotationMemento {
                id,
                file,
                position: None,
                before: None,
                after: Some(annotation),
            }],
        )
    }

    /// Removal of every annotation in `ids` that still exists in `store`.
    pub fn delete(store: &dyn AnnotationStore, ids: &[AnnotationId]) -> Result<Self, AnnotateError> {
        Ok(Self::new(
            CommandKind::DeleteAnnotations,
            removal_mementos(store, ids)?,
        ))
    }

    pub fn cut(store: &dyn AnnotationStore, id: AnnotationId) -> Result<Self, AnnotateError> {
        Ok(Self::new(
            CommandKind::CutAnnotation,
            removal_mementos(store, &[id])?,
        ))
    }

    /// In-place change of existing annotations: `(id, file, before, after)`.
    pub fn modify(
        kind: CommandKind,
        edits: impl IntoIterator<Item = (AnnotationId, FileId, Annotation, Annotation)>,
    ) -> Self {
        let mut mementos: Vec<AnnotationMemento> = edits
            .into_iter()
            .map(|(id, file, before, after)| AnnotationMemento {
                id,
                file,
                position: None,
                before: Some(before),
                after: Some(after),
            })
            .collect();
        mementos.sort_by_key(|memento| memento.id);
        Self::new(kind, mementos)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_merge_eligible(mut self, merge_eligible: bool) -> Self {
        self.merge_eligible = merge_eligible;
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn mementos(&self) -> &[AnnotationMemento] {
        &self.mementos
    }

    /// Sorted ids of every annotation the command touches.
    pub fn annotation_ids(&self) -> Vec<AnnotationId> {
        let mut ids: Vec<AnnotationId> = self.mementos.iter().map(|memento| memento.id).collect();
        ids.sort();
        ids
    }

    fn apply(&self, store: &mut dyn AnnotationStore, forward: bool) -> Result<(), AnnotateError> {
        let transitions = || {
            self.mementos.iter().map(move |memento| {
                let (from, to) = if forward {
                    (&memento.before, &memento.after)
                } else {
                    (&memento.after, &memento.before)
                };
                (memento, from, to)
            })
        };

        // All or nothing: check every target before touching the store.
        for (memento, from, _) in transitions() {
            let present = store.annotation(memento.id).is_some();
            let ok = match from {
                Some(_) => present,
                None => !present && store.contains_file(memento.file),
            };
            if !ok {
                return Err(AnnotateError::stale(memento.id));
            }
        }

        for (memento, _, to) in transitions() {
            match (memento_present(memento, forward), to) {
                (true, Some(annotation)) => {
                    store.replace_annotation(memento.id, annotation.clone())?
                }
                (true, None) => {
                    store.remove_annotation(memento.id)?;
                }
                (false, Some(annotation)) => store.insert_annotation(
                    memento.file,
                    memento.id,
                    annotation.clone(),
                    memento.position,
                )?,
                (false, None) => {}
            }
        }
        Ok(())
    }
}

/// Whether the annotation exists before the transition is applied.
fn memento_present(memento: &AnnotationMemento, forward: bool) -> bool {
    if forward {
        memento.before.is_some()
    } else {
        memento.after.is_some()
    }
}

/// Mementos ordered by file position so that reinsertion in order restores
/// the original layout.
fn removal_mementos(
    store: &dyn AnnotationStore,
    ids: &[AnnotationId],
) -> Result<Vec<AnnotationMemento>, AnnotateError> {
    let mut mementos = Vec::with_capacity(ids.len());
    for id in ids {
        let annotation = store.annotation(*id).ok_or_else(|| AnnotateError::stale(*id))?;
        let file = store.file_of(*id).ok_or_else(|| AnnotateError::stale(*id))?;
        let position = store.position_in_file(*id);
        mementos.push(AnnotationMemento {
            id: *id,
            file,
            position,
            before: Some(annotation.clone()),
            after: None,
        });
    }
    mementos.sort_by_key(|memento| (memento.file, memento.position));
    mementos.dedup_by_key(|memento| memento.id);
    Ok(mementos)
}

impl UndoCommand for AnnotationCommand {
    type Target = dyn AnnotationStore;

    fn redo(&self, target: &mut (dyn AnnotationStore + 'static)) -> Result<(), AnnotateError> {
        self.apply(target, true)
    }

    fn undo(&self, target: &mut (dyn AnnotationStore + 'static)) -> Result<(), AnnotateError> {
        self.apply(target, false)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_merge_eligible(&self) -> bool {
        self.merge_eligible
    }

    /// Same kind on the same annotations: keep our "before", take their "after".
    fn merge_with(&mut self, newer: &Self) -> bool {
        if self.kind != newer.kind || self.annotation_ids() != newer.annotation_ids() {
            return false;
        }
        for memento in &mut self.mementos {
            if let Some(replacement) = newer.mementos.iter().find(|other| other.id == memento.id) {
                memento.after = replacement.after.clone();
            }
        }
        true
    }
}
