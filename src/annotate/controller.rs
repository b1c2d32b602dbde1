use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::annotate::builder::{
    insert_vertex, remove_vertex, AnnotationBuilder, ClickSequenceBuilder, DragShapeBuilder,
    ShapeRequest,
};
use crate::annotate::command::{AnnotationCommand, AttributeEdit, CommandKind};
use crate::annotate::error::AnnotateError;
use crate::annotate::history::UndoableCommandStack;
use crate::annotate::input::{map_key_event_to_command, KeyCommand, KeyEvent, PointerEvent};
use crate::annotate::messages::AnnotateSignal;
use crate::annotate::model::{
    Annotation, AnnotationId, AnnotationType, CoordinateSpace, FileId, Shape, ShapeKind,
    SizingHandle, WindowId,
};
use crate::annotate::modify::{self, SpatialModification};
use crate::annotate::settings::AnnotateSettings;
use crate::annotate::space::{add, nudge_step, sub, CoordinateResolver, PickResolver, WorkingFrame};
use crate::annotate::state::{
    available_operations, effective_operation, Mode, ModeKind, PolyEditTarget,
    PolyTypeDrawEditOperation, SelectDrag,
};
use crate::annotate::store::{AnnotationStore, EditingMode};

/// Mode the user asked for from the toolbar or a menu.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeRequest {
    /// Also cancels whatever is under construction.
    Select,
    NewShape(ShapeRequest),
    Paste {
        file: FileId,
    },
    PasteSpecial {
        space: CoordinateSpace,
        file: FileId,
    },
}

/// Sequences pointer and keyboard events of one window into annotation
/// construction, editing and undoable commands.
///
/// Every handler runs to completion on the caller's thread. Failures that
/// only mean "nothing usable under the pointer" leave the state untouched;
/// command failures are reported through [`AnnotateSignal::CommandFailed`].
pub struct AnnotationInputModeController<P, S> {
    window: WindowId,
    pick: P,
    store: S,
    history: UndoableCommandStack<AnnotationCommand>,
    mode: Mode,
    requested_operation: Option<PolyTypeDrawEditOperation>,
    settings: AnnotateSettings,
    signals: Sender<AnnotateSignal>,
}

impl<P, S> AnnotationInputModeController<P, S>
where
    P: PickResolver,
    S: AnnotationStore + 'static,
{
    pub fn new(
        window: WindowId,
        pick: P,
        store: S,
        settings: AnnotateSettings,
        signals: Sender<AnnotateSignal>,
    ) -> Self {
        let history = UndoableCommandStack::new(settings.undo_capacity);
        Self {
            window,
            pick,
            store,
            history,
            mode: Mode::default(),
            requested_operation: None,
            settings,
            signals,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn pick(&self) -> &P {
        &self.pick
    }

    pub fn pick_mut(&mut self) -> &mut P {
        &mut self.pick
    }

    pub fn history(&self) -> &UndoableCommandStack<AnnotationCommand> {
        &self.history
    }

    pub fn settings(&self) -> &AnnotateSettings {
        &self.settings
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Annotation of the active builder session, if any.
    pub fn in_progress_annotation(&self) -> Option<&Annotation> {
        match &self.mode {
            Mode::DrawingSimpleShape { builder } => Some(builder.annotation()),
            mode => mode.poly_builder().map(|builder| builder.annotation()),
        }
    }

    pub fn selected_annotations(&self) -> Vec<AnnotationId> {
        self.store.selected_annotations(self.window)
    }

    /// Poly-type operations the toolbar may offer right now.
    pub fn available_poly_operations(&self) -> Vec<PolyTypeDrawEditOperation> {
        let target = match self.mode.poly_builder() {
            Some(builder) => Some(PolyEditTarget::under_construction(builder)),
            None if self.mode.kind() == ModeKind::Select => self.selected_poly_target(),
            None => None,
        };
        available_operations(self.mode.kind(), target)
    }

    /// Operation the next pointer press or drag will perform.
    pub fn effective_poly_operation(&self) -> Option<PolyTypeDrawEditOperation> {
        effective_operation(self.requested_operation, &self.available_poly_operations())
    }

    pub fn on_pointer_press(&mut self, event: &PointerEvent) {
        self.cancel_if_file_missing();
        match self.mode.kind() {
            ModeKind::Select => self.begin_select_gesture(event),
            kind if kind.is_initialize() => self.try_start_construction(event),
            kind if kind.is_poly_drawing() => self.poly_press(event),
            _ => {}
        }
    }

    pub fn on_pointer_drag(&mut self, event: &PointerEvent) {
        self.cancel_if_file_missing();
        match self.mode.kind() {
            ModeKind::Select => self.drag_selection(event),
            kind if kind.is_initialize() => self.try_start_construction(event),
            ModeKind::DrawingSimpleShape => self.drag_simple_shape(event),
            kind if kind.is_poly_drawing() => self.poly_drag(event),
            _ => {}
        }
    }

    pub fn on_pointer_release(&mut self, event: &PointerEvent) {
        self.cancel_if_file_missing();
        if self.mode.kind() == ModeKind::DrawingSimpleShape {
            self.finish_simple_shape(event);
            return;
        }
        match &mut self.mode {
            Mode::Select { drag } => *drag = None,
            Mode::DrawingPolyType { grab, .. } | Mode::DrawingPolyTypeStereotaxic { grab, .. } => {
                *grab = None
            }
            _ => {}
        }
    }

    /// Places the clipboard in the paste modes. Poly-type vertices are
    /// placed on press, not on click.
    pub fn on_pointer_click(&mut self, event: &PointerEvent) {
        self.cancel_if_file_missing();
        if matches!(self.mode.kind(), ModeKind::Paste | ModeKind::PasteSpecial) {
            self.paste_at(event);
        }
    }

    /// Finishes a poly-type shape. The second press of the double click has
    /// already added a vertex on top of the previous one; that duplicate is
    /// dropped first.
    pub fn on_double_click(&mut self, _event: &PointerEvent) {
        self.cancel_if_file_missing();
        let min_distance_sq = self.settings.drag_append_min_distance_sq();
        let Some((builder, grab)) = self.mode.poly_builder_mut() else {
            return;
        };
        *grab = None;
        if let [.., prior, last] = builder.samples() {
            let (dx, dy) = (last.x - prior.x, last.y - prior.y);
            if dx * dx + dy * dy < min_distance_sq {
                if let Err(err) = builder.erase_last_coordinate() {
                    tracing::trace!(%err, "duplicate vertex kept");
                }
            }
        }
        if let Err(err) = self.finish_poly() {
            self.absorb("finish", &err);
        }
    }

    pub fn on_key_press(&mut self, event: KeyEvent) {
        self.cancel_if_file_missing();
        let Some(command) = map_key_event_to_command(event) else {
            return;
        };
        let kind = self.mode.kind();
        tracing::trace!(?command, mode = ?kind, "key command");
        match command {
            KeyCommand::Cancel if kind == ModeKind::Select => self.deselect_all(),
            KeyCommand::Cancel => self.cancel_construction(),
            KeyCommand::Finish if kind.is_poly_drawing() => {
                if let Err(err) = self.finish_poly() {
                    self.absorb("finish", &err);
                }
            }
            KeyCommand::Delete | KeyCommand::Undo if kind.is_poly_drawing() => {
                if let Err(err) = self.erase_last() {
                    self.absorb("erase last coordinate", &err);
                }
            }
            KeyCommand::Delete if kind == ModeKind::Select => self.delete_selected(),
            KeyCommand::Undo if kind == ModeKind::Select => {
                if let Err(err) = self.undo() {
                    tracing::debug!(%err, "undo not applied");
                }
            }
            KeyCommand::Redo if kind == ModeKind::Select => {
                if let Err(err) = self.redo() {
                    tracing::debug!(%err, "redo not applied");
                }
            }
            KeyCommand::Copy if kind == ModeKind::Select => self.copy_selected(),
            KeyCommand::Cut if kind == ModeKind::Select => self.cut_selected(),
            KeyCommand::Nudge { dx, dy, coarse } if kind == ModeKind::Select => {
                self.nudge_selected(dx, dy, coarse)
            }
            _ => {}
        }
    }

    pub fn undo(&mut self) -> Result<(), AnnotateError> {
        if self.mode.kind().is_constructing() {
            return Err(AnnotateError::illegal(
                "undo",
                "finish or cancel the annotation under construction first",
            ));
        }
        let result = self.history.undo(&mut self.store);
        self.after_history_step(result)
    }

    pub fn redo(&mut self) -> Result<(), AnnotateError> {
        if self.mode.kind().is_constructing() {
            return Err(AnnotateError::illegal(
                "redo",
                "finish or cancel the annotation under construction first",
            ));
        }
        let result = self.history.redo(&mut self.store);
        self.after_history_step(result)
    }

    pub fn on_mode_change_request(&mut self, request: ModeRequest) -> Result<(), AnnotateError> {
        self.cancel_if_file_missing();
        if self.mode.kind().is_constructing() && request != ModeRequest::Select {
            return Err(AnnotateError::illegal(
                "change mode",
                "finish or cancel the annotation under construction first",
            ));
        }
        let mode = match request {
            ModeRequest::Select => Mode::select(),
            ModeRequest::NewShape(shape) => {
                self.require_file("draw", shape.file)?;
                if shape.annotation_type == AnnotationType::Polyhedron
                    && shape.space != CoordinateSpace::Stereotaxic
                {
                    return Err(AnnotateError::illegal(
                        "draw polyhedron",
                        "polyhedra are drawn in stereotaxic space",
                    ));
                }
                self.store
                    .select_for_editing(self.window, EditingMode::Annotations, false, None);
                Mode::initialize(shape)
            }
            ModeRequest::Paste { file } => {
                self.require_file("paste", file)?;
                if self.store.clipboard().is_none() {
                    return Err(AnnotateError::illegal("paste", "clipboard is empty"));
                }
                Mode::Paste { file }
            }
            ModeRequest::PasteSpecial { space, file } => {
                self.require_file("paste special", file)?;
                match self.store.clipboard().map(|annotation| annotation.shape_kind()) {
                    Some(ShapeKind::Point | ShapeKind::Sized) => {}
                    Some(_) => {
                        return Err(AnnotateError::illegal(
                            "paste special",
                            "only single-anchor annotations change space",
                        ));
                    }
                    None => return Err(AnnotateError::illegal("paste special", "clipboard is empty")),
                }
                Mode::PasteSpecial { space, file }
            }
        };
        self.set_mode(mode);
        Ok(())
    }

    /// Toolbar choice of a poly-type operation. Cancel, finish and erase act
    /// at once; the others shape the following pointer events.
    pub fn on_poly_type_operation(
        &mut self,
        operation: PolyTypeDrawEditOperation,
    ) -> Result<(), AnnotateError> {
        if !self.available_poly_operations().contains(&operation) {
            return Err(AnnotateError::illegal(
                format!("{operation:?}"),
                "not available for the current annotation",
            ));
        }
        match operation {
            PolyTypeDrawEditOperation::Cancel => {
                self.cancel_construction();
                Ok(())
            }
            PolyTypeDrawEditOperation::Finish => self.finish_poly(),
            PolyTypeDrawEditOperation::EraseLastCoordinate => self.erase_last(),
            operation => {
                self.requested_operation = Some(operation);
                self.notify(AnnotateSignal::ToolbarRefresh);
                Ok(())
            }
        }
    }

    /// Attribute editor change on every selected annotation, recorded as a
    /// single undoable command.
    pub fn on_attribute_edit(&mut self, edit: AttributeEdit) -> Result<(), AnnotateError> {
        let operation = edit.command_kind().label();
        if self.mode.kind().is_constructing() {
            return Err(AnnotateError::illegal(
                operation,
                "finish or cancel the annotation under construction first",
            ));
        }
        let selected = self.store.selected_annotations(self.window);
        if selected.is_empty() {
            return Err(AnnotateError::illegal(operation, "no annotation is selected"));
        }
        let resolver = CoordinateResolver::new(&self.pick);
        let mut edits = Vec::with_capacity(selected.len());
        for id in selected {
            let before = self.store.annotation(id).ok_or_else(|| AnnotateError::stale(id))?;
            let file = self.store.file_of(id).ok_or_else(|| AnnotateError::stale(id))?;
            let after = edit.applied_to(before)?;
            let viewport = resolver.viewport_of(after.space, &after.anchor);
            if let Some(frame) = WorkingFrame::for_space(after.space, viewport) {
                if after.shape.coordinates().into_iter().any(|c| !frame.in_bounds(c.xyz)) {
                    return Err(AnnotateError::illegal(operation, "coordinate leaves the viewport"));
                }
            }
            if after != *before {
                edits.push((id, file, before.clone(), after));
            }
        }
        if edits.is_empty() {
            return Ok(());
        }
        tracing::debug!(operation, count = edits.len(), "attribute edit");
        let command = AnnotationCommand::modify(edit.command_kind(), edits)
            .with_merge_eligible(edit.is_continuous());
        self.execute(command)
    }

    /// Something outside the controller deleted `id`.
    pub fn on_external_annotation_deleted(&mut self, id: AnnotationId) {
        if let Mode::Select { drag } = &mut self.mode {
            if drag
                .as_ref()
                .is_some_and(|drag| drag.annotations.contains(&id))
            {
                *drag = None;
            }
        }
        self.cancel_if_file_missing();
        self.notify(AnnotateSignal::Repaint);
        self.notify(AnnotateSignal::ToolbarRefresh);
    }

    /// The file behind `file` was closed or deleted.
    pub fn on_file_removed(&mut self, file: FileId) {
        if self.mode.target_file() == Some(file) {
            tracing::info!(?file, "annotation file removed, cancelling construction");
            self.set_mode(Mode::select());
        }
        if let Mode::Select { drag } = &mut self.mode {
            let store = &self.store;
            if drag.as_ref().is_some_and(|drag| {
                drag.annotations
                    .iter()
                    .any(|id| store.annotation(*id).is_none())
            }) {
                *drag = None;
            }
        }
        self.notify(AnnotateSignal::Repaint);
    }

    fn notify(&self, signal: AnnotateSignal) {
        let _ = self.signals.send(signal);
    }

    fn set_mode(&mut self, mode: Mode) {
        let previous = self.mode.kind();
        self.mode = mode;
        self.finish_transition(previous);
    }

    fn finish_transition(&mut self, previous: ModeKind) {
        let current = self.mode.kind();
        if previous != current {
            tracing::debug!(from = ?previous, to = ?current, "annotation mode changed");
            self.requested_operation = None;
            self.notify(AnnotateSignal::ModeChanged { mode: current });
        }
        self.notify(AnnotateSignal::ToolbarRefresh);
        self.notify(AnnotateSignal::Repaint);
    }

    /// Implicit cancel when the file a construction targets is gone.
    fn cancel_if_file_missing(&mut self) {
        if let Some(file) = self.mode.target_file() {
            if !self.store.contains_file(file) {
                tracing::info!(?file, mode = ?self.mode.kind(), "target file is gone, back to select");
                self.set_mode(Mode::select());
            }
        }
    }

    fn cancel_construction(&mut self) {
        if self.mode.kind() != ModeKind::Select {
            tracing::debug!(mode = ?self.mode.kind(), "construction cancelled");
            self.set_mode(Mode::select());
        }
    }

    fn require_file(&self, operation: &str, file: FileId) -> Result<(), AnnotateError> {
        if self.store.contains_file(file) {
            Ok(())
        } else {
            Err(AnnotateError::illegal(
                operation,
                format!("file {} is not open", file.0),
            ))
        }
    }

    fn absorb(&self, operation: &str, err: &AnnotateError) {
        tracing::debug!(operation, %err, "ignored");
    }

    fn report(&self, err: &AnnotateError) {
        if err.is_user_visible() {
            tracing::warn!(%err, "annotation command failed");
            self.notify(AnnotateSignal::CommandFailed {
                message: err.to_string(),
            });
        } else {
            tracing::debug!(%err, "annotation command not applied");
        }
    }

    /// Applies and records `command`. Failures reach the user.
    fn execute(&mut self, command: AnnotationCommand) -> Result<(), AnnotateError> {
        match self.history.push_and_redo(command, &mut self.store) {
            Ok(_) => {
                self.notify(AnnotateSignal::Repaint);
                self.notify(AnnotateSignal::ToolbarRefresh);
                Ok(())
            }
            Err(err) => {
                self.notify(AnnotateSignal::CommandFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn after_history_step(&mut self, result: Result<(), AnnotateError>) -> Result<(), AnnotateError> {
        match result {
            Ok(()) => {
                if let Mode::Select { drag } = &mut self.mode {
                    *drag = None;
                }
                self.notify(AnnotateSignal::Repaint);
                self.notify(AnnotateSignal::ToolbarRefresh);
                Ok(())
            }
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Adds a finished annotation through the history and selects it.
    fn commit(
        &mut self,
        file: FileId,
        annotation: Annotation,
        kind: CommandKind,
    ) -> Result<AnnotationId, AnnotateError> {
        let id = self.store.allocate_id();
        let command = match kind {
            CommandKind::PasteAnnotation => AnnotationCommand::paste(id, file, annotation),
            _ => AnnotationCommand::create(id, file, annotation),
        };
        self.execute(command)?;
        self.store
            .select_for_editing(self.window, EditingMode::Annotations, false, Some(id));
        tracing::info!(annotation = %id, file = file.0, "annotation added");
        Ok(id)
    }

    fn try_start_construction(&mut self, event: &PointerEvent) {
        let request = match &self.mode {
            Mode::DrawingSimpleShapeInitialize { request }
            | Mode::DrawingPolyTypeInitialize { request }
            | Mode::DrawingPolyTypeStereotaxicInitialize { request } => *request,
            _ => return,
        };
        let resolver = CoordinateResolver::new(&self.pick);
        let started = if request.annotation_type.is_poly_type() {
            ClickSequenceBuilder::start(&resolver, &request, event, &self.settings).map(|builder| {
                if request.is_stereotaxic_poly() {
                    Mode::DrawingPolyTypeStereotaxic {
                        builder,
                        grab: None,
                    }
                } else {
                    Mode::DrawingPolyType {
                        builder,
                        grab: None,
                    }
                }
            })
        } else {
            DragShapeBuilder::start(&resolver, &request, event, &self.settings)
                .map(|builder| Mode::DrawingSimpleShape { builder })
        };
        match started {
            Ok(mode) => self.set_mode(mode),
            Err(err) => self.absorb("start construction", &err),
        }
    }

    fn drag_simple_shape(&mut self, event: &PointerEvent) {
        let resolver = CoordinateResolver::new(&self.pick);
        let Mode::DrawingSimpleShape { builder } = &mut self.mode else {
            return;
        };
        match builder.add_coordinate(&resolver, event) {
            Ok(_) => self.notify(AnnotateSignal::Repaint),
            Err(err) => self.absorb("drag shape", &err),
        }
    }

    fn finish_simple_shape(&mut self, event: &PointerEvent) {
        let previous = self.mode.kind();
        let mut builder = match std::mem::take(&mut self.mode) {
            Mode::DrawingSimpleShape { builder } => builder,
            other => {
                self.mode = other;
                return;
            }
        };
        let resolver = CoordinateResolver::new(&self.pick);
        if event.position() != builder.press_event().position() {
            if let Err(err) = builder.add_coordinate(&resolver, event) {
                self.absorb("release", &err);
            }
        }
        let file = builder.file();
        match builder.finish() {
            Ok(annotation) => {
                if let Err(err) = self.commit(file, annotation, CommandKind::CreateAnnotation) {
                    tracing::debug!(%err, "finished shape not added");
                }
            }
            Err(err) => self.absorb("finish shape", &err),
        }
        self.finish_transition(previous);
    }

    fn finish_poly(&mut self) -> Result<(), AnnotateError> {
        match self.mode.poly_builder() {
            Some(builder) if builder.can_finish() => {}
            Some(builder) => {
                let annotation = builder.annotation();
                return Err(AnnotateError::illegal(
                    "finish",
                    format!(
                        "{} needs {} vertices",
                        annotation.annotation_type.label(),
                        annotation.annotation_type.min_finish_vertices()
                    ),
                ));
            }
            None => return Err(AnnotateError::illegal("finish", "nothing under construction")),
        }

        let previous = self.mode.kind();
        let builder = match std::mem::take(&mut self.mode) {
            Mode::DrawingPolyType { builder, .. } | Mode::DrawingPolyTypeStereotaxic { builder, .. } => {
                builder
            }
            other => {
                self.mode = other;
                return Err(AnnotateError::illegal("finish", "nothing under construction"));
            }
        };
        let file = builder.file();
        let result = builder
            .finish()
            .and_then(|annotation| self.commit(file, annotation, CommandKind::CreateAnnotation))
            .map(|_| ());
        self.finish_transition(previous);
        result
    }

    fn erase_last(&mut self) -> Result<(), AnnotateError> {
        let (builder, grab) = self
            .mode
            .poly_builder_mut()
            .ok_or_else(|| AnnotateError::illegal("erase last coordinate", "nothing under construction"))?;
        *grab = None;
        builder.erase_last_coordinate()?;
        self.notify(AnnotateSignal::Repaint);
        self.notify(AnnotateSignal::ToolbarRefresh);
        Ok(())
    }

    fn poly_press(&mut self, event: &PointerEvent) {
        use PolyTypeDrawEditOperation as Op;

        let Some(operation) = self.effective_poly_operation() else {
            return;
        };
        let resolver = CoordinateResolver::new(&self.pick);
        let pick = resolver.pick_at(event.x, event.y);
        // the in-progress annotation is reported without an id
        let picked_index = pick.coordinate_index.filter(|_| pick.annotation.is_none());
        let Some((builder, grab)) = self.mode.poly_builder_mut() else {
            return;
        };
        let result = match (operation, picked_index) {
            (Op::AddNewCoordinate, _) => builder.add_coordinate(&resolver, event).map(|_| ()),
            (Op::InsertCoordinate, Some(index)) => {
                let vertex = logical_vertex(&builder.annotation().shape, index);
                builder.insert_coordinate_at_index(&resolver, event, vertex, pick.fractional_distance)
            }
            (Op::RemoveCoordinate, Some(index)) => {
                let vertex = logical_vertex(&builder.annotation().shape, index);
                builder.remove_coordinate_at_index(vertex)
            }
            (
                Op::MoveOneCoordinate
                | Op::MoveTwoCoordinates
                | Op::MovePolyhedronEnd
                | Op::ResizePolyhedronEnd,
                Some(index),
            ) => {
                *grab = Some(index);
                Ok(())
            }
            _ => Err(AnnotateError::resolution("no vertex under the pointer")),
        };
        match result {
            Ok(()) => {
                self.notify(AnnotateSignal::Repaint);
                self.notify(AnnotateSignal::ToolbarRefresh);
            }
            Err(err) => self.absorb("poly press", &err),
        }
    }

    fn poly_drag(&mut self, event: &PointerEvent) {
        use PolyTypeDrawEditOperation as Op;

        let operation = self.effective_poly_operation();
        let resolver = CoordinateResolver::new(&self.pick);
        let Some((builder, grab)) = self.mode.poly_builder_mut() else {
            return;
        };
        let result = match (*grab, operation) {
            (Some(index), Some(Op::MoveOneCoordinate)) => {
                builder.move_coordinate_at_index(&resolver, event, index)
            }
            (Some(index), Some(Op::MoveTwoCoordinates)) => {
                builder.move_coordinate_pair_at_index(&resolver, event, index)
            }
            (Some(index), Some(operation @ (Op::MovePolyhedronEnd | Op::ResizePolyhedronEnd))) => {
                let handle = if operation == Op::MovePolyhedronEnd {
                    SizingHandle::PolyhedronEnd
                } else {
                    SizingHandle::PolyhedronResizeEnd
                };
                modification_for(&resolver, builder.annotation(), event, handle, Some(index))
                    .and_then(|modification| modify::apply(builder.annotation(), &modification))
                    .and_then(|outcome| builder.replace_shape(outcome.shape))
            }
            (None, Some(Op::AddNewCoordinate)) => {
                builder.add_coordinate(&resolver, event).map(|_| ())
            }
            _ => Ok(()),
        };
        match result {
            Ok(()) => self.notify(AnnotateSignal::Repaint),
            Err(err) => self.absorb("poly drag", &err),
        }
    }

    fn selected_poly_target(&self) -> Option<PolyEditTarget> {
        let selected = self.store.selected_annotations(self.window);
        let [id] = selected[..] else {
            return None;
        };
        let annotation = self.store.annotation(id)?;
        annotation
            .annotation_type
            .is_poly_type()
            .then(|| PolyEditTarget {
                annotation_type: annotation.annotation_type,
                vertex_count: annotation.shape.logical_vertex_count(),
                finished: true,
            })
    }

    /// All of `ids` exist and share one coordinate space.
    fn same_space(&self, ids: &[AnnotationId]) -> bool {
        let mut spaces = ids
            .iter()
            .map(|id| self.store.annotation(*id).map(|annotation| annotation.space));
        match spaces.next() {
            Some(Some(first)) => spaces.all(|space| space == Some(first)),
            _ => false,
        }
    }

    fn deselect_all(&mut self) {
        self.store
            .select_for_editing(self.window, EditingMode::Annotations, false, None);
        if let Mode::Select { drag } = &mut self.mode {
            *drag = None;
        }
        self.notify(AnnotateSignal::Repaint);
        self.notify(AnnotateSignal::ToolbarRefresh);
    }

    fn begin_select_gesture(&mut self, event: &PointerEvent) {
        use PolyTypeDrawEditOperation as Op;

        let pick = CoordinateResolver::new(&self.pick).pick_at(event.x, event.y);
        let additive = event.modifiers.is_additive();
        let Some(id) = pick.annotation.filter(|id| self.store.annotation(*id).is_some()) else {
            if additive {
                return;
            }
            self.deselect_all();
            return;
        };

        let selected = self.store.selected_annotations(self.window);
        if selected == [id] && !additive {
            if let (Some(operation @ (Op::InsertCoordinate | Op::RemoveCoordinate)), Some(index)) =
                (self.effective_poly_operation(), pick.coordinate_index)
            {
                if let Err(err) =
                    self.edit_vertex(id, operation, index, pick.fractional_distance, event)
                {
                    self.absorb("edit vertex", &err);
                }
                return;
            }
        }

        if additive || !selected.contains(&id) {
            self.store
                .select_for_editing(self.window, EditingMode::Annotations, additive, Some(id));
        }
        let selected = self.store.selected_annotations(self.window);
        let drag = selected.contains(&id).then(|| SelectDrag {
            grabbed: id,
            handle: if selected.len() > 1 {
                SizingHandle::None
            } else {
                pick.handle
            },
            coordinate_index: pick.coordinate_index,
            allowed: self.same_space(&selected),
            annotations: selected,
            moved: false,
        });
        tracing::trace!(annotation = %id, handle = ?pick.handle, "select gesture");
        self.mode = Mode::Select { drag };
        self.notify(AnnotateSignal::Repaint);
        self.notify(AnnotateSignal::ToolbarRefresh);
    }

    /// Vertex insert or remove on a finished poly-type annotation.
    fn edit_vertex(
        &mut self,
        id: AnnotationId,
        operation: PolyTypeDrawEditOperation,
        coordinate_index: usize,
        fraction: Option<f32>,
        event: &PointerEvent,
    ) -> Result<(), AnnotateError> {
        let before = self
            .store
            .annotation(id)
            .cloned()
            .ok_or_else(|| AnnotateError::stale(id))?;
        let file = self.store.file_of(id).ok_or_else(|| AnnotateError::stale(id))?;
        let vertex = logical_vertex(&before.shape, coordinate_index);
        let mut after = before.clone();
        let kind = match operation {
            PolyTypeDrawEditOperation::InsertCoordinate => {
                let surface_pick = if before.space == CoordinateSpace::Surface {
                    let resolver = CoordinateResolver::new(&self.pick);
                    Some(resolver.resolve_event(event, CoordinateSpace::Surface)?.coordinate)
                } else {
                    None
                };
                insert_vertex(&mut after, vertex, fraction, surface_pick)?;
                CommandKind::InsertCoordinate
            }
            PolyTypeDrawEditOperation::RemoveCoordinate => {
                remove_vertex(
                    &mut after,
                    vertex,
                    before.annotation_type.min_finish_vertices(),
                )?;
                CommandKind::RemoveCoordinate
            }
            operation => {
                return Err(AnnotateError::illegal(
                    format!("{operation:?}"),
                    "not a vertex edit",
                ));
            }
        };
        self.execute(AnnotationCommand::modify(kind, [(id, file, before, after)]))
    }

    fn drag_selection(&mut self, event: &PointerEvent) {
        use PolyTypeDrawEditOperation as Op;

        let Mode::Select { drag: Some(drag) } = &self.mode else {
            return;
        };
        let drag = drag.clone();
        if !drag.allowed {
            tracing::trace!(count = drag.annotations.len(), "mixed-space drag ignored");
            return;
        }
        let targets = if drag.handle == SizingHandle::None && drag.annotations.len() > 1 {
            drag.annotations.clone()
        } else {
            vec![drag.grabbed]
        };
        let operation = self.effective_poly_operation();
        let handle = match (drag.handle, operation) {
            (SizingHandle::PolyLineCoordinate, Some(Op::MovePolyhedronEnd)) => {
                SizingHandle::PolyhedronEnd
            }
            (SizingHandle::PolyLineCoordinate, Some(Op::ResizePolyhedronEnd)) => {
                SizingHandle::PolyhedronResizeEnd
            }
            (handle, _) => handle,
        };

        let resolver = CoordinateResolver::new(&self.pick);
        let mut edits = Vec::with_capacity(targets.len());
        let mut next_handle = drag.handle;
        for id in targets {
            let (Some(before), Some(file)) = (self.store.annotation(id), self.store.file_of(id))
            else {
                tracing::debug!(annotation = %id, "dragged annotation is gone");
                self.mode = Mode::select();
                return;
            };
            let outcome = modification_for(&resolver, before, event, handle, drag.coordinate_index)
                .and_then(|mut modification| {
                    modification.first_drag = !drag.moved;
                    modification.move_two = operation == Some(Op::MoveTwoCoordinates);
                    modify::apply(before, &modification)
                });
            match outcome {
                Ok(outcome) => {
                    if handle == drag.handle {
                        next_handle = outcome.handle;
                    }
                    let mut after = before.clone();
                    after.shape = outcome.shape;
                    edits.push((id, file, before.clone(), after));
                }
                Err(err) => {
                    // one rejected target holds the whole selection in place
                    tracing::trace!(annotation = %id, %err, "modification rejected");
                    return;
                }
            }
        }

        let kind = if handle == SizingHandle::Rotation {
            CommandKind::RotationAngle
        } else {
            CommandKind::LocationAndSize
        };
        let command = AnnotationCommand::modify(kind, edits)
            .with_merge_eligible(drag.moved && !event.first_in_gesture);
        if self.execute(command).is_ok() {
            if let Mode::Select {
                drag: Some(current),
            } = &mut self.mode
            {
                current.moved = true;
                current.handle = next_handle;
            }
        }
    }

    fn delete_selected(&mut self) {
        let selected = self.store.selected_annotations(self.window);
        if selected.is_empty() {
            return;
        }
        match AnnotationCommand::delete(&self.store, &selected) {
            Ok(command) => {
                let count = command.mementos().len();
                if self.execute(command).is_ok() {
                    tracing::info!(count, "annotations deleted");
                }
            }
            Err(err) => self.report(&err),
        }
        if let Mode::Select { drag } = &mut self.mode {
            *drag = None;
        }
    }

    fn single_selected(&self, operation: &str) -> Option<AnnotationId> {
        let selected = self.store.selected_annotations(self.window);
        match selected[..] {
            [id] => Some(id),
            _ => {
                tracing::debug!(
                    operation,
                    selected = selected.len(),
                    "needs exactly one selected annotation"
                );
                None
            }
        }
    }

    fn copy_selected(&mut self) {
        let Some(id) = self.single_selected("copy") else {
            return;
        };
        if let Some(annotation) = self.store.annotation(id).cloned() {
            self.store.set_clipboard(annotation);
            self.notify(AnnotateSignal::ToolbarRefresh);
        }
    }

    fn cut_selected(&mut self) {
        let Some(id) = self.single_selected("cut") else {
            return;
        };
        let Some(annotation) = self.store.annotation(id).cloned() else {
            return;
        };
        match AnnotationCommand::cut(&self.store, id) {
            Ok(command) => {
                if self.execute(command).is_ok() {
                    self.store.set_clipboard(annotation);
                }
            }
            Err(err) => self.report(&err),
        }
        if let Mode::Select { drag } = &mut self.mode {
            *drag = None;
        }
    }

    fn nudge_selected(&mut self, dx: i8, dy: i8, coarse: bool) {
        let selected = self.store.selected_annotations(self.window);
        if selected.is_empty() {
            return;
        }
        if !self.same_space(&selected) {
            tracing::trace!(count = selected.len(), "mixed-space nudge ignored");
            return;
        }
        let resolver = CoordinateResolver::new(&self.pick);
        let mut edits = Vec::with_capacity(selected.len());
        for id in selected {
            let (Some(before), Some(file)) = (self.store.annotation(id), self.store.file_of(id))
            else {
                return;
            };
            let viewport = resolver.viewport_of(before.space, &before.anchor);
            let content = resolver.content_bounds_of(before.space, &before.anchor);
            let shape = nudge_step(before.space, viewport, content, &self.settings, coarse).and_then(
                |(step_x, step_y)| {
                    let delta = [f32::from(dx) * step_x, f32::from(dy) * step_y, 0.0];
                    modify::translate(before, delta, viewport)
                },
            );
            match shape {
                Ok(shape) => {
                    let mut after = before.clone();
                    after.shape = shape;
                    edits.push((id, file, before.clone(), after));
                }
                Err(err) => {
                    self.absorb("nudge", &err);
                    return;
                }
            }
        }
        if let Err(err) = self.execute(AnnotationCommand::modify(CommandKind::LocationAndSize, edits)) {
            tracing::debug!(%err, "nudge not applied");
        }
    }

    fn paste_at(&mut self, event: &PointerEvent) {
        let (file, space) = match &self.mode {
            Mode::Paste { file } => (*file, None),
            Mode::PasteSpecial { space, file } => (*file, Some(*space)),
            _ => return,
        };
        let Some(clipboard) = self.store.clipboard().cloned() else {
            self.set_mode(Mode::select());
            return;
        };
        let resolver = CoordinateResolver::new(&self.pick);
        let target_space = space.unwrap_or(clipboard.space);
        match place_clipboard(&resolver, &clipboard, target_space, event, &self.settings) {
            Ok(annotation) => {
                if let Err(err) = self.commit(file, annotation, CommandKind::PasteAnnotation) {
                    tracing::debug!(%err, "paste not applied");
                }
                self.set_mode(Mode::select());
            }
            // keep waiting for a click that resolves
            Err(err @ AnnotateError::Resolution { .. }) => self.absorb("paste", &err),
            Err(err) => {
                self.absorb("paste", &err);
                self.set_mode(Mode::select());
            }
        }
    }
}

/// Raw coordinate index to logical vertex index.
fn logical_vertex(shape: &Shape, coordinate_index: usize) -> usize {
    match shape {
        Shape::Paired { .. } => coordinate_index / 2,
        _ => coordinate_index,
    }
}

/// Pointer step over `annotation`, resolved the way its space needs.
fn modification_for(
    resolver: &CoordinateResolver<'_>,
    annotation: &Annotation,
    event: &PointerEvent,
    handle: SizingHandle,
    coordinate_index: Option<usize>,
) -> Result<SpatialModification, AnnotateError> {
    let mut modification = SpatialModification {
        handle,
        coordinate_index,
        viewport: resolver.viewport_of(annotation.space, &annotation.anchor),
        previous_px: event.previous(),
        current_px: event.position(),
        ..SpatialModification::default()
    };
    match annotation.space {
        CoordinateSpace::Surface => {
            let current = resolver.resolve_event(event, CoordinateSpace::Surface)?;
            modification.current_in_space = Some(current.coordinate.xyz);
            modification.surface_vertex = current.coordinate.surface;
        }
        space if !space.is_screen_anchored() => {
            let previous = resolver.resolve_previous(event, space)?;
            let current = resolver.resolve_event(event, space)?;
            modification.previous_in_space = Some(previous.coordinate.xyz);
            modification.current_in_space = Some(current.coordinate.xyz);
        }
        _ => {}
    }
    Ok(modification)
}

/// Clipboard copy anchored at the clicked position in `space`.
///
/// Within its own space the copy keeps its geometry and moves by the offset
/// of its first coordinate. Changing space is limited to single-anchor
/// shapes, which get a default size unless both spaces measure in percent
/// of the viewport.
fn place_clipboard(
    resolver: &CoordinateResolver<'_>,
    clipboard: &Annotation,
    space: CoordinateSpace,
    event: &PointerEvent,
    settings: &AnnotateSettings,
) -> Result<Annotation, AnnotateError> {
    let resolved = resolver.resolve_event(event, space)?;
    let mut annotation = clipboard.clone();
    annotation.anchor = resolved.anchor.clone();

    if space == clipboard.space && space != CoordinateSpace::Surface {
        let first = clipboard
            .shape
            .coordinate(0)
            .map(|coordinate| coordinate.xyz)
            .ok_or_else(|| AnnotateError::invalid_construction("clipboard has no coordinates"))?;
        let delta = sub(resolved.coordinate.xyz, first);
        annotation
            .shape
            .for_each_coordinate_mut(|_, coordinate| coordinate.xyz = add(coordinate.xyz, delta));
    } else {
        let resize = space != clipboard.space
            && !(space.is_percent_of_viewport() && clipboard.space.is_percent_of_viewport());
        annotation.space = space;
        match &mut annotation.shape {
            Shape::Point { coordinate } => *coordinate = resolved.coordinate.clone(),
            Shape::Sized {
                center,
                width,
                height,
                ..
            } => {
                *center = resolved.coordinate.clone();
                if resize {
                    let frame = WorkingFrame::for_sizing(space, resolved.viewport).ok_or_else(|| {
                        AnnotateError::resolution(format!("no {} frame to size the paste", space.label()))
                    })?;
                    let content = resolved
                        .content_bounds
                        .or_else(|| resolver.content_bounds_of(space, &resolved.anchor));
                    let (default_width, default_height) =
                        frame.default_extent(settings.default_box_size_percent, content)?;
                    *width = default_width;
                    *height = default_height;
                }
            }
            _ => {
                return Err(AnnotateError::illegal(
                    "paste",
                    format!(
                        "{} annotations cannot be placed in {} space",
                        clipboard.annotation_type.label(),
                        space.label()
                    ),
                ));
            }
        }
    }

    if let Some(frame) = WorkingFrame::for_space(annotation.space, resolved.viewport) {
        if annotation
            .shape
            .coordinates()
            .into_iter()
            .any(|coordinate| !frame.in_bounds(coordinate.xyz))
        {
            return Err(AnnotateError::illegal(
                "paste",
                "pasted annotation would leave the viewport",
            ));
        }
    }
    annotation.validate()?;
    Ok(annotation)
}
