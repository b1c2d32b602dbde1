use std::collections::HashMap;

use hashlink::LinkedHashMap;
use serde::Serialize;

use crate::annotate::error::AnnotateError;
use crate::annotate::model::{Annotation, AnnotationId, FileId, WindowId};

/// What a selection in a window is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditingMode {
    #[default]
    Annotations,
    /// Polyhedron samples edited in stereotaxic space.
    Samples,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovedAnnotation {
    pub file: FileId,
    /// Index the annotation held inside its file.
    pub position: usize,
    pub annotation: Annotation,
}

/// Permanent home of finished annotations, plus selection and clipboard.
pub trait AnnotationStore {
    fn allocate_id(&mut self) -> AnnotationId;

    fn contains_file(&self, file: FileId) -> bool;

    fn annotation(&self, id: AnnotationId) -> Option<&Annotation>;

    fn file_of(&self, id: AnnotationId) -> Option<FileId>;

    /// Index of the annotation inside its file.
    fn position_in_file(&self, id: AnnotationId) -> Option<usize>;

    /// Inserts at `position` inside the file, or at the end.
    fn insert_annotation(
        &mut self,
        file: FileId,
        id: AnnotationId,
        annotation: Annotation,
        position: Option<usize>,
    ) -> Result<(), AnnotateError>;

    fn replace_annotation(
        &mut self,
        id: AnnotationId,
        annotation: Annotation,
    ) -> Result<(), AnnotateError>;

    fn remove_annotation(&mut self, id: AnnotationId) -> Result<RemovedAnnotation, AnnotateError>;

    fn selected_annotations(&self, window: WindowId) -> Vec<AnnotationId>;

    /// `None` with `additive == false` clears the selection. An additive
    /// request toggles `annotation` in the current selection.
    fn select_for_editing(
        &mut self,
        window: WindowId,
        mode: EditingMode,
        additive: bool,
        annotation: Option<AnnotationId>,
    );

    fn clipboard(&self) -> Option<&Annotation>;

    fn set_clipboard(&mut self, annotation: Annotation);

    fn add_annotation(
        &mut self,
        file: FileId,
        annotation: Annotation,
    ) -> Result<AnnotationId, AnnotateError> {
        let id = self.allocate_id();
        self.insert_annotation(file, id, annotation, None)?;
        Ok(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationFile {
    pub name: String,
    annotations: Vec<(AnnotationId, Annotation)>,
}

impl AnnotationFile {
    pub fn annotations(&self) -> impl Iterator<Item = (AnnotationId, &Annotation)> {
        self.annotations.iter().map(|(id, annotation)| (*id, annotation))
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    fn position_of(&self, id: AnnotationId) -> Option<usize> {
        self.annotations.iter().position(|(existing, _)| *existing == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAnnotation {
    pub file: FileId,
    pub id: AnnotationId,
    pub annotation: Annotation,
}

#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    files: LinkedHashMap<FileId, AnnotationFile>,
    index: HashMap<AnnotationId, FileId>,
    selection: HashMap<WindowId, Vec<AnnotationId>>,
    editing_mode: HashMap<WindowId, EditingMode>,
    clipboard: Option<Annotation>,
    next_annotation: u64,
    next_file: u64,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>) -> FileId {
        self.next_file += 1;
        let id = FileId(self.next_file);
        self.files.insert(
            id,
            AnnotationFile {
                name: name.into(),
                annotations: Vec::new(),
            },
        );
        id
    }

    /// Drops a file and everything in it. Returns the ids that went with it.
    pub fn remove_file(&mut self, file: FileId) -> Vec<AnnotationId> {
        let Some(removed) = self.files.remove(&file) else {
            return Vec::new();
        };
        let ids: Vec<AnnotationId> = removed.annotations.iter().map(|(id, _)| *id).collect();
        for id in &ids {
            self.index.remove(id);
        }
        for selected in self.selection.values_mut() {
            selected.retain(|id| !ids.contains(id));
        }
        tracing::debug!(?file, removed = ids.len(), "annotation file removed");
        ids
    }

    pub fn file(&self, file: FileId) -> Option<&AnnotationFile> {
        self.files.get(&file)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn editing_mode(&self, window: WindowId) -> EditingMode {
        self.editing_mode.get(&window).copied().unwrap_or_default()
    }

    /// Every annotation in file order.
    pub fn snapshot(&self) -> Vec<StoredAnnotation> {
        self.files
            .iter()
            .flat_map(|(file, contents)| {
                contents.annotations().map(move |(id, annotation)| StoredAnnotation {
                    file: *file,
                    id,
                    annotation: annotation.clone(),
                })
            })
            .collect()
    }

    fn file_mut_for(&mut self, id: AnnotationId) -> Result<&mut AnnotationFile, AnnotateError> {
        let file = self
            .index
            .get(&id)
            .copied()
            .ok_or_else(|| AnnotateError::stale(id))?;
        self.files.get_mut(&file).ok_or_else(|| AnnotateError::stale(id))
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn allocate_id(&mut self) -> AnnotationId {
        self.next_annotation += 1;
        AnnotationId(self.next_annotation)
    }

    fn contains_file(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        let file = self.files.get(self.index.get(&id)?)?;
        file.annotations
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, annotation)| annotation)
    }

    fn file_of(&self, id: AnnotationId) -> Option<FileId> {
        self.index.get(&id).copied()
    }

    fn position_in_file(&self, id: AnnotationId) -> Option<usize> {
        self.files.get(self.index.get(&id)?)?.position_of(id)
    }

    fn insert_annotation(
        &mut self,
        file: FileId,
        id: AnnotationId,
        annotation: Annotation,
        position: Option<usize>,
    ) -> Result<(), AnnotateError> {
        if self.index.contains_key(&id) {
            return Err(AnnotateError::illegal(
                "insert annotation",
                format!("annotation {id} already exists"),
            ));
        }
        let contents = self.files.get_mut(&file).ok_or_else(|| AnnotateError::stale(id))?;
        let position = position
            .unwrap_or(contents.annotations.len())
            .min(contents.annotations.len());
        contents.annotations.insert(position, (id, annotation));
        self.index.insert(id, file);
        Ok(())
    }

    fn replace_annotation(
        &mut self,
        id: AnnotationId,
        annotation: Annotation,
    ) -> Result<(), AnnotateError> {
        let contents = self.file_mut_for(id)?;
        let slot = contents
            .annotations
            .iter_mut()
            .find(|(existing, _)| *existing == id)
            .ok_or_else(|| AnnotateError::stale(id))?;
        slot.1 = annotation;
        Ok(())
    }

    fn remove_annotation(&mut self, id: AnnotationId) -> Result<RemovedAnnotation, AnnotateError> {
        let file = self.file_of(id).ok_or_else(|| AnnotateError::stale(id))?;
        let contents = self.file_mut_for(id)?;
        let position = contents.position_of(id).ok_or_else(|| AnnotateError::stale(id))?;
        let (_, annotation) = contents.annotations.remove(position);
        self.index.remove(&id);
        for selected in self.selection.values_mut() {
            selected.retain(|existing| *existing != id);
        }
        Ok(RemovedAnnotation {
            file,
            position,
            annotation,
        })
    }

    fn selected_annotations(&self, window: WindowId) -> Vec<AnnotationId> {
        self.selection.get(&window).cloned().unwrap_or_default()
    }

    fn select_for_editing(
        &mut self,
        window: WindowId,
        mode: EditingMode,
        additive: bool,
        annotation: Option<AnnotationId>,
    ) {
        self.editing_mode.insert(window, mode);
        let selected = self.selection.entry(window).or_default();
        match (annotation, additive) {
            (None, false) => selected.clear(),
            (None, true) => {}
            (Some(id), _) if !self.index.contains_key(&id) => {}
            (Some(id), true) => {
                if let Some(position) = selected.iter().position(|existing| *existing == id) {
                    selected.remove(position);
                } else {
                    selected.push(id);
                }
            }
            (Some(id), false) => {
                selected.clear();
                selected.push(id);
            }
        }
    }

    fn clipboard(&self) -> Option<&Annotation> {
        self.clipboard.as_ref()
    }

    fn set_clipboard(&mut self, annotation: Annotation) {
        self.clipboard = Some(annotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::model::{AnnotationType, Coordinate, CoordinateSpace, SpaceAnchor};

    fn marker(x: f32) -> Annotation {
        Annotation::new(
            AnnotationType::Marker,
            CoordinateSpace::Tab,
            SpaceAnchor::default(),
            Coordinate::new(x, 50.0, 0.0),
        )
    }

    #[test]
    fn remove_then_insert_restores_position() {
        let mut store = MemoryAnnotationStore::new();
        let file = store.add_file("scene");
        let first = store.add_annotation(file, marker(1.0)).expect("add");
        let second = store.add_annotation(file, marker(2.0)).expect("add");
        let third = store.add_annotation(file, marker(3.0)).expect("add");

        let removed = store.remove_annotation(second).expect("remove");
        assert_eq!(removed.position, 1);
        assert!(store.annotation(second).is_none());

        store
            .insert_annotation(removed.file, second, removed.annotation, Some(removed.position))
            .expect("insert");
        let order: Vec<_> = store.snapshot().into_iter().map(|entry| entry.id).collect();
        assert_eq!(order, vec![first, second, third]);
    }

    #[test]
    fn removing_file_prunes_index_and_selection() {
        let mut store = MemoryAnnotationStore::new();
        let file = store.add_file("scene");
        let id = store.add_annotation(file, marker(1.0)).expect("add");
        let window = WindowId(0);
        store.select_for_editing(window, EditingMode::Annotations, false, Some(id));
        assert_eq!(store.selected_annotations(window), vec![id]);

        assert_eq!(store.remove_file(file), vec![id]);
        assert!(store.selected_annotations(window).is_empty());
        assert!(!store.contains_file(file));
        assert!(matches!(
            store.replace_annotation(id, marker(2.0)),
            Err(AnnotateError::StaleReference { .. })
        ));
    }

    #[test]
    fn additive_selection_toggles() {
        let mut store = MemoryAnnotationStore::new();
        let file = store.add_file("scene");
        let a = store.add_annotation(file, marker(1.0)).expect("add");
        let b = store.add_annotation(file, marker(2.0)).expect("add");
        let window = WindowId(1);

        store.select_for_editing(window, EditingMode::Annotations, false, Some(a));
        store.select_for_editing(window, EditingMode::Annotations, true, Some(b));
        assert_eq!(store.selected_annotations(window), vec![a, b]);

        store.select_for_editing(window, EditingMode::Annotations, true, Some(a));
        assert_eq!(store.selected_annotations(window), vec![b]);

        store.select_for_editing(window, EditingMode::Samples, false, None);
        assert!(store.selected_annotations(window).is_empty());
        assert_eq!(store.editing_mode(window), EditingMode::Samples);
    }

    #[test]
    fn insert_into_missing_file_is_stale() {
        let mut store = MemoryAnnotationStore::new();
        let id = store.allocate_id();
        assert!(matches!(
            store.insert_annotation(FileId(42), id, marker(1.0), None),
            Err(AnnotateError::StaleReference { .. })
        ));
    }
}
