use std::path::Path;
use std::sync::mpsc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotate::command::AttributeEdit;
use crate::annotate::controller::{AnnotationInputModeController, ModeRequest};
use crate::annotate::input::{KeyCode, KeyEvent, KeyModifiers, PointerEvent, PointerModifiers};
use crate::annotate::messages::AnnotateSignal;
use crate::annotate::model::{Coordinate, CoordinateSpace, FileId, SpaceAnchor, WindowId};
use crate::annotate::settings::AnnotateSettings;
use crate::annotate::space::{ContentBounds, PickResolver, PickResult, Plane, ResolvedCoordinate, Viewport};
use crate::annotate::state::{ModeKind, PolyTypeDrawEditOperation};
use crate::annotate::store::{MemoryAnnotationStore, StoredAnnotation};

/// A recorded input session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub layout: ReplayLayout,
    /// Annotation files opened before the first step. They get ids 1, 2, ...
    /// in this order.
    #[serde(default = "default_files")]
    pub files: Vec<String>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

fn default_files() -> Vec<String> {
    vec!["annotations".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLayout {
    #[serde(default = "default_window_width")]
    pub window_width: f32,
    #[serde(default = "default_window_height")]
    pub window_height: f32,
    #[serde(default)]
    pub tabs: Vec<TabViewport>,
    #[serde(default)]
    pub stereotaxic: Option<SliceMapping>,
    /// Bounds reported for media, histology and chart content.
    #[serde(default)]
    pub content_bounds: Option<ContentBounds>,
}

fn default_window_width() -> f32 {
    800.0
}

fn default_window_height() -> f32 {
    600.0
}

impl Default for ReplayLayout {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            tabs: Vec::new(),
            stereotaxic: None,
            content_bounds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabViewport {
    pub tab: u32,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceAxis {
    #[default]
    Axial,
    Coronal,
    Parasagittal,
}

/// Orthogonal volume slice shown in every tab viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceMapping {
    #[serde(default)]
    pub axis: SliceAxis,
    /// Position of the slice along its normal.
    #[serde(default)]
    pub depth_mm: f32,
    /// In-plane millimetres at the viewport's bottom-left corner.
    #[serde(default)]
    pub origin_mm: [f32; 2],
    #[serde(default = "default_mm_per_pixel")]
    pub mm_per_pixel: f32,
}

fn default_mm_per_pixel() -> f32 {
    1.0
}

impl SliceMapping {
    fn to_mm(&self, local: (f32, f32)) -> [f32; 3] {
        let u = self.origin_mm[0] + local.0 * self.mm_per_pixel;
        let v = self.origin_mm[1] + local.1 * self.mm_per_pixel;
        match self.axis {
            SliceAxis::Axial => [u, v, self.depth_mm],
            SliceAxis::Coronal => [u, self.depth_mm, v],
            SliceAxis::Parasagittal => [self.depth_mm, u, v],
        }
    }

    fn plane(&self) -> Option<Plane> {
        let (origin, normal) = match self.axis {
            SliceAxis::Axial => ([0.0, 0.0, self.depth_mm], [0.0, 0.0, 1.0]),
            SliceAxis::Coronal => ([0.0, self.depth_mm, 0.0], [0.0, 1.0, 0.0]),
            SliceAxis::Parasagittal => ([self.depth_mm, 0.0, 0.0], [1.0, 0.0, 0.0]),
        };
        Plane::new(origin, normal)
    }
}

/// Resolution the renderer produced for one position, replayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCoordinate {
    pub space: CoordinateSpace,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub anchor: SpaceAnchor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    Press {
        x: f32,
        y: f32,
        #[serde(default)]
        modifiers: PointerModifiers,
        #[serde(default)]
        pick: Option<PickResult>,
        #[serde(default)]
        resolved: Vec<RecordedCoordinate>,
    },
    Drag {
        x: f32,
        y: f32,
        #[serde(default)]
        pick: Option<PickResult>,
        #[serde(default)]
        resolved: Vec<RecordedCoordinate>,
    },
    Release {
        x: f32,
        y: f32,
    },
    Click {
        x: f32,
        y: f32,
        #[serde(default)]
        pick: Option<PickResult>,
        #[serde(default)]
        resolved: Vec<RecordedCoordinate>,
    },
    DoubleClick {
        x: f32,
        y: f32,
    },
    Key {
        key: KeyCode,
        #[serde(default)]
        modifiers: KeyModifiers,
    },
    Mode {
        request: ModeRequest,
    },
    Operation {
        operation: PolyTypeDrawEditOperation,
    },
    Attribute {
        edit: AttributeEdit,
    },
    RemoveFile {
        file: FileId,
    },
}

/// Renderer stand-in driven by the script layout and recorded values.
#[derive(Debug, Clone)]
pub struct ScriptedPickResolver {
    layout: ReplayLayout,
    under_pointer: PickResult,
    recorded: Vec<((f32, f32), RecordedCoordinate)>,
}

impl ScriptedPickResolver {
    pub fn new(layout: ReplayLayout) -> Self {
        Self {
            layout,
            under_pointer: PickResult::nothing(),
            recorded: Vec::new(),
        }
    }

    /// Hit test answer for the following events.
    pub fn set_pick(&mut self, pick: Option<PickResult>) {
        self.under_pointer = pick.unwrap_or_default();
    }

    pub fn record(&mut self, x: f32, y: f32, recorded: RecordedCoordinate) {
        self.recorded.push(((x, y), recorded));
    }

    fn window_viewport(&self) -> Viewport {
        Viewport::new(0.0, 0.0, self.layout.window_width, self.layout.window_height)
    }

    /// Tab viewport under the pointer; without tabs the whole window is one.
    fn tab_at(&self, x: f32, y: f32) -> Option<(Option<u32>, Viewport)> {
        if self.layout.tabs.is_empty() {
            let window = self.window_viewport();
            return window.contains(x, y).then_some((None, window));
        }
        self.layout
            .tabs
            .iter()
            .find(|tab| tab.viewport.contains(x, y))
            .map(|tab| (Some(tab.tab), tab.viewport))
    }

    fn tab_viewport(&self, tab: Option<u32>) -> Option<Viewport> {
        match tab {
            Some(tab) => self
                .layout
                .tabs
                .iter()
                .find(|candidate| candidate.tab == tab)
                .map(|candidate| candidate.viewport),
            None => self
                .layout
                .tabs
                .first()
                .map(|tab| tab.viewport)
                .or_else(|| Some(self.window_viewport())),
        }
    }
}

impl PickResolver for ScriptedPickResolver {
    fn resolve_at_screen_position(&self, _x: f32, _y: f32) -> PickResult {
        self.under_pointer
    }

    fn resolve_coordinate_in_space(
        &self,
        x: f32,
        y: f32,
        space: CoordinateSpace,
    ) -> Option<ResolvedCoordinate> {
        let tab = self.tab_at(x, y);
        if let Some((_, recorded)) = self
            .recorded
            .iter()
            .rev()
            .find(|(position, recorded)| *position == (x, y) && recorded.space == space)
        {
            let mut resolved = ResolvedCoordinate::new(recorded.coordinate.clone());
            resolved.anchor = recorded.anchor.clone();
            resolved.viewport = tab.map(|(_, viewport)| viewport);
            resolved.content_bounds = self.layout.content_bounds;
            return Some(resolved);
        }

        let (tab, viewport) = match space {
            CoordinateSpace::Window => {
                let window = self.window_viewport();
                window.contains(x, y).then_some((None, window))?
            }
            CoordinateSpace::Tab | CoordinateSpace::Viewport | CoordinateSpace::Stereotaxic => tab?,
            _ => return None,
        };
        let coordinate = match space {
            CoordinateSpace::Window | CoordinateSpace::Tab => {
                let (px, py) = viewport.to_percent(x, y);
                Coordinate::new(px, py, 0.0)
            }
            CoordinateSpace::Viewport => {
                let (lx, ly) = viewport.to_local(x, y);
                Coordinate::new(lx, ly, 0.0)
            }
            _ => {
                let mapping = self.layout.stereotaxic?;
                let mm = mapping.to_mm(viewport.to_local(x, y));
                Coordinate::new(mm[0], mm[1], mm[2])
            }
        };
        let mut resolved = ResolvedCoordinate::new(coordinate);
        resolved.anchor.tab = tab;
        resolved.viewport = Some(viewport);
        if space == CoordinateSpace::Stereotaxic {
            resolved.slice_plane = self.layout.stereotaxic.and_then(|mapping| mapping.plane());
        }
        Some(resolved)
    }

    fn viewport_of(&self, space: CoordinateSpace, anchor: &SpaceAnchor) -> Option<Viewport> {
        match space {
            CoordinateSpace::Window => Some(self.window_viewport()),
            CoordinateSpace::Spacer => None,
            _ => self.tab_viewport(anchor.tab),
        }
    }

    fn content_bounds_of(&self, space: CoordinateSpace, _anchor: &SpaceAnchor) -> Option<ContentBounds> {
        space
            .is_content_relative()
            .then_some(self.layout.content_bounds)
            .flatten()
    }
}

/// What a replayed session left behind.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub annotations: Vec<StoredAnnotation>,
    pub signals: Vec<AnnotateSignal>,
    pub final_mode: ModeKind,
    /// Requests the controller refused, as `step N: reason`.
    pub refused: Vec<String>,
}

pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay script {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse replay script {}", path.display()))
}

/// Runs every step of `script` against a fresh in-memory store.
pub fn run_script(script: &ReplayScript, settings: AnnotateSettings) -> Result<ReplayOutcome> {
    if script.files.is_empty() {
        bail!("replay script opens no annotation files");
    }
    let mut store = MemoryAnnotationStore::new();
    for name in &script.files {
        store.add_file(name.clone());
    }
    let (tx, rx) = mpsc::channel();
    let mut controller = AnnotationInputModeController::new(
        WindowId(0),
        ScriptedPickResolver::new(script.layout.clone()),
        store,
        settings,
        tx,
    );

    let mut gesture: Option<PointerEvent> = None;
    let mut refused = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        tracing::trace!(index, ?step, "replay step");
        match step {
            ReplayStep::Press {
                x,
                y,
                modifiers,
                pick,
                resolved,
            } => {
                prime(controller.pick_mut(), *x, *y, pick, resolved);
                let event = PointerEvent::at(*x, *y).with_modifiers(*modifiers);
                controller.on_pointer_press(&event);
                gesture = Some(event);
            }
            ReplayStep::Drag {
                x,
                y,
                pick,
                resolved,
            } => {
                let press = gesture.with_context(|| format!("step {index}: drag without a press"))?;
                if pick.is_some() {
                    controller.pick_mut().set_pick(*pick);
                }
                for recorded in resolved {
                    controller.pick_mut().record(*x, *y, recorded.clone());
                }
                let event = press.moved_to(*x, *y);
                controller.on_pointer_drag(&event);
                gesture = Some(event);
            }
            ReplayStep::Release { x, y } => {
                let press = gesture
                    .take()
                    .with_context(|| format!("step {index}: release without a press"))?;
                controller.on_pointer_release(&press.moved_to(*x, *y));
            }
            ReplayStep::Click {
                x,
                y,
                pick,
                resolved,
            } => {
                prime(controller.pick_mut(), *x, *y, pick, resolved);
                controller.on_pointer_click(&PointerEvent::at(*x, *y));
            }
            ReplayStep::DoubleClick { x, y } => {
                controller.on_double_click(&PointerEvent::at(*x, *y));
            }
            ReplayStep::Key { key, modifiers } => {
                controller.on_key_press(KeyEvent {
                    key: *key,
                    modifiers: *modifiers,
                });
            }
            ReplayStep::Mode { request } => {
                if let Err(err) = controller.on_mode_change_request(*request) {
                    refused.push(format!("step {index}: {err}"));
                }
            }
            ReplayStep::Operation { operation } => {
                if let Err(err) = controller.on_poly_type_operation(*operation) {
                    refused.push(format!("step {index}: {err}"));
                }
            }
            ReplayStep::Attribute { edit } => {
                if let Err(err) = controller.on_attribute_edit(*edit) {
                    refused.push(format!("step {index}: {err}"));
                }
            }
            ReplayStep::RemoveFile { file } => {
                let removed = controller.store_mut().remove_file(*file);
                tracing::debug!(file = file.0, annotations = removed.len(), "replay removed file");
                controller.on_file_removed(*file);
            }
        }
    }

    let final_mode = controller.mode_kind();
    let annotations = controller.store().snapshot();
    drop(controller);
    let signals: Vec<AnnotateSignal> = rx.try_iter().collect();
    tracing::info!(
        steps = script.steps.len(),
        annotations = annotations.len(),
        refused = refused.len(),
        "replay finished"
    );
    Ok(ReplayOutcome {
        annotations,
        signals,
        final_mode,
        refused,
    })
}

fn prime(
    pick: &mut ScriptedPickResolver,
    x: f32,
    y: f32,
    under_pointer: &Option<PickResult>,
    resolved: &[RecordedCoordinate],
) {
    pick.set_pick(*under_pointer);
    for recorded in resolved {
        pick.record(x, y, recorded.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ReplayLayout {
        ReplayLayout {
            tabs: vec![TabViewport {
                tab: 1,
                viewport: Viewport::new(100.0, 100.0, 200.0, 100.0),
            }],
            stereotaxic: Some(SliceMapping {
                axis: SliceAxis::Coronal,
                depth_mm: -12.0,
                origin_mm: [-50.0, -25.0],
                mm_per_pixel: 0.5,
            }),
            ..ReplayLayout::default()
        }
    }

    #[test]
    fn tab_coordinates_are_percent_of_the_tab_viewport() {
        let pick = ScriptedPickResolver::new(layout());
        let resolved = pick
            .resolve_coordinate_in_space(150.0, 125.0, CoordinateSpace::Tab)
            .expect("tab");
        assert_eq!(resolved.coordinate.xyz, [25.0, 25.0, 0.0]);
        assert_eq!(resolved.anchor.tab, Some(1));
        assert!(pick
            .resolve_coordinate_in_space(10.0, 10.0, CoordinateSpace::Tab)
            .is_none());
    }

    #[test]
    fn stereotaxic_positions_map_onto_the_slice() {
        let pick = ScriptedPickResolver::new(layout());
        let resolved = pick
            .resolve_coordinate_in_space(120.0, 140.0, CoordinateSpace::Stereotaxic)
            .expect("stereotaxic");
        assert_eq!(resolved.coordinate.xyz, [-40.0, -12.0, -5.0]);
        let plane = resolved.slice_plane.expect("plane");
        assert_eq!(plane.normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn recorded_values_win_over_the_layout() {
        let mut pick = ScriptedPickResolver::new(layout());
        pick.record(
            150.0,
            150.0,
            RecordedCoordinate {
                space: CoordinateSpace::Histology,
                coordinate: Coordinate::new(3.0, 4.0, 0.0),
                anchor: SpaceAnchor::default(),
            },
        );
        let resolved = pick
            .resolve_coordinate_in_space(150.0, 150.0, CoordinateSpace::Histology)
            .expect("recorded");
        assert_eq!(resolved.coordinate.xyz, [3.0, 4.0, 0.0]);
        assert!(pick
            .resolve_coordinate_in_space(151.0, 150.0, CoordinateSpace::Histology)
            .is_none());
    }

    #[test]
    fn steps_parse_from_tagged_json() {
        let script: ReplayScript = serde_json::from_str(
            r#"{
                "steps": [
                    {"step": "mode", "request": {"mode": "new_shape", "annotation_type": "line", "space": "window", "file": 1}},
                    {"step": "press", "x": 10, "y": 10},
                    {"step": "drag", "x": 50, "y": 80},
                    {"step": "release", "x": 50, "y": 80},
                    {"step": "key", "key": "z", "modifiers": {"ctrl": true}}
                ]
            }"#,
        )
        .expect("parse");
        assert_eq!(script.files, vec!["annotations".to_string()]);
        assert_eq!(script.steps.len(), 5);
        assert!(matches!(script.steps[1], ReplayStep::Press { .. }));
    }
}
