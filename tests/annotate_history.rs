use std::sync::mpsc;

use annotation_authoring::annotate::builder::ShapeRequest;
use annotation_authoring::annotate::input::PointerEvent;
use annotation_authoring::annotate::model::{AnnotationType, CoordinateSpace, FileId, WindowId};
use annotation_authoring::annotate::settings::AnnotateSettings;
use annotation_authoring::annotate::{AnnotationInputModeController, MemoryAnnotationStore, ModeRequest};

#[path = "mock_pick.rs"]
mod mock_pick;
use mock_pick::MockPick;

type Controller = AnnotationInputModeController<MockPick, MemoryAnnotationStore>;

fn setup(undo_capacity: usize) -> (Controller, FileId) {
    let mut store = MemoryAnnotationStore::new();
    let file = store.add_file("history");
    let (tx, _rx) = mpsc::channel();
    let settings = AnnotateSettings {
        undo_capacity,
        ..AnnotateSettings::default()
    };
    (
        AnnotationInputModeController::new(WindowId(3), MockPick::default(), store, settings, tx),
        file,
    )
}

fn draw_line(controller: &mut Controller, file: FileId, y: f32) {
    controller
        .on_mode_change_request(ModeRequest::NewShape(ShapeRequest {
            annotation_type: AnnotationType::Line,
            space: CoordinateSpace::Tab,
            file,
        }))
        .expect("line mode");
    let press = PointerEvent::at(10.0, y);
    controller.on_pointer_press(&press);
    let release = press.moved_to(60.0, y);
    controller.on_pointer_drag(&release);
    controller.on_pointer_release(&release);
}

#[test]
fn new_edit_after_undo_discards_redo() {
    let (mut controller, file) = setup(0);
    for y in [10.0, 20.0, 30.0] {
        draw_line(&mut controller, file, y);
    }
    assert_eq!(controller.store().len(), 3);

    controller.undo().expect("undo");
    controller.undo().expect("undo");
    assert_eq!(controller.store().len(), 1);
    assert!(controller.history().can_redo());

    draw_line(&mut controller, file, 40.0);
    assert!(!controller.history().can_redo());
    assert!(controller.redo().is_err());
    assert_eq!(controller.history().len(), 2);
    assert_eq!(controller.store().len(), 2);
}

#[test]
fn capacity_evicts_oldest_entries() {
    let (mut controller, file) = setup(2);
    for y in [10.0, 20.0, 30.0] {
        draw_line(&mut controller, file, y);
    }
    assert_eq!(controller.history().len(), 2);

    controller.undo().expect("undo");
    controller.undo().expect("undo");
    assert!(controller.undo().is_err());
    // the first line is no longer undoable
    assert_eq!(controller.store().len(), 1);
}

#[test]
fn undo_then_redo_restores_identical_annotations() {
    let (mut controller, file) = setup(0);
    draw_line(&mut controller, file, 10.0);
    draw_line(&mut controller, file, 50.0);
    let before = controller.store().snapshot();

    controller.undo().expect("undo");
    controller.undo().expect("undo");
    assert!(controller.store().is_empty());
    controller.redo().expect("redo");
    controller.redo().expect("redo");
    assert_eq!(controller.store().snapshot(), before);
}

#[test]
fn interleaved_edits_undos_and_redos_follow_the_timeline() {
    let (mut controller, file) = setup(0);
    // states reachable by undo/redo, and the one currently shown
    let mut timeline = vec![controller.store().snapshot()];
    let mut cursor = 0;
    let mut seed: u32 = 0x2545_f491;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };

    for round in 0..80 {
        match next() % 3 {
            0 => {
                let y = 5.0 + (next() % 90) as f32;
                draw_line(&mut controller, file, y);
                timeline.truncate(cursor + 1);
                timeline.push(controller.store().snapshot());
                cursor += 1;
            }
            1 => {
                let result = controller.undo();
                assert_eq!(result.is_ok(), cursor > 0, "undo in round {round}");
                cursor = cursor.saturating_sub(1);
            }
            _ => {
                let result = controller.redo();
                assert_eq!(result.is_ok(), cursor + 1 < timeline.len(), "redo in round {round}");
                if result.is_ok() {
                    cursor += 1;
                }
            }
        }
        assert_eq!(controller.store().snapshot(), timeline[cursor], "round {round}");
    }
}
