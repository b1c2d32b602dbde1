use std::sync::mpsc;

use criterion::{criterion_group, criterion_main, Criterion};
use annotation_authoring::annotate::command::{AnnotationCommand, CommandKind};
use annotation_authoring::annotate::history::UndoableCommandStack;
use annotation_authoring::annotate::input::PointerEvent;
use annotation_authoring::annotate::model::{
    Annotation, AnnotationType, Coordinate, CoordinateSpace, SizingHandle, SpaceAnchor, WindowId,
};
use annotation_authoring::annotate::replay::{ReplayLayout, ScriptedPickResolver};
use annotation_authoring::annotate::settings::AnnotateSettings;
use annotation_authoring::annotate::space::PickResult;
use annotation_authoring::annotate::store::{AnnotationStore, EditingMode};
use annotation_authoring::annotate::{AnnotationInputModeController, MemoryAnnotationStore};

fn marker(x: f32) -> Annotation {
    Annotation::new(
        AnnotationType::Marker,
        CoordinateSpace::Window,
        SpaceAnchor::default(),
        Coordinate::new(x, 50.0, 0.0),
    )
}

fn bench_drag_gesture(c: &mut Criterion) {
    c.bench_function("drag_500_steps_merged", |b| {
        b.iter(|| {
            let mut store = MemoryAnnotationStore::new();
            let file = store.add_file("bench");
            let id = store.add_annotation(file, marker(10.0)).unwrap();
            store.select_for_editing(WindowId(0), EditingMode::Annotations, false, Some(id));
            let mut pick = ScriptedPickResolver::new(ReplayLayout::default());
            pick.set_pick(Some(PickResult::annotation(id, SizingHandle::None)));
            let (tx, _rx) = mpsc::channel();
            let mut controller = AnnotationInputModeController::new(
                WindowId(0),
                pick,
                store,
                AnnotateSettings::default(),
                tx,
            );

            let mut event = PointerEvent::at(80.0, 300.0);
            controller.on_pointer_press(&event);
            for step in 0..500 {
                event = event.moved_to(80.0 + step as f32, 300.0);
                controller.on_pointer_drag(&event);
            }
            controller.on_pointer_release(&event);
            assert_eq!(controller.history().len(), 1);
        })
    });
}

fn bench_history_eviction(c: &mut Criterion) {
    c.bench_function("push_10k_capacity_200", |b| {
        b.iter(|| {
            let mut store = MemoryAnnotationStore::new();
            let file = store.add_file("bench");
            let id = store.add_annotation(file, marker(0.0)).unwrap();
            let mut history = UndoableCommandStack::new(200);
            for i in 0..10_000 {
                let before = marker((i % 90) as f32);
                let after = marker((i % 90 + 1) as f32);
                history.push(AnnotationCommand::modify(
                    CommandKind::LocationAndSize,
                    [(id, file, before, after)],
                ));
            }
            assert_eq!(history.len(), 200);
        })
    });
}

criterion_group!(benches, bench_drag_gesture, bench_history_eviction);
criterion_main!(benches);
