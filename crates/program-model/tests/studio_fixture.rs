use std::path::PathBuf;

use director_program_model::{InMemoryProgramStore, ProgramStore, TextKind};

fn fixture() -> InMemoryProgramStore {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/studio/program.json");
    InMemoryProgramStore::load(&path).unwrap()
}

#[test]
fn test_studio_program_resolves_every_layout() {
    let store = fixture();
    for layout_id in ["single", "two-up"] {
        let composition = store.resolve("item-7", layout_id).unwrap();
        assert_eq!(composition.plan.id, "evening");
        assert!(composition.layout.validate().is_ok());
    }
}

#[test]
fn test_plan_labels_fill_layout_gaps() {
    let store = fixture();
    let composition = store.resolve("item-7", "single").unwrap();
    let labels = composition.layout.effective_labels(&composition.plan);
    assert_eq!(labels.subject.as_deref(), Some("Agenda item"));
    assert_eq!(labels.host.as_deref(), Some("Chair"));
    assert_eq!(labels.guest, None);
    assert_eq!(
        composition.layout.effective_text_color(&composition.plan).as_deref(),
        Some("#F5F5F5")
    );
}

#[test]
fn test_text_elements_come_back_in_z_order() {
    let store = fixture();
    let layout = store.layout("two-up").unwrap();
    let kinds: Vec<TextKind> = layout.text_elements_by_z().iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![TextKind::HostInfo, TextKind::GuestInfo, TextKind::GuestLabel]
    );
    let sources: Vec<_> = layout
        .media_elements()
        .filter_map(|m| m.source_id.as_deref())
        .collect();
    assert_eq!(sources, vec!["cam1", "cam2", "screen:0:0"]);
}
