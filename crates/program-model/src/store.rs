//! Lookup of schedules, layouts, and plans by id.
//!
//! The data layer that owns these records lives outside the compositing
//! core; [`ProgramStore`] is the seam it plugs into. [`InMemoryProgramStore`]
//! backs tests and the CLI and can be loaded from a JSON document.

use std::collections::HashMap;
use std::path::Path;

use director_common::error::{DataNotFoundError, DirectorError, DirectorResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::layout::Layout;
use crate::plan::Plan;
use crate::schedule::Schedule;

/// Read access to program data.
pub trait ProgramStore: Send + Sync {
    fn schedule(&self, id: &str) -> Option<Schedule>;

    fn layout(&self, id: &str) -> Option<Layout>;

    fn plan(&self, id: &str) -> Option<Plan>;

    /// Look up everything needed to compose `(schedule_id, layout_id)`.
    ///
    /// The plan comes from the layout, then the schedule. A referenced plan
    /// that does not exist is an error; no plan reference at all yields
    /// empty defaults.
    fn resolve(
        &self,
        schedule_id: &str,
        layout_id: &str,
    ) -> Result<Composition, DataNotFoundError> {
        let schedule = self
            .schedule(schedule_id)
            .ok_or_else(|| DataNotFoundError::Schedule(schedule_id.to_string()))?;
        let layout = self
            .layout(layout_id)
            .ok_or_else(|| DataNotFoundError::Layout(layout_id.to_string()))?;

        let plan = match layout.plan_id.as_ref().or(schedule.plan_id.as_ref()) {
            Some(plan_id) => self
                .plan(plan_id)
                .ok_or_else(|| DataNotFoundError::Plan(plan_id.clone()))?,
            None => Plan::default(),
        };

        Ok(Composition {
            schedule,
            layout,
            plan,
        })
    }
}

/// A resolved `(schedule, layout)` pair with its plan defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub schedule: Schedule,
    pub layout: Layout,
    pub plan: Plan,
}

/// Serialized form of an [`InMemoryProgramStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramDocument {
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryProgramStore {
    plans: RwLock<HashMap<String, Plan>>,
    schedules: RwLock<HashMap<String, Schedule>>,
    layouts: RwLock<HashMap<String, Layout>>,
}

impl InMemoryProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a document, validating every layout.
    pub fn from_document(doc: ProgramDocument) -> DirectorResult<Self> {
        let store = Self::new();
        for plan in doc.plans {
            store.upsert_plan(plan);
        }
        for schedule in doc.schedules {
            store.upsert_schedule(schedule);
        }
        for layout in doc.layouts {
            store.upsert_layout(layout)?;
        }
        Ok(store)
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> DirectorResult<Self> {
        let doc: ProgramDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Load a JSON document from disk.
    pub fn load(path: &Path) -> DirectorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn upsert_plan(&self, plan: Plan) {
        self.plans.write().insert(plan.id.clone(), plan);
    }

    pub fn upsert_schedule(&self, schedule: Schedule) {
        self.schedules.write().insert(schedule.id.clone(), schedule);
    }

    /// Insert or replace a layout after checking element id uniqueness.
    pub fn upsert_layout(&self, layout: Layout) -> DirectorResult<()> {
        layout.validate().map_err(DirectorError::invalid_layout)?;
        tracing::debug!(layout_id = %layout.id, elements = layout.elements.len(), "Layout stored");
        self.layouts.write().insert(layout.id.clone(), layout);
        Ok(())
    }

    pub fn remove_layout(&self, id: &str) -> Option<Layout> {
        self.layouts.write().remove(id)
    }

    pub fn remove_schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules.write().remove(id)
    }

    /// Snapshot of the whole store.
    pub fn to_document(&self) -> ProgramDocument {
        let mut doc = ProgramDocument {
            plans: self.plans.read().values().cloned().collect(),
            schedules: self.schedules.read().values().cloned().collect(),
            layouts: self.layouts.read().values().cloned().collect(),
        };
        doc.plans.sort_by(|a, b| a.id.cmp(&b.id));
        doc.schedules.sort_by(|a, b| a.id.cmp(&b.id));
        doc.layouts.sort_by(|a, b| a.id.cmp(&b.id));
        doc
    }
}

impl ProgramStore for InMemoryProgramStore {
    fn schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules.read().get(id).cloned()
    }

    fn layout(&self, id: &str) -> Option<Layout> {
        self.layouts.read().get(id).cloned()
    }

    fn plan(&self, id: &str) -> Option<Plan> {
        self.plans.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "plans": [{ "id": "p1", "background_url": "bg.png", "labels": { "guest": "Panel" } }],
        "schedules": [{ "id": "s1", "plan_id": "p1", "topic": "Opening",
                        "hosts": [{ "name": "Ada" }] }],
        "layouts": [{ "id": "l1", "elements": [
            { "type": "media", "id": "m1", "x": 0, "y": 0, "w": 1920, "h": 1080, "source_id": "cam1" },
            { "type": "text", "id": "t1", "x": 0, "y": 980, "w": 1920, "h": 100, "kind": "subject-info" }
        ] }]
    }"#;

    #[test]
    fn test_resolve_inherits_schedule_plan() {
        let store = InMemoryProgramStore::from_json(DOC).unwrap();
        let composition = store.resolve("s1", "l1").unwrap();
        assert_eq!(composition.plan.id, "p1");
        assert_eq!(
            composition
                .layout
                .effective_background_url(&composition.plan)
                .as_deref(),
            Some("bg.png")
        );
    }

    #[test]
    fn test_resolve_missing_data() {
        let store = InMemoryProgramStore::from_json(DOC).unwrap();
        assert_eq!(
            store.resolve("nope", "l1").unwrap_err(),
            DataNotFoundError::Schedule("nope".to_string())
        );
        assert_eq!(
            store.resolve("s1", "nope").unwrap_err(),
            DataNotFoundError::Layout("nope".to_string())
        );
    }

    #[test]
    fn test_rejects_duplicate_element_ids() {
        let store = InMemoryProgramStore::new();
        let mut layout = store_layout();
        let dup = layout.elements[0].clone();
        layout.elements.push(dup);
        assert!(store.upsert_layout(layout).is_err());
    }

    #[test]
    fn test_document_roundtrip_keeps_counts() {
        let store = InMemoryProgramStore::from_json(DOC).unwrap();
        let doc = store.to_document();
        assert_eq!(doc.plans.len(), 1);
        assert_eq!(doc.schedules.len(), 1);
        assert_eq!(doc.layouts[0].elements.len(), 2);
    }

    fn store_layout() -> Layout {
        let store = InMemoryProgramStore::from_json(DOC).unwrap();
        store.layout("l1").unwrap()
    }
}
