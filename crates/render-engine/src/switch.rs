//! Preview/live program switching.
//!
//! The operator stages a composition on the preview canvas, then promotes
//! it to live. When live is already showing something, the two canvases
//! exchange compositions; both switch make-before-break, so a camera on
//! both canvases keeps running through the exchange.

use std::sync::Arc;

use director_common::error::{DirectorError, DirectorResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::compositor::{CanvasKind, Compositor, CompositorServices, ProgramSlot};
use crate::surface::Surface;

/// Outcome of [`ProgramSwitch::promote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Promotion {
    /// Live was empty; it now shows the previewed composition too.
    Copied { live: ProgramSlot },
    /// Preview and live exchanged compositions.
    Swapped {
        preview: ProgramSlot,
        live: ProgramSlot,
    },
    /// Nothing was being previewed.
    NothingToPromote,
}

/// Whether one `(schedule, layout)` pair is on either canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub previewing: bool,
    pub live: bool,
}

/// Which compositions each canvas is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignments {
    pub previewing: Option<ProgramSlot>,
    pub live: Option<ProgramSlot>,
}

#[derive(Default)]
struct Slots {
    preview: Option<ProgramSlot>,
    live: Option<ProgramSlot>,
}

/// Owns the preview and live compositors and the operator's selections.
pub struct ProgramSwitch {
    services: Arc<CompositorServices>,
    preview: Compositor,
    live: Compositor,
    slots: Mutex<Slots>,
}

impl ProgramSwitch {
    pub fn new(services: Arc<CompositorServices>, preview: Box<dyn Surface>, live: Box<dyn Surface>) -> Self {
        Self {
            preview: Compositor::new(CanvasKind::Preview, Arc::clone(&services), preview),
            live: Compositor::new(CanvasKind::Live, Arc::clone(&services), live),
            services,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Both canvases as CPU rasters of the given sizes.
    pub fn with_raster(services: Arc<CompositorServices>, preview: (u32, u32), live: (u32, u32)) -> Self {
        Self {
            preview: Compositor::with_raster(CanvasKind::Preview, Arc::clone(&services), preview.0, preview.1),
            live: Compositor::with_raster(CanvasKind::Live, Arc::clone(&services), live.0, live.1),
            services,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn preview(&self) -> &Compositor {
        &self.preview
    }

    pub fn live(&self) -> &Compositor {
        &self.live
    }

    pub fn compositor(&self, kind: CanvasKind) -> &Compositor {
        match kind {
            CanvasKind::Preview => &self.preview,
            CanvasKind::Live => &self.live,
        }
    }

    /// Stage `(schedule_id, layout_id)` on the preview canvas.
    pub async fn set_preview(&self, schedule_id: &str, layout_id: &str) -> DirectorResult<()> {
        let slot = ProgramSlot::new(schedule_id, layout_id);
        let replaces = self.slots.lock().preview.replace(slot.clone());
        tracing::info!(%slot, replaced = ?replaces, "Previewing");
        if replaces.is_some() {
            self.preview.switch_to(schedule_id, layout_id).await
        } else {
            self.preview.assign(schedule_id, layout_id).await
        }
    }

    /// Put the previewed composition on air.
    pub async fn promote(&self) -> DirectorResult<Promotion> {
        let (preview, previous_live) = {
            let mut slots = self.slots.lock();
            let Some(preview) = slots.preview.clone() else {
                return Ok(Promotion::NothingToPromote);
            };
            let previous_live = slots.live.replace(preview.clone());
            if let Some(live) = &previous_live {
                slots.preview = Some(live.clone());
            }
            (preview, previous_live)
        };

        match previous_live {
            None => {
                tracing::info!(live = %preview, "Promoted to empty live canvas");
                self.live
                    .switch_to(&preview.schedule_id, &preview.layout_id)
                    .await?;
                Ok(Promotion::Copied { live: preview })
            }
            Some(previous_live) => {
                tracing::info!(live = %preview, preview = %previous_live, "Swapping preview and live");
                let (live_result, preview_result) = tokio::join!(
                    self.live.switch_to(&preview.schedule_id, &preview.layout_id),
                    self.preview
                        .switch_to(&previous_live.schedule_id, &previous_live.layout_id),
                );
                live_result?;
                preview_result?;
                Ok(Promotion::Swapped {
                    preview: previous_live,
                    live: preview,
                })
            }
        }
    }

    /// Take the live canvas off air.
    pub fn clear_live(&self) {
        let cleared = self.slots.lock().live.take();
        if let Some(slot) = cleared {
            tracing::info!(%slot, "Live cleared");
        }
        self.live.dispose();
    }

    /// Stop previewing.
    pub fn clear_preview(&self) {
        self.slots.lock().preview = None;
        self.preview.dispose();
    }

    /// Drop cached text for the pair and reload every canvas showing it.
    ///
    /// Returns how many canvases were reloaded.
    pub async fn notify_layout_changed(&self, schedule_id: &str, layout_id: &str) -> DirectorResult<usize> {
        self.services.text_cache.invalidate(schedule_id, layout_id);
        let targets: Vec<&Compositor> = [&self.preview, &self.live]
            .into_iter()
            .filter(|c| c.is_assigned(schedule_id, layout_id))
            .collect();

        let mut first_error: Option<DirectorError> = None;
        for compositor in &targets {
            if let Err(e) = compositor.refresh().await {
                first_error.get_or_insert(e);
            }
        }
        tracing::debug!(schedule_id, layout_id, refreshed = targets.len(), "Layout change applied");
        match first_error {
            Some(e) => Err(e),
            None => Ok(targets.len()),
        }
    }

    /// A layout changed under every schedule: drop its cached text and
    /// reload any canvas using it.
    pub async fn notify_layout_edited(&self, layout_id: &str) -> DirectorResult<usize> {
        self.services.text_cache.invalidate_layout(layout_id);
        let mut refreshed = 0;
        for compositor in [&self.preview, &self.live] {
            let uses_layout = compositor
                .assignment()
                .is_some_and(|slot| slot.layout_id == layout_id);
            if uses_layout {
                compositor.refresh().await?;
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    pub fn status(&self, schedule_id: &str, layout_id: &str) -> SlotStatus {
        let slots = self.slots.lock();
        let is = |slot: &Option<ProgramSlot>| {
            slot.as_ref()
                .is_some_and(|s| s.matches(schedule_id, layout_id))
        };
        SlotStatus {
            previewing: is(&slots.preview),
            live: is(&slots.live),
        }
    }

    pub fn assignments(&self) -> Assignments {
        let slots = self.slots.lock();
        Assignments {
            previewing: slots.preview.clone(),
            live: slots.live.clone(),
        }
    }

    pub fn previewing(&self) -> Option<ProgramSlot> {
        self.slots.lock().preview.clone()
    }

    pub fn on_air(&self) -> Option<ProgramSlot> {
        self.slots.lock().live.clone()
    }

    pub fn is_previewing(&self, schedule_id: &str, layout_id: &str) -> bool {
        self.status(schedule_id, layout_id).previewing
    }

    pub fn is_live(&self, schedule_id: &str, layout_id: &str) -> bool {
        self.status(schedule_id, layout_id).live
    }

    /// Dispose both canvases.
    pub fn shutdown(&self) {
        *self.slots.lock() = Slots::default();
        self.preview.dispose();
        self.live.dispose();
        tracing::info!("Program switch shut down");
    }
}

impl Drop for ProgramSwitch {
    fn drop(&mut self) {
        self.preview.stop_frame_loop();
        self.live.stop_frame_loop();
    }
}
