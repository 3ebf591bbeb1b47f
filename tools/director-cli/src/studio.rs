//! Headless studio: a program store, simulated cameras and the host inventory.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use director_common::config::DirectorConfig;
use director_media_sources::synthetic::SyntheticBackend;
use director_media_sources::{MediaSourceManager, MediaSourceRegistry};
use director_platform_core::{HostCapabilities, StaticHost};
use director_program_model::{InMemoryProgramStore, ProgramDocument};
use director_render_engine::{CompositorServices, FileAssetLoader};

pub struct Studio {
    pub config: DirectorConfig,
    pub host: StaticHost,
    pub store: Arc<InMemoryProgramStore>,
    pub media: Arc<MediaSourceManager>,
}

impl Studio {
    /// Load `program` and simulate a camera for every source its layouts
    /// reference that the host does not provide.
    pub async fn open(program: Option<&Path>) -> anyhow::Result<Self> {
        let config = DirectorConfig::load();
        let host = StaticHost::single_display();

        let store = match program {
            Some(path) => InMemoryProgramStore::load(path)
                .with_context(|| format!("Failed to load program {}", path.display()))?,
            None => InMemoryProgramStore::new(),
        };

        let host_ids: BTreeSet<String> = host
            .list_capturable_windows()
            .await?
            .into_iter()
            .map(|w| w.id)
            .chain(host.list_capturable_displays().await?.into_iter().map(|d| d.id))
            .collect();

        let mut backend = SyntheticBackend::new();
        for source_id in referenced_sources(&store.to_document()) {
            if !host_ids.contains(&source_id) {
                backend = backend.with_camera(&source_id, &format!("Simulated {source_id}"));
            }
        }

        let media = Arc::new(MediaSourceManager::new(
            Arc::new(MediaSourceRegistry::new()),
            Arc::new(backend),
        ));
        let known = media.refresh_sources(&host).await?;
        tracing::debug!(known, "Capture sources discovered");

        Ok(Self {
            config,
            host,
            store: Arc::new(store),
            media,
        })
    }

    /// Compositor services with assets resolved relative to `asset_root`.
    pub fn services(&self, asset_root: &Path) -> Arc<CompositorServices> {
        CompositorServices::new(
            &self.config,
            self.store.clone(),
            self.media.clone(),
            Arc::new(FileAssetLoader::with_root(asset_root)),
        )
    }
}

/// Source ids referenced by any media element, sorted.
pub fn referenced_sources(doc: &ProgramDocument) -> BTreeSet<String> {
    doc.layouts
        .iter()
        .flat_map(|layout| layout.media_elements())
        .filter_map(|element| element.source_id.clone())
        .collect()
}
