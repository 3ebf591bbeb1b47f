//! Cache of rendered text layers, one per (schedule, layout) pair.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use director_common::config::TextDefaults;
use director_common::error::DataNotFoundError;
use director_common::{PROGRAM_HEIGHT, PROGRAM_WIDTH};
use director_program_model::{Composition, Orientation, ProgramStore, TextAlign};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::assets::ImageCache;
use crate::font::FontProvider;
use crate::surface::Bitmap;
use crate::text::{render_text_layer, ResolvedLabels};

/// Digest of everything that affects how a layout's text renders.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

struct FingerprintBuilder(Sha256);

impl FingerprintBuilder {
    fn field(&mut self, value: &[u8]) -> &mut Self {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        self.0.update((value.len() as u64).to_le_bytes());
        self.0.update(value);
        self
    }

    fn text(&mut self, value: &str) -> &mut Self {
        self.field(value.as_bytes())
    }

    fn number(&mut self, value: f64) -> &mut Self {
        self.field(&value.to_bits().to_le_bytes())
    }
}

/// Fingerprint a composition's text layer.
///
/// Covers the layout and schedule ids, every text element's id, kind, font
/// size, weight, color, orientation, alignment, z order and geometry, the
/// resolved label captions, the effective text color and the label
/// background URL. Schedule content is not covered; callers that edit it
/// must [`TextLayerCache::invalidate`].
pub fn fingerprint(composition: &Composition, defaults: &TextDefaults) -> Fingerprint {
    let Composition {
        schedule,
        layout,
        plan,
    } = composition;
    let mut b = FingerprintBuilder(Sha256::new());
    b.text(&layout.id).text(&schedule.id);

    for element in layout.text_elements_by_z() {
        let style = &element.font_style;
        b.text(&element.id)
            .text(element.kind.as_str())
            .number(style.font_size as f64)
            .number(style.font_weight as f64)
            .text(style.font_color.as_deref().unwrap_or(""))
            .text(match element.orientation {
                Orientation::Horizontal => "horizontal",
                Orientation::Vertical => "vertical",
            })
            .text(match style.align {
                TextAlign::Start => "start",
                TextAlign::Center => "center",
                TextAlign::End => "end",
            })
            .number(element.z_index as f64)
            .number(element.rect.x)
            .number(element.rect.y)
            .number(element.rect.w)
            .number(element.rect.h);
    }

    let labels = ResolvedLabels::resolve(&layout.effective_labels(plan), defaults);
    b.text(&labels.host).text(&labels.subject).text(&labels.guest);
    b.text(
        &layout
            .effective_text_color(plan)
            .unwrap_or_else(|| defaults.default_text_color.clone()),
    );
    b.text(&layout.effective_label_background_url(plan).unwrap_or_default());

    Fingerprint(b.0.finalize().into())
}

/// A rendered text layer and the fingerprint it was rendered for.
#[derive(Debug, Clone)]
pub struct TextCacheEntry {
    pub bitmap: Bitmap,
    pub fingerprint: Fingerprint,
}

type CacheKey = (String, String);

struct Slot {
    entry: TextCacheEntry,
    last_used: u64,
}

/// Entries plus a use counter for least-recently-used eviction.
#[derive(Default)]
struct Entries {
    slots: HashMap<CacheKey, Slot>,
    clock: u64,
}

impl Entries {
    fn touch(&mut self, key: &CacheKey) -> Option<&TextCacheEntry> {
        self.clock += 1;
        let clock = self.clock;
        let slot = self.slots.get_mut(key)?;
        slot.last_used = clock;
        Some(&slot.entry)
    }

    /// Insert `entry`, dropping least recently used pairs beyond `capacity`.
    fn insert(&mut self, key: CacheKey, entry: TextCacheEntry, capacity: usize) -> Vec<CacheKey> {
        self.clock += 1;
        self.slots.insert(
            key,
            Slot {
                entry,
                last_used: self.clock,
            },
        );
        let mut evicted = Vec::new();
        while self.slots.len() > capacity.max(1) {
            let Some(oldest) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.slots.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }
}

/// Renders and caches text layers.
///
/// An entry is replaced wholesale when its fingerprint changes, so a frame
/// drawing the previous bitmap never sees a half-updated one.
pub struct TextLayerCache {
    store: Arc<dyn ProgramStore>,
    images: Arc<ImageCache>,
    fonts: Arc<FontProvider>,
    defaults: TextDefaults,
    entries: Mutex<Entries>,
    blank: Mutex<Option<Bitmap>>,
    renders: AtomicU64,
}

impl TextLayerCache {
    pub fn new(
        store: Arc<dyn ProgramStore>,
        images: Arc<ImageCache>,
        fonts: Arc<FontProvider>,
        defaults: TextDefaults,
    ) -> Self {
        Self {
            store,
            images,
            fonts,
            defaults,
            entries: Mutex::new(Entries::default()),
            blank: Mutex::new(None),
            renders: AtomicU64::new(0),
        }
    }

    /// Text layer for `(schedule_id, layout_id)`, rendering it on a miss.
    pub async fn get_text_layer(
        &self,
        schedule_id: &str,
        layout_id: &str,
    ) -> Result<Bitmap, DataNotFoundError> {
        let composition = self.store.resolve(schedule_id, layout_id)?;
        Ok(self.layer_for(&composition).await)
    }

    /// Text layer for an already resolved composition.
    pub async fn layer_for(&self, composition: &Composition) -> Bitmap {
        let key = (composition.schedule.id.clone(), composition.layout.id.clone());
        let fingerprint = fingerprint(composition, &self.defaults);

        let hit = self
            .entries
            .lock()
            .touch(&key)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| entry.bitmap.clone());
        if let Some(bitmap) = hit {
            return bitmap;
        }

        let bitmap = if composition.layout.text_elements_by_z().is_empty() {
            self.blank()
        } else {
            self.render(composition).await
        };

        let mut entries = self.entries.lock();
        // A concurrent render of the same content may have finished first.
        let raced = entries
            .touch(&key)
            .filter(|existing| existing.fingerprint == fingerprint)
            .map(|existing| existing.bitmap.clone());
        if let Some(existing) = raced {
            return existing;
        }

        tracing::debug!(
            schedule_id = %key.0,
            layout_id = %key.1,
            %fingerprint,
            "Text layer cached"
        );
        let evicted = entries.insert(
            key,
            TextCacheEntry {
                bitmap: bitmap.clone(),
                fingerprint,
            },
            self.defaults.cache_capacity,
        );
        drop(entries);
        for (schedule_id, layout_id) in evicted {
            tracing::debug!(%schedule_id, %layout_id, "Text layer evicted");
        }
        bitmap
    }

    async fn render(&self, composition: &Composition) -> Bitmap {
        let font = self.fonts.font().await;

        let has_labels = composition
            .layout
            .text_elements_by_z()
            .iter()
            .any(|t| t.kind.is_label());
        let label_background = match composition
            .layout
            .effective_label_background_url(&composition.plan)
        {
            Some(url) if has_labels => match self.images.get(&url).await {
                Ok(bitmap) => Some(bitmap),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Label background unavailable");
                    None
                }
            },
            _ => None,
        };

        self.renders.fetch_add(1, Ordering::Relaxed);
        let composition = composition.clone();
        let defaults = self.defaults.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            render_text_layer(&composition, &defaults, label_background.as_ref(), font.as_ref())
        })
        .await;

        match rendered {
            Ok(bitmap) => bitmap,
            Err(e) => {
                tracing::error!(error = %e, "Text layer render task failed");
                self.blank()
            }
        }
    }

    /// The shared transparent layer used by layouts without text.
    fn blank(&self) -> Bitmap {
        self.blank
            .lock()
            .get_or_insert_with(|| Bitmap::blank(PROGRAM_WIDTH, PROGRAM_HEIGHT))
            .clone()
    }

    /// Current entry for a pair, if any.
    pub fn entry(&self, schedule_id: &str, layout_id: &str) -> Option<TextCacheEntry> {
        self.entries
            .lock()
            .slots
            .get(&(schedule_id.to_string(), layout_id.to_string()))
            .map(|slot| slot.entry.clone())
    }

    /// Drop the entry for a pair. Returns whether one existed.
    pub fn invalidate(&self, schedule_id: &str, layout_id: &str) -> bool {
        self.entries
            .lock()
            .slots
            .remove(&(schedule_id.to_string(), layout_id.to_string()))
            .is_some()
    }

    /// Drop every entry rendered for `layout_id`, whatever the schedule.
    pub fn invalidate_layout(&self, layout_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.slots.len();
        entries.slots.retain(|(_, layout), _| layout != layout_id);
        before - entries.slots.len()
    }

    pub fn clear(&self) {
        self.entries.lock().slots.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of full renders performed.
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetLoader;
    use director_program_model::{
        FontStyle, InMemoryProgramStore, Layout, LayoutElement, Plan, Rect, Schedule, TextElement,
        TextKind,
    };
    use std::time::Duration;

    fn text(id: &str, kind: TextKind) -> LayoutElement {
        LayoutElement::Text(TextElement {
            id: id.to_string(),
            rect: Rect::new(0.0, 0.0, 400.0, 60.0),
            z_index: 0,
            font_style: FontStyle::default(),
            orientation: Orientation::Horizontal,
            kind,
        })
    }

    fn composition() -> Composition {
        let mut layout = Layout::new("l1");
        layout.elements = vec![
            text("a", TextKind::SubjectLabel),
            text("b", TextKind::SubjectInfo),
        ];
        Composition {
            schedule: Schedule::new("s1"),
            layout,
            plan: Plan::default(),
        }
    }

    fn cache(store: InMemoryProgramStore) -> TextLayerCache {
        cache_with_capacity(Arc::new(store), TextDefaults::default().cache_capacity)
    }

    fn cache_with_capacity(store: Arc<InMemoryProgramStore>, cache_capacity: usize) -> TextLayerCache {
        let defaults = TextDefaults {
            fallback_font_paths: Vec::new(),
            cache_capacity,
            ..TextDefaults::default()
        };
        let loader = Arc::new(MemoryAssetLoader::new());
        let images = Arc::new(ImageCache::new(loader.clone(), Duration::from_secs(1)));
        let fonts = Arc::new(FontProvider::new(defaults.clone(), loader));
        TextLayerCache::new(store, images, fonts, defaults)
    }

    #[test]
    fn test_fingerprint_tracks_style_and_ids() {
        let defaults = TextDefaults::default();
        let base = composition();
        let fp = fingerprint(&base, &defaults);
        assert_eq!(fp, fingerprint(&base.clone(), &defaults));

        let mut weight = base.clone();
        if let LayoutElement::Text(t) = &mut weight.layout.elements[1] {
            t.font_style.font_weight = 700;
        }
        assert_ne!(fp, fingerprint(&weight, &defaults));

        let mut size = base.clone();
        if let LayoutElement::Text(t) = &mut size.layout.elements[1] {
            t.font_style.font_size = 48.0;
        }
        assert_ne!(fp, fingerprint(&size, &defaults));

        let mut color = base.clone();
        if let LayoutElement::Text(t) = &mut color.layout.elements[0] {
            t.font_style.font_color = Some("#FFCC00".to_string());
        }
        assert_ne!(fp, fingerprint(&color, &defaults));

        let mut orientation = base.clone();
        if let LayoutElement::Text(t) = &mut orientation.layout.elements[0] {
            t.orientation = Orientation::Vertical;
        }
        assert_ne!(fp, fingerprint(&orientation, &defaults));

        let mut background = base.clone();
        background.plan.label_background_url = Some("label.png".to_string());
        assert_ne!(fp, fingerprint(&background, &defaults));

        let mut schedule = base.clone();
        schedule.schedule.id = "s2".to_string();
        assert_ne!(fp, fingerprint(&schedule, &defaults));

        // Content edits are not part of the fingerprint.
        let mut topic = base;
        topic.schedule.topic = "New topic".to_string();
        assert_eq!(fp, fingerprint(&topic, &defaults));
    }

    #[tokio::test]
    async fn test_repeated_requests_reuse_bitmap() {
        let store = InMemoryProgramStore::new();
        let comp = composition();
        store.upsert_schedule(comp.schedule.clone());
        store.upsert_layout(comp.layout.clone()).unwrap();
        let cache = cache(store);

        let a = cache.get_text_layer("s1", "l1").await.unwrap();
        let b = cache.get_text_layer("s1", "l1").await.unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(cache.render_count(), 1);

        assert!(cache.invalidate("s1", "l1"));
        let c = cache.get_text_layer("s1", "l1").await.unwrap();
        assert!(!a.same_instance(&c));
        assert_eq!(cache.render_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_data_is_reported() {
        let cache = cache(InMemoryProgramStore::new());
        assert_eq!(
            cache.get_text_layer("nope", "l1").await.unwrap_err(),
            DataNotFoundError::Schedule("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_layouts_without_text_share_the_blank_layer() {
        let cache = cache(InMemoryProgramStore::new());
        let mut first = composition();
        first.layout.elements.clear();
        let mut second = first.clone();
        second.layout.id = "l2".to_string();

        let a = cache.layer_for(&first).await;
        let b = cache.layer_for(&second).await;
        assert!(a.same_instance(&b));
        assert!(a.is_transparent());
        assert_eq!(a.dimensions(), (PROGRAM_WIDTH, PROGRAM_HEIGHT));
        assert_eq!(cache.render_count(), 0);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate_layout("l2"), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_edit_renders_a_new_layer() {
        let store = Arc::new(InMemoryProgramStore::new());
        let comp = composition();
        store.upsert_schedule(comp.schedule.clone());
        store.upsert_layout(comp.layout.clone()).unwrap();
        let cache = cache_with_capacity(store.clone(), 16);

        let before = cache.get_text_layer("s1", "l1").await.unwrap();

        let mut edited = comp.layout.clone();
        if let LayoutElement::Text(t) = &mut edited.elements[1] {
            t.font_style.font_size = 52.0;
        }
        store.upsert_layout(edited).unwrap();
        let after = cache.get_text_layer("s1", "l1").await.unwrap();
        assert!(!before.same_instance(&after));
        assert_eq!(cache.render_count(), 2);

        let again = cache.get_text_layer("s1", "l1").await.unwrap();
        assert!(after.same_instance(&again));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = cache_with_capacity(Arc::new(InMemoryProgramStore::new()), 2);
        let first = composition();
        let mut second = composition();
        second.layout.id = "l2".to_string();
        let mut third = composition();
        third.layout.id = "l3".to_string();

        cache.layer_for(&first).await;
        cache.layer_for(&second).await;
        // Touch the first pair so the second becomes the oldest.
        cache.layer_for(&first).await;
        cache.layer_for(&third).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.entry("s1", "l1").is_some());
        assert!(cache.entry("s1", "l2").is_none());
        assert!(cache.entry("s1", "l3").is_some());
        assert_eq!(cache.render_count(), 3);
    }
}
