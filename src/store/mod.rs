//! Reference template store.
//!
//! Templates are read from a directory on first use and cached for the
//! lifetime of the store. Every catalog entry owns its own lock, so loading
//! one seal never blocks lookups of another and concurrent first requests
//! for the same seal populate its slot exactly once.

pub mod catalog;

use crate::image::io::load_gray_image;
use crate::image::OwnedImage;
use crate::kernel::self_check;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{SealMatchError, SealMatchResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use catalog::{HazardCategory, SealCatalog, SealSpec};

/// A decoded reference pictogram, alpha-flattened onto white.
#[derive(Debug)]
pub struct ReferenceTemplate {
    seal_id: String,
    path: PathBuf,
    image: OwnedImage,
}

impl ReferenceTemplate {
    /// Returns the upper-case seal id.
    pub fn seal_id(&self) -> &str {
        &self.seal_id
    }

    /// Returns the file the template was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the grayscale pixels.
    pub fn image(&self) -> &OwnedImage {
        &self.image
    }
}

/// Outcome of [`TemplateStore::preload`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreloadReport {
    /// Ids whose template is cached.
    pub loaded: Vec<String>,
    /// Ids whose template failed to load, with the error.
    pub failed: Vec<(String, SealMatchError)>,
    /// Whether the correlation self-check passed.
    pub kernel_ok: bool,
}

impl PreloadReport {
    /// Returns true if every template loaded and the self-check passed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.kernel_ok
    }
}

type Slot = Mutex<Option<Arc<ReferenceTemplate>>>;

/// Lazily populated cache of reference templates.
pub struct TemplateStore {
    dir: PathBuf,
    catalog: SealCatalog,
    slots: HashMap<String, Slot>,
    loads: AtomicUsize,
}

impl TemplateStore {
    /// Creates a store reading `catalog` entries from `dir`. Nothing is read yet.
    pub fn new(dir: impl Into<PathBuf>, catalog: SealCatalog) -> Self {
        let slots = catalog
            .iter()
            .map(|spec| (spec.id.clone(), Mutex::new(None)))
            .collect();
        Self {
            dir: dir.into(),
            catalog,
            slots,
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a store over the GHS catalog.
    pub fn ghs(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, SealCatalog::ghs())
    }

    pub fn catalog(&self) -> &SealCatalog {
        &self.catalog
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true if `seal_id` has a catalog entry.
    pub fn contains(&self, seal_id: &str) -> bool {
        self.catalog.get(seal_id).is_some()
    }

    /// Returns the template for `seal_id`, loading it on first use.
    ///
    /// Unknown ids yield `Ok(None)`. A failed load is not cached, so a later
    /// call retries it.
    pub fn get(&self, seal_id: &str) -> SealMatchResult<Option<Arc<ReferenceTemplate>>> {
        let Some(spec) = self.catalog.get(seal_id) else {
            return Ok(None);
        };
        let Some(slot) = self.slots.get(&spec.id) else {
            return Ok(None);
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tpl) = guard.as_ref() {
            return Ok(Some(Arc::clone(tpl)));
        }

        let path = self.dir.join(&spec.file);
        self.loads.fetch_add(1, Ordering::Relaxed);
        let image = load_gray_image(&path).map_err(|err| SealMatchError::TemplateLoad {
            seal_id: spec.id.clone(),
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        trace_event!(
            "template_loaded",
            width = image.width(),
            height = image.height()
        );
        let tpl = Arc::new(ReferenceTemplate {
            seal_id: spec.id.clone(),
            path,
            image,
        });
        *guard = Some(Arc::clone(&tpl));
        Ok(Some(tpl))
    }

    /// Returns true if the template for `seal_id` is already cached.
    pub fn is_cached(&self, seal_id: &str) -> bool {
        self.catalog
            .get(seal_id)
            .and_then(|spec| self.slots.get(&spec.id))
            .is_some_and(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
    }

    /// Returns the number of cached templates.
    pub fn cached_len(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    /// Returns how many disk loads have been attempted.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Loads every catalog entry and runs the correlation self-check.
    ///
    /// Failures are recorded and logged; the remaining entries still load.
    /// Calling it again only retries entries that are not cached.
    pub fn preload(&self) -> PreloadReport {
        let _span = trace_span!("preload", seals = self.catalog.len()).entered();
        let mut report = PreloadReport::default();
        for spec in self.catalog.iter() {
            match self.get(&spec.id) {
                Ok(_) => report.loaded.push(spec.id.clone()),
                Err(err) => {
                    trace_warn!("template_load_failed", seal = spec.id, error = err);
                    report.failed.push((spec.id.clone(), err));
                }
            }
        }
        report.kernel_ok = match self_check() {
            Ok(()) => true,
            Err(err) => {
                trace_warn!("kernel_self_check_failed", error = err);
                false
            }
        };
        trace_event!(
            "preloaded",
            loaded = report.loaded.len(),
            failed = report.failed.len()
        );
        report
    }
}
