//! Per-run shared state.

use crate::bundler::{manifest::ManifestCache, resolver::Resolver, settings::Settings};
use std::sync::Arc;

/// State shared by every function packaged in one run.
///
/// Passed explicitly to every component; two runs in the same process never
/// share a manifest cache. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct RunContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    settings: Settings,
    manifests: ManifestCache,
}

impl RunContext {
    pub fn new(settings: Settings) -> Self {
        let manifests = ManifestCache::new(settings.manifest_boundary().map(Into::into));
        Self {
            inner: Arc::new(Inner {
                settings,
                manifests,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn manifests(&self) -> &ManifestCache {
        &self.inner.manifests
    }

    /// A module resolver bound to this run's manifest cache.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.inner.manifests, self.inner.settings.extensions())
    }
}
