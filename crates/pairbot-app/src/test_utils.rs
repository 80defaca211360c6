//! Test utilities for the display surface
//!
//! Provides [`RecordingHost`], an in-memory [`SurfaceHost`] whose clones share
//! state, so a test can hand one clone to the engine and inspect the other.

use std::sync::{Arc, Mutex, MutexGuard};

use pairbot_core::prelude::*;

use crate::surface::{SurfaceHost, SurfaceId};

/// Everything that happened to one surface
#[derive(Debug, Clone, Default)]
pub struct RecordedSurface {
    pub title: String,
    pub contents: Vec<String>,
    pub reveals: usize,
    pub disposed: bool,
}

#[derive(Debug, Default)]
struct Recording {
    next_id: u64,
    fail_writes: bool,
    surfaces: Vec<(SurfaceId, RecordedSurface)>,
}

/// In-memory surface host that records every call
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `set_content` fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Ids of every surface ever created, oldest first
    pub fn created(&self) -> Vec<SurfaceId> {
        self.lock().surfaces.iter().map(|(id, _)| *id).collect()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<RecordedSurface> {
        self.lock()
            .surfaces
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| s.clone())
    }

    /// Latest content written to `id`
    pub fn content(&self, id: SurfaceId) -> Option<String> {
        self.surface(id).and_then(|s| s.contents.last().cloned())
    }

    pub fn reveal_count(&self, id: SurfaceId) -> usize {
        self.surface(id).map(|s| s.reveals).unwrap_or(0)
    }

    pub fn is_disposed(&self, id: SurfaceId) -> bool {
        self.surface(id).map(|s| s.disposed).unwrap_or(false)
    }

    /// Surfaces created and not yet disposed
    pub fn live(&self) -> Vec<SurfaceId> {
        self.lock()
            .surfaces
            .iter()
            .filter(|(_, s)| !s.disposed)
            .map(|(id, _)| *id)
            .collect()
    }

    fn with_surface<T>(
        &self,
        id: SurfaceId,
        f: impl FnOnce(&mut RecordedSurface) -> T,
    ) -> Result<T> {
        let mut rec = self.lock();
        match rec.surfaces.iter_mut().find(|(sid, _)| *sid == id) {
            Some((_, s)) if !s.disposed => Ok(f(s)),
            _ => Err(Error::config(format!("{} is not live", id))),
        }
    }
}

impl SurfaceHost for RecordingHost {
    fn create(&mut self, title: &str) -> Result<SurfaceId> {
        let mut rec = self.lock();
        rec.next_id += 1;
        let id = SurfaceId(rec.next_id);
        rec.surfaces.push((
            id,
            RecordedSurface {
                title: title.to_string(),
                ..Default::default()
            },
        ));
        Ok(id)
    }

    fn reveal(&mut self, id: SurfaceId) -> Result<()> {
        self.with_surface(id, |s| s.reveals += 1)
    }

    fn set_content(&mut self, id: SurfaceId, html: &str) -> Result<()> {
        if self.lock().fail_writes {
            return Err(Error::config(format!("write to {} refused", id)));
        }
        self.with_surface(id, |s| s.contents.push(html.to_string()))
    }

    fn dispose(&mut self, id: SurfaceId) -> Result<()> {
        let mut rec = self.lock();
        if let Some((_, s)) = rec.surfaces.iter_mut().find(|(sid, _)| *sid == id) {
            s.disposed = true;
        }
        Ok(())
    }
}
