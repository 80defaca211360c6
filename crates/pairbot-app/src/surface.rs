//! The single reusable review display surface
//!
//! [`NotificationSurface`] owns at most one live surface at a time. Every
//! write fully replaces the displayed page. Once the user closes the surface,
//! the next write creates a fresh one that starts from the empty page.
//!
//! Whatever actually shows the page sits behind [`SurfaceHost`].

use std::fmt;
use std::path::{Path, PathBuf};

use pairbot_core::prelude::*;
use pairbot_core::InboundMessage;

use crate::render;

/// File name the [`HtmlFileHost`] writes the live page to
pub const PANEL_FILE: &str = "review-panel.html";

/// Identity of one surface instance; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Something that can display a page of HTML
pub trait SurfaceHost: Send {
    /// Construct a new surface; it is not shown until content is set
    fn create(&mut self, title: &str) -> Result<SurfaceId>;

    /// Bring an existing surface to the foreground
    fn reveal(&mut self, id: SurfaceId) -> Result<()>;

    /// Replace the whole content of a surface
    fn set_content(&mut self, id: SurfaceId, html: &str) -> Result<()>;

    /// Tear a surface down
    fn dispose(&mut self, id: SurfaceId) -> Result<()>;
}

/// Whether a surface currently exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

#[derive(Debug)]
struct LiveSurface {
    id: SurfaceId,
    content: String,
}

/// Lazily created, revealable display surface
pub struct NotificationSurface {
    host: Box<dyn SurfaceHost>,
    current: Option<LiveSurface>,
}

impl fmt::Debug for NotificationSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSurface")
            .field("current", &self.current.as_ref().map(|s| s.id))
            .finish()
    }
}

impl NotificationSurface {
    pub fn new(host: Box<dyn SurfaceHost>) -> Self {
        Self {
            host,
            current: None,
        }
    }

    /// Reveal the live surface, or create one showing the empty page.
    ///
    /// A surface that has been disposed is never reused.
    pub fn show_or_reveal(&mut self) -> Result<SurfaceId> {
        if let Some(live) = &self.current {
            self.host.reveal(live.id)?;
            return Ok(live.id);
        }

        let id = self.host.create(render::PANEL_TITLE)?;
        let empty = render::empty_page();
        // Only a surface showing the empty page becomes the live one
        let shown = self
            .host
            .set_content(id, &empty)
            .and_then(|()| self.host.reveal(id));
        if let Err(e) = shown {
            if let Err(dispose_err) = self.host.dispose(id) {
                warn!("Failed to dispose half-created {}: {}", id, dispose_err);
            }
            return Err(e);
        }

        self.current = Some(LiveSurface { id, content: empty });
        debug!("Created {}", id);
        Ok(id)
    }

    /// Replace the displayed page with `page_html`
    pub fn render(&mut self, page_html: String) -> Result<SurfaceId> {
        let id = self.show_or_reveal()?;
        self.write(id, page_html)?;
        Ok(id)
    }

    /// Render one review frame
    pub fn show_review(&mut self, message: &InboundMessage) -> Result<SurfaceId> {
        self.render(render::review_page(message))
    }

    fn write(&mut self, id: SurfaceId, page_html: String) -> Result<()> {
        self.host.set_content(id, &page_html)?;
        if let Some(live) = self.current.as_mut().filter(|s| s.id == id) {
            live.content = page_html;
        }
        Ok(())
    }

    /// Disposal notice from the host.
    ///
    /// Returns `true` when it cleared the live surface; a notice for an older
    /// surface is ignored.
    pub fn on_disposed(&mut self, id: SurfaceId) -> bool {
        match &self.current {
            Some(live) if live.id == id => {
                debug!("{} disposed", id);
                self.current = None;
                true
            }
            _ => {
                debug!("Ignoring disposal of stale {}", id);
                false
            }
        }
    }

    /// User closed the surface: dispose it through the host and forget it
    pub fn close(&mut self) -> Option<SurfaceId> {
        let live = self.current.take()?;
        if let Err(e) = self.host.dispose(live.id) {
            warn!("Failed to dispose {}: {}", live.id, e);
        }
        Some(live.id)
    }

    /// Release the surface at shutdown. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(id) = self.close() {
            info!("Released {}", id);
        }
    }

    pub fn visibility(&self) -> Visibility {
        if self.current.is_some() {
            Visibility::Visible
        } else {
            Visibility::Hidden
        }
    }

    pub fn current_id(&self) -> Option<SurfaceId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// Page currently displayed, if a surface exists
    pub fn content(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.content.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML file host
// ─────────────────────────────────────────────────────────────────────────────

/// Host that keeps the live surface as an HTML file on disk.
///
/// Content is written to a temporary file and renamed into place, so a
/// browser or editor preview watching the file never sees a partial page.
#[derive(Debug)]
pub struct HtmlFileHost {
    dir: PathBuf,
    next_id: u64,
    live: Option<SurfaceId>,
}

impl HtmlFileHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: 1,
            live: None,
        }
    }

    pub fn page_path(&self) -> PathBuf {
        self.dir.join(PANEL_FILE)
    }

    fn ensure_live(&self, id: SurfaceId) -> Result<()> {
        if self.live == Some(id) {
            Ok(())
        } else {
            Err(Error::config(format!("{} is not the live surface", id)))
        }
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("html.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl SurfaceHost for HtmlFileHost {
    fn create(&mut self, title: &str) -> Result<SurfaceId> {
        std::fs::create_dir_all(&self.dir)?;
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.live = Some(id);
        debug!("{} '{}' backed by {}", id, title, self.page_path().display());
        Ok(id)
    }

    fn reveal(&mut self, id: SurfaceId) -> Result<()> {
        self.ensure_live(id)?;
        trace!("Review panel at {}", self.page_path().display());
        Ok(())
    }

    fn set_content(&mut self, id: SurfaceId, html: &str) -> Result<()> {
        self.ensure_live(id)?;
        write_atomically(&self.page_path(), html)
    }

    fn dispose(&mut self, id: SurfaceId) -> Result<()> {
        if self.live != Some(id) {
            return Ok(());
        }
        self.live = None;
        match std::fs::remove_file(self.page_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
