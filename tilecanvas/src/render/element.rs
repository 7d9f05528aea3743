//! Drawable tile element.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::coord::{GenerationKey, TileCoord};
use crate::paint::TileCanvas;

struct ElementState {
    coord: TileCoord,
    /// `None` once the host stops tracking the element.
    key: Option<GenerationKey>,
    canvas: Option<TileCanvas>,
    paints: u64,
}

/// A host-owned tile surface tagged with its live generation key.
///
/// Cheap to clone; clones share the same surface.
#[derive(Clone)]
pub struct TileElement {
    state: Arc<Mutex<ElementState>>,
}

impl fmt::Debug for TileElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TileElement")
            .field("coord", &state.coord)
            .field("key", &state.key)
            .field("painted", &state.canvas.is_some())
            .field("paints", &state.paints)
            .finish()
    }
}

impl TileElement {
    pub fn new(coord: TileCoord, key: GenerationKey) -> Self {
        Self {
            state: Arc::new(Mutex::new(ElementState {
                coord,
                key: Some(key),
                canvas: None,
                paints: 0,
            })),
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.state.lock().coord
    }

    pub fn key(&self) -> Option<GenerationKey> {
        self.state.lock().key.clone()
    }

    /// Whether `key` is the element's live key.
    pub fn is_current(&self, key: &GenerationKey) -> bool {
        self.state.lock().key.as_ref() == Some(key)
    }

    /// Reuse the element for another tile. The old canvas is dropped.
    pub fn assign(&self, coord: TileCoord, key: GenerationKey) {
        let mut state = self.state.lock();
        state.coord = coord;
        state.key = Some(key);
        state.canvas = None;
    }

    /// Stop accepting paints. Renders in flight become stale.
    pub fn detach(&self) {
        self.state.lock().key = None;
    }

    /// Replace the canvas if `key` is still live and `still_current`
    /// agrees, checked atomically with the swap.
    pub fn install(
        &self,
        key: &GenerationKey,
        canvas: TileCanvas,
        still_current: impl FnOnce() -> bool,
    ) -> bool {
        let mut state = self.state.lock();
        if state.key.as_ref() != Some(key) || !still_current() {
            return false;
        }
        state.canvas = Some(canvas);
        state.paints += 1;
        true
    }

    /// Copy of the current canvas, if painted.
    pub fn canvas(&self) -> Option<TileCanvas> {
        self.state.lock().canvas.clone()
    }

    /// Run `f` against the current canvas without copying it.
    pub fn with_canvas<R>(&self, f: impl FnOnce(Option<&TileCanvas>) -> R) -> R {
        f(self.state.lock().canvas.as_ref())
    }

    /// Number of paints installed since creation.
    pub fn paint_count(&self) -> u64 {
        self.state.lock().paints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element() -> (TileElement, GenerationKey) {
        let coord = TileCoord::new(2, 1, 1);
        let key = GenerationKey::new(&coord, 1);
        (TileElement::new(coord, key.clone()), key)
    }

    #[test]
    fn test_install_with_live_key() {
        let (element, key) = element();
        assert!(element.install(&key, TileCanvas::new(4, 4).unwrap(), || true));
        assert_eq!(element.paint_count(), 1);
        assert!(element.canvas().is_some());
    }

    #[test]
    fn test_install_rejected_after_detach() {
        let (element, key) = element();
        element.detach();
        assert!(!element.is_current(&key));
        assert!(!element.install(&key, TileCanvas::new(4, 4).unwrap(), || true));
        assert!(element.canvas().is_none());
    }

    #[test]
    fn test_install_rejected_when_condition_fails() {
        let (element, key) = element();
        assert!(!element.install(&key, TileCanvas::new(4, 4).unwrap(), || false));
        assert_eq!(element.paint_count(), 0);
    }

    #[test]
    fn test_assign_replaces_key_and_clears_canvas() {
        let (element, old_key) = element();
        element.install(&old_key, TileCanvas::new(4, 4).unwrap(), || true);

        let coord = TileCoord::new(2, 2, 1);
        let new_key = GenerationKey::new(&coord, 2);
        element.assign(coord, new_key.clone());

        assert!(!element.is_current(&old_key));
        assert!(element.is_current(&new_key));
        assert_eq!(element.coord(), coord);
        assert!(element.with_canvas(|c| c.is_none()));
    }
}
