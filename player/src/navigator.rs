//! Position tracking over an installed collection.

use fetcher::{MediaCollection, VideoItem};

/// Minimum travel, in screen units, for a gesture to move the position.
pub const SWIPE_THRESHOLD: f64 = 50.0;

/// A completed vertical gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Screen displacement `end_y - start_y`; a finger moving up is negative.
    Swipe { dy: f64 },
    /// Wheel delta; positive scrolls forward.
    Wheel { delta_y: f64 },
}

impl Gesture {
    /// Distance travelled towards the next item.
    pub fn forward_travel(&self) -> f64 {
        match *self {
            Gesture::Swipe { dy } => -dy,
            Gesture::Wheel { delta_y } => delta_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorEvent {
    CollectionInstalled { len: usize },
    PositionChanged { from: usize, to: usize },
}

type Observer = Box<dyn FnMut(&NavigatorEvent) + Send>;

/// Index stepper over a [`MediaCollection`].
///
/// Invalid requests are absorbed: out of range indices, moves past either end
/// and any move on an empty collection leave the state untouched.
#[derive(Default)]
pub struct Navigator {
    items: MediaCollection,
    position: usize,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("len", &self.items.len())
            .field("position", &self.position())
            .finish()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&NavigatorEvent) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn notify(&mut self, event: NavigatorEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    /// Install `items` and rewind to the first one.
    pub fn set_collection(&mut self, items: MediaCollection) {
        self.items = items;
        self.position = 0;
        tracing::debug!(len = self.items.len(), "Collection installed");
        self.notify(NavigatorEvent::CollectionInstalled {
            len: self.items.len(),
        });
    }

    /// Jump to `index`. Returns whether the position changed.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index >= self.items.len() || index == self.position {
            return false;
        }
        let from = self.position;
        self.position = index;
        self.notify(NavigatorEvent::PositionChanged { from, to: index });
        true
    }

    pub fn advance(&mut self) -> bool {
        self.go_to(self.position + 1)
    }

    pub fn retreat(&mut self) -> bool {
        match self.position.checked_sub(1) {
            Some(previous) => self.go_to(previous),
            None => false,
        }
    }

    pub fn on_gesture(&mut self, gesture: Gesture) -> bool {
        let travel = gesture.forward_travel();
        if travel > SWIPE_THRESHOLD {
            self.advance()
        } else if travel < -SWIPE_THRESHOLD {
            self.retreat()
        } else {
            false
        }
    }

    /// Playback of the current item finished. Stops at the last item.
    pub fn on_item_ended(&mut self) -> bool {
        self.advance()
    }

    /// Current index, `None` while the collection is empty.
    pub fn position(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.position)
    }

    pub fn current(&self) -> Option<&VideoItem> {
        self.items.get(self.position)
    }

    pub fn items(&self) -> &[VideoItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Turns raw touch samples into a [`Gesture::Swipe`].
#[derive(Debug, Default)]
pub struct SwipeTracker {
    start: Option<f64>,
    last: Option<f64>,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_start(&mut self, y: f64) {
        self.start = Some(y);
        self.last = None;
    }

    pub fn touch_move(&mut self, y: f64) {
        if self.start.is_some() {
            self.last = Some(y);
        }
    }

    /// Finish the touch. A touch that never moved is not a swipe.
    pub fn touch_end(&mut self) -> Option<Gesture> {
        let start = self.start.take()?;
        let end = self.last.take()?;
        Some(Gesture::Swipe { dy: end - start })
    }
}
