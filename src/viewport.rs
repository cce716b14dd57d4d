//! One-shot viewport entry detection.
//!
//! The host owns the actual intersection primitive and feeds geometry in via
//! [`ViewportObserver::report`]. Callbacks are queued on the first hit and only
//! run from [`ViewportObserver::dispatch`], never from inside `observe` or
//! `report`, so a callback may freely register or release other regions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::json;

use crate::telemetry::Logger;

/// Scroll offset past which the site header switches to its condensed look.
pub const HEADER_CONDENSE_SCROLL_PX: f64 = 50.0;

pub fn header_is_condensed(scroll_y: f64) -> bool {
    scroll_y > HEADER_CONDENSE_SCROLL_PX
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Element bounds in viewport coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

/// True when any part of `rect` lies within or touches the viewport grown
/// by `margin_px` on every edge. Negative margins shrink the viewport.
pub fn intersects(rect: Rect, viewport: ViewportSize, margin_px: f64) -> bool {
    let top_edge = -margin_px;
    let left_edge = -margin_px;
    let bottom_edge = viewport.height + margin_px;
    let right_edge = viewport.width + margin_px;

    rect.bottom >= top_edge
        && rect.top <= bottom_edge
        && rect.right >= left_edge
        && rect.left <= right_edge
}

/// Lifetime object for one observed section. `has_fired` and `consumed`
/// only ever move from false to true.
#[derive(Debug)]
pub struct ViewportRegion {
    id: RegionId,
    margin_px: f64,
    has_fired: bool,
    consumed: bool,
}

impl ViewportRegion {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn margin_px(&self) -> f64 {
        self.margin_px
    }

    pub fn has_fired(&self) -> bool {
        self.has_fired
    }

    /// Whether a reveal has already been started for this region.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

type EnterCallback = Box<dyn FnOnce()>;

struct Registration {
    region: ViewportRegion,
    on_enter: Option<EnterCallback>,
}

pub struct ViewportObserver {
    next_id: u64,
    registrations: HashMap<RegionId, Registration>,
    fired: HashMap<RegionId, ViewportRegion>,
    pending: Vec<(RegionId, EnterCallback)>,
    logger: Logger,
}

impl std::fmt::Debug for ViewportObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportObserver")
            .field("observed", &self.registrations.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ViewportObserver {
    pub fn new(logger: Logger) -> Self {
        Self {
            next_id: 1,
            registrations: HashMap::new(),
            fired: HashMap::new(),
            pending: Vec::new(),
            logger,
        }
    }

    pub fn observe(&mut self, margin_px: f64, on_enter: impl FnOnce() + 'static) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        self.registrations.insert(
            id,
            Registration {
                region: ViewportRegion {
                    id,
                    margin_px,
                    has_fired: false,
                    consumed: false,
                },
                on_enter: Some(Box::new(on_enter)),
            },
        );
        id
    }

    pub fn is_observing(&self, id: RegionId) -> bool {
        self.registrations.contains_key(&id)
    }

    /// Whether the region has ever fired. Released regions report `false`.
    pub fn has_fired(&self, id: RegionId) -> bool {
        self.fired
            .get(&id)
            .map(ViewportRegion::has_fired)
            .unwrap_or(false)
    }

    /// Feeds one geometry sample for `id`. Returns true when this sample
    /// fired the region. Samples for released or already-fired regions are
    /// ignored.
    pub fn report(&mut self, id: RegionId, rect: Rect, viewport: ViewportSize) -> bool {
        let Some(registration) = self.registrations.get(&id) else {
            return false;
        };

        if !intersects(rect, viewport, registration.region.margin_px) {
            return false;
        }

        self.enter(id)
    }

    /// Fires `id` on the host's word that it entered the viewport, without
    /// geometry. Returns false for released or already-fired regions.
    pub fn enter(&mut self, id: RegionId) -> bool {
        let Some(mut registration) = self.registrations.remove(&id) else {
            return false;
        };
        registration.region.has_fired = true;

        if let Some(on_enter) = registration.on_enter.take() {
            self.pending.push((id, on_enter));
        }

        self.logger.debug(
            "region_fired",
            json!({ "region": id.get(), "margin_px": registration.region.margin_px }),
        );
        self.fired.insert(id, registration.region);
        true
    }

    /// Takes the region's single reveal. True exactly once per fired region;
    /// false before it fires, after release, and on every later call.
    pub fn claim(&mut self, id: RegionId) -> bool {
        match self.fired.get_mut(&id) {
            Some(region) if !region.consumed => {
                region.consumed = true;
                true
            }
            _ => false,
        }
    }

    /// Releases the region. A queued but undelivered callback is dropped.
    pub fn unobserve(&mut self, id: RegionId) {
        self.registrations.remove(&id);
        self.fired.remove(&id);
        self.pending.retain(|(pending_id, _)| *pending_id != id);
    }

    fn take_pending(&mut self) -> Vec<(RegionId, EnterCallback)> {
        std::mem::take(&mut self.pending)
    }

    /// Runs queued callbacks with no borrow of the observer held.
    pub fn dispatch(observer: &Rc<RefCell<Self>>) -> usize {
        let mut delivered = 0;

        loop {
            let batch = observer.borrow_mut().take_pending();
            if batch.is_empty() {
                return delivered;
            }

            for (id, on_enter) in batch {
                // An earlier callback in this batch may have released `id`.
                if !observer.borrow().fired.contains_key(&id) {
                    continue;
                }
                on_enter();
                delivered += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const VIEWPORT: ViewportSize = ViewportSize {
        width: 1280.0,
        height: 800.0,
    };

    fn rect_at(top: f64, height: f64) -> Rect {
        Rect {
            top,
            left: 0.0,
            bottom: top + height,
            right: 1280.0,
        }
    }

    fn shared_observer() -> Rc<RefCell<ViewportObserver>> {
        Rc::new(RefCell::new(ViewportObserver::new(Logger::silent())))
    }

    fn counter() -> (Rc<Cell<u32>>, impl FnOnce() + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move || handle.set(handle.get() + 1))
    }

    #[test]
    fn negative_margin_requires_region_to_be_inside() {
        assert!(!intersects(rect_at(750.0, 400.0), VIEWPORT, -100.0));
        assert!(intersects(rect_at(650.0, 400.0), VIEWPORT, -100.0));
        assert!(intersects(rect_at(850.0, 400.0), VIEWPORT, 100.0));
        assert!(!intersects(rect_at(-500.0, 450.0), VIEWPORT, 0.0));
    }

    #[test]
    fn region_touching_the_shrunk_edge_counts_as_inside() {
        let touching = Rect {
            top: 700.0,
            left: 0.0,
            bottom: 1100.0,
            right: 1280.0,
        };
        assert!(intersects(touching, VIEWPORT, -100.0));
        assert!(!intersects(rect_at(700.5, 400.0), VIEWPORT, -100.0));

        let observer = shared_observer();
        let (count, on_enter) = counter();
        let id = observer.borrow_mut().observe(-100.0, on_enter);
        assert!(observer.borrow_mut().report(id, touching, VIEWPORT));
        ViewportObserver::dispatch(&observer);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn host_entry_fires_without_geometry() {
        let observer = shared_observer();
        let (count, on_enter) = counter();
        let id = observer.borrow_mut().observe(-100.0, on_enter);

        assert!(observer.borrow_mut().enter(id));
        assert!(!observer.borrow_mut().enter(id));
        assert!(!observer.borrow_mut().report(id, rect_at(0.0, 400.0), VIEWPORT));
        assert_eq!(ViewportObserver::dispatch(&observer), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn region_is_claimed_once_and_only_after_firing() {
        let observer = shared_observer();
        let id = observer.borrow_mut().observe(0.0, || {});
        assert!(!observer.borrow_mut().claim(id));

        observer.borrow_mut().report(id, rect_at(0.0, 400.0), VIEWPORT);
        assert!(observer.borrow_mut().claim(id));
        assert!(!observer.borrow_mut().claim(id));
        assert!(observer.borrow().fired[&id].is_consumed());

        observer.borrow_mut().unobserve(id);
        assert!(!observer.borrow_mut().claim(id));
    }

    #[test]
    fn region_fires_once_across_repeated_crossings() {
        let observer = shared_observer();
        let (count, on_enter) = counter();
        let id = observer.borrow_mut().observe(-100.0, on_enter);

        // below the fold, scrolled into view, out above, back in
        for top in [1200.0, 300.0, -2000.0, 300.0, 1200.0, 300.0] {
            observer.borrow_mut().report(id, rect_at(top, 600.0), VIEWPORT);
            ViewportObserver::dispatch(&observer);
        }

        assert_eq!(count.get(), 1);
        assert!(observer.borrow().has_fired(id));
        assert!(!observer.borrow().is_observing(id));
    }

    #[test]
    fn already_visible_region_fires_from_dispatch_not_registration() {
        let observer = shared_observer();
        let (count, on_enter) = counter();
        let id = observer.borrow_mut().observe(0.0, on_enter);
        assert_eq!(count.get(), 0);

        assert!(observer.borrow_mut().report(id, rect_at(0.0, 400.0), VIEWPORT));
        assert_eq!(count.get(), 0);

        assert_eq!(ViewportObserver::dispatch(&observer), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unobserve_before_dispatch_drops_the_callback() {
        let observer = shared_observer();
        let (count, on_enter) = counter();
        let id = observer.borrow_mut().observe(0.0, on_enter);

        observer.borrow_mut().report(id, rect_at(0.0, 400.0), VIEWPORT);
        observer.borrow_mut().unobserve(id);

        assert_eq!(ViewportObserver::dispatch(&observer), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn reports_for_released_regions_are_no_ops() {
        let observer = shared_observer();
        let id = observer.borrow_mut().observe(0.0, || {});
        observer.borrow_mut().unobserve(id);

        assert!(!observer.borrow_mut().report(id, rect_at(0.0, 400.0), VIEWPORT));
        observer.borrow_mut().unobserve(id);
        assert_eq!(ViewportObserver::dispatch(&observer), 0);
    }

    #[test]
    fn regions_fire_independently_and_callbacks_may_reenter() {
        let observer = shared_observer();
        let (late_count, late_enter) = counter();
        let late = observer.borrow_mut().observe(0.0, late_enter);

        let reentrant = Rc::clone(&observer);
        let early = observer.borrow_mut().observe(0.0, move || {
            reentrant.borrow_mut().unobserve(late);
        });

        observer.borrow_mut().report(early, rect_at(100.0, 200.0), VIEWPORT);
        observer.borrow_mut().report(late, rect_at(400.0, 200.0), VIEWPORT);
        assert_eq!(ViewportObserver::dispatch(&observer), 1);
        assert_eq!(late_count.get(), 0);
    }

    #[test]
    fn header_condenses_after_threshold() {
        assert!(!header_is_condensed(0.0));
        assert!(!header_is_condensed(50.0));
        assert!(header_is_condensed(51.0));
    }
}
