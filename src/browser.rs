use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use js_sys::{Array, Function, Object, Promise, Reflect};
use portfolio_engine::reveal::{RenderHost, SegmentationError};
use portfolio_engine::theme::{AmbientSignal, PreferenceStore, StorageError, Theme, ThemeMarker};
use portfolio_engine::timeline::{Pose, Tween};
use portfolio_engine::viewport::{Rect, RegionId, ViewportObserver, ViewportSize};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    window, HtmlElement, IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit,
    Storage,
};

const LINE_CLASS: &str = "reveal-line";

fn local_storage() -> Result<Storage, StorageError> {
    window()
        .ok_or(StorageError::Unavailable)?
        .local_storage()
        .ok()
        .flatten()
        .ok_or(StorageError::Unavailable)
}

fn media_matches(query: &str) -> Option<bool> {
    window()?
        .match_media(query)
        .ok()
        .flatten()
        .map(|mq| mq.matches())
}

pub fn prefers_reduced_motion() -> bool {
    media_matches("(prefers-reduced-motion: reduce)").unwrap_or(false)
}

pub fn viewport_size() -> ViewportSize {
    let Some(win) = window() else {
        return ViewportSize {
            width: 1280.0,
            height: 720.0,
        };
    };

    let width = win
        .inner_width()
        .ok()
        .and_then(|value| value.as_f64())
        .unwrap_or(1280.0);
    let height = win
        .inner_height()
        .ok()
        .and_then(|value| value.as_f64())
        .unwrap_or(720.0);

    ViewportSize { width, height }
}

pub struct LocalStorageStore;

impl PreferenceStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        local_storage()?
            .get_item(key)
            .map_err(|_| StorageError::Unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        local_storage()?
            .set_item(key, value)
            .map_err(|error| StorageError::WriteRefused(format!("{error:?}")))
    }
}

pub struct ColorSchemeQuery;

impl AmbientSignal for ColorSchemeQuery {
    fn prefers_dark(&self) -> Option<bool> {
        media_matches("(prefers-color-scheme: dark)")
    }
}

/// `class="dark"` plus `data-theme` on `<html>`.
pub struct RootElementMarker;

impl ThemeMarker for RootElementMarker {
    fn apply(&self, theme: Theme) {
        let Some(root) = window()
            .and_then(|w| w.document())
            .and_then(|d| d.document_element())
        else {
            return;
        };

        let _ = root.class_list().toggle_with_force("dark", theme.is_dark());
        let _ = root.set_attribute("data-theme", theme.as_str());
    }
}

fn set_pose(element: &HtmlElement, pose: &Pose) {
    let style = element.style();
    let _ = style.set_property("opacity", &pose.opacity.to_string());
    let _ = style.set_property("transform", &pose.transform_css());
    let _ = style.set_property("filter", &pose.filter_css());
}

fn keyframe(pose: &Pose) -> Result<Object, JsValue> {
    let frame = Object::new();
    Reflect::set(&frame, &"opacity".into(), &pose.opacity.into())?;
    Reflect::set(&frame, &"transform".into(), &pose.transform_css().into())?;
    Reflect::set(&frame, &"filter".into(), &pose.filter_css().into())?;
    Ok(frame)
}

/// Starts a Web Animations API tween and returns its `finished` promise.
fn start_animation(element: &HtmlElement, tween: &Tween) -> Result<Promise, JsValue> {
    let animate = Reflect::get(element, &"animate".into())?.dyn_into::<Function>()?;
    let frames = Array::of2(&keyframe(&tween.from)?, &keyframe(&tween.to)?);
    let options = Object::new();
    Reflect::set(
        &options,
        &"duration".into(),
        &(tween.duration.as_secs_f64() * 1_000.0).into(),
    )?;
    Reflect::set(&options, &"easing".into(), &tween.easing.into())?;
    Reflect::set(&options, &"fill".into(), &"both".into())?;

    let animation = animate.call2(element, &frames, &options)?;
    Reflect::get(&animation, &"finished".into())?.dyn_into::<Promise>()
}

fn timeout(duration: Duration) -> Promise {
    let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
    Promise::new(&mut |resolve, _reject| {
        let scheduled = window().map(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
        });
        if !matches!(scheduled, Some(Ok(_))) {
            let _ = resolve.call0(&JsValue::NULL);
        }
    })
}

/// Browser rendering host: Web Animations for tweens, `document.fonts` for
/// font readiness, `offsetTop` for line measurement.
pub struct BrowserHost;

impl RenderHost for BrowserHost {
    type Target = HtmlElement;

    fn conceal(&self, target: &HtmlElement, pose: &Pose) {
        set_pose(target, pose);
    }

    fn reveal_now(&self, target: &HtmlElement) {
        set_pose(target, &Pose::REST);
    }

    fn fonts_ready(&self) -> LocalBoxFuture<'static, ()> {
        let ready = window()
            .and_then(|w| w.document())
            .and_then(|document| Reflect::get(&document, &"fonts".into()).ok())
            .and_then(|fonts| Reflect::get(&fonts, &"ready".into()).ok())
            .and_then(|ready| ready.dyn_into::<Promise>().ok());

        async move {
            if let Some(ready) = ready {
                let _ = JsFuture::from(ready).await;
            }
        }
        .boxed_local()
    }

    fn split_lines(&self, target: &HtmlElement) -> Result<Vec<HtmlElement>, SegmentationError> {
        let document = window()
            .and_then(|w| w.document())
            .ok_or_else(|| SegmentationError::Unavailable("no document".to_string()))?;
        let text = target.text_content().unwrap_or_default();
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(SegmentationError::NoLines);
        }
        if target.offset_parent().is_none() {
            return Err(SegmentationError::Unavailable(
                "element is not laid out".to_string(),
            ));
        }

        let make_span = |content: &str| -> Result<HtmlElement, SegmentationError> {
            let span = document
                .create_element("span")
                .map_err(|error| SegmentationError::Unavailable(format!("{error:?}")))?
                .dyn_into::<HtmlElement>()
                .map_err(|_| SegmentationError::Unavailable("span is not an element".to_string()))?;
            span.set_text_content(Some(content));
            Ok(span)
        };

        // Measure word by word, then regroup the words into one span per line.
        target.set_text_content(None);
        let mut measured = Vec::with_capacity(words.len());
        for (position, word) in words.iter().enumerate() {
            let content = if position + 1 < words.len() {
                format!("{word} ")
            } else {
                (*word).to_string()
            };
            let span = make_span(&content)?;
            target
                .append_child(&span)
                .map_err(|error| SegmentationError::Unavailable(format!("{error:?}")))?;
            measured.push((span.offset_top(), content));
        }

        let mut lines: Vec<(i32, String)> = Vec::new();
        for (top, content) in measured {
            match lines.last_mut() {
                Some((line_top, line)) if *line_top == top => line.push_str(&content),
                _ => lines.push((top, content)),
            }
        }

        target.set_text_content(None);
        let mut units = Vec::with_capacity(lines.len());
        for (_, content) in lines {
            let line = make_span(content.trim_end())?;
            line.set_class_name(LINE_CLASS);
            let _ = line.style().set_property("display", "block");
            target
                .append_child(&line)
                .map_err(|error| SegmentationError::Unavailable(format!("{error:?}")))?;
            units.push(line);
        }

        Ok(units)
    }

    fn play(&self, target: &HtmlElement, tween: &Tween) -> LocalBoxFuture<'static, ()> {
        let element = target.clone();
        let finished = start_animation(target, tween).ok();

        async move {
            if let Some(finished) = finished {
                let _ = JsFuture::from(finished).await;
            }
            set_pose(&element, &Pose::REST);
        }
        .boxed_local()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let timer = JsFuture::from(timeout(duration));
        async move {
            let _ = timer.await;
        }
        .boxed_local()
    }

    fn prefers_reduced_motion(&self) -> bool {
        prefers_reduced_motion()
    }
}

/// Keeps one browser `IntersectionObserver` feeding one engine region.
/// Dropping it disconnects the browser observer and releases the region.
pub struct RegionBinding {
    id: RegionId,
    observer: Rc<RefCell<ViewportObserver>>,
    browser: IntersectionObserver,
    _callback: Closure<dyn FnMut(Array, IntersectionObserver)>,
}

impl RegionBinding {
    pub fn observe(
        observer: &Rc<RefCell<ViewportObserver>>,
        element: &HtmlElement,
        margin_px: f64,
        on_enter: impl FnOnce(RegionId) + 'static,
    ) -> Option<Self> {
        let slot: Rc<RefCell<Option<RegionId>>> = Rc::new(RefCell::new(None));
        let id = {
            let slot = Rc::clone(&slot);
            observer.borrow_mut().observe(margin_px, move || {
                if let Some(id) = *slot.borrow() {
                    on_enter(id);
                }
            })
        };
        *slot.borrow_mut() = Some(id);

        let engine = Rc::clone(observer);
        let callback = Closure::<dyn FnMut(Array, IntersectionObserver)>::new(
            move |entries: Array, browser: IntersectionObserver| {
                let viewport = viewport_size();
                let mut fired = false;
                for entry in entries.iter() {
                    let Ok(entry) = entry.dyn_into::<IntersectionObserverEntry>() else {
                        continue;
                    };
                    // The browser already applied the root margin.
                    if entry.is_intersecting() {
                        fired |= engine.borrow_mut().enter(id);
                        continue;
                    }
                    let bounds = entry.bounding_client_rect();
                    let rect = Rect {
                        top: bounds.top(),
                        left: bounds.left(),
                        bottom: bounds.bottom(),
                        right: bounds.right(),
                    };
                    fired |= engine.borrow_mut().report(id, rect, viewport);
                }
                if fired {
                    browser.disconnect();
                }
                ViewportObserver::dispatch(&engine);
            },
        );

        let init = IntersectionObserverInit::new();
        init.set_root_margin(&format!("{margin_px}px"));
        let Ok(browser) =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)
        else {
            observer.borrow_mut().unobserve(id);
            return None;
        };
        browser.observe(element);

        Some(Self {
            id,
            observer: Rc::clone(observer),
            browser,
            _callback: callback,
        })
    }
}

impl Drop for RegionBinding {
    fn drop(&mut self) {
        self.browser.disconnect();
        if let Ok(mut observer) = self.observer.try_borrow_mut() {
            observer.unobserve(self.id);
        }
    }
}
