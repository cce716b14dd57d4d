use std::cell::RefCell;
use std::rc::Rc;

use gloo_net::http::Request;
use portfolio_engine::contact::{ContactForm, ContactStatus, ContactSubmission};
use portfolio_engine::content::{Experience, Link, Site};
use portfolio_engine::reveal::{RenderHost, RevealHandle, RevealSequencer, RevealSettings, RevealStart};
use portfolio_engine::timeline::{about_cues, hero_cues, panel_cues, section_cues, Cue};
use portfolio_engine::viewport::{header_is_condensed, RegionId, ViewportObserver};
use portfolio_engine::{EngineConfig, LogLevel, Logger, PanelMount, SelectionController, Theme, ThemeResolver};
use serde_json::json;
use wasm_bindgen::{closure::Closure, JsCast};
use wasm_bindgen_futures::spawn_local;
use web_sys::{window, HtmlElement, HtmlInputElement, HtmlTextAreaElement};
use yew::prelude::*;

use crate::browser::{BrowserHost, ColorSchemeQuery, LocalStorageStore, RegionBinding, RootElementMarker};

const REVEAL_ATTRIBUTE: &str = "data-reveal";

type CueBuilder = Rc<dyn Fn() -> Option<Vec<Cue<HtmlElement>>>>;

/// Shared per-page engine state handed down through context.
#[derive(Clone)]
struct Engine {
    observer: Rc<RefCell<ViewportObserver>>,
    host: Rc<BrowserHost>,
    settings: RevealSettings,
    margin_px: f64,
    logger: Logger,
}

impl PartialEq for Engine {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.observer, &other.observer)
    }
}

impl Engine {
    fn new(config: &EngineConfig) -> Self {
        let logger = Logger::new(config.log_level);
        Self {
            observer: Rc::new(RefCell::new(ViewportObserver::new(logger.clone()))),
            host: Rc::new(BrowserHost),
            settings: RevealSettings {
                motion_policy: config.motion_policy,
                time_scale: config.reveal_time_scale,
            },
            margin_px: config.reveal_margin_px,
            logger,
        }
    }
}

fn theme_icon(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "◐",
        Theme::Dark => "◑",
    }
}

fn element(node: &NodeRef) -> Option<HtmlElement> {
    node.cast::<HtmlElement>()
}

fn elements(nodes: &[NodeRef]) -> Vec<HtmlElement> {
    nodes.iter().filter_map(element).collect()
}

/// Puts `region` and every `[data-reveal]` element inside it at rest, so
/// content never stays hidden when a reveal cannot run.
fn reveal_region_now(region: &HtmlElement) {
    if region.has_attribute(REVEAL_ATTRIBUTE) {
        BrowserHost.reveal_now(region);
    }
    let Ok(hidden) = region.query_selector_all(&format!("[{REVEAL_ATTRIBUTE}]")) else {
        return;
    };
    for position in 0..hidden.length() {
        if let Some(element) = hidden
            .item(position)
            .and_then(|node| node.dyn_into::<HtmlElement>().ok())
        {
            BrowserHost.reveal_now(&element);
        }
    }
}

fn start_reveal(
    engine: Engine,
    region: &NodeRef,
    margin_px: f64,
    build_cues: CueBuilder,
    on_start: Option<Callback<RevealHandle>>,
    running: Rc<RefCell<Option<RevealHandle>>>,
) -> Option<RegionBinding> {
    let target = element(region)?;
    let on_enter = {
        let engine = engine.clone();
        let target = target.clone();
        move |id: RegionId| {
            let Some(cues) = build_cues() else {
                engine
                    .logger
                    .warn("reveal_targets_missing", json!({ "region": id.get() }));
                reveal_region_now(&target);
                return;
            };
            let sequencer =
                RevealSequencer::new(id, Rc::clone(&engine.host), engine.settings, engine.logger.clone());
            let start = sequencer.run(&mut engine.observer.borrow_mut(), cues);
            let RevealStart::Started(run) = start else {
                return;
            };

            *running.borrow_mut() = Some(run.handle.clone());
            if let Some(on_start) = on_start {
                on_start.emit(run.handle.clone());
            }
            spawn_local(async move {
                let _ = run.task.await;
            });
        }
    };

    let binding = RegionBinding::observe(&engine.observer, &target, margin_px, on_enter);
    if binding.is_none() {
        engine
            .logger
            .warn("region_observer_unavailable", json!({ "margin_px": margin_px }));
        reveal_region_now(&target);
    }
    binding
}

/// Runs one reveal the first time `region` enters the viewport. Unmounting
/// releases the region and cancels the reveal wherever it stands.
#[hook]
fn use_reveal(
    region: NodeRef,
    margin_px: Option<f64>,
    build_cues: CueBuilder,
    on_start: Option<Callback<RevealHandle>>,
) {
    let engine = use_context::<Engine>();

    use_effect_with((), move |_| {
        let running: Rc<RefCell<Option<RevealHandle>>> = Rc::default();
        let binding = match engine {
            Some(engine) => {
                let margin_px = margin_px.unwrap_or(engine.margin_px);
                start_reveal(engine, &region, margin_px, build_cues, on_start, Rc::clone(&running))
            }
            None => {
                if let Some(target) = element(&region) {
                    reveal_region_now(&target);
                }
                None
            }
        };

        move || {
            drop(binding);
            if let Some(handle) = running.borrow_mut().take() {
                handle.cancel();
            }
        }
    });
}

#[hook]
fn use_node_refs(count: usize) -> Rc<Vec<NodeRef>> {
    use_memo(count, |count| {
        (0..*count).map(|_| NodeRef::default()).collect::<Vec<_>>()
    })
}

/// Section reveal: heading block first, then each body element in turn.
#[hook]
fn use_section_reveal(section: NodeRef, heading: NodeRef, body: Rc<Vec<NodeRef>>) {
    let build: CueBuilder = Rc::new(move || {
        let heading = element(&heading)?;
        Some(section_cues(heading, elements(&body)))
    });
    use_reveal(section, None, build, None);
}

#[derive(Properties, PartialEq)]
struct ExternalLinkProps {
    href: AttrValue,
    label: AttrValue,
}

#[function_component(ExternalLink)]
fn external_link(props: &ExternalLinkProps) -> Html {
    html! {
        <a
            class="link"
            href={props.href.clone()}
            target="_blank"
            rel="noopener noreferrer"
        >
            {props.label.clone()}
            <span class="external-mark" aria-hidden="true">{"↗"}</span>
            <span class="sr-only">{" (opens in a new tab)"}</span>
        </a>
    }
}

fn link_item(link: &Link) -> Html {
    if link.is_external() {
        html! {
            <ExternalLink href={link.href.clone()} label={link.label.clone()} />
        }
    } else {
        html! { <a class="link" href={link.href.clone()}>{link.label.clone()}</a> }
    }
}

const NAV_ITEMS: [(&str, &str); 4] = [
    ("#about", "About"),
    ("#experience", "Experience"),
    ("#gallery", "Gallery"),
    ("#connect", "Connect"),
];

#[derive(Properties, PartialEq)]
struct HeaderProps {
    theme: Theme,
    on_toggle: Callback<MouseEvent>,
}

#[function_component(SiteHeader)]
fn site_header(props: &HeaderProps) -> Html {
    let condensed = use_state_eq(|| false);
    let menu_open = use_state_eq(|| false);

    let on_menu = {
        let menu_open = menu_open.clone();
        Callback::from(move |_: MouseEvent| menu_open.set(!*menu_open))
    };
    let close_menu = {
        let menu_open = menu_open.clone();
        Callback::from(move |_: MouseEvent| menu_open.set(false))
    };
    let menu_icon = if *menu_open { "✕" } else { "☰" };

    {
        let condensed = condensed.clone();
        use_effect_with((), move |_| {
            let listener = window().map(|win| {
                let on_scroll = Closure::<dyn FnMut()>::new(move || {
                    let scroll_y = window().and_then(|w| w.scroll_y().ok()).unwrap_or(0.0);
                    condensed.set(header_is_condensed(scroll_y));
                });
                let _ = win
                    .add_event_listener_with_callback("scroll", on_scroll.as_ref().unchecked_ref());
                (win, on_scroll)
            });

            move || {
                if let Some((win, on_scroll)) = listener {
                    let _ = win.remove_event_listener_with_callback(
                        "scroll",
                        on_scroll.as_ref().unchecked_ref(),
                    );
                }
            }
        });
    }

    html! {
        <header class={classes!("site-header", (*condensed).then_some("is-condensed"))}>
            <a class="wordmark" href="#top">{"KG"}</a>
            <nav
                id="site-nav"
                aria-label="Sections"
                class={classes!((*menu_open).then_some("is-open"))}
            >
                { for NAV_ITEMS.iter().map(|(href, label)| html! {
                    <a href={*href} onclick={close_menu.clone()}>{*label}</a>
                }) }
            </nav>
            <button
                class="menu-toggle"
                type="button"
                aria-label="Toggle menu"
                aria-controls="site-nav"
                aria-expanded={(*menu_open).to_string()}
                onclick={on_menu}
            >
                <span aria-hidden="true">{menu_icon}</span>
            </button>
            <button
                class="theme-toggle"
                type="button"
                aria-label={props.theme.toggle_label()}
                aria-pressed={props.theme.is_dark().to_string()}
                onclick={props.on_toggle.clone()}
            >
                <span aria-hidden="true">{theme_icon(props.theme)}</span>
            </button>
        </header>
    }
}

#[derive(Properties, PartialEq)]
struct SiteProps {
    site: Rc<Site>,
}

#[function_component(Hero)]
fn hero(props: &SiteProps) -> Html {
    let hero = &props.site.hero;
    let section = use_node_ref();
    let heading = use_node_ref();
    let paragraph = use_node_ref();
    let actions = use_node_ref();

    {
        let (heading, paragraph, actions) = (heading.clone(), paragraph.clone(), actions.clone());
        let build: CueBuilder = Rc::new(move || {
            Some(hero_cues(
                element(&heading)?,
                element(&paragraph),
                element(&actions),
            ))
        });
        use_reveal(section.clone(), None, build, None);
    }

    html! {
        <section id="top" class="hero" ref={section}>
            <h1 class="hero-title" ref={heading} data-reveal="">{hero.title.clone()}</h1>
            <p class="hero-description" ref={paragraph} data-reveal="">{hero.description.clone()}</p>
            <div class="hero-actions" ref={actions} data-reveal="">
                { for hero.actions.iter().map(|action| html! {
                    <a
                        class={classes!("button", action.primary.then_some("is-primary"))}
                        href={action.href.clone()}
                    >
                        {action.text.clone()}
                    </a>
                }) }
                <ul class="tag-list">
                    { for hero.tags.iter().map(|tag| html! { <li>{tag.clone()}</li> }) }
                </ul>
                <p class="muted">{format!("Previously at {}", hero.previously_at.join(", "))}</p>
            </div>
        </section>
    }
}

#[function_component(AboutSection)]
fn about_section(props: &SiteProps) -> Html {
    let about = &props.site.about;
    let section = use_node_ref();
    let heading = use_node_ref();
    let portrait = use_node_ref();
    let copy = use_node_ref();

    {
        let (heading, portrait, copy) = (heading.clone(), portrait.clone(), copy.clone());
        let build: CueBuilder = Rc::new(move || {
            Some(about_cues(element(&heading)?, element(&portrait)?, element(&copy)?))
        });
        use_reveal(section.clone(), None, build, None);
    }

    html! {
        <section id="about" class="section-block" ref={section}>
            <h2 ref={heading} data-reveal="">{"About"}</h2>
            <div class="about-grid">
                <div class="about-portrait" ref={portrait} data-reveal="">
                    <img src={about.portrait.clone()} alt="Portrait" loading="lazy" />
                </div>
                <div class="about-copy" ref={copy} data-reveal="">
                    { for about.paragraphs.iter().map(|paragraph| html! { <p>{paragraph.clone()}</p> }) }
                    <ul class="tag-list">
                        { for about.tags.iter().map(|tag| html! { <li>{tag.clone()}</li> }) }
                    </ul>
                </div>
            </div>
        </section>
    }
}

#[derive(Properties, PartialEq)]
struct PanelProps {
    entry: Experience,
    mount: PanelMount,
    on_reveal: Callback<(PanelMount, RevealHandle)>,
}

#[function_component(ExperiencePanel)]
fn experience_panel(props: &PanelProps) -> Html {
    let entry = &props.entry;
    let panel = use_node_ref();
    let items = use_node_refs(entry.points.len());

    {
        let (panel_ref, items) = (panel.clone(), Rc::clone(&items));
        let build: CueBuilder = Rc::new(move || {
            Some(panel_cues(element(&panel_ref)?, elements(&items)))
        });
        let mount = props.mount;
        let on_reveal = props.on_reveal.clone();
        let on_start = Callback::from(move |handle: RevealHandle| on_reveal.emit((mount, handle)));
        use_reveal(panel.clone(), Some(0.0), build, Some(on_start));
    }

    html! {
        <article
            class="experience-panel"
            ref={panel}
            data-reveal=""
            style={format!("--accent: {};", entry.color)}
        >
            <header>
                <h3>{format!("{} · {}", entry.position, entry.company)}</h3>
                <p class="muted">{format!("{} · {}", entry.dates, entry.location)}</p>
            </header>
            <ul class="experience-points">
                { for entry.points.iter().zip(items.iter()).map(|(point, item)| html! {
                    <li ref={item.clone()} data-reveal="">{point.clone()}</li>
                }) }
            </ul>
            <ul class="tag-list">
                { for entry.skills.iter().map(|skill| html! { <li>{skill.clone()}</li> }) }
            </ul>
        </article>
    }
}

#[derive(Properties, PartialEq)]
struct ExperienceProps {
    entries: Vec<Experience>,
}

#[function_component(ExperienceSection)]
fn experience_section(props: &ExperienceProps) -> Html {
    let logger = use_context::<Engine>()
        .map(|engine| engine.logger)
        .unwrap_or_else(Logger::silent);
    let controller = {
        let entries = props.entries.clone();
        use_mut_ref(move || SelectionController::new(entries, logger).ok())
    };
    let mount = use_state(|| PanelMount {
        index: 0,
        generation: 0,
    });
    let section = use_node_ref();
    let heading = use_node_ref();
    let body = use_node_refs(1);
    use_section_reveal(section.clone(), heading.clone(), Rc::clone(&body));

    {
        let controller = controller.clone();
        use_effect_with((), move |_| {
            move || {
                if let Some(selection) = controller.borrow_mut().as_mut() {
                    selection.detach();
                }
            }
        });
    }

    let on_select = {
        let controller = controller.clone();
        let mount = mount.clone();
        Callback::from(move |index: usize| {
            let selected = controller.borrow_mut().as_mut().map(|selection| {
                selection.select(isize::try_from(index).unwrap_or(isize::MAX))
            });
            if let Some(Ok(next)) = selected {
                mount.set(next);
            }
        })
    };

    let on_reveal = {
        let controller = controller.clone();
        Callback::from(move |(mount, handle): (PanelMount, RevealHandle)| {
            if let Some(selection) = controller.borrow_mut().as_mut() {
                selection.attach(mount, handle);
            }
        })
    };

    let current = props.entries.get(mount.index).cloned();

    html! {
        <section id="experience" class="section-block" ref={section}>
            <h2 ref={heading} data-reveal="">{"Experience"}</h2>
            <div class="experience-tabs" role="tablist" ref={body[0].clone()} data-reveal="">
                { for props.entries.iter().enumerate().map(|(index, entry)| {
                    let on_select = on_select.clone();
                    let selected = index == mount.index;
                    html! {
                        <button
                            type="button"
                            role="tab"
                            class={classes!("experience-tab", selected.then_some("is-active"))}
                            aria-selected={selected.to_string()}
                            onclick={Callback::from(move |_| on_select.emit(index))}
                        >
                            <img src={entry.logo.clone()} alt="" aria-hidden="true" loading="lazy" />
                            {entry.company.clone()}
                        </button>
                    }
                }) }
            </div>
            // The panel runs its own reveal; the wrapper stays visible.
            <div class="experience-detail">
                if let Some(entry) = current {
                    <ExperiencePanel
                        key={mount.generation.to_string()}
                        entry={entry}
                        mount={*mount}
                        on_reveal={on_reveal}
                    />
                }
            </div>
        </section>
    }
}

#[function_component(GallerySection)]
fn gallery_section(props: &SiteProps) -> Html {
    let gallery = &props.site.gallery;
    let section = use_node_ref();
    let heading = use_node_ref();
    let body = use_node_refs(gallery.photos.len() + gallery.videos.len());
    use_section_reveal(section.clone(), heading.clone(), Rc::clone(&body));

    let (photo_refs, video_refs) = body.split_at(gallery.photos.len());

    html! {
        <section id="gallery" class="section-block" ref={section}>
            <h2 ref={heading} data-reveal="">{"Gallery"}</h2>
            <div class="gallery-grid">
                { for gallery.photos.iter().zip(photo_refs.iter()).map(|(photo, node)| html! {
                    <img ref={node.clone()} data-reveal="" src={photo.clone()} alt="" loading="lazy" />
                }) }
                { for gallery.videos.iter().zip(video_refs.iter()).map(|(video, node)| html! {
                    <video
                        ref={node.clone()}
                        data-reveal=""
                        src={video.clone()}
                        muted=true
                        loop=true
                        playsinline=true
                        autoplay=true
                    />
                }) }
            </div>
        </section>
    }
}

fn field_value(event: &InputEvent) -> String {
    let Some(target) = event.target() else {
        return String::new();
    };
    if let Some(input) = target.dyn_ref::<HtmlInputElement>() {
        return input.value();
    }
    target
        .dyn_ref::<HtmlTextAreaElement>()
        .map(HtmlTextAreaElement::value)
        .unwrap_or_default()
}

async fn send_message(endpoint: &str, submission: &ContactSubmission) -> Result<(), String> {
    let response = Request::post(endpoint)
        .header("Accept", "application/json")
        .json(submission)
        .map_err(|error| error.to_string())?
        .send()
        .await
        .map_err(|error| error.to_string())?;

    if response.ok() {
        Ok(())
    } else {
        Err(format!("relay answered {}", response.status()))
    }
}

#[derive(Properties, PartialEq)]
struct ContactProps {
    site: Rc<Site>,
    endpoint: AttrValue,
}

#[function_component(ContactSection)]
fn contact_section(props: &ContactProps) -> Html {
    let logger = use_context::<Engine>()
        .map(|engine| engine.logger)
        .unwrap_or_else(Logger::silent);
    let form = use_state(ContactForm::default);
    let status = use_state(ContactStatus::default);
    let section = use_node_ref();
    let heading = use_node_ref();
    let body = use_node_refs(2);
    use_section_reveal(section.clone(), heading.clone(), Rc::clone(&body));

    let on_field = |apply: fn(&mut ContactForm, String)| {
        let form = form.clone();
        Callback::from(move |event: InputEvent| {
            let mut next = (*form).clone();
            apply(&mut next, field_value(&event));
            form.set(next);
        })
    };

    let onsubmit = {
        let form = form.clone();
        let status = status.clone();
        let endpoint = props.endpoint.to_string();
        Callback::from(move |event: SubmitEvent| {
            event.prevent_default();
            let Ok(sending) = status.begin() else {
                return;
            };
            let submission = match form.validate() {
                Ok(submission) => submission,
                Err(error) => {
                    status.set(ContactStatus::Failed(error.to_string()));
                    return;
                }
            };
            status.set(sending);

            let (form, status, endpoint, logger) =
                (form.clone(), status.clone(), endpoint.clone(), logger.clone());
            spawn_local(async move {
                let result = send_message(&endpoint, &submission).await;
                match &result {
                    Ok(()) => {
                        logger.info("contact_sent", json!({ "endpoint": endpoint }));
                        form.set(ContactForm::default());
                    }
                    Err(reason) => {
                        logger.warn("contact_failed", json!({ "error": reason }));
                    }
                }
                status.set(ContactStatus::finish(result));
            });
        })
    };

    let status_line = match &*status {
        ContactStatus::Idle => html! {},
        ContactStatus::Sending => html! { <p class="form-status" role="status">{"Sending…"}</p> },
        ContactStatus::Sent => html! {
            <p class="form-status is-sent" role="status">{"Thanks, your message is on its way."}</p>
        },
        ContactStatus::Failed(reason) => html! {
            <p class="form-status is-failed" role="alert">{reason.clone()}</p>
        },
    };

    html! {
        <section id="connect" class="section-block" ref={section}>
            <h2 ref={heading} data-reveal="">{"Let's Connect"}</h2>
            <form class="contact-form" ref={body[0].clone()} data-reveal="" onsubmit={onsubmit}>
                <label>
                    {"Organization"}
                    <input
                        type="text"
                        value={form.organization.clone()}
                        oninput={on_field(|form, value| form.organization = value)}
                    />
                </label>
                <label>
                    {"Name"}
                    <input
                        type="text"
                        required=true
                        value={form.name.clone()}
                        oninput={on_field(|form, value| form.name = value)}
                    />
                </label>
                <label>
                    {"Email"}
                    <input
                        type="email"
                        required=true
                        value={form.email.clone()}
                        oninput={on_field(|form, value| form.email = value)}
                    />
                </label>
                <label>
                    {"Message"}
                    <textarea
                        required=true
                        rows="5"
                        value={form.message.clone()}
                        oninput={on_field(|form, value| form.message = value)}
                    />
                </label>
                <button class="button is-primary" type="submit" disabled={status.is_sending()}>
                    {"Send"}
                </button>
                {status_line}
            </form>
            <ul class="row-list" ref={body[1].clone()} data-reveal="">
                { for props.site.links.iter().map(|link| html! { <li>{link_item(link)}</li> }) }
            </ul>
        </section>
    }
}

#[derive(Properties, PartialEq)]
struct AppProps {
    config: EngineConfig,
    site: Rc<Site>,
}

#[function_component(App)]
fn app(props: &AppProps) -> Html {
    let engine = use_memo((), {
        let config = props.config.clone();
        move |_| Engine::new(&config)
    });
    let resolver = {
        let logger = engine.logger.clone();
        use_mut_ref(move || ThemeResolver::new(LocalStorageStore, RootElementMarker, logger))
    };
    let theme = {
        let resolver = resolver.clone();
        use_state(move || resolver.borrow_mut().resolve(&ColorSchemeQuery))
    };

    let on_toggle = {
        let theme = theme.clone();
        Callback::from(move |_| {
            let next = resolver.borrow_mut().toggle(*theme);
            theme.set(next);
        })
    };

    let endpoint = props
        .config
        .contact_endpoint
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| props.site.contact.endpoint.clone());

    html! {
        <ContextProvider<Engine> context={(*engine).clone()}>
            <a class="skip-link" href="#content">{"Skip to main content"}</a>
            <div class="page-shell">
                <SiteHeader theme={*theme} on_toggle={on_toggle} />
                <main id="content">
                    <Hero site={Rc::clone(&props.site)} />
                    <AboutSection site={Rc::clone(&props.site)} />
                    <ExperienceSection entries={props.site.experience.clone()} />
                    <GallerySection site={Rc::clone(&props.site)} />
                    <ContactSection site={Rc::clone(&props.site)} endpoint={endpoint} />
                </main>
            </div>
        </ContextProvider<Engine>>
    }
}

/// `REVEAL_MARGIN_PX` is read from `data-reveal-margin-px`.
fn data_attribute(key: &str) -> String {
    format!("data-{}", key.to_ascii_lowercase().replace('_', "-"))
}

pub fn run() {
    let Some(root) = window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id("app"))
    else {
        Logger::new(LogLevel::Warn).warn("mount_point_missing", json!({ "id": "app" }));
        return;
    };

    let config = EngineConfig::from_lookup(|key| root.get_attribute(&data_attribute(key)));
    let logger = Logger::new(config.log_level);
    let site = match Site::embedded() {
        Ok(site) => Rc::new(site),
        Err(error) => {
            logger.warn("content_invalid", json!({ "error": error.to_string() }));
            return;
        }
    };

    logger.debug(
        "engine_configured",
        json!({
            "reveal_margin_px": config.reveal_margin_px,
            "reveal_time_scale": config.reveal_time_scale,
            "motion_policy": config.motion_policy.as_str(),
        }),
    );
    yew::Renderer::<App>::with_root_and_props(root, AppProps { config, site }).render();
}
