use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures_util::future::{join_all, AbortHandle, Abortable, LocalBoxFuture};
use futures_util::FutureExt;
use serde_json::json;
use thiserror::Error;

use crate::telemetry::Logger;
use crate::timeline::{schedule, Cue, CueTarget, ExpandedCue, Pose, RevealTimeline, Tween};
use crate::viewport::{RegionId, ViewportObserver};

/// Share of the normal timing kept under [`MotionPolicy::Shorten`].
const SHORTENED_TIME_SCALE: f64 = 0.2;

/// What to do with reveals when the host asks for reduced motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionPolicy {
    /// Play the full timeline anyway.
    Animate,
    /// Play the timeline at a fraction of its length.
    Shorten,
    /// Show every unit at rest immediately.
    Suppress,
}

impl MotionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Animate => "animate",
            Self::Shorten => "shorten",
            Self::Suppress => "suppress",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "animate" => Some(Self::Animate),
            "shorten" => Some(Self::Shorten),
            "suppress" => Some(Self::Suppress),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("line measurement is unavailable: {0}")]
    Unavailable(String),
    #[error("text produced no line boxes")]
    NoLines,
}

/// Everything the sequencer needs from the rendering host. The sequencer
/// decides order and timing; interpolation is the host's job.
pub trait RenderHost {
    type Target: Clone + 'static;

    /// Applies `pose` immediately, with no transition.
    fn conceal(&self, target: &Self::Target, pose: &Pose);

    /// Puts `target` at rest immediately.
    fn reveal_now(&self, target: &Self::Target);

    /// Resolves once web fonts have loaded and metrics are final.
    fn fonts_ready(&self) -> LocalBoxFuture<'static, ()>;

    /// Splits a text element into line boxes using current font metrics.
    fn split_lines(&self, target: &Self::Target)
        -> Result<Vec<Self::Target>, SegmentationError>;

    /// Starts the tween now; resolves when it finishes.
    fn play(&self, target: &Self::Target, tween: &Tween) -> LocalBoxFuture<'static, ()>;

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    fn prefers_reduced_motion(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RevealSettings {
    pub motion_policy: MotionPolicy,
    pub time_scale: f64,
}

impl Default for RevealSettings {
    fn default() -> Self {
        Self {
            motion_policy: MotionPolicy::Suppress,
            time_scale: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    Finished { units: usize },
    Cancelled,
}

/// Cancels an in-flight reveal. Cancelling twice, or after the reveal
/// finished, does nothing.
#[derive(Clone, Debug)]
pub struct RevealHandle {
    region: RegionId,
    abort: AbortHandle,
    logger: Logger,
}

impl RevealHandle {
    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn cancel(&self) {
        if self.abort.is_aborted() {
            return;
        }
        self.abort.abort();
        self.logger
            .debug("reveal_cancelled", json!({ "region": self.region.get() }));
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// A started reveal: the caller drives `task` on its executor and keeps
/// `handle` for unmount.
pub struct RevealRun {
    pub task: LocalBoxFuture<'static, RevealOutcome>,
    pub handle: RevealHandle,
}

impl std::fmt::Debug for RevealRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealRun")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum RevealStart {
    Started(RevealRun),
    /// The owning region has not entered the viewport yet.
    NotArmed,
    /// A reveal was already started for this region, by this sequencer or
    /// an earlier one.
    AlreadyRan,
}

/// Drives the one reveal of one region.
pub struct RevealSequencer<H: RenderHost> {
    region: RegionId,
    host: Rc<H>,
    settings: RevealSettings,
    logger: Logger,
    started: Cell<bool>,
    timeline: Rc<RefCell<RevealTimeline>>,
}

impl<H> RevealSequencer<H>
where
    H: RenderHost + 'static,
{
    pub fn new(region: RegionId, host: Rc<H>, settings: RevealSettings, logger: Logger) -> Self {
        Self {
            region,
            host,
            settings,
            logger,
            started: Cell::new(false),
            timeline: Rc::new(RefCell::new(RevealTimeline::default())),
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn has_started(&self) -> bool {
        self.started.get()
    }

    /// Unit states. Empty until segmentation has produced the units.
    pub fn timeline(&self) -> Ref<'_, RevealTimeline> {
        self.timeline.borrow()
    }

    /// Hides every target right away, so nothing flashes while fonts load,
    /// and returns the rest of the reveal as a task.
    ///
    /// The task awaits font readiness before measuring lines; text that
    /// cannot be measured is revealed as one unit.
    pub fn run(&self, observer: &mut ViewportObserver, cues: Vec<Cue<H::Target>>) -> RevealStart {
        if !observer.has_fired(self.region) {
            return RevealStart::NotArmed;
        }
        if !observer.claim(self.region) {
            return RevealStart::AlreadyRan;
        }
        self.started.set(true);

        for cue in &cues {
            for target in cue.targets() {
                self.host.conceal(target, &cue.motion.from);
            }
        }

        let (abort, registration) = AbortHandle::new_pair();
        let handle = RevealHandle {
            region: self.region,
            abort,
            logger: self.logger.clone(),
        };
        let body = drive(
            self.region,
            Rc::clone(&self.host),
            self.settings,
            self.logger.clone(),
            Rc::clone(&self.timeline),
            cues,
        );
        let task = async move {
            match Abortable::new(body, registration).await {
                Ok(outcome) => outcome,
                Err(_aborted) => RevealOutcome::Cancelled,
            }
        }
        .boxed_local();

        RevealStart::Started(RevealRun { task, handle })
    }
}

async fn drive<H>(
    region: RegionId,
    host: Rc<H>,
    settings: RevealSettings,
    logger: Logger,
    timeline: Rc<RefCell<RevealTimeline>>,
    cues: Vec<Cue<H::Target>>,
) -> RevealOutcome
where
    H: RenderHost + 'static,
{
    if cues
        .iter()
        .any(|cue| matches!(cue.target, CueTarget::Text(_)))
    {
        host.fonts_ready().await;
    }

    let expanded = expand_cues(region, host.as_ref(), &logger, cues);
    let policy = if host.prefers_reduced_motion() {
        settings.motion_policy
    } else {
        MotionPolicy::Animate
    };
    let time_scale = match policy {
        MotionPolicy::Shorten => settings.time_scale * SHORTENED_TIME_SCALE,
        MotionPolicy::Animate | MotionPolicy::Suppress => settings.time_scale,
    };
    let plan = schedule(expanded, time_scale);
    let units = plan.len();
    *timeline.borrow_mut() = RevealTimeline::new(units);

    logger.debug(
        "reveal_started",
        json!({ "region": region.get(), "units": units, "policy": policy.as_str() }),
    );

    if policy == MotionPolicy::Suppress {
        for unit in &plan {
            let mut timeline = timeline.borrow_mut();
            timeline.begin(unit.index);
            host.reveal_now(&unit.target);
            timeline.complete(unit.index);
        }
    } else {
        let mut clock = Duration::ZERO;
        let mut in_flight = Vec::with_capacity(units);

        for unit in plan {
            if unit.start > clock {
                host.sleep(unit.start - clock).await;
                clock = unit.start;
            }

            let index = unit.index;
            timeline.borrow_mut().begin(index);
            let finished = host.play(&unit.target, &unit.tween);
            let timeline = Rc::clone(&timeline);
            in_flight.push(async move {
                finished.await;
                timeline.borrow_mut().complete(index);
            });
        }

        join_all(in_flight).await;
    }

    logger.debug(
        "reveal_finished",
        json!({ "region": region.get(), "units": units }),
    );
    RevealOutcome::Finished { units }
}

fn expand_cues<H: RenderHost>(
    region: RegionId,
    host: &H,
    logger: &Logger,
    cues: Vec<Cue<H::Target>>,
) -> Vec<ExpandedCue<H::Target>> {
    cues.into_iter()
        .map(|cue| {
            let units = match cue.target {
                CueTarget::Text(block) => match host.split_lines(&block) {
                    Ok(lines) if !lines.is_empty() => {
                        for line in &lines {
                            host.conceal(line, &cue.motion.from);
                        }
                        host.reveal_now(&block);
                        lines
                    }
                    Ok(_) => degrade(region, logger, block, &SegmentationError::NoLines),
                    Err(error) => degrade(region, logger, block, &error),
                },
                CueTarget::Group(targets) => targets,
                CueTarget::Block(target) => vec![target],
            };

            ExpandedCue {
                units,
                anchor: cue.anchor,
                motion: cue.motion,
            }
        })
        .collect()
}

fn degrade<T>(region: RegionId, logger: &Logger, block: T, error: &SegmentationError) -> Vec<T> {
    logger.warn(
        "reveal_segmentation_degraded",
        json!({ "region": region.get(), "error": error.to_string() }),
    );
    vec![block]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::telemetry::tests::{capturing_logger, events};
    use crate::telemetry::LogLevel;
    use crate::timeline::{hero_cues, panel_cues, UnitState};
    use crate::viewport::{Rect, ViewportSize};
    use tokio::sync::watch;
    use tokio::time::Instant;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum HostCall {
        Conceal(String),
        RevealNow(String),
        Play(String, Duration),
    }

    /// Host backed by tokio's clock. Text targets split on `|`.
    pub(crate) struct FakeHost {
        pub(crate) calls: RefCell<Vec<HostCall>>,
        started_at: Instant,
        fonts: watch::Receiver<bool>,
        pub(crate) measurable: Cell<bool>,
        pub(crate) reduced_motion: Cell<bool>,
    }

    impl FakeHost {
        pub(crate) fn new(fonts_loaded: bool) -> (Rc<Self>, watch::Sender<bool>) {
            let (sender, fonts) = watch::channel(fonts_loaded);
            let host = Rc::new(Self {
                calls: RefCell::new(Vec::new()),
                started_at: Instant::now(),
                fonts,
                measurable: Cell::new(true),
                reduced_motion: Cell::new(false),
            });
            (host, sender)
        }

        pub(crate) fn plays(&self) -> Vec<(String, Duration)> {
            self.calls
                .borrow()
                .iter()
                .filter_map(|call| match call {
                    HostCall::Play(target, at) => Some((target.clone(), *at)),
                    _ => None,
                })
                .collect()
        }
    }

    impl RenderHost for FakeHost {
        type Target = String;

        fn conceal(&self, target: &String, _pose: &Pose) {
            self.calls.borrow_mut().push(HostCall::Conceal(target.clone()));
        }

        fn reveal_now(&self, target: &String) {
            self.calls
                .borrow_mut()
                .push(HostCall::RevealNow(target.clone()));
        }

        fn fonts_ready(&self) -> LocalBoxFuture<'static, ()> {
            let mut fonts = self.fonts.clone();
            async move {
                let _ = fonts.wait_for(|loaded| *loaded).await;
            }
            .boxed_local()
        }

        fn split_lines(&self, target: &String) -> Result<Vec<String>, SegmentationError> {
            if !self.measurable.get() {
                return Err(SegmentationError::Unavailable("no layout".to_string()));
            }
            Ok(target.split('|').map(ToString::to_string).collect())
        }

        fn play(&self, target: &String, tween: &Tween) -> LocalBoxFuture<'static, ()> {
            self.calls.borrow_mut().push(HostCall::Play(
                target.clone(),
                self.started_at.elapsed(),
            ));
            tokio::time::sleep(tween.duration).boxed_local()
        }

        fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
            tokio::time::sleep(duration).boxed_local()
        }

        fn prefers_reduced_motion(&self) -> bool {
            self.reduced_motion.get()
        }
    }

    pub(crate) fn fired_region(observer: &mut ViewportObserver) -> RegionId {
        let id = observer.observe(0.0, || {});
        observer.report(
            id,
            Rect {
                top: 0.0,
                left: 0.0,
                bottom: 100.0,
                right: 100.0,
            },
            ViewportSize {
                width: 800.0,
                height: 600.0,
            },
        );
        id
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn hero() -> Vec<Cue<String>> {
        hero_cues(
            "Kevin|Gerges".to_string(),
            Some("bio".to_string()),
            Some("cta".to_string()),
        )
    }

    fn started(start: RevealStart) -> RevealRun {
        match start {
            RevealStart::Started(run) => run,
            other => panic!("reveal did not start: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_before_region_fires_is_refused() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = observer.observe(-100.0, || {});
        let (host, _fonts) = FakeHost::new(true);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());

        assert!(matches!(sequencer.run(&mut observer, hero()), RevealStart::NotArmed));
        assert!(host.calls.borrow().is_empty());
        assert!(!sequencer.has_started());
    }

    #[tokio::test(start_paused = true)]
    async fn hero_plays_lines_in_stagger_order_then_followers() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());

        let run = started(sequencer.run(&mut observer, hero()));
        assert_eq!(run.task.await, RevealOutcome::Finished { units: 4 });

        assert_eq!(
            host.plays(),
            vec![
                ("Kevin".to_string(), ms(300)),
                ("Gerges".to_string(), ms(420)),
                ("bio".to_string(), ms(820)),
                ("cta".to_string(), ms(1020)),
            ]
        );
        assert!(sequencer.timeline().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_a_no_op() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());

        started(sequencer.run(&mut observer, hero())).task.await;
        let calls_after_first = host.calls.borrow().len();

        assert!(matches!(sequencer.run(&mut observer, hero()), RevealStart::AlreadyRan));
        assert_eq!(host.calls.borrow().len(), calls_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_sequencer_on_a_revealed_region_does_nothing() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        let first =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());
        started(first.run(&mut observer, hero())).task.await;
        let calls_after_first = host.calls.borrow().len();

        let remounted =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());
        assert!(matches!(
            remounted.run(&mut observer, hero()),
            RevealStart::AlreadyRan
        ));
        assert!(!remounted.has_started());
        assert_eq!(host.calls.borrow().len(), calls_after_first);
        assert_eq!(host.plays().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn targets_stay_hidden_until_fonts_are_ready() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, fonts) = FakeHost::new(false);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());

        let run = started(sequencer.run(&mut observer, hero()));
        // concealed synchronously, before the task is ever polled
        assert_eq!(
            *host.calls.borrow(),
            vec![
                HostCall::Conceal("Kevin|Gerges".to_string()),
                HostCall::Conceal("bio".to_string()),
                HostCall::Conceal("cta".to_string()),
            ]
        );

        let driver = async {
            tokio::time::sleep(ms(5_000)).await;
            assert!(host.plays().is_empty());
            assert!(sequencer.timeline().is_empty());
            let _ = fonts.send(true);
        };
        let (outcome, ()) = tokio::join!(run.task, driver);

        assert_eq!(outcome, RevealOutcome::Finished { units: 4 });
        let calls = host.calls.borrow();
        let split_at = calls
            .iter()
            .position(|call| *call == HostCall::RevealNow("Kevin|Gerges".to_string()))
            .expect("container shown after split");
        assert!(calls[..split_at].contains(&HostCall::Conceal("Kevin".to_string())));
        assert!(calls[..split_at].contains(&HostCall::Conceal("Gerges".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn unmeasurable_text_degrades_to_one_unit() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        host.measurable.set(false);
        let (logger, lines) = capturing_logger(LogLevel::Info);
        let sequencer = RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), logger);

        let outcome = started(sequencer.run(&mut observer, hero())).task.await;

        assert_eq!(outcome, RevealOutcome::Finished { units: 3 });
        assert_eq!(host.plays()[0], ("Kevin|Gerges".to_string(), ms(300)));
        assert!(events(&lines).contains(&"reveal_segmentation_degraded".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_state_writes() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());
        let run = started(sequencer.run(&mut observer, hero()));
        let handle = run.handle.clone();

        let driver = async {
            tokio::time::sleep(ms(450)).await;
            handle.cancel();
        };
        let (outcome, ()) = tokio::join!(run.task, driver);
        assert_eq!(outcome, RevealOutcome::Cancelled);

        let frozen = sequencer.timeline().clone();
        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(*sequencer.timeline(), frozen);
        assert_eq!(
            frozen.states(),
            &[
                UnitState::Animating,
                UnitState::Animating,
                UnitState::Hidden,
                UnitState::Hidden,
            ]
        );
        assert_eq!(host.plays().len(), 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn reduced_motion_suppress_shows_everything_at_rest() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        host.reduced_motion.set(true);
        let sequencer =
            RevealSequencer::new(region, Rc::clone(&host), RevealSettings::default(), Logger::silent());
        let begun = Instant::now();

        let outcome = started(sequencer.run(&mut observer, hero())).task.await;

        assert_eq!(outcome, RevealOutcome::Finished { units: 4 });
        assert!(host.plays().is_empty());
        assert!(sequencer.timeline().is_complete());
        assert_eq!(begun.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reduced_motion_shorten_compresses_the_timeline() {
        let mut observer = ViewportObserver::new(Logger::silent());
        let region = fired_region(&mut observer);
        let (host, _fonts) = FakeHost::new(true);
        host.reduced_motion.set(true);
        let settings = RevealSettings {
            motion_policy: MotionPolicy::Shorten,
            time_scale: 1.0,
        };
        let sequencer = RevealSequencer::new(region, Rc::clone(&host), settings, Logger::silent());

        started(sequencer.run(&mut observer, panel_cues("card".to_string(), vec!["a".to_string(), "b".to_string()])))
            .task
            .await;

        assert_eq!(
            host.plays(),
            vec![
                ("card".to_string(), ms(0)),
                ("a".to_string(), ms(0)),
                ("b".to_string(), ms(20)),
            ]
        );
    }
}
