//! Reveal timelines: what each unit looks like before it enters, when it
//! starts, and which state it is in.
//!
//! Cue placement follows the usual timeline position rules: a cue either
//! starts at an absolute offset or overlaps the tail of everything placed
//! before it. Staggered cues offset each successive unit by a fixed delay.

use std::time::Duration;

/// Easing handed to the host animation primitive (a `power3.out` curve).
pub const REVEAL_EASING: &str = "cubic-bezier(0.215, 0.61, 0.355, 1)";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Length {
    Px(f64),
    Percent(f64),
}

impl Length {
    pub fn to_css(self) -> String {
        match self {
            Self::Px(value) => format!("{value}px"),
            Self::Percent(value) => format!("{value}%"),
        }
    }
}

/// Visual state of a unit: opacity, offset, blur.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub opacity: f64,
    pub translate_x: Length,
    pub translate_y: Length,
    pub blur_px: f64,
}

impl Pose {
    pub const REST: Pose = Pose {
        opacity: 1.0,
        translate_x: Length::Px(0.0),
        translate_y: Length::Px(0.0),
        blur_px: 0.0,
    };

    pub const fn hidden() -> Self {
        Self {
            opacity: 0.0,
            translate_x: Length::Px(0.0),
            translate_y: Length::Px(0.0),
            blur_px: 0.0,
        }
    }

    pub const fn rise(self, by: Length) -> Self {
        Self {
            translate_y: by,
            ..self
        }
    }

    pub const fn slide(self, by: Length) -> Self {
        Self {
            translate_x: by,
            ..self
        }
    }

    pub const fn blurred(self, px: f64) -> Self {
        Self {
            blur_px: px,
            ..self
        }
    }

    pub fn transform_css(&self) -> String {
        format!(
            "translate({}, {})",
            self.translate_x.to_css(),
            self.translate_y.to_css()
        )
    }

    pub fn filter_css(&self) -> String {
        format!("blur({}px)", self.blur_px)
    }
}

/// How one cue's units move from their start pose to rest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motion {
    pub from: Pose,
    pub duration: Duration,
    pub stagger: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Absolute offset from the timeline start.
    At(Duration),
    /// Starts this long before the current timeline end.
    BeforeEnd(Duration),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CueTarget<T> {
    /// Text block split into line boxes once fonts are ready.
    Text(T),
    /// Already-discrete elements revealed one after another.
    Group(Vec<T>),
    /// A single element revealed as a whole.
    Block(T),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cue<T> {
    pub target: CueTarget<T>,
    pub anchor: Anchor,
    pub motion: Motion,
}

impl<T> Cue<T> {
    /// Every element this cue touches before segmentation.
    pub fn targets(&self) -> Vec<&T> {
        match &self.target {
            CueTarget::Text(target) | CueTarget::Block(target) => vec![target],
            CueTarget::Group(targets) => targets.iter().collect(),
        }
    }
}

/// A cue whose text has already been segmented.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedCue<T> {
    pub units: Vec<T>,
    pub anchor: Anchor,
    pub motion: Motion,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tween {
    pub from: Pose,
    pub to: Pose,
    pub duration: Duration,
    pub easing: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledUnit<T> {
    pub index: usize,
    pub target: T,
    pub start: Duration,
    pub tween: Tween,
}

fn scaled(duration: Duration, scale: f64) -> Duration {
    duration.mul_f64(scale.max(0.0))
}

/// Lays expanded cues out on one timeline.
///
/// Start offsets never decrease with unit index: an overlap that would pull
/// a unit before its predecessor is clamped to the predecessor's start.
pub fn schedule<T>(cues: Vec<ExpandedCue<T>>, time_scale: f64) -> Vec<ScheduledUnit<T>> {
    let mut units = Vec::new();
    let mut end = Duration::ZERO;
    let mut last_start = Duration::ZERO;

    for cue in cues {
        let anchor = match cue.anchor {
            Anchor::At(offset) => scaled(offset, time_scale),
            Anchor::BeforeEnd(overlap) => end.saturating_sub(scaled(overlap, time_scale)),
        };
        let duration = scaled(cue.motion.duration, time_scale);
        let stagger = scaled(cue.motion.stagger, time_scale);

        for (position, target) in cue.units.into_iter().enumerate() {
            let offset = stagger.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX));
            let start = (anchor + offset).max(last_start);
            last_start = start;
            end = end.max(start + duration);

            units.push(ScheduledUnit {
                index: units.len(),
                target,
                start,
                tween: Tween {
                    from: cue.motion.from,
                    to: Pose::REST,
                    duration,
                    easing: REVEAL_EASING,
                },
            });
        }
    }

    units
}

/// Total length of a schedule.
pub fn schedule_end<T>(units: &[ScheduledUnit<T>]) -> Duration {
    units
        .iter()
        .map(|unit| unit.start + unit.tween.duration)
        .max()
        .unwrap_or(Duration::ZERO)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnitState {
    Hidden,
    Animating,
    Visible,
}

/// Per-unit state, forward-only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealTimeline {
    states: Vec<UnitState>,
}

impl RevealTimeline {
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![UnitState::Hidden; len],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[UnitState] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<UnitState> {
        self.states.get(index).copied()
    }

    pub fn is_complete(&self) -> bool {
        !self.states.is_empty() && self.states.iter().all(|state| *state == UnitState::Visible)
    }

    /// Hidden → Animating. Returns false and leaves the unit alone otherwise.
    pub fn begin(&mut self, index: usize) -> bool {
        self.advance(index, UnitState::Hidden, UnitState::Animating)
    }

    /// Animating → Visible. Returns false and leaves the unit alone otherwise.
    pub fn complete(&mut self, index: usize) -> bool {
        self.advance(index, UnitState::Animating, UnitState::Visible)
    }

    fn advance(&mut self, index: usize, from: UnitState, to: UnitState) -> bool {
        match self.states.get_mut(index) {
            Some(state) if *state == from => {
                *state = to;
                true
            }
            _ => false,
        }
    }
}

/// Hero: heading lines rise out of a blur, then the paragraph and the
/// call-to-action group fade up while the last lines are still settling.
pub fn hero_cues<T>(heading: T, paragraph: Option<T>, actions: Option<T>) -> Vec<Cue<T>> {
    let follow = Motion {
        from: Pose::hidden().rise(Length::Px(10.0)),
        duration: Duration::from_millis(500),
        stagger: Duration::ZERO,
    };
    let mut cues = vec![Cue {
        target: CueTarget::Text(heading),
        anchor: Anchor::At(Duration::from_millis(300)),
        motion: Motion {
            from: Pose::hidden().rise(Length::Percent(20.0)).blurred(8.0),
            duration: Duration::from_millis(800),
            stagger: Duration::from_millis(120),
        },
    }];

    if let Some(paragraph) = paragraph {
        cues.push(Cue {
            target: CueTarget::Block(paragraph),
            anchor: Anchor::BeforeEnd(Duration::from_millis(400)),
            motion: follow,
        });
    }
    if let Some(actions) = actions {
        cues.push(Cue {
            target: CueTarget::Block(actions),
            anchor: Anchor::BeforeEnd(Duration::from_millis(300)),
            motion: follow,
        });
    }

    cues
}

/// Section: the heading block fades up, body elements follow one by one.
pub fn section_cues<T>(heading: T, body: Vec<T>) -> Vec<Cue<T>> {
    let mut cues = vec![Cue {
        target: CueTarget::Block(heading),
        anchor: Anchor::At(Duration::ZERO),
        motion: Motion {
            from: Pose::hidden().rise(Length::Px(30.0)),
            duration: Duration::from_millis(600),
            stagger: Duration::ZERO,
        },
    }];

    if !body.is_empty() {
        cues.push(Cue {
            target: CueTarget::Group(body),
            anchor: Anchor::At(Duration::from_millis(100)),
            motion: Motion {
                from: Pose::hidden().rise(Length::Px(20.0)),
                duration: Duration::from_millis(500),
                stagger: Duration::from_millis(100),
            },
        });
    }

    cues
}

/// About: heading fades up while the portrait slides in from the left and
/// the copy column from the right, 100 ms behind.
pub fn about_cues<T>(heading: T, portrait: T, copy: T) -> Vec<Cue<T>> {
    let side = |target: T, from_px: f64, delay: Duration| Cue {
        target: CueTarget::Block(target),
        anchor: Anchor::At(delay),
        motion: Motion {
            from: Pose::hidden().slide(Length::Px(from_px)),
            duration: Duration::from_millis(600),
            stagger: Duration::ZERO,
        },
    };

    vec![
        Cue {
            target: CueTarget::Block(heading),
            anchor: Anchor::At(Duration::ZERO),
            motion: Motion {
                from: Pose::hidden().rise(Length::Px(30.0)),
                duration: Duration::from_millis(600),
                stagger: Duration::ZERO,
            },
        },
        side(portrait, -40.0, Duration::ZERO),
        side(copy, 40.0, Duration::from_millis(100)),
    ]
}

/// Experience detail panel: the card rises in while its bullet points slide
/// in from the right, one every 100 ms.
pub fn panel_cues<T>(panel: T, items: Vec<T>) -> Vec<Cue<T>> {
    let mut cues = vec![Cue {
        target: CueTarget::Block(panel),
        anchor: Anchor::At(Duration::ZERO),
        motion: Motion {
            from: Pose::hidden().rise(Length::Px(20.0)),
            duration: Duration::from_millis(400),
            stagger: Duration::ZERO,
        },
    }];

    if !items.is_empty() {
        cues.push(Cue {
            target: CueTarget::Group(items),
            anchor: Anchor::At(Duration::ZERO),
            motion: Motion {
                from: Pose::hidden().slide(Length::Px(20.0)),
                duration: Duration::from_millis(300),
                stagger: Duration::from_millis(100),
            },
        });
    }

    cues
}
