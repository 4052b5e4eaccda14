//! Core growth engine and experiment driver shared across the clinostat workspace.
//!
//! Angles are radians measured counter-clockwise from the positive x axis with
//! y pointing up, so "up" is `π/2` and "down" is `-π/2`. Renderers that use a
//! y-down canvas flip on their side.

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

new_key_type! {
    /// Stable handle for segments backed by a generational slot map.
    pub struct SegmentId;
}

/// Ticks a freshly planted seed stays dormant before either organ grows.
pub const GERMINATION_TICKS: u32 = 8;
/// No branch is spawned at or beyond this ancestor depth.
pub const MAX_BRANCH_DEPTH: u16 = 5;
/// Gravity magnitude of the Earth control environment.
pub const EARTH_GRAVITY: f32 = 1.0;

const ANGLE_UP: f32 = std::f32::consts::FRAC_PI_2;
const ANGLE_DOWN: f32 = -std::f32::consts::FRAC_PI_2;
const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = PI;

/// Branch chains elongate at this fraction of the organ growth rate.
const BRANCH_GROWTH_FACTOR: f32 = 0.7;
/// Branch chains are drawn this much thinner than the axis they left.
const BRANCH_WIDTH_FACTOR: f32 = 0.7;
/// Tapering never thins a segment below this width.
const MIN_SEGMENT_WIDTH: f32 = 0.5;
/// A segment may branch once it has covered this fraction of its own target.
const BRANCH_TRIGGER_FRACTION: f32 = 0.6;
/// Segments shorter than this carry no leaves yet.
const LEAF_MIN_LENGTH: f32 = 4.0;
/// Random per-leaf size factor range.
const LEAF_SIZE_RANGE: (f32, f32) = (0.7, 1.3);
/// Shared germination jitter applied to the opposed seed pair.
const GERMINATION_JITTER: f32 = 0.12;

fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    while angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// Shortest signed rotation taking `current` onto `target`, in `[-π, π]`.
fn signed_angle_delta(target: f32, current: f32) -> f32 {
    wrap_signed_angle(target - current)
}

/// Species available in the growth parameters table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    #[default]
    Cress,
    Bean,
    Radish,
}

impl Species {
    /// Every species in table order.
    pub const ALL: [Self; 3] = [Self::Cress, Self::Bean, Self::Radish];

    /// Lowercase identifier used in exports and CLI input.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cress => "cress",
            Self::Bean => "bean",
            Self::Radish => "radish",
        }
    }

    /// Physical and behavioral constants for this species.
    #[must_use]
    pub fn profile(self) -> &'static GrowthProfile {
        match self {
            Self::Cress => &CRESS_PROFILE,
            Self::Bean => &BEAN_PROFILE,
            Self::Radish => &RADISH_PROFILE,
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = ExperimentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cress" => Ok(Self::Cress),
            "bean" => Ok(Self::Bean),
            "radish" => Ok(Self::Radish),
            _ => Err(ExperimentError::UnknownSpecies(value.trim().to_string())),
        }
    }
}

/// Outline drawn for a leaf glyph; consumed by the renderer only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeafShape {
    Oval,
    Heart,
    Round,
}

/// Immutable per-species physical and behavioral constants.
///
/// One static instance per species; never mutated after definition. Lengths
/// and widths are in world units, rates in units per tick, angles in radians.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrowthProfile {
    pub base_stem_width: f32,
    pub base_root_width: f32,
    pub max_stem_length: f32,
    pub max_root_length: f32,
    pub stem_growth_rate: f32,
    pub root_growth_rate: f32,
    /// Growth target of a single segment; short so chains curve smoothly.
    pub segment_length: f32,
    /// Per-tick chance that an eligible segment sprouts its one branch.
    pub branch_probability: f32,
    /// Angular spread range a branch takes off its parent axis.
    pub branch_spread: (f32, f32),
    /// Randomized gap range between consecutive leaves on one segment.
    pub leaf_spacing: (f32, f32),
    pub leaf_shape: LeafShape,
    pub leaf_scale: f32,
    /// Width multiplier applied per ancestor depth.
    pub taper_ratio: f32,
}

const CRESS_PROFILE: GrowthProfile = GrowthProfile {
    base_stem_width: 3.2,
    base_root_width: 2.4,
    max_stem_length: 110.0,
    max_root_length: 80.0,
    stem_growth_rate: 0.55,
    root_growth_rate: 0.40,
    segment_length: 11.0,
    branch_probability: 0.15,
    branch_spread: (0.40, 0.75),
    leaf_spacing: (8.0, 12.0),
    leaf_shape: LeafShape::Round,
    leaf_scale: 0.8,
    taper_ratio: 0.62,
};

const BEAN_PROFILE: GrowthProfile = GrowthProfile {
    base_stem_width: 4.6,
    base_root_width: 3.4,
    max_stem_length: 150.0,
    max_root_length: 110.0,
    stem_growth_rate: 0.50,
    root_growth_rate: 0.38,
    segment_length: 13.0,
    branch_probability: 0.15,
    branch_spread: (0.40, 0.75),
    leaf_spacing: (10.0, 14.0),
    leaf_shape: LeafShape::Heart,
    leaf_scale: 1.25,
    taper_ratio: 0.62,
};

const RADISH_PROFILE: GrowthProfile = GrowthProfile {
    base_stem_width: 3.8,
    base_root_width: 3.0,
    max_stem_length: 95.0,
    max_root_length: 120.0,
    stem_growth_rate: 0.45,
    root_growth_rate: 0.50,
    segment_length: 10.0,
    branch_probability: 0.12,
    branch_spread: (0.40, 0.75),
    leaf_spacing: (8.0, 11.0),
    leaf_shape: LeafShape::Oval,
    leaf_scale: 1.0,
    taper_ratio: 0.62,
};

/// Side the directional light shines from, or none at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightDirection {
    #[default]
    None,
    Top,
    Bottom,
    Left,
    Right,
}

impl LightDirection {
    /// Lowercase identifier used in exports and CLI input.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Angle pointing toward the light source, if one is set.
    #[must_use]
    pub const fn source_angle(self) -> Option<f32> {
        match self {
            Self::None => None,
            Self::Top => Some(ANGLE_UP),
            Self::Bottom => Some(ANGLE_DOWN),
            Self::Left => Some(PI),
            Self::Right => Some(0.0),
        }
    }
}

impl fmt::Display for LightDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LightDirection {
    type Err = ExperimentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(ExperimentError::UnknownLightDirection(
                value.trim().to_string(),
            )),
        }
    }
}

/// Environmental conditions a plant grows under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Environment {
    /// 0 is microgravity, 1 is Earth; fractional values are partial gravity.
    pub gravity: f32,
    pub light: LightDirection,
}

/// 2D point in world units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box enclosing a plant; consumed by camera framing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Small fixed box returned when there is no geometry to enclose.
    pub const FALLBACK: Self = Self {
        min_x: -4.0,
        max_x: 4.0,
        min_y: -4.0,
        max_y: 4.0,
    };

    /// Tight box around `points`, or [`Self::FALLBACK`] for an empty sequence.
    #[must_use]
    pub fn enclosing(points: impl IntoIterator<Item = Point>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::FALLBACK;
        };
        let mut bounds = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for point in iter {
            bounds.include(point);
        }
        bounds
    }

    fn include(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.x);
        self.max_x = self.max_x.max(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_y = self.max_y.max(point.y);
    }
}

/// One leaf pinned to a segment.
///
/// Placements are append-only and strictly increasing in `offset`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Leaf {
    /// Distance along the owning segment, from its start point.
    pub offset: f32,
    /// +1 or -1, alternating with the previous leaf on the same segment.
    pub side: i8,
    /// Random per-leaf size factor on top of the species leaf scale.
    pub size_factor: f32,
}

/// The two top-level growth structures of a plant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Organ {
    Shoot,
    Root,
}

/// Strengths of the directional terms mixed into a continuation angle.
struct TropismGains {
    gravity_gain: f32,
    light_gain: f32,
    light_gain_microgravity: f32,
    wobble: f32,
    wobble_microgravity: f32,
}

/// Shoots chase light and wander more; roots correct toward gravity faster.
const SHOOT_GAINS: TropismGains = TropismGains {
    gravity_gain: 0.30,
    light_gain: 0.25,
    light_gain_microgravity: 0.45,
    wobble: 0.06,
    wobble_microgravity: 0.22,
};

const ROOT_GAINS: TropismGains = TropismGains {
    gravity_gain: 0.50,
    light_gain: 0.12,
    light_gain_microgravity: 0.25,
    wobble: 0.045,
    wobble_microgravity: 0.16,
};

impl Organ {
    fn gains(self) -> &'static TropismGains {
        match self {
            Self::Shoot => &SHOOT_GAINS,
            Self::Root => &ROOT_GAINS,
        }
    }

    /// Canonical vertical orientation under gravity.
    const fn canonical_angle(self) -> f32 {
        match self {
            Self::Shoot => ANGLE_UP,
            Self::Root => ANGLE_DOWN,
        }
    }
}

/// How a segment is attached to the tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Parentless germination segment.
    Seed,
    /// Extends the axis of the segment it grew from.
    Continuation,
    /// Left or right branch sprouted off an axis segment.
    Offshoot,
}

/// A single node in a branching growth chain.
///
/// Position and absolute angle are never stored; they derive from the parent
/// chain through the owning [`SegmentTree`]. The angular offset is fixed at
/// construction and never rewritten, which keeps grown curves stable.
#[derive(Debug, Clone)]
pub struct Segment {
    organ: Organ,
    attachment: Attachment,
    parent: Option<SegmentId>,
    continuation: Option<SegmentId>,
    offshoot: Option<SegmentId>,
    angle_offset: f32,
    length: f32,
    target_length: f32,
    growing: bool,
    depth: u16,
    branch: bool,
    width: f32,
    leaves: Vec<Leaf>,
    last_leaf_offset: f32,
    next_leaf_gap: f32,
    last_leaf_side: i8,
}

impl Segment {
    fn new(
        organ: Organ,
        attachment: Attachment,
        parent: Option<SegmentId>,
        angle_offset: f32,
        depth: u16,
        branch: bool,
        profile: &GrowthProfile,
        rng: &mut SmallRng,
    ) -> Self {
        let base = match organ {
            Organ::Shoot => profile.base_stem_width,
            Organ::Root => profile.base_root_width,
        };
        let tapered = (base * profile.taper_ratio.powi(i32::from(depth))).max(MIN_SEGMENT_WIDTH);
        let width = if branch {
            tapered * BRANCH_WIDTH_FACTOR
        } else {
            tapered
        };
        Self {
            organ,
            attachment,
            parent,
            continuation: None,
            offshoot: None,
            angle_offset,
            length: 0.0,
            target_length: profile.segment_length,
            growing: true,
            depth,
            branch,
            width,
            leaves: Vec::new(),
            last_leaf_offset: 0.0,
            next_leaf_gap: rng.random_range(profile.leaf_spacing.0..profile.leaf_spacing.1),
            last_leaf_side: if rng.random_bool(0.5) { 1 } else { -1 },
        }
    }

    #[must_use]
    pub const fn organ(&self) -> Organ {
        self.organ
    }

    #[must_use]
    pub const fn attachment(&self) -> Attachment {
        self.attachment
    }

    /// Whether this segment belongs to the root organ.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.organ == Organ::Root
    }

    /// Whether this segment sits on a branch chain rather than the main axis.
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        self.branch
    }

    #[must_use]
    pub const fn parent(&self) -> Option<SegmentId> {
        self.parent
    }

    #[must_use]
    pub const fn continuation(&self) -> Option<SegmentId> {
        self.continuation
    }

    #[must_use]
    pub const fn offshoot(&self) -> Option<SegmentId> {
        self.offshoot
    }

    /// Angular offset from the parent, fixed permanently at construction.
    /// For seed segments this is the absolute germination angle.
    #[must_use]
    pub const fn angle_offset(&self) -> f32 {
        self.angle_offset
    }

    #[must_use]
    pub const fn length(&self) -> f32 {
        self.length
    }

    #[must_use]
    pub const fn target_length(&self) -> f32 {
        self.target_length
    }

    #[must_use]
    pub const fn is_growing(&self) -> bool {
        self.growing
    }

    /// Ancestor count, cached at construction since it cannot change.
    #[must_use]
    pub const fn depth(&self) -> u16 {
        self.depth
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }
}

struct GrowthContext<'a> {
    env: &'a Environment,
    profile: &'static GrowthProfile,
    /// Organ total length as measured before this tick.
    organ_total: f32,
    /// Organ-level length ceiling gating new continuation segments.
    organ_ceiling: f32,
}

/// Offset baked into a newborn continuation segment. Computed once, at birth:
/// curvature comes from chaining many short fixed-angle segments, not from
/// re-steering grown ones.
fn continuation_offset(
    env: &Environment,
    organ: Organ,
    current_angle: f32,
    rng: &mut SmallRng,
) -> f32 {
    let gains = organ.gains();
    let microgravity = env.gravity <= 0.0;
    let mut offset = 0.0;

    if env.gravity > 0.0 {
        let target = organ.canonical_angle();
        let strength = env.gravity.min(EARTH_GRAVITY) * gains.gravity_gain;
        offset += strength * signed_angle_delta(target, current_angle);
    }

    if let Some(source) = env.light.source_angle() {
        // Shoots lean toward the light, roots away from it.
        let target = match organ {
            Organ::Shoot => source,
            Organ::Root => wrap_signed_angle(source + PI),
        };
        let strength = if microgravity {
            gains.light_gain_microgravity
        } else {
            gains.light_gain
        };
        offset += strength * signed_angle_delta(target, current_angle);
    }

    let wobble = if microgravity {
        gains.wobble_microgravity
    } else {
        gains.wobble
    };
    offset + rng.random_range(-wobble..=wobble)
}

/// One organ's segment chain, arena-allocated with non-owning parent links.
#[derive(Debug, Clone)]
pub struct SegmentTree {
    organ: Organ,
    segments: SlotMap<SegmentId, Segment>,
    seed: SegmentId,
}

impl SegmentTree {
    fn germinate(
        organ: Organ,
        base_angle: f32,
        profile: &GrowthProfile,
        rng: &mut SmallRng,
    ) -> Self {
        let mut segments = SlotMap::with_key();
        let seed = segments.insert(Segment::new(
            organ,
            Attachment::Seed,
            None,
            base_angle,
            0,
            false,
            profile,
            rng,
        ));
        Self {
            organ,
            segments,
            seed,
        }
    }

    #[must_use]
    pub const fn organ(&self) -> Organ {
        self.organ
    }

    /// Handle of the parentless germination segment.
    #[must_use]
    pub const fn seed(&self) -> SegmentId {
        self.seed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over every segment with its handle.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments.iter()
    }

    /// Borrow a single segment.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// Total organ extent: every segment's length, branches included.
    #[must_use]
    pub fn total_length(&self) -> f32 {
        self.segments.values().map(Segment::length).sum()
    }

    /// True once every segment has permanently stopped growing.
    #[must_use]
    pub fn is_fully_grown(&self) -> bool {
        self.segments.values().all(|segment| !segment.growing)
    }

    /// Number of branch offshoots sprouted so far.
    #[must_use]
    pub fn branch_count(&self) -> u32 {
        self.segments
            .values()
            .filter(|segment| segment.attachment == Attachment::Offshoot)
            .count() as u32
    }

    /// Last segment of the main axis chain.
    #[must_use]
    pub fn tip(&self) -> SegmentId {
        let mut id = self.seed;
        while let Some(next) = self.segments[id].continuation {
            id = next;
        }
        id
    }

    /// Resolved absolute angle at the main axis tip.
    #[must_use]
    pub fn tip_angle(&self) -> f32 {
        self.absolute_angle(self.tip())
    }

    /// Absolute angle of a segment: the sum of fixed offsets up the parent chain.
    #[must_use]
    pub fn absolute_angle(&self, id: SegmentId) -> f32 {
        let segment = &self.segments[id];
        match segment.parent {
            Some(parent) => wrap_signed_angle(self.absolute_angle(parent) + segment.angle_offset),
            None => segment.angle_offset,
        }
    }

    /// Where a segment starts: its parent's end point, or the seed origin.
    #[must_use]
    pub fn start_point(&self, id: SegmentId) -> Point {
        match self.segments[id].parent {
            Some(parent) => self.end_point(parent),
            None => Point::ORIGIN,
        }
    }

    /// Where a segment currently ends.
    #[must_use]
    pub fn end_point(&self, id: SegmentId) -> Point {
        let start = self.start_point(id);
        let angle = self.absolute_angle(id);
        let length = self.segments[id].length;
        Point::new(start.x + length * angle.cos(), start.y + length * angle.sin())
    }

    fn endpoints(&self) -> impl Iterator<Item = Point> {
        self.segments
            .keys()
            .flat_map(|id| [self.start_point(id), self.end_point(id)])
    }

    /// Advance every chain by one tick. Inactive segments still recurse so
    /// children keep growing after their parent stops.
    fn grow_tick(&mut self, ctx: &GrowthContext<'_>, rng: &mut SmallRng) {
        self.grow_segment(self.seed, ctx, rng);
    }

    fn grow_segment(&mut self, id: SegmentId, ctx: &GrowthContext<'_>, rng: &mut SmallRng) {
        // Children spawned during this tick first grow on the next one.
        let (had_continuation, had_offshoot) = {
            let segment = &self.segments[id];
            (segment.continuation, segment.offshoot)
        };

        self.extend(id, ctx);
        if self.organ == Organ::Shoot {
            self.place_leaves(id, ctx.profile, rng);
            self.try_branch(id, ctx.profile, rng);
        }
        self.try_complete(id, ctx, rng);

        if let Some(child) = had_continuation {
            self.grow_segment(child, ctx, rng);
        }
        if let Some(child) = had_offshoot {
            self.grow_segment(child, ctx, rng);
        }
    }

    fn extend(&mut self, id: SegmentId, ctx: &GrowthContext<'_>) {
        let rate = match self.organ {
            Organ::Shoot => ctx.profile.stem_growth_rate,
            Organ::Root => ctx.profile.root_growth_rate,
        };
        let segment = &mut self.segments[id];
        if segment.growing {
            let factor = if segment.branch {
                BRANCH_GROWTH_FACTOR
            } else {
                1.0
            };
            segment.length += rate * factor;
        }
    }

    fn place_leaves(&mut self, id: SegmentId, profile: &GrowthProfile, rng: &mut SmallRng) {
        let segment = &mut self.segments[id];
        // Inactive segments are frozen; only a growing segment mutates.
        if !segment.growing || segment.branch || segment.length < LEAF_MIN_LENGTH {
            return;
        }
        while segment.length - segment.last_leaf_offset >= segment.next_leaf_gap {
            let offset = segment.last_leaf_offset + segment.next_leaf_gap;
            let side = -segment.last_leaf_side;
            segment.leaves.push(Leaf {
                offset,
                side,
                size_factor: rng.random_range(LEAF_SIZE_RANGE.0..LEAF_SIZE_RANGE.1),
            });
            segment.last_leaf_offset = offset;
            segment.last_leaf_side = side;
            segment.next_leaf_gap = rng.random_range(profile.leaf_spacing.0..profile.leaf_spacing.1);
        }
    }

    fn try_branch(&mut self, id: SegmentId, profile: &GrowthProfile, rng: &mut SmallRng) {
        let segment = &self.segments[id];
        if !segment.growing
            || segment.branch
            || segment.offshoot.is_some()
            || segment.depth >= MAX_BRANCH_DEPTH
        {
            return;
        }
        if segment.length < BRANCH_TRIGGER_FRACTION * segment.target_length {
            return;
        }
        if !rng.random_bool(f64::from(profile.branch_probability)) {
            return;
        }
        let side: f32 = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let spread = rng.random_range(profile.branch_spread.0..profile.branch_spread.1);
        let child = self.insert_child(id, Attachment::Offshoot, side * spread, profile, rng);
        self.segments[id].offshoot = Some(child);
    }

    fn try_complete(&mut self, id: SegmentId, ctx: &GrowthContext<'_>, rng: &mut SmallRng) {
        let segment = &self.segments[id];
        if !segment.growing
            || segment.length < segment.target_length
            || segment.continuation.is_some()
        {
            return;
        }
        self.segments[id].growing = false;
        if ctx.organ_total >= ctx.organ_ceiling {
            // Organ at its ceiling: the chain ends here.
            return;
        }
        let current = self.absolute_angle(id);
        let offset = continuation_offset(ctx.env, self.organ, current, rng);
        let child = self.insert_child(id, Attachment::Continuation, offset, ctx.profile, rng);
        self.segments[id].continuation = Some(child);
    }

    fn insert_child(
        &mut self,
        parent: SegmentId,
        attachment: Attachment,
        angle_offset: f32,
        profile: &GrowthProfile,
        rng: &mut SmallRng,
    ) -> SegmentId {
        let (depth, parent_branch) = {
            let segment = &self.segments[parent];
            (segment.depth + 1, segment.branch)
        };
        let branch = parent_branch || attachment == Attachment::Offshoot;
        self.segments.insert(Segment::new(
            self.organ,
            attachment,
            Some(parent),
            angle_offset,
            depth,
            branch,
            profile,
            rng,
        ))
    }
}

/// Coarse growth stage derived from shoot progress; feeds live displays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GrowthPhase {
    Dormant,
    Establishing,
    Elongating,
    Mature,
}

/// Aggregate morphology read off a plant each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Measurements {
    pub shoot_length: f32,
    pub root_depth: f32,
    pub branch_count: u32,
    pub shoot_angle_degrees: f32,
    pub phase: GrowthPhase,
}

/// One organism: a shoot tree and a root tree grown from a single seed point.
#[derive(Debug, Clone)]
pub struct Plant {
    species: Species,
    age_ticks: u32,
    shoot: SegmentTree,
    root: SegmentTree,
    rng: SmallRng,
}

impl Plant {
    /// Germinate a seed. The shoot and root seeds are exact 180° mirrors and
    /// share one jitter term, so the pair diverges symmetrically; in
    /// microgravity the pair orientation is uniform around the circle.
    #[must_use]
    pub fn new(species: Species, env: &Environment, rng_seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(rng_seed);
        let profile = species.profile();
        let jitter = rng.random_range(-GERMINATION_JITTER..=GERMINATION_JITTER);
        let shoot_angle = if env.gravity > 0.0 {
            wrap_signed_angle(ANGLE_UP + jitter)
        } else {
            wrap_signed_angle(rng.random_range(-PI..PI) + jitter)
        };
        let root_angle = wrap_signed_angle(shoot_angle - PI);
        let shoot = SegmentTree::germinate(Organ::Shoot, shoot_angle, profile, &mut rng);
        let root = SegmentTree::germinate(Organ::Root, root_angle, profile, &mut rng);
        Self {
            species,
            age_ticks: 0,
            shoot,
            root,
            rng,
        }
    }

    #[must_use]
    pub const fn species(&self) -> Species {
        self.species
    }

    #[must_use]
    pub const fn age_ticks(&self) -> u32 {
        self.age_ticks
    }

    /// Read-only access to the shoot tree.
    #[must_use]
    pub const fn shoot(&self) -> &SegmentTree {
        &self.shoot
    }

    /// Read-only access to the root tree.
    #[must_use]
    pub const fn root(&self) -> &SegmentTree {
        &self.root
    }

    /// Advance both organs by one tick. The first [`GERMINATION_TICKS`] ticks
    /// are a dormant phase where only age accumulates.
    pub fn update(&mut self, env: &Environment) {
        self.age_ticks += 1;
        if self.age_ticks <= GERMINATION_TICKS {
            return;
        }
        let profile = self.species.profile();

        let shoot_total = self.shoot.total_length();
        self.shoot.grow_tick(
            &GrowthContext {
                env,
                profile,
                organ_total: shoot_total,
                organ_ceiling: profile.max_stem_length,
            },
            &mut self.rng,
        );

        let root_total = self.root.total_length();
        self.root.grow_tick(
            &GrowthContext {
                env,
                profile,
                organ_total: root_total,
                organ_ceiling: profile.max_root_length,
            },
            &mut self.rng,
        );
    }

    /// True once every segment in both organ trees has stopped growing.
    #[must_use]
    pub fn is_fully_grown(&self) -> bool {
        self.shoot.is_fully_grown() && self.root.is_fully_grown()
    }

    /// Box enclosing every segment endpoint across both trees.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::enclosing(self.shoot.endpoints().chain(self.root.endpoints()))
    }

    /// Aggregate morphology for displays and sample records.
    #[must_use]
    pub fn measurements(&self) -> Measurements {
        let profile = self.species.profile();
        let shoot_length = self.shoot.total_length();
        let phase = if self.age_ticks <= GERMINATION_TICKS {
            GrowthPhase::Dormant
        } else if self.is_fully_grown() {
            GrowthPhase::Mature
        } else {
            // Guard the ratio: a zero ceiling classifies as if it were 1.
            let ceiling = if profile.max_stem_length > 0.0 {
                profile.max_stem_length
            } else {
                1.0
            };
            if shoot_length / ceiling < 0.25 {
                GrowthPhase::Establishing
            } else {
                GrowthPhase::Elongating
            }
        };
        Measurements {
            shoot_length,
            root_depth: self.root.total_length(),
            branch_count: self.shoot.branch_count(),
            shoot_angle_degrees: self.shoot.tip_angle().to_degrees(),
            phase,
        }
    }
}

/// Monotonic tick counter for one experiment run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Which recorded series a sample belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Treatment,
    Control,
}

/// One recorded measurement row. Immutable once appended to a series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrowthSample {
    pub time_minutes: f64,
    pub shoot_length: f32,
    pub root_depth: f32,
    pub branch_count: u32,
    pub shoot_angle_degrees: f32,
    pub species: Species,
    pub gravity: f32,
    pub light: LightDirection,
}

/// Sink invoked for every sample the driver appends.
pub trait SampleSink: Send {
    fn on_sample(&mut self, series: SeriesKind, sample: &GrowthSample);
}

/// No-op sample sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn on_sample(&mut self, _series: SeriesKind, _sample: &GrowthSample) {}
}

/// Errors surfaced at the configuration boundary. The running core has no
/// recoverable error paths: invalid state-transition requests are no-ops.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("unknown species: {0}")]
    UnknownSpecies(String),
    #[error("unknown light direction: {0}")]
    UnknownLightDirection(String),
}

/// Inputs frozen at `start` for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    pub species: Species,
    /// 0 is microgravity, 1 is Earth; fractional values are partial gravity.
    pub gravity: f32,
    pub light: LightDirection,
    /// Also grow an Earth-gravity control plant when gravity differs from 1.
    pub comparison: bool,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Ticks between recorded samples.
    pub sample_interval_ticks: u32,
    /// Simulated minutes represented by one tick.
    pub minutes_per_tick: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            species: Species::Cress,
            gravity: EARTH_GRAVITY,
            light: LightDirection::None,
            comparison: false,
            rng_seed: None,
            sample_interval_ticks: 480,
            minutes_per_tick: 1.0,
        }
    }
}

impl ExperimentConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if !self.gravity.is_finite() || self.gravity < 0.0 {
            return Err(ExperimentError::InvalidConfig(
                "gravity must be finite and non-negative",
            ));
        }
        if self.sample_interval_ticks == 0 {
            return Err(ExperimentError::InvalidConfig(
                "sample_interval_ticks must be non-zero",
            ));
        }
        if !self.minutes_per_tick.is_finite() || self.minutes_per_tick <= 0.0 {
            return Err(ExperimentError::InvalidConfig(
                "minutes_per_tick must be finite and positive",
            ));
        }
        Ok(())
    }

    /// Environmental conditions the treatment plant grows under.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        Environment {
            gravity: self.gravity,
            light: self.light,
        }
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Lifecycle of one experiment run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Complete,
}

/// Events emitted after processing one driver tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Whether a sample was appended this tick.
    pub sampled: bool,
    /// Whether this tick transitioned the run to [`RunPhase::Complete`].
    pub completed: bool,
}

/// Orchestrates per-tick advancement of the treatment plant (and optional
/// Earth-gravity control), samples measurements on a fixed cadence, and halts
/// on maturity. Driven by an external per-frame clock; nothing here spawns
/// competing work.
pub struct ExperimentDriver {
    config: ExperimentConfig,
    phase: RunPhase,
    treatment: Option<Plant>,
    control: Option<Plant>,
    treatment_series: Vec<GrowthSample>,
    control_series: Vec<GrowthSample>,
    elapsed: Tick,
    sink: Box<dyn SampleSink>,
}

impl fmt::Debug for ExperimentDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentDriver")
            .field("phase", &self.phase)
            .field("elapsed", &self.elapsed)
            .field("treatment_samples", &self.treatment_series.len())
            .field("control_samples", &self.control_series.len())
            .finish()
    }
}

impl Default for ExperimentDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentDriver {
    /// Idle driver with a no-op sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ExperimentConfig::default(),
            phase: RunPhase::Idle,
            treatment: None,
            control: None,
            treatment_series: Vec::new(),
            control_series: Vec::new(),
            elapsed: Tick::zero(),
            sink: Box::new(NullSink),
        }
    }

    /// Replace the sample sink.
    pub fn set_sink(&mut self, sink: Box<dyn SampleSink>) {
        self.sink = sink;
    }

    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Configuration as frozen by the most recent `start`.
    #[must_use]
    pub const fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    #[must_use]
    pub const fn elapsed(&self) -> Tick {
        self.elapsed
    }

    /// Simulated minutes elapsed in the current run.
    #[must_use]
    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.0 as f64 * self.config.minutes_per_tick
    }

    #[must_use]
    pub const fn treatment(&self) -> Option<&Plant> {
        self.treatment.as_ref()
    }

    #[must_use]
    pub const fn control(&self) -> Option<&Plant> {
        self.control.as_ref()
    }

    #[must_use]
    pub fn treatment_series(&self) -> &[GrowthSample] {
        &self.treatment_series
    }

    #[must_use]
    pub fn control_series(&self) -> &[GrowthSample] {
        &self.control_series
    }

    /// Live measurements of the treatment plant, once a run has started.
    #[must_use]
    pub fn measurements(&self) -> Option<Measurements> {
        self.treatment.as_ref().map(Plant::measurements)
    }

    /// Begin a run, freezing `config` for its duration. Anything but a
    /// no-op requires the idle state; a start requested from any other phase
    /// is silently ignored. A control plant is germinated when comparison
    /// mode is on and the treatment gravity is not Earth gravity.
    pub fn start(&mut self, config: ExperimentConfig) -> Result<(), ExperimentError> {
        if self.phase != RunPhase::Idle {
            return Ok(());
        }
        config.validate()?;
        let mut rng = config.seeded_rng();
        let env = config.environment();
        let treatment = Plant::new(config.species, &env, rng.next_u64());
        let control = (config.comparison && config.gravity != EARTH_GRAVITY).then(|| {
            let control_env = Environment {
                gravity: EARTH_GRAVITY,
                light: config.light,
            };
            Plant::new(config.species, &control_env, rng.next_u64())
        });
        self.config = config;
        self.treatment = Some(treatment);
        self.control = control;
        self.treatment_series.clear();
        self.control_series.clear();
        self.elapsed = Tick::zero();
        self.phase = RunPhase::Running;
        Ok(())
    }

    /// Advance the run by one tick. A no-op unless running.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents {
            tick: self.elapsed,
            sampled: false,
            completed: false,
        };
        if self.phase != RunPhase::Running {
            return events;
        }
        self.elapsed = self.elapsed.next();
        events.tick = self.elapsed;

        let env = self.config.environment();
        if let Some(plant) = self.treatment.as_mut() {
            plant.update(&env);
        }
        if let Some(plant) = self.control.as_mut() {
            let control_env = Environment {
                gravity: EARTH_GRAVITY,
                light: self.config.light,
            };
            plant.update(&control_env);
        }

        let matured = self.all_mature();
        let on_cadence = self
            .elapsed
            .0
            .is_multiple_of(u64::from(self.config.sample_interval_ticks));
        if on_cadence || matured {
            self.record_samples();
            events.sampled = true;
        }
        if matured {
            self.phase = RunPhase::Complete;
            events.completed = true;
        }
        events
    }

    /// Pause a running experiment, recording one final sample. Resumable.
    pub fn pause(&mut self) {
        if self.phase == RunPhase::Running {
            self.record_samples();
            self.phase = RunPhase::Paused;
        }
    }

    /// Resume a paused experiment.
    pub fn resume(&mut self) {
        if self.phase == RunPhase::Paused {
            self.phase = RunPhase::Running;
        }
    }

    /// Discard the current run's plants and series and return to idle.
    /// Valid from any phase.
    pub fn reset(&mut self) {
        self.phase = RunPhase::Idle;
        self.treatment = None;
        self.control = None;
        self.treatment_series.clear();
        self.control_series.clear();
        self.elapsed = Tick::zero();
    }

    fn all_mature(&self) -> bool {
        self.treatment
            .as_ref()
            .is_some_and(Plant::is_fully_grown)
            && self.control.as_ref().map_or(true, Plant::is_fully_grown)
    }

    fn record_samples(&mut self) {
        let time_minutes = self.elapsed_minutes();
        if let Some(plant) = &self.treatment {
            let sample = Self::sample_of(plant, time_minutes, self.config.gravity, self.config.light);
            self.sink.on_sample(SeriesKind::Treatment, &sample);
            self.treatment_series.push(sample);
        }
        if let Some(plant) = &self.control {
            let sample = Self::sample_of(plant, time_minutes, EARTH_GRAVITY, self.config.light);
            self.sink.on_sample(SeriesKind::Control, &sample);
            self.control_series.push(sample);
        }
    }

    fn sample_of(
        plant: &Plant,
        time_minutes: f64,
        gravity: f32,
        light: LightDirection,
    ) -> GrowthSample {
        let measurements = plant.measurements();
        GrowthSample {
            time_minutes,
            shoot_length: measurements.shoot_length,
            root_depth: measurements.root_depth,
            branch_count: measurements.branch_count,
            shoot_angle_degrees: measurements.shoot_angle_degrees,
            species: plant.species(),
            gravity,
            light,
        }
    }
}
