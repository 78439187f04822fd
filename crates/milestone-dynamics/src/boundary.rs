//! Boundary encoding and crossing detection.
//!
//! Boundary forces report their state through force-group energies. A group
//! that carries a single milestone is crossed when its energy is strictly
//! positive. A group shared by several milestones packs them into the integer
//! part of its energy, bit `k` (least significant first) standing for the
//! `k`-th milestone of that group in set order.

use milestone_core::{ForceGroup, MilestoneSet, Result, SimulationContext};

/// Decodes the set bits among the lowest `width` bits of `value`.
///
/// Consumes the truncated value by repeated modulo-2 and shift, so indices
/// come out ascending. Non-positive values decode to nothing.
pub fn decode_bitmask(value: f64, width: usize) -> Vec<usize> {
    if !(value > 0.0) {
        return Vec::new();
    }
    let mut bitcode = value.trunc() as u64;
    let mut crossed = Vec::new();
    for bit in 0..width {
        if bitcode % 2 != 0 {
            crossed.push(bit);
        }
        bitcode >>= 1;
    }
    crossed
}

/// Packs per-surface flags into an indicator value (inverse of [`decode_bitmask`]).
pub fn pack_bitmask(flags: &[bool]) -> f64 {
    flags
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(bit, _)| (1u64 << bit) as f64)
        .sum()
}

#[derive(Debug, Clone)]
struct GroupSlot {
    group: ForceGroup,
    /// Milestone index for each bit of this group's indicator
    members: Vec<usize>,
}

/// Mapping from milestones to (force group, bit) pairs.
#[derive(Debug, Clone)]
pub struct BoundaryEncoding {
    slots: Vec<GroupSlot>,
}

impl BoundaryEncoding {
    pub fn new(milestones: &MilestoneSet) -> Self {
        let slots = milestones
            .groups()
            .into_iter()
            .map(|group| GroupSlot {
                group,
                members: milestones.members_of(group),
            })
            .collect();
        Self { slots }
    }

    pub fn groups(&self) -> impl Iterator<Item = ForceGroup> + '_ {
        self.slots.iter().map(|slot| slot.group)
    }

    /// Milestone indices reported crossed by one group's indicator value.
    fn decode_slot(slot: &GroupSlot, value: f64) -> Vec<usize> {
        if slot.members.len() == 1 {
            if value > 0.0 {
                vec![slot.members[0]]
            } else {
                Vec::new()
            }
        } else {
            decode_bitmask(value, slot.members.len())
                .into_iter()
                .map(|bit| slot.members[bit])
                .collect()
        }
    }
}

/// Milestones crossed in one step, ascending by milestone index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossingSet {
    indices: Vec<usize>,
}

impl CrossingSet {
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// More than one surface crossed in the same step.
    pub fn is_corner(&self) -> bool {
        self.indices.len() > 1
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }
}

/// Evaluates every boundary group of an MMVT milestone set.
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    encoding: BoundaryEncoding,
}

impl CrossingDetector {
    pub fn new(milestones: &MilestoneSet) -> Self {
        Self {
            encoding: BoundaryEncoding::new(milestones),
        }
    }

    pub fn encoding(&self) -> &BoundaryEncoding {
        &self.encoding
    }

    /// Queries each group once and collects the crossed milestones.
    pub fn detect<C: SimulationContext + ?Sized>(&self, context: &mut C) -> Result<CrossingSet> {
        let mut crossed = Vec::new();
        for slot in &self.encoding.slots {
            let value = context.evaluate_boundary_indicator(slot.group.mask())?;
            crossed.extend(BoundaryEncoding::decode_slot(slot, value));
        }
        Ok(CrossingSet::from_indices(crossed))
    }

    /// First strictly positive indicator value, if any group reports one.
    pub fn first_positive_indicator<C: SimulationContext + ?Sized>(
        &self,
        context: &mut C,
    ) -> Result<Option<f64>> {
        for slot in &self.encoding.slots {
            let value = context.evaluate_boundary_indicator(slot.group.mask())?;
            if value > 0.0 {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Last-seen indicator values for value-change detection.
///
/// Slots start at negative infinity; the first observation seeds the
/// baseline and is never reported as a crossing.
#[derive(Debug, Clone)]
pub struct IndicatorHistory {
    previous: Vec<f64>,
}

impl IndicatorHistory {
    pub fn new(len: usize) -> Self {
        Self {
            previous: vec![f64::NEG_INFINITY; len],
        }
    }

    /// Whether `value` differs from the stored value at a nonzero time.
    pub fn observe(&mut self, index: usize, value: f64, time: f64) -> bool {
        if self.previous[index] == f64::NEG_INFINITY {
            self.previous[index] = value;
        }
        (value - self.previous[index]) != 0.0 && time != 0.0
    }

    pub fn remember(&mut self, index: usize, value: f64) {
        self.previous[index] = value;
    }

    pub fn previous(&self, index: usize) -> f64 {
        self.previous[index]
    }
}
