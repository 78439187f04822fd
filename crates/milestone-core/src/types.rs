//! Shared types: force groups, milestones and state snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{MilestoneError, Result};

/// Cartesian vector, nm or nm/ps depending on context.
pub type Vec3 = [f64; 3];

/// Number of force-group slots a host engine exposes.
pub const MAX_FORCE_GROUPS: u8 = 32;

/// Force-group slot (0..32) used to scope energy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ForceGroup(u8);

impl ForceGroup {
    pub fn new(index: u8) -> Result<Self> {
        if index >= MAX_FORCE_GROUPS {
            return Err(MilestoneError::config(format!(
                "force group {} out of range (0..{})",
                index, MAX_FORCE_GROUPS
            )));
        }
        Ok(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Mask selecting only this group.
    pub fn mask(self) -> GroupMask {
        GroupMask(1u32 << self.0)
    }
}

impl TryFrom<u8> for ForceGroup {
    type Error = MilestoneError;

    fn try_from(value: u8) -> Result<Self> {
        ForceGroup::new(value)
    }
}

impl From<ForceGroup> for u8 {
    fn from(group: ForceGroup) -> u8 {
        group.0
    }
}

impl fmt::Display for ForceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of force groups, bit `g` selecting group `g`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupMask(pub u32);

impl GroupMask {
    pub fn contains(self, group: ForceGroup) -> bool {
        self.0 & (1u32 << group.index()) != 0
    }

    pub fn with(self, group: ForceGroup) -> GroupMask {
        GroupMask(self.0 | (1u32 << group.index()))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<ForceGroup> for GroupMask {
    fn from_iter<I: IntoIterator<Item = ForceGroup>>(iter: I) -> Self {
        iter.into_iter().fold(GroupMask::default(), GroupMask::with)
    }
}

/// A milestone: the identifier written to logs plus the group that detects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Milestone {
    pub id: i32,
    pub group: ForceGroup,
}

impl Milestone {
    pub fn new(id: i32, group: ForceGroup) -> Self {
        Self { id, group }
    }

    /// Milestone identified by its own force-group number.
    pub fn from_group(group: ForceGroup) -> Self {
        Self {
            id: i32::from(group.index()),
            group,
        }
    }
}

/// Ordered milestones monitored by one integrator.
///
/// Order is significant: crossed milestones are always processed in
/// ascending index order, and milestones sharing a force group are assigned
/// bits of that group's indicator in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneSet {
    milestones: Vec<Milestone>,
}

impl MilestoneSet {
    pub fn new(milestones: Vec<Milestone>) -> Self {
        Self { milestones }
    }

    /// Appends a milestone and returns its index.
    pub fn push(&mut self, milestone: Milestone) -> usize {
        self.milestones.push(milestone);
        self.milestones.len() - 1
    }

    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Milestone> {
        self.milestones.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Milestone> {
        self.milestones.iter()
    }

    pub fn ids(&self) -> Vec<i32> {
        self.milestones.iter().map(|m| m.id).collect()
    }

    /// Distinct groups in order of first appearance.
    pub fn groups(&self) -> Vec<ForceGroup> {
        let mut groups: Vec<ForceGroup> = Vec::new();
        for milestone in &self.milestones {
            if !groups.contains(&milestone.group) {
                groups.push(milestone.group);
            }
        }
        groups
    }

    /// Indices of the milestones detected through `group`, in set order.
    pub fn members_of(&self, group: ForceGroup) -> Vec<usize> {
        self.milestones
            .iter()
            .enumerate()
            .filter(|(_, m)| m.group == group)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn group_mask(&self) -> GroupMask {
        self.milestones.iter().map(|m| m.group).collect()
    }

    pub fn shares_group_with(&self, other: &MilestoneSet) -> bool {
        let mask = other.group_mask();
        self.milestones.iter().any(|m| mask.contains(m.group))
    }
}

impl<'a> IntoIterator for &'a MilestoneSet {
    type Item = &'a Milestone;
    type IntoIter = std::slice::Iter<'a, Milestone>;

    fn into_iter(self) -> Self::IntoIter {
        self.milestones.iter()
    }
}

/// Full simulation state captured at a crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Simulation time in ps
    pub time: f64,
    /// Step counter of the host context
    pub step: u64,
    /// Positions in nm
    pub positions: Vec<Vec3>,
    /// Velocities in nm/ps
    pub velocities: Vec<Vec3>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(index: u8) -> ForceGroup {
        ForceGroup::new(index).unwrap()
    }

    #[test]
    fn test_force_group_range() {
        assert!(ForceGroup::new(31).is_ok());
        assert!(ForceGroup::new(32).is_err());
    }

    #[test]
    fn test_group_mask() {
        let mask: GroupMask = [group(1), group(4)].into_iter().collect();
        assert_eq!(mask.0, 0b10010);
        assert!(mask.contains(group(4)));
        assert!(!mask.contains(group(2)));
        assert_eq!(group(3).mask().0, 8);
    }

    #[test]
    fn test_milestone_set_groups_keep_first_appearance_order() {
        let set = MilestoneSet::new(vec![
            Milestone::new(10, group(2)),
            Milestone::new(11, group(1)),
            Milestone::new(12, group(2)),
        ]);
        assert_eq!(set.groups(), vec![group(2), group(1)]);
        assert_eq!(set.members_of(group(2)), vec![0, 2]);
        assert_eq!(set.ids(), vec![10, 11, 12]);
    }

    #[test]
    fn test_shared_groups_between_sets() {
        let src = MilestoneSet::new(vec![Milestone::from_group(group(1))]);
        let dest = MilestoneSet::new(vec![Milestone::from_group(group(2))]);
        assert!(!src.shares_group_with(&dest));

        let overlapping = MilestoneSet::new(vec![Milestone::from_group(group(1))]);
        assert!(src.shares_group_with(&overlapping));
    }

    #[test]
    fn test_force_group_deserialization_validates() {
        let ok: Milestone = serde_json::from_str(r#"{"id": 3, "group": 5}"#).unwrap();
        assert_eq!(ok.group.index(), 5);
        let bad: std::result::Result<Milestone, _> =
            serde_json::from_str(r#"{"id": 3, "group": 40}"#);
        assert!(bad.is_err());
    }
}
