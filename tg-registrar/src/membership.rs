//! Identity, target groups and the membership state the coordinator drives.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider-specific target group identifier (an ARN on AWS).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetGroupId(String);

impl TargetGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, non-empty set of target groups. Registration and deregistration both walk it in
/// this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupSet(Vec<TargetGroupId>);

impl TargetGroupSet {
    pub fn new(ids: Vec<TargetGroupId>) -> Result<Self, ConfigError> {
        if ids.is_empty() {
            return Err(ConfigError::EmptyTargetGroups);
        }
        Ok(Self(ids))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetGroupId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TargetGroupSet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ConfigError::EmptyTargetGroups);
        }

        let ids = s
            .split(',')
            .enumerate()
            .map(|(position, id)| match id.trim() {
                "" => Err(ConfigError::EmptyTargetGroupId { position }),
                id => Ok(TargetGroupId::new(id)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(ids)
    }
}

impl fmt::Display for TargetGroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(TargetGroupId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

/// Everything the coordinator and background tasks read. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct MembershipContext {
    pub instance_id: InstanceId,
    pub target_groups: TargetGroupSet,
}

impl MembershipContext {
    pub fn new(instance_id: InstanceId, target_groups: TargetGroupSet) -> Self {
        Self {
            instance_id,
            target_groups,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MembershipState {
    Unregistered,
    Registering,
    Registered,
    Deregistering,
    Deregistered,
}

impl MembershipState {
    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_advance_to(self, next: MembershipState) -> bool {
        matches!(
            (self, next),
            (MembershipState::Unregistered, MembershipState::Registering)
                | (MembershipState::Registering, MembershipState::Registered)
                | (MembershipState::Registering, MembershipState::Deregistering)
                | (MembershipState::Registered, MembershipState::Deregistering)
                | (MembershipState::Deregistering, MembershipState::Deregistered)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Unregistered => "unregistered",
            MembershipState::Registering => "registering",
            MembershipState::Registered => "registered",
            MembershipState::Deregistering => "deregistering",
            MembershipState::Deregistered => "deregistered",
        }
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
