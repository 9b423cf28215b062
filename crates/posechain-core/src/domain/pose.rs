//! Poses and the transitions between them.
//!
//! The pose set is small and fixed. Every ordered pair of distinct poses is a
//! transition clip, named `"start2end"`, so four poses give twelve directed
//! edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoseParseError {
    #[error("unknown pose: {0}")]
    UnknownPose(String),

    #[error("malformed transition name: {0} (expected \"start2end\")")]
    Malformed(String),

    #[error("transition must change pose, got {0}2{0}")]
    SelfLoop(Pose),
}

/// A named static state of the animated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Sit,
    Walk,
    Rest,
    Sleep,
}

impl Pose {
    pub const ALL: [Pose; 4] = [Pose::Sit, Pose::Walk, Pose::Rest, Pose::Sleep];

    /// The canonical rest pose: the first generated image, and the preferred
    /// start of the playback chain.
    pub const REST_POSE: Pose = Pose::Sit;

    pub fn as_str(self) -> &'static str {
        match self {
            Pose::Sit => "sit",
            Pose::Walk => "walk",
            Pose::Rest => "rest",
            Pose::Sleep => "sleep",
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pose {
    type Err = PoseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pose::ALL
            .into_iter()
            .find(|pose| pose.as_str() == s)
            .ok_or_else(|| PoseParseError::UnknownPose(s.to_string()))
    }
}

/// A directed clip `start -> end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Transition {
    start: Pose,
    end: Pose,
}

impl Transition {
    /// The seed transitions, generated one after another before anything else.
    ///
    /// Order matters: `rest2sleep` starts from the `rest` pose, which only
    /// exists once the last frame of `sit2rest` has been extracted.
    pub const SEEDS: [Transition; 3] = [
        Transition { start: Pose::Sit, end: Pose::Walk },
        Transition { start: Pose::Sit, end: Pose::Rest },
        Transition { start: Pose::Rest, end: Pose::Sleep },
    ];

    pub fn new(start: Pose, end: Pose) -> Result<Self, PoseParseError> {
        if start == end {
            return Err(PoseParseError::SelfLoop(start));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Pose {
        self.start
    }

    pub fn end(&self) -> Pose {
        self.end
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn is_seed(&self) -> bool {
        Self::SEEDS.contains(self)
    }

    /// The complete directed graph over [`Pose::ALL`], start-major.
    pub fn all() -> Vec<Transition> {
        Pose::ALL
            .into_iter()
            .flat_map(|start| {
                Pose::ALL
                    .into_iter()
                    .filter(move |end| *end != start)
                    .map(move |end| Transition { start, end })
            })
            .collect()
    }

    /// Every transition that is not a seed.
    pub fn remaining() -> Vec<Transition> {
        Self::all().into_iter().filter(|t| !t.is_seed()).collect()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}2{}", self.start, self.end)
    }
}

impl FromStr for Transition {
    type Err = PoseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('2')
            .ok_or_else(|| PoseParseError::Malformed(s.to_string()))?;
        Transition::new(start.parse()?, end.parse()?)
    }
}

impl TryFrom<String> for Transition {
    type Error = PoseParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Transition> for String {
    fn from(value: Transition) -> Self {
        value.to_string()
    }
}
