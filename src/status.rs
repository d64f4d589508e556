//! Member status and the supersedes relation that orders observations.

use crate::node::Node;
use std::collections::BTreeSet;

pub type Incarnation = u64;

/// A member's status as last observed, tagged with the incarnation it was
/// observed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Alive(Incarnation),
    Suspect(Incarnation, BTreeSet<Node>),
    /// Only ever constructed when the unreachability extension is enabled;
    /// see [`crate::config::Config::extension_unreachability`].
    Unreachable(Incarnation),
    Dead,
}

impl Status {
    pub fn incarnation(&self) -> Option<Incarnation> {
        match self {
            Status::Alive(i) | Status::Unreachable(i) => Some(*i),
            Status::Suspect(i, _) => Some(*i),
            Status::Dead => None,
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Status::Dead)
    }

    pub fn is_suspect(&self) -> bool {
        matches!(self, Status::Suspect(..))
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Status::Alive(_))
    }

    /// Rank used to break incarnation ties: `dead > unreachable > suspect > alive`.
    fn rank(&self) -> u8 {
        match self {
            Status::Alive(_) => 0,
            Status::Suspect(..) => 1,
            Status::Unreachable(_) => 2,
            Status::Dead => 3,
        }
    }

    /// Does `self` supersede `other`? i.e. is `self` at least as new, so that
    /// an update path should keep `self` and drop `other`.
    ///
    /// `Dead` has no incarnation of its own and always supersedes anything at
    /// or below its rank; it never loses to a higher incarnation because
    /// nothing can un-kill a member within this Instance (see §4.7 of the
    /// spec this module implements).
    pub fn supersedes(&self, other: &Status) -> bool {
        if matches!(self, Status::Dead) {
            return true;
        }
        if matches!(other, Status::Dead) {
            return false;
        }
        let (my_inc, other_inc) = (self.incarnation().unwrap(), other.incarnation().unwrap());
        match my_inc.cmp(&other_inc) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match (self, other) {
                (Status::Suspect(_, mine), Status::Suspect(_, theirs)) => {
                    mine.len() >= theirs.len() && mine.is_superset(theirs)
                }
                _ => self.rank() >= other.rank(),
            },
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Alive(i) => write!(f, "alive({i})"),
            Status::Suspect(i, by) => write!(f, "suspect({i}, by={})", by.len()),
            Status::Unreachable(i) => write!(f, "unreachable({i})"),
            Status::Dead => write!(f, "dead"),
        }
    }
}
