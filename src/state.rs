//! Channel state machine: named states, direction-aware transition maps and
//! the bookkeeping `complete_state` performs on every transition.
//!
//! The state set and the flag-clearing behaviour of `complete_state` are
//! grounded directly on `zap_set_state`/`zap_channel_complete_state` in the
//! original C core.

use std::sync::atomic::Ordering;

use crate::channel::{Channel, ChannelFlags};
use crate::error::{Result, ZtError};
use crate::logging::LogLevel;
use crate::span::Span;

/// All states a channel can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Down,
    Init,
    Ring,
    GenRing,
    Dialtone,
    Collect,
    Dialing,
    Progress,
    ProgressMedia,
    Up,
    CallWaiting,
    GetCallerId,
    Busy,
    Restart,
    Terminating,
    Hangup,
}

/// A hunt/transition direction: who is driving the state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TopDown,
    BottomUp,
}

/// Whether a state-map node, once matched, accepts the transition or ends
/// the search with a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Acceptable,
    End,
}

/// One node of a per-span state map: if the channel's current state is in
/// `check_states` and the requested direction matches, `node_type` decides
/// whether the move into `states` is accepted.
#[derive(Debug, Clone)]
pub struct StateMapNode {
    pub node_type: NodeType,
    pub direction: Direction,
    pub check_states: Vec<ChannelState>,
    /// `None` means "any state" (the `ANY_STATE` sentinel).
    pub states: Option<Vec<ChannelState>>,
}

impl StateMapNode {
    fn matches(&self, from: ChannelState, to: ChannelState, direction: Direction) -> bool {
        if self.direction != direction {
            return false;
        }
        if !self.check_states.contains(&from) {
            return false;
        }
        match &self.states {
            None => true,
            Some(states) => states.contains(&to),
        }
    }
}

/// An ordered sequence of [`StateMapNode`]s. The first node whose
/// `check_states`/`states` matches decides the outcome; later nodes are
/// never consulted once one has matched, even if it is an `End` node — this
/// first-match-wins behaviour is deliberate, not a bug.
#[derive(Debug, Clone, Default)]
pub struct StateMap {
    pub nodes: Vec<StateMapNode>,
}

impl StateMap {
    pub fn new(nodes: Vec<StateMapNode>) -> Self {
        Self { nodes }
    }

    /// Returns `Ok(())` if `from -> to` is an accepted transition under
    /// `direction`, or an error describing the rejection.
    pub fn validate(&self, from: ChannelState, to: ChannelState, direction: Direction) -> Result<()> {
        for node in &self.nodes {
            if node.matches(from, to, direction) {
                return match node.node_type {
                    NodeType::Acceptable => Ok(()),
                    NodeType::End => Err(ZtError::InvalidTransition {
                        from: format!("{from:?}"),
                        to: format!("{to:?}"),
                    }),
                };
            }
        }
        Err(ZtError::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        })
    }
}

/// The built-in fallback transition table consulted when a span installs no
/// custom [`StateMap`], grounded on `zap_channel_set_state`'s `switch
/// (zchan->state)` block in the original C core.
fn built_in_table_allows(from: ChannelState, to: ChannelState) -> bool {
    use ChannelState::*;
    match from {
        Hangup | Terminating => matches!(to, Down | Busy | Restart),
        Up => !matches!(to, Progress | ProgressMedia | Ring),
        Down => matches!(
            to,
            Dialtone | Collect | Dialing | Ring | Progress | ProgressMedia | GetCallerId | GenRing
        ),
        Busy => to != Up,
        _ => true,
    }
}

/// Drive `channel` into `to`, enforcing the full §4.2 transition rule:
/// the channel must be READY, a SUSPENDED span only accepts RESTART/DOWN,
/// the span's custom state map (or the built-in fallback table when none is
/// installed) must accept `(from, to, direction)`, and self-transitions are
/// always rejected. On acceptance, `active_count` and the STATE_CHANGE flags
/// on both channel and span are updated per §4.2/§5.
pub fn set_state(channel: &mut Channel, span: &Span, to: ChannelState, direction: Direction) -> Result<()> {
    if !channel.flags.contains(ChannelFlags::READY) {
        return Err(ZtError::fail("channel not ready for state change"));
    }

    if span.suspended.load(Ordering::SeqCst) && !matches!(to, ChannelState::Restart | ChannelState::Down) {
        return Err(ZtError::fail("span is suspended"));
    }

    let from = channel.state;

    let mut ok = match &span.state_map {
        Some(map) => map.validate(from, to, direction).is_ok(),
        None => built_in_table_allows(from, to),
    };

    if to == from {
        ok = false;
    }

    if !ok {
        return Err(ZtError::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        });
    }

    if from == ChannelState::Down {
        span.active_count.fetch_add(1, Ordering::SeqCst);
    } else if to == ChannelState::Down {
        span.active_count.fetch_sub(1, Ordering::SeqCst);
    }

    channel.last_state = from;
    channel.state = to;
    channel.flags.insert(ChannelFlags::STATE_CHANGE);
    span.state_change.store(true, Ordering::SeqCst);
    complete_state(channel);
    channel.log_tag.log(
        LogLevel::Flow,
        &format!("state change {from:?} -> {to:?}"),
    );
    Ok(())
}

/// Bookkeeping run on every completed transition: clears the call-progress
/// flags on a move to `Down`, as the source core's
/// `zap_channel_complete_state` does.
pub fn complete_state(channel: &mut Channel) {
    if channel.state == ChannelState::Down {
        channel.flags.remove(
            ChannelFlags::PROGRESS
                | ChannelFlags::MEDIA
                | ChannelFlags::ANSWERED
                | ChannelFlags::RINGING
                | ChannelFlags::WINK
                | ChannelFlags::FLASH
                | ChannelFlags::OFFHOOK
                | ChannelFlags::HOLD
                | ChannelFlags::THREE_WAY,
        );
        channel.caller_data = Default::default();
    }
}
