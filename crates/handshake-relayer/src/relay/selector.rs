// Step selection: pure decision tables over the probed state of both sides

use serde::Serialize;
use std::fmt;

use crate::chains::{Order, State};
use crate::error::RelayerError;

/// Which end of a path a message is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Src,
    Dst,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Src => f.write_str("src"),
            Side::Dst => f.write_str("dst"),
        }
    }
}

/// Handshake action, shared by connections and channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    Init,
    Try,
    Ack,
    Confirm,
    CloseInit,
    CloseConfirm,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Init => "Init",
            Action::Try => "Try",
            Action::Ack => "Ack",
            Action::Confirm => "Confirm",
            Action::CloseInit => "CloseInit",
            Action::CloseConfirm => "CloseConfirm",
        };
        f.write_str(name)
    }
}

/// The single next action and the side that must receive it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub action: Action,
    pub target: Side,
}

impl Step {
    pub fn new(action: Action, target: Side) -> Self {
        Self { action, target }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.action, self.target)
    }
}

/// Observed `(srcState, dstState)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StatePair {
    pub src: State,
    pub dst: State,
}

impl StatePair {
    pub fn new(src: State, dst: State) -> Self {
        Self { src, dst }
    }
}

impl fmt::Display for StatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.src, self.dst)
    }
}

/// Next connection-opening step, `None` once both ends are OPEN
///
/// When both sides could move, the side that is behind advances;
/// `src` initiates from a blank slate.
pub fn select_connection_step(src: State, dst: State) -> Result<Option<Step>, RelayerError> {
    use State::*;

    let step = match (src, dst) {
        (Uninitialized, Uninitialized) => Step::new(Action::Init, Side::Src),
        (Init, Uninitialized) => Step::new(Action::Try, Side::Dst),
        (Uninitialized, Init) => Step::new(Action::Try, Side::Src),
        (Init, Init) => Step::new(Action::Try, Side::Dst),
        (Init, TryOpen) => Step::new(Action::Ack, Side::Src),
        (TryOpen, Init) => Step::new(Action::Ack, Side::Dst),
        (Open, TryOpen) => Step::new(Action::Confirm, Side::Dst),
        (TryOpen, Open) => Step::new(Action::Confirm, Side::Src),
        (Open, Open) => return Ok(None),
        (src, dst) => {
            return Err(RelayerError::illegal(
                src,
                dst,
                "no handshake step leads out of this state pair",
            ))
        }
    };

    Ok(Some(step))
}

/// Next channel-opening step
///
/// Same table as connections; an end that exists must carry the requested ordering.
pub fn select_channel_step(
    src: (State, Order),
    dst: (State, Order),
    ordering: Order,
) -> Result<Option<Step>, RelayerError> {
    let (src_state, src_order) = src;
    let (dst_state, dst_order) = dst;

    for (state, order, side) in [(src_state, src_order, Side::Src), (dst_state, dst_order, Side::Dst)] {
        if state != State::Uninitialized && order != ordering {
            return Err(RelayerError::illegal(
                src_state,
                dst_state,
                format!(
                    "{} channel end is {} but {} was requested",
                    side, order, ordering
                ),
            ));
        }
    }

    select_connection_step(src_state, dst_state)
}

/// Next channel-closing step, `None` once both ends are CLOSED
pub fn select_channel_close_step(src: State, dst: State) -> Result<Option<Step>, RelayerError> {
    use State::*;

    let step = match (src, dst) {
        (Open, Open) => Step::new(Action::CloseInit, Side::Src),
        (Closed, Open) => Step::new(Action::CloseConfirm, Side::Dst),
        (Open, Closed) => Step::new(Action::CloseConfirm, Side::Src),
        (Closed, Closed) => return Ok(None),
        (src, dst) => {
            return Err(RelayerError::illegal(
                src,
                dst,
                "channel can only be closed from OPEN on both ends",
            ))
        }
    };

    Ok(Some(step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use State::*;

    const ALL: [State; 5] = [Uninitialized, Init, TryOpen, Open, Closed];

    #[test]
    fn test_connection_scenarios() {
        let cases = [
            ((Uninitialized, Uninitialized), Step::new(Action::Init, Side::Src)),
            ((Init, Uninitialized), Step::new(Action::Try, Side::Dst)),
            ((Init, TryOpen), Step::new(Action::Ack, Side::Src)),
            ((Open, TryOpen), Step::new(Action::Confirm, Side::Dst)),
        ];
        for ((src, dst), expected) in cases {
            assert_eq!(select_connection_step(src, dst).unwrap(), Some(expected));
        }
        assert_eq!(select_connection_step(Open, Open).unwrap(), None);
    }

    #[test]
    fn test_mirror_rows_target_the_side_behind() {
        assert_eq!(
            select_connection_step(Uninitialized, Init).unwrap(),
            Some(Step::new(Action::Try, Side::Src))
        );
        assert_eq!(
            select_connection_step(TryOpen, Init).unwrap(),
            Some(Step::new(Action::Ack, Side::Dst))
        );
        assert_eq!(
            select_connection_step(TryOpen, Open).unwrap(),
            Some(Step::new(Action::Confirm, Side::Src))
        );
    }

    #[test]
    fn test_illegal_pairs() {
        let err = select_connection_step(TryOpen, TryOpen).unwrap_err();
        assert!(matches!(err, RelayerError::IllegalState { .. }));
        assert_eq!(err.last_observed(), Some(StatePair::new(TryOpen, TryOpen)));

        assert!(select_connection_step(Open, Uninitialized).is_err());
        assert!(select_connection_step(Closed, Open).is_err());
    }

    #[test]
    fn test_every_pair_is_deterministic() {
        for src in ALL {
            for dst in ALL {
                let first = select_connection_step(src, dst);
                let second = select_connection_step(src, dst);
                match (first, second) {
                    (Ok(a), Ok(b)) => assert_eq!(a, b),
                    (Err(_), Err(_)) => {}
                    _ => panic!("selector not deterministic for ({}, {})", src, dst),
                }
            }
        }
    }

    #[test]
    fn test_channel_ordering_must_match() {
        let step = select_channel_step(
            (Init, Order::Ordered),
            (Uninitialized, Order::None),
            Order::Ordered,
        )
        .unwrap();
        assert_eq!(step, Some(Step::new(Action::Try, Side::Dst)));

        let err = select_channel_step(
            (Init, Order::Unordered),
            (Uninitialized, Order::None),
            Order::Ordered,
        )
        .unwrap_err();
        assert!(err.to_string().contains("UNORDERED"));
    }

    #[test]
    fn test_channel_close_table() {
        assert_eq!(
            select_channel_close_step(Open, Open).unwrap(),
            Some(Step::new(Action::CloseInit, Side::Src))
        );
        assert_eq!(
            select_channel_close_step(Closed, Open).unwrap(),
            Some(Step::new(Action::CloseConfirm, Side::Dst))
        );
        assert_eq!(
            select_channel_close_step(Open, Closed).unwrap(),
            Some(Step::new(Action::CloseConfirm, Side::Src))
        );
        assert_eq!(select_channel_close_step(Closed, Closed).unwrap(), None);
        assert!(select_channel_close_step(Init, Open).is_err());
    }

    #[test]
    fn test_state_pair_display() {
        assert_eq!(StatePair::new(Init, Uninitialized).to_string(), "(INIT, UNINITIALIZED)");
        assert_eq!(Step::new(Action::Ack, Side::Src).to_string(), "Ack@src");
    }
}
