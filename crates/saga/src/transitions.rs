//! The checkout transition table.
//!
//! [`decide`] is the single source of truth for what a `(state, trigger)`
//! pair does. [`EDGES`] lists the state-changing pairs explicitly so they can
//! be rendered and audited; [`validate`] checks the two agree and runs once,
//! before the first message is dispatched.

use std::sync::OnceLock;

use contracts::{
    CancelOrder, CompleteOrder, DeleteBasketComplete, DeleteBasketFailed, IntegrationMessage,
    PlaceOrder, SagaTimedOut, UserCheckedOut,
};
use saga_store::FaultKind;

use crate::config::TimeoutAction;
use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// Messages that drive the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    UserCheckedOut,
    DeleteBasketComplete,
    DeleteBasketFailed,
    SagaTimedOut,
}

impl Trigger {
    pub const ALL: [Trigger; 4] = [
        Trigger::UserCheckedOut,
        Trigger::DeleteBasketComplete,
        Trigger::DeleteBasketFailed,
        Trigger::SagaTimedOut,
    ];

    /// Wire name of the triggering message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Trigger::UserCheckedOut => UserCheckedOut::MESSAGE_TYPE,
            Trigger::DeleteBasketComplete => DeleteBasketComplete::MESSAGE_TYPE,
            Trigger::DeleteBasketFailed => DeleteBasketFailed::MESSAGE_TYPE,
            Trigger::SagaTimedOut => SagaTimedOut::MESSAGE_TYPE,
        }
    }

    pub fn from_message_type(message_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.message_type() == message_type)
    }
}

/// Command emitted by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    PlaceOrder,
    CompleteOrder,
    CancelOrder,
}

impl Command {
    pub fn message_type(&self) -> &'static str {
        match self {
            Command::PlaceOrder => PlaceOrder::MESSAGE_TYPE,
            Command::CompleteOrder => CompleteOrder::MESSAGE_TYPE,
            Command::CancelOrder => CancelOrder::MESSAGE_TYPE,
        }
    }
}

/// Outcome of looking up a `(state, trigger)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Move to `to`, emit `emits`, and park `fault` alongside if set.
    Transition {
        to: SagaState,
        emits: Option<Command>,
        fault: Option<FaultKind>,
    },
    /// Redelivered or late message. Record it and do nothing else.
    Duplicate,
    /// Park the message for an operator.
    Park(FaultKind),
}

/// One state-changing entry of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: SagaState,
    pub trigger: Trigger,
    pub to: SagaState,
    pub emits: Option<Command>,
    /// Only taken under this timeout action.
    pub when: Option<TimeoutAction>,
}

pub const EDGES: &[Edge] = &[
    Edge {
        from: SagaState::NotStarted,
        trigger: Trigger::UserCheckedOut,
        to: SagaState::OrderPlaced,
        emits: Some(Command::PlaceOrder),
        when: None,
    },
    Edge {
        from: SagaState::OrderPlaced,
        trigger: Trigger::DeleteBasketComplete,
        to: SagaState::Completed,
        emits: Some(Command::CompleteOrder),
        when: None,
    },
    Edge {
        from: SagaState::OrderPlaced,
        trigger: Trigger::DeleteBasketFailed,
        to: SagaState::Cancelled,
        emits: Some(Command::CancelOrder),
        when: None,
    },
    Edge {
        from: SagaState::OrderPlaced,
        trigger: Trigger::SagaTimedOut,
        to: SagaState::Faulted,
        emits: None,
        when: Some(TimeoutAction::Fault),
    },
    Edge {
        from: SagaState::OrderPlaced,
        trigger: Trigger::SagaTimedOut,
        to: SagaState::Cancelled,
        emits: Some(Command::CancelOrder),
        when: Some(TimeoutAction::Cancel),
    },
];

/// Decides what `trigger` does to a saga in `state`.
///
/// Only the state is consulted, not how the saga got there. A
/// `DeleteBasketFailed` reaching `Cancelled` is therefore a duplicate even
/// when a timeout did the cancelling: `CancelOrder` already went out for
/// that order.
pub fn decide(state: SagaState, trigger: Trigger, timeout_action: TimeoutAction) -> Decision {
    use SagaState::*;

    match (state, trigger) {
        (NotStarted, Trigger::UserCheckedOut) => Decision::Transition {
            to: OrderPlaced,
            emits: Some(Command::PlaceOrder),
            fault: None,
        },
        (NotStarted, _) => Decision::Park(FaultKind::Orphaned),

        (OrderPlaced | Completed | Cancelled | Faulted, Trigger::UserCheckedOut) => {
            Decision::Duplicate
        }

        (OrderPlaced, Trigger::DeleteBasketComplete) => Decision::Transition {
            to: Completed,
            emits: Some(Command::CompleteOrder),
            fault: None,
        },
        (OrderPlaced, Trigger::DeleteBasketFailed) => Decision::Transition {
            to: Cancelled,
            emits: Some(Command::CancelOrder),
            fault: None,
        },
        (OrderPlaced, Trigger::SagaTimedOut) => match timeout_action {
            TimeoutAction::Fault => Decision::Transition {
                to: Faulted,
                emits: None,
                fault: Some(FaultKind::TimedOut),
            },
            TimeoutAction::Cancel => Decision::Transition {
                to: Cancelled,
                emits: Some(Command::CancelOrder),
                fault: None,
            },
        },

        (Completed, Trigger::DeleteBasketComplete) | (Cancelled, Trigger::DeleteBasketFailed) => {
            Decision::Duplicate
        }
        (Completed | Cancelled | Faulted, Trigger::SagaTimedOut) => Decision::Duplicate,

        (Completed, Trigger::DeleteBasketFailed)
        | (Cancelled, Trigger::DeleteBasketComplete)
        | (Faulted, Trigger::DeleteBasketComplete | Trigger::DeleteBasketFailed) => {
            Decision::Park(FaultKind::UnknownTransition)
        }
    }
}

fn check_table() -> std::result::Result<(), String> {
    for edge in EDGES {
        if edge.from.is_terminal() {
            return Err(format!("edge leaves terminal state {}", edge.from));
        }
        if edge.from == edge.to {
            return Err(format!("self-loop on {} via {:?}", edge.from, edge.trigger));
        }
        let actions = match edge.when {
            Some(action) => vec![action],
            None => vec![TimeoutAction::Fault, TimeoutAction::Cancel],
        };
        for action in actions {
            match decide(edge.from, edge.trigger, action) {
                Decision::Transition { to, emits, .. } if to == edge.to && emits == edge.emits => {}
                other => {
                    return Err(format!(
                        "edge {} --{:?}--> {} decides {:?} under {}",
                        edge.from, edge.trigger, edge.to, other, action
                    ));
                }
            }
        }
    }

    for state in SagaState::ALL {
        for trigger in Trigger::ALL {
            for action in [TimeoutAction::Fault, TimeoutAction::Cancel] {
                if let Decision::Transition { to, .. } = decide(state, trigger, action) {
                    let listed = EDGES.iter().any(|e| {
                        e.from == state
                            && e.trigger == trigger
                            && e.to == to
                            && e.when.is_none_or(|w| w == action)
                    });
                    if !listed {
                        return Err(format!(
                            "transition {state} --{trigger:?}--> {to} under {action} is not in the table"
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Checks the table once per process.
pub fn validate() -> Result<()> {
    static CHECKED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    CHECKED
        .get_or_init(check_table)
        .clone()
        .map_err(SagaError::InvalidTransitionTable)
}
