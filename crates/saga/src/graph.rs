//! Graphviz export of the transition table.

use std::fmt::Write;

use crate::state::SagaState;
use crate::transitions::EDGES;

/// Renders the transition table as a DOT digraph.
pub fn to_dot() -> String {
    let mut dot = String::from("digraph OrderCheckoutSaga {\n    rankdir=LR;\n");

    for state in SagaState::ALL {
        let shape = if state.is_terminal() {
            "doublecircle"
        } else {
            "circle"
        };
        let _ = writeln!(dot, "    {state} [shape={shape}];");
    }

    for edge in EDGES {
        let mut label = edge.trigger.message_type().to_string();
        if let Some(action) = edge.when {
            let _ = write!(label, " [{action}]");
        }
        if let Some(command) = edge.emits {
            let _ = write!(label, " / {}", command.message_type());
        }
        let _ = writeln!(dot, "    {} -> {} [label=\"{label}\"];", edge.from, edge.to);
    }

    dot.push_str("}\n");
    dot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_state_and_edge() {
        let dot = to_dot();

        assert!(dot.starts_with("digraph OrderCheckoutSaga {"));
        assert!(dot.contains("Completed [shape=doublecircle];"));
        assert!(dot.contains("OrderPlaced [shape=circle];"));
        assert!(dot.contains(
            "NotStarted -> OrderPlaced [label=\"UserCheckedOut / PlaceOrder\"];"
        ));
        assert!(dot.contains(
            "OrderPlaced -> Cancelled [label=\"DeleteBasketFailed / CancelOrder\"];"
        ));
        assert!(dot.contains("OrderPlaced -> Faulted [label=\"SagaTimedOut [fault]\"];"));
        assert_eq!(dot.matches(" -> ").count(), EDGES.len());
    }
}
