use crate::histogram::AccessCount;
use chorus_types::{ConvoExchange, DeadDrop};
use std::collections::HashMap;
use tracing::error;

/// Pair the tail server's compacted incoming exchanges by dead-drop id.
///
/// Each slot's reply is: its own encrypted message when its drop is a
/// singleton (the echo lets the client detect an unanswered round), the
/// other slot's message when exactly two slots share the drop, and nothing
/// for slots beyond the first two at a colliding drop. Returns the replies,
/// one per incoming slot, and the `(singles, doubles)` counters over unique
/// drop groups.
pub fn match_exchanges(incoming: &[Vec<u8>]) -> (Vec<Vec<u8>>, AccessCount) {
    let exchanges: Vec<ConvoExchange> = incoming
        .iter()
        .map(|bytes| match ConvoExchange::from_bytes(bytes) {
            Ok(exchange) => exchange,
            Err(e) => {
                error!(bug = true, call = "ConvoExchange::from_bytes", error = %e);
                ConvoExchange::default()
            }
        })
        .collect();

    let mut singles: i64 = 0;
    let mut doubles: i64 = 0;
    let mut dead_drops: HashMap<DeadDrop, Vec<usize>> = HashMap::new();
    for (i, exchange) in exchanges.iter().enumerate() {
        let slots = dead_drops.entry(exchange.dead_drop).or_default();
        if slots.is_empty() {
            singles += 1;
            slots.push(i);
        } else if slots.len() == 1 {
            singles -= 1;
            doubles += 1;
            slots.push(i);
        }
        // Further arrivals at the same drop are ignored.
    }

    let mut replies = vec![Vec::new(); exchanges.len()];
    for (i, exchange) in exchanges.iter().enumerate() {
        let slots = &dead_drops[&exchange.dead_drop];
        if slots.len() == 1 {
            replies[i] = exchange.encrypted_message.to_vec();
        } else if slots[0] == i {
            replies[i] = exchanges[slots[1]].encrypted_message.to_vec();
        } else if slots[1] == i {
            replies[i] = exchanges[slots[0]].encrypted_message.to_vec();
        }
        // A third collider gets no reply and its Get slot returns random
        // bytes of the right size.
    }

    (replies, AccessCount { singles, doubles })
}
