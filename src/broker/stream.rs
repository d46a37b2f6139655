//! Bounded collection of streamed greeks
//!
//! The analytics never retry or extend a window; whatever arrived before the
//! deadline is what they work with.

use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::GreeksStream;
use crate::domain::GreeksEvent;

/// When a collection window may close before its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectUntil {
    /// Keep listening for the whole window; later events replace earlier ones
    Deadline,
    /// Stop as soon as every expected symbol has an event
    Complete,
}

/// Drain `stream` into a map keyed by event symbol.
///
/// Only symbols in `expected` are kept. The stream ending also closes the
/// window.
pub async fn collect_greeks(
    mut stream: GreeksStream,
    expected: &HashSet<String>,
    window: Duration,
    until: CollectUntil,
) -> HashMap<String, GreeksEvent> {
    let deadline = Instant::now() + window;
    let mut received: HashMap<String, GreeksEvent> = HashMap::new();

    loop {
        if until == CollectUntil::Complete && received.len() >= expected.len() {
            break;
        }

        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(event)) => {
                if expected.contains(&event.event_symbol) {
                    received.insert(event.event_symbol.clone(), event);
                }
            }
            Ok(None) => {
                debug!("Greeks stream ended after {} events", received.len());
                break;
            }
            Err(_) => break,
        }
    }

    if received.len() < expected.len() {
        warn!(
            "Greeks window closed with {}/{} symbols",
            received.len(),
            expected.len()
        );
    }

    received
}
