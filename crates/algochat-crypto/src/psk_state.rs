//! Per-peer PSK ratchet state: the send counter, the sliding replay
//! window over received counters, and the set of counters seen within
//! that window.
//!
//! This is the one piece of mutable state in the crypto path (see the
//! crate-level docs): everything else here is pure, but a `PSKState`
//! must be read and written under a single owner so that two
//! concurrent receives for the same peer cannot both accept the same
//! counter. The facade above this crate is responsible for that
//! serialization; this type itself is a plain, non-thread-safe struct.

use std::collections::HashSet;

/// How far behind or ahead of `peer_last_counter` an incoming counter
/// may be before it is rejected outright.
pub const COUNTER_WINDOW: u32 = 200;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PskStateError {
    #[error("counter {counter} is outside the replay window (peer last counter {peer_last_counter})")]
    CounterOutOfRange { counter: u32, peer_last_counter: u32 },
    #[error("counter {0} has already been seen")]
    ReplayDetected(u32),
}

/// Ratchet state for one PSK contact.
#[derive(Debug, Clone, Default)]
pub struct PskState {
    send_counter: u32,
    peer_last_counter: u32,
    seen_counters: HashSet<u32>,
}

impl PskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_counter(&self) -> u32 {
        self.send_counter
    }

    pub fn peer_last_counter(&self) -> u32 {
        self.peer_last_counter
    }

    pub fn seen_counters(&self) -> &HashSet<u32> {
        &self.seen_counters
    }

    /// Returns the counter to stamp on the next outbound message, then
    /// advances the send side of the ratchet.
    pub fn advance_send_counter(&mut self) -> u32 {
        let current = self.send_counter;
        self.send_counter += 1;
        current
    }

    /// Validate and, on success, record an incoming counter.
    ///
    /// 1. Reject if `c < peer_last_counter - COUNTER_WINDOW` (underflow-safe).
    /// 2. Reject if `c` was already seen.
    /// 3. Reject if `c > peer_last_counter + COUNTER_WINDOW`.
    /// 4. Record `c`; advance `peer_last_counter` if `c` is new high water.
    /// 5. Prune counters that have fallen out of the window.
    pub fn validate_and_record_receive(&mut self, counter: u32) -> Result<(), PskStateError> {
        let lower_bound = self.peer_last_counter.saturating_sub(COUNTER_WINDOW);
        if counter < lower_bound {
            return Err(PskStateError::CounterOutOfRange {
                counter,
                peer_last_counter: self.peer_last_counter,
            });
        }
        if self.seen_counters.contains(&counter) {
            return Err(PskStateError::ReplayDetected(counter));
        }
        if counter > self.peer_last_counter.saturating_add(COUNTER_WINDOW) {
            return Err(PskStateError::CounterOutOfRange {
                counter,
                peer_last_counter: self.peer_last_counter,
            });
        }

        self.seen_counters.insert(counter);
        if counter > self.peer_last_counter {
            self.peer_last_counter = counter;
        }

        let prune_below = self.peer_last_counter.saturating_sub(COUNTER_WINDOW);
        self.seen_counters.retain(|c| *c >= prune_below);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_counter_advances_monotonically() {
        let mut state = PskState::new();
        assert_eq!(state.advance_send_counter(), 0);
        assert_eq!(state.advance_send_counter(), 1);
        assert_eq!(state.advance_send_counter(), 2);
    }

    #[test]
    fn replaying_a_counter_is_rejected() {
        let mut state = PskState::new();
        state.validate_and_record_receive(10).unwrap();
        assert_eq!(
            state.validate_and_record_receive(10),
            Err(PskStateError::ReplayDetected(10))
        );
    }

    // Five independent trials from the same starting state: peerLastCounter
    // = 50, seenCounters = {50}.
    fn scenario_start() -> PskState {
        PskState {
            send_counter: 0,
            peer_last_counter: 50,
            seen_counters: HashSet::from([50]),
        }
    }

    #[test]
    fn spec_scenario_4_accepts_and_advances_past_last_counter() {
        let mut state = scenario_start();
        state.validate_and_record_receive(51).unwrap();
        assert_eq!(state.peer_last_counter(), 51);
    }

    #[test]
    fn spec_scenario_4_accepts_within_window_without_advancing() {
        let mut state = scenario_start();
        state.validate_and_record_receive(0).unwrap();
        assert_eq!(state.peer_last_counter(), 50);
    }

    #[test]
    fn spec_scenario_4_accepts_at_the_upper_edge_of_the_window() {
        let mut state = scenario_start();
        state.validate_and_record_receive(249).unwrap();
        assert_eq!(state.peer_last_counter(), 249);
    }

    #[test]
    fn spec_scenario_4_rejects_just_past_the_upper_edge() {
        let mut state = scenario_start();
        assert_eq!(
            state.validate_and_record_receive(251),
            Err(PskStateError::CounterOutOfRange {
                counter: 251,
                peer_last_counter: 50,
            })
        );
    }

    #[test]
    fn spec_scenario_4_rejects_the_seen_counter_as_replay() {
        let mut state = scenario_start();
        assert_eq!(
            state.validate_and_record_receive(50),
            Err(PskStateError::ReplayDetected(50))
        );
    }

    #[test]
    fn counter_far_above_window_is_out_of_range() {
        let mut state = PskState::new();
        state.validate_and_record_receive(100).unwrap();
        assert_eq!(
            state.validate_and_record_receive(301),
            Err(PskStateError::CounterOutOfRange {
                counter: 301,
                peer_last_counter: 100,
            })
        );
    }

    #[test]
    fn counter_far_below_window_is_out_of_range() {
        let mut state = PskState::new();
        state.validate_and_record_receive(300).unwrap();
        assert_eq!(
            state.validate_and_record_receive(50),
            Err(PskStateError::CounterOutOfRange {
                counter: 50,
                peer_last_counter: 300,
            })
        );
    }

    #[test]
    fn pruning_removes_counters_below_the_window() {
        let mut state = PskState::new();
        state.validate_and_record_receive(10).unwrap();
        state.validate_and_record_receive(400).unwrap();
        // window is now [200, 600]; 10 must have been pruned
        assert!(!state.seen_counters().contains(&10));
    }

    #[test]
    fn out_of_order_receipt_within_window_is_accepted() {
        let mut state = PskState::new();
        state.validate_and_record_receive(5).unwrap();
        state.validate_and_record_receive(3).unwrap();
        state.validate_and_record_receive(7).unwrap();
        assert_eq!(state.peer_last_counter(), 7);
    }
}
