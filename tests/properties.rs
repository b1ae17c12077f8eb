//! Property tests for membership, manager election, lifecycle and port allocation
//!
//! Arbitrary join/leave/tick sequences are applied to a lobby controller and
//! the invariants are checked after every step.

mod fixtures;

use arena_lobby::config::LobbyOptions;
use arena_lobby::lobby::{LobbyController, LobbyRegistry};
use arena_lobby::types::LifecycleState;
use fixtures::{create_test_system, player};
use proptest::prelude::*;
use std::time::Duration;
use tokio::sync::mpsc;

const GRACE_MS: u64 = 1000;

#[derive(Debug, Clone)]
enum Op {
    Join(u8),
    Leave(u8),
    Tick(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8).prop_map(Op::Join),
        (0u8..8).prop_map(Op::Leave),
        (1u64..400).prop_map(Op::Tick),
    ]
}

fn controller() -> LobbyController {
    let mut system = create_test_system();
    system.context.lobby_settings.no_manager_dispose_delay_ms = GRACE_MS;
    let (exits_tx, _exits_rx) = mpsc::unbounded_channel();
    LobbyController::new(
        "prop-lobby".to_string(),
        LobbyOptions {
            max_clients: 6,
            ..Default::default()
        },
        system.context,
        exits_tx,
    )
}

/// How long the lobby has gone without a manager, as seen by ticks.
/// The tick that first notices the vacancy starts the clock at zero.
#[derive(Debug, Default)]
struct ManagerlessClock {
    since: Option<u64>,
    stopped: bool,
}

impl ManagerlessClock {
    fn tick(&mut self, has_manager: bool, elapsed_ms: u64) {
        if self.stopped {
            return;
        }
        self.since = match (self.since, has_manager) {
            (_, true) => None,
            (None, false) => Some(0),
            (Some(total), false) => Some(total + elapsed_ms),
        };
        if self.since.is_some_and(|total| total >= GRACE_MS) {
            self.stopped = true;
        }
    }

    fn expected(&self) -> LifecycleState {
        match (self.stopped, self.since) {
            (true, _) => LifecycleState::Stopped,
            (false, Some(_)) => LifecycleState::Stopping,
            (false, None) => LifecycleState::Running,
        }
    }
}

proptest! {
    #[test]
    fn manager_invariant_and_lifecycle_under_interleaving(
        ops in prop::collection::vec(op_strategy(), 1..120)
    ) {
        let mut lobby = controller();
        let mut clock = ManagerlessClock::default();

        for op in ops {
            match op {
                Op::Join(n) => {
                    let accepted = lobby.join(&format!("s{}", n), player("p")).is_ok();
                    if clock.stopped {
                        prop_assert!(!accepted);
                    }
                }
                Op::Leave(n) => {
                    lobby.leave(&format!("s{}", n), true);
                    // Every departure hands authority to the earliest arrival
                    let first = lobby.members().first().map(|m| m.session_id.clone());
                    prop_assert_eq!(lobby.manager().map(str::to_string), first);
                }
                Op::Tick(ms) => {
                    clock.tick(lobby.manager().is_some(), ms);
                    lobby.tick(Duration::from_millis(ms));
                    prop_assert_eq!(lobby.lifecycle(), clock.expected());
                    prop_assert_eq!(lobby.is_disposed(), clock.stopped);
                }
            }

            match lobby.manager() {
                Some(manager) => prop_assert!(lobby.members().contains(manager)),
                None => prop_assert!(lobby.members().is_empty()),
            }
            prop_assert!(lobby.members().len() <= 6);
        }
    }

    #[test]
    fn repeated_leave_is_a_no_op(joined in 1u8..6, target in 0u8..6) {
        let mut lobby = controller();
        for n in 0..joined {
            lobby.join(&format!("s{}", n), player("p")).unwrap();
        }

        let session = format!("s{}", target);
        lobby.leave(&session, false);
        let once = lobby.snapshot();
        prop_assert!(!lobby.leave(&session, false));
        let twice = lobby.snapshot();

        prop_assert_eq!(once.members, twice.members);
        prop_assert_eq!(once.manager_session_id, twice.manager_session_id);
    }

    #[test]
    fn ports_are_handed_out_once_in_order(start in 1u16..u16::MAX, count in 1usize..200) {
        let registry = LobbyRegistry::new(start);
        let mut previous = None;

        for _ in 0..count {
            match registry.allocate_port() {
                Ok(port) => {
                    if let Some(prev) = previous {
                        prop_assert_eq!(port, prev + 1);
                    } else {
                        prop_assert_eq!(port, start);
                    }
                    previous = Some(port);
                }
                Err(_) => {
                    // Only the top of the range runs out
                    prop_assert_eq!(previous, Some(u16::MAX));
                    prop_assert!(registry.allocate_port().is_err());
                    break;
                }
            }
        }
    }
}
