use proptest::prelude::*;

use ocean_referee::engine::*;
use ocean_referee::protocol::{ActionCmd, PlayerMoves, SpawnCmd};

fn ability() -> impl Strategy<Value = Ability> {
    prop_oneof![
        8 => proptest::sample::select(Ability::ALL.to_vec()),
        1 => Just(Ability::Unrecognized),
    ]
}

fn verb() -> impl Strategy<Value = Verb> {
    prop_oneof![
        8 => proptest::sample::select(Verb::ALL.to_vec()),
        1 => Just(Verb::Unrecognized),
    ]
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        8 => proptest::sample::select(Direction::ALL.to_vec()),
        1 => Just(Direction::Unrecognized),
    ]
}

/// Ids collide across players on purpose so ownership checks get exercised.
fn bot_id() -> impl Strategy<Value = u32> {
    prop_oneof![100u32..106, 200u32..206]
}

fn spawn_cmd() -> impl Strategy<Value = SpawnCmd> {
    (
        proptest::collection::vec(ability(), 0..4),
        -1i32..21,
        -1i32..21,
    )
        .prop_map(|(abilities, x, y)| SpawnCmd {
            abilities,
            location: Point::new(x, y),
        })
}

fn action_cmd() -> impl Strategy<Value = ActionCmd> {
    (verb(), direction()).prop_map(|(action, direction)| ActionCmd { action, direction })
}

fn player_moves() -> impl Strategy<Value = PlayerMoves> {
    (
        proptest::collection::btree_map(bot_id(), spawn_cmd(), 0..3),
        proptest::collection::btree_map(bot_id(), action_cmd(), 0..4),
    )
        .prop_map(|(spawns, actions)| PlayerMoves {
            tick: None,
            spawns,
            actions,
        })
}

fn check_invariants(state: &MatchState) -> Result<(), TestCaseError> {
    for bot in state.bots().iter() {
        prop_assert!(bot.energy >= 0.0, "bot {} has {} energy", bot.id, bot.energy);
        prop_assert!(bot.algae_held <= MAX_ALGAE_HELD);
        prop_assert!(state.board().in_bounds(bot.location));
        prop_assert!(!state.board().is_wall(bot.location));
        prop_assert_eq!(state.bots().occupant(bot.location), Some(bot.id));
    }
    for player in PlayerId::ALL {
        prop_assert!(state.scraps(player) <= STARTING_SCRAPS);
        prop_assert!(state.bots().owned_by(player).count() <= MAX_BOTS);
    }
    for bank in state.banks() {
        if let Some(deposit) = bank.deposit {
            prop_assert!(deposit.ticks_left >= 1 && deposit.ticks_left <= DEPOSIT_TICKS);
        }
        if let Some(pick) = bank.lockpick {
            prop_assert!(pick.ticks_left >= 1 && pick.ticks_left <= LOCKPICK_TICKS);
        }
    }
    prop_assert!(state.algae_remaining() <= state.initial_algae());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_commands_keep_the_state_consistent(
        seed in any::<u64>(),
        mirrored in any::<bool>(),
        turns in proptest::collection::vec(player_moves(), 1..40),
    ) {
        let mut state = MatchState::new(seed).with_mirrored_player_b(mirrored);
        for moves in &turns {
            let tick = state.tick();
            prop_assert_eq!(state.current_player(), PlayerId::for_tick(tick));
            state.apply_moves(moves);
            check_invariants(&state)?;
            state.advance_tick();
            prop_assert_eq!(state.tick(), tick + 1);
            prop_assert!(state.banked(PlayerId::A) + state.banked(PlayerId::B) <= state.initial_algae());
            check_invariants(&state)?;
        }
    }

    #[test]
    fn rejected_commands_change_nothing(
        seed in any::<u64>(),
        setup in player_moves(),
        action in action_cmd(),
        id in bot_id(),
    ) {
        let mut state = MatchState::new(seed);
        state.apply_moves(&setup);
        let player = state.current_player();
        let before = state.snapshot();
        if state.act(player, id, action.direction, action.action).is_err() {
            prop_assert_eq!(state.snapshot(), before.clone());
            let again = state.act(player, id, action.direction, action.action);
            prop_assert!(again.is_err());
            prop_assert_eq!(state.snapshot(), before);
        }
    }

    #[test]
    fn unscouted_hazards_stay_hidden(
        seed in any::<u64>(),
        turns in proptest::collection::vec(player_moves(), 0..20),
    ) {
        let mut state = MatchState::new(seed);
        for moves in &turns {
            state.apply_moves(moves);
            state.advance_tick();
        }
        for player in PlayerId::ALL {
            let scouts: Vec<Point> = state
                .bots()
                .owned_by(player)
                .filter(|b| b.has(Ability::Scout))
                .map(|b| b.location)
                .collect();
            let view = state.project(player);
            let frame = state.frame(player);
            for algae in &view.visible_entities.algae {
                let location = frame.point(algae.location, state.board().width());
                let scouted = scouts.iter().any(|s| s.manhattan(location) <= SCOUT_RADIUS);
                prop_assert_eq!(algae.is_poison == HazardStatus::Unknown, !scouted);
            }
            prop_assert!(view.bots.values().all(|b| state.bots().get(b.id).map(|bot| bot.owner) == Some(player)));
            prop_assert!(view.visible_entities.enemies.keys().all(|id| !view.bots.contains_key(id)));
        }
    }

    #[test]
    fn scraps_are_only_ever_spent_on_spawns(
        seed in any::<u64>(),
        turns in proptest::collection::vec(player_moves(), 1..40),
    ) {
        let mut state = MatchState::new(seed);
        let mut spent = [0u32; 2];
        for moves in &turns {
            let player = state.current_player();
            for (&id, spawn) in &moves.spawns {
                if state.spawn(player, id, spawn.location, &spawn.abilities).is_ok() {
                    let cost: u32 = spawn.abilities.iter().map(|a| a.scrap_cost()).sum();
                    prop_assert_eq!(state.bots().get(id).map(|b| b.scraps), Some(cost));
                    spent[player.index()] += cost;
                }
                prop_assert_eq!(state.scraps(player) + spent[player.index()], STARTING_SCRAPS);
            }
            for (&id, action) in &moves.actions {
                let _ = state.act(player, id, action.direction, action.action);
                for p in PlayerId::ALL {
                    prop_assert_eq!(state.scraps(p) + spent[p.index()], STARTING_SCRAPS);
                }
            }
            state.advance_tick();
            for p in PlayerId::ALL {
                prop_assert_eq!(state.scraps(p) + spent[p.index()], STARTING_SCRAPS);
            }
        }
    }

    #[test]
    fn mirrored_views_round_trip(
        x in 0i32..20,
        y in 0i32..20,
        dir in proptest::sample::select(Direction::ALL.to_vec()),
    ) {
        let frame = Frame::MirrorX;
        let p = Point::new(x, y);
        prop_assert_eq!(frame.point(frame.point(p, 20), 20), p);
        prop_assert_eq!(frame.direction(frame.direction(dir)), dir);
    }
}
