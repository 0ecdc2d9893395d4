use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, trace};

use super::bot::traversal_cost;
use super::{
    Ability, Bank, BankEvent, Board, Bot, BotRegistry, Deposit, Direction, Frame, GameSnapshot,
    Lockpick, Pad, PlayerId, PlayerView, Point, Verb, BOARD_WIDTH, DEPOSIT_TICKS,
    LOCKPICK_TICKS, MAX_ALGAE_HELD, MAX_BOTS, MAX_TICKS, SELF_DESTRUCT_RANGE, SPAWN_ENERGY,
    STARTING_SCRAPS,
};
use crate::game_interface::{Game, GameFactory};
use crate::logger::{LogKind, MatchLog};
use crate::protocol::PlayerMoves;

/// Final result of a match. A match without a result yet has `Option<Winner>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    Player(PlayerId),
    Draw,
}

impl Winner {
    fn by_score(banked: [u32; 2]) -> Winner {
        let [a, b] = banked;
        match a.cmp(&b) {
            std::cmp::Ordering::Greater => Winner::Player(PlayerId::A),
            std::cmp::Ordering::Less => Winner::Player(PlayerId::B),
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}

/// Why a single spawn or action command was dropped. Never fatal to the match.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleViolation {
    #[error("bot {0} is already alive")]
    DuplicateId(u32),
    #[error("bot {id}: {player} already has {max} bots")]
    UnitCap { id: u32, player: PlayerId, max: usize },
    #[error("bot {id}: {location:?} is out of bounds")]
    OutOfBounds { id: u32, location: Point },
    #[error("bot {id}: {location:?} is a wall")]
    Wall { id: u32, location: Point },
    #[error("bot {id}: {location:?} is occupied")]
    Occupied { id: u32, location: Point },
    #[error("bot {id}: unknown ability")]
    UnknownAbility { id: u32 },
    #[error("bot {id}: ability {ability} listed twice")]
    DuplicateAbility { id: u32, ability: Ability },
    #[error("bot {id}: needs {needed} scraps, {available} available")]
    InsufficientScraps { id: u32, needed: u32, available: u32 },
    #[error("bot {0} does not exist")]
    UnknownBot(u32),
    #[error("bot {id} belongs to {owner}")]
    NotOwner { id: u32, owner: PlayerId },
    #[error("bot {id}: unknown direction")]
    UnknownDirection { id: u32 },
    #[error("bot {id}: unknown action")]
    UnknownVerb { id: u32 },
    #[error("bot {id}: {verb} requires {ability}")]
    MissingAbility { id: u32, verb: Verb, ability: Ability },
    #[error("bot {id}: needs {needed} energy, has {available}")]
    InsufficientEnergy { id: u32, needed: f64, available: f64 },
    #[error("bot {id}: no bank in range")]
    NoBankInRange { id: u32 },
    #[error("bot {id}: bank {bank} is already being lockpicked")]
    LockpickActive { id: u32, bank: u32 },
    #[error("bot {id}: bank {bank} belongs to the other player")]
    NotBankOwner { id: u32, bank: u32 },
    #[error("bot {id}: bank {bank} already has a deposit")]
    DepositActive { id: u32, bank: u32 },
    #[error("bot {id}: holds no algae")]
    NothingToDeposit { id: u32 },
}

/// The whole simulation. Only its own methods mutate it.
#[derive(Debug, Clone)]
pub struct MatchState {
    tick: u32,
    board: Board,
    bots: BotRegistry,
    banks: Vec<Bank>,
    pads: Vec<Pad>,
    scraps: [u32; 2],
    banked: [u32; 2],
    algae_remaining: u32,
    initial_algae: u32,
    winner: Option<Winner>,
    frames: [Frame; 2],
}

impl MatchState {
    /// A fresh match on a board generated from `seed`.
    pub fn new(seed: u64) -> MatchState {
        MatchState::with_board(Board::generate(seed))
    }

    /// A fresh match on `board` with the standard banks and energy pads.
    pub fn with_board(board: Board) -> MatchState {
        let algae = board.healthy_algae();
        let mirror = |x: i32| BOARD_WIDTH - 1 - x;
        let banks = vec![
            Bank::new(1, Point::new(4, 4), PlayerId::A),
            Bank::new(2, Point::new(mirror(4), 4), PlayerId::B),
            Bank::new(3, Point::new(4, 15), PlayerId::A),
            Bank::new(4, Point::new(mirror(4), 15), PlayerId::B),
        ];
        let pads = vec![
            Pad::new(1, Point::new(9, 8)),
            Pad::new(2, Point::new(10, 11)),
        ];
        MatchState {
            tick: 1,
            board,
            bots: BotRegistry::default(),
            banks,
            pads,
            scraps: [STARTING_SCRAPS; 2],
            banked: [0; 2],
            algae_remaining: algae,
            initial_algae: algae,
            winner: None,
            frames: [Frame::Identity; 2],
        }
    }

    #[must_use]
    pub fn with_frames(self, frames: [Frame; 2]) -> MatchState {
        MatchState { frames, ..self }
    }

    /// Shows player B a horizontally mirrored board.
    #[must_use]
    pub fn with_mirrored_player_b(self, mirrored: bool) -> MatchState {
        let b = if mirrored {
            Frame::MirrorX
        } else {
            Frame::Identity
        };
        self.with_frames([Frame::Identity, b])
    }

    #[must_use]
    pub fn with_scraps(self, scraps: [u32; 2]) -> MatchState {
        MatchState { scraps, ..self }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Derived from the tick counter only.
    pub fn current_player(&self) -> PlayerId {
        PlayerId::for_tick(self.tick)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn bots(&self) -> &BotRegistry {
        &self.bots
    }

    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn scraps(&self, player: PlayerId) -> u32 {
        self.scraps[player.index()]
    }

    /// Permanently banked algae.
    pub fn banked(&self, player: PlayerId) -> u32 {
        self.banked[player.index()]
    }

    pub fn algae_remaining(&self) -> u32 {
        self.algae_remaining
    }

    pub fn initial_algae(&self) -> u32 {
        self.initial_algae
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    pub fn frame(&self, player: PlayerId) -> Frame {
        self.frames[player.index()]
    }

    /// Applies the current player's batch: spawns first, then actions, each in id order.
    ///
    /// Coordinates and directions are read in the current player's frame. Every rejected
    /// command is returned; the rest of the batch is still applied.
    pub fn apply_moves(&mut self, moves: &PlayerMoves) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        if self.winner.is_some() {
            return violations;
        }
        let player = self.current_player();
        let frame = self.frame(player);
        let width = self.board.width();

        for (&id, spawn) in &moves.spawns {
            let location = frame.point(spawn.location, width);
            if let Err(v) = self.spawn(player, id, location, &spawn.abilities) {
                violations.push(v);
            }
        }
        for (&id, action) in &moves.actions {
            let direction = frame.direction(action.direction);
            if let Err(v) = self.act(player, id, direction, action.action) {
                violations.push(v);
            }
        }
        violations
    }

    /// Creates a bot for `player` at `location` (board coordinates).
    pub fn spawn(
        &mut self,
        player: PlayerId,
        id: u32,
        location: Point,
        abilities: &[Ability],
    ) -> Result<(), RuleViolation> {
        if self.bots.contains(id) {
            return Err(RuleViolation::DuplicateId(id));
        }
        if self.bots.owned_by(player).count() >= MAX_BOTS {
            return Err(RuleViolation::UnitCap {
                id,
                player,
                max: MAX_BOTS,
            });
        }
        if !self.board.in_bounds(location) {
            return Err(RuleViolation::OutOfBounds { id, location });
        }
        if self.board.is_wall(location) {
            return Err(RuleViolation::Wall { id, location });
        }
        if self.bots.is_occupied(location) {
            return Err(RuleViolation::Occupied { id, location });
        }

        let mut set = BTreeSet::new();
        for &ability in abilities {
            if ability == Ability::Unrecognized {
                return Err(RuleViolation::UnknownAbility { id });
            }
            if !set.insert(ability) {
                return Err(RuleViolation::DuplicateAbility { id, ability });
            }
        }
        let cost: u32 = set.iter().map(|a| a.scrap_cost()).sum();
        let available = self.scraps[player.index()];
        if cost > available {
            return Err(RuleViolation::InsufficientScraps {
                id,
                needed: cost,
                available,
            });
        }

        self.scraps[player.index()] -= cost;
        let bot = Bot {
            id,
            owner: player,
            location,
            energy: SPAWN_ENERGY,
            scraps: cost,
            traversal_cost: traversal_cost(&set),
            abilities: set,
            algae_held: 0,
            status: None,
        };
        trace!(id, ?location, cost, "spawned");
        self.bots.spawn(bot);
        Ok(())
    }

    /// Moves bot `id` one step in `direction` (board frame), then applies `verb`.
    ///
    /// Either the whole action applies or nothing does.
    pub fn act(
        &mut self,
        player: PlayerId,
        id: u32,
        direction: Direction,
        verb: Verb,
    ) -> Result<(), RuleViolation> {
        let bot = self.bots.get(id).ok_or(RuleViolation::UnknownBot(id))?;
        if bot.owner != player {
            return Err(RuleViolation::NotOwner {
                id,
                owner: bot.owner,
            });
        }
        if direction == Direction::Unrecognized {
            return Err(RuleViolation::UnknownDirection { id });
        }
        if verb == Verb::Unrecognized {
            return Err(RuleViolation::UnknownVerb { id });
        }

        let destination = self.destination(bot, direction)?;
        let mut energy = if direction == Direction::Null {
            0.0
        } else {
            bot.traversal_cost
        };
        if let Some(ability) = verb.required_ability() {
            if !bot.has(ability) {
                return Err(RuleViolation::MissingAbility { id, verb, ability });
            }
            energy += verb.energy_cost();
        }
        if energy > bot.energy {
            return Err(RuleViolation::InsufficientEnergy {
                id,
                needed: energy,
                available: bot.energy,
            });
        }
        let bank = match verb {
            Verb::Lockpick => Some(self.lockpick_target(id, destination)?),
            Verb::Deposit => Some(self.deposit_target(bot, destination)?),
            _ => None,
        };

        let Some(bot) = self.bots.get_mut(id) else {
            return Err(RuleViolation::UnknownBot(id));
        };
        bot.energy -= energy;
        bot.location = destination;
        bot.status = Some(verb);

        match (verb, bank) {
            (Verb::Harvest, _) => self.harvest(id, destination),
            (Verb::Poison, _) => {
                if self.board.poison(destination) {
                    self.algae_remaining = self.algae_remaining.saturating_sub(1);
                }
            }
            (Verb::SelfDestruct, _) => self.self_destruct(id),
            (Verb::Lockpick, Some(i)) => {
                self.banks[i].lockpick = Some(Lockpick {
                    bot_id: id,
                    ticks_left: LOCKPICK_TICKS,
                });
            }
            (Verb::Deposit, Some(i)) => {
                let amount = std::mem::take(&mut bot.algae_held);
                self.banks[i].deposit = Some(Deposit {
                    owner: player,
                    amount,
                    ticks_left: DEPOSIT_TICKS,
                });
            }
            _ => {}
        }
        self.collect_pad(id);
        Ok(())
    }

    /// Where a move in `direction` ends. Every traversed cell must be inside the board and
    /// not a wall; the last one must be free.
    fn destination(&self, bot: &Bot, direction: Direction) -> Result<Point, RuleViolation> {
        let id = bot.id;
        if direction == Direction::Null {
            return Ok(bot.location);
        }
        let (dx, dy) = direction.offset();
        let first = bot.location.offset(dx, dy);
        if !self.board.in_bounds(first) {
            return Err(RuleViolation::OutOfBounds {
                id,
                location: first,
            });
        }
        let mut path = vec![first];
        if bot.has(Ability::SpeedBoost) {
            let second = self.board.clamp(first.offset(dx, dy));
            if second != first {
                path.push(second);
            }
        }
        if let Some(&location) = path.iter().find(|&&p| self.board.is_wall(p)) {
            return Err(RuleViolation::Wall { id, location });
        }
        let last = path[path.len() - 1];
        match self.bots.occupant(last) {
            Some(other) if other != id => Err(RuleViolation::Occupied { id, location: last }),
            _ => Ok(last),
        }
    }

    fn lockpick_target(&self, id: u32, at: Point) -> Result<usize, RuleViolation> {
        let i = self
            .banks
            .iter()
            .position(|b| b.in_range(at))
            .ok_or(RuleViolation::NoBankInRange { id })?;
        let bank = &self.banks[i];
        if bank.lockpick.is_some() {
            return Err(RuleViolation::LockpickActive { id, bank: bank.id });
        }
        Ok(i)
    }

    fn deposit_target(&self, bot: &Bot, at: Point) -> Result<usize, RuleViolation> {
        let id = bot.id;
        let i = self
            .banks
            .iter()
            .position(|b| b.in_range(at))
            .ok_or(RuleViolation::NoBankInRange { id })?;
        let bank = &self.banks[i];
        if bank.owner != bot.owner {
            return Err(RuleViolation::NotBankOwner { id, bank: bank.id });
        }
        if bank.deposit.is_some() {
            return Err(RuleViolation::DepositActive { id, bank: bank.id });
        }
        if bot.algae_held == 0 {
            return Err(RuleViolation::NothingToDeposit { id });
        }
        Ok(i)
    }

    fn harvest(&mut self, id: u32, at: Point) {
        match self.board.take_algae(at) {
            Some(true) => {
                debug!(id, ?at, "bot harvested poison");
                self.bots.remove(id);
            }
            Some(false) => {
                self.algae_remaining = self.algae_remaining.saturating_sub(1);
                if let Some(bot) = self.bots.get_mut(id) {
                    bot.algae_held = (bot.algae_held + 1).min(MAX_ALGAE_HELD);
                }
            }
            None => {}
        }
    }

    /// Destroys `id` and every bot in blast range. A shield absorbs the blast once.
    fn self_destruct(&mut self, id: u32) {
        let Some(origin) = self.bots.remove(id) else {
            return;
        };
        for target in self.bots.within(origin.location, SELF_DESTRUCT_RANGE) {
            let shielded = self
                .bots
                .get_mut(target)
                .is_some_and(|bot| bot.remove_ability(Ability::Shield));
            if !shielded {
                self.bots.remove(target);
            }
            debug!(id, target, shielded, "caught in blast");
        }
    }

    fn collect_pad(&mut self, id: u32) {
        let tick = self.tick;
        let Some(bot) = self.bots.get_mut(id) else {
            return;
        };
        if let Some(pad) = self
            .pads
            .iter_mut()
            .find(|p| p.available && p.location == bot.location)
        {
            pad.consume(tick);
            bot.energy = SPAWN_ENERGY;
            trace!(id, pad = pad.id, "energy restored");
        }
    }

    /// Runs the timed effects of banks and pads, then moves to the next tick.
    pub fn advance_tick(&mut self) -> Vec<BankEvent> {
        let mut events = Vec::new();
        for bank in &mut self.banks {
            bank.tick(&self.bots, &mut events);
        }
        for event in &events {
            if let BankEvent::DepositCredited { owner, amount, .. } = *event {
                self.banked[owner.index()] += amount;
            }
        }
        for pad in &mut self.pads {
            pad.tick();
        }
        self.tick += 1;
        events
    }

    /// Decides the match once a player banked more than half of the initial healthy algae,
    /// or once [`MAX_TICKS`] ticks were played. A decided winner never changes.
    pub fn check_winner(&mut self) -> Option<Winner> {
        if self.winner.is_some() {
            return self.winner;
        }
        let majority = |score: u32| u64::from(score) * 2 > u64::from(self.initial_algae);
        let [a, b] = self.banked;
        self.winner = match (majority(a), majority(b)) {
            (true, false) => Some(Winner::Player(PlayerId::A)),
            (false, true) => Some(Winner::Player(PlayerId::B)),
            (true, true) => Some(Winner::by_score(self.banked)),
            (false, false) if self.tick > MAX_TICKS => Some(Winner::by_score(self.banked)),
            (false, false) => None,
        };
        self.winner
    }
}

impl Game for MatchState {
    type View = PlayerView;
    type Moves = PlayerMoves;
    type Snapshot = GameSnapshot;

    fn tick(&self) -> u32 {
        self.tick
    }

    fn current_player(&self) -> PlayerId {
        MatchState::current_player(self)
    }

    fn view_for(&self, player: PlayerId) -> PlayerView {
        self.project(player)
    }

    fn apply(&mut self, moves: &PlayerMoves, log: &dyn MatchLog) {
        let player = MatchState::current_player(self);
        for violation in self.apply_moves(moves) {
            debug!(%player, %violation, "command rejected");
            log.log(
                LogKind::Warn,
                vec![json!(player.label()), json!(violation.to_string())],
            );
        }
    }

    fn advance(&mut self, log: &dyn MatchLog) {
        for event in self.advance_tick() {
            log.log(LogKind::Debug, vec![json!(event)]);
        }
    }

    fn decide_winner(&mut self) -> Option<Winner> {
        self.check_winner()
    }

    fn scores(&self) -> [u32; 2] {
        self.banked
    }

    fn snapshot(&self) -> GameSnapshot {
        MatchState::snapshot(self)
    }

    fn claimed_tick(moves: &PlayerMoves) -> Option<u32> {
        moves.tick
    }
}

/// Builds [`MatchState`]s for the referee.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchStateFactory {
    pub mirror_player_b: bool,
}

impl GameFactory<MatchState> for MatchStateFactory {
    fn new_game(&self, seed: u64) -> MatchState {
        MatchState::new(seed).with_mirrored_player_b(self.mirror_player_b)
    }
}
