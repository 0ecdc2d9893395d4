//! Per-player projections of a [`MatchState`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    Ability, Bank, Bot, Frame, MatchState, Pad, PlayerId, Point, Verb, Winner, BOT_ID_SEEDS,
    MAX_BOTS, SCOUT_RADIUS, VISION_RADIUS,
};

/// What a player knows about whether an algae cell is poisonous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HazardStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnBotView {
    pub id: u32,
    pub location: Point,
    pub energy: f64,
    pub scraps: u32,
    pub abilities: Vec<Ability>,
    pub algae_held: u32,
    pub traversal_cost: f64,
    pub vision_radius: i32,
    pub status: Option<Verb>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyBotView {
    pub id: u32,
    pub location: Point,
    pub scraps: u32,
    pub abilities: Vec<Ability>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgaeView {
    pub location: Point,
    pub is_poison: HazardStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisibleEntitiesView {
    pub enemies: BTreeMap<u32, EnemyBotView>,
    pub algae: Vec<AlgaeView>,
}

/// A bank seen from one player's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankView {
    pub id: u32,
    pub location: Point,
    pub is_bank_owner: bool,
    pub deposit_occuring: bool,
    pub deposit_amount: u32,
    pub deposit_ticks_left: u32,
    /// Whether the pending deposit would be credited to the viewer.
    pub is_deposit_owner: bool,
    pub lockpick_occuring: bool,
    pub lockpick_ticks_left: u32,
    /// Bot currently lockpicking this bank.
    pub lockpick_botid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadView {
    pub id: u32,
    pub location: Point,
    pub available: bool,
    pub ticks_left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermanentEntitiesView {
    pub banks: BTreeMap<u32, BankView>,
    pub energy_pads: BTreeMap<u32, PadView>,
    pub walls: Vec<Point>,
}

/// The message a peer receives at the start of its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub tick: u32,
    pub scraps: u32,
    /// Permanently banked algae.
    pub algae: u32,
    pub bot_id_seed: u32,
    pub max_bots: usize,
    pub bot_count: usize,
    pub width: i32,
    pub height: i32,
    pub bots: BTreeMap<u32, OwnBotView>,
    pub visible_entities: VisibleEntitiesView,
    pub permanent_entities: PermanentEntitiesView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlgaeCell {
    pub location: Point,
    pub is_poison: bool,
}

/// Unfiltered state in board coordinates, written to the match log every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub tick: u32,
    pub scraps: [u32; 2],
    pub banked: [u32; 2],
    pub algae_remaining: u32,
    pub winner: Option<Winner>,
    pub bots: Vec<Bot>,
    pub banks: Vec<Bank>,
    pub pads: Vec<Pad>,
    pub algae: Vec<AlgaeCell>,
}

struct Projector {
    frame: Frame,
    width: i32,
}

impl Projector {
    fn point(&self, p: Point) -> Point {
        self.frame.point(p, self.width)
    }

    fn own(&self, bot: &Bot) -> OwnBotView {
        OwnBotView {
            id: bot.id,
            location: self.point(bot.location),
            energy: bot.energy,
            scraps: bot.scraps,
            abilities: bot.abilities.iter().copied().collect(),
            algae_held: bot.algae_held,
            traversal_cost: bot.traversal_cost,
            vision_radius: VISION_RADIUS,
            status: bot.status,
        }
    }

    fn enemy(&self, bot: &Bot) -> EnemyBotView {
        EnemyBotView {
            id: bot.id,
            location: self.point(bot.location),
            scraps: bot.scraps,
            abilities: bot.abilities.iter().copied().collect(),
        }
    }

    fn bank(&self, bank: &Bank, player: PlayerId) -> BankView {
        BankView {
            id: bank.id,
            location: self.point(bank.location),
            is_bank_owner: bank.owner == player,
            deposit_occuring: bank.deposit.is_some(),
            deposit_amount: bank.deposit.map_or(0, |d| d.amount),
            deposit_ticks_left: bank.deposit.map_or(0, |d| d.ticks_left),
            is_deposit_owner: bank.deposit.is_some_and(|d| d.owner == player),
            lockpick_occuring: bank.lockpick.is_some(),
            lockpick_ticks_left: bank.lockpick.map_or(0, |l| l.ticks_left),
            lockpick_botid: bank.lockpick.map(|l| l.bot_id),
        }
    }

    fn pad(&self, pad: &Pad) -> PadView {
        PadView {
            id: pad.id,
            location: self.point(pad.location),
            available: pad.available,
            ticks_left: pad.ticks_left,
        }
    }
}

impl MatchState {
    /// What `player` is allowed to see, in that player's frame.
    ///
    /// Enemy bots are always visible. Poison status is only revealed for cells within
    /// [`SCOUT_RADIUS`] (Manhattan) of one of the player's own scouts.
    pub fn project(&self, player: PlayerId) -> PlayerView {
        let projector = Projector {
            frame: self.frame(player),
            width: self.board().width(),
        };
        let scouts: Vec<Point> = self
            .bots()
            .owned_by(player)
            .filter(|b| b.has(Ability::Scout))
            .map(|b| b.location)
            .collect();

        let bots: BTreeMap<u32, OwnBotView> = self
            .bots()
            .owned_by(player)
            .map(|b| (b.id, projector.own(b)))
            .collect();
        let enemies = self
            .bots()
            .owned_by(player.opponent())
            .map(|b| (b.id, projector.enemy(b)))
            .collect();
        let algae = self
            .board()
            .algae_cells()
            .map(|(p, tile)| {
                let scouted = scouts.iter().any(|s| s.manhattan(p) <= SCOUT_RADIUS);
                let is_poison = match (scouted, tile.is_poison) {
                    (false, _) => HazardStatus::Unknown,
                    (true, true) => HazardStatus::True,
                    (true, false) => HazardStatus::False,
                };
                AlgaeView {
                    location: projector.point(p),
                    is_poison,
                }
            })
            .collect();

        PlayerView {
            tick: self.tick(),
            scraps: self.scraps(player),
            algae: self.banked(player),
            bot_id_seed: BOT_ID_SEEDS[player.index()],
            max_bots: MAX_BOTS,
            bot_count: bots.len(),
            width: self.board().width(),
            height: self.board().height(),
            bots,
            visible_entities: VisibleEntitiesView { enemies, algae },
            permanent_entities: PermanentEntitiesView {
                banks: self
                    .banks()
                    .iter()
                    .map(|b| (b.id, projector.bank(b, player)))
                    .collect(),
                energy_pads: self
                    .pads()
                    .iter()
                    .map(|p| (p.id, projector.pad(p)))
                    .collect(),
                walls: self
                    .board()
                    .walls()
                    .iter()
                    .map(|&w| projector.point(w))
                    .collect(),
            },
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            tick: self.tick(),
            scraps: [self.scraps(PlayerId::A), self.scraps(PlayerId::B)],
            banked: [self.banked(PlayerId::A), self.banked(PlayerId::B)],
            algae_remaining: self.algae_remaining(),
            winner: self.winner(),
            bots: self.bots().iter().cloned().collect(),
            banks: self.banks().to_vec(),
            pads: self.pads().to_vec(),
            algae: self
                .board()
                .algae_cells()
                .map(|(location, tile)| AlgaeCell {
                    location,
                    is_poison: tile.is_poison,
                })
                .collect(),
        }
    }
}
