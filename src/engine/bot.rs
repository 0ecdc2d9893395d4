use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{Ability, PlayerId, Point, Verb, BASE_TRAVERSAL_COST};

/// A player-controlled unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bot {
    pub id: u32,
    pub owner: PlayerId,
    pub location: Point,
    pub energy: f64,
    /// Scraps paid when the bot was spawned.
    pub scraps: u32,
    pub abilities: BTreeSet<Ability>,
    pub algae_held: u32,
    pub traversal_cost: f64,
    /// Verb of the last applied action, `None` until the bot first acts.
    pub status: Option<Verb>,
}

impl Bot {
    pub fn has(&self, ability: Ability) -> bool {
        self.abilities.contains(&ability)
    }

    /// Drops an ability together with its traversal surcharge.
    pub(crate) fn remove_ability(&mut self, ability: Ability) -> bool {
        let removed = self.abilities.remove(&ability);
        if removed {
            self.traversal_cost -= ability.traversal_surcharge();
        }
        removed
    }
}

/// Energy charged per move for a bot carrying `abilities`.
pub fn traversal_cost<'a>(abilities: impl IntoIterator<Item = &'a Ability>) -> f64 {
    BASE_TRAVERSAL_COST
        + abilities
            .into_iter()
            .map(|a| a.traversal_surcharge())
            .sum::<f64>()
}

/// The live bots, keyed by id. Ids are unique among live bots.
#[derive(Debug, Clone, Default)]
pub struct BotRegistry {
    bots: BTreeMap<u32, Bot>,
}

impl BotRegistry {
    pub fn get(&self, id: u32) -> Option<&Bot> {
        self.bots.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut Bot> {
        self.bots.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.bots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Inserts a bot unless its id is already live.
    pub(crate) fn spawn(&mut self, bot: Bot) -> bool {
        if self.bots.contains_key(&bot.id) {
            return false;
        }
        self.bots.insert(bot.id, bot);
        true
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<Bot> {
        self.bots.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bot> {
        self.bots.values()
    }

    pub fn owned_by(&self, player: PlayerId) -> impl Iterator<Item = &Bot> {
        self.bots.values().filter(move |b| b.owner == player)
    }

    pub fn occupant(&self, p: Point) -> Option<u32> {
        self.bots.values().find(|b| b.location == p).map(|b| b.id)
    }

    pub fn is_occupied(&self, p: Point) -> bool {
        self.occupant(p).is_some()
    }

    /// Ids of bots whose per-axis distance to `center` is at most `range`.
    pub fn within(&self, center: Point, range: i32) -> Vec<u32> {
        self.bots
            .values()
            .filter(|b| b.location.chebyshev(center) <= range)
            .map(|b| b.id)
            .collect()
    }
}
