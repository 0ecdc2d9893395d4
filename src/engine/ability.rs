//! Closed vocabularies of the wire protocol: abilities, verbs and directions.
//!
//! Names are matched case-insensitively. A name outside the vocabulary decodes to the
//! `Unrecognized` variant so that the rules engine rejects only the command carrying it.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A capability bought with scraps when a bot is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Ability {
    Harvest,
    Scout,
    SelfDestruct,
    Lockpick,
    SpeedBoost,
    Poison,
    Shield,
    Unrecognized,
}

impl Ability {
    pub const ALL: [Ability; 7] = [
        Ability::Harvest,
        Ability::Scout,
        Ability::SelfDestruct,
        Ability::Lockpick,
        Ability::SpeedBoost,
        Ability::Poison,
        Ability::Shield,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Ability::Harvest => "HARVEST",
            Ability::Scout => "SCOUT",
            Ability::SelfDestruct => "SELFDESTRUCT",
            Ability::Lockpick => "LOCKPICK",
            Ability::SpeedBoost => "SPEEDBOOST",
            Ability::Poison => "POISON",
            Ability::Shield => "SHIELD",
            Ability::Unrecognized => "UNRECOGNIZED",
        }
    }

    /// Scraps paid at spawn for this ability.
    pub const fn scrap_cost(self) -> u32 {
        match self {
            Ability::Harvest | Ability::Scout | Ability::SpeedBoost => 10,
            Ability::SelfDestruct | Ability::Lockpick | Ability::Poison | Ability::Shield => 5,
            Ability::Unrecognized => 0,
        }
    }

    /// Extra energy charged on every move while the bot carries this ability.
    pub const fn traversal_surcharge(self) -> f64 {
        match self {
            Ability::Harvest | Ability::Unrecognized => 0.0,
            Ability::Scout | Ability::Lockpick => 1.5,
            Ability::SpeedBoost => 1.0,
            Ability::SelfDestruct | Ability::Poison => 0.5,
            Ability::Shield => 0.25,
        }
    }
}

impl From<String> for Ability {
    fn from(name: String) -> Self {
        Ability::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name.trim()))
            .unwrap_or(Ability::Unrecognized)
    }
}

impl From<Ability> for &'static str {
    fn from(ability: Ability) -> Self {
        ability.name()
    }
}

impl Display for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a bot does after (optionally) moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Verb {
    #[default]
    Move,
    Harvest,
    Poison,
    SelfDestruct,
    Lockpick,
    Deposit,
    Unrecognized,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::Move,
        Verb::Harvest,
        Verb::Poison,
        Verb::SelfDestruct,
        Verb::Lockpick,
        Verb::Deposit,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Verb::Move => "MOVE",
            Verb::Harvest => "HARVEST",
            Verb::Poison => "POISON",
            Verb::SelfDestruct => "SELFDESTRUCT",
            Verb::Lockpick => "LOCKPICK",
            Verb::Deposit => "DEPOSIT",
            Verb::Unrecognized => "UNRECOGNIZED",
        }
    }

    /// Ability a bot must carry to use this verb. Depositing is part of harvesting.
    pub const fn required_ability(self) -> Option<Ability> {
        match self {
            Verb::Move => None,
            Verb::Harvest | Verb::Deposit => Some(Ability::Harvest),
            Verb::Poison => Some(Ability::Poison),
            Verb::SelfDestruct => Some(Ability::SelfDestruct),
            Verb::Lockpick => Some(Ability::Lockpick),
            Verb::Unrecognized => Some(Ability::Unrecognized),
        }
    }

    pub const fn energy_cost(self) -> f64 {
        match self {
            Verb::Move | Verb::SelfDestruct | Verb::Lockpick | Verb::Unrecognized => 0.0,
            Verb::Harvest | Verb::Deposit => 1.0,
            Verb::Poison => 2.0,
        }
    }
}

impl From<String> for Verb {
    fn from(name: String) -> Self {
        let name = name.trim();
        // "NIL" is what the reference client sends for a plain move
        if name.eq_ignore_ascii_case("NIL") {
            return Verb::Move;
        }
        Verb::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
            .unwrap_or(Verb::Unrecognized)
    }
}

impl From<Verb> for &'static str {
    fn from(verb: Verb) -> Self {
        verb.name()
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit step on the board. `North` increases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Direction {
    North,
    South,
    East,
    West,
    #[default]
    Null,
    Unrecognized,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Null,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::South => "SOUTH",
            Direction::East => "EAST",
            Direction::West => "WEST",
            Direction::Null => "NULL",
            Direction::Unrecognized => "UNRECOGNIZED",
        }
    }

    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::Null | Direction::Unrecognized => (0, 0),
        }
    }

    /// The same step seen through a horizontally mirrored board.
    pub const fn mirrored(self) -> Direction {
        match self {
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            other => other,
        }
    }
}

impl From<String> for Direction {
    fn from(name: String) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("NONE") || name.is_empty() {
            return Direction::Null;
        }
        Direction::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
            .unwrap_or(Direction::Unrecognized)
    }
}

impl From<Direction> for &'static str {
    fn from(direction: Direction) -> Self {
        direction.name()
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
