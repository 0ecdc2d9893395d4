//! Static structures and their timed sub-state-machines.

use serde::Serialize;

use super::{BotRegistry, PlayerId, Point, BANK_RANGE};

/// A deposit counting down to being banked for `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deposit {
    pub owner: PlayerId,
    pub amount: u32,
    pub ticks_left: u32,
}

/// A lockpick counting down to stealing the bank's pending deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lockpick {
    pub bot_id: u32,
    pub ticks_left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bank {
    pub id: u32,
    pub location: Point,
    pub owner: PlayerId,
    pub deposit: Option<Deposit>,
    pub lockpick: Option<Lockpick>,
}

/// Something that happened to a bank during a tick advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BankEvent {
    LockpickAborted { bank: u32, bot_id: u32 },
    LockpickCompleted { bank: u32, bot_id: u32, thief: PlayerId },
    DepositCredited { bank: u32, owner: PlayerId, amount: u32 },
}

impl Bank {
    pub fn new(id: u32, location: Point, owner: PlayerId) -> Bank {
        Bank {
            id,
            location,
            owner,
            deposit: None,
            lockpick: None,
        }
    }

    pub fn in_range(&self, p: Point) -> bool {
        self.location.chebyshev(p) <= BANK_RANGE
    }

    /// Advances both sub-state-machines by one tick.
    ///
    /// The lockpick is resolved first so that a lockpick and a deposit expiring on the same
    /// tick hand the deposit to the thief.
    pub(crate) fn tick(&mut self, bots: &BotRegistry, events: &mut Vec<BankEvent>) {
        if let Some(mut pick) = self.lockpick.take() {
            let picker = bots
                .get(pick.bot_id)
                .filter(|bot| self.in_range(bot.location));
            match picker {
                None => events.push(BankEvent::LockpickAborted {
                    bank: self.id,
                    bot_id: pick.bot_id,
                }),
                Some(bot) => {
                    pick.ticks_left = pick.ticks_left.saturating_sub(1);
                    if pick.ticks_left == 0 {
                        if let Some(deposit) = &mut self.deposit {
                            deposit.owner = bot.owner;
                        }
                        events.push(BankEvent::LockpickCompleted {
                            bank: self.id,
                            bot_id: pick.bot_id,
                            thief: bot.owner,
                        });
                    } else {
                        self.lockpick = Some(pick);
                    }
                }
            }
        }

        if let Some(mut deposit) = self.deposit.take() {
            deposit.ticks_left = deposit.ticks_left.saturating_sub(1);
            if deposit.ticks_left == 0 {
                events.push(BankEvent::DepositCredited {
                    bank: self.id,
                    owner: deposit.owner,
                    amount: deposit.amount,
                });
            } else {
                self.deposit = Some(deposit);
            }
        }
    }
}

/// Cooldown started when a pad is consumed at `tick`. Shrinks as the match goes on.
pub const fn pad_cooldown(tick: u32) -> u32 {
    if tick <= 300 {
        50
    } else if tick <= 700 {
        35
    } else {
        20
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pad {
    pub id: u32,
    pub location: Point,
    pub available: bool,
    pub ticks_left: u32,
}

impl Pad {
    pub fn new(id: u32, location: Point) -> Pad {
        Pad {
            id,
            location,
            available: true,
            ticks_left: 0,
        }
    }

    pub(crate) fn consume(&mut self, tick: u32) {
        self.available = false;
        self.ticks_left = pad_cooldown(tick);
    }

    pub(crate) fn tick(&mut self) {
        if self.available {
            return;
        }
        self.ticks_left = self.ticks_left.saturating_sub(1);
        if self.ticks_left == 0 {
            self.available = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_is_credited_after_its_duration() {
        let mut bank = Bank::new(1, Point::new(4, 4), PlayerId::A);
        bank.deposit = Some(Deposit {
            owner: PlayerId::A,
            amount: 3,
            ticks_left: 2,
        });
        let bots = BotRegistry::default();
        let mut events = vec![];
        bank.tick(&bots, &mut events);
        assert!(events.is_empty());
        bank.tick(&bots, &mut events);
        assert_eq!(
            events,
            vec![BankEvent::DepositCredited {
                bank: 1,
                owner: PlayerId::A,
                amount: 3
            }]
        );
        assert!(bank.deposit.is_none());
    }

    #[test]
    fn lockpick_without_its_bot_aborts() {
        let mut bank = Bank::new(1, Point::new(4, 4), PlayerId::A);
        bank.lockpick = Some(Lockpick {
            bot_id: 9,
            ticks_left: 3,
        });
        let mut events = vec![];
        bank.tick(&BotRegistry::default(), &mut events);
        assert!(bank.lockpick.is_none());
        assert_eq!(
            events,
            vec![BankEvent::LockpickAborted { bank: 1, bot_id: 9 }]
        );
    }

    #[test]
    fn cooldown_shrinks_in_three_steps() {
        assert_eq!(pad_cooldown(1), 50);
        assert_eq!(pad_cooldown(301), 35);
        assert_eq!(pad_cooldown(701), 20);
    }

    #[test]
    fn pad_recharges() {
        let mut pad = Pad::new(1, Point::new(9, 8));
        pad.consume(800);
        assert!(!pad.available);
        for _ in 0..19 {
            pad.tick();
        }
        assert!(!pad.available);
        pad.tick();
        assert!(pad.available);
    }
}
