//! Credit assignment between competing transitions.
//!
//! Transitions bid a share of their cash to have their prediction chosen.
//! The winner pays its bid to the *supplier*, the transition whose prediction
//! was confirmed just before and so set up the current situation. A transition
//! whose own prediction is confirmed collects an external reward and becomes
//! the next supplier. Over time cash flows towards chains of transitions that
//! keep predicting correctly, which ranks them above merely frequent ones.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::EconomyConfig;
use crate::error::{Error, Result};
use crate::prediction::Prediction;
use crate::storage::KnowledgeStore;
use crate::transition::{Transition, TransitionId};

/// Offer made by a transition to have its prediction selected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub transition: TransitionId,
    pub amount: f64,
}

/// Pick the highest bid; ties go to the oldest (lowest id) transition
pub fn auction<'a>(
    transitions: impl IntoIterator<Item = &'a Transition>,
    bid_percentage: f64,
) -> Result<Option<Bid>> {
    let mut best: Option<Bid> = None;
    for transition in transitions {
        let bid = transition.bid(bid_percentage)?;
        let better = match best {
            None => true,
            Some(current) => {
                bid.amount > current.amount
                    || (bid.amount == current.amount && bid.transition < current.transition)
            }
        };
        if better {
            best = Some(bid);
        }
    }
    Ok(best)
}

/// Bucket-brigade settlement across consecutive predictions
#[derive(Debug, Clone, PartialEq)]
pub struct BucketBrigade {
    config: EconomyConfig,
    supplier: Option<TransitionId>,
}

impl BucketBrigade {
    pub fn new(config: EconomyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            supplier: None,
        })
    }

    /// Transition that will be paid by the next auction winner
    pub fn supplier(&self) -> Option<TransitionId> {
        self.supplier
    }

    /// Forget the supplier after a failed prediction
    pub fn reset(&mut self) {
        self.supplier = None;
    }

    /// Run an auction among the transitions behind `predictions` and settle it.
    ///
    /// Returns the winning bid, if any. A payment the winner cannot afford is
    /// logged and skipped; no balance changes in that case.
    pub fn settle<S>(&mut self, store: &S, predictions: &[Prediction]) -> Result<Option<Bid>>
    where
        S: KnowledgeStore + ?Sized,
    {
        let mut bidders = alloc::vec::Vec::with_capacity(predictions.len());
        for prediction in predictions {
            let id = prediction.transition();
            bidders.push(store.transition(id)?.ok_or(Error::UnknownTransition(id))?);
        }

        let Some(bid) = auction(&bidders, self.config.default_bid_percentage)? else {
            return Ok(None);
        };
        let Some(mut winner) = bidders.into_iter().find(|t| t.id() == bid.transition) else {
            return Ok(None);
        };

        match winner.pay(&bid) {
            Ok(_) => {}
            Err(Error::InsufficientFunds { .. }) => {
                warn!("Skipping settlement of {}: insufficient funds", winner.id());
                return Ok(Some(bid));
            }
            Err(e) => return Err(e),
        }

        match self.supplier {
            Some(supplier) if supplier == winner.id() => {
                winner.receive_payment(bid.amount)?;
                store.update_transition(&winner)?;
            }
            Some(supplier) => {
                let mut paid = store
                    .transition(supplier)?
                    .ok_or(Error::UnknownTransition(supplier))?;
                paid.receive_payment(bid.amount)?;
                store.update_transition(&winner)?;
                store.update_transition(&paid)?;
                debug!("{} paid {} to {}", winner.id(), bid.amount, supplier);
            }
            // No one to pay: the bid leaves the economy
            None => store.update_transition(&winner)?,
        }

        Ok(Some(bid))
    }

    /// Reward a transition whose prediction was confirmed
    pub fn reward<S>(&mut self, store: &S, id: TransitionId) -> Result<()>
    where
        S: KnowledgeStore + ?Sized,
    {
        let mut transition = store.transition(id)?.ok_or(Error::UnknownTransition(id))?;
        transition.receive_payment(self.config.success_reward)?;
        store.update_transition(&transition)?;
        self.supplier = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Reading, SensorId};
    use crate::storage::MemoryStore;

    fn reading(value: f64) -> Reading {
        Reading::new(SensorId::new(1, 1).unwrap(), &[value], 0, 10).unwrap()
    }

    fn economy() -> EconomyConfig {
        EconomyConfig {
            initial_cash: 100.0,
            default_bid_percentage: 0.1,
            success_reward: 30.0,
        }
    }

    fn cash(store: &MemoryStore, id: TransitionId) -> f64 {
        store.transition(id).unwrap().unwrap().cash_on_hand()
    }

    #[test]
    fn test_bid_pay_receive_scenario() {
        let mut t = Transition::new(TransitionId(0), &reading(1.0), reading(2.0), 100.0).unwrap();
        let bid = t.bid(0.1).unwrap();
        assert_eq!(bid.amount, 10.0);
        t.pay(&bid).unwrap();
        assert_eq!(t.cash_on_hand(), 90.0);
        t.receive_payment(30.0).unwrap();
        assert_eq!(t.cash_on_hand(), 120.0);
    }

    #[test]
    fn test_auction_prefers_wealth_then_age() {
        let mut rich = Transition::new(TransitionId(3), &reading(1.0), reading(2.0), 50.0).unwrap();
        let poor = Transition::new(TransitionId(1), &reading(1.0), reading(3.0), 20.0).unwrap();
        let also_poor = Transition::new(TransitionId(2), &reading(1.0), reading(4.0), 20.0).unwrap();

        let winner = auction([&poor, &rich, &also_poor], 0.1).unwrap().unwrap();
        assert_eq!(winner.transition, TransitionId(3));

        rich.pay(&Bid {
            transition: rich.id(),
            amount: 30.0,
        })
        .unwrap();
        let winner = auction([&also_poor, &rich, &poor], 0.1).unwrap().unwrap();
        assert_eq!(winner.transition, TransitionId(1));

        assert!(auction(core::iter::empty::<&Transition>(), 0.1).unwrap().is_none());
    }

    #[test]
    fn test_winner_pays_supplier() {
        let store = MemoryStore::new(economy());
        let supplier = store.learn_transition(&reading(0.0), &reading(1.0)).unwrap();
        let winner = store.learn_transition(&reading(1.0), &reading(2.0)).unwrap();

        let mut brigade = BucketBrigade::new(economy()).unwrap();
        brigade.reward(&store, supplier).unwrap();
        assert_eq!(cash(&store, supplier), 130.0);
        assert_eq!(brigade.supplier(), Some(supplier));

        let predictions = store.query_predictions(&reading(1.0)).unwrap();
        let bid = brigade.settle(&store, &predictions).unwrap().unwrap();
        assert_eq!(bid.transition, winner);
        assert_eq!(cash(&store, winner), 90.0);
        assert_eq!(cash(&store, supplier), 140.0);
    }

    #[test]
    fn test_without_supplier_the_bid_is_spent() {
        let store = MemoryStore::new(economy());
        let id = store.learn_transition(&reading(1.0), &reading(2.0)).unwrap();
        let mut brigade = BucketBrigade::new(economy()).unwrap();

        let predictions = store.query_predictions(&reading(1.0)).unwrap();
        brigade.settle(&store, &predictions).unwrap();
        assert_eq!(cash(&store, id), 90.0);

        brigade.reset();
        assert_eq!(brigade.supplier(), None);
    }

    #[test]
    fn test_self_supply_is_neutral() {
        let store = MemoryStore::new(economy());
        let id = store.learn_transition(&reading(1.0), &reading(2.0)).unwrap();
        let mut brigade = BucketBrigade::new(economy()).unwrap();
        brigade.reward(&store, id).unwrap();

        let predictions = store.query_predictions(&reading(1.0)).unwrap();
        brigade.settle(&store, &predictions).unwrap();
        assert_eq!(cash(&store, id), 130.0);
    }

    #[test]
    fn test_empty_predictions_settle_nothing() {
        let store = MemoryStore::new(economy());
        let mut brigade = BucketBrigade::new(economy()).unwrap();
        assert!(brigade.settle(&store, &[]).unwrap().is_none());
    }
}
