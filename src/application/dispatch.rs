use crate::domain::dispatch::{
    DispatchConfig, DispatchOffer, OfferCandidate, distance_km,
};
use crate::domain::event::{Channel, PushEvent};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{
    AgentDirectoryRef, MerchantDirectoryRef, NotifierRef, OrderStoreRef,
};
use crate::error::{CoreError, Result};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

/// Finds eligible delivery agents for a confirmed order and awards the
/// order to exactly one of them.
///
/// Offers are ephemeral: they live in this engine only while their
/// acceptance window is open and are dropped once a winner is recorded.
/// The authoritative claim is the order store's compare-and-swap on the
/// assignment field, so a replayed broadcast can never double-award.
pub struct DispatchEngine {
    orders: OrderStoreRef,
    merchants: MerchantDirectoryRef,
    agents: AgentDirectoryRef,
    notifier: NotifierRef,
    config: DispatchConfig,
    offers: DashMap<OrderId, DispatchOffer>,
    rounds: DashMap<OrderId, u32>,
}

impl DispatchEngine {
    pub fn new(
        orders: OrderStoreRef,
        merchants: MerchantDirectoryRef,
        agents: AgentDirectoryRef,
        notifier: NotifierRef,
        config: DispatchConfig,
    ) -> Self {
        Self {
            orders,
            merchants,
            agents,
            notifier,
            config,
            offers: DashMap::new(),
            rounds: DashMap::new(),
        }
    }

    /// Broadcast an offer for a freshly placed order to every online agent
    /// within the configured radius, ranked by ascending distance.
    pub async fn dispatch(&self, order_id: &OrderId) -> Result<DispatchOffer> {
        self.dispatch_at_radius(order_id, self.config.max_radius_km).await
    }

    /// Re-broadcast an unaccepted order with an expanded radius.
    ///
    /// Idempotent: an already-assigned order returns its concluded offer
    /// and nothing is re-awarded; a still-open offer is returned as is.
    pub async fn redispatch(&self, order_id: &OrderId) -> Result<DispatchOffer> {
        if let Some(offer) = self.offers.get(order_id) {
            if offer.winner.is_some() || !offer.is_expired(Utc::now()) {
                return Ok(offer.value().clone());
            }
        }
        let round = self
            .rounds
            .get(order_id)
            .map(|r| *r)
            .unwrap_or(0);
        let radius =
            self.config.max_radius_km * self.config.redispatch_radius_factor.powi(round as i32);
        self.dispatch_at_radius(order_id, radius).await
    }

    async fn dispatch_at_radius(&self, order_id: &OrderId, radius_km: f64) -> Result<DispatchOffer> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(CoreError::OrderNotFound(*order_id))?;

        if let Some(agent) = order.assigned_agent {
            // Already concluded; re-broadcasting must never double-award.
            debug!(order = %order_id, agent, "dispatch skipped, order already assigned");
            return Ok(self.concluded_offer(&order, agent));
        }
        if order.status != OrderStatus::Pending {
            return Err(CoreError::Validation(format!(
                "order {} is {:?}, only pending orders are dispatched",
                order_id, order.status
            )));
        }

        let origin = self
            .merchants
            .location(order.merchant)
            .await?
            .ok_or_else(|| {
                CoreError::Validation(format!("merchant {} has no location", order.merchant))
            })?;

        let mut candidates: Vec<OfferCandidate> = self
            .agents
            .online_agents()
            .await?
            .into_iter()
            .map(|a| OfferCandidate {
                agent: a.agent,
                distance_km: distance_km(a.position, origin),
            })
            .filter(|c| c.distance_km <= radius_km)
            .collect();
        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

        if candidates.is_empty() {
            warn!(order = %order_id, radius_km, "no agents within radius");
        }

        let now = Utc::now();
        let offer = DispatchOffer {
            order: *order_id,
            candidates,
            issued_at: now,
            expires_at: now + self.config.offer_window,
            winner: None,
        };
        self.offers.insert(*order_id, offer.clone());
        *self.rounds.entry(*order_id).or_insert(0) += 1;

        for candidate in &offer.candidates {
            self.notifier
                .push(
                    Channel::Agent(candidate.agent),
                    PushEvent::OfferBroadcast {
                        order: *order_id,
                        distance_km: candidate.distance_km,
                    },
                )
                .await?;
        }
        info!(
            order = %order_id,
            candidates = offer.candidates.len(),
            radius_km,
            "offer broadcast"
        );
        Ok(offer)
    }

    /// First acceptance wins. The claim is a single conditional update on
    /// the order's assignment field: under N concurrent calls exactly one
    /// succeeds and the rest see [`CoreError::OfferAlreadyClaimed`].
    pub async fn accept(&self, order_id: &OrderId, agent: u64) -> Result<Order> {
        // Snapshot the live offer's state; the map guard must not be held
        // past this statement.
        let offer_state = self
            .offers
            .get(order_id)
            .map(|offer| (offer.winner, offer.is_expired(Utc::now()), offer.is_candidate(agent)));
        match offer_state {
            None => {
                // No live offer: either someone already won, or the window
                // elapsed and the offer was dropped.
                let order = self
                    .orders
                    .get(order_id)
                    .await?
                    .ok_or(CoreError::OrderNotFound(*order_id))?;
                return Err(if order.assigned_agent.is_some() {
                    CoreError::OfferAlreadyClaimed { order: *order_id }
                } else {
                    CoreError::DispatchTimeout { order: *order_id }
                });
            }
            Some((Some(_), _, _)) => {
                return Err(CoreError::OfferAlreadyClaimed { order: *order_id });
            }
            Some((None, true, _)) => {
                return Err(CoreError::DispatchTimeout { order: *order_id });
            }
            Some((None, false, false)) => {
                return Err(CoreError::Validation(format!(
                    "agent {agent} was not offered order {order_id}"
                )));
            }
            Some((None, false, true)) => {}
        }

        if !self.orders.assign_agent(order_id, agent).await? {
            debug!(order = %order_id, agent, "acceptance lost the race");
            return Err(CoreError::OfferAlreadyClaimed { order: *order_id });
        }

        // This caller holds the claim; everything below runs exactly once.
        let order = self.orders.transition(order_id, OrderStatus::Accepted).await?;
        let losers: Vec<u64> = match self.offers.get_mut(order_id) {
            Some(mut offer) => {
                offer.winner = Some(agent);
                offer
                    .candidates
                    .iter()
                    .map(|c| c.agent)
                    .filter(|a| *a != agent)
                    .collect()
            }
            None => Vec::new(),
        };

        self.notifier
            .push(Channel::Agent(agent), PushEvent::OfferWon { order: *order_id })
            .await?;
        self.notifier
            .push(
                Channel::Customer(order.customer),
                PushEvent::OrderAssigned {
                    order: *order_id,
                    agent,
                },
            )
            .await?;
        for loser in losers {
            self.notifier
                .push(
                    Channel::Agent(loser),
                    PushEvent::OfferRejected { order: *order_id },
                )
                .await?;
        }

        // Winner recorded: the offer has served its purpose.
        self.offers.remove(order_id);
        self.rounds.remove(order_id);
        info!(order = %order_id, agent, "order accepted");
        Ok(order)
    }

    /// Live (possibly expired, not yet concluded) offer for an order.
    pub fn offer(&self, order_id: &OrderId) -> Option<DispatchOffer> {
        self.offers.get(order_id).map(|o| o.value().clone())
    }

    fn concluded_offer(&self, order: &Order, agent: u64) -> DispatchOffer {
        self.offers.get(&order.id).map(|o| o.value().clone()).unwrap_or_else(|| {
            let now = Utc::now();
            DispatchOffer {
                order: order.id,
                candidates: Vec::new(),
                issued_at: now,
                expires_at: now,
                winner: Some(agent),
            }
        })
    }
}
