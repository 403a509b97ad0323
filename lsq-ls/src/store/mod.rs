//! Profile store
//!
//! Owns canonical per-lead state and composes the scoring engine, tier
//! classifier, and interaction log into one atomic `apply_event`. Mutation is
//! serialized per identity key through the lock registry; distinct leads
//! proceed in parallel. All writes for one event share a single transaction:
//! if persistence fails, no partial mutation is visible.
//!
//! The source material kept this state in a module-level singleton mutated
//! from multiple request handlers with no locking; the store is an explicit
//! instance injected into handlers instead.

pub mod locks;

use crate::db::{interactions, profiles};
use crate::error::{Error, Result};
use crate::notify::NotificationDispatcher;
use crate::{scoring, tier};
use chrono::Utc;
use lsq_common::events::{EventBus, LsqEvent};
use lsq_common::model::{InteractionEvent, LeadProfile, TierChange};
use self::locks::LockManager;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of applying one event
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub profile: LeadProfile,
    /// The event id had already been applied; nothing changed
    pub duplicate: bool,
    /// Points credited by this application (0 for duplicates)
    pub points: i64,
    /// Present when the application changed the profile's tier
    pub tier_change: Option<TierChange>,
}

/// Canonical per-lead state owner
pub struct ProfileStore {
    pool: SqlitePool,
    locks: LockManager,
    bus: EventBus,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ProfileStore {
    pub fn new(
        pool: SqlitePool,
        bus: EventBus,
        dispatcher: Arc<NotificationDispatcher>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            locks: LockManager::new(lock_timeout),
            bus,
            dispatcher,
        }
    }

    /// Fetch a profile without locking
    ///
    /// May be slightly stale relative to an in-flight apply_event, but is
    /// always a committed snapshot: score and tier never mix generations.
    pub async fn get(&self, identity_key: &str) -> Result<Option<LeadProfile>> {
        profiles::fetch_by_identity(&self.pool, identity_key).await
    }

    /// Fetch a profile, creating an empty one if the key is new
    pub async fn get_or_create(&self, identity_key: &str) -> Result<LeadProfile> {
        let _guard = self.locks.acquire(identity_key).await?;

        if let Some(profile) = profiles::fetch_by_identity(&self.pool, identity_key).await? {
            return Ok(profile);
        }

        let profile = LeadProfile::new(identity_key, Utc::now());
        profiles::insert(&self.pool, &profile).await?;
        info!(identity_key = %identity_key, lead_id = %profile.lead_id, "Created lead profile");
        self.bus.emit_lossy(LsqEvent::ProfileCreated {
            lead_id: profile.lead_id,
            identity_key: profile.identity_key.clone(),
            timestamp: profile.created_at,
        });
        Ok(profile)
    }

    /// Apply one normalized event atomically
    ///
    /// Re-delivery of an already-applied event id returns the unchanged
    /// profile with `duplicate: true` (success, not an error). Notification
    /// dispatch and bus emission happen strictly after commit.
    pub async fn apply_event(&self, event: InteractionEvent) -> Result<ApplyOutcome> {
        let _guard = self.locks.acquire(&event.identity_key).await?;

        let mut tx = self.pool.begin().await?;

        let existing = profiles::fetch_by_identity(&mut *tx, &event.identity_key).await?;
        let created = existing.is_none();
        let mut profile = match existing {
            Some(p) => p,
            None => LeadProfile::new(&event.identity_key, Utc::now()),
        };

        if !created && interactions::exists(&mut *tx, profile.lead_id, &event.event_id).await? {
            // Nothing to roll back; the transaction only read
            debug!(
                identity_key = %event.identity_key,
                event_id = %event.event_id,
                "Duplicate event delivery absorbed"
            );
            return Ok(ApplyOutcome {
                profile,
                duplicate: true,
                points: 0,
                tier_change: None,
            });
        }

        let applied = scoring::apply_event(&profile.score_breakdown, &event);
        let (new_tier, new_sticky) =
            tier::classify_after_event(profile.tier, profile.sticky, &applied.breakdown, &event);

        let from_tier = profile.tier;
        profile.score_breakdown = applied.breakdown;
        profile.tier = new_tier;
        profile.sticky = new_sticky;
        profile.last_interaction = match profile.last_interaction {
            Some(existing) => Some(existing.max(event.timestamp)),
            None => Some(event.timestamp),
        };
        absorb_contact_fields(&mut profile, &event);

        if created {
            profiles::insert(&mut *tx, &profile).await?;
        } else {
            profiles::update(&mut *tx, &profile).await?;
        }
        interactions::append(&mut *tx, profile.lead_id, &event, applied.points).await?;

        tx.commit().await?;

        let tier_change = (from_tier != new_tier).then(|| TierChange {
            lead_id: profile.lead_id,
            identity_key: profile.identity_key.clone(),
            from_tier,
            to_tier: new_tier,
            triggering_event_id: event.event_id.clone(),
            timestamp: event.timestamp,
        });

        self.emit_post_commit(created, &profile, &event, applied.points, &tier_change);

        Ok(ApplyOutcome {
            profile,
            duplicate: false,
            points: applied.points,
            tier_change,
        })
    }

    /// Merge an anonymous session profile into an identified profile
    ///
    /// Breakdowns sum component-wise, logs concatenate deduplicated by event
    /// id, and the tier is recomputed over the merged breakdown (a sticky
    /// side wins). Locks are taken in fixed key order to rule out deadlock.
    pub async fn merge(&self, source_key: &str, target_key: &str) -> Result<LeadProfile> {
        if source_key == target_key {
            return Err(Error::Validation(
                "cannot merge a profile into itself".to_string(),
            ));
        }

        let _guards = self.locks.acquire_pair(source_key, target_key).await?;

        let mut tx = self.pool.begin().await?;

        let source = profiles::fetch_by_identity(&mut *tx, source_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {}", source_key)))?;
        let mut target = profiles::fetch_by_identity(&mut *tx, target_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {}", target_key)))?;

        let from_tier = target.tier;
        let merged_breakdown = target.score_breakdown.merged(&source.score_breakdown);
        let (merged_tier, merged_sticky) = tier::merged_tier(
            (target.tier, target.sticky),
            (source.tier, source.sticky),
            &merged_breakdown,
        );

        target.score_breakdown = merged_breakdown;
        target.tier = merged_tier;
        target.sticky = merged_sticky;
        target.name = target.name.take().or(source.name);
        target.phone = target.phone.take().or(source.phone);
        target.source = target.source.take().or(source.source);
        target.last_interaction = match (target.last_interaction, source.last_interaction) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        interactions::reassign_deduplicated(&mut tx, source.lead_id, target.lead_id).await?;
        profiles::delete(&mut *tx, source.lead_id).await?;
        profiles::update(&mut *tx, &target).await?;

        tx.commit().await?;

        info!(
            source_key = %source_key,
            target_key = %target_key,
            merged_total = target.score_breakdown.total,
            "Merged session profile into lead"
        );
        self.bus.emit_lossy(LsqEvent::ProfilesMerged {
            source_lead_id: source.lead_id,
            target_lead_id: target.lead_id,
            identity_key: target.identity_key.clone(),
            merged_total: target.score_breakdown.total,
            timestamp: Utc::now(),
        });

        if from_tier != target.tier {
            let change = TierChange {
                lead_id: target.lead_id,
                identity_key: target.identity_key.clone(),
                from_tier,
                to_tier: target.tier,
                triggering_event_id: format!("merge:{}", source.lead_id),
                timestamp: Utc::now(),
            };
            self.bus.emit_lossy(LsqEvent::TierChanged {
                lead_id: change.lead_id,
                identity_key: change.identity_key.clone(),
                from_tier: change.from_tier,
                to_tier: change.to_tier,
                triggering_event_id: change.triggering_event_id.clone(),
                timestamp: change.timestamp,
            });
            self.dispatcher.dispatch(change);
        }

        Ok(target)
    }

    /// Fold the full ordered log from an empty profile
    ///
    /// Diagnostics for the replay contract: the result must match the live
    /// profile's breakdown and tier exactly.
    pub async fn replay(&self, identity_key: &str) -> Result<LeadProfile> {
        let live = self
            .get(identity_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {}", identity_key)))?;

        let events =
            interactions::fetch_ordered(&self.pool, live.lead_id, identity_key).await?;

        let mut folded = LeadProfile::new(identity_key, live.created_at);
        folded.lead_id = live.lead_id;
        folded.name = live.name.clone();
        folded.phone = live.phone.clone();
        folded.source = live.source.clone();
        folded.metadata = live.metadata.clone();

        for event in &events {
            let applied = scoring::apply_event(&folded.score_breakdown, event);
            let (new_tier, new_sticky) =
                tier::classify_after_event(folded.tier, folded.sticky, &applied.breakdown, event);
            folded.score_breakdown = applied.breakdown;
            folded.tier = new_tier;
            folded.sticky = new_sticky;
            folded.last_interaction = match folded.last_interaction {
                Some(existing) => Some(existing.max(event.timestamp)),
                None => Some(event.timestamp),
            };
        }

        Ok(folded)
    }

    /// Explicit admin/GDPR delete
    ///
    /// The one path that removes a profile; the log rows go with it (they are
    /// keyed to the identity and therefore personal data).
    pub async fn delete(&self, identity_key: &str, reason: Option<String>) -> Result<()> {
        let _guard = self.locks.acquire(identity_key).await?;

        let profile = profiles::fetch_by_identity(&self.pool, identity_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {}", identity_key)))?;

        let mut tx = self.pool.begin().await?;
        interactions::delete_for_lead(&mut *tx, profile.lead_id).await?;
        profiles::delete(&mut *tx, profile.lead_id).await?;
        tx.commit().await?;

        info!(
            identity_key = %identity_key,
            lead_id = %profile.lead_id,
            reason = reason.as_deref().unwrap_or("unspecified"),
            "Deleted lead profile on admin request"
        );
        self.bus.emit_lossy(LsqEvent::ProfileDeleted {
            lead_id: profile.lead_id,
            identity_key: identity_key.to_string(),
            reason,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn emit_post_commit(
        &self,
        created: bool,
        profile: &LeadProfile,
        event: &InteractionEvent,
        points: i64,
        tier_change: &Option<TierChange>,
    ) {
        if created {
            self.bus.emit_lossy(LsqEvent::ProfileCreated {
                lead_id: profile.lead_id,
                identity_key: profile.identity_key.clone(),
                timestamp: profile.created_at,
            });
        }

        self.bus.emit_lossy(LsqEvent::InteractionRecorded {
            lead_id: profile.lead_id,
            event_id: event.event_id.clone(),
            category: event.category.as_str().to_string(),
            points,
            total: profile.score_breakdown.total,
            timestamp: event.timestamp,
        });

        if let Some(change) = tier_change {
            info!(
                identity_key = %profile.identity_key,
                from_tier = %change.from_tier,
                to_tier = %change.to_tier,
                event_id = %change.triggering_event_id,
                "Tier transition accepted"
            );
            self.bus.emit_lossy(LsqEvent::TierChanged {
                lead_id: change.lead_id,
                identity_key: change.identity_key.clone(),
                from_tier: change.from_tier,
                to_tier: change.to_tier,
                triggering_event_id: change.triggering_event_id.clone(),
                timestamp: change.timestamp,
            });
            self.dispatcher.dispatch(change.clone());
        }
    }
}

/// Fill missing contact fields from event metadata (email-capture events
/// carry name/phone/source alongside the identity)
fn absorb_contact_fields(profile: &mut LeadProfile, event: &InteractionEvent) {
    let Some(meta) = event.metadata.as_object() else {
        return;
    };
    let field = |name: &str| meta.get(name).and_then(|v| v.as_str()).map(String::from);

    if profile.name.is_none() {
        profile.name = field("name");
    }
    if profile.phone.is_none() {
        profile.phone = field("phone");
    }
    if profile.source.is_none() {
        profile.source = field("source");
    }
}
