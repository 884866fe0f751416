//! In-memory store.
//!
//! All state sits behind one `tokio::sync::Mutex`, which makes every trait method,
//! including the guard-then-write in [`Store::apply_change`], atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use nps_core::{
    evaluate, AnalyticsEvent, Change, Consent, Document, DocumentKind, GuardPolicy, KycRecord,
    KycStatus, Mobile, OrderId, Payment, PaymentStatus, PfmSelection, SessionId, Transition,
    User, UserId, UserProfile, Verdict, VideoKycSession, VideoKycStatus,
};

use crate::error::{Result, StoreError};
use crate::report::{KycReportPage, KycReportRow, OnboardingSummary};
use crate::{Outcome, Settlement, Store};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    by_mobile: HashMap<String, UserId>,
    kyc: HashMap<UserId, KycRecord>,
    sessions: HashMap<SessionId, VideoKycSession>,
    profiles: HashMap<UserId, UserProfile>,
    pfm: HashMap<UserId, PfmSelection>,
    payments: HashMap<OrderId, Payment>,
    consents: Vec<Consent>,
    documents: Vec<Document>,
    events: Vec<AnalyticsEvent>,
}

impl State {
    fn user(&self, id: &UserId) -> Result<&User> {
        self.users
            .get(id)
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    /// Domain write for an accepted change. The position is updated by the caller.
    fn write(&mut self, user: &mut User, change: Change) {
        let now = Utc::now();
        let id = user.id;
        match change {
            Change::VerifyAadhaar {
                last4,
                demographics,
            } => {
                let kyc = self.kyc.entry(id).or_insert_with(|| KycRecord::new(id));
                kyc.aadhaar_verified = true;
                kyc.aadhaar_last4 = Some(last4);
                kyc.demographics = Some(demographics);
                kyc.updated_at = now;
            }
            Change::VerifyPan { pan } => {
                let kyc = self.kyc.entry(id).or_insert_with(|| KycRecord::new(id));
                kyc.pan_verified = true;
                kyc.pan_number = Some(pan.as_str().to_string());
                kyc.updated_at = now;
            }
            Change::StartVideo { session_id } => {
                self.sessions.insert(
                    session_id,
                    VideoKycSession {
                        session_id,
                        user_id: id,
                        status: VideoKycStatus::Initiated,
                        recording_key: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
                let kyc = self.kyc.entry(id).or_insert_with(|| KycRecord::new(id));
                kyc.video_kyc_status = VideoKycStatus::Initiated;
                kyc.updated_at = now;
            }
            Change::CompleteVideo {
                session_id,
                recording_key,
            } => {
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    session.status = VideoKycStatus::Approved;
                    session.recording_key = recording_key;
                    session.updated_at = now;
                }
                let kyc = self.kyc.entry(id).or_insert_with(|| KycRecord::new(id));
                kyc.video_kyc_status = VideoKycStatus::Approved;
                kyc.updated_at = now;
            }
            Change::SavePersonal(details) => {
                self.profiles
                    .entry(id)
                    .or_insert_with(|| UserProfile::new(id))
                    .apply_personal(&details);
            }
            Change::SaveAddress(details) => {
                self.profiles
                    .entry(id)
                    .or_insert_with(|| UserProfile::new(id))
                    .apply_address(&details);
            }
            Change::SaveNominee(details) => {
                self.profiles
                    .entry(id)
                    .or_insert_with(|| UserProfile::new(id))
                    .apply_nominee(&details);
            }
            Change::SelectPfm { pfm_id, allocation } => {
                self.pfm.insert(
                    id,
                    PfmSelection {
                        user_id: id,
                        pfm_id,
                        allocation,
                        updated_at: now,
                    },
                );
            }
            Change::InitiatePayment { order_id, amount } => {
                self.payments
                    .insert(order_id, Payment::new(order_id, id, amount));
            }
            Change::GeneratePran { pran } => {
                user.pran = Some(pran);
            }
        }
    }
}

/// In-process [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_or_create_user(&self, mobile: &Mobile) -> Result<(User, bool)> {
        let mut state = self.state.lock().await;
        if let Some(id) = state.by_mobile.get(mobile.as_str()).copied() {
            let user = state
                .users
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("user", id))?;
            if !user.is_verified {
                user.is_verified = true;
                user.updated_at = Utc::now();
            }
            return Ok((user.clone(), false));
        }
        let user = User::new(mobile.clone());
        state.by_mobile.insert(mobile.as_str().to_string(), user.id);
        state.users.insert(user.id, user.clone());
        Ok((user, true))
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.by_mobile.contains_key(user.mobile.as_str()) {
            return Err(StoreError::Conflict(format!(
                "mobile already registered: {}",
                user.mobile.masked()
            )));
        }
        state
            .by_mobile
            .insert(user.mobile.as_str().to_string(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn get_user_by_mobile(&self, mobile: &Mobile) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .by_mobile
            .get(mobile.as_str())
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn set_refresh_token(&self, id: &UserId, token: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        user.refresh_token = token.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn rotate_refresh_token(&self, id: &UserId, current: &str, next: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(id) else {
            return Ok(false);
        };
        if user.refresh_token.as_deref() != Some(current) {
            return Ok(false);
        }
        user.refresh_token = Some(next.to_string());
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply_change(
        &self,
        id: &UserId,
        change: Change,
        policy: &GuardPolicy,
    ) -> Result<Outcome> {
        let mut state = self.state.lock().await;
        let mut user = state.user(id)?.clone();

        if let Change::CompleteVideo { session_id, .. } = &change {
            let owned = state
                .sessions
                .get(session_id)
                .is_some_and(|s| s.user_id == *id);
            if !owned {
                return Err(StoreError::not_found("video KYC session", session_id));
            }
        }

        match evaluate(user.position(), change.transition(), policy)? {
            Verdict::Replay => Ok(Outcome::Replayed(user)),
            Verdict::Apply(next) => {
                if let Change::GeneratePran { pran } = &change {
                    if state.users.values().any(|other| other.pran.as_ref() == Some(pran)) {
                        return Err(StoreError::Conflict(format!("PRAN already issued: {pran}")));
                    }
                }
                state.write(&mut user, change);
                user.set_position(next);
                state.users.insert(user.id, user.clone());
                Ok(Outcome::Applied(user))
            }
        }
    }

    async fn settle_payment(&self, order_id: &OrderId, success: bool) -> Result<Settlement> {
        let mut state = self.state.lock().await;
        let mut payment = state
            .payments
            .get(order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        match payment.status {
            PaymentStatus::Success => return Ok(Settlement::AlreadyProcessed(payment)),
            PaymentStatus::Expired => return Ok(Settlement::Expired(payment)),
            PaymentStatus::Created | PaymentStatus::Failed => {}
        }

        payment.updated_at = Utc::now();
        let settlement = if success {
            let mut user = state.user(&payment.user_id)?.clone();
            if let Verdict::Apply(next) = evaluate(
                user.position(),
                Transition::ConfirmPayment,
                &GuardPolicy::STRICT,
            )? {
                user.set_position(next);
                state.users.insert(user.id, user);
            }
            payment.status = PaymentStatus::Success;
            Settlement::Succeeded(payment.clone())
        } else {
            payment.status = PaymentStatus::Failed;
            Settlement::Failed(payment.clone())
        };
        state.payments.insert(*order_id, payment);
        Ok(settlement)
    }

    async fn expire_payments(&self, created_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut expired = 0;
        for payment in state.payments.values_mut() {
            if payment.status == PaymentStatus::Created && payment.created_at < created_before {
                payment.status = PaymentStatus::Expired;
                payment.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn get_kyc(&self, id: &UserId) -> Result<Option<KycRecord>> {
        Ok(self.state.lock().await.kyc.get(id).cloned())
    }

    async fn get_profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.state.lock().await.profiles.get(id).cloned())
    }

    async fn get_pfm_selection(&self, id: &UserId) -> Result<Option<PfmSelection>> {
        Ok(self.state.lock().await.pfm.get(id).cloned())
    }

    async fn get_payment(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(order_id).cloned())
    }

    async fn append_consent(&self, consent: &Consent) -> Result<()> {
        self.state.lock().await.consents.push(consent.clone());
        Ok(())
    }

    async fn list_consents(&self, id: &UserId) -> Result<Vec<Consent>> {
        let state = self.state.lock().await;
        Ok(state
            .consents
            .iter()
            .rev()
            .filter(|c| c.user_id == *id)
            .cloned()
            .collect())
    }

    async fn put_document(&self, document: &Document) -> Result<()> {
        self.state.lock().await.documents.push(document.clone());
        Ok(())
    }

    async fn latest_document(&self, id: &UserId, kind: DocumentKind) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .iter()
            .rev()
            .find(|d| d.user_id == *id && d.kind == kind)
            .cloned())
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()> {
        self.state.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>> {
        let state = self.state.lock().await;
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }

    async fn onboarding_summary(&self) -> Result<OnboardingSummary> {
        let state = self.state.lock().await;
        Ok(OnboardingSummary::from_positions(
            state
                .users
                .values()
                .map(|u| (u.onboarding_step, u.kyc_status)),
        ))
    }

    async fn kyc_report(&self, page: u32, limit: u32) -> Result<KycReportPage> {
        let state = self.state.lock().await;
        let mut matching: Vec<&User> = state
            .users
            .values()
            .filter(|u| u.kyc_status != KycStatus::NotStarted)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let skip = (page.max(1) as usize - 1) * limit as usize;
        let users = matching
            .iter()
            .skip(skip)
            .take(limit as usize)
            .map(|u| KycReportRow {
                id: u.id,
                mobile: u.mobile.clone(),
                kyc_status: u.kyc_status,
                onboarding_step: u.onboarding_step,
                created_at: u.created_at,
            })
            .collect();

        Ok(KycReportPage {
            page: page.max(1),
            limit,
            total: matching.len() as u64,
            users,
        })
    }
}
