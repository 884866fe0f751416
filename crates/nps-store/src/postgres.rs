//! PostgreSQL store.
//!
//! Guarded writes run in a transaction that locks the user row with
//! `SELECT ... FOR UPDATE`, evaluates the transition, performs the domain write and
//! updates the position before committing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use nps_core::{
    evaluate, Allocation, AnalyticsEvent, Change, Consent, ConsentType, Demographics, Document,
    DocumentKind, DocumentStatus, EventId, GuardPolicy, KycRecord, KycStatus, Mobile,
    OnboardingStep, OrderId, Payment, PaymentStatus, PfmSelection, Pran, Role,
    Transition, User, UserId, UserProfile, Verdict, VideoKycStatus,
};

use crate::error::{Result, StoreError};
use crate::report::{KycReportPage, KycReportRow, OnboardingSummary};
use crate::{Outcome, Settlement, Store};

const USER_COLUMNS: &str = "id, mobile, is_verified, onboarding_step, kyc_status, role, \
                            refresh_token, pran, created_at, updated_at";

// ============================================================================
// Rows
// ============================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    mobile: String,
    is_verified: bool,
    onboarding_step: String,
    kyc_status: String,
    role: String,
    refresh_token: Option<String>,
    pran: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UpsertedUserRow {
    #[sqlx(flatten)]
    user: UserRow,
    inserted: bool,
}

#[derive(FromRow)]
struct KycRow {
    user_id: Uuid,
    aadhaar_verified: bool,
    aadhaar_last4: Option<String>,
    demographics: Option<Json<Demographics>>,
    pan_verified: bool,
    pan_number: Option<String>,
    video_kyc_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: Uuid,
    father_name: Option<String>,
    marital_status: Option<String>,
    occupation: Option<String>,
    annual_income: Option<String>,
    address: Option<String>,
    nominee_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PfmRow {
    user_id: Uuid,
    pfm_id: i32,
    allocation_e: i16,
    allocation_c: i16,
    allocation_g: i16,
    allocation_a: i16,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PaymentRow {
    order_id: String,
    user_id: Uuid,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ConsentRow {
    user_id: Uuid,
    consent_type: String,
    ip_address: Option<String>,
    accepted_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct DocumentRow {
    user_id: Uuid,
    kind: String,
    encrypted_path: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    user_id: Option<Uuid>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct GroupRow {
    onboarding_step: String,
    kyc_status: String,
    users: i64,
}

fn decode_err(what: &str, value: &str) -> StoreError {
    StoreError::Serialization(format!("invalid {what}: {value}"))
}

fn row_to_user(row: UserRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.id),
        mobile: row
            .mobile
            .parse::<Mobile>()
            .map_err(|_| decode_err("mobile", &row.mobile))?,
        is_verified: row.is_verified,
        onboarding_step: OnboardingStep::parse(&row.onboarding_step)
            .ok_or_else(|| decode_err("onboarding step", &row.onboarding_step))?,
        kyc_status: KycStatus::parse(&row.kyc_status)
            .ok_or_else(|| decode_err("KYC status", &row.kyc_status))?,
        role: Role::parse(&row.role).ok_or_else(|| decode_err("role", &row.role))?,
        refresh_token: row.refresh_token,
        pran: row.pran.map(Pran::from_stored),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_kyc(row: KycRow) -> Result<KycRecord> {
    Ok(KycRecord {
        user_id: UserId::from_uuid(row.user_id),
        aadhaar_verified: row.aadhaar_verified,
        aadhaar_last4: row.aadhaar_last4,
        demographics: row.demographics.map(|Json(d)| d),
        pan_verified: row.pan_verified,
        pan_number: row.pan_number,
        video_kyc_status: VideoKycStatus::parse(&row.video_kyc_status)
            .ok_or_else(|| decode_err("video KYC status", &row.video_kyc_status))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_profile(row: ProfileRow) -> UserProfile {
    UserProfile {
        user_id: UserId::from_uuid(row.user_id),
        father_name: row.father_name,
        marital_status: row.marital_status,
        occupation: row.occupation,
        annual_income: row.annual_income,
        address: row.address,
        nominee_name: row.nominee_name,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn row_to_pfm(row: PfmRow) -> Result<PfmSelection> {
    let share = |v: i16| u8::try_from(v).map_err(|_| decode_err("allocation", &v.to_string()));
    let allocation = Allocation::from_shares([
        share(row.allocation_e)?,
        share(row.allocation_c)?,
        share(row.allocation_g)?,
        share(row.allocation_a)?,
    ])
    .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(PfmSelection {
        user_id: UserId::from_uuid(row.user_id),
        pfm_id: u32::try_from(row.pfm_id)
            .map_err(|_| decode_err("PFM id", &row.pfm_id.to_string()))?,
        allocation,
        updated_at: row.updated_at,
    })
}

fn row_to_payment(row: PaymentRow) -> Result<Payment> {
    Ok(Payment {
        order_id: row
            .order_id
            .parse::<OrderId>()
            .map_err(|_| decode_err("order id", &row.order_id))?,
        user_id: UserId::from_uuid(row.user_id),
        amount: row.amount,
        status: PaymentStatus::parse(&row.status)
            .ok_or_else(|| decode_err("payment status", &row.status))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_consent(row: ConsentRow) -> Result<Consent> {
    Ok(Consent {
        user_id: UserId::from_uuid(row.user_id),
        consent_type: ConsentType::parse(&row.consent_type)
            .ok_or_else(|| decode_err("consent type", &row.consent_type))?,
        ip_address: row.ip_address,
        accepted_at: row.accepted_at,
    })
}

fn row_to_document(row: DocumentRow) -> Result<Document> {
    Ok(Document {
        user_id: UserId::from_uuid(row.user_id),
        kind: DocumentKind::parse(&row.kind).ok_or_else(|| decode_err("document kind", &row.kind))?,
        encrypted_path: row.encrypted_path,
        status: DocumentStatus::Verified,
        created_at: row.created_at,
    })
}

fn row_to_event(row: EventRow) -> AnalyticsEvent {
    AnalyticsEvent {
        id: EventId::from_uuid(row.id),
        event_type: row.event_type,
        user_id: row.user_id.map(UserId::from_uuid),
        details: row.details,
        created_at: row.created_at,
    }
}

// ============================================================================
// Store
// ============================================================================

/// [`Store`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `url`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the server is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn lock_user(conn: &mut PgConnection, id: &UserId) -> Result<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("user", id))?;
    row_to_user(row)
}

async fn save_position(conn: &mut PgConnection, user: &User) -> Result<()> {
    sqlx::query(
        "UPDATE users SET onboarding_step = $2, kyc_status = $3, pran = $4, updated_at = $5 \
         WHERE id = $1",
    )
    .bind(user.id.as_uuid())
    .bind(user.onboarding_step.as_str())
    .bind(user.kyc_status.as_str())
    .bind(user.pran.as_ref().map(Pran::as_str))
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_kyc(conn: &mut PgConnection, id: UserId) -> Result<KycRecord> {
    let row = sqlx::query_as::<_, KycRow>("SELECT * FROM kyc_records WHERE user_id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    row.map_or_else(|| Ok(KycRecord::new(id)), row_to_kyc)
}

async fn save_kyc(conn: &mut PgConnection, kyc: &KycRecord) -> Result<()> {
    let demographics = kyc.demographics.as_ref().map(Json);
    sqlx::query(
        "INSERT INTO kyc_records (user_id, aadhaar_verified, aadhaar_last4, demographics, \
         pan_verified, pan_number, video_kyc_status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id) DO UPDATE SET aadhaar_verified = EXCLUDED.aadhaar_verified, \
         aadhaar_last4 = EXCLUDED.aadhaar_last4, demographics = EXCLUDED.demographics, \
         pan_verified = EXCLUDED.pan_verified, pan_number = EXCLUDED.pan_number, \
         video_kyc_status = EXCLUDED.video_kyc_status, updated_at = EXCLUDED.updated_at",
    )
    .bind(kyc.user_id.as_uuid())
    .bind(kyc.aadhaar_verified)
    .bind(kyc.aadhaar_last4.as_deref())
    .bind(demographics)
    .bind(kyc.pan_verified)
    .bind(kyc.pan_number.as_deref())
    .bind(kyc.video_kyc_status.as_str())
    .bind(kyc.created_at)
    .bind(kyc.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load_profile(conn: &mut PgConnection, id: UserId) -> Result<UserProfile> {
    let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM user_profiles WHERE user_id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map_or_else(|| UserProfile::new(id), row_to_profile))
}

async fn save_profile(conn: &mut PgConnection, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_profiles (user_id, father_name, marital_status, occupation, \
         annual_income, address, nominee_name, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id) DO UPDATE SET father_name = EXCLUDED.father_name, \
         marital_status = EXCLUDED.marital_status, occupation = EXCLUDED.occupation, \
         annual_income = EXCLUDED.annual_income, address = EXCLUDED.address, \
         nominee_name = EXCLUDED.nominee_name, updated_at = EXCLUDED.updated_at",
    )
    .bind(profile.user_id.as_uuid())
    .bind(profile.father_name.as_deref())
    .bind(profile.marital_status.as_deref())
    .bind(profile.occupation.as_deref())
    .bind(profile.annual_income.as_deref())
    .bind(profile.address.as_deref())
    .bind(profile.nominee_name.as_deref())
    .bind(profile.created_at)
    .bind(profile.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Domain write for an accepted change, inside the caller's transaction.
async fn write_change(conn: &mut PgConnection, user: &mut User, change: Change) -> Result<()> {
    let now = Utc::now();
    let id = user.id;
    match change {
        Change::VerifyAadhaar {
            last4,
            demographics,
        } => {
            let mut kyc = load_kyc(conn, id).await?;
            kyc.aadhaar_verified = true;
            kyc.aadhaar_last4 = Some(last4);
            kyc.demographics = Some(demographics);
            kyc.updated_at = now;
            save_kyc(conn, &kyc).await?;
        }
        Change::VerifyPan { pan } => {
            let mut kyc = load_kyc(conn, id).await?;
            kyc.pan_verified = true;
            kyc.pan_number = Some(pan.as_str().to_string());
            kyc.updated_at = now;
            save_kyc(conn, &kyc).await?;
        }
        Change::StartVideo { session_id } => {
            sqlx::query(
                "INSERT INTO video_kyc_sessions (session_id, user_id, status, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $4)",
            )
            .bind(session_id.as_uuid())
            .bind(id.as_uuid())
            .bind(VideoKycStatus::Initiated.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;
            let mut kyc = load_kyc(conn, id).await?;
            kyc.video_kyc_status = VideoKycStatus::Initiated;
            kyc.updated_at = now;
            save_kyc(conn, &kyc).await?;
        }
        Change::CompleteVideo {
            session_id,
            recording_key,
        } => {
            sqlx::query(
                "UPDATE video_kyc_sessions SET status = $2, recording_key = $3, updated_at = $4 \
                 WHERE session_id = $1",
            )
            .bind(session_id.as_uuid())
            .bind(VideoKycStatus::Approved.as_str())
            .bind(recording_key)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            let mut kyc = load_kyc(conn, id).await?;
            kyc.video_kyc_status = VideoKycStatus::Approved;
            kyc.updated_at = now;
            save_kyc(conn, &kyc).await?;
        }
        Change::SavePersonal(details) => {
            let mut profile = load_profile(conn, id).await?;
            profile.apply_personal(&details);
            save_profile(conn, &profile).await?;
        }
        Change::SaveAddress(details) => {
            let mut profile = load_profile(conn, id).await?;
            profile.apply_address(&details);
            save_profile(conn, &profile).await?;
        }
        Change::SaveNominee(details) => {
            let mut profile = load_profile(conn, id).await?;
            profile.apply_nominee(&details);
            save_profile(conn, &profile).await?;
        }
        Change::SelectPfm { pfm_id, allocation } => {
            let [e, c, g, a] = allocation.as_array();
            sqlx::query(
                "INSERT INTO pfm_selections (user_id, pfm_id, allocation_e, allocation_c, \
                 allocation_g, allocation_a, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (user_id) DO UPDATE SET pfm_id = EXCLUDED.pfm_id, \
                 allocation_e = EXCLUDED.allocation_e, allocation_c = EXCLUDED.allocation_c, \
                 allocation_g = EXCLUDED.allocation_g, allocation_a = EXCLUDED.allocation_a, \
                 updated_at = EXCLUDED.updated_at",
            )
            .bind(id.as_uuid())
            .bind(i32::try_from(pfm_id).map_err(|_| decode_err("PFM id", &pfm_id.to_string()))?)
            .bind(i16::from(e))
            .bind(i16::from(c))
            .bind(i16::from(g))
            .bind(i16::from(a))
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }
        Change::InitiatePayment { order_id, amount } => {
            sqlx::query(
                "INSERT INTO payments (order_id, user_id, amount, status, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $5)",
            )
            .bind(order_id.to_string())
            .bind(id.as_uuid())
            .bind(amount)
            .bind(PaymentStatus::Created.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }
        Change::GeneratePran { pran } => {
            user.pran = Some(pran);
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn find_or_create_user(&self, mobile: &Mobile) -> Result<(User, bool)> {
        let fresh = User::new(mobile.clone());
        let row = sqlx::query_as::<_, UpsertedUserRow>(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, TRUE, $3, $4, $5, NULL, NULL, $6, $6) \
             ON CONFLICT (mobile) DO UPDATE SET is_verified = TRUE \
             RETURNING {USER_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(fresh.id.as_uuid())
        .bind(mobile.as_str())
        .bind(fresh.onboarding_step.as_str())
        .bind(fresh.kyc_status.as_str())
        .bind(fresh.role.as_str())
        .bind(fresh.created_at)
        .fetch_one(&self.pool)
        .await?;
        let inserted = row.inserted;
        Ok((row_to_user(row.user)?, inserted))
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(user.id.as_uuid())
        .bind(user.mobile.as_str())
        .bind(user.is_verified)
        .bind(user.onboarding_step.as_str())
        .bind(user.kyc_status.as_str())
        .bind(user.role.as_str())
        .bind(user.refresh_token.as_deref())
        .bind(user.pran.as_ref().map(Pran::as_str))
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_user)
            .transpose()
    }

    async fn get_user_by_mobile(&self, mobile: &Mobile) -> Result<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE mobile = $1"
        ))
        .bind(mobile.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_user)
        .transpose()
    }

    async fn set_refresh_token(&self, id: &UserId, token: Option<&str>) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(token)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", id));
        }
        Ok(())
    }

    async fn rotate_refresh_token(&self, id: &UserId, current: &str, next: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3, updated_at = NOW() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id.as_uuid())
        .bind(current)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_change(
        &self,
        id: &UserId,
        change: Change,
        policy: &GuardPolicy,
    ) -> Result<Outcome> {
        let mut tx = self.pool.begin().await?;
        let mut user = lock_user(&mut tx, id).await?;

        if let Change::CompleteVideo { session_id, .. } = &change {
            let owner: Option<Uuid> =
                sqlx::query_scalar("SELECT user_id FROM video_kyc_sessions WHERE session_id = $1")
                    .bind(session_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            if owner.as_ref() != Some(id.as_uuid()) {
                return Err(StoreError::not_found("video KYC session", session_id));
            }
        }

        match evaluate(user.position(), change.transition(), policy)? {
            Verdict::Replay => Ok(Outcome::Replayed(user)),
            Verdict::Apply(next) => {
                write_change(&mut tx, &mut user, change).await?;
                user.set_position(next);
                save_position(&mut tx, &user).await?;
                tx.commit().await?;
                Ok(Outcome::Applied(user))
            }
        }
    }

    async fn settle_payment(&self, order_id: &OrderId, success: bool) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("order", order_id))?;
        let mut payment = row_to_payment(row)?;

        match payment.status {
            PaymentStatus::Success => return Ok(Settlement::AlreadyProcessed(payment)),
            PaymentStatus::Expired => return Ok(Settlement::Expired(payment)),
            PaymentStatus::Created | PaymentStatus::Failed => {}
        }

        if success {
            let mut user = lock_user(&mut tx, &payment.user_id).await?;
            if let Verdict::Apply(next) = evaluate(
                user.position(),
                Transition::ConfirmPayment,
                &GuardPolicy::STRICT,
            )? {
                user.set_position(next);
                save_position(&mut tx, &user).await?;
            }
            payment.status = PaymentStatus::Success;
        } else {
            payment.status = PaymentStatus::Failed;
        }
        payment.updated_at = Utc::now();

        sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE order_id = $1")
            .bind(order_id.to_string())
            .bind(payment.status.as_str())
            .bind(payment.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(if success {
            Settlement::Succeeded(payment)
        } else {
            Settlement::Failed(payment)
        })
    }

    async fn expire_payments(&self, created_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE payments SET status = $1, updated_at = NOW() \
             WHERE status = $2 AND created_at < $3",
        )
        .bind(PaymentStatus::Expired.as_str())
        .bind(PaymentStatus::Created.as_str())
        .bind(created_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_kyc(&self, id: &UserId) -> Result<Option<KycRecord>> {
        sqlx::query_as::<_, KycRow>("SELECT * FROM kyc_records WHERE user_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_kyc)
            .transpose()
    }

    async fn get_profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(
            sqlx::query_as::<_, ProfileRow>("SELECT * FROM user_profiles WHERE user_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
                .map(row_to_profile),
        )
    }

    async fn get_pfm_selection(&self, id: &UserId) -> Result<Option<PfmSelection>> {
        sqlx::query_as::<_, PfmRow>("SELECT * FROM pfm_selections WHERE user_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_pfm)
            .transpose()
    }

    async fn get_payment(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_payment)
            .transpose()
    }

    async fn append_consent(&self, consent: &Consent) -> Result<()> {
        sqlx::query(
            "INSERT INTO consents (user_id, consent_type, ip_address, accepted_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(consent.user_id.as_uuid())
        .bind(consent.consent_type.as_str())
        .bind(consent.ip_address.as_deref())
        .bind(consent.accepted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_consents(&self, id: &UserId) -> Result<Vec<Consent>> {
        sqlx::query_as::<_, ConsentRow>(
            "SELECT user_id, consent_type, ip_address, accepted_at FROM consents \
             WHERE user_id = $1 ORDER BY accepted_at DESC, id DESC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(row_to_consent)
        .collect()
    }

    async fn put_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (user_id, kind, encrypted_path, status, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(document.user_id.as_uuid())
        .bind(document.kind.as_str())
        .bind(&document.encrypted_path)
        .bind(document.status.as_str())
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_document(&self, id: &UserId, kind: DocumentKind) -> Result<Option<Document>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT user_id, kind, encrypted_path, created_at FROM documents \
             WHERE user_id = $1 AND kind = $2 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_document)
        .transpose()
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics_events (id, event_type, user_id, details, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id.as_uuid())
        .bind(&event.event_type)
        .bind(event.user_id.as_ref().map(UserId::as_uuid))
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM analytics_events ORDER BY created_at DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn onboarding_summary(&self) -> Result<OnboardingSummary> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT onboarding_step, kyc_status, COUNT(*) AS users FROM users \
             GROUP BY onboarding_step, kyc_status",
        )
        .fetch_all(&self.pool)
        .await?;
        let groups = rows
            .into_iter()
            .map(|row| {
                let step = OnboardingStep::parse(&row.onboarding_step)
                    .ok_or_else(|| decode_err("onboarding step", &row.onboarding_step))?;
                let kyc = KycStatus::parse(&row.kyc_status)
                    .ok_or_else(|| decode_err("KYC status", &row.kyc_status))?;
                Ok((step, kyc, u64::try_from(row.users).unwrap_or(0)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OnboardingSummary::from_grouped(groups))
    }

    async fn kyc_report(&self, page: u32, limit: u32) -> Result<KycReportPage> {
        let page = page.max(1);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE kyc_status <> $1")
            .bind(KycStatus::NotStarted.as_str())
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE kyc_status <> $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(KycStatus::NotStarted.as_str())
        .bind(i64::from(limit))
        .bind(i64::from(page - 1) * i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(|row| {
                row_to_user(row).map(|u| KycReportRow {
                    id: u.id,
                    mobile: u.mobile,
                    kyc_status: u.kyc_status,
                    onboarding_step: u.onboarding_step,
                    created_at: u.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(KycReportPage {
            page,
            limit,
            total: u64::try_from(total).unwrap_or(0),
            users,
        })
    }
}
