//! # テスト用モック
//!
//! 配信サービスのテストで使用するインメモリのリポジトリと外部協調者。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! hikyaku-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! トランザクションに参加する書き込み（`insert`）は [`TxContext::stage`] で保留し、
//! コミット時にだけ反映する。ドロップされたトランザクションの書き込みは残らない。

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hikyaku_domain::{
    campaign::{Campaign, CampaignAggregate, CampaignId, CampaignStatus, MessageStatusCounts},
    campaign_type::CampaignType,
    directory::DirectoryError,
    identity::{AccessToken, IdentityError, UserEmails},
    job::{ClaimToken, Job, JobId, Lease, NewJob},
    mail::{MailError, MailMessage},
    message::{Message, MessageId, MessageStatus},
    template::Templates,
    unsubscribe::{ReceiptKey, Unsubscriber},
};

use crate::{
    db::{TransactionManager, TxContext},
    directory::DirectoryClient,
    error::InfraError,
    identity::IdentityProvider,
    mail::MailTransport,
    repository::{
        CampaignRepository,
        CampaignTypeRepository,
        JobRepository,
        MessageRepository,
        ReceiptRepository,
        TemplateRepository,
        UnsubscribeRepository,
    },
};

// ===== MockTransactionManager =====

#[derive(Clone, Default)]
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}

// ===== MockJobRepository =====

/// デッドレターに移動したジョブ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadJob {
    pub id:          JobId,
    pub queue:       String,
    pub payload:     String,
    pub retry_count: u32,
    pub reason:      String,
}

#[derive(Debug, Clone)]
struct StoredJob {
    id:          JobId,
    queue:       String,
    payload:     String,
    retry_count: u32,
    active_at:   DateTime<Utc>,
    created_at:  DateTime<Utc>,
    updated_at:  DateTime<Utc>,
    claim:       Option<(ClaimToken, DateTime<Utc>)>,
}

#[derive(Clone)]
pub struct MockJobRepository {
    jobs:         Arc<Mutex<Vec<StoredJob>>>,
    dead:         Arc<Mutex<Vec<DeadJob>>>,
    next_id:      Arc<AtomicI64>,
    fail_inserts: Arc<Mutex<Option<String>>>,
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs:         Arc::new(Mutex::new(Vec::new())),
            dead:         Arc::new(Mutex::new(Vec::new())),
            next_id:      Arc::new(AtomicI64::new(1)),
            fail_inserts: Arc::new(Mutex::new(None)),
        }
    }

    /// ペイロードに `needle` を含むジョブの挿入を失敗させる
    pub fn fail_insert_containing(&self, needle: impl Into<String>) {
        *self.fail_inserts.lock().unwrap() = Some(needle.into());
    }

    /// キューに残っているジョブ（予約中を含む）
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|stored| Self::to_job(stored, ClaimToken::new(), stored.updated_at))
            .collect()
    }

    /// ジョブの `(retry_count, active_at)`
    pub fn schedule_of(&self, id: JobId) -> Option<(u32, DateTime<Utc>)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|stored| stored.id == id)
            .map(|stored| (stored.retry_count, stored.active_at))
    }

    pub fn dead_jobs(&self) -> Vec<DeadJob> {
        self.dead.lock().unwrap().clone()
    }

    fn to_job(stored: &StoredJob, claim_token: ClaimToken, claimed_until: DateTime<Utc>) -> Job {
        Job {
            id: stored.id,
            queue: stored.queue.clone(),
            payload: stored.payload.clone(),
            retry_count: stored.retry_count,
            active_at: stored.active_at,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            claim_token,
            claimed_until,
        }
    }

    fn holds_claim(stored: &StoredJob, id: JobId, token: &ClaimToken) -> bool {
        stored.id == id && matches!(&stored.claim, Some((held, _)) if held == token)
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn insert(&self, tx: &mut TxContext, job: &NewJob) -> Result<JobId, InfraError> {
        if let Some(needle) = self.fail_inserts.lock().unwrap().as_deref()
            && job.payload.contains(needle)
        {
            return Err(InfraError::unexpected("ジョブの挿入に失敗（モック）"));
        }

        let id = JobId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let stored = StoredJob {
            id,
            queue: job.queue.clone(),
            payload: job.payload.clone(),
            retry_count: 0,
            active_at: job.active_at,
            created_at: job.active_at,
            updated_at: job.active_at,
            claim: None,
        };
        let jobs = self.jobs.clone();
        tx.stage(move || jobs.lock().unwrap().push(stored));
        Ok(id)
    }

    async fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        visibility: Duration,
    ) -> Result<Option<Job>, InfraError> {
        let lease = TimeDelta::from_std(visibility)
            .map_err(|e| InfraError::unexpected(e.to_string()))?;
        let mut jobs = self.jobs.lock().unwrap();
        let candidate = jobs
            .iter_mut()
            .filter(|stored| {
                stored.queue == queue
                    && stored.active_at <= now
                    && stored.claim.as_ref().is_none_or(|(_, until)| *until <= now)
            })
            .min_by_key(|stored| (stored.active_at, stored.id));

        Ok(candidate.map(|stored| {
            let token = ClaimToken::new();
            let until = now + lease;
            stored.claim = Some((token.clone(), until));
            stored.updated_at = now;
            Self::to_job(stored, token, until)
        }))
    }

    async fn delete(&self, id: JobId, token: &ClaimToken) -> Result<bool, InfraError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|stored| !Self::holds_claim(stored, id, token));
        Ok(jobs.len() < before)
    }

    async fn reschedule(
        &self,
        id: JobId,
        token: &ClaimToken,
        active_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs
            .iter_mut()
            .find(|stored| Self::holds_claim(stored, id, token))
        {
            Some(stored) => {
                stored.active_at = active_at;
                stored.retry_count += 1;
                stored.claim = None;
                stored.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bury(
        &self,
        id: JobId,
        token: &ClaimToken,
        reason: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(pos) = jobs
            .iter()
            .position(|stored| Self::holds_claim(stored, id, token))
        else {
            return Ok(false);
        };
        let stored = jobs.remove(pos);
        self.dead.lock().unwrap().push(DeadJob {
            id:          stored.id,
            queue:       stored.queue,
            payload:     stored.payload,
            retry_count: stored.retry_count,
            reason:      reason.to_string(),
        });
        Ok(true)
    }

    async fn count(&self, queue: &str) -> Result<i64, InfraError> {
        let count = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| stored.queue == queue)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

// ===== MockMessageRepository =====

#[derive(Clone, Default)]
pub struct MockMessageRepository {
    messages:     Arc<Mutex<Vec<Message>>>,
    fail_updates: Arc<Mutex<bool>>,
    /// `settle_status` で予約を照合するジョブストア（未設定なら照合しない）
    jobs:         Option<Arc<Mutex<Vec<StoredJob>>>>,
}

impl MockMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// `jobs` の予約を照合してステータスを書き込むモックを作る
    pub fn with_jobs(jobs: &MockJobRepository) -> Self {
        Self {
            jobs: Some(jobs.jobs.clone()),
            ..Self::default()
        }
    }

    pub fn add_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: &MessageId) -> Option<MessageStatus> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m.id == id)
            .map(|m| m.status)
    }

    /// 以降のステータス更新を失敗させる
    pub fn fail_status_updates(&self) {
        *self.fail_updates.lock().unwrap() = true;
    }
}

#[async_trait]
impl MessageRepository for MockMessageRepository {
    async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        let messages = self.messages.clone();
        let message = message.clone();
        tx.stage(move || messages.lock().unwrap().push(message));
        Ok(())
    }

    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        if *self.fail_updates.lock().unwrap() {
            return Err(InfraError::unexpected("ステータス更新に失敗（モック）"));
        }
        let mut messages = self.messages.lock().unwrap();
        match messages.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.status = status;
                message.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn settle_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
        lease: &Lease,
    ) -> Result<bool, InfraError> {
        if *self.fail_updates.lock().unwrap() {
            return Err(InfraError::unexpected("ステータス更新に失敗（モック）"));
        }
        if let Some(jobs) = &self.jobs
            && !jobs
                .lock()
                .unwrap()
                .iter()
                .any(|stored| MockJobRepository::holds_claim(stored, lease.job_id, &lease.token))
        {
            return Ok(false);
        }
        let mut messages = self.messages.lock().unwrap();
        match messages
            .iter_mut()
            .find(|m| &m.id == id && !m.status.is_terminal())
        {
            Some(message) => {
                message.status = status;
                message.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m.id == id)
            .cloned())
    }

    async fn count_by_status(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<MessageStatusCounts, InfraError> {
        let messages = self.messages.lock().unwrap();
        let mut counts: HashMap<MessageStatus, i64> = HashMap::new();
        for message in messages
            .iter()
            .filter(|m| m.campaign_id.as_ref() == Some(campaign_id))
        {
            *counts.entry(message.status).or_default() += 1;
        }
        Ok(MessageStatusCounts::from_pairs(counts))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| m.updated_at >= cutoff);
        Ok((before - messages.len()) as u64)
    }
}

// ===== MockCampaignRepository =====

#[derive(Clone, Default)]
pub struct MockCampaignRepository {
    campaigns: Arc<Mutex<Vec<Campaign>>>,
}

impl MockCampaignRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_campaign(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().push(campaign);
    }

    pub fn campaign(&self, id: &CampaignId) -> Option<Campaign> {
        self.campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }
}

#[async_trait]
impl CampaignRepository for MockCampaignRepository {
    async fn insert(&self, tx: &mut TxContext, campaign: &Campaign) -> Result<(), InfraError> {
        let campaigns = self.campaigns.clone();
        let campaign = campaign.clone();
        tx.stage(move || campaigns.lock().unwrap().push(campaign));
        Ok(())
    }

    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError> {
        Ok(self.campaign(id))
    }

    async fn list_sending(&self) -> Result<Vec<Campaign>, InfraError> {
        let mut sending: Vec<Campaign> = self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status == CampaignStatus::Sending)
            .cloned()
            .collect();
        sending.sort_by_key(|c| c.start_time);
        Ok(sending)
    }

    async fn mark_dispatched(
        &self,
        id: &CampaignId,
        at: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns
            .iter_mut()
            .find(|c| &c.id == id && c.dispatched_at.is_none())
        {
            Some(campaign) => {
                campaign.dispatched_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: &CampaignId,
        aggregate: &CampaignAggregate,
    ) -> Result<bool, InfraError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns
            .iter_mut()
            .find(|c| &c.id == id && c.status == CampaignStatus::Sending)
        {
            Some(campaign) => {
                campaign.status = CampaignStatus::Completed;
                campaign.sent_messages = aggregate.sent_messages;
                campaign.failed_messages = aggregate.failed_messages;
                campaign.total_messages = aggregate.total_messages;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ===== MockCampaignTypeRepository =====

#[derive(Clone, Default)]
pub struct MockCampaignTypeRepository {
    types: Arc<Mutex<Vec<CampaignType>>>,
}

impl MockCampaignTypeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&self, campaign_type: CampaignType) {
        self.types.lock().unwrap().push(campaign_type);
    }
}

#[async_trait]
impl CampaignTypeRepository for MockCampaignTypeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<CampaignType>, InfraError> {
        Ok(self
            .types
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }
}

// ===== MockUnsubscribeRepository =====

#[derive(Clone, Default)]
pub struct MockUnsubscribeRepository {
    global:   Arc<Mutex<HashSet<String>>>,
    per_type: Arc<Mutex<HashSet<Unsubscriber>>>,
}

impl MockUnsubscribeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsubscribe_globally(&self, user_guid: impl Into<String>) {
        self.global.lock().unwrap().insert(user_guid.into());
    }

    pub fn unsubscribe(&self, user_guid: impl Into<String>, campaign_type_id: impl Into<String>) {
        self.per_type.lock().unwrap().insert(Unsubscriber {
            user_guid:        user_guid.into(),
            campaign_type_id: campaign_type_id.into(),
        });
    }
}

#[async_trait]
impl UnsubscribeRepository for MockUnsubscribeRepository {
    async fn is_globally_unsubscribed(&self, user_guid: &str) -> Result<bool, InfraError> {
        Ok(self.global.lock().unwrap().contains(user_guid))
    }

    async fn find(
        &self,
        user_guid: &str,
        campaign_type_id: &str,
    ) -> Result<Option<Unsubscriber>, InfraError> {
        Ok(self
            .per_type
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.user_guid == user_guid && u.campaign_type_id == campaign_type_id)
            .cloned())
    }
}

// ===== MockReceiptRepository =====

#[derive(Clone, Default)]
pub struct MockReceiptRepository {
    receipts: Arc<Mutex<HashMap<ReceiptKey, u32>>>,
    fail:     Arc<Mutex<bool>>,
}

impl MockReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信記録の upsert 回数
    pub fn count(&self, key: &ReceiptKey) -> u32 {
        self.receipts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn fail_upserts(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ReceiptRepository for MockReceiptRepository {
    async fn upsert(&self, key: &ReceiptKey, _now: DateTime<Utc>) -> Result<(), InfraError> {
        if *self.fail.lock().unwrap() {
            return Err(InfraError::unexpected("受信記録の書き込みに失敗（モック）"));
        }
        *self
            .receipts
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default() += 1;
        Ok(())
    }
}

// ===== MockTemplateRepository =====

#[derive(Clone, Default)]
pub struct MockTemplateRepository {
    templates:   Arc<Mutex<HashMap<String, Templates>>>,
    assignments: Arc<Mutex<HashMap<(String, String), String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&self, id: impl Into<String>, templates: Templates) {
        self.templates.lock().unwrap().insert(id.into(), templates);
    }

    /// テンプレートを割り当てる（`kind_id` が `None` ならクライアント全体）
    pub fn assign(&self, client_id: &str, kind_id: Option<&str>, template_id: &str) {
        self.assignments.lock().unwrap().insert(
            (client_id.to_string(), kind_id.unwrap_or_default().to_string()),
            template_id.to_string(),
        );
    }

    /// 以降の読み取りを失敗させる
    pub fn make_unavailable(&self) {
        *self.unavailable.lock().unwrap() = true;
    }

    fn check_available(&self) -> Result<(), InfraError> {
        if *self.unavailable.lock().unwrap() {
            return Err(InfraError::unexpected("テンプレートの読み取りに失敗（モック）"));
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateRepository for MockTemplateRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Templates>, InfraError> {
        self.check_available()?;
        Ok(self.templates.lock().unwrap().get(id).cloned())
    }

    async fn find_assigned_id(
        &self,
        client_id: &str,
        kind_id: Option<&str>,
    ) -> Result<Option<String>, InfraError> {
        self.check_available()?;
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .get(&(client_id.to_string(), kind_id.unwrap_or_default().to_string()))
            .cloned())
    }
}

// ===== MockMailTransport =====

#[derive(Clone, Default)]
pub struct MockMailTransport {
    sent:          Arc<Mutex<Vec<MailMessage>>>,
    connect_error: Arc<Mutex<Option<MailError>>>,
    send_error:    Arc<Mutex<Option<MailError>>>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_connect(&self, error: MailError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    pub fn fail_send(&self, error: MailError) {
        *self.send_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn connect(&self) -> Result<(), MailError> {
        match self.connect_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if let Some(error) = self.send_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ===== MockIdentityProvider =====

#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    emails:      Arc<Mutex<UserEmails>>,
    token_error: Arc<Mutex<Option<IdentityError>>>,
    user_error:  Arc<Mutex<Option<IdentityError>>>,
    token_hosts: Arc<Mutex<Vec<String>>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, guid: impl Into<String>, emails: Vec<String>) {
        self.emails.lock().unwrap().insert(guid.into(), emails);
    }

    pub fn fail_token(&self, error: IdentityError) {
        *self.token_error.lock().unwrap() = Some(error);
    }

    pub fn fail_lookup(&self, error: IdentityError) {
        *self.user_error.lock().unwrap() = Some(error);
    }

    /// アクセストークンを要求されたホスト
    pub fn token_hosts(&self) -> Vec<String> {
        self.token_hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn access_token(&self, uaa_host: &str) -> Result<AccessToken, IdentityError> {
        self.token_hosts.lock().unwrap().push(uaa_host.to_string());
        if let Some(error) = self.token_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(AccessToken {
            host:  uaa_host.to_string(),
            value: "mock-token".to_string(),
        })
    }

    async fn user_emails(
        &self,
        _token: &AccessToken,
        guids: &[String],
    ) -> Result<UserEmails, IdentityError> {
        if let Some(error) = self.user_error.lock().unwrap().clone() {
            return Err(error);
        }
        let emails = self.emails.lock().unwrap();
        Ok(guids
            .iter()
            .filter_map(|guid| emails.get(guid).map(|e| (guid.clone(), e.clone())))
            .collect())
    }

    async fn all_user_guids(&self, _token: &AccessToken) -> Result<Vec<String>, IdentityError> {
        let mut guids: Vec<String> = self.emails.lock().unwrap().keys().cloned().collect();
        guids.sort();
        Ok(guids)
    }
}

// ===== MockDirectoryClient =====

#[derive(Clone, Default)]
pub struct MockDirectoryClient {
    spaces: Arc<Mutex<HashMap<String, Vec<String>>>>,
    orgs:   Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl MockDirectoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_space(&self, space_guid: impl Into<String>, users: Vec<String>) {
        self.spaces.lock().unwrap().insert(space_guid.into(), users);
    }

    pub fn add_org(&self, org_guid: impl Into<String>, users: Vec<String>) {
        self.orgs.lock().unwrap().insert(org_guid.into(), users);
    }
}

#[async_trait]
impl DirectoryClient for MockDirectoryClient {
    async fn space_user_guids(
        &self,
        _token: &AccessToken,
        space_guid: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.spaces
            .lock()
            .unwrap()
            .get(space_guid)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(space_guid.to_string()))
    }

    async fn org_user_guids(
        &self,
        _token: &AccessToken,
        org_guid: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.orgs
            .lock()
            .unwrap()
            .get(org_guid)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(org_guid.to_string()))
    }
}
