//! 验证码校验
//!
//! 手机号 + 验证码 → 账户 + 令牌对

use std::sync::Arc;

use chrono::Utc;
use crm_auth_core::TokenPair;
use tracing::{debug, info, warn};

use crate::domain::entities::Account;
use crate::domain::repositories::{AccountRepository, ChallengeRepository};
use crate::domain::services::{BypassPolicy, CodeHasher, TokenIssuer};
use crate::domain::value_objects::{OtpCode, PhoneNumber};
use crate::error::{AuthError, AuthResult};

/// 校验成功的身份
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub account: Account,
    pub tokens: TokenPair,
    /// 本次校验创建了新账户
    pub is_new_account: bool,
}

pub struct CredentialVerifier {
    challenges: Arc<dyn ChallengeRepository>,
    accounts: Arc<dyn AccountRepository>,
    hasher: CodeHasher,
    bypass: Arc<dyn BypassPolicy>,
    token_issuer: Arc<TokenIssuer>,
    max_attempts: u32,
}

impl CredentialVerifier {
    pub fn new(
        challenges: Arc<dyn ChallengeRepository>,
        accounts: Arc<dyn AccountRepository>,
        hasher: CodeHasher,
        bypass: Arc<dyn BypassPolicy>,
        token_issuer: Arc<TokenIssuer>,
        max_attempts: u32,
    ) -> Self {
        Self {
            challenges,
            accounts,
            hasher,
            bypass,
            token_issuer,
            max_attempts,
        }
    }

    /// 校验验证码
    ///
    /// 失败次数上限与验证码是否正确无关；锁定后挑战不会被删除，需重新请求
    pub async fn verify(&self, raw_phone: &str, submitted: &str) -> AuthResult<VerifiedIdentity> {
        let phone = PhoneNumber::parse(raw_phone)?;
        let code = OtpCode::from_submitted(submitted);

        if self.bypass.accepts(&code) {
            warn!(phone = %phone.masked(), "Bypass code accepted");
            return self.complete(&phone).await;
        }

        // 1. 读取挑战
        let challenge = self
            .challenges
            .find(&phone)
            .await?
            .ok_or(AuthError::NoChallenge)?;

        if challenge.is_expired_at(Utc::now()) {
            debug!(phone = %phone.masked(), "Challenge expired");
            return Err(AuthError::ChallengeExpired);
        }

        // 2. 次数检查（原子递增）
        if challenge.is_locked(self.max_attempts) {
            warn!(phone = %phone.masked(), attempts = challenge.attempts, "Challenge locked");
            return Err(AuthError::TooManyAttempts);
        }
        // 之后只使用递增返回的记录：期间可能已被重新请求的挑战替换
        let current = self
            .challenges
            .increment_attempts(&phone)
            .await?
            .ok_or(AuthError::NoChallenge)?;
        if current.is_expired_at(Utc::now()) {
            debug!(phone = %phone.masked(), "Challenge expired");
            return Err(AuthError::ChallengeExpired);
        }
        let attempts = current.attempts;
        if attempts > self.max_attempts {
            warn!(phone = %phone.masked(), attempts, "Challenge locked");
            return Err(AuthError::TooManyAttempts);
        }

        // 3. 比较哈希
        if !self.hasher.verify(&code, &current.code_hash).await? {
            warn!(
                phone = %phone.masked(),
                attempts,
                max_attempts = self.max_attempts,
                "Invalid OTP code"
            );
            return Err(AuthError::InvalidCode);
        }

        self.complete(&phone).await
    }

    /// 查找或创建账户、删除挑战、签发令牌
    async fn complete(&self, phone: &PhoneNumber) -> AuthResult<VerifiedIdentity> {
        let (account, is_new_account) = match self.accounts.find_by_phone(phone).await? {
            Some(account) => (account, false),
            None => {
                let account = self.accounts.create(phone).await?;
                info!(account_id = %account.id, phone = %phone.masked(), role = %account.role, "Account registered");
                (account, true)
            }
        };

        if !account.is_active {
            warn!(account_id = %account.id, "Inactive account attempted login");
            return Err(AuthError::AccountInactive);
        }

        self.challenges.delete(phone).await?;
        let tokens = self.token_issuer.issue(&account)?;

        info!(account_id = %account.id, phone = %phone.masked(), "Phone verified, session issued");
        Ok(VerifiedIdentity {
            account,
            tokens,
            is_new_account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::{FixedCodeBypass, NoBypass};
    use crate::infrastructure::persistence::{InMemoryAccountRepository, InMemoryChallengeRepository};
    use chrono::Duration;
    use crm_auth_core::{Role, TokenService};
    use crm_config::CodeHashConfig;

    struct Fixture {
        verifier: CredentialVerifier,
        challenges: Arc<InMemoryChallengeRepository>,
        accounts: Arc<InMemoryAccountRepository>,
        hasher: CodeHasher,
        phone: PhoneNumber,
    }

    fn test_hasher() -> CodeHasher {
        CodeHasher::new(&CodeHashConfig {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    fn build_verifier(
        challenges: Arc<dyn ChallengeRepository>,
        accounts: Arc<InMemoryAccountRepository>,
        hasher: CodeHasher,
        bypass: Arc<dyn BypassPolicy>,
    ) -> CredentialVerifier {
        let token_service = Arc::new(TokenService::new(
            "test-secret-key-at-least-32-chars-long",
            900,
            3600,
            "crm-iam",
            "crm-api",
        ));
        let issuer = Arc::new(TokenIssuer::new(token_service, accounts.clone()));
        CredentialVerifier::new(challenges, accounts, hasher, bypass, issuer, 5)
    }

    fn fixture(bypass: Arc<dyn BypassPolicy>) -> Fixture {
        let challenges = Arc::new(InMemoryChallengeRepository::new());
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let hasher = test_hasher();
        let verifier = build_verifier(challenges.clone(), accounts.clone(), hasher.clone(), bypass);
        Fixture {
            verifier,
            challenges,
            accounts,
            hasher,
            phone: PhoneNumber::parse("09120000001").unwrap(),
        }
    }

    async fn seed(f: &Fixture, code: &str, expires_in: i64) {
        let hash = f.hasher.hash(&OtpCode::fixed(code)).await.unwrap();
        f.challenges
            .upsert(&f.phone, &hash, Utc::now() + Duration::seconds(expires_in))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_correct_code_creates_account_and_consumes_challenge() {
        let f = fixture(Arc::new(NoBypass));
        seed(&f, "4821", 300).await;

        let identity = f.verifier.verify("09120000001", "4821").await.unwrap();
        assert!(identity.is_new_account);
        assert_eq!(identity.account.role, Role::Marketer);
        assert!(f.challenges.find(&f.phone).await.unwrap().is_none());

        // 挑战已消费，不能重放
        assert!(matches!(
            f.verifier.verify("09120000001", "4821").await,
            Err(AuthError::NoChallenge)
        ));
    }

    #[tokio::test]
    async fn test_existing_account_is_reused() {
        let f = fixture(Arc::new(NoBypass));
        let existing = f.accounts.create(&f.phone).await.unwrap();
        seed(&f, "4821", 300).await;

        let identity = f.verifier.verify("+989120000001", "4821").await.unwrap();
        assert!(!identity.is_new_account);
        assert_eq!(identity.account.id, existing.id);
    }

    #[tokio::test]
    async fn test_no_challenge() {
        let f = fixture(Arc::new(NoBypass));
        assert!(matches!(
            f.verifier.verify("09120000001", "1234").await,
            Err(AuthError::NoChallenge)
        ));
    }

    #[tokio::test]
    async fn test_expired_challenge_rejects_correct_code() {
        let f = fixture(Arc::new(NoBypass));
        seed(&f, "4821", -1).await;

        assert!(matches!(
            f.verifier.verify("09120000001", "4821").await,
            Err(AuthError::ChallengeExpired)
        ));
        // 不计次数，记录保留
        let challenge = f.challenges.find(&f.phone).await.unwrap().unwrap();
        assert_eq!(challenge.attempts, 0);
    }

    #[tokio::test]
    async fn test_lockout_after_max_attempts_even_with_correct_code() {
        let f = fixture(Arc::new(NoBypass));
        seed(&f, "4821", 300).await;

        for _ in 0..5 {
            assert!(matches!(
                f.verifier.verify("09120000001", "0000").await,
                Err(AuthError::InvalidCode)
            ));
        }
        assert!(matches!(
            f.verifier.verify("09120000001", "4821").await,
            Err(AuthError::TooManyAttempts)
        ));
        // 锁定不删除挑战
        assert!(f.challenges.find(&f.phone).await.unwrap().is_some());
        assert!(f.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_attempts_never_exceed_limit() {
        let f = Arc::new(fixture(Arc::new(NoBypass)));
        seed(&f, "4821", 300).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.verifier.verify("09120000001", "9999").await
            }));
        }

        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Err(AuthError::InvalidCode) => invalid += 1,
                Err(AuthError::TooManyAttempts) => {}
                other => panic!("unexpected result: {:?}", other.map(|i| i.account.id)),
            }
        }
        assert_eq!(invalid, 5);
    }

    /// 在第一次递增前替换挑战，模拟校验过程中并发的重新请求
    struct ReplacedDuringVerify {
        inner: Arc<InMemoryChallengeRepository>,
        replacement: parking_lot::Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl ChallengeRepository for ReplacedDuringVerify {
        async fn upsert(
            &self,
            phone: &PhoneNumber,
            code_hash: &str,
            expires_at: chrono::DateTime<Utc>,
        ) -> crm_errors::AppResult<crate::domain::entities::OtpChallenge> {
            self.inner.upsert(phone, code_hash, expires_at).await
        }

        async fn find(
            &self,
            phone: &PhoneNumber,
        ) -> crm_errors::AppResult<Option<crate::domain::entities::OtpChallenge>> {
            self.inner.find(phone).await
        }

        async fn increment_attempts(
            &self,
            phone: &PhoneNumber,
        ) -> crm_errors::AppResult<Option<crate::domain::entities::OtpChallenge>> {
            let replacement = self.replacement.lock().take();
            if let Some(hash) = replacement {
                self.inner
                    .upsert(phone, &hash, Utc::now() + Duration::seconds(300))
                    .await?;
            }
            self.inner.increment_attempts(phone).await
        }

        async fn delete(&self, phone: &PhoneNumber) -> crm_errors::AppResult<()> {
            self.inner.delete(phone).await
        }

        async fn delete_expired(&self, before: chrono::DateTime<Utc>) -> crm_errors::AppResult<u64> {
            self.inner.delete_expired(before).await
        }
    }

    #[tokio::test]
    async fn test_replaced_code_is_rejected_mid_verification() {
        let inner = Arc::new(InMemoryChallengeRepository::new());
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let hasher = test_hasher();
        let phone = PhoneNumber::parse("09120000001").unwrap();

        let old_hash = hasher.hash(&OtpCode::fixed("1111")).await.unwrap();
        inner
            .upsert(&phone, &old_hash, Utc::now() + Duration::seconds(300))
            .await
            .unwrap();
        let new_hash = hasher.hash(&OtpCode::fixed("2222")).await.unwrap();

        let repo = Arc::new(ReplacedDuringVerify {
            inner: inner.clone(),
            replacement: parking_lot::Mutex::new(Some(new_hash.clone())),
        });
        let verifier = build_verifier(repo, accounts.clone(), hasher, Arc::new(NoBypass));

        assert!(matches!(
            verifier.verify("09120000001", "1111").await,
            Err(AuthError::InvalidCode)
        ));
        // 新挑战保留，且计入了这次失败
        let live = inner.find(&phone).await.unwrap().unwrap();
        assert_eq!(live.code_hash, new_hash);
        assert_eq!(live.attempts, 1);
        assert!(accounts.is_empty());

        verifier.verify("09120000001", "2222").await.unwrap();
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_bypass_code_without_challenge() {
        let f = fixture(Arc::new(FixedCodeBypass::new("0000")));

        let identity = f.verifier.verify("09120000002", "0000").await.unwrap();
        assert!(identity.is_new_account);
        assert_eq!(f.accounts.len(), 1);

        // 再次使用不会创建第二个账户
        let again = f.verifier.verify("09120000002", "0000").await.unwrap();
        assert_eq!(again.account.id, identity.account.id);
        assert_eq!(f.accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_bypass_deletes_live_challenge() {
        let f = fixture(Arc::new(FixedCodeBypass::new("0000")));
        seed(&f, "4821", 300).await;

        f.verifier.verify("09120000001", "0000").await.unwrap();
        assert!(f.challenges.find(&f.phone).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_log_in() {
        let f = fixture(Arc::new(NoBypass));
        let account = f.accounts.create(&f.phone).await.unwrap();
        f.accounts.set_active(&account.id, false).await.unwrap();
        seed(&f, "4821", 300).await;

        assert!(matches!(
            f.verifier.verify("09120000001", "4821").await,
            Err(AuthError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn test_invalid_phone() {
        let f = fixture(Arc::new(NoBypass));
        assert!(matches!(
            f.verifier.verify("0912", "4821").await,
            Err(AuthError::InvalidPhone)
        ));
    }
}
