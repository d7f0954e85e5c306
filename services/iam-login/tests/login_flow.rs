//! 登录流程集成测试（命令处理器层）

mod common;

use common::{WITH_BYPASS, WITH_SMS, harness};
use crm_auth_core::Role;
use crm_cqrs_core::CommandHandler;
use iam_login::AuthError;
use iam_login::application::commands::{RefreshTokenCommand, RequestOtpCommand, VerifyOtpCommand};
use iam_login::domain::repositories::{AccountRepository, ChallengeRepository};
use iam_login::domain::services::Requirement;
use iam_login::domain::value_objects::PhoneNumber;

const PHONE: &str = "09120000001";

fn request(phone: &str) -> RequestOtpCommand {
    RequestOtpCommand {
        phone: phone.to_string(),
    }
}

fn verify(phone: &str, code: &str) -> VerifyOtpCommand {
    VerifyOtpCommand {
        phone: phone.to_string(),
        code: code.to_string(),
    }
}

#[tokio::test]
async fn test_sms_login_then_refresh() {
    let h = harness(&[WITH_SMS]);
    let sms = h.sms.clone().unwrap();

    let issued = h.state.request_otp.handle(request(PHONE)).await.unwrap();
    assert!(issued.sent);
    assert!(issued.debug_code.is_none());
    assert!(issued.expires_in > 290 && issued.expires_in <= 300);

    let code = sms.last_code().unwrap();
    let identity = h.state.verify_otp.handle(verify(PHONE, &code)).await.unwrap();
    assert!(identity.is_new_account);
    assert_eq!(identity.account.role, Role::Marketer);

    let refreshed = h
        .state
        .refresh_token
        .handle(RefreshTokenCommand {
            refresh_token: identity.tokens.refresh_token.clone(),
        })
        .await
        .unwrap();
    assert_eq!(refreshed.account.id, identity.account.id);
    assert_eq!(refreshed.tokens.expires_in, 900);
}

#[tokio::test]
async fn test_second_request_replaces_challenge() {
    let h = harness(&[WITH_SMS]);
    let sms = h.sms.clone().unwrap();
    let phone = PhoneNumber::parse(PHONE).unwrap();

    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    let first_hash = h.challenges.find(&phone).await.unwrap().unwrap().code_hash;
    h.state.request_otp.handle(request("+989120000001")).await.unwrap();

    assert_eq!(h.challenges.len(), 1);
    let challenge = h.challenges.find(&phone).await.unwrap().unwrap();
    assert_ne!(challenge.code_hash, first_hash);
    assert_eq!(challenge.attempts, 0);

    // 只有最新验证码有效
    let latest = sms.last_code().unwrap();
    h.state.verify_otp.handle(verify(PHONE, &latest)).await.unwrap();
}

#[tokio::test]
async fn test_five_wrong_codes_then_lockout() {
    let h = harness(&[]);
    let phone = PhoneNumber::parse(PHONE).unwrap();

    let issued = h.state.request_otp.handle(request(PHONE)).await.unwrap();
    assert_eq!(issued.debug_code.as_deref(), Some("0000"));
    assert_eq!(h.challenges.find(&phone).await.unwrap().unwrap().attempts, 0);

    for attempt in 1..=5 {
        let result = h.state.verify_otp.handle(verify(PHONE, "1111")).await;
        assert!(matches!(result, Err(AuthError::InvalidCode)), "attempt {attempt}");
    }

    let sixth = h.state.verify_otp.handle(verify(PHONE, "0000")).await;
    assert!(matches!(sixth, Err(AuthError::TooManyAttempts)));
    assert!(h.accounts.is_empty());

    // 重新请求后恢复
    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    h.state.verify_otp.handle(verify(PHONE, "0000")).await.unwrap();
}

#[tokio::test]
async fn test_unknown_phone_looks_like_known_phone() {
    let h = harness(&[]);
    let known = "09120000001";
    let unknown = "09120000002";
    h.accounts
        .create(&PhoneNumber::parse(known).unwrap())
        .await
        .unwrap();

    for phone in [known, unknown] {
        let result = h.state.verify_otp.handle(verify(phone, "1234")).await;
        assert!(matches!(result, Err(AuthError::NoChallenge)), "{phone}");
    }
}

#[tokio::test]
async fn test_bypass_creates_exactly_one_account() {
    let h = harness(&[WITH_BYPASS, WITH_SMS]);

    let first = h
        .state
        .verify_otp
        .handle(verify("09351234567", "0000"))
        .await
        .unwrap();
    assert!(first.is_new_account);
    assert_eq!(first.account.role, Role::Marketer);

    let second = h
        .state
        .verify_otp
        .handle(verify("+989351234567", "0000"))
        .await
        .unwrap();
    assert!(!second.is_new_account);
    assert_eq!(second.account.id, first.account.id);
    assert_eq!(h.accounts.len(), 1);
}

#[tokio::test]
async fn test_bypass_is_independent_of_test_mode() {
    let h = harness(&[WITH_BYPASS, "[otp]\ntest_mode = false\n"]);
    assert!(!h.config.otp.test_mode);

    let identity = h
        .state
        .verify_otp
        .handle(verify(PHONE, "0000"))
        .await
        .unwrap();
    assert_eq!(identity.account.phone.as_str(), PHONE);
}

#[tokio::test]
async fn test_no_provider_and_no_test_mode_cannot_deliver() {
    let h = harness(&["[otp]\ntest_mode = false\n"]);
    let result = h.state.request_otp.handle(request(PHONE)).await;
    assert!(matches!(result, Err(AuthError::DeliveryFailed)));
    assert!(h.challenges.is_empty());
}

#[tokio::test]
async fn test_request_throttle() {
    let h = harness(&["[otp]\nmax_requests_per_window = 2\n"]);

    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    let third = h.state.request_otp.handle(request(PHONE)).await;
    assert!(matches!(third, Err(AuthError::TooManyRequests)));

    // 其他手机号不受影响
    h.state.request_otp.handle(request("09120000002")).await.unwrap();
}

#[tokio::test]
async fn test_refresh_after_deactivation() {
    let h = harness(&[]);
    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    let identity = h.state.verify_otp.handle(verify(PHONE, "0000")).await.unwrap();

    h.accounts
        .set_active(&identity.account.id, false)
        .await
        .unwrap();
    let result = h
        .state
        .refresh_token
        .handle(RefreshTokenCommand {
            refresh_token: identity.tokens.refresh_token,
        })
        .await;
    assert!(matches!(result, Err(AuthError::AccountInactive)));
}

#[tokio::test]
async fn test_marketer_against_finance_guard_is_forbidden() {
    let h = harness(&[]);
    h.state.request_otp.handle(request(PHONE)).await.unwrap();
    let identity = h.state.verify_otp.handle(verify(PHONE, "0000")).await.unwrap();

    let header = format!("Bearer {}", identity.tokens.access_token);
    let claims = h.state.gate.authenticate_bearer(Some(&header)).unwrap();
    let result = h
        .state
        .gate
        .authorize(&claims, &Requirement::role(Role::FinanceManager))
        .await;
    assert!(matches!(result, Err(AuthError::Forbidden)));
}

#[tokio::test]
async fn test_rbac_overrides_from_config() {
    let h = harness(&["[rbac.roles]\nmarketer = [\"customers:read\", \"reports:read\"]\n"]);
    assert!(h.state.gate.table().has_permission(Role::Marketer, "reports:read"));
    assert!(!h.state.gate.table().has_permission(Role::Marketer, "visits:write"));
    // 未覆盖的角色保持内置权限
    assert!(h.state.gate.table().has_permission(Role::TopAdmin, "accounts:manage"));
}
