// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{DailyLimitRule, LimitRule, RuleContext, SessionLimitRule};

fn ctx(session_secs: u64, daily_secs: u64, reliable: bool) -> RuleContext {
    RuleContext {
        session_duration: Duration::from_secs(session_secs),
        daily_usage_today: Duration::from_secs(daily_secs),
        clock_reliable: reliable,
    }
}

#[test]
fn zero_session_limit_means_disabled_not_instant_breach() {
    let rule = SessionLimitRule { limit: Duration::ZERO };
    let outcome = rule.evaluate(&ctx(100_000, 0, true));
    assert!(outcome.allowed);
    assert_eq!(outcome.remaining, None);
}

#[yare::parameterized(
    under = { 3599, true, Some(1) },
    exactly_at = { 3600, true, Some(0) },
    over = { 3601, false, Some(0) },
)]
fn session_limit_boundaries(elapsed: u64, allowed: bool, remaining_secs: Option<u64>) {
    let rule = SessionLimitRule { limit: Duration::from_secs(3600) };
    let outcome = rule.evaluate(&ctx(elapsed, 0, true));
    assert_eq!(outcome.allowed, allowed);
    assert_eq!(outcome.remaining, remaining_secs.map(Duration::from_secs));
    if !allowed {
        assert_eq!(outcome.reason, "session");
    }
}

#[test]
fn daily_limit_disabled_when_zero() {
    let rule = DailyLimitRule { limit: Duration::ZERO };
    assert!(rule.evaluate(&ctx(0, 100_000, true)).allowed);
}

#[test]
fn daily_limit_bypassed_on_unreliable_clock() {
    let rule = DailyLimitRule { limit: Duration::from_secs(7200) };
    let outcome = rule.evaluate(&ctx(0, 100_000, false));
    assert!(outcome.allowed);
    assert_eq!(outcome.remaining, None);
}

#[test]
fn daily_limit_breaches_with_reason() {
    let rule = DailyLimitRule { limit: Duration::from_secs(7200) };
    let outcome = rule.evaluate(&ctx(0, 7201, true));
    assert!(!outcome.allowed);
    assert_eq!(outcome.reason, "daily");
}

#[test]
fn daily_limit_reports_remaining() {
    let rule = DailyLimitRule { limit: Duration::from_secs(7200) };
    let outcome = rule.evaluate(&ctx(0, 3600, true));
    assert_eq!(outcome.remaining, Some(Duration::from_secs(3600)));
}
