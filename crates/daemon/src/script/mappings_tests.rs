// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{from_config, normalize_uid, resolve, Mapping, MappingKind, MatchKind};
use crate::config::ConfigMapping;
use crate::test_support::{test_wall, MockPlatform};
use crate::token::Token;

fn token(uid: &str, text: &str) -> Token {
    Token::from_reader("r1", uid, text, test_wall())
}

fn mapping(kind: MappingKind, match_kind: MatchKind, pattern: &str, script: &str) -> Mapping {
    Mapping {
        kind,
        match_kind,
        pattern: pattern.into(),
        override_script: script.into(),
        enabled: true,
    }
}

#[yare::parameterized(
    plain = { "04a1b2", "04a1b2" },
    colons = { "04:A1:B2", "04a1b2" },
    dashes_spaces = { "04-A1 B2", "04a1b2" },
)]
fn uid_normalization(input: &str, expected: &str) {
    assert_eq!(normalize_uid(input), expected);
}

#[yare::parameterized(
    id_exact_normalized = { MappingKind::Id, MatchKind::Exact, "04:A1:B2", "04a1b2", true },
    id_exact_miss = { MappingKind::Id, MatchKind::Exact, "04a1b2", "ffffff", false },
    id_partial = { MappingKind::Id, MatchKind::Partial, "a1b", "04a1b2", true },
    id_regex = { MappingKind::Id, MatchKind::Regex, "^04[0-9a-f]+$", "04a1b2", true },
)]
fn id_matching(kind: MappingKind, match_kind: MatchKind, pattern: &str, uid: &str, hit: bool) {
    let m = mapping(kind, match_kind, pattern, "**launch:/alt");
    assert_eq!(m.matches(&token(uid, "whatever")), hit);
}

#[test]
fn value_matches_against_text() {
    let m = mapping(MappingKind::Value, MatchKind::Partial, "g.rom", "**launch:/alt");
    assert!(m.matches(&token("04a1", "**launch:/roms/g.rom")));
    assert!(!m.matches(&token("04a1", "**launch:/roms/other.bin")));
}

#[test]
fn data_matches_against_payload() {
    let m = mapping(MappingKind::Data, MatchKind::Exact, "deadbeef", "**launch:/alt");
    let mut t = token("04a1", "text");
    assert!(!m.matches(&t));
    t.data = "deadbeef".into();
    assert!(m.matches(&t));
}

#[test]
fn invalid_regex_never_matches() {
    let m = mapping(MappingKind::Value, MatchKind::Regex, "(unclosed", "**launch:/alt");
    assert!(!m.matches(&token("04a1", "(unclosed")));
}

#[test]
fn empty_candidate_never_matches() {
    // A token with no data must not match an empty-pattern data mapping.
    let m = mapping(MappingKind::Data, MatchKind::Partial, "", "**launch:/alt");
    assert!(!m.matches(&token("04a1", "text")));
}

#[yare::parameterized(
    regex_sugar = { "/^04/", MatchKind::Regex, "^04" },
    partial_sugar = { "*game*", MatchKind::Partial, "game" },
    exact_plain = { "04a1b2", MatchKind::Exact, "04a1b2" },
)]
fn config_pattern_sugar(raw: &str, match_kind: MatchKind, pattern: &str) {
    let c = ConfigMapping {
        kind: "id".into(),
        pattern: raw.into(),
        override_script: "s".into(),
    };
    let m = from_config(&c);
    assert!(m.as_ref().is_some_and(|m| m.match_kind == match_kind && m.pattern == pattern));
}

#[test]
fn unknown_config_kind_skipped() {
    let c = ConfigMapping {
        kind: "serial".into(),
        pattern: "x".into(),
        override_script: "s".into(),
    };
    assert!(from_config(&c).is_none());
}

#[test]
fn resolve_order_db_then_config_then_platform() {
    let platform = MockPlatform::new();
    platform.add_default_mapping("04a1b2", "**launch:/platform");

    let db = vec![mapping(MappingKind::Id, MatchKind::Exact, "04a1b2", "**launch:/db")];
    let config = vec![ConfigMapping {
        kind: "id".into(),
        pattern: "04a1b2".into(),
        override_script: "**launch:/config".into(),
    }];
    let t = token("04a1b2", "original");

    assert_eq!(
        resolve(&t, &db, &config, platform.as_ref()),
        Some("**launch:/db".to_owned())
    );
    assert_eq!(
        resolve(&t, &[], &config, platform.as_ref()),
        Some("**launch:/config".to_owned())
    );
    assert_eq!(
        resolve(&t, &[], &[], platform.as_ref()),
        Some("**launch:/platform".to_owned())
    );

    let other = token("ffffff", "original");
    assert_eq!(resolve(&other, &db, &config, platform.as_ref()), None);
}

#[test]
fn disabled_db_mapping_skipped() {
    let mut m = mapping(MappingKind::Id, MatchKind::Exact, "04a1b2", "**launch:/db");
    m.enabled = false;
    let platform = MockPlatform::new();
    assert_eq!(resolve(&token("04a1b2", "t"), &[m], &[], platform.as_ref()), None);
}
