// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Preprocessor, ScanOutcome};
use crate::reader::Scan;
use crate::test_support::test_wall;
use crate::token::Token;

fn token(uid: &str, text: &str) -> Token {
    Token::from_reader("r1", uid, text, test_wall())
}

#[test]
fn first_token_is_new_and_remembered() {
    let mut pre = Preprocessor::new();
    let t = token("04a1", "/roms/g.rom");
    let outcome = pre.process(&Scan::token("r1", t.clone()));
    assert!(matches!(outcome, ScanOutcome::NewToken(ref n) if n.same_token(&t)));
    assert!(pre.prev_token().is_some_and(|p| p.same_token(&t)));
}

#[test]
fn repeated_token_is_duplicate() {
    let mut pre = Preprocessor::new();
    let t = token("04a1", "/roms/g.rom");
    pre.process(&Scan::token("r1", t.clone()));
    assert_eq!(pre.process(&Scan::token("r1", t)), ScanOutcome::SkipDuplicate);
}

#[test]
fn different_text_same_uid_is_new() {
    let mut pre = Preprocessor::new();
    pre.process(&Scan::token("r1", token("04a1", "/roms/a.rom")));
    let outcome = pre.process(&Scan::token("r1", token("04a1", "/roms/b.rom")));
    assert!(matches!(outcome, ScanOutcome::NewToken(_)));
}

#[test]
fn normal_removal_clears_memory() {
    let mut pre = Preprocessor::new();
    let t = token("04a1", "/roms/g.rom");
    pre.process(&Scan::token("r1", t.clone()));

    assert_eq!(pre.process(&Scan::removal("r1")), ScanOutcome::NormalRemoval);
    assert!(pre.prev_token().is_none());

    // Rescan after removal relaunches.
    let outcome = pre.process(&Scan::token("r1", t));
    assert!(matches!(outcome, ScanOutcome::NewToken(_)));
}

#[test]
fn reader_error_removal_keeps_memory() {
    let mut pre = Preprocessor::new();
    let t = token("tag-1", "**launch:/roms/g.rom");
    pre.process(&Scan::token("r1", t.clone()));

    assert_eq!(pre.process(&Scan::driver_error("r1")), ScanOutcome::ReaderErrorRemoval);
    assert!(pre.prev_token().is_some());

    // Replug re-scanning the same tag is a duplicate, not a relaunch.
    assert_eq!(pre.process(&Scan::token("r1", t)), ScanOutcome::SkipDuplicate);
}

#[test]
fn reader_error_with_nothing_remembered_is_duplicate() {
    let mut pre = Preprocessor::new();
    assert_eq!(pre.process(&Scan::driver_error("r1")), ScanOutcome::SkipDuplicate);
    assert!(pre.prev_token().is_none());
}

#[test]
fn removal_with_nothing_remembered_is_duplicate() {
    let mut pre = Preprocessor::new();
    assert_eq!(pre.process(&Scan::removal("r1")), ScanOutcome::SkipDuplicate);
}
