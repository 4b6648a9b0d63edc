use super::*;

#[test]
fn plain_streak_is_one_byte_run() {
    let streaks = get_hex_streaks(b"DEADBEEF").unwrap();
    assert_eq!(streaks, BTreeSet::from([vec![0xDE, 0xAD, 0xBE, 0xEF]]));
}

#[test]
fn wildcard_splits_into_two_streaks() {
    let streaks = get_hex_streaks(b"DEAD ?? BEEF").unwrap();
    assert_eq!(
        streaks,
        BTreeSet::from([vec![0xDE, 0xAD], vec![0xBE, 0xEF]])
    );
}

#[test]
fn alternation_in_parens_is_excluded() {
    let streaks = get_hex_streaks(b"AABB (CCDD | EEFF) 1122").unwrap();
    assert_eq!(
        streaks,
        BTreeSet::from([vec![0xAA, 0xBB], vec![0x11, 0x22]])
    );
}

#[test]
fn jump_bracket_is_excluded() {
    let streaks = get_hex_streaks(b"AABB [4-6] CCDD").unwrap();
    assert_eq!(
        streaks,
        BTreeSet::from([vec![0xAA, 0xBB], vec![0xCC, 0xDD]])
    );
}

#[test]
fn newlines_are_treated_as_whitespace() {
    let streaks = get_hex_streaks(b"AA\nBB\nCC").unwrap();
    assert_eq!(streaks, BTreeSet::from([vec![0xAA, 0xBB, 0xCC]]));
}

#[test]
fn unrecognized_byte_is_unsupported_condition() {
    let err = get_hex_streaks(b"AABB!CCDD").unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedCondition(_)));
}

#[test]
fn lowercase_hex_is_accepted() {
    let streaks = get_hex_streaks(b"deadbeef").unwrap();
    assert_eq!(streaks, BTreeSet::from([vec![0xDE, 0xAD, 0xBE, 0xEF]]));
}
