use super::*;

#[test]
fn ngram4_roundtrips_bytes() {
    let g = Ngram4::from_bytes(*b"pwnd");
    assert_eq!(g.to_bytes(), *b"pwnd");
    assert_eq!(g.prefix(), *b"pwn");
    assert_eq!(g.last_byte(), b'd');
}

#[test]
fn ngrams4_of_sliding_window() {
    let grams = ngrams4_of(b"abcde");
    let bytes: Vec<[u8; 4]> = grams.iter().map(|g| g.to_bytes()).collect();
    assert_eq!(bytes, vec![*b"abcd", *b"bcde"]);
}

#[test]
fn ngrams4_of_short_input_is_empty() {
    assert!(ngrams4_of(b"abc").is_empty());
    assert!(ngrams4_of(b"").is_empty());
}

#[test]
fn ngrams4_of_dedups() {
    let grams = ngrams4_of(b"aaaaa");
    assert_eq!(grams.len(), 1);
}

#[test]
fn ngram3_expands_to_256_4grams() {
    let g3 = Ngram3::from_bytes(*b"ker");
    let expanded = g3.expand_to_4grams();
    assert_eq!(expanded.len(), 256);
    assert_eq!(expanded[0].to_bytes(), *b"ker\x00");
    assert_eq!(expanded[255].to_bytes(), [b'k', b'e', b'r', 255]);
}

#[test]
fn ngrams3_of_sliding_window() {
    let grams = ngrams3_of(b"abcd");
    let bytes: Vec<[u8; 3]> = grams.iter().map(|g| g.to_bytes()).collect();
    assert_eq!(bytes, vec![*b"abc", *b"bcd"]);
}
