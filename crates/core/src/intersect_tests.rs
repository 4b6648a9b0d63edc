use super::*;
use crate::store::{HEADER_BYTES, IndexStore, PrefixNaming};
use crate::vlq;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

fn write_prefix_file(dir: &std::path::Path, prefix: [u8; 3], last_byte: u8, fids: &[u32]) {
    let path = dir.join(PrefixNaming::Decimal.relative_path(prefix));
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut payload = Vec::new();
    payload.extend_from_slice(&(fids.len() as u64).to_le_bytes());
    payload.extend_from_slice(&fids[0].to_le_bytes());
    let mut prev = fids[0] as u64;
    for &fid in &fids[1..] {
        vlq::encode_into(fid as u64 - prev, &mut payload);
        prev = fid as u64;
    }

    let mut header = [0xFFu8; HEADER_BYTES];
    header[last_byte as usize * 8..last_byte as usize * 8 + 8].copy_from_slice(&0u64.to_le_bytes());

    let mut file = fs::File::create(&path).unwrap();
    file.write_all(&header).unwrap();
    file.write_all(&payload).unwrap();
}

#[test]
fn exact_minmatches_equal_len_is_plain_intersection() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [1, 2, 3], 4, &[1, 2, 3, 4]);
    write_prefix_file(tmp.path(), [5, 6, 7], 8, &[2, 4, 6]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);

    let result = match_posting_lists(&store, &[[1, 2, 3, 4], [5, 6, 7, 8]], 2).unwrap();
    assert_eq!(result, vec![2, 4]);
}

#[test]
fn minmatches_below_len_uses_counter() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [1, 2, 3], 4, &[1, 2, 3]);
    write_prefix_file(tmp.path(), [5, 6, 7], 8, &[2, 3, 4]);
    write_prefix_file(tmp.path(), [9, 9, 9], 9, &[3, 5]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);

    let result = match_posting_lists(
        &store,
        &[[1, 2, 3, 4], [5, 6, 7, 8], [9, 9, 9, 9]],
        2,
    )
    .unwrap();
    assert_eq!(result, vec![2, 3]);
}

#[test]
fn too_many_ngrams_is_invalid_query() {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);
    let ngrams = vec![[0u8, 0, 0, 0]; sigfilter_runtime::MAX_NGRAMS_PER_QUERY + 1];
    let err = match_posting_lists(&store, &ngrams, 1).unwrap_err();
    assert!(matches!(err, CoreError::InvalidQuery(_)));
}

#[test]
fn n3_fallback_intersects_across_3grams() {
    let tmp = TempDir::new().unwrap();
    // 3-gram "abc" expanded with last byte 4 contains fid 7; with byte 9 contains fid 8.
    write_prefix_file(tmp.path(), [b'a', b'b', b'c'], 4, &[7]);
    write_prefix_file(tmp.path(), [b'a', b'b', b'c'], 9, &[8]);
    // 3-gram "xyz" also covers fid 7 via one expansion.
    write_prefix_file(tmp.path(), [b'x', b'y', b'z'], 4, &[7]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);

    let grams = [Ngram3::from_bytes([b'a', b'b', b'c']), Ngram3::from_bytes([b'x', b'y', b'z'])];
    let result = get_posting_list_n3(&store, &grams).unwrap();
    assert_eq!(result, vec![7]);
}

#[test]
fn grouped_variant_recovers_exact_result_with_large_tau() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [1, 2, 3], 4, &[1, 2, 3]);
    write_prefix_file(tmp.path(), [5, 6, 7], 8, &[2, 3, 4]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);

    // tau = None forces every list into an exact residue group; with a
    // groupwidth large enough that moduli don't collide among these tiny
    // fids, the grouped path should agree with the exact intersection.
    let result = match_posting_lists_grouped(&store, &[[1, 2, 3, 4], [5, 6, 7, 8]], 16, None).unwrap();
    assert_eq!(result, vec![2, 3]);
}

#[test]
fn grouped_variant_empty_groups_returns_prefilter() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [1, 2, 3], 4, &[1, 2, 3]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 100);

    // tau = 0 forces every list past the threshold into the prefilter.
    let result = match_posting_lists_grouped(&store, &[[1, 2, 3, 4]], 16, Some(0)).unwrap();
    assert_eq!(result, vec![1, 2, 3]);
}
