// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

use std::fs;

use plsql_normalizer::{NormalizeFlags, Normalizer, UnwrapError, Wrapper};

const WRAPPED: &[u8] = include_bytes!("fixtures/add_two.plb");
const RESTORED: &[u8] = include_bytes!("fixtures/add_two.sql");

#[test]
fn unwrap_restores_the_fixture() {
    let output = Wrapper::new().unwrap(WRAPPED).expect("unwrap fixture");
    assert_eq!(output, RESTORED);
}

#[test]
fn fixture_classification_flips_on_unwrap() {
    let normalizer = Normalizer::new();

    assert!(normalizer.is_sql(WRAPPED));
    assert!(normalizer.is_wrapped(WRAPPED));
    assert!(!normalizer.is_wrappable(WRAPPED));

    assert!(normalizer.is_sql(RESTORED));
    assert!(!normalizer.is_wrapped(RESTORED));
    assert!(normalizer.is_wrappable(RESTORED));
}

#[test]
fn restored_source_normalizes_cleanly() {
    let output = Wrapper::new().unwrap(WRAPPED).expect("unwrap fixture");
    let normalized = Normalizer::new()
        .normalize(&output[..], &NormalizeFlags::full(), None)
        .expect("normalize restored source");
    assert!(
        String::from_utf8_lossy(&normalized)
            .starts_with("CREATE OR REPLACE FUNCTION HR.ADD_TWO (P IN NUMBER) RETURN NUMBER AS")
    );
}

#[test]
fn path_api_writes_the_same_bytes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("add_two.plb");
    let output = dir.path().join("add_two.sql");
    fs::write(&input, WRAPPED).expect("write sample");

    let wrapper = Wrapper::new();
    let returned = wrapper
        .unwrap_path(&input, None)
        .expect("unwrap_path")
        .expect("bytes returned without write_to");
    assert_eq!(returned, RESTORED);

    let written = wrapper
        .unwrap_path(&input, Some(&output))
        .expect("unwrap_path with write_to");
    assert!(written.is_none());
    assert_eq!(fs::read(&output).expect("read output"), RESTORED);
}

#[test]
fn plain_source_reports_not_wrapped() {
    let result = Wrapper::new().unwrap(RESTORED);
    assert!(matches!(result, Err(UnwrapError::NotWrapped)));
}

#[test]
fn truncating_the_payload_is_detected() {
    // Chop the last payload line off the fixture.
    let shortened = &WRAPPED[..WRAPPED.len() - 20];
    let result = Wrapper::new().unwrap(shortened);
    assert!(matches!(result, Err(UnwrapError::TruncatedPayload { .. })));
}

#[test]
fn corrupting_the_payload_is_detected() {
    // Flip payload bytes into characters base64 rejects.
    let mut corrupted = WRAPPED.to_vec();
    let len = corrupted.len();
    corrupted[len - 10..len - 1].fill(b'!');
    let result = Wrapper::new().unwrap(&corrupted[..]);
    assert!(matches!(result, Err(UnwrapError::CorruptPayload(_))));
}
