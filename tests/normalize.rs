// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

use std::fs;

use plsql_normalizer::{NormalizeFlags, Normalizer};

const ADD_JOB_HISTORY: &[u8] = include_bytes!("fixtures/add_job_history.sql");
const SECURE_DML: &[u8] = include_bytes!("fixtures/secure_dml.sql");

const ADD_JOB_HISTORY_FULL: &str = "CREATE OR REPLACE PROCEDURE ADD_JOB_HISTORY \
( P_EMP_ID JOB_HISTORY.EMPLOYEE_ID%TYPE , P_START_DATE JOB_HISTORY.START_DATE%TYPE \
, P_END_DATE JOB_HISTORY.END_DATE%TYPE , P_JOB_ID JOB_HISTORY.JOB_ID%TYPE \
, P_DEPARTMENT_ID JOB_HISTORY.DEPARTMENT_ID%TYPE ) IS BEGIN INSERT INTO JOB_HISTORY \
(EMPLOYEE_ID, START_DATE, END_DATE, JOB_ID, DEPARTMENT_ID) VALUES(P_EMP_ID, \
P_START_DATE, P_END_DATE, P_JOB_ID, P_DEPARTMENT_ID); END ADD_JOB_HISTORY; / ";

#[test]
fn classify_fixtures() {
    let normalizer = Normalizer::new();

    for sample in [ADD_JOB_HISTORY, SECURE_DML] {
        assert!(normalizer.is_sql(sample));
        assert!(normalizer.is_wrappable(sample));
        assert!(!normalizer.is_wrapped(sample));
    }
}

#[test]
fn full_normalization_collapses_to_one_statement() {
    let output = Normalizer::new()
        .normalize(ADD_JOB_HISTORY, &NormalizeFlags::full(), None)
        .expect("normalize add_job_history");
    assert_eq!(String::from_utf8_lossy(&output), ADD_JOB_HISTORY_FULL);
}

#[test]
fn full_normalization_never_emits_double_spaces() {
    let normalizer = Normalizer::new();
    for sample in [ADD_JOB_HISTORY, SECURE_DML] {
        let output = normalizer
            .normalize(sample, &NormalizeFlags::full(), None)
            .expect("normalize");
        assert!(
            !output.windows(2).any(|pair| pair == b"  "),
            "double space in {:?}",
            String::from_utf8_lossy(&output)
        );
    }
}

#[test]
fn full_normalization_is_idempotent() {
    let normalizer = Normalizer::new();
    let flags = NormalizeFlags::full();
    for sample in [ADD_JOB_HISTORY, SECURE_DML] {
        let once = normalizer.normalize(sample, &flags, None).expect("first pass");
        let twice = normalizer.normalize(&once[..], &flags, None).expect("second pass");
        assert_eq!(once, twice);
    }
}

#[test]
fn uppercase_keeps_line_structure_and_literals() {
    let output = Normalizer::new()
        .normalize(
            SECURE_DML,
            &NormalizeFlags {
                uppercase: true,
                ..NormalizeFlags::default()
            },
            None,
        )
        .expect("normalize secure_dml");

    assert_eq!(
        String::from_utf8_lossy(&output),
        "CREATE OR REPLACE PROCEDURE SECURE_DML IS\nBEGIN\n  IF TO_CHAR (SYSDATE, \
         'HH24:MI') NOT BETWEEN '08:00' AND '18:00'\n        OR TO_CHAR (SYSDATE, 'DY') \
         IN ('SAT', 'SUN') THEN\n    RAISE_APPLICATION_ERROR (-20205,\n        \
         'You may only make changes during normal office hours');\n  END IF;\n\
         END SECURE_DML;\n/\n"
    );
}

#[test]
fn line_limit_stops_after_declaration() {
    let output = Normalizer::new()
        .normalize(ADD_JOB_HISTORY, &NormalizeFlags::default(), Some(8))
        .expect("normalize with line limit");
    let text = String::from_utf8_lossy(&output);
    assert!(text.ends_with(") IS\n"), "unexpected tail: {text:?}");
    assert!(!text.contains('/'));
}

#[test]
fn path_api_writes_the_same_bytes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("add_job_history.sql");
    let output = dir.path().join("add_job_history.out.sql");
    fs::write(&input, ADD_JOB_HISTORY).expect("write sample");

    let normalizer = Normalizer::new();
    let flags = NormalizeFlags::full();

    let returned = normalizer
        .normalize_path(&input, &flags, None, None)
        .expect("normalize_path")
        .expect("bytes returned without write_to");

    let written = normalizer
        .normalize_path(&input, &flags, None, Some(&output))
        .expect("normalize_path with write_to");
    assert!(written.is_none());

    assert_eq!(fs::read(&output).expect("read output"), returned);
    assert_eq!(String::from_utf8_lossy(&returned), ADD_JOB_HISTORY_FULL);

    assert!(normalizer.is_sql_path(&input).expect("is_sql_path"));
    assert!(normalizer.is_wrappable_path(&input).expect("is_wrappable_path"));
    assert!(!normalizer.is_wrapped_path(&input).expect("is_wrapped_path"));
}

#[test]
fn missing_input_file_is_a_resource_error() {
    let result = Normalizer::new().normalize_path(
        std::path::Path::new("does/not/exist.sql"),
        &NormalizeFlags::default(),
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(plsql_normalizer::NormalizeError::Resource(_))
    ));
}
