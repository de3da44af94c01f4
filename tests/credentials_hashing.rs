#[path = "../src/password.rs"]
mod password;

#[test]
fn hash_and_verify_roundtrip() {
    let hash = password::hash_password("secret123").expect("hash password");
    // PHC string form, never the raw password.
    assert!(hash.starts_with("$argon2"));
    assert!(!hash.contains("secret123"));

    assert!(password::verify_password("secret123", &hash).expect("verify"));
    assert!(!password::verify_password("secret124", &hash).expect("verify"));
}

#[test]
fn same_password_hashes_differently_per_salt() {
    let a = password::hash_password("secret123").expect("hash a");
    let b = password::hash_password("secret123").expect("hash b");
    assert_ne!(a, b);
}

#[test]
fn malformed_stored_hash_is_an_error_not_a_mismatch() {
    let err = password::verify_password("secret123", "not-a-phc-string")
        .expect_err("malformed hash must error");
    assert!(err.contains("invalid"));
}
