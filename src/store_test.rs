use super::*;

fn sample_store() -> StaticUserStore {
    let text = format!(
        r#"{{
            "users": [
                {{
                    "username": "alice",
                    "password_sha256": "{}",
                    "attributes": {{"mail": "alice@example.com", "givenName": "Alice"}},
                    "roles": ["admin", "staff"]
                }},
                {{
                    "username": "bob",
                    "password_sha256": "{}",
                    "roles": ["staff"]
                }}
            ],
            "roles": ["auditor", "guest"]
        }}"#,
        hash_password("secret"),
        hash_password("hunter2"),
    );
    StaticUserStore::from_json(&text).expect("store should load")
}

// =============================================================================
// hash_password / wildcard_match
// =============================================================================

#[test]
fn hash_password_is_sha256_hex() {
    assert_eq!(
        hash_password("secret"),
        "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
    );
}

#[test]
fn wildcard_star_matches_everything() {
    assert!(wildcard_match("*", "admin"));
    assert!(wildcard_match("*", ""));
}

#[test]
fn wildcard_prefix_and_suffix() {
    assert!(wildcard_match("ad*", "admin"));
    assert!(!wildcard_match("ad*", "staff"));
    assert!(wildcard_match("*min", "admin"));
    assert!(!wildcard_match("*min", "minion"));
}

#[test]
fn wildcard_infix() {
    assert!(wildcard_match("a*d*n", "admin"));
    assert!(!wildcard_match("a*x*n", "admin"));
}

#[test]
fn wildcard_without_star_is_exact() {
    assert!(wildcard_match("staff", "staff"));
    assert!(!wildcard_match("staff", "staffer"));
}

#[test]
fn wildcard_does_not_overlap_prefix_and_suffix() {
    assert!(!wildcard_match("ab*b", "ab"));
    assert!(wildcard_match("ab*b", "abb"));
}

// =============================================================================
// StaticUserStore
// =============================================================================

#[tokio::test]
async fn authenticate_accepts_matching_password() {
    let store = sample_store();
    assert!(store.authenticate("alice", "secret").await.expect("authenticate"));
}

#[tokio::test]
async fn authenticate_rejects_wrong_password_and_unknown_user() {
    let store = sample_store();
    assert!(!store.authenticate("alice", "wrong").await.expect("authenticate"));
    assert!(!store.authenticate("mallory", "secret").await.expect("authenticate"));
}

#[tokio::test]
async fn user_attributes_omits_missing_names() {
    let store = sample_store();
    let names = vec!["mail".to_owned(), "telephoneNumber".to_owned()];
    let attrs = store.user_attributes("alice", &names).await.expect("attributes");

    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs.get("mail").map(String::as_str), Some("alice@example.com"));
}

#[tokio::test]
async fn user_attributes_unknown_user_is_error() {
    let store = sample_store();
    let err = store.user_attributes("mallory", &[]).await.expect_err("unknown user");
    assert!(matches!(err, UserStoreError::UserNotFound(name) if name == "mallory"));
}

#[tokio::test]
async fn user_roles_returns_assigned_roles() {
    let store = sample_store();
    assert_eq!(store.user_roles("alice").await.expect("roles"), vec!["admin", "staff"]);
    assert!(matches!(store.user_roles("nobody").await, Err(UserStoreError::UserNotFound(_))));
}

#[tokio::test]
async fn roles_are_sorted_deduplicated_and_limited() {
    let store = sample_store();
    assert_eq!(store.roles("*", 100).await.expect("roles"), vec!["admin", "auditor", "guest", "staff"]);
    assert_eq!(store.roles("*", 2).await.expect("roles"), vec!["admin", "auditor"]);
    assert_eq!(store.roles("a*", 100).await.expect("roles"), vec!["admin", "auditor"]);
    assert!(store.roles("*", 0).await.expect("roles").is_empty());
}

#[test]
fn duplicate_usernames_fail_to_load() {
    let record = UserRecord {
        username: "alice".into(),
        password_sha256: hash_password("x"),
        attributes: BTreeMap::new(),
        roles: Vec::new(),
    };
    let err = StaticUserStore::new(vec![record.clone(), record], Vec::new()).expect_err("duplicate");
    assert!(matches!(err, UserStoreError::Load(_)));
    assert_eq!(err.error_code(), "E_STORE_LOAD");
}

#[test]
fn invalid_json_fails_to_load() {
    assert!(matches!(StaticUserStore::from_json("{not json"), Err(UserStoreError::Load(_))));
}

#[test]
fn missing_file_fails_to_load() {
    let err = StaticUserStore::from_file(Path::new("/nonexistent/users.json")).expect_err("missing file");
    assert!(matches!(err, UserStoreError::Load(_)));
}

#[test]
fn only_unavailable_is_retryable() {
    assert!(UserStoreError::Unavailable("down".into()).retryable());
    assert!(!UserStoreError::UserNotFound("a".into()).retryable());
}
