//! Copy Kubernetes Secret values into a Databricks secret scope
//!
//! Values are resolved completely before anything is written, so a missing
//! Secret or key leaves the platform untouched. Writes overwrite, so running
//! the sync again after a partial failure converges.

use dbx_common::crd::SecretMapping;
use dbx_platform::models::SecretValue;
use dbx_platform::DatabricksApi;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::JobError;
use crate::store::JobStore;

/// Longest scope name the platform accepts
pub const MAX_SCOPE_NAME_LEN: usize = 128;

/// Hex digits of the identity hash in a shortened scope name
const SCOPE_HASH_LEN: usize = 12;

const SCOPE_SUFFIX: &str = "_scope";

/// Scope name for a job: `<namespace>_<name>_scope`, restricted to the
/// platform's character set
///
/// Names over the length limit keep as much of the prefix as fits, followed
/// by a hash of `<namespace>/<name>` and the `_scope` suffix.
pub fn scope_name(namespace: &str, name: &str) -> String {
    let full: String = format!("{namespace}_{name}{SCOPE_SUFFIX}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if full.len() <= MAX_SCOPE_NAME_LEN {
        return full;
    }

    let digest = hex::encode(Sha256::digest(format!("{namespace}/{name}").as_bytes()));
    let keep = MAX_SCOPE_NAME_LEN - 1 - SCOPE_HASH_LEN - SCOPE_SUFFIX.len();
    // Sanitized names are ASCII, so byte offsets are char boundaries
    format!(
        "{}_{}{SCOPE_SUFFIX}",
        &full[..keep],
        &digest[..SCOPE_HASH_LEN]
    )
}

/// Read every mapped key from the referenced Secrets
pub async fn resolve_secrets(
    store: &dyn JobStore,
    namespace: &str,
    mappings: &[SecretMapping],
) -> Result<Vec<(String, SecretValue)>, JobError> {
    let mut resolved = Vec::new();
    for mapping in mappings {
        let secret = store
            .get_secret(namespace, &mapping.secret_name)
            .await?
            .ok_or_else(|| JobError::SecretNotFound {
                namespace: namespace.to_string(),
                name: mapping.secret_name.clone(),
            })?;
        let data = secret.data.unwrap_or_default();

        for key in &mapping.mapping {
            let bytes = data
                .get(&key.secret_key)
                .ok_or_else(|| JobError::SecretKeyMissing {
                    secret: mapping.secret_name.clone(),
                    key: key.secret_key.clone(),
                })?;
            resolved.push((key.output_key.clone(), SecretValue::from_raw(bytes.0.clone())));
        }
    }
    Ok(resolved)
}

/// Ensure the scope exists and upsert every value into it
pub async fn sync_secrets(
    platform: &dyn DatabricksApi,
    scope: &str,
    principal: &str,
    values: &[(String, SecretValue)],
) -> Result<(), JobError> {
    match platform.create_secret_scope(scope, principal).await {
        Ok(()) => info!(scope, "created secret scope"),
        Err(e) if e.is_already_exists() => debug!(scope, "secret scope already exists"),
        Err(e) => return Err(e.into()),
    }

    for (key, value) in values {
        platform.put_secret(scope, key, value).await?;
        debug!(scope, key = %key, "wrote secret");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockJobStore;
    use crate::testing::{secret, MockPlatform};
    use dbx_common::crd::SecretKeyMapping;
    use dbx_platform::PlatformError;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn mapping(secret_name: &str, keys: &[(&str, &str)]) -> SecretMapping {
        SecretMapping {
            secret_name: secret_name.to_string(),
            mapping: keys
                .iter()
                .map(|(from, to)| SecretKeyMapping {
                    secret_key: from.to_string(),
                    output_key: to.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn scope_name_is_sanitized_and_bounded() {
        assert_eq!(scope_name("data", "etl-1"), "data_etl-1_scope");
        assert_eq!(scope_name("data", "etl.v2"), "data_etl.v2_scope");
        assert_eq!(scope_name("da ta", "etl/1"), "da_ta_etl_1_scope");

        let long = "x".repeat(200);
        let name = scope_name("data", &long);
        assert_eq!(name.len(), MAX_SCOPE_NAME_LEN);
        assert!(name.starts_with("data_x"));
        assert!(name.ends_with("_scope"));
        assert_eq!(scope_name("data", &long), name);
    }

    #[test]
    fn long_names_sharing_a_prefix_get_distinct_scopes() {
        let first = format!("{}-a", "x".repeat(200));
        let second = format!("{}-b", "x".repeat(200));

        let a = scope_name("data", &first);
        let b = scope_name("data", &second);
        assert_ne!(a, b);
        assert_eq!(a.len(), MAX_SCOPE_NAME_LEN);
        assert_eq!(b.len(), MAX_SCOPE_NAME_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
    }

    #[test]
    fn name_at_the_limit_is_not_hashed() {
        // "data_" + name + "_scope" is exactly the limit
        let name = "y".repeat(MAX_SCOPE_NAME_LEN - "data_".len() - "_scope".len());
        assert_eq!(scope_name("data", &name), format!("data_{name}_scope"));
    }

    #[tokio::test]
    async fn resolves_text_and_binary_values() {
        let mut store = MockJobStore::new();
        store
            .expect_get_secret()
            .withf(|ns, name| ns == "data" && name == "db-creds")
            .returning(|_, _| {
                Ok(Some(secret(&[
                    ("password", b"hunter2".as_slice()),
                    ("cert", [0xffu8, 0x00].as_slice()),
                ])))
            });

        let values = resolve_secrets(
            &store,
            "data",
            &[mapping("db-creds", &[("password", "db_password"), ("cert", "tls_cert")])],
        )
        .await
        .unwrap();

        assert_eq!(
            values,
            vec![
                ("db_password".to_string(), SecretValue::Text("hunter2".to_string())),
                ("tls_cert".to_string(), SecretValue::Bytes(vec![0xff, 0x00])),
            ]
        );
    }

    #[tokio::test]
    async fn missing_secret_is_an_error() {
        let mut store = MockJobStore::new();
        store.expect_get_secret().returning(|_, _| Ok(None));

        let err = resolve_secrets(&store, "data", &[mapping("absent", &[("k", "k")])])
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::SecretNotFound { ref name, .. } if name == "absent"));
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let mut store = MockJobStore::new();
        store
            .expect_get_secret()
            .returning(|_, _| Ok(Some(secret(&[("user", b"admin".as_slice())]))));

        let err = resolve_secrets(&store, "data", &[mapping("db-creds", &[("password", "pw")])])
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::SecretKeyMissing { ref key, .. } if key == "password"));
    }

    #[tokio::test]
    async fn existing_scope_is_reused() {
        let mut platform = MockPlatform::new();
        platform
            .expect_create_secret_scope()
            .withf(|scope, principal| scope == "data_etl-1_scope" && principal == "users")
            .times(1)
            .returning(|_, _| {
                Err(PlatformError::AlreadyExists {
                    operation: "create secret scope",
                    message: "exists".to_string(),
                })
            });
        platform
            .expect_put_secret()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let values = vec![("pw".to_string(), SecretValue::Text("x".to_string()))];
        sync_secrets(&platform, "data_etl-1_scope", "users", &values)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scope_creation_failure_stops_sync() {
        let mut platform = MockPlatform::new();
        platform.expect_create_secret_scope().returning(|_, _| {
            Err(PlatformError::Api {
                operation: "create secret scope",
                status: 403,
                error_code: Some("PERMISSION_DENIED".to_string()),
                message: "no".to_string(),
            })
        });
        platform.expect_put_secret().never();

        let values = vec![("pw".to_string(), SecretValue::Text("x".to_string()))];
        let err = sync_secrets(&platform, "s", "users", &values).await.unwrap_err();
        assert!(matches!(err, JobError::Platform(PlatformError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn first_upsert_failure_skips_the_rest_and_rerun_converges() {
        let remote: Arc<Mutex<BTreeMap<String, SecretValue>>> = Arc::default();
        let attempts = Arc::new(Mutex::new(0u32));

        let mut platform = MockPlatform::new();
        platform
            .expect_create_secret_scope()
            .times(2)
            .returning(|_, _| Ok(()));
        let remote_writes = remote.clone();
        let attempts_seen = attempts.clone();
        platform.expect_put_secret().returning(move |_, key, value| {
            let mut n = attempts_seen.lock().unwrap();
            *n += 1;
            if *n == 1 {
                return Err(PlatformError::Api {
                    operation: "put secret",
                    status: 503,
                    error_code: Some("TEMPORARILY_UNAVAILABLE".to_string()),
                    message: "try again".to_string(),
                });
            }
            remote_writes
                .lock()
                .unwrap()
                .insert(key.to_string(), value.clone());
            Ok(())
        });

        let values = vec![
            ("a".to_string(), SecretValue::Text("1".to_string())),
            ("b".to_string(), SecretValue::Text("2".to_string())),
            ("c".to_string(), SecretValue::Text("3".to_string())),
        ];

        let err = sync_secrets(&platform, "s", "users", &values).await.unwrap_err();
        assert!(matches!(err, JobError::Platform(PlatformError::Api { status: 503, .. })));
        assert_eq!(*attempts.lock().unwrap(), 1);
        assert!(remote.lock().unwrap().is_empty());

        sync_secrets(&platform, "s", "users", &values).await.unwrap();
        assert_eq!(*attempts.lock().unwrap(), 4);
        let expected: BTreeMap<String, SecretValue> = values.into_iter().collect();
        assert_eq!(*remote.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn rerun_after_partial_failure_converges() {
        // Remote scope contents, shared across both attempts
        let remote: Arc<Mutex<BTreeMap<String, SecretValue>>> = Arc::default();
        let attempts = Arc::new(Mutex::new(0u32));

        let mut platform = MockPlatform::new();
        platform.expect_create_secret_scope().returning(|_, _| {
            Err(PlatformError::AlreadyExists {
                operation: "create secret scope",
                message: "exists".to_string(),
            })
        });
        let remote_writes = remote.clone();
        let attempts_seen = attempts.clone();
        platform.expect_put_secret().returning(move |_, key, value| {
            let mut n = attempts_seen.lock().unwrap();
            *n += 1;
            // Second write of the first pass fails
            if *n == 2 {
                return Err(PlatformError::Api {
                    operation: "put secret",
                    status: 503,
                    error_code: None,
                    message: "unavailable".to_string(),
                });
            }
            remote_writes
                .lock()
                .unwrap()
                .insert(key.to_string(), value.clone());
            Ok(())
        });

        let values = vec![
            ("a".to_string(), SecretValue::Text("1".to_string())),
            ("b".to_string(), SecretValue::Text("2".to_string())),
            ("c".to_string(), SecretValue::Text("3".to_string())),
        ];

        assert!(sync_secrets(&platform, "s", "users", &values).await.is_err());
        assert_eq!(remote.lock().unwrap().len(), 1);

        sync_secrets(&platform, "s", "users", &values).await.unwrap();
        let expected: BTreeMap<String, SecretValue> = values.into_iter().collect();
        assert_eq!(*remote.lock().unwrap(), expected);
    }
}
