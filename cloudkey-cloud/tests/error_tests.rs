use cloudkey_cloud::CloudError;
use cloudkey_crypto::CryptoError;

#[test]
fn server_error_display() {
    let err = CloudError::Server {
        status: 409,
        code: Some(50010),
        message: "hash mismatch".into(),
    };
    assert_eq!(err.to_string(), "server responded with 409: hash mismatch");
}

#[test]
fn tampered_display() {
    let err = CloudError::TamperedServerResponse("value differs".into());
    assert_eq!(err.to_string(), "server returned a tampered value: value differs");
}

#[test]
fn invalid_hash_header_display() {
    assert_eq!(
        CloudError::InvalidHashHeader.to_string(),
        "no content hash header in server response"
    );
}

#[test]
fn out_of_sync_display() {
    assert_eq!(
        CloudError::OutOfSync.to_string(),
        "cloud key storage is out of sync"
    );
}

#[test]
fn entry_errors_display_name() {
    assert_eq!(
        CloudError::EntryNotFound("k1".into()).to_string(),
        "entry not found: k1"
    );
    assert_eq!(
        CloudError::EntryAlreadyExists("k2".into()).to_string(),
        "entry already exists: k2"
    );
}

#[test]
fn crypto_error_converts() {
    let err: CloudError = CryptoError::SignerNotFound("no verifier".into()).into();
    assert!(matches!(err, CloudError::Crypto(CryptoError::SignerNotFound(_))));
    assert!(err.to_string().starts_with("crypto error: "));
}

#[test]
fn serialization_error_converts() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: CloudError = json_err.into();
    assert!(matches!(err, CloudError::Serialization(_)));
}

#[test]
fn only_401_counts_as_unauthorized() {
    let unauthorized = CloudError::Server {
        status: 401,
        code: None,
        message: String::new(),
    };
    let forbidden = CloudError::Server {
        status: 403,
        code: None,
        message: String::new(),
    };
    assert!(unauthorized.is_unauthorized());
    assert!(!forbidden.is_unauthorized());
    assert!(!CloudError::OutOfSync.is_unauthorized());
}

#[test]
fn token_error_display() {
    let err = CloudError::Token("provider offline".into());
    assert_eq!(err.to_string(), "token provider failed: provider offline");
}
