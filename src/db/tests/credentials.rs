use crate::db::*;
use crate::publisher::{Credential, CredentialStore};
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_append_and_load_all() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.load_all().await.unwrap().is_empty());

    db.append(&Credential::new("first")).await.unwrap();
    db.append(&Credential::new("second")).await.unwrap();

    let loaded = db.load_all().await.unwrap();
    assert_eq!(
        loaded,
        vec![Credential::new("first"), Credential::new("second")]
    );

    db.close().await;
}

#[tokio::test]
async fn test_duplicate_credentials_are_ignored() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.append(&Credential::new("same")).await.unwrap();
    db.append(&Credential::new("same")).await.unwrap();

    assert_eq!(db.count_credentials().await.unwrap(), 1);

    db.close().await;
}
