use crate::db::*;
use crate::publisher::Credential;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_data_survives_close_and_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let db = Database::new(&path).await.unwrap();
    db.insert_credential(&Credential::new("persisted")).await.unwrap();
    db.insert_bookmark("bm_0000beef", "Book", "Book (1)", "https://pages.test/1")
        .await
        .unwrap();
    db.close().await;

    let db = Database::new(&path).await.unwrap();
    assert_eq!(
        db.list_credentials().await.unwrap(),
        vec![Credential::new("persisted")]
    );
    assert!(db.get_bookmark("bm_0000beef").await.unwrap().is_some());
    db.close().await;
}
