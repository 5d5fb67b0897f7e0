use crate::bookmarks::{BookmarkInfo, BookmarkRegistrar, is_token};
use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_issue_and_resolve_token() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let token = db
        .issue_token("Moby Dick", "Moby Dick (1)", "https://pages.test/moby-1")
        .await
        .unwrap();
    assert!(is_token(&token));

    let info = db.resolve(&token).await.unwrap();
    assert_eq!(
        info,
        Some(BookmarkInfo {
            book_name: "Moby Dick".to_string(),
            page_title: "Moby Dick (1)".to_string(),
            url: "https://pages.test/moby-1".to_string(),
        })
    );

    db.close().await;
}

#[tokio::test]
async fn test_unknown_token_resolves_to_none() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert_eq!(db.resolve("bm_deadbeef").await.unwrap(), None);

    db.close().await;
}

#[tokio::test]
async fn test_duplicate_token_is_rejected() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.insert_bookmark("bm_00000001", "A", "A (1)", "https://x/1").await.unwrap());
    assert!(!db.insert_bookmark("bm_00000001", "B", "B (1)", "https://x/2").await.unwrap());

    let record = db.get_bookmark("bm_00000001").await.unwrap().unwrap();
    assert_eq!(record.book_name, "A");

    db.close().await;
}

#[tokio::test]
async fn test_list_bookmarks_for_book() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for page in 1..=3 {
        db.issue_token("Book", &format!("Book ({page})"), &format!("https://x/{page}"))
            .await
            .unwrap();
    }
    db.issue_token("Other", "Other (1)", "https://y/1").await.unwrap();

    let records = db.list_bookmarks_for_book("Book").await.unwrap();
    let titles: Vec<_> = records.iter().map(|r| r.page_title.as_str()).collect();
    assert_eq!(titles, vec!["Book (1)", "Book (2)", "Book (3)"]);

    db.close().await;
}
