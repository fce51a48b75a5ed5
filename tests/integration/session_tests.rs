//! Session lifecycle tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use library_client::{
    routes::{guard, guard_settled, Access, Route},
    screens::{self, BookAction},
    services::session::SessionState,
    ClientError,
};
use tokio_test::{assert_err, assert_ok};

use crate::support::{TestApp, READER_ID};

#[tokio::test]
async fn test_login_persists_token_and_resolves_identity() {
    let app = TestApp::spawn().await;

    let navigation = assert_ok!(app.services.session.login("reader", "reader").await);

    assert_eq!(navigation.route, Route::Dashboard);
    assert_eq!(navigation.notice, "Welcome back!");
    assert_eq!(app.stored_token().await.as_deref(), Some("token-reader"));

    let user = app.services.session.user().unwrap();
    assert_eq!(user.id, Some(READER_ID));
    assert_eq!(user.username, "reader");
}

#[tokio::test]
async fn test_invalid_credentials_keep_session_anonymous() {
    let app = TestApp::spawn().await;

    let err = assert_err!(app.services.session.login("reader", "wrong").await);

    assert_eq!(err, ClientError::Auth("Invalid credentials.".into()));
    assert_eq!(app.services.session.state(), SessionState::Anonymous);
    assert!(app.stored_token().await.is_none());
}

#[tokio::test]
async fn test_restore_from_stored_token() {
    let app = TestApp::with_stored_token("token-admin").await;

    let state = assert_ok!(app.services.session.restore().await);

    assert!(state.is_authenticated());
    assert!(state.user().unwrap().is_staff);
}

#[tokio::test]
async fn test_restore_with_rejected_token_clears_it() {
    let app = TestApp::with_stored_token("token-ghost").await;

    let err = assert_err!(app.services.session.restore().await);

    assert_eq!(
        err,
        ClientError::Auth("Given token not valid for any token type".into())
    );
    assert_eq!(app.services.session.state(), SessionState::Anonymous);
    assert!(app.stored_token().await.is_none());
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::spawn().await;

    let navigation = assert_ok!(app.services.session.register("frodo", "ring").await);
    assert_eq!(navigation.route, Route::Login);
    assert_eq!(navigation.notice, "You can now log in with your credentials");
    // Registration alone does not log in
    assert_eq!(app.services.session.state(), SessionState::Anonymous);

    assert_ok!(app.services.session.login("frodo", "ring").await);
    assert!(app.services.session.state().is_authenticated());
}

#[tokio::test]
async fn test_register_existing_username_fails() {
    let app = TestApp::spawn().await;

    let err = assert_err!(app.services.session.register("reader", "reader").await);
    assert_eq!(err, ClientError::Auth("Registration failed".into()));
}

#[tokio::test]
async fn test_logout_clears_token_cache_and_access() {
    let app = TestApp::logged_in("reader").await;
    assert_ok!(app.services.books.list_books(None).await);
    assert!(!app.services.books.is_cache_empty());

    let navigation = app.services.session.logout().await;

    assert_eq!(navigation.route, Route::Login);
    assert_eq!(navigation.notice, "You have been successfully logged out");
    assert!(app.stored_token().await.is_none());
    assert!(app.services.books.is_cache_empty());

    let state = app.services.session.state();
    assert_eq!(guard(&state, Route::Dashboard), Access::Redirect(Route::Login));
    assert_eq!(guard(&state, Route::Login), Access::Render(Route::Login));

    let err = assert_err!(app.services.books.list_books(None).await);
    assert_eq!(err, ClientError::Auth("Not authenticated".into()));
}

#[tokio::test]
async fn test_guard_waits_for_identity_resolution() {
    let app = TestApp::with_stored_token("token-reader").await;
    let mut receiver = app.services.session.subscribe();

    // Restore is polled first and leaves the session Resolving
    let (restored, access) = tokio::join!(
        app.services.session.restore(),
        guard_settled(&mut receiver, Route::MyBooks)
    );

    assert!(assert_ok!(restored).is_authenticated());
    assert_eq!(access, Access::Render(Route::MyBooks));
}

#[tokio::test]
async fn test_switching_user_drops_previous_reads() {
    let app = TestApp::logged_in("reader").await;
    assert_ok!(app.services.books.borrow_book(7).await);
    assert_eq!(assert_ok!(app.services.books.my_books().await).len(), 1);

    assert_ok!(app.services.session.login("admin", "admin").await);

    assert!(app.services.books.is_cache_empty());
    assert!(assert_ok!(app.services.books.my_books().await).is_empty());
}

#[tokio::test]
async fn test_identity_without_id_still_authenticates() {
    let app = TestApp::spawn().await;
    app.backend.me_without_id.store(true, Ordering::SeqCst);

    assert_ok!(app.services.session.login("reader", "reader").await);

    let user = app.services.session.user().unwrap();
    assert_eq!(user.id, None);
    assert_eq!(user.username, "reader");
    assert_eq!(app.stored_token().await.as_deref(), Some("token-reader"));

    // Books can still be borrowed, they just cannot be matched to the user
    assert_ok!(app.services.books.borrow_book(7).await);
    let dune = assert_ok!(app.services.books.get_book(7).await);
    assert!(!dune.available);
    assert!(assert_ok!(app.services.books.my_books().await).is_empty());
    assert!(!screens::actions_for(&dune, &user).contains(&BookAction::Return));
}

#[tokio::test]
async fn test_logout_during_identity_resolution_wins() {
    let app = TestApp::with_stored_token("token-reader").await;
    app.backend.me_delay_ms.store(100, Ordering::SeqCst);
    let session = &app.services.session;

    let (restored, _) = tokio::join!(session.restore(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.logout().await
    });

    assert_eq!(restored.unwrap_err(), ClientError::Auth("Session expired".into()));
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(app.stored_token().await.is_none());
    assert!(app.services.books.is_cache_empty());
}
