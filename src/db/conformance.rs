//! Behaviour every relational backend must share, run from each backend's tests.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tokio_test::{assert_err, assert_ok};

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{
    EmailConfig, EmailItem, ExternalAccount, Feed, FeedConfig, FeedItem, ItemForUser, Tab,
    Token, User, Widget, WidgetSettings,
};

use super::{layout, run_in_transaction, Repository};

fn alice() -> User {
    User {
        user_id: "alice".into(),
        display_name: "Alice".into(),
        email: "alice@example.com".into(),
        is_admin: false,
    }
}

fn feed_widget(title: &str) -> Widget {
    Widget::feed(
        0,
        FeedConfig {
            common: WidgetSettings {
                title: title.into(),
                display_count: 5,
                link: String::new(),
            },
            feed_id: 1,
            url: "http://example.com/rss".into(),
        },
    )
}

fn item(guid: &str, hour: u32) -> FeedItem {
    FeedItem {
        guid: guid.into(),
        title: format!("Item {guid}"),
        published: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
        link: format!("http://example.com/{guid}"),
    }
}

fn mail_account(token: &str) -> ExternalAccount {
    ExternalAccount {
        id: 0,
        provider_name: "mail".into(),
        account_id: "alice@example.com".into(),
        token: Token {
            access_token: token.into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
        },
    }
}

fn email(guid: &str, title: &str) -> EmailItem {
    EmailItem {
        item: ItemForUser {
            item: FeedItem {
                guid: guid.into(),
                title: title.into(),
                published: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                link: format!("http://mail.example.com/{guid}"),
            },
            read: false,
        },
        from: "bob@example.com".into(),
        snippet: "hello".into(),
    }
}

async fn tab_with_widgets(repo: &dyn Repository, count: usize) -> (i64, Vec<i64>) {
    let mut tab = Tab::new("News", 4);
    assert_ok!(repo.store_tab(&mut tab).await);

    let mut ids = Vec::new();
    for n in 0..count {
        let mut widget = feed_widget(&format!("Widget {n}"));
        assert_ok!(repo.store_widget(tab.id(), &mut widget).await);
        ids.push(widget.id);
        layout::append(&mut tab, widget);
    }
    assert_ok!(repo.store_tab(&mut tab).await);
    (tab.id(), ids)
}

pub async fn users(repo: &dyn Repository) {
    let err = assert_err!(repo.get_user("alice").await);
    assert!(repo.is_not_found(&err));
    assert!(err.is_not_found());

    assert_ok!(repo.store_user(&alice()).await);
    assert_eq!(assert_ok!(repo.get_user("alice").await), alice());

    let renamed = User {
        display_name: "Alice L.".into(),
        ..alice()
    };
    assert_ok!(repo.store_user(&renamed).await);
    assert_eq!(assert_ok!(repo.get_user("alice").await), renamed);
}

pub async fn tabs_and_layout(repo: &dyn Repository) {
    let (tab_id, ids) = tab_with_widgets(repo, 2).await;
    let (w1, w2) = (ids[0], ids[1]);
    assert!(tab_id > 0);

    assert_ok!(repo.allow_tab_access("alice", tab_id).await);
    assert_ok!(repo.allow_tab_access("alice", tab_id).await);
    let tabs = assert_ok!(repo.get_tabs("alice").await);
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].title, "News");
    assert_ok!(repo.is_tab_access_allowed("alice", tab_id).await);
    let denied = assert_err!(repo.is_tab_access_allowed("bob", tab_id).await);
    assert_eq!(denied.kind(), ErrorKind::NotAuthorized);

    let tab = assert_ok!(repo.get_tab(tab_id).await);
    assert_eq!(tab.layout(), vec![vec![w1, w2], vec![], vec![], vec![]]);
    assert_eq!(tab.widget(w2).map(|w| w.config.common().title.clone()), Some("Widget 1".into()));

    let mut email = Widget::email(
        w2,
        EmailConfig {
            common: WidgetSettings {
                title: "Inbox".into(),
                display_count: 10,
                link: "http://mail.example.com".into(),
            },
            account_id: 3,
        },
    );
    assert_ok!(repo.store_widget(tab_id, &mut email).await);
    assert_eq!(assert_ok!(repo.get_widget(tab_id, w2).await), email);

    let reordered = vec![vec![w2], vec![], vec![w1], vec![]];
    assert_ok!(repo.update_tab_layout(tab_id, &reordered).await);
    assert_eq!(assert_ok!(repo.get_tab(tab_id).await).layout(), reordered);

    let err = assert_err!(repo.update_tab_layout(tab_id, &vec![vec![w1, w2, 999]]).await);
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = assert_err!(repo.update_tab_layout(tab_id, &vec![vec![w1]]).await);
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(assert_ok!(repo.get_tab(tab_id).await).layout(), reordered);

    assert_ok!(repo.delete_widget_from_tab(tab_id, w1).await);
    assert_eq!(
        assert_ok!(repo.get_tab(tab_id).await).layout(),
        vec![vec![w2], vec![], vec![], vec![]]
    );
    assert_ok!(repo.get_widget(tab_id, w1).await);
    let err = assert_err!(repo.delete_widget_from_tab(tab_id, w1).await);
    assert!(repo.is_not_found(&err));

    assert_ok!(repo.delete_widget(tab_id, w1).await);
    let err = assert_err!(repo.get_widget(tab_id, w1).await);
    assert!(repo.is_not_found(&err));

    assert_ok!(repo.delete_tab(tab_id).await);
    let err = assert_err!(repo.get_tab(tab_id).await);
    assert!(repo.is_not_found(&err));
    assert!(assert_ok!(repo.get_tabs("alice").await).is_empty());
}

pub async fn feeds_and_read_states(repo: &dyn Repository) {
    let url = "http://example.com/rss";
    let id = assert_ok!(repo.get_or_create_feed_id(url).await);
    assert_eq!(assert_ok!(repo.get_or_create_feed_id(url).await), id);
    let other = assert_ok!(repo.get_or_create_feed_id("http://example.org/atom").await);
    assert_ne!(other, id);

    let mut feed = assert_ok!(repo.get_feed(id).await);
    assert_eq!(feed.url, url);
    assert!(feed.is_due(Utc::now() + Duration::seconds(1)));
    assert!(assert_ok!(repo.get_feed_items(id).await).is_empty());

    feed.title = "Example".into();
    feed.next_retrieval = Utc::now() + Duration::minutes(15);
    assert_ok!(repo.store_feed(&mut feed, &[item("a", 8), item("b", 10)]).await);
    assert_eq!(feed.id, id);
    let stored = assert_ok!(repo.get_feed(id).await);
    assert_eq!(stored.title, "Example");
    assert!(!stored.is_due(Utc::now()));
    assert_eq!(
        assert_ok!(repo.get_feed_items(id).await),
        vec![item("b", 10), item("a", 8)]
    );

    assert_ok!(repo.store_feed(&mut feed, &[item("c", 12)]).await);
    assert_eq!(assert_ok!(repo.get_feed_items(id).await), vec![item("c", 12)]);

    let mut fresh = Feed {
        id: 0,
        url: "http://example.net/feed".into(),
        next_retrieval: Utc::now(),
        title: "Fresh".into(),
    };
    assert_ok!(repo.store_feed(&mut fresh, &[item("x", 1)]).await);
    assert!(fresh.id > 0);
    assert_eq!(
        assert_ok!(repo.get_or_create_feed_id("http://example.net/feed").await),
        fresh.id
    );

    let guids = vec!["a".to_string(), "b".to_string()];
    assert_eq!(
        assert_ok!(repo.are_items_read("alice", id, &guids).await),
        vec![false, false]
    );
    assert_ok!(repo.set_item_read("alice", id, "a", true).await);
    assert_eq!(
        assert_ok!(repo.are_items_read("alice", id, &guids).await),
        vec![true, false]
    );
    assert_eq!(
        assert_ok!(repo.are_items_read("bob", id, &guids).await),
        vec![false, false]
    );
    assert_ok!(repo.set_items_read("alice", id, &guids, true).await);
    assert_eq!(
        assert_ok!(repo.are_items_read("alice", id, &guids).await),
        vec![true, true]
    );
    assert_ok!(repo.set_items_read("alice", id, &guids, false).await);
    assert_eq!(
        assert_ok!(repo.are_items_read("alice", id, &guids).await),
        vec![false, false]
    );

    let err = assert_err!(repo.get_feed(9_999).await);
    assert!(repo.is_not_found(&err));
}

pub async fn accounts_and_codes(repo: &dyn Repository) {
    let mut account = mail_account("t1");
    assert_ok!(repo.store_account("alice", &mut account).await);
    assert!(account.id > 0);
    assert_eq!(assert_ok!(repo.get_account("alice", account.id).await), account);

    let err = assert_err!(repo.get_account("bob", account.id).await);
    assert!(repo.is_not_found(&err));

    let mut relinked = mail_account("t2");
    assert_ok!(repo.store_account("alice", &mut relinked).await);
    assert_eq!(relinked.id, account.id);
    let accounts = assert_ok!(repo.get_accounts("alice").await);
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].token.access_token, "t2");

    assert_ok!(repo.delete_account("alice", account.id).await);
    assert!(assert_ok!(repo.get_accounts("alice").await).is_empty());

    assert_ok!(repo.store_temporary_code("alice", "mail", "state-1").await);
    assert_eq!(
        assert_ok!(repo.get_user_from_temporary_code("mail", "state-1").await),
        "alice"
    );
    let err = assert_err!(repo.get_user_from_temporary_code("other", "state-1").await);
    assert!(repo.is_not_found(&err));

    assert_ok!(repo.delete_temporary_code("alice", "mail").await);
    let err = assert_err!(repo.get_user_from_temporary_code("mail", "state-1").await);
    assert!(repo.is_not_found(&err));
}

pub async fn email_versions(repo: &dyn Repository) {
    let mut account = mail_account("t1");
    assert_ok!(repo.store_account("alice", &mut account).await);
    let account_id = account.id;

    assert_eq!(assert_ok!(repo.get_email_item(account_id, "t-1", 0).await), None);

    assert!(assert_ok!(repo.store_email_item(account_id, 5, &email("t-1", "five")).await));
    let cached = assert_ok!(repo.get_email_item(account_id, "t-1", 5).await);
    assert_eq!(cached, Some(email("t-1", "five")));
    assert_eq!(assert_ok!(repo.get_email_item(account_id, "t-1", 6).await), None);

    assert!(!assert_ok!(repo.store_email_item(account_id, 3, &email("t-1", "three")).await));
    assert!(!assert_ok!(repo.store_email_item(account_id, 5, &email("t-1", "again")).await));
    let cached = assert_ok!(repo.get_email_item(account_id, "t-1", 0).await);
    assert_eq!(cached.map(|e| e.item.item.title), Some("five".to_string()));

    assert!(assert_ok!(repo.store_email_item(account_id, 7, &email("t-1", "seven")).await));
    let cached = assert_ok!(repo.get_email_item(account_id, "t-1", 7).await);
    assert_eq!(cached.map(|e| e.item.item.title), Some("seven".to_string()));
}

pub async fn transaction_rollback(repo: &dyn Repository) {
    let result: Result<()> = run_in_transaction(repo, |tx| async move {
        let mut tab = Tab::new("Lost", 4);
        tx.store_tab(&mut tab).await?;
        tx.allow_tab_access("carol", tab.id()).await?;
        Err(AppError::InvalidInput("abort".into()))
    })
    .await;
    assert_eq!(assert_err!(result).kind(), ErrorKind::InvalidInput);
    assert!(assert_ok!(repo.get_tabs("carol").await).is_empty());

    let tab_id = assert_ok!(
        run_in_transaction(repo, |tx| async move {
            let mut tab = Tab::new("Kept", 4);
            tx.store_tab(&mut tab).await?;
            tx.allow_tab_access("carol", tab.id()).await?;
            Ok(tab.id())
        })
        .await
    );
    let tabs = assert_ok!(repo.get_tabs("carol").await);
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].id, tab_id);
}

pub async fn nested_transaction(repo: &dyn Repository) {
    let result = run_in_transaction(repo, |tx| async move {
        run_in_transaction(&*tx, |_inner| async move { Ok(()) }).await
    })
    .await;
    assert_eq!(assert_err!(result).kind(), ErrorKind::TransactionMisuse);

    assert_ok!(repo.get_tabs("alice").await);
}

pub async fn concurrent_widget_removal(repo: Arc<dyn Repository>) {
    let (tab_id, ids) = tab_with_widgets(&*repo, 8).await;

    let mut handles = Vec::new();
    for widget_id in ids {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.delete_widget_from_tab(tab_id, widget_id).await
        }));
    }
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let tab = assert_ok!(repo.get_tab(tab_id).await);
    assert_eq!(tab.layout(), vec![Vec::<i64>::new(); 4]);
}
