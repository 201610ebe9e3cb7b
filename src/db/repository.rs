use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Feed, FeedFollow, FeedListing, InsertOutcome, NewPost, Post, User};

use super::schema::SCHEMA;

const FEED_COLUMNS: &str =
    "f.id, f.created_at, f.updated_at, f.name, f.url, f.user_id, f.last_fetched_at";

const FEED_FOLLOW_COLUMNS: &str =
    "ff.id, ff.created_at, ff.updated_at, ff.user_id, ff.feed_id, u.name, f.name";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn create_user(&self, name: &str) -> Result<User> {
        let now = now();
        let user = User {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
        };

        let row = user.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO users (id, created_at, updated_at, name)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(name) DO NOTHING"#,
                    params![
                        row.id.to_string(),
                        format_timestamp(row.created_at),
                        format_timestamp(row.updated_at),
                        row.name,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;

        if !inserted {
            return Err(AppError::UserExists(user.name));
        }
        Ok(user)
    }

    pub async fn get_user(&self, name: &str) -> Result<Option<User>> {
        let name = name.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, created_at, updated_at, name FROM users WHERE name = ?1",
                        params![name],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    pub async fn get_users(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, created_at, updated_at, name FROM users ORDER BY created_at, name",
                )?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Removes every user; feeds, follows and posts go with them through the cascades.
    pub async fn delete_all_users(&self) -> Result<usize> {
        let deleted = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM users", [])?))
            .await?;
        Ok(deleted)
    }

    // Feed operations

    pub async fn create_feed(&self, name: &str, url: &str, user_id: Uuid) -> Result<Feed> {
        let now = now();
        let feed = Feed {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            url: url.to_string(),
            user_id,
            last_fetched_at: None,
        };

        let row = feed.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(url) DO NOTHING"#,
                    params![
                        row.id.to_string(),
                        format_timestamp(row.created_at),
                        format_timestamp(row.updated_at),
                        row.name,
                        row.url,
                        row.user_id.to_string(),
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;

        if !inserted {
            return Err(AppError::FeedExists(feed.url));
        }
        Ok(feed)
    }

    pub async fn get_feeds(&self) -> Result<Vec<FeedListing>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {FEED_COLUMNS}, u.name
                       FROM feeds f
                       JOIN users u ON f.user_id = u.id
                       ORDER BY f.created_at, f.name"#
                ))?;
                let feeds = stmt
                    .query_map([], |row| {
                        Ok(FeedListing {
                            feed: feed_from_row(row)?,
                            user_name: row.get(7)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {FEED_COLUMNS} FROM feeds f WHERE f.url = ?1"),
                        params![url],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    /// Flags every feed as due; there is no staleness window.
    pub async fn reset_feeds_to_fetch(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("UPDATE feeds SET fetch_due = 1", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Due feeds, least recently fetched first. Never-fetched feeds lead.
    pub async fn get_feeds_to_fetch(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {FEED_COLUMNS}
                       FROM feeds f
                       WHERE f.fetch_due = 1
                       ORDER BY f.last_fetched_at ASC NULLS FIRST, f.created_at"#
                ))?;
                let feeds = stmt
                    .query_map([], feed_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn mark_feed_fetched(&self, id: Uuid, fetched_at: DateTime<Utc>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE feeds
                       SET last_fetched_at = ?2, updated_at = ?2, fetch_due = 0
                       WHERE id = ?1"#,
                    params![id.to_string(), format_timestamp(fetched_at)],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed follow operations

    /// Follows `feed_id` for `user_id`. Repeating an existing pair returns the original row.
    pub async fn create_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<FeedFollow> {
        let now = now();
        let id = Uuid::new_v4();
        let follow = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
                       VALUES (?1, ?2, ?2, ?3, ?4)
                       ON CONFLICT(user_id, feed_id) DO NOTHING"#,
                    params![
                        id.to_string(),
                        format_timestamp(now),
                        user_id.to_string(),
                        feed_id.to_string(),
                    ],
                )?;
                let follow = conn.query_row(
                    &format!(
                        r#"SELECT {FEED_FOLLOW_COLUMNS}
                           FROM feed_follows ff
                           JOIN users u ON ff.user_id = u.id
                           JOIN feeds f ON ff.feed_id = f.id
                           WHERE ff.user_id = ?1 AND ff.feed_id = ?2"#
                    ),
                    params![user_id.to_string(), feed_id.to_string()],
                    feed_follow_from_row,
                )?;
                Ok(follow)
            })
            .await?;
        Ok(follow)
    }

    pub async fn get_feed_follows_for_user(&self, user_id: Uuid) -> Result<Vec<FeedFollow>> {
        let follows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT {FEED_FOLLOW_COLUMNS}
                       FROM feed_follows ff
                       JOIN users u ON ff.user_id = u.id
                       JOIN feeds f ON ff.feed_id = f.id
                       WHERE ff.user_id = ?1
                       ORDER BY ff.created_at, f.name"#
                ))?;
                let follows = stmt
                    .query_map(params![user_id.to_string()], feed_follow_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(follows)
            })
            .await?;
        Ok(follows)
    }

    /// Returns whether a follow was actually removed.
    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM feed_follows WHERE user_id = ?1 AND feed_id = ?2",
                    params![user_id.to_string(), feed_id.to_string()],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    // Post operations

    /// Inserts the post unless one with the same URL is already stored.
    pub async fn create_post_if_absent(&self, post: NewPost) -> Result<InsertOutcome> {
        let now = now();
        let id = Uuid::new_v4();
        let outcome = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO posts (id, created_at, updated_at, feed_id, title, url, description, published_at)
                       VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(url) DO NOTHING"#,
                    params![
                        id.to_string(),
                        format_timestamp(now),
                        post.feed_id.to_string(),
                        post.title,
                        post.url,
                        post.description,
                        format_timestamp(post.published_at),
                    ],
                )?;
                Ok(if changed == 1 {
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::AlreadyExists
                })
            })
            .await?;
        Ok(outcome)
    }

    /// Newest posts, by publication date, across every feed the user follows.
    pub async fn get_posts_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Post>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT p.id, p.created_at, p.updated_at, p.feed_id, p.title, p.url,
                              p.description, p.published_at
                       FROM posts p
                       JOIN feed_follows ff ON ff.feed_id = p.feed_id
                       WHERE ff.user_id = ?1
                       ORDER BY p.published_at DESC
                       LIMIT ?2"#,
                )?;
                let posts = stmt
                    .query_map(params![user_id.to_string(), limit], post_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed width and UTC, so lexical order in SQL matches chronological order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {text:?}").into(),
        )
    })
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        created_at: timestamp_column(row, 1)?,
        updated_at: timestamp_column(row, 2)?,
        name: row.get(3)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: uuid_column(row, 0)?,
        created_at: timestamp_column(row, 1)?,
        updated_at: timestamp_column(row, 2)?,
        name: row.get(3)?,
        url: row.get(4)?,
        user_id: uuid_column(row, 5)?,
        last_fetched_at: optional_timestamp_column(row, 6)?,
    })
}

fn feed_follow_from_row(row: &Row) -> rusqlite::Result<FeedFollow> {
    Ok(FeedFollow {
        id: uuid_column(row, 0)?,
        created_at: timestamp_column(row, 1)?,
        updated_at: timestamp_column(row, 2)?,
        user_id: uuid_column(row, 3)?,
        feed_id: uuid_column(row, 4)?,
        user_name: row.get(5)?,
        feed_name: row.get(6)?,
    })
}

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: uuid_column(row, 0)?,
        created_at: timestamp_column(row, 1)?,
        updated_at: timestamp_column(row, 2)?,
        feed_id: uuid_column(row, 3)?,
        title: row.get(4)?,
        url: row.get(5)?,
        description: row.get(6)?,
        published_at: timestamp_column(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::assert_err;

    fn new_post(feed_id: Uuid, url: &str, published_at: DateTime<Utc>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post at {url}"),
            url: url.to_string(),
            description: None,
            published_at,
        }
    }

    #[tokio::test]
    async fn duplicate_user_name_is_rejected() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.create_user("alice").await.unwrap();

        let err = repo.create_user("alice").await.unwrap_err();

        assert!(matches!(err, AppError::UserExists(name) if name == "alice"));
        assert_eq!(repo.get_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn created_user_round_trips() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();

        assert_eq!(repo.get_user("alice").await.unwrap(), Some(user));
        assert_eq!(repo.get_user("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_feed_url_is_rejected() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        repo.create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();

        let err = repo
            .create_feed("Other", "https://example.com/feed.xml", user.id)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::FeedExists(_)));
    }

    #[tokio::test]
    async fn feed_for_unknown_user_violates_foreign_key() {
        let repo = Repository::open_in_memory().await.unwrap();

        assert_err!(
            repo.create_feed("Blog", "https://example.com/feed.xml", Uuid::new_v4())
                .await
        );
    }

    #[tokio::test]
    async fn post_insert_is_keyed_on_url() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let feed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = repo
            .create_post_if_absent(new_post(feed.id, "https://example.com/a", at))
            .await
            .unwrap();
        let second = repo
            .create_post_if_absent(new_post(feed.id, "https://example.com/a", at))
            .await
            .unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn posts_for_user_are_newest_first_and_limited() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let followed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();
        let unfollowed = repo
            .create_feed("Other", "https://other.example.com/feed.xml", user.id)
            .await
            .unwrap();
        repo.create_feed_follow(user.id, followed.id).await.unwrap();

        let older = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        repo.create_post_if_absent(new_post(followed.id, "https://example.com/old", older))
            .await
            .unwrap();
        repo.create_post_if_absent(new_post(followed.id, "https://example.com/new", newer))
            .await
            .unwrap();
        repo.create_post_if_absent(new_post(unfollowed.id, "https://other.example.com/x", newer))
            .await
            .unwrap();

        let posts = repo.get_posts_for_user(user.id, 10).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].url, "https://example.com/new");
        assert_eq!(posts[1].url, "https://example.com/old");

        let limited = repo.get_posts_for_user(user.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].published_at, newer);
    }

    #[tokio::test]
    async fn repeated_follow_keeps_a_single_row() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let feed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();

        let first = repo.create_feed_follow(user.id, feed.id).await.unwrap();
        let second = repo.create_feed_follow(user.id, feed.id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.user_name, "alice");
        assert_eq!(first.feed_name, "Blog");
        assert_eq!(repo.get_feed_follows_for_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unfollow_reports_whether_a_row_was_removed() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let feed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();
        repo.create_feed_follow(user.id, feed.id).await.unwrap();

        assert!(repo.delete_feed_follow(user.id, feed.id).await.unwrap());
        assert!(!repo.delete_feed_follow(user.id, feed.id).await.unwrap());
        assert!(repo.get_feed_follows_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn feeds_to_fetch_put_never_fetched_first() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let fetched = repo
            .create_feed("Fetched", "https://a.example.com/feed.xml", user.id)
            .await
            .unwrap();
        let fresh = repo
            .create_feed("Fresh", "https://b.example.com/feed.xml", user.id)
            .await
            .unwrap();
        repo.mark_feed_fetched(fetched.id, Utc::now()).await.unwrap();

        repo.reset_feeds_to_fetch().await.unwrap();
        let due = repo.get_feeds_to_fetch().await.unwrap();

        let ids: Vec<Uuid> = due.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![fresh.id, fetched.id]);
        assert!(due[1].last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn marked_feeds_are_not_due_until_reset() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let feed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();

        repo.mark_feed_fetched(feed.id, Utc::now()).await.unwrap();
        assert!(repo.get_feeds_to_fetch().await.unwrap().is_empty());

        repo.reset_feeds_to_fetch().await.unwrap();
        assert_eq!(repo.get_feeds_to_fetch().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_users_cascades() {
        let repo = Repository::open_in_memory().await.unwrap();
        let user = repo.create_user("alice").await.unwrap();
        let feed = repo
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();
        repo.create_feed_follow(user.id, feed.id).await.unwrap();

        assert_eq!(repo.delete_all_users().await.unwrap(), 1);

        assert!(repo.get_users().await.unwrap().is_empty());
        assert!(repo.get_feeds().await.unwrap().is_empty());
        assert_eq!(
            repo.get_feed_by_url("https://example.com/feed.xml").await.unwrap(),
            None
        );
    }
}
