use chrono::{DateTime, Utc, Weekday};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Feed, InsertOutcome, NewPost};

use super::fetcher::{FeedSource, RssItem};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// [`PUB_DATE_FORMAT`] once the leading weekday has been stripped.
const PUB_DATE_FORMAT_NO_WEEKDAY: &str = "%d %b %Y %H:%M:%S %z";

/// Parses an RFC 1123 date. The weekday must be a valid abbreviation but is
/// not checked against the date.
pub fn parse_pub_date(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    let parsed = match trimmed.split_once(", ") {
        Some((day, rest)) if day.len() == 3 && day.parse::<Weekday>().is_ok() => {
            DateTime::parse_from_str(rest, PUB_DATE_FORMAT_NO_WEEKDAY)
        }
        // No usable weekday: the full format rejects it with a proper error.
        _ => DateTime::parse_from_str(trimmed, PUB_DATE_FORMAT),
    };

    parsed
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| AppError::DateParse {
            value: value.to_string(),
            source,
        })
}

/// Refreshes every registered feed once, sequentially.
///
/// A fetch failure aborts the whole pass. Articles with an unparseable date
/// (or no link) are skipped individually, and articles whose URL is already
/// stored are treated as ingested.
pub async fn scrape_feeds(repository: &Repository, source: &dyn FeedSource) -> Result<()> {
    repository.reset_feeds_to_fetch().await?;
    let feeds = repository.get_feeds_to_fetch().await?;
    tracing::debug!("{} feeds due for refresh", feeds.len());

    for feed in feeds {
        scrape_feed(repository, source, &feed).await?;
    }

    Ok(())
}

async fn scrape_feed(repository: &Repository, source: &dyn FeedSource, feed: &Feed) -> Result<()> {
    let rss = source.fetch_feed(&feed.url).await?;
    tracing::debug!(
        "Fetched {:?} from {}: {} items",
        rss.title,
        feed.url,
        rss.items.len()
    );

    // Marked before the articles are stored: a crash later in the pass loses
    // this feed's remaining articles rather than refetching it forever.
    repository.mark_feed_fetched(feed.id, Utc::now()).await?;

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for item in rss.items {
        let Some(post) = new_post(feed, item) else {
            skipped += 1;
            continue;
        };

        let title = post.title.clone();
        match repository.create_post_if_absent(post).await? {
            InsertOutcome::Inserted => {
                inserted += 1;
                println!("Article: {}", title);
            }
            InsertOutcome::AlreadyExists => {
                tracing::debug!("Already ingested: {}", title);
            }
        }
    }

    tracing::info!(
        "Refreshed {}: {} new articles, {} skipped",
        feed.name,
        inserted,
        skipped
    );
    Ok(())
}

fn new_post(feed: &Feed, item: RssItem) -> Option<NewPost> {
    let Some(url) = item.link else {
        tracing::warn!("Skipping article {:?} from {}: no link", item.title, feed.url);
        return None;
    };

    let published_at = match parse_pub_date(item.pub_date.as_deref().unwrap_or_default()) {
        Ok(dt) => dt,
        Err(e) => {
            tracing::warn!("Skipping article {} from {}: {}", url, feed.url, e);
            return None;
        }
    };

    Some(NewPost {
        feed_id: feed.id,
        title: item.title,
        url,
        description: item.description,
        published_at,
    })
}
