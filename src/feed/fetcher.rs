use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rss::Channel;

use crate::error::{FetchError, Result};

/// A parsed RSS channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RssItem {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    /// Raw `pubDate` text; parsing is left to the caller.
    pub pub_date: Option<String>,
}

/// Anything that can turn a feed URL into a parsed channel.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<RssFeed>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("gator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::from)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch_feed(&self, url: &str) -> Result<RssFeed> {
        tracing::debug!("Fetching feed {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(FetchError::from)?;
        Ok(parse_channel(&bytes)?)
    }
}

/// Parses an RSS 2.0 document into an [`RssFeed`].
pub fn parse_channel(bytes: &[u8]) -> std::result::Result<RssFeed, FetchError> {
    let channel = Channel::read_from(bytes)?;

    let items = channel
        .items()
        .iter()
        .map(|item| RssItem {
            title: item.title().unwrap_or_default().trim().to_string(),
            link: non_empty(item.link()),
            description: non_empty(item.description()),
            pub_date: non_empty(item.pub_date()),
        })
        .collect();

    Ok(RssFeed {
        title: channel.title().trim().to_string(),
        link: channel.link().trim().to_string(),
        description: channel.description().trim().to_string(),
        items,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>Posts about things &amp; stuff</description>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <description>The very first one</description>
      <pubDate>Mon, 06 May 2024 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/second</link>
      <description></description>
      <pubDate>Tue, 07 May 2024 08:30:00 -0400</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_channel_and_items() {
        let feed = parse_channel(SAMPLE.as_bytes()).unwrap();

        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.link, "https://example.com/");
        assert_eq!(feed.description, "Posts about things & stuff");
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title, "First post");
        assert_eq!(first.link.as_deref(), Some("https://example.com/first"));
        assert_eq!(first.description.as_deref(), Some("The very first one"));
        assert_eq!(
            first.pub_date.as_deref(),
            Some("Mon, 06 May 2024 10:00:00 +0000")
        );
    }

    #[test]
    fn empty_description_becomes_none() {
        let feed = parse_channel(SAMPLE.as_bytes()).unwrap();

        assert_eq!(feed.items[1].description, None);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_channel(b"<rss><channel><title>broken");

        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn non_rss_document_is_a_parse_error() {
        let result = parse_channel(b"<html><body>not a feed</body></html>");

        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    /// Answers a single request on a local port with `response`, returning the feed URL.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/feed.xml")
    }

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_parses_a_served_feed() {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            SAMPLE.len(),
            SAMPLE
        );
        let url = serve_once(response).await;

        let feed = fetcher().fetch_feed(&url).await.unwrap();

        assert_eq!(feed.title, "Example Blog");
        assert_eq!(feed.items.len(), 2);
    }

    #[tokio::test]
    async fn non_success_status_is_a_status_error() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let err = fetcher().fetch_feed(&url).await.unwrap_err();

        match err {
            AppError::Fetch(FetchError::Status { url: failed, status }) => {
                assert_eq!(failed, url);
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let body = "<rss><channel><title>broken";
        let url = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let err = fetcher().fetch_feed(&url).await.unwrap_err();

        assert!(matches!(err, AppError::Fetch(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher()
            .fetch_feed(&format!("http://{addr}/feed.xml"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Fetch(FetchError::Http(_))));
    }
}
