use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::config::WebsiteConfig;
use crate::parser::FeedSelectors;

/// Keeps every statement under SQLite's bound-parameter limit.
const GUID_CHUNK: usize = 500;
const INSERT_CHUNK: usize = 100;

#[derive(Debug, Clone, FromRow)]
pub struct Website {
    pub id: i64,
    pub name: String,
    pub rss_url: String,
    pub item_node: String,
    pub title_field: String,
    pub link_field: String,
    pub content_field: String,
    pub guid_field: String,
    pub author_field: Option<String>,
    pub published_field: Option<String>,
}

impl Website {
    pub fn selectors(&self) -> FeedSelectors {
        FeedSelectors {
            item_node: self.item_node.clone(),
            title_field: self.title_field.clone(),
            link_field: self.link_field.clone(),
            content_field: self.content_field.clone(),
            guid_field: self.guid_field.clone(),
            author_field: self.author_field.clone(),
            published_field: self.published_field.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct News {
    pub id: i64,
    pub website_id: i64,
    pub title: String,
    pub link: String,
    pub content: String,
    pub guid: String,
    pub author: String,
    pub clicks: i64,
    pub created: String,
    pub published: Option<String>,
}

/// A parsed feed item waiting to be written, tagged with its source website.
#[derive(Debug, Clone)]
pub struct NewNews {
    pub website_id: i64,
    pub title: String,
    pub link: String,
    pub content: String,
    pub guid: String,
    pub author: String,
    pub published: Option<DateTime<Utc>>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS websites (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                rss_url TEXT NOT NULL UNIQUE,
                item_node TEXT NOT NULL,
                title_field TEXT NOT NULL,
                link_field TEXT NOT NULL,
                content_field TEXT NOT NULL,
                guid_field TEXT NOT NULL,
                author_field TEXT,
                published_field TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY,
                website_id INTEGER NOT NULL REFERENCES websites(id),
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                content TEXT NOT NULL,
                guid TEXT NOT NULL UNIQUE,
                author TEXT NOT NULL DEFAULT '',
                clicks INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL,
                published TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_news_published
            ON news(published DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn sync_websites(&self, configs: &[WebsiteConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO websites (
                    name, rss_url, item_node, title_field, link_field,
                    content_field, guid_field, author_field, published_field
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(rss_url) DO UPDATE SET
                    name = excluded.name,
                    item_node = excluded.item_node,
                    title_field = excluded.title_field,
                    link_field = excluded.link_field,
                    content_field = excluded.content_field,
                    guid_field = excluded.guid_field,
                    author_field = excluded.author_field,
                    published_field = excluded.published_field
                "#,
            )
            .bind(&config.name)
            .bind(&config.rss_url)
            .bind(&config.item_node)
            .bind(&config.title_field)
            .bind(&config.link_field)
            .bind(&config.content_field)
            .bind(&config.guid_field)
            .bind(&config.author_field)
            .bind(&config.published_field)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_all_websites(&self) -> anyhow::Result<Vec<Website>> {
        let websites = sqlx::query_as::<_, Website>("SELECT * FROM websites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(websites)
    }

    pub async fn list_news(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<News>> {
        let news = sqlx::query_as::<_, News>(
            r#"
            SELECT * FROM news
            ORDER BY published DESC NULLS LAST, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(news)
    }

    pub async fn get_news(&self, news_id: i64) -> anyhow::Result<Option<News>> {
        let news = sqlx::query_as::<_, News>("SELECT * FROM news WHERE id = ?")
            .bind(news_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(news)
    }

    pub async fn get_news_by_guid(&self, guid: &str) -> anyhow::Result<Option<News>> {
        let news = sqlx::query_as::<_, News>("SELECT * FROM news WHERE guid = ?")
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(news)
    }

    pub async fn news_count(&self) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Bump the click counter and return the updated row, or `None` if the
    /// item does not exist.
    pub async fn track_click(&self, news_id: i64) -> anyhow::Result<Option<News>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE news SET clicks = clicks + 1 WHERE id = ?")
            .bind(news_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }

        let news = sqlx::query_as::<_, News>("SELECT * FROM news WHERE id = ?")
            .bind(news_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(news))
    }

    /// GUIDs from `guids` that are already stored.
    pub async fn existing_guids(&self, guids: &[String]) -> anyhow::Result<HashSet<String>> {
        let mut conn = self.pool.acquire().await?;
        existing_guids_in(&mut conn, guids).await
    }

    /// Write every item whose GUID is not stored yet, all in one transaction.
    ///
    /// Duplicate GUIDs inside `batch` collapse to their first occurrence.
    /// Returns the number of rows inserted.
    pub async fn insert_new_news(&self, batch: &[NewNews]) -> anyhow::Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let guids: Vec<String> = batch.iter().map(|n| n.guid.clone()).collect();
        let mut seen = existing_guids_in(&mut tx, &guids).await?;

        let fresh: Vec<&NewNews> = batch
            .iter()
            .filter(|n| seen.insert(n.guid.clone()))
            .collect();

        let created = Utc::now().to_rfc3339();
        let mut inserted = 0;
        for chunk in fresh.chunks(INSERT_CHUNK) {
            inserted += insert_chunk(&mut tx, chunk, &created).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

async fn existing_guids_in(
    conn: &mut sqlx::SqliteConnection,
    guids: &[String],
) -> anyhow::Result<HashSet<String>> {
    let mut existing = HashSet::new();

    for chunk in guids.chunks(GUID_CHUNK) {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT guid FROM news WHERE guid IN (");
        let mut separated = query.separated(", ");
        for guid in chunk {
            separated.push_bind(guid);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = query.build_query_as().fetch_all(&mut *conn).await?;
        existing.extend(rows.into_iter().map(|(guid,)| guid));
    }

    Ok(existing)
}

async fn insert_chunk(
    tx: &mut Transaction<'_, Sqlite>,
    chunk: &[&NewNews],
    created: &str,
) -> anyhow::Result<u64> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "INSERT INTO news (website_id, title, link, content, guid, author, created, published) ",
    );
    query.push_values(chunk.iter().copied(), |mut row, news| {
        row.push_bind(news.website_id)
            .push_bind(&news.title)
            .push_bind(&news.link)
            .push_bind(&news.content)
            .push_bind(&news.guid)
            .push_bind(&news.author)
            .push_bind(created)
            .push_bind(news.published.map(|p| p.to_rfc3339()));
    });

    let result = query.build().execute(&mut **tx).await?;
    Ok(result.rows_affected())
}
