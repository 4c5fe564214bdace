use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::core::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::InteractionRepository;
use crate::models::{Follow, Interaction, InteractionKind, Post, PostFilter, User};

/// Fields needed to insert a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: UserId,
    pub location: Option<String>,
    pub category: Option<String>,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed store for users, posts, interactions and follows.
///
/// Reads go through [`InteractionRepository`]; the inherent write helpers
/// stand in for the CRUD layer in the seeder and in tests.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        if let Some(parent) = database_file_parent(url) {
            tokio::fs::create_dir_all(&parent).await.map_err(|e| {
                AppError::ConfigurationError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let repo = Self { pool };
        repo.initialize().await?;
        info!("SQLite interaction store ready at {}", url);
        Ok(repo)
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the pool.
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                interests TEXT NOT NULL DEFAULT '',
                home_location TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create users table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id INTEGER NOT NULL REFERENCES users(id),
                location TEXT,
                category TEXT,
                caption TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create posts table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                post_id INTEGER NOT NULL REFERENCES posts(id),
                kind TEXT NOT NULL CHECK (kind IN ('like', 'comment', 'share')),
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create interactions table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS follows (
                follower_id INTEGER NOT NULL REFERENCES users(id),
                followee_id INTEGER NOT NULL REFERENCES users(id),
                PRIMARY KEY (follower_id, followee_id),
                CHECK (follower_id <> followee_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create follows table: {}", e)))?;

        // At most one like per (user, post); comments and shares may repeat.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_interactions_single_like ON interactions(user_id, post_id) WHERE kind = 'like'",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create like index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to create interactions index: {}", e))
            })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_post ON interactions(post_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to create interactions index: {}", e))
            })?;

        Ok(())
    }

    pub async fn create_user(
        &self,
        username: &str,
        interests: &[&str],
        home_location: Option<&str>,
    ) -> AppResult<UserId> {
        let interests = interests
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");

        let result = sqlx::query("INSERT INTO users (username, interests, home_location) VALUES (?, ?, ?)")
            .bind(username)
            .bind(interests)
            .bind(home_location)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create user {}: {}", username, e)))?;

        Ok(UserId::new(result.last_insert_rowid()))
    }

    pub async fn create_post(&self, post: NewPost) -> AppResult<PostId> {
        let result = sqlx::query(
            "INSERT INTO posts (author_id, location, category, caption, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post.author_id.value())
        .bind(post.location)
        .bind(post.category)
        .bind(post.caption)
        .bind(post.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create post for {}: {}", post.author_id, e))
        })?;

        Ok(PostId::new(result.last_insert_rowid()))
    }

    /// Records a like/comment/share. A second like on the same post is a validation error.
    pub async fn record_interaction(
        &self,
        user_id: UserId,
        post_id: PostId,
        kind: InteractionKind,
        created_at: DateTime<Utc>,
    ) -> AppResult<Interaction> {
        sqlx::query("INSERT INTO interactions (user_id, post_id, kind, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id.value())
            .bind(post_id.value())
            .bind(kind.as_str())
            .bind(created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Validation(
                    format!("User {} already liked post {}", user_id, post_id),
                ),
                other => AppError::DatabaseError(format!(
                    "Failed to record {} by {} on {}: {}",
                    kind, user_id, post_id, other
                )),
            })?;

        Ok(Interaction {
            user_id,
            post_id,
            kind,
            created_at,
        })
    }

    /// Removes every interaction of `kind` by the user on the post (e.g. an unlike).
    pub async fn delete_interaction(
        &self,
        user_id: UserId,
        post_id: PostId,
        kind: InteractionKind,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM interactions WHERE user_id = ? AND post_id = ? AND kind = ?")
            .bind(user_id.value())
            .bind(post_id.value())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete interaction: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn follow(&self, follower_id: UserId, followee_id: UserId) -> AppResult<()> {
        if follower_id == followee_id {
            return Err(AppError::Validation(format!(
                "User {} cannot follow themselves",
                follower_id
            )));
        }

        sqlx::query("INSERT OR IGNORE INTO follows (follower_id, followee_id) VALUES (?, ?)")
            .bind(follower_id.value())
            .bind(followee_id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create follow: {}", e)))?;

        Ok(())
    }

    fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
        Ok(Post {
            id: PostId::new(row.try_get("id")?),
            author_id: UserId::new(row.try_get("author_id")?),
            location: row.try_get("location")?,
            category: row.try_get("category")?,
            caption: row.try_get("caption")?,
            created_at: millis_to_datetime(row.try_get("created_at")?)?,
            likes: row.try_get::<i64, _>("likes")?.max(0) as u64,
            comments: row.try_get::<i64, _>("comments")?.max(0) as u64,
            shares: row.try_get::<i64, _>("shares")?.max(0) as u64,
        })
    }
}

/// Directory holding the database file of a `sqlite:` url, if it names one.
fn database_file_parent(url: &str) -> Option<PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn millis_to_datetime(millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::DatabaseError(format!("Timestamp out of range: {}", millis)))
}

#[async_trait]
impl InteractionRepository for SqliteRepository {
    #[instrument(skip(self))]
    async fn list_interactions(&self) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query("SELECT user_id, post_id, kind, created_at FROM interactions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list interactions: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<Interaction> {
                let kind: String = row.try_get("kind")?;
                Ok(Interaction {
                    user_id: UserId::new(row.try_get("user_id")?),
                    post_id: PostId::new(row.try_get("post_id")?),
                    kind: kind.parse()?,
                    created_at: millis_to_datetime(row.try_get("created_at")?)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_posts(&self, filter: &PostFilter) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT p.id, p.author_id, p.location, p.category, p.caption, p.created_at,
                   COALESCE(SUM(CASE WHEN i.kind = 'like' THEN 1 ELSE 0 END), 0) AS likes,
                   COALESCE(SUM(CASE WHEN i.kind = 'comment' THEN 1 ELSE 0 END), 0) AS comments,
                   COALESCE(SUM(CASE WHEN i.kind = 'share' THEN 1 ELSE 0 END), 0) AS shares
            FROM posts p
            LEFT JOIN interactions i ON i.post_id = p.id
            WHERE 1 = 1
            "#,
        );

        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.author_id = ");
            qb.push_bind(author_id.value());
        }
        if let Some(excluded) = filter.exclude_author_id {
            qb.push(" AND p.author_id <> ");
            qb.push_bind(excluded.value());
        }

        qb.push(" GROUP BY p.id ORDER BY p.id");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list posts: {}", e)))?;

        rows.iter().map(Self::post_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_user_interactions(&self, user_id: UserId) -> AppResult<Vec<PostId>> {
        let rows = sqlx::query("SELECT post_id FROM interactions WHERE user_id = ? ORDER BY id")
            .bind(user_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to list interactions of user {}: {}",
                    user_id, e
                ))
            })?;

        rows.iter()
            .map(|row| -> AppResult<PostId> { Ok(PostId::new(row.try_get("post_id")?)) })
            .collect()
    }

    async fn list_follows(&self) -> AppResult<Vec<Follow>> {
        let rows = sqlx::query("SELECT follower_id, followee_id FROM follows ORDER BY follower_id, followee_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list follows: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<Follow> {
                Ok(Follow {
                    follower_id: UserId::new(row.try_get("follower_id")?),
                    followee_id: UserId::new(row.try_get("followee_id")?),
                })
            })
            .collect()
    }

    async fn get_user(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, interests, home_location FROM users WHERE id = ?")
            .bind(user_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get user {}: {}", user_id, e)))?;

        match row {
            Some(row) => {
                let interests: String = row.try_get("interests")?;
                Ok(Some(User {
                    id: UserId::new(row.try_get("id")?),
                    username: row.try_get("username")?,
                    interests: interests
                        .split(',')
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect(),
                    home_location: row.try_get("home_location")?,
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (SqliteRepository, UserId, UserId, PostId) {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        let alice = repo.create_user("alice", &["Beach", "food"], Some("Mumbai")).await.unwrap();
        let bob = repo.create_user("bob", &[], None).await.unwrap();
        let post = repo
            .create_post(NewPost {
                author_id: alice,
                location: Some("Goa".to_string()),
                category: Some("beach".to_string()),
                caption: Some("Sunset at the shack".to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        (repo, alice, bob, post)
    }

    #[tokio::test]
    async fn test_posts_carry_engagement_counters() {
        let (repo, _alice, bob, post) = seeded().await;
        let now = Utc::now();
        repo.record_interaction(bob, post, InteractionKind::Like, now).await.unwrap();
        repo.record_interaction(bob, post, InteractionKind::Comment, now).await.unwrap();
        repo.record_interaction(bob, post, InteractionKind::Comment, now).await.unwrap();

        let posts = repo.list_posts(&PostFilter::all()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].likes, 1);
        assert_eq!(posts[0].comments, 2);
        assert_eq!(posts[0].shares, 0);
        assert_eq!(posts[0].location.as_deref(), Some("Goa"));

        let touched = repo.list_user_interactions(bob).await.unwrap();
        assert_eq!(touched, vec![post, post, post]);
    }

    #[tokio::test]
    async fn test_second_like_is_rejected() {
        let (repo, _alice, bob, post) = seeded().await;
        repo.record_interaction(bob, post, InteractionKind::Like, Utc::now()).await.unwrap();
        let second = repo.record_interaction(bob, post, InteractionKind::Like, Utc::now()).await;
        assert!(matches!(second, Err(AppError::Validation(_))));

        assert!(repo.delete_interaction(bob, post, InteractionKind::Like).await.unwrap());
        assert!(repo.list_interactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_follow_is_rejected() {
        let (repo, alice, bob, _post) = seeded().await;
        assert!(repo.follow(alice, alice).await.is_err());
        repo.follow(bob, alice).await.unwrap();
        repo.follow(bob, alice).await.unwrap();
        let follows = repo.list_follows().await.unwrap();
        assert_eq!(follows, vec![Follow { follower_id: bob, followee_id: alice }]);
    }

    #[tokio::test]
    async fn test_post_filter_by_author() {
        let (repo, alice, bob, _post) = seeded().await;
        assert_eq!(repo.list_posts(&PostFilter::by_author(alice)).await.unwrap().len(), 1);
        assert!(repo.list_posts(&PostFilter::by_author(bob)).await.unwrap().is_empty());
        let others = PostFilter {
            exclude_author_id: Some(alice),
            ..PostFilter::default()
        };
        assert!(repo.list_posts(&others).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_interests_round_trip() {
        let (repo, alice, _bob, _post) = seeded().await;
        let user = repo.get_user(alice).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.interests.contains("beach"));
        assert!(user.interests.contains("food"));
        assert_eq!(user.home_location.as_deref(), Some("Mumbai"));
        assert!(repo.get_user(UserId::new(999)).await.unwrap().is_none());
    }

    #[test]
    fn test_database_file_parent() {
        assert_eq!(
            database_file_parent("sqlite:data/travel_recommender.db"),
            Some(PathBuf::from("data"))
        );
        assert_eq!(
            database_file_parent("sqlite:///tmp/x/app.db?mode=rwc"),
            Some(PathBuf::from("/tmp/x"))
        );
        assert_eq!(database_file_parent("sqlite::memory:"), None);
        assert_eq!(database_file_parent("sqlite:app.db"), None);
    }
}
