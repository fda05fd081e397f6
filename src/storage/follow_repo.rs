use crate::domain::Profile;
use crate::error::Result;
use crate::storage::records::ProfileRecord;
use crate::storage::{DbPool, FollowRepo};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgFollowRepo {
    pool: DbPool,
}

impl PgFollowRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowRepo for PgFollowRepo {
    async fn edge_exists(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM follows
                WHERE (follower_id = $1 AND followee_id = $2)
                   OR (follower_id = $2 AND followee_id = $1)
            )
            ",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn neighborhood(&self, actor_id: Uuid) -> Result<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            r"
            SELECT DISTINCT p.id, p.display_name, p.handle, p.avatar_url
            FROM profiles p
            JOIN follows f
              ON (f.follower_id = $1 AND f.followee_id = p.id)
              OR (f.followee_id = $1 AND f.follower_id = p.id)
            ",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}
