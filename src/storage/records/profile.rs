use crate::domain::Profile;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct ProfileRecord {
    pub id: Uuid,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

impl From<ProfileRecord> for Profile {
    fn from(r: ProfileRecord) -> Self {
        Self { id: r.id, display_name: r.display_name, handle: r.handle, avatar_url: r.avatar_url }
    }
}
