use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeSessionsResponse {
    pub user_id: Uuid,
    #[schema(example = 2)]
    pub revoked_sessions: u64,
}
