use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub import_job_id: Option<i64>,
    pub file_name: String,
    pub checksum: String, // hex SHA-256 of the uploaded bytes
    pub size_bytes: i64,
    pub mime_type: String,
    #[sea_orm(column_type = "Text")]
    pub metadata: String, // JSON-encoded
    pub provider_id: Option<i64>,
    pub course_id: Option<i64>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
