use super::parser::ImportRow;
use super::RowError;
use crate::storage::{Course, Provider, Store};

pub const REQUIRED_FIELDS: [&str; 4] = ["email", "nombre", "proveedor", "codigo_curso"];

/// A row whose references are known to exist.
#[derive(Debug, Clone)]
pub struct ResolvedRow {
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub provider: Provider,
    pub course: Course,
}

pub fn missing_fields(row: &ImportRow) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| row.get(f).is_none())
        .collect()
}

/// Validate required fields, upsert the provider, then look up the course.
///
/// The provider is written before the course lookup, so a row naming an
/// unknown course still leaves a new provider behind.
pub async fn resolve(store: &dyn Store, row: &ImportRow) -> Result<ResolvedRow, RowError> {
    let missing = missing_fields(row);
    if !missing.is_empty() {
        return Err(RowError::MissingFields(missing));
    }
    let field = |name: &str| row.get(name).unwrap_or_default().to_string();

    let provider = store.upsert_provider(&field("proveedor")).await?;

    let code = field("codigo_curso");
    let course = store
        .find_course_by_code(&code)
        .await?
        .ok_or(RowError::UnknownCourse(code))?;

    Ok(ResolvedRow {
        email: field("email"),
        first_name: field("nombre"),
        last_name: row.get("apellido").map(str::to_string),
        role: row.get("rol_en_curso").map(str::to_string),
        provider,
        course,
    })
}
