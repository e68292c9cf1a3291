use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Integer surrogate key; SQLite only auto-increments `INTEGER PRIMARY KEY`.
fn id_col<T: IntoIden>(manager: &SchemaManager, col: T) -> ColumnDef {
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Postgres => ColumnDef::new(col)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
        _ => ColumnDef::new(col)
            .integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned(),
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Users and credentials
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(string(Users::Role))
                    .col(string_null(Users::Email))
                    .col(
                        ColumnDef::new(Users::Enabled)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RefreshTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RefreshTokens::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(RefreshTokens::UserId))
                    .col(big_integer(RefreshTokens::CreatedAt))
                    .col(big_integer(RefreshTokens::ExpiresAt))
                    .col(
                        ColumnDef::new(RefreshTokens::Revoked)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(string_null(RefreshTokens::ParentToken))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_refresh_tokens_expires")
                    .table(RefreshTokens::Table)
                    .col(RefreshTokens::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Catalogue
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(id_col(manager, Providers::Id))
                    .col(
                        ColumnDef::new(Providers::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(big_integer(Providers::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Courses::Table)
                    .if_not_exists()
                    .col(id_col(manager, Courses::Id))
                    .col(
                        ColumnDef::new(Courses::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Courses::Name))
                    .col(big_integer_null(Courses::ProviderId))
                    .col(string_null(Courses::InstructorId))
                    .col(big_integer(Courses::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(id_col(manager, Participants::Id))
                    .col(
                        ColumnDef::new(Participants::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Participants::Name))
                    .col(big_integer_null(Participants::ProviderId))
                    .col(big_integer(Participants::CreatedAt))
                    .col(big_integer(Participants::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Enrollments::Table)
                    .if_not_exists()
                    .col(id_col(manager, Enrollments::Id))
                    .col(big_integer(Enrollments::ParticipantId))
                    .col(big_integer(Enrollments::CourseId))
                    .col(string_null(Enrollments::Role))
                    .col(big_integer_null(Enrollments::ImportJobId))
                    .col(big_integer(Enrollments::CreatedAt))
                    .col(big_integer(Enrollments::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_enrollments_participant_course")
                    .table(Enrollments::Table)
                    .col(Enrollments::ParticipantId)
                    .col(Enrollments::CourseId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_enrollments_course")
                    .table(Enrollments::Table)
                    .col(Enrollments::CourseId)
                    .to_owned(),
            )
            .await?;

        // Imports
        manager
            .create_table(
                Table::create()
                    .table(ImportJobs::Table)
                    .if_not_exists()
                    .col(id_col(manager, ImportJobs::Id))
                    .col(string(ImportJobs::Kind))
                    .col(string(ImportJobs::Status))
                    .col(big_integer_null(ImportJobs::ProviderId))
                    .col(big_integer_null(ImportJobs::CourseId))
                    .col(big_integer(ImportJobs::TotalRows))
                    .col(
                        ColumnDef::new(ImportJobs::ProcessedRows)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ImportJobs::SuccessCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ImportJobs::FailureCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(text_null(ImportJobs::ErrorMessage))
                    .col(string_null(ImportJobs::CreatedBy))
                    .col(big_integer(ImportJobs::StartedAt))
                    .col(big_integer_null(ImportJobs::CompletedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_import_jobs_started")
                    .table(ImportJobs::Table)
                    .col(ImportJobs::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(id_col(manager, Documents::Id))
                    .col(big_integer_null(Documents::ImportJobId))
                    .col(string(Documents::FileName))
                    .col(string(Documents::Checksum))
                    .col(big_integer(Documents::SizeBytes))
                    .col(string(Documents::MimeType))
                    .col(text(Documents::Metadata))
                    .col(big_integer_null(Documents::ProviderId))
                    .col(big_integer_null(Documents::CourseId))
                    .col(big_integer(Documents::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Course activity
        manager
            .create_table(
                Table::create()
                    .table(Attendance::Table)
                    .if_not_exists()
                    .col(id_col(manager, Attendance::Id))
                    .col(big_integer(Attendance::EnrollmentId))
                    .col(string(Attendance::SessionDate))
                    .col(big_integer(Attendance::Present))
                    .col(string(Attendance::RecordedBy))
                    .col(big_integer(Attendance::RecordedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_attendance_enrollment_date")
                    .table(Attendance::Table)
                    .col(Attendance::EnrollmentId)
                    .col(Attendance::SessionDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Grades::Table)
                    .if_not_exists()
                    .col(id_col(manager, Grades::Id))
                    .col(
                        ColumnDef::new(Grades::EnrollmentId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(double(Grades::Score))
                    .col(string(Grades::RecordedBy))
                    .col(big_integer(Grades::RecordedAt))
                    .to_owned(),
            )
            .await?;

        // Maintenance job log
        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(id_col(manager, JobExecutions::Id))
                    .col(string(JobExecutions::JobName))
                    .col(big_integer(JobExecutions::StartedAt))
                    .col(big_integer_null(JobExecutions::CompletedAt))
                    .col(big_integer_null(JobExecutions::Success))
                    .col(string_null(JobExecutions::ErrorMessage))
                    .col(big_integer_null(JobExecutions::RecordsProcessed))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_executions_started")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Grades::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attendance::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ImportJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Enrollments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Participants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Courses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RefreshTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    Role,
    Email,
    Enabled,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RefreshTokens {
    Table,
    Token,
    UserId,
    CreatedAt,
    ExpiresAt,
    Revoked,
    ParentToken,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Courses {
    Table,
    Id,
    Code,
    Name,
    ProviderId,
    InstructorId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Participants {
    Table,
    Id,
    Email,
    Name,
    ProviderId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Enrollments {
    Table,
    Id,
    ParticipantId,
    CourseId,
    Role,
    ImportJobId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ImportJobs {
    Table,
    Id,
    Kind,
    Status,
    ProviderId,
    CourseId,
    TotalRows,
    ProcessedRows,
    SuccessCount,
    FailureCount,
    ErrorMessage,
    CreatedBy,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
    ImportJobId,
    FileName,
    Checksum,
    SizeBytes,
    MimeType,
    Metadata,
    ProviderId,
    CourseId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Attendance {
    Table,
    Id,
    EnrollmentId,
    SessionDate,
    Present,
    RecordedBy,
    RecordedAt,
}

#[derive(DeriveIden)]
enum Grades {
    Table,
    Id,
    EnrollmentId,
    Score,
    RecordedBy,
    RecordedAt,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    RecordsProcessed,
}
