pub mod attendance;
pub mod course;
pub mod document;
pub mod enrollment;
pub mod grade;
pub mod import_job;
pub mod job_execution;
pub mod participant;
pub mod provider;
pub mod refresh_token;
pub mod user;

pub use attendance::Entity as Attendance;
pub use course::Entity as Course;
pub use document::Entity as Document;
pub use enrollment::Entity as Enrollment;
pub use grade::Entity as Grade;
pub use import_job::Entity as ImportJob;
pub use job_execution::Entity as JobExecution;
pub use participant::Entity as Participant;
pub use provider::Entity as Provider;
pub use refresh_token::Entity as RefreshToken;
pub use user::Entity as User;
