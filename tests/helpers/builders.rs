use campus::auth::{self, Role};
use campus::storage::{Course, NewCourse, Store, User};

pub const DEFAULT_PASSWORD: &str = "password123";

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    password: String,
    role: Role,
    email: Option<String>,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            role: Role::Admin,
            email: None,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub async fn create(self, store: &dyn Store) -> User {
        auth::create_user(store, &self.username, &self.password, self.role, self.email)
            .await
            .expect("Failed to create test user")
    }
}

/// Builder for creating test courses
pub struct CourseBuilder {
    code: String,
    name: String,
    provider: Option<String>,
    instructor_id: Option<String>,
}

impl CourseBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: format!("Curso {code}"),
            provider: None,
            instructor_id: None,
        }
    }

    /// Attach to a provider by name, creating it if needed
    pub fn with_provider(mut self, name: &str) -> Self {
        self.provider = Some(name.to_string());
        self
    }

    pub fn with_instructor(mut self, user_id: &str) -> Self {
        self.instructor_id = Some(user_id.to_string());
        self
    }

    pub async fn create(self, store: &dyn Store) -> Course {
        let provider_id = match &self.provider {
            Some(name) => Some(
                store
                    .upsert_provider(name)
                    .await
                    .expect("Failed to upsert provider")
                    .id,
            ),
            None => None,
        };

        store
            .create_course(NewCourse {
                code: self.code,
                name: self.name,
                provider_id,
                instructor_id: self.instructor_id,
            })
            .await
            .expect("Failed to create test course")
    }
}
